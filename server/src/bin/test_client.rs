//! Headless bot that joins an arena server, wanders, shoots and logs what
//! the server broadcasts. Useful for load and smoke testing.

use bincode::{deserialize, serialize};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use rand::Rng;
use shared::{GameMode, Killer, Packet, SessionId, ARENA_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::interval;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Solo,
    Duo,
    Squad,
}

impl From<Mode> for GameMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Solo => GameMode::Solo,
            Mode::Duo => GameMode::Duo,
            Mode::Squad => GameMode::Squad,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name
    #[arg(short, long, default_value = "bot")]
    name: String,

    /// Team mode
    #[arg(short, long, value_enum, default_value = "solo")]
    mode: Mode,

    /// Command rounds to play before leaving
    #[arg(short, long, default_value = "300")]
    rounds: u32,
}

async fn send(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}

fn handle_packet(packet: Packet, session_id: &mut Option<SessionId>) {
    match packet {
        Packet::Init {
            session_id: id,
            state,
            part,
            ..
        } => {
            if part == 0 {
                info!(
                    "Joined as session {} (zone radius {:.1})",
                    id, state.zone.radius
                );
            }
            *session_id = Some(id);
        }
        Packet::PlayerJoined { player } => {
            info!("{} joined as {:?}", player.name, player.team);
        }
        Packet::PlayerLeft { session_id } => {
            info!("Session {} left", session_id);
        }
        Packet::PlayerKilled { victim, killer } => match killer {
            Killer::Player(killer) => info!("Session {} killed by session {}", victim, killer),
            Killer::Zone => info!("Session {} killed by the zone", victim),
        },
        Packet::StateUpdate { state, parts, .. } => {
            if state.tick % 30 == 0 {
                let me = session_id.and_then(|id| state.players.iter().find(|p| p.id == id));
                if let Some(me) = me {
                    info!(
                        "Tick {}: health {:.1}, kills {}, snapshot in {} parts",
                        state.tick, me.health, me.kills, parts
                    );
                }
            }
        }
        Packet::Disconnected { reason } => {
            warn!("Disconnected: {}", reason);
        }
        _ => warn!("Unexpected packet type"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = args.server.parse::<SocketAddr>()?;

    let join = Packet::Join {
        name: args.name.clone(),
        mode: args.mode.into(),
    };
    send(&socket, &join, server_addr).await?;

    let mut rng = rand::thread_rng();
    let mut session_id = None;
    let mut x = ARENA_SIZE / 2.0;
    let mut y = ARENA_SIZE / 2.0;
    let mut rounds = 0;

    let mut command_interval = interval(Duration::from_millis(100));
    let mut buffer = vec![0u8; 65_507];

    while rounds < args.rounds {
        tokio::select! {
            result = socket.recv_from(&mut buffer) => {
                let (len, _) = result?;
                match deserialize::<Packet>(&buffer[..len]) {
                    Ok(packet) => handle_packet(packet, &mut session_id),
                    Err(e) => warn!("Failed to decode packet: {}", e),
                }
            },

            _ = command_interval.tick() => {
                if session_id.is_none() {
                    continue;
                }

                x = (x + rng.gen_range(-40.0..=40.0)).clamp(0.0, ARENA_SIZE);
                y = (y + rng.gen_range(-40.0..=40.0)).clamp(0.0, ARENA_SIZE);
                let angle = rng.gen_range(0.0..std::f32::consts::TAU);
                send(&socket, &Packet::Move { x, y, angle }, server_addr).await?;

                if rng.gen_bool(0.3) {
                    send(&socket, &Packet::Shoot, server_addr).await?;
                }
                rounds += 1;
            },
        }
    }

    send(&socket, &Packet::Leave, server_addr).await?;
    info!("Left after {} rounds", rounds);

    Ok(())
}
