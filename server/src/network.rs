//! Server network layer handling UDP communications and the tick loop

use crate::client_manager::ClientManager;
use crate::game::GameState;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{
    Elimination, GameMode, Packet, SessionId, WorldSnapshot, SNAPSHOT_PART_BUDGET, TICK_RATE,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: SessionId },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<SessionId>,
    },
}

/// Runtime settings for a server instance
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_duration: Duration,
    pub max_clients: usize,
    /// Silence after which a connection is dropped
    pub client_timeout: Duration,
    /// Seed for spawn positions; entropy when None
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_secs_f64(1.0 / TICK_RATE as f64),
            max_clients: 64,
            client_timeout: Duration::from_secs(5),
            seed: None,
        }
    }
}

/// Stops a running server from another task
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Server loop already stopped");
        }
    }
}

/// Main server coordinating networking and game simulation
///
/// The server task is the only owner of `GameState`. Commands and ticks are
/// handled one at a time from the same select loop, so a tick always sees
/// every command received before it and never runs concurrently with one.
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let game_state = match config.seed {
            Some(seed) => GameState::with_seed(seed),
            None => GameState::new(),
        };

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            game_state,
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(self.socket.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    ///
    /// Socket writes happen here so a slow send never delays a tick.
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        // Serialize once for every recipient
                        let data = match serialize(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to serialize broadcast: {}", e);
                                continue;
                            }
                        };

                        Self::send_to_clients(&socket, &data, client_addrs, exclude).await;
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.config.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    /// Sends one serialized broadcast to every client but `exclude`
    ///
    /// Failures are reported in a single warning per broadcast. Returns the
    /// number of clients the send failed for.
    async fn send_to_clients(
        socket: &UdpSocket,
        data: &[u8],
        client_addrs: Vec<(SessionId, SocketAddr)>,
        exclude: Option<SessionId>,
    ) -> usize {
        let mut failed = 0;
        let mut last_error = None;

        for (client_id, addr) in client_addrs {
            if Some(client_id) == exclude {
                continue;
            }

            if let Err(e) = socket.send_to(data, addr).await {
                failed += 1;
                last_error = Some(e);
            }
        }

        if let Some(e) = last_error {
            warn!(
                "Broadcast of {} bytes failed for {} clients: {}",
                data.len(),
                failed,
                e
            );
        }
        failed
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<SessionId>) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet, exclude }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Applies one inbound packet to the game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let client_id = {
            let mut clients = self.clients.write().await;
            let client_id = clients.find_client_by_addr(addr);
            if let Some(id) = client_id {
                clients.touch(id);
            }
            client_id
        };

        match packet {
            Packet::Join { name, mode } => self.handle_join(client_id, addr, name, mode).await,

            Packet::Move { x, y, angle } => match client_id {
                Some(id) => {
                    if !self.game_state.move_player(id, x, y, angle) {
                        debug!("Ignored move from session {}", id);
                    }
                }
                None => warn!("Move from unknown address {}", addr),
            },

            Packet::Shoot => match client_id {
                Some(id) => {
                    if self.game_state.shoot(id).is_none() {
                        debug!("Ignored shot from session {}", id);
                    }
                }
                None => warn!("Shot from unknown address {}", addr),
            },

            Packet::Leave => {
                if let Some(id) = client_id {
                    self.clients.write().await.remove_client(&id);
                    self.remove_player(id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_join(
        &mut self,
        client_id: Option<SessionId>,
        addr: SocketAddr,
        name: String,
        mode: GameMode,
    ) {
        let client_id = match client_id {
            Some(id) => Some(id),
            None => self.clients.write().await.add_client(addr),
        };

        let Some(client_id) = client_id else {
            info!("Rejected join from {}: server full", addr);
            let response = Packet::Disconnected {
                reason: "Server full".to_string(),
            };
            self.send_packet(response, addr);
            return;
        };

        let Some(player) = self.game_state.join(client_id, name, mode) else {
            return;
        };

        if let Some(snapshot_parts) = self.snapshot_parts() {
            let parts = snapshot_parts.len() as u32;
            for (part, state) in snapshot_parts.into_iter().enumerate() {
                let init = Packet::Init {
                    session_id: client_id,
                    state,
                    part: part as u32,
                    parts,
                };
                self.send_packet(init, addr);
            }
        }
        self.broadcast_packet(Packet::PlayerJoined { player }, None);
    }

    /// Drops a session's player and tells everyone
    fn remove_player(&mut self, client_id: SessionId) {
        if self.game_state.leave(client_id).is_some() {
            self.broadcast_packet(
                Packet::PlayerLeft {
                    session_id: client_id,
                },
                None,
            );
        }
    }

    fn broadcast_eliminations(&self, eliminations: Vec<Elimination>) {
        for Elimination { victim, killer } in eliminations {
            self.broadcast_packet(Packet::PlayerKilled { victim, killer }, None);
        }
    }

    /// Current snapshot cut into datagram-sized parts
    fn snapshot_parts(&self) -> Option<Vec<WorldSnapshot>> {
        match self.game_state.snapshot().split(SNAPSHOT_PART_BUDGET) {
            Ok(parts) => Some(parts),
            Err(e) => {
                error!("Failed to split snapshot: {}", e);
                None
            }
        }
    }

    /// Broadcasts current game state to all connected clients
    async fn broadcast_game_state(&self) {
        let client_count = {
            let clients = self.clients.read().await;
            clients.len()
        };

        if client_count == 0 {
            return;
        }

        let Some(snapshot_parts) = self.snapshot_parts() else {
            return;
        };
        let parts = snapshot_parts.len() as u32;
        for (part, state) in snapshot_parts.into_iter().enumerate() {
            let packet = Packet::StateUpdate {
                state,
                part: part as u32,
                parts,
            };
            self.broadcast_packet(packet, None);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.config.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Server started successfully ({:.1} ticks/s)",
            1.0 / self.config.tick_duration.as_secs_f64()
        );

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.remove_player(client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let eliminations = self.game_state.tick();
                    self.broadcast_eliminations(eliminations);
                    self.broadcast_game_state().await;

                    // Periodic status
                    if self.game_state.tick % 300 == 0 {
                        debug!(
                            "Tick {}: {} players ({} alive), {} bullets, zone radius {:.1}",
                            self.game_state.tick,
                            self.game_state.player_count(),
                            self.game_state.alive_count(),
                            self.game_state.bullets().len(),
                            self.game_state.zone().radius
                        );
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_runs_at_thirty_hertz() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_duration.as_micros(), 33_333);
        assert_eq!(config.client_timeout, Duration::from_secs(5));
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_shutdown_handle_sends_shutdown() {
        let (server_tx, mut server_rx) = mpsc::unbounded_channel();
        let handle = ShutdownHandle { server_tx };

        handle.shutdown();

        assert!(matches!(server_rx.try_recv(), Ok(ServerMessage::Shutdown)));
    }

    #[test]
    fn test_shutdown_after_loop_stopped_is_harmless() {
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let handle = ShutdownHandle { server_tx };
        drop(server_rx);

        handle.shutdown();
    }

    #[test]
    fn test_server_binds_ephemeral_port() {
        let server =
            tokio_test::block_on(Server::new("127.0.0.1:0", ServerConfig::default())).unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_join_registers_session_and_player() {
        let mut server = Server::new("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();
        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();

        server
            .handle_packet(
                Packet::Join {
                    name: "alpha".to_string(),
                    mode: GameMode::Solo,
                },
                addr,
            )
            .await;

        let client_id = server.clients.read().await.find_client_by_addr(addr);
        assert_eq!(client_id, Some(1));
        assert_eq!(server.game_state.player(1).unwrap().name, "alpha");

        match server.game_rx.try_recv() {
            Ok(GameMessage::SendPacket {
                packet:
                    Packet::Init {
                        session_id,
                        state,
                        part,
                        parts,
                    },
                addr: to,
            }) => {
                assert_eq!(session_id, 1);
                assert_eq!((part, parts), (0, 1));
                assert_eq!(to, addr);
                assert_eq!(state.players.len(), 1);
            }
            other => panic!("Expected init packet, got {:?}", other),
        }

        assert!(matches!(
            server.game_rx.try_recv(),
            Ok(GameMessage::BroadcastPacket {
                packet: Packet::PlayerJoined { .. },
                exclude: None,
            })
        ));
    }

    #[tokio::test]
    async fn test_join_rejected_when_full() {
        let config = ServerConfig {
            max_clients: 1,
            ..ServerConfig::default()
        };
        let mut server = Server::new("127.0.0.1:0", config).await.unwrap();
        let first: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let second: SocketAddr = "127.0.0.1:9002".parse().unwrap();

        for addr in [first, second] {
            server
                .handle_packet(
                    Packet::Join {
                        name: "p".to_string(),
                        mode: GameMode::Duo,
                    },
                    addr,
                )
                .await;
        }

        assert_eq!(server.game_state.player_count(), 1);

        let mut rejected = false;
        while let Ok(message) = server.game_rx.try_recv() {
            if let GameMessage::SendPacket {
                packet: Packet::Disconnected { reason },
                addr,
            } = message
            {
                assert_eq!(addr, second);
                assert_eq!(reason, "Server full");
                rejected = true;
            }
        }
        assert!(rejected);
    }

    #[tokio::test]
    async fn test_commands_from_unknown_address_are_ignored() {
        let mut server = Server::new("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();
        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();

        server
            .handle_packet(
                Packet::Move {
                    x: 1.0,
                    y: 1.0,
                    angle: 0.0,
                },
                addr,
            )
            .await;
        server.handle_packet(Packet::Shoot, addr).await;
        server.handle_packet(Packet::Leave, addr).await;

        assert_eq!(server.game_state.player_count(), 0);
        assert!(server.game_state.bullets().is_empty());
        assert!(server.game_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_removes_session_and_broadcasts() {
        let mut server = Server::new("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();
        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();

        server
            .handle_packet(
                Packet::Join {
                    name: "alpha".to_string(),
                    mode: GameMode::Squad,
                },
                addr,
            )
            .await;
        server.handle_packet(Packet::Shoot, addr).await;
        server.handle_packet(Packet::Leave, addr).await;

        assert!(server.clients.read().await.is_empty());
        assert_eq!(server.game_state.player_count(), 0);
        assert_eq!(server.game_state.bullets().len(), 1);

        let mut left = None;
        while let Ok(message) = server.game_rx.try_recv() {
            if let GameMessage::BroadcastPacket {
                packet: Packet::PlayerLeft { session_id },
                ..
            } = message
            {
                left = Some(session_id);
            }
        }
        assert_eq!(left, Some(1));
    }

    #[tokio::test]
    async fn test_crowded_state_update_is_split_into_datagrams() {
        let mut server = Server::new("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();
        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();

        server
            .handle_packet(
                Packet::Join {
                    name: "gunner".to_string(),
                    mode: GameMode::Solo,
                },
                addr,
            )
            .await;
        for _ in 0..3_000 {
            server.game_state.shoot(1);
        }
        while server.game_rx.try_recv().is_ok() {}

        server.broadcast_game_state().await;

        let mut received = Vec::new();
        while let Ok(message) = server.game_rx.try_recv() {
            if let GameMessage::BroadcastPacket {
                packet: packet @ Packet::StateUpdate { .. },
                ..
            } = message
            {
                let size = serialize(&packet).unwrap().len();
                assert!(size <= shared::MAX_DATAGRAM_SIZE, "part is {} bytes", size);
                received.push(packet);
            }
        }

        assert!(received.len() > 1);
        let total = received.len() as u32;
        let mut states = Vec::new();
        for (expected, packet) in received.into_iter().enumerate() {
            match packet {
                Packet::StateUpdate { state, part, parts } => {
                    assert_eq!(part, expected as u32);
                    assert_eq!(parts, total);
                    states.push(state);
                }
                _ => unreachable!(),
            }
        }

        let merged = WorldSnapshot::merge(states).unwrap();
        assert_eq!(merged, server.game_state.snapshot());
        assert_eq!(merged.bullets.len(), 3_000);
    }

    #[tokio::test]
    async fn test_broadcast_failures_are_counted_once() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        // An IPv4 socket cannot reach IPv6 peers
        let client_addrs = vec![
            (1, receiver.local_addr().unwrap()),
            (2, "[::1]:9001".parse().unwrap()),
            (3, "[::1]:9002".parse().unwrap()),
            (4, receiver.local_addr().unwrap()),
        ];

        let failed = Server::send_to_clients(&socket, b"state", client_addrs, Some(4)).await;
        assert_eq!(failed, 2);

        let mut buf = [0u8; 16];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"state");
    }
}
