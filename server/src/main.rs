use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// UDP port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = shared::TICK_RATE)]
    tick_rate: u32,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "64")]
    max_clients: usize,

    /// Seconds of silence before a connection is dropped
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Seed for spawn positions, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let config = ServerConfig {
        tick_duration: Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64),
        max_clients: args.max_clients,
        client_timeout: Duration::from_secs(args.timeout_secs),
        seed: args.seed,
    };

    info!("Starting arena server on {}", address);
    let mut server = Server::new(&address, config).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.shutdown();
        }
    });

    server.run().await?;

    Ok(())
}
