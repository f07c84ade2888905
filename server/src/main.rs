use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerMessage};
use server::world::World;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Game server name the simulated players are on
    #[arg(short = 's', long, default_value = shared::DEFAULT_SERVER_NAME)]
    server_name: String,

    /// Number of simulated players
    #[arg(short = 'n', long, default_value = "200")]
    players: usize,

    /// Milliseconds between world steps
    #[arg(short, long, default_value = "100")]
    tick_ms: u64,

    /// Seconds between cluster rebuilds
    #[arg(long, default_value = "30")]
    cluster_secs: u64,

    /// Maximum concurrent map clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Seed for the simulation
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    info!("Starting feed on {}", addr);
    info!(
        "{} players on {}, stepping every {}ms",
        args.players, args.server_name, args.tick_ms
    );

    let world = World::new(&args.server_name, args.players, args.seed, shared::now_millis());
    let mut server = Server::new(
        &addr,
        world,
        Duration::from_millis(args.tick_ms.max(1)),
        Duration::from_secs(args.cluster_secs.max(1)),
        args.max_clients,
    )
    .await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            if let Err(e) = shutdown.send(ServerMessage::Shutdown) {
                error!("Failed to signal shutdown: {}", e);
            }
        }
    });

    server.run().await?;

    Ok(())
}
