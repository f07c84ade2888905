use clap::Parser;
use client::app::App;
use client::config::SessionConfig;
use client::network::Transport;
use client::scheduler::Scheduler;
use client::session::MapSession;
use log::info;
use macroquad::window::Conf;
use macroquad::Window;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Feed address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Game server whose players are tracked
    #[arg(short = 't', long, default_value = shared::DEFAULT_SERVER_NAME)]
    tracking_server: String,

    /// Hide points farther than this from spawn, in overworld blocks (0 = off)
    #[arg(short = 'r', long, default_value = "0")]
    radius: f64,

    /// Window width
    #[arg(short = 'w', long, default_value = "1280")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "800")]
    height: i32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting map...");
    info!("Connecting to: {}", args.server);
    info!("Controls: drag to pan, wheel to zoom, click to drill down");
    info!("C recenters, Up/Down/0 change the max radius, N/O rescale the selection, J shares it");

    let runtime = Runtime::new()?;
    let transport = runtime.block_on(Transport::connect(&args.server))?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(runtime.handle().clone(), events_tx);

    let config = SessionConfig::default()
        .with_server(args.tracking_server)
        .with_max_radius(args.radius);
    let mut session = MapSession::new(config, args.width as f32, args.height as f32);
    session.start(scheduler);

    let conf = Conf {
        window_title: "Track Map".to_string(),
        window_width: args.width,
        window_height: args.height,
        window_resizable: true,
        ..Default::default()
    };

    Window::from_config(conf, async move {
        let transport = App::new(session, transport, events_rx).run().await;
        // Let the Disconnect go out before the runtime stops
        std::thread::sleep(Duration::from_millis(100));
        drop(transport);
        runtime.shutdown_timeout(Duration::from_secs(1));
    });

    Ok(())
}
