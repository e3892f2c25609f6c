use clap::Parser;
use client::network::Client;
use log::info;
use shared::ReliabilityConfig;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Disconnect after this many seconds (runs until Ctrl+C if omitted)
    #[arg(short = 'd', long)]
    duration: Option<u64>,

    /// Initial resend timeout in milliseconds
    #[arg(long, default_value = "200")]
    resend_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let config = ReliabilityConfig {
        initial_resend: Duration::from_millis(args.resend_ms),
        ..Default::default()
    };
    let mut client = Client::new(&args.server, args.fake_ping, config).await?;

    client.run(args.duration.map(Duration::from_secs)).await?;

    let world = client.session().world();
    info!(
        "Finished tracking {} objects and {} sectors",
        world.objects.len(),
        world.sectors.len()
    );
    Ok(())
}
