use clap::Parser;
use log::info;
use server::config::{FrameConfig, ServerConfig};
use server::game::GameState;
use server::network::Server;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, builds the demo world and runs the replication server.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Tick rate (updates per second)
        #[clap(short, long, default_value = "35")]
        tick_rate: u32,
        /// Maximum number of connected clients
        #[clap(short, long, default_value = "16")]
        max_clients: usize,
        /// Ticks between frames for each client
        #[clap(short, long, default_value = "2")]
        frame_interval: u32,
        /// Seconds of silence before a client is dropped
        #[clap(long, default_value = "5")]
        timeout: u64,
        /// Wandering objects in the demo world
        #[clap(long, default_value = "64")]
        objects: usize,
        /// Sectors in the demo world
        #[clap(long, default_value = "32")]
        sectors: u16,
        /// Seed for the demo world
        #[clap(long, default_value = "1")]
        seed: u64,
    }

    let args = Args::parse();

    let config = ServerConfig {
        max_clients: args.max_clients,
        client_timeout: Duration::from_secs(args.timeout),
        tick_rate: args.tick_rate,
        frame: FrameConfig {
            frame_interval: args.frame_interval,
            ..Default::default()
        },
        ..Default::default()
    };

    let game = GameState::new(args.seed, args.objects, args.sectors);
    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config, game).await?;
    server.run().await?;

    info!("Server stopped");
    Ok(())
}
