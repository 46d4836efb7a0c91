mod api;
mod blockchain;
mod error;

use std::time::Duration;

use clap::Parser;
use log::{info, warn};

use api::server::{run_server, AppState};
use blockchain::pow::DEFAULT_DIFFICULTY;
use blockchain::ProofOfWork;

/// A single node of a proof-of-work transaction ledger.
#[derive(Parser)]
#[command(name = "chainlet", version, about)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// Proof-of-work difficulty, in leading zero hex digits of the block hash
    #[arg(short, long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: usize,

    /// Peer address to register at startup, repeatable (host:port or URL)
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Seconds between background consensus runs
    #[arg(long, default_value_t = 10)]
    sync_interval: u64,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let state = AppState::new(ProofOfWork::new(args.difficulty));
    {
        let mut ledger = state.ledger.lock().expect("ledger mutex poisoned");
        for peer in &args.peers {
            match ledger.register_peer(peer) {
                Ok(location) => info!("registered peer {location}"),
                Err(err) => warn!("ignoring peer {peer}: {err}"),
            }
        }
    }

    let address = format!("0.0.0.0:{}", args.port);
    info!(
        "starting chainlet node {} on {} (difficulty {})",
        state.node_id,
        address,
        state.pow.difficulty()
    );
    run_server(state, &address, Duration::from_secs(args.sync_interval)).await
}
