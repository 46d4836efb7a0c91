use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::api::client::HttpPeerClient;
use crate::blockchain::chain::normalize_address;
use crate::blockchain::{consensus, Block, ChainSnapshot, Ledger, ProofOfWork, Transaction};

/// Sender marking newly minted coins in the mining reward transaction.
const REWARD_SENDER: &str = "0";
const MINING_REWARD: u64 = 1;

/// Shared per-node state: the ledger behind a single mutex, the chain epoch
/// bumped on every consensus swap (so in-flight miners can notice their tail
/// vanished), and this node's identity for mining rewards.
pub struct AppState {
    pub ledger: Mutex<Ledger>,
    pub chain_epoch: AtomicU64,
    pub pow: ProofOfWork,
    pub node_id: String,
    pub peer_client: HttpPeerClient,
}

impl AppState {
    pub fn new(pow: ProofOfWork) -> Self {
        AppState {
            ledger: Mutex::new(Ledger::new()),
            chain_epoch: AtomicU64::new(0),
            pow,
            node_id: uuid::Uuid::new_v4().simple().to_string(),
            peer_client: HttpPeerClient::new(),
        }
    }
}

#[derive(Deserialize)]
pub struct TransactionRequest {
    sender: String,
    recipient: String,
    amount: u64,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    nodes: Vec<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct MineResponse {
    message: String,
    index: u64,
    transactions: Vec<Transaction>,
    proof: u64,
    previous_hash: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    message: String,
    total_nodes: Vec<String>,
}

#[derive(Serialize)]
struct ResolveResponse {
    message: String,
    chain: Vec<Block>,
}

// POST /transactions/new : buffer a transaction for the next block
pub async fn new_transaction(
    state: web::Data<AppState>,
    req: web::Json<TransactionRequest>,
) -> impl Responder {
    let mut ledger = state.ledger.lock().expect("ledger mutex poisoned");
    match ledger.new_transaction(&req.sender, &req.recipient, req.amount) {
        Ok(index) => HttpResponse::Created().json(MessageResponse {
            message: format!("Transaction will be added to block {index}"),
        }),
        Err(err) => HttpResponse::BadRequest().body(err.to_string()),
    }
}

// GET /mine : reward tx + candidate block + proof-of-work + atomic append
pub async fn mine(state: web::Data<AppState>) -> HttpResponse {
    let (candidate, started_epoch) = {
        let mut ledger = state.ledger.lock().expect("ledger mutex poisoned");
        if let Err(err) = ledger.new_transaction(REWARD_SENDER, &state.node_id, MINING_REWARD) {
            return HttpResponse::InternalServerError().body(err.to_string());
        }
        let Some(candidate) = ledger.candidate_block() else {
            return HttpResponse::InternalServerError().body("chain has no blocks");
        };
        (candidate, state.chain_epoch.load(Ordering::SeqCst))
    };

    // The search is CPU-bound and unbounded; run it off the async workers.
    // A consensus swap bumps the epoch, which aborts a now-stale search.
    let worker = state.clone();
    let mined = tokio::task::spawn_blocking(move || {
        let mut block = candidate;
        let found = worker.pow.mine(&mut block, || {
            worker.chain_epoch.load(Ordering::SeqCst) != started_epoch
        });
        found.then_some(block)
    })
    .await;

    let block = match mined {
        Ok(Some(block)) => block,
        Ok(None) => {
            warn!("mining abandoned, chain was replaced mid-search");
            return HttpResponse::Conflict().body("chain replaced while mining");
        }
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };

    let committed = {
        let mut ledger = state.ledger.lock().expect("ledger mutex poisoned");
        ledger.commit_block(block.clone())
    };
    if !committed {
        warn!("mined block #{} is stale, discarding", block.index);
        return HttpResponse::Conflict().body("chain tail moved while mining");
    }

    info!("mined block #{} with proof {}", block.index, block.proof);
    HttpResponse::Ok().json(MineResponse {
        message: "New block mined".to_string(),
        index: block.index,
        transactions: block.transactions,
        proof: block.proof,
        previous_hash: block.previous_hash,
    })
}

// GET /chain : full chain snapshot, also what peers consume during sync
pub async fn get_chain(state: web::Data<AppState>) -> impl Responder {
    let ledger = state.ledger.lock().expect("ledger mutex poisoned");
    HttpResponse::Ok().json(ChainSnapshot {
        chain: ledger.chain.clone(),
        length: ledger.chain.len(),
    })
}

// POST /nodes/register : add peer addresses to the registry
pub async fn register_nodes(
    state: web::Data<AppState>,
    req: web::Json<RegisterRequest>,
) -> HttpResponse {
    if req.nodes.is_empty() {
        return HttpResponse::BadRequest().body("please supply a list of node addresses");
    }
    // Validate everything up front so a bad address leaves the registry
    // untouched.
    for node in &req.nodes {
        if let Err(err) = normalize_address(node) {
            return HttpResponse::BadRequest().body(err.to_string());
        }
    }

    let mut ledger = state.ledger.lock().expect("ledger mutex poisoned");
    for node in &req.nodes {
        match ledger.register_peer(node) {
            Ok(location) => info!("registered peer {location}"),
            Err(err) => return HttpResponse::BadRequest().body(err.to_string()),
        }
    }
    HttpResponse::Created().json(RegisterResponse {
        message: "New nodes have been added".to_string(),
        total_nodes: ledger.peers().iter().cloned().collect(),
    })
}

// GET /nodes/resolve : run longest-chain consensus against all peers
pub async fn resolve_conflicts(state: web::Data<AppState>) -> impl Responder {
    let (replaced, chain) = consensus::resolve(
        &state.ledger,
        &state.chain_epoch,
        &state.pow,
        &state.peer_client,
    )
    .await;
    let message = if replaced {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };
    HttpResponse::Ok().json(ResolveResponse {
        message: message.to_string(),
        chain,
    })
}

fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/transactions/new", web::post().to(new_transaction))
        .route("/mine", web::get().to(mine))
        .route("/chain", web::get().to(get_chain))
        .route("/nodes/register", web::post().to(register_nodes))
        .route("/nodes/resolve", web::get().to(resolve_conflicts));
}

/// Start the HTTP server plus a background task that re-runs consensus
/// against registered peers on a fixed interval.
pub async fn run_server(
    state: AppState,
    address: &str,
    sync_interval: Duration,
) -> std::io::Result<()> {
    let state = web::Data::new(state);

    let sync_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sync_interval);
        interval.tick().await; // the first tick fires immediately
        loop {
            interval.tick().await;
            let (replaced, _) = consensus::resolve(
                &sync_state.ledger,
                &sync_state.chain_epoch,
                &sync_state.pow,
                &sync_state.peer_client,
            )
            .await;
            if replaced {
                info!("periodic sync adopted a longer peer chain");
            }
        }
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(configure_routes)
    })
    .bind(address)?
    .run()
    .await
}
