use chrono::Utc;
use hex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentinel `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "1";

/// Sentinel proof of the genesis block; never checked against the difficulty.
pub const GENESIS_PROOF: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
}

/// One block of the ledger. `index` is 1-based; `previous_hash` links to the
/// canonical hash of the predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

impl Block {
    /// The fixed first block of every chain. Trusted as-is by validation.
    pub fn genesis() -> Block {
        Block {
            index: 1,
            timestamp: now_secs(),
            transactions: Vec::new(),
            proof: GENESIS_PROOF,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
        }
    }

    /// Canonical SHA-256 hash of the block, as lowercase hex.
    ///
    /// The block is encoded as JSON with object keys sorted lexicographically
    /// (serde_json's `Value` map is a BTreeMap), so two structurally equal
    /// blocks hash identically no matter how they were constructed. Chain
    /// linkage and proof-of-work both depend on this encoding staying stable.
    pub fn hash(&self) -> String {
        let value = serde_json::to_value(self).expect("block serializes to JSON");
        let mut hasher = Sha256::new();
        hasher.update(value.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
