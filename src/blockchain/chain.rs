use std::collections::HashSet;

use super::block::now_secs;
use super::{Block, Transaction};
use crate::error::NodeError;

/// The node's append-only ledger: the block chain itself, the buffer of
/// transactions waiting to be mined, and the set of known peer addresses.
///
/// All three live behind one mutex at the call sites, so appending a
/// transaction, snapshotting a candidate, committing a mined block and
/// swapping in a peer's chain are each atomic with respect to one another.
pub struct Ledger {
    pub chain: Vec<Block>,
    pending: Vec<Transaction>,
    peers: HashSet<String>,
}

impl Ledger {
    /// A fresh ledger holding only the genesis block.
    pub fn new() -> Self {
        Ledger {
            chain: vec![Block::genesis()],
            pending: Vec::new(),
            peers: HashSet::new(),
        }
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.chain.last()
    }

    /// Buffer a transaction for the next mined block. Returns the index of
    /// the block that will (probably) hold it. Informational only: if more
    /// transactions arrive before mining, they land in the same block.
    pub fn new_transaction(
        &mut self,
        sender: &str,
        recipient: &str,
        amount: u64,
    ) -> Result<u64, NodeError> {
        if sender.is_empty() {
            return Err(NodeError::InvalidInput("sender"));
        }
        if recipient.is_empty() {
            return Err(NodeError::InvalidInput("recipient"));
        }
        let next = self.last_block().ok_or(NodeError::EmptyChain)?.index + 1;
        self.pending.push(Transaction {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount,
        });
        Ok(next)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Build a detached candidate block from the current chain tail and a
    /// snapshot of the pending buffer, with `proof = 0` for the miner to
    /// work on. The buffer is left untouched until the candidate is
    /// committed, so an abandoned mining attempt loses nothing.
    pub fn candidate_block(&self) -> Option<Block> {
        let last = self.chain.last()?;
        Some(Block {
            index: self.chain.len() as u64 + 1,
            timestamp: now_secs(),
            transactions: self.pending.clone(),
            proof: 0,
            previous_hash: last.hash(),
        })
    }

    /// Append a mined candidate, re-checking that the chain tail is still
    /// the one the candidate was built on. Returns false (and changes
    /// nothing) if the chain moved underneath the miner. On success the
    /// snapshotted prefix of the pending buffer is dropped; transactions
    /// submitted during mining stay pending.
    pub fn commit_block(&mut self, block: Block) -> bool {
        let Some(last) = self.chain.last() else {
            return false;
        };
        if block.index != self.chain.len() as u64 + 1 || block.previous_hash != last.hash() {
            return false;
        }
        let staged = block.transactions.len().min(self.pending.len());
        self.pending.drain(..staged);
        self.chain.push(block);
        true
    }

    /// Whole-chain swap used by consensus resolution. Pending transactions
    /// survive; they will be mined onto the new tail.
    pub fn replace_chain(&mut self, chain: Vec<Block>) {
        self.chain = chain;
    }

    /// Add a peer to the registry, normalized to `host:port`. Idempotent.
    pub fn register_peer(&mut self, address: &str) -> Result<String, NodeError> {
        let location = normalize_address(address)?;
        self.peers.insert(location.clone());
        Ok(location)
    }

    pub fn peers(&self) -> &HashSet<String> {
        &self.peers
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the `host:port` network location from a peer address, accepting
/// either a bare location (`192.168.0.5:5000`) or a full URL
/// (`http://192.168.0.5:5000/whatever`).
pub fn normalize_address(address: &str) -> Result<String, NodeError> {
    let address = address.trim();
    let rest = match address.split_once("://") {
        Some((_, rest)) => rest,
        None => address,
    };
    let location = rest.split('/').next().unwrap_or("");
    let Some((host, port)) = location.split_once(':') else {
        return Err(NodeError::InvalidAddress(address.to_string()));
    };
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(NodeError::InvalidAddress(address.to_string()));
    }
    Ok(location.to_string())
}
