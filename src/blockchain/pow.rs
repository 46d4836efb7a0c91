use super::Block;
use serde::{Deserialize, Serialize};

/// Proof-of-work difficulty: number of leading zero hex digits the canonical
/// block hash must carry.
pub const DEFAULT_DIFFICULTY: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> Self {
        ProofOfWork { difficulty }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// True iff the block's canonical hash, computed over the whole block
    /// including its current proof, starts with `difficulty` zeros.
    pub fn valid_proof(&self, block: &Block) -> bool {
        let target = "0".repeat(self.difficulty);
        block.hash().starts_with(&target)
    }

    /// Brute-force search: increment `block.proof` from its current value
    /// until the difficulty predicate holds. The search is unbounded, so the
    /// caller supplies a `cancelled` probe that is polled each iteration;
    /// returns false if the probe fired before a proof was found, leaving
    /// the block at whatever proof the search had reached.
    pub fn mine(&self, block: &mut Block, cancelled: impl Fn() -> bool) -> bool {
        loop {
            if cancelled() {
                return false;
            }
            if self.valid_proof(block) {
                return true;
            }
            block.proof += 1;
        }
    }
}
