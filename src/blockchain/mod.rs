pub mod block;
pub mod chain;
pub mod consensus;
pub mod pow;

pub use block::{Block, Transaction};
pub use chain::Ledger;
pub use consensus::{ChainSnapshot, PeerClient};
pub use pow::ProofOfWork;
