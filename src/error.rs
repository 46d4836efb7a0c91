use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("missing or empty transaction field: {0}")]
    InvalidInput(&'static str),
    #[error("cannot parse peer address {0:?} into host:port")]
    InvalidAddress(String),
    #[error("chain has no blocks")]
    EmptyChain,
    #[error("peer request failed: {0}")]
    PeerFetch(#[from] reqwest::Error),
}
