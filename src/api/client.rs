use reqwest::Client;

use crate::blockchain::{ChainSnapshot, PeerClient};
use crate::error::NodeError;

/// reqwest-backed [`PeerClient`]: fetches `GET http://<host:port>/chain`
/// from other nodes. Non-2xx responses count as fetch failures, which the
/// resolver treats as "peer unavailable".
pub struct HttpPeerClient {
    client: Client,
}

impl HttpPeerClient {
    pub fn new() -> Self {
        HttpPeerClient {
            client: Client::new(),
        }
    }
}

impl Default for HttpPeerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerClient for HttpPeerClient {
    async fn fetch_chain(&self, address: &str) -> Result<ChainSnapshot, NodeError> {
        let snapshot = self
            .client
            .get(format!("http://{address}/chain"))
            .send()
            .await?
            .error_for_status()?
            .json::<ChainSnapshot>()
            .await?;
        Ok(snapshot)
    }
}
