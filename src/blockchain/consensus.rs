use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{Block, Ledger, ProofOfWork};
use crate::error::NodeError;

/// Wire shape of a node's chain, as served by `GET /chain` and consumed by
/// the resolver. `length` is the peer's own report and is what the
/// longest-chain comparison uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub length: usize,
}

/// Transport used to fetch peers' chains. Injected into [`resolve`] so the
/// resolver can be exercised without a network.
pub trait PeerClient {
    fn fetch_chain(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<ChainSnapshot, NodeError>> + Send;
}

/// Structural and proof-of-work integrity check over a candidate chain.
///
/// Every block after the first must link to the canonical hash of its
/// predecessor and carry a proof satisfying the difficulty predicate. The
/// genesis block is trusted as-is: it is never compared to a predecessor and
/// its proof is never checked, so a peer's genesis is accepted unexamined.
pub fn is_valid(chain: &[Block], pow: &ProofOfWork) -> bool {
    if chain.is_empty() {
        return false;
    }
    for pair in chain.windows(2) {
        let (previous, block) = (&pair[0], &pair[1]);
        if block.previous_hash != previous.hash() {
            return false;
        }
        if !pow.valid_proof(block) {
            return false;
        }
    }
    true
}

/// Longest-chain conflict resolution.
///
/// Consults every registered peer, keeps the longest valid chain strictly
/// longer than the local one, and swaps it in once all peers have answered.
/// Equal-length chains never replace the local one; unreachable peers are
/// logged and skipped. Bumps `chain_epoch` on a swap so in-flight mining
/// attempts notice their tail is gone.
///
/// Returns whether the local chain was replaced, plus the resulting chain.
pub async fn resolve<P: PeerClient>(
    ledger: &Mutex<Ledger>,
    chain_epoch: &AtomicU64,
    pow: &ProofOfWork,
    client: &P,
) -> (bool, Vec<Block>) {
    let (peers, local_length) = {
        let ledger = ledger.lock().expect("ledger mutex poisoned");
        let peers: Vec<String> = ledger.peers().iter().cloned().collect();
        (peers, ledger.chain.len())
    };

    let mut best_length = local_length;
    let mut best_chain: Option<Vec<Block>> = None;
    for peer in &peers {
        match client.fetch_chain(peer).await {
            Ok(snapshot) => {
                if snapshot.length > best_length && is_valid(&snapshot.chain, pow) {
                    best_length = snapshot.length;
                    best_chain = Some(snapshot.chain);
                }
            }
            Err(err) => warn!("peer {peer} unavailable, skipping: {err}"),
        }
    }

    let mut ledger = ledger.lock().expect("ledger mutex poisoned");
    if let Some(chain) = best_chain {
        // The local chain may have grown while we polled; re-check under
        // the lock before swapping.
        if chain.len() > ledger.chain.len() {
            ledger.replace_chain(chain);
            chain_epoch.fetch_add(1, Ordering::SeqCst);
            info!("adopted peer chain of length {}", ledger.chain.len());
            return (true, ledger.chain.clone());
        }
    }
    (false, ledger.chain.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Mine `extra` blocks on top of genesis, one buffered transaction each.
    fn build_chain(extra: usize, pow: &ProofOfWork) -> Vec<Block> {
        let mut ledger = Ledger::new();
        for i in 0..extra {
            ledger
                .new_transaction("a", "b", i as u64 + 1)
                .expect("buffer transaction");
            let mut candidate = ledger.candidate_block().expect("candidate");
            assert!(pow.mine(&mut candidate, || false));
            assert!(ledger.commit_block(candidate));
        }
        ledger.chain
    }

    #[test]
    fn mined_chain_is_valid() {
        let pow = ProofOfWork::new(1);
        let chain = build_chain(3, &pow);
        assert_eq!(chain.len(), 4);
        assert!(is_valid(&chain, &pow));
    }

    #[test]
    fn empty_chain_is_invalid() {
        assert!(!is_valid(&[], &ProofOfWork::new(1)));
    }

    #[test]
    fn genesis_alone_is_valid() {
        let pow = ProofOfWork::new(1);
        assert!(is_valid(&[Block::genesis()], &pow));
    }

    #[test]
    fn tampering_breaks_validity() {
        let pow = ProofOfWork::new(1);
        let chain = build_chain(2, &pow);

        let mut amount = chain.clone();
        amount[1].transactions[0].amount += 1;
        assert!(!is_valid(&amount, &pow));

        let mut proof = chain.clone();
        proof[2].proof += 1;
        assert!(!is_valid(&proof, &pow));

        let mut link = chain.clone();
        link[1].previous_hash = "0".repeat(64);
        assert!(!is_valid(&link, &pow));

        let mut stamp = chain;
        stamp[1].timestamp += 1.0;
        assert!(!is_valid(&stamp, &pow));
    }

    struct MockPeerClient {
        chains: HashMap<String, ChainSnapshot>,
    }

    impl MockPeerClient {
        fn new(entries: Vec<(&str, Vec<Block>)>) -> Self {
            let chains = entries
                .into_iter()
                .map(|(addr, chain)| {
                    let length = chain.len();
                    (addr.to_string(), ChainSnapshot { chain, length })
                })
                .collect();
            MockPeerClient { chains }
        }
    }

    impl PeerClient for MockPeerClient {
        async fn fetch_chain(&self, address: &str) -> Result<ChainSnapshot, NodeError> {
            self.chains
                .get(address)
                .cloned()
                .ok_or_else(|| NodeError::InvalidAddress(address.to_string()))
        }
    }

    fn ledger_with_chain(chain: Vec<Block>, peers: &[&str]) -> Mutex<Ledger> {
        let mut ledger = Ledger::new();
        ledger.replace_chain(chain);
        for peer in peers {
            ledger.register_peer(peer).expect("register peer");
        }
        Mutex::new(ledger)
    }

    #[tokio::test]
    async fn adopts_strictly_longest_valid_chain() {
        let pow = ProofOfWork::new(1);
        let local = build_chain(2, &pow); // length 3
        let same = build_chain(2, &pow); // length 3, different content
        let longer = build_chain(3, &pow); // length 4
        let client = MockPeerClient::new(vec![
            ("10.0.0.1:5000", same),
            ("10.0.0.2:5000", longer.clone()),
        ]);
        let ledger = ledger_with_chain(local, &["10.0.0.1:5000", "10.0.0.2:5000"]);
        let epoch = AtomicU64::new(0);

        let (replaced, chain) = resolve(&ledger, &epoch, &pow, &client).await;
        assert!(replaced);
        assert_eq!(chain, longer);
        assert_eq!(epoch.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.lock().unwrap().chain, longer);
    }

    #[tokio::test]
    async fn keeps_local_chain_when_no_peer_is_longer() {
        let pow = ProofOfWork::new(1);
        let local = build_chain(2, &pow);
        let shorter = build_chain(1, &pow);
        let same = build_chain(2, &pow);
        let client = MockPeerClient::new(vec![
            ("10.0.0.1:5000", shorter),
            ("10.0.0.2:5000", same),
        ]);
        let ledger = ledger_with_chain(local.clone(), &["10.0.0.1:5000", "10.0.0.2:5000"]);
        let epoch = AtomicU64::new(0);

        let (replaced, chain) = resolve(&ledger, &epoch, &pow, &client).await;
        assert!(!replaced);
        assert_eq!(chain, local);
        assert_eq!(epoch.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_longer_but_invalid_chain() {
        let pow = ProofOfWork::new(1);
        let local = build_chain(1, &pow);
        let mut forged = build_chain(3, &pow);
        forged[2].transactions[0].amount = 1_000_000;
        let client = MockPeerClient::new(vec![("10.0.0.1:5000", forged)]);
        let ledger = ledger_with_chain(local.clone(), &["10.0.0.1:5000"]);
        let epoch = AtomicU64::new(0);

        let (replaced, chain) = resolve(&ledger, &epoch, &pow, &client).await;
        assert!(!replaced);
        assert_eq!(chain, local);
    }

    #[tokio::test]
    async fn unreachable_peer_does_not_block_resolution() {
        let pow = ProofOfWork::new(1);
        let local = build_chain(1, &pow);
        let longer = build_chain(2, &pow);
        // 10.0.0.9 has no canned response and errors out.
        let client = MockPeerClient::new(vec![("10.0.0.2:5000", longer.clone())]);
        let ledger = ledger_with_chain(local, &["10.0.0.9:5000", "10.0.0.2:5000"]);
        let epoch = AtomicU64::new(0);

        let (replaced, chain) = resolve(&ledger, &epoch, &pow, &client).await;
        assert!(replaced);
        assert_eq!(chain, longer);
    }
}
