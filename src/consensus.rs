//! Longest-valid-chain consensus.
//!
//! Peer chains are fetched concurrently, each under its own deadline, and
//! then compared one by one against the best length seen so far. A peer's
//! chain becomes the candidate only if it is strictly longer *and* valid;
//! failures of individual peers are logged and skipped.

use crate::blockchain::{is_valid_chain, Block, Blockchain};
use crate::error::{ChainError, Result};
use crate::sync::{ChainResponse, ChainSource};
use futures::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Why a peer's chain was not adopted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerRejection {
    pub peer: String,
    pub reason: String,
}

/// Outcome of a resolution pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub replaced: bool,
    /// Local chain length after the pass
    pub length: usize,
    pub adopted_from: Option<String>,
    pub rejected: Vec<PeerRejection>,
}

/// The winning peer chain of a selection step, if any beat the incumbent.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub best: Option<(String, Vec<Block>)>,
    pub rejected: Vec<PeerRejection>,
}

/// Consensus engine for choosing the canonical chain
pub struct Consensus;

impl Consensus {
    /// Pick the longest valid chain among fetched peer results, starting from
    /// `incumbent_len` as the length to beat. Ties never win.
    pub fn select_canonical(
        incumbent_len: usize,
        fetched: Vec<(String, Result<ChainResponse>)>,
        difficulty: usize,
    ) -> Selection {
        let mut max_length = incumbent_len;
        let mut best = None;
        let mut rejected = Vec::new();

        for (peer, result) in fetched {
            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "peer skipped during resolution");
                    rejected.push(PeerRejection {
                        peer,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if response.length != response.chain.len() {
                let err = ChainError::InvalidPeerChain {
                    peer: peer.clone(),
                    reason: format!(
                        "reported length {} but sent {} blocks",
                        response.length,
                        response.chain.len()
                    ),
                };
                warn!(peer = %peer, error = %err, "peer chain rejected");
                rejected.push(PeerRejection {
                    peer,
                    reason: err.to_string(),
                });
                continue;
            }

            if response.length <= max_length {
                debug!(
                    peer = %peer,
                    length = response.length,
                    best = max_length,
                    "peer chain not longer than best seen"
                );
                continue;
            }

            if !is_valid_chain(&response.chain, difficulty) {
                let err = ChainError::InvalidPeerChain {
                    peer: peer.clone(),
                    reason: "hash linkage or proof of work check failed".to_string(),
                };
                warn!(
                    peer = %peer,
                    length = response.length,
                    "longer peer chain failed validation; possible tampering or stale peer"
                );
                rejected.push(PeerRejection {
                    peer,
                    reason: err.to_string(),
                });
                continue;
            }

            max_length = response.length;
            best = Some((peer, response.chain));
        }

        Selection { best, rejected }
    }

    /// Fetch every peer's chain concurrently, bounding each call by `timeout`.
    pub async fn fetch_all(
        source: &dyn ChainSource,
        peers: &[String],
        timeout: Duration,
    ) -> Vec<(String, Result<ChainResponse>)> {
        let fetches = peers.iter().map(|peer| async move {
            let result = match tokio::time::timeout(timeout, source.fetch_chain(peer)).await {
                Ok(result) => result,
                Err(_) => Err(ChainError::PeerTimeout { peer: peer.clone() }),
            };
            (peer.clone(), result)
        });
        join_all(fetches).await
    }

    /// Query `peers`, and replace the local chain with the longest valid
    /// peer chain if it is longer than ours. The local chain is never
    /// shortened or swapped for an invalid one.
    pub async fn resolve_conflicts(
        blockchain: &RwLock<Blockchain>,
        peers: &[String],
        source: &dyn ChainSource,
        timeout: Duration,
    ) -> Resolution {
        let (incumbent_len, difficulty) = {
            let chain = blockchain.read().await;
            (chain.len(), chain.difficulty())
        };

        let fetched = Self::fetch_all(source, peers, timeout).await;
        let Selection { best, rejected } =
            Self::select_canonical(incumbent_len, fetched, difficulty);

        let mut chain = blockchain.write().await;
        let mut adopted_from = None;
        if let Some((peer, candidate)) = best {
            if chain.replace_chain(candidate) {
                info!(peer = %peer, length = chain.len(), "adopted longer peer chain");
                adopted_from = Some(peer);
            } else {
                debug!(
                    peer = %peer,
                    "local chain advanced during resolution; keeping it"
                );
            }
        }

        Resolution {
            replaced: adopted_from.is_some(),
            length: chain.len(),
            adopted_from,
            rejected,
        }
    }
}
