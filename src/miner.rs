//! Proof-of-work search.
//!
//! A proof `p'` is admitted after `p` when the SHA-256 hex digest of the
//! decimal text `"{p}{p'}"` starts with `difficulty` zero characters. The
//! search is CPU-bound, so [`mine_proof`] runs it on tokio's blocking pool
//! and gives the caller a [`CancelToken`] and a deadline.

use crate::blockchain::sha256_hex;
use crate::error::{ChainError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Leading zero hex characters required of a proof digest.
pub const DEFAULT_DIFFICULTY: usize = 4;

/// Candidates tried between cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Cooperative cancellation flag shared between a search and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Whether both handles control the same search.
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// How a search ended. Cancellation is not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningOutcome {
    Found(u64),
    Cancelled,
}

pub fn valid_proof(last_proof: u64, proof: u64, difficulty: usize) -> bool {
    let digest = sha256_hex(format!("{}{}", last_proof, proof).as_bytes());
    digest.len() >= difficulty && digest.bytes().take(difficulty).all(|b| b == b'0')
}

/// Try proofs 0, 1, 2, ... until one is valid after `last_proof` or the
/// token is cancelled.
pub fn proof_of_work(last_proof: u64, difficulty: usize, cancel: &CancelToken) -> MiningOutcome {
    let mut proof = 0u64;
    loop {
        if proof % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return MiningOutcome::Cancelled;
        }
        if valid_proof(last_proof, proof, difficulty) {
            return MiningOutcome::Found(proof);
        }
        proof += 1;
    }
}

/// Uncancellable search; for tests and tooling, never for request paths.
pub fn find_proof(last_proof: u64, difficulty: usize) -> u64 {
    let mut proof = 0u64;
    while !valid_proof(last_proof, proof, difficulty) {
        proof += 1;
    }
    proof
}

/// Search on a blocking worker, bounded by `timeout` and `cancel`.
///
/// Expiry cancels the worker and yields [`ChainError::MiningTimedOut`];
/// an external cancel yields [`ChainError::MiningCancelled`]. Both are
/// retryable.
pub async fn mine_proof(
    last_proof: u64,
    difficulty: usize,
    cancel: CancelToken,
    timeout: Duration,
) -> Result<u64> {
    let worker_cancel = cancel.clone();
    let started = Instant::now();
    let worker = tokio::task::spawn_blocking(move || {
        proof_of_work(last_proof, difficulty, &worker_cancel)
    });

    match tokio::time::timeout(timeout, worker).await {
        Ok(Ok(MiningOutcome::Found(proof))) => {
            debug!(
                last_proof,
                proof,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "proof found"
            );
            Ok(proof)
        }
        Ok(Ok(MiningOutcome::Cancelled)) => Err(ChainError::MiningCancelled),
        Ok(Err(join_err)) => Err(ChainError::Internal(format!(
            "mining worker failed: {}",
            join_err
        ))),
        Err(_) => {
            cancel.cancel();
            Err(ChainError::MiningTimedOut)
        }
    }
}
