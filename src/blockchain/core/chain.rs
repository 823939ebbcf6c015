use crate::error::{ChainError, Result};
use crate::mempool::Mempool;
use crate::transaction::{Transaction, TransactionRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::hasher::hash_block;
use super::validation::{check_chain, ChainViolation};

/// Proof carried by the genesis block.
pub const GENESIS_PROOF: u64 = 100;
/// Sentinel `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "1";
/// Fixed genesis timestamp (2023-01-01T00:00:00Z) so every node starts from the same block.
pub const GENESIS_TIMESTAMP: u64 = 1672531200000;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// 1-based position in the chain
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

impl Block {
    pub fn genesis() -> Self {
        Block {
            index: 1,
            timestamp: GENESIS_TIMESTAMP,
            transactions: Vec::new(),
            proof: GENESIS_PROOF,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
        }
    }

    pub fn hash(&self) -> Result<String> {
        hash_block(self)
    }
}

/// A sealed transaction together with the block it landed in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub block_index: u64,
    pub transaction: Transaction,
}

/// The ledger: the sealed chain plus the pool of pending transactions.
///
/// All mutation goes through `&mut self`, so a caller sharing a ledger
/// across tasks serializes submits, seals and chain replacement behind
/// whatever lock wraps it.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    mempool: Mempool,
    difficulty: usize,
}

impl Blockchain {
    /// Create an initialized ledger holding only the genesis block.
    pub fn new(difficulty: usize) -> Self {
        Blockchain {
            blocks: vec![Block::genesis()],
            mempool: Mempool::new(),
            difficulty,
        }
    }

    /// Restore a ledger from blocks kept by the host. The blocks must form a
    /// valid chain; an empty vector yields an uninitialized ledger.
    pub fn from_blocks(blocks: Vec<Block>, difficulty: usize) -> Result<Self> {
        check_chain(&blocks, difficulty)
            .map_err(|v| ChainError::InvalidChain(v.to_string()))?;
        Ok(Blockchain {
            blocks,
            mempool: Mempool::new(),
            difficulty,
        })
    }

    /// Append the genesis block to an empty ledger. Runs once; a ledger that
    /// already has blocks is left untouched.
    pub fn initialize(&mut self) -> Result<()> {
        if !self.blocks.is_empty() {
            return Err(ChainError::InvalidChain(
                "ledger is already initialized".to_string(),
            ));
        }
        self.blocks.push(Block::genesis());
        Ok(())
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn last_block(&self) -> Result<&Block> {
        self.blocks.last().ok_or(ChainError::EmptyChain)
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Validate a submission and pool it. Returns the index of the block the
    /// transaction is expected to land in.
    pub fn submit_transaction(&mut self, request: TransactionRequest) -> Result<u64> {
        let tx = request.into_transaction()?;
        self.add_transaction(tx)
    }

    /// Pool an already-built transaction (rewards, restored pools).
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<u64> {
        let next_index = self.last_block()?.index + 1;
        debug!(
            sender = %tx.sender,
            recipient = %tx.recipient,
            crop_type = %tx.crop_type,
            next_index,
            "transaction pooled"
        );
        self.mempool.add_transaction(tx);
        Ok(next_index)
    }

    /// Seal the pending pool into a new block and append it.
    ///
    /// `previous_hash` defaults to the hash of the current last block. The
    /// pool is drained as part of the same call.
    pub fn seal_block(&mut self, proof: u64, previous_hash: Option<String>) -> Result<Block> {
        let last = self.last_block()?;
        let last_timestamp = last.timestamp;
        let previous_hash = match previous_hash {
            Some(hash) => hash,
            None => last.hash()?,
        };
        let block = Block {
            index: self.blocks.len() as u64 + 1,
            timestamp: now_millis().max(last_timestamp),
            transactions: self.mempool.drain(),
            proof,
            previous_hash,
        };

        info!(
            index = block.index,
            proof = block.proof,
            transactions = block.transactions.len(),
            "block sealed"
        );
        self.blocks.push(block.clone());
        Ok(block)
    }

    /// Replace the local chain with `candidate` if it is strictly longer and
    /// valid. Returns whether the replacement happened. Pending transactions
    /// are kept.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.blocks.len() {
            debug!(
                local = self.blocks.len(),
                candidate = candidate.len(),
                "candidate chain is not longer; keeping local chain"
            );
            return false;
        }
        if let Err(violation) = check_chain(&candidate, self.difficulty) {
            debug!(%violation, "candidate chain rejected");
            return false;
        }

        info!(
            old_length = self.blocks.len(),
            new_length = candidate.len(),
            "local chain replaced"
        );
        self.blocks = candidate;
        true
    }

    pub fn is_valid_chain(&self, chain: &[Block]) -> bool {
        check_chain(chain, self.difficulty).is_ok()
    }

    /// Validate the ledger's own chain.
    pub fn verify(&self) -> std::result::Result<(), ChainViolation> {
        check_chain(&self.blocks, self.difficulty)
    }

    /// Every sealed transaction tagged with `batch_id`, oldest first.
    pub fn trace_batch(&self, batch_id: &str) -> Vec<TraceEntry> {
        self.blocks
            .iter()
            .flat_map(|block| {
                block
                    .transactions
                    .iter()
                    .filter(|tx| tx.batch_id() == Some(batch_id))
                    .map(move |tx| TraceEntry {
                        block_index: block.index,
                        transaction: tx.clone(),
                    })
            })
            .collect()
    }
}
