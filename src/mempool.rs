//! Pending transaction pool.
//!
//! An ordered staging area for transactions awaiting the next sealed block.
//! The pool is owned by the [`Blockchain`](crate::blockchain::Blockchain) and
//! only mutated through it, so it carries no locking of its own.

use crate::transaction::Transaction;

#[derive(Debug, Clone, Default)]
pub struct Mempool {
    pending: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transaction. Insertion order is the order it will appear in
    /// the sealed block.
    pub fn add_transaction(&mut self, tx: Transaction) {
        self.pending.push(tx);
    }

    /// Remove and return every pending transaction, leaving the pool empty.
    pub fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.pending)
    }

    pub fn get_all_transactions(&self) -> Vec<Transaction> {
        self.pending.clone()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
