/// Validation logic for transactions separated from type definitions
use crate::error::ChainError;
use crate::transaction::types::{Transaction, TransactionRequest, SYSTEM_SENDER};

impl TransactionRequest {
    /// Check that every required field is present and turn the request into
    /// a timestamped transaction. Reports all missing fields at once.
    pub fn into_transaction(self) -> Result<Transaction, ChainError> {
        let mut missing = Vec::new();
        if is_blank(&self.sender) {
            missing.push("sender");
        }
        if is_blank(&self.recipient) {
            missing.push("recipient");
        }
        if self.amount.is_none() {
            missing.push("amount");
        }
        if is_blank(&self.crop_type) {
            missing.push("crop_type");
        }
        if self.quantity.is_none() {
            missing.push("quantity");
        }

        let missing_values =
            || ChainError::InvalidTransaction(format!("Missing values: {}", missing.join(", ")));
        if !missing.is_empty() {
            return Err(missing_values());
        }

        let (Some(sender), Some(recipient), Some(amount), Some(crop_type), Some(quantity)) = (
            self.sender,
            self.recipient,
            self.amount,
            self.crop_type,
            self.quantity,
        ) else {
            return Err(missing_values());
        };

        let mut tx = Transaction::new(sender, recipient, amount, crop_type, quantity);
        tx.supply_chain = self.supply_chain;
        tx.validate_submitted()?;
        Ok(tx)
    }
}

impl Transaction {
    /// Stateless checks for a transaction entering the pool from outside.
    /// Rewards are minted by the node itself and never accepted here.
    pub fn validate_submitted(&self) -> Result<(), ChainError> {
        if self.sender == SYSTEM_SENDER {
            return Err(ChainError::InvalidTransaction(format!(
                "Sender \"{}\" is reserved for mining rewards",
                SYSTEM_SENDER
            )));
        }
        self.validate_size()
    }
}

fn is_blank(field: &Option<String>) -> bool {
    field.as_deref().map_or(true, |s| s.trim().is_empty())
}
