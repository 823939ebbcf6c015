/// Transaction types for AgriChain
use crate::error::ChainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum serialized transaction size in bytes (100KB) to keep supply-chain payloads bounded
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// Identity reserved for system-minted rewards.
pub const SYSTEM_SENDER: &str = "0";

/// Amount credited to a node for sealing a block.
pub const MINING_REWARD: u64 = 1;

/// Crop tag carried by reward transactions.
pub const REWARD_CROP_TYPE: &str = "reward";

/// A trade record that can land in a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    pub crop_type: String,
    pub quantity: u64,
    /// Creation time, epoch milliseconds
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply_chain: Option<SupplyChainRecord>,
}

impl Transaction {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: u64,
        crop_type: impl Into<String>,
        quantity: u64,
    ) -> Self {
        Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            crop_type: crop_type.into(),
            quantity,
            timestamp: crate::blockchain::now_millis(),
            supply_chain: None,
        }
    }

    pub fn with_supply_chain(mut self, record: SupplyChainRecord) -> Self {
        self.supply_chain = Some(record);
        self
    }

    /// The system-minted reward paid to `node_id` for sealing a block.
    pub fn reward(node_id: impl Into<String>) -> Self {
        Transaction::new(SYSTEM_SENDER, node_id, MINING_REWARD, REWARD_CROP_TYPE, 0)
    }

    pub fn is_reward(&self) -> bool {
        self.sender == SYSTEM_SENDER
    }

    /// Supply-chain batch this transaction belongs to, if any.
    pub fn batch_id(&self) -> Option<&str> {
        self.supply_chain
            .as_ref()
            .map(|sc| sc.batch_id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Validate serialized size to keep oversized payloads out of the pool
    pub fn validate_size(&self) -> Result<(), ChainError> {
        let serialized = serde_json::to_vec(self)
            .map_err(|e| ChainError::InvalidTransaction(format!("Serialization failed: {}", e)))?;

        if serialized.len() > MAX_TRANSACTION_SIZE {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction too large: {} bytes (max: {})",
                serialized.len(),
                MAX_TRANSACTION_SIZE
            )));
        }
        Ok(())
    }
}

/// Traceability metadata attached to a produce transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyChainRecord {
    #[serde(default)]
    pub batch_id: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub farmer_id: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub farm_location: String,
    #[serde(default)]
    pub harvest_date: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub quality_score: String,
    #[serde(default = "default_quality_grade")]
    pub quality_grade: String,
    /// Traced lot size as given by the producer, e.g. `"50kg"` or `50`
    #[serde(default, deserialize_with = "string_or_number")]
    pub quantity: String,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub processing_steps: Vec<String>,
    #[serde(default)]
    pub transport_info: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub storage_conditions: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub traceability_qr: String,
}

fn default_quality_grade() -> String {
    "standard".to_string()
}

/// Scores arrive as either `"8.5"` or `8.5`; both are kept as text.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

impl Default for SupplyChainRecord {
    fn default() -> Self {
        SupplyChainRecord {
            batch_id: String::new(),
            product_name: String::new(),
            farmer_id: String::new(),
            location: String::new(),
            farm_location: String::new(),
            harvest_date: String::new(),
            quality_score: String::new(),
            quality_grade: default_quality_grade(),
            quantity: String::new(),
            certifications: Vec::new(),
            processing_steps: Vec::new(),
            transport_info: BTreeMap::new(),
            storage_conditions: BTreeMap::new(),
            traceability_qr: String::new(),
        }
    }
}

impl SupplyChainRecord {
    pub fn new(batch_id: impl Into<String>, farmer_id: impl Into<String>) -> Self {
        SupplyChainRecord {
            batch_id: batch_id.into(),
            farmer_id: farmer_id.into(),
            ..Default::default()
        }
    }
}

/// Inbound submission as received from a collaborator. Every required
/// field is optional here so that missing ones can be reported by name.
///
/// `amount` and `quantity` are whole numbers; a fractional value such as
/// `99.5` fails to deserialize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionRequest {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default, alias = "cropType")]
    pub crop_type: Option<String>,
    #[serde(default)]
    pub quantity: Option<u64>,
    #[serde(default, alias = "supplyChain")]
    pub supply_chain: Option<SupplyChainRecord>,
}

impl TransactionRequest {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: u64,
        crop_type: impl Into<String>,
        quantity: u64,
    ) -> Self {
        TransactionRequest {
            sender: Some(sender.into()),
            recipient: Some(recipient.into()),
            amount: Some(amount),
            crop_type: Some(crop_type.into()),
            quantity: Some(quantity),
            supply_chain: None,
        }
    }

    pub fn with_supply_chain(mut self, record: SupplyChainRecord) -> Self {
        self.supply_chain = Some(record);
        self
    }
}
