//! Canonical block hashing.
//!
//! Blocks are hashed over a canonical JSON rendering in which every object's
//! keys are sorted, so two structurally equal blocks hash identically no
//! matter what order their fields were populated in.

use crate::error::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::chain::Block;

/// Lowercase hex SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Serialize `value` to JSON with object keys sorted at every depth.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = sort_keys(serde_json::to_value(value)?);
    Ok(serde_json::to_vec(&value)?)
}

/// Hash of a block's canonical serialization, as 64 lowercase hex chars.
pub fn hash_block(block: &Block) -> Result<String> {
    Ok(sha256_hex(&canonical_json(block)?))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, inner) in entries {
                sorted.insert(key, sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
