//! Error types for AgriChain

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Chain is empty; the ledger has not been initialized")]
    EmptyChain,

    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("Peer {peer} timed out")]
    PeerTimeout { peer: String },

    #[error("Peer {peer} returned an invalid chain: {reason}")]
    InvalidPeerChain { peer: String, reason: String },

    #[error("Invalid peer address: {0}")]
    InvalidPeerAddress(String),

    #[error("Mining was cancelled")]
    MiningCancelled,

    #[error("Mining timed out before a proof was found")]
    MiningTimedOut,

    #[error("Proof is stale: the chain advanced while mining")]
    StaleProof,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChainError {
    /// Mining interruptions are "try again" conditions, not failures.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainError::MiningCancelled | ChainError::MiningTimedOut | ChainError::StaleProof
        )
    }

    /// The peer this error concerns, if it came out of a peer query.
    pub fn peer(&self) -> Option<&str> {
        match self {
            ChainError::PeerUnreachable { peer, .. }
            | ChainError::PeerTimeout { peer }
            | ChainError::InvalidPeerChain { peer, .. } => Some(peer),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_mining_conditions() {
        assert!(ChainError::MiningCancelled.is_retryable());
        assert!(ChainError::MiningTimedOut.is_retryable());
        assert!(ChainError::StaleProof.is_retryable());
        assert!(!ChainError::EmptyChain.is_retryable());
        assert!(!ChainError::InvalidTransaction("missing sender".into()).is_retryable());
    }

    #[test]
    fn test_peer_accessor() {
        let err = ChainError::PeerTimeout { peer: "10.0.0.2:5000".into() };
        assert_eq!(err.peer(), Some("10.0.0.2:5000"));
        assert_eq!(ChainError::EmptyChain.peer(), None);
    }
}
