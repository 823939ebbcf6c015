//! AgriChain - an append-only ledger of agricultural trades
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, canonical hashing and chain validation
//! - [`transaction`] - Trade records and submission checks
//! - [`mempool`] - Pending transaction pool
//!
//! ## Consensus & Mining
//! - [`miner`] - Cancellable proof-of-work search
//! - [`consensus`] - Longest-valid-chain resolution
//!
//! ## Networking
//! - [`sync`] - Peer registry and chain fetching
//! - [`node`] - Node service shared by the API and background tasks
//! - `api` - HTTP surface (feature `api`)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod consensus;
pub mod miner;

// ============================================================================
// Networking
// ============================================================================
#[cfg(feature = "api")]
pub mod api;
pub mod node;
pub mod sync;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
