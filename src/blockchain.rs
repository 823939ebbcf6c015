// Thin re-export module: implementation is in `blockchain/core.rs` to keep
// hashing, chain management and validation separately maintainable.

pub mod core;
pub use core::*;
