// core.rs splits ledger responsibilities into submodules: canonical
// hashing, the chain itself, and whole-chain validation.
pub mod chain;
pub mod hasher;
pub mod validation;

pub use chain::*;
pub use hasher::*;
pub use validation::*;
