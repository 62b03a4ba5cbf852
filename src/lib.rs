//! Chain Sweeper Library
//!
//! Watches custodial wallets on TRON, Bitcoin, Ethereum, BNB Smart Chain and
//! Solana, and sweeps balances above an owner-defined threshold to a fixed
//! receiver address.

pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod setup;
pub mod sweep;
pub mod wallet;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
