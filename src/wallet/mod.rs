//! Wallet model and key material
//!
//! - Wallet and transaction record types
//! - Credential resolution (private key, mnemonic, delegated)
//! - BIP-39 validation and per-chain HD derivation
//!
//! # Flow
//!
//! ```text
//! stored credential ─▶ CredentialResolver ─▶ { address, Option<Signer> }
//!                            │
//!                 mnemonic ──┴─▶ derivation (BTC path search, TRON/EVM/SOL paths)
//! ```

pub mod credentials;
pub mod derivation;
pub mod mnemonic;
pub mod types;

pub use credentials::{CredentialResolver, ResolvedCredential, Signer};
pub use types::{CredentialKind, OwnerId, TransactionRecord, TxStatus, Wallet, WalletId};
