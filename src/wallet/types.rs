//! Core types for monitored wallets
//!
//! Defines wallet entries, credential kinds and transaction records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::chain::{Amount, ChainKind};
use crate::error::{Error, Result};

/// Identifier of the owner (chat/user id on the front-end)
pub type OwnerId = i64;

/// Identifier of a monitored wallet
pub type WalletId = Uuid;

/// Declared form of the secret material backing a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Raw private key (hex, WIF or chain-specific encoding)
    PrivateKey,

    /// BIP-39 mnemonic seed phrase
    Mnemonic,

    /// Address obtained through the pairing flow, no local secret
    Delegated,
}

impl CredentialKind {
    /// Whether wallets of this kind carry a local secret
    pub fn has_local_secret(&self) -> bool {
        matches!(self, CredentialKind::PrivateKey | CredentialKind::Mnemonic)
    }
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialKind::PrivateKey => write!(f, "private_key"),
            CredentialKind::Mnemonic => write!(f, "mnemonic"),
            CredentialKind::Delegated => write!(f, "delegated"),
        }
    }
}

impl FromStr for CredentialKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "private_key" | "privatekey" | "key" => Ok(CredentialKind::PrivateKey),
            "mnemonic" | "seed" | "seed_phrase" => Ok(CredentialKind::Mnemonic),
            "delegated" | "walletconnect" => Ok(CredentialKind::Delegated),
            other => Err(Error::Credential(format!(
                "Unknown credential kind: {}",
                other
            ))),
        }
    }
}

/// A wallet monitored by the sweeper
///
/// For delegated wallets `credential` holds the address produced by the
/// pairing flow.
#[derive(Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique identifier
    pub id: WalletId,

    /// Owner to notify
    pub owner_id: OwnerId,

    /// Ledger this wallet lives on
    pub chain: ChainKind,

    /// Canonical address, derived from the credential
    pub address: String,

    /// Opaque secret material
    pub credential: String,

    /// How to interpret `credential`
    pub credential_kind: CredentialKind,

    /// Where swept funds go
    pub receiver_address: String,

    /// Minimum balance (minor units) that triggers a sweep, 0 = any
    pub threshold: Amount,

    /// When the wallet was registered
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a new wallet entry with a fresh id
    pub fn new(
        owner_id: OwnerId,
        chain: ChainKind,
        address: String,
        credential: String,
        credential_kind: CredentialKind,
        receiver_address: String,
        threshold: Amount,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            chain,
            address,
            credential,
            credential_kind,
            receiver_address,
            threshold,
            created_at: Utc::now(),
        }
    }

    /// Whether the engine may sign for this wallet
    pub fn is_auto_sweepable(&self) -> bool {
        self.credential_kind.has_local_secret()
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("chain", &self.chain)
            .field("address", &self.address)
            .field("credential", &"***")
            .field("credential_kind", &self.credential_kind)
            .field("receiver_address", &self.receiver_address)
            .field("threshold", &self.threshold)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Status of a sweep transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxStatus::Pending => write!(f, "pending"),
            TxStatus::Success => write!(f, "success"),
            TxStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one sweep, as stored in the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique record ID
    pub id: Uuid,

    /// Wallet that was swept
    pub wallet_id: WalletId,

    /// Ledger the transaction was sent on
    pub chain: ChainKind,

    /// Amount sent in minor units
    pub amount: Amount,

    /// Outcome
    pub status: TxStatus,

    /// Transaction hash, always set for successful sweeps
    pub tx_hash: Option<String>,

    /// When the record was created
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Record a successful sweep. The hash must not be empty.
    pub fn success(wallet: &Wallet, amount: Amount, tx_hash: impl Into<String>) -> Result<Self> {
        let tx_hash = tx_hash.into();
        if tx_hash.trim().is_empty() {
            return Err(Error::Internal(format!(
                "Refusing to record sweep of wallet {} without a transaction hash",
                wallet.id
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            wallet_id: wallet.id,
            chain: wallet.chain,
            amount,
            status: TxStatus::Success,
            tx_hash: Some(tx_hash),
            created_at: Utc::now(),
        })
    }
}
