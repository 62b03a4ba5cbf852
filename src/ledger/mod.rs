//! Durable store of wallets and sweep records
//!
//! The engine only depends on the [`Ledger`] trait. Two implementations ship
//! with the crate:
//!
//! - [`MemoryLedger`] for tests and dry runs
//! - [`JsonFileLedger`] persisting one JSON document

pub mod json_file;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::wallet::{OwnerId, TransactionRecord, Wallet, WalletId};

pub use json_file::JsonFileLedger;
pub use memory::MemoryLedger;

/// Wallet and transaction storage
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn list_wallets(&self) -> Result<Vec<Wallet>>;

    async fn list_wallets_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Wallet>>;

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>>;

    /// Fails if the owner already monitors this address on this chain
    async fn insert_wallet(&self, wallet: Wallet) -> Result<()>;

    /// Returns whether a wallet was removed
    async fn delete_wallet(&self, id: WalletId) -> Result<bool>;

    async fn insert_transaction(&self, record: TransactionRecord) -> Result<()>;

    /// Oldest first
    async fn list_transactions_by_wallet(&self, wallet_id: WalletId) -> Result<Vec<TransactionRecord>>;

    /// Returns the number of records removed
    async fn delete_transactions_by_wallet(&self, wallet_id: WalletId) -> Result<usize>;
}

/// In-memory contents shared by both implementations
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct LedgerState {
    #[serde(default)]
    pub wallets: Vec<Wallet>,
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
}

impl LedgerState {
    pub fn wallets_by_owner(&self, owner_id: OwnerId) -> Vec<Wallet> {
        self.wallets
            .iter()
            .filter(|w| w.owner_id == owner_id)
            .cloned()
            .collect()
    }

    pub fn wallet(&self, id: WalletId) -> Option<Wallet> {
        self.wallets.iter().find(|w| w.id == id).cloned()
    }

    pub fn insert_wallet(&mut self, wallet: Wallet) -> Result<()> {
        let duplicate = self.wallets.iter().any(|w| {
            w.id == wallet.id
                || (w.owner_id == wallet.owner_id
                    && w.chain == wallet.chain
                    && w.address == wallet.address)
        });
        if duplicate {
            return Err(Error::Ledger(format!(
                "{} wallet {} is already registered for owner {}",
                wallet.chain, wallet.address, wallet.owner_id
            )));
        }

        self.wallets.push(wallet);
        Ok(())
    }

    pub fn delete_wallet(&mut self, id: WalletId) -> bool {
        let before = self.wallets.len();
        self.wallets.retain(|w| w.id != id);
        self.wallets.len() != before
    }

    pub fn insert_transaction(&mut self, record: TransactionRecord) -> Result<()> {
        if !self.wallets.iter().any(|w| w.id == record.wallet_id) {
            return Err(Error::Ledger(format!(
                "Unknown wallet {} for transaction {}",
                record.wallet_id, record.id
            )));
        }

        self.transactions.push(record);
        Ok(())
    }

    pub fn transactions_by_wallet(&self, wallet_id: WalletId) -> Vec<TransactionRecord> {
        self.transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect()
    }

    pub fn delete_transactions_by_wallet(&mut self, wallet_id: WalletId) -> usize {
        let before = self.transactions.len();
        self.transactions.retain(|t| t.wallet_id != wallet_id);
        before - self.transactions.len()
    }
}
