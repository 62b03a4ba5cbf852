//! In-memory ledger

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Ledger, LedgerState};
use crate::error::Result;
use crate::wallet::{OwnerId, TransactionRecord, Wallet, WalletId};

/// Volatile ledger, contents are lost on exit
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger pre-populated with wallets
    pub fn with_wallets(wallets: Vec<Wallet>) -> Self {
        Self {
            state: RwLock::new(LedgerState {
                wallets,
                transactions: Vec::new(),
            }),
        }
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn list_wallets(&self) -> Result<Vec<Wallet>> {
        Ok(self.state.read().await.wallets.clone())
    }

    async fn list_wallets_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Wallet>> {
        Ok(self.state.read().await.wallets_by_owner(owner_id))
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        Ok(self.state.read().await.wallet(id))
    }

    async fn insert_wallet(&self, wallet: Wallet) -> Result<()> {
        self.state.write().await.insert_wallet(wallet)
    }

    async fn delete_wallet(&self, id: WalletId) -> Result<bool> {
        Ok(self.state.write().await.delete_wallet(id))
    }

    async fn insert_transaction(&self, record: TransactionRecord) -> Result<()> {
        self.state.write().await.insert_transaction(record)
    }

    async fn list_transactions_by_wallet(&self, wallet_id: WalletId) -> Result<Vec<TransactionRecord>> {
        Ok(self.state.read().await.transactions_by_wallet(wallet_id))
    }

    async fn delete_transactions_by_wallet(&self, wallet_id: WalletId) -> Result<usize> {
        Ok(self.state.write().await.delete_transactions_by_wallet(wallet_id))
    }
}
