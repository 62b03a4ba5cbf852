//! JSON document ledger
//!
//! The file is the only copy of the ledger. Every read loads it again, and
//! every mutation is a load, modify, write cycle under a process-wide lock,
//! so wallets added or removed by other `sweeper` commands are seen on the
//! next call. Writes go to a sibling temp file first and are renamed into
//! place so a crash never leaves a truncated document.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Ledger, LedgerState};
use crate::error::{Error, Result};
use crate::wallet::{OwnerId, TransactionRecord, Wallet, WalletId};

/// File-backed ledger
#[derive(Debug)]
pub struct JsonFileLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileLedger {
    /// Open the ledger at `path`; a missing file is an empty ledger
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let ledger = Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        };

        let state = ledger.load().await?;
        debug!(
            "Opened ledger {} ({} wallets, {} transactions)",
            ledger.path.display(),
            state.wallets.len(),
            state.transactions.len()
        );
        Ok(ledger)
    }

    async fn load(&self) -> Result<LedgerState> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(LedgerState::default()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                Error::Ledger(format!(
                    "Failed to parse ledger {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No ledger at {}, starting empty", self.path.display());
                Ok(LedgerState::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &LedgerState) -> Result<()> {
        let content = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // Credentials live in this file
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        Ok(())
    }

    /// Apply `change` to the current file contents and write the result back.
    /// Nothing is written when `change` fails or leaves the state untouched.
    async fn update<T>(
        &self,
        change: impl FnOnce(&mut LedgerState) -> Result<(T, bool)>,
    ) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await?;
        let (value, dirty) = change(&mut state)?;
        if dirty {
            self.save(&state).await?;
        }
        Ok(value)
    }
}

#[async_trait]
impl Ledger for JsonFileLedger {
    async fn list_wallets(&self) -> Result<Vec<Wallet>> {
        Ok(self.load().await?.wallets)
    }

    async fn list_wallets_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Wallet>> {
        Ok(self.load().await?.wallets_by_owner(owner_id))
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        Ok(self.load().await?.wallet(id))
    }

    async fn insert_wallet(&self, wallet: Wallet) -> Result<()> {
        self.update(|state| state.insert_wallet(wallet).map(|()| ((), true)))
            .await
    }

    async fn delete_wallet(&self, id: WalletId) -> Result<bool> {
        self.update(|state| {
            let removed = state.delete_wallet(id);
            Ok((removed, removed))
        })
        .await
    }

    async fn insert_transaction(&self, record: TransactionRecord) -> Result<()> {
        self.update(|state| state.insert_transaction(record).map(|()| ((), true)))
            .await
    }

    async fn list_transactions_by_wallet(&self, wallet_id: WalletId) -> Result<Vec<TransactionRecord>> {
        Ok(self.load().await?.transactions_by_wallet(wallet_id))
    }

    async fn delete_transactions_by_wallet(&self, wallet_id: WalletId) -> Result<usize> {
        self.update(|state| {
            let removed = state.delete_transactions_by_wallet(wallet_id);
            Ok((removed, removed > 0))
        })
        .await
    }
}
