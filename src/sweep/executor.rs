//! One sweep attempt for one wallet
//!
//! Steps run in a fixed order: balance, decision, credential resolution,
//! construction and broadcast, ledger record, notification. Nothing after
//! the broadcast returns an error, so a completed broadcast is never retried.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::decision::{decide, meets_threshold, SkipReason, SweepDecision};
use crate::chain::{AdapterRegistry, Amount, FeeContext, SweepRequest};
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::notify::{messages, Notifier};
use crate::wallet::{CredentialResolver, OwnerId, TransactionRecord, Wallet, WalletId};

/// Result of an attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Skipped(SkipReason),
    Swept { amount: Amount, tx_hash: String },
    /// Dry run: the sweep would have been sent
    WouldSweep { amount: Amount },
}

/// Runs single sweep attempts against the configured collaborators
pub struct SweepExecutor {
    registry: AdapterRegistry,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    resolver: CredentialResolver,
    dry_run: bool,
    /// Balance last reported to the owner of each delegated wallet
    reauth_notified: DashMap<WalletId, Amount>,
}

impl SweepExecutor {
    pub fn new(
        registry: AdapterRegistry,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            ledger,
            notifier,
            resolver: CredentialResolver::new(),
            dry_run: false,
            reauth_notified: DashMap::new(),
        }
    }

    /// Log decisions without signing or broadcasting
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Deliver a message, logging instead of failing
    pub async fn notify_best_effort(&self, owner_id: OwnerId, message: &str) {
        if let Err(e) = self.notifier.notify(owner_id, message).await {
            warn!(owner_id, "Notification failed: {}", e);
        }
    }

    /// Run one attempt. Errors are classified by the caller.
    pub async fn attempt(&self, wallet: &Wallet) -> Result<AttemptOutcome> {
        let adapter = self.registry.get(wallet.chain)?;

        let balance = adapter.get_balance(&wallet.address).await?;
        debug!(wallet_id = %wallet.id, chain = %wallet.chain, balance, "Balance fetched");

        if !meets_threshold(balance, wallet.threshold) {
            self.reauth_notified.remove(&wallet.id);
            return Ok(AttemptOutcome::Skipped(SkipReason::BelowThreshold));
        }

        if !wallet.is_auto_sweepable() {
            return self.request_reauthorization(wallet, balance).await;
        }

        let fee = adapter
            .estimate_fee(&FeeContext {
                source: &wallet.address,
                balance,
            })
            .await?;

        let amount = match decide(balance, wallet.threshold, fee.total) {
            SweepDecision::Sweep { amount } => amount,
            SweepDecision::Skip(reason) => {
                info!(
                    wallet_id = %wallet.id,
                    chain = %wallet.chain,
                    balance,
                    fee = fee.total,
                    "Skipping sweep: {}",
                    reason
                );
                return Ok(AttemptOutcome::Skipped(reason));
            }
        };

        let resolved = self
            .resolver
            .resolve(&wallet.credential, wallet.credential_kind, wallet.chain)?;
        if resolved.address != wallet.address {
            return Err(Error::Credential(format!(
                "Credential resolves to {} but wallet {} is registered as {}",
                resolved.address, wallet.id, wallet.address
            )));
        }

        let signer = resolved.require_signer()?;

        adapter.validate_address(&wallet.receiver_address)?;

        if self.dry_run {
            info!(
                wallet_id = %wallet.id,
                chain = %wallet.chain,
                amount,
                fee = fee.total,
                "Dry run: would sweep {} to {}",
                wallet.chain.format_amount(amount),
                wallet.receiver_address
            );
            return Ok(AttemptOutcome::WouldSweep { amount });
        }

        let request = SweepRequest {
            source: wallet.address.clone(),
            destination: wallet.receiver_address.clone(),
            amount,
            fee,
        };
        let receipt = adapter.build_sign_broadcast(signer, &request).await?;

        info!(
            wallet_id = %wallet.id,
            chain = %wallet.chain,
            amount,
            tx_hash = %receipt.tx_hash,
            "Sweep broadcast"
        );

        // Funds have moved; from here on failures are logged, never returned
        match TransactionRecord::success(wallet, amount, receipt.tx_hash.clone()) {
            Ok(record) => {
                if let Err(e) = self.ledger.insert_transaction(record).await {
                    error!(wallet_id = %wallet.id, tx_hash = %receipt.tx_hash, "Failed to record sweep: {}", e);
                }
            }
            Err(e) => error!(wallet_id = %wallet.id, "Failed to record sweep: {}", e),
        }

        let explorer_url = adapter.explorer_tx_url(&receipt.tx_hash);
        self.notify_best_effort(
            wallet.owner_id,
            &messages::sweep_success(wallet, amount, &receipt.tx_hash, &explorer_url),
        )
        .await;

        Ok(AttemptOutcome::Swept {
            amount,
            tx_hash: receipt.tx_hash,
        })
    }

    /// Ask the owner of a delegated wallet to move the funds. The owner is
    /// told again only once the balance grows or after it dropped below the
    /// threshold in between.
    async fn request_reauthorization(&self, wallet: &Wallet, balance: Amount) -> Result<AttemptOutcome> {
        let already_told = self
            .reauth_notified
            .get(&wallet.id)
            .is_some_and(|last| *last >= balance);

        if already_told {
            debug!(wallet_id = %wallet.id, balance, "Owner already asked to re-authorise");
        } else {
            warn!(wallet_id = %wallet.id, chain = %wallet.chain, balance, "Delegated wallet needs manual sweep");
            self.notify_best_effort(
                wallet.owner_id,
                &messages::reauthorization_required(wallet, balance),
            )
            .await;
            self.reauth_notified.insert(wallet.id, balance);
        }

        Err(Error::Credential(format!(
            "{} is delegated; re-authorise the sweep manually",
            wallet.address
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainKind;
    use crate::ledger::MemoryLedger;
    use crate::test_support::{delegated_wallet_fixture, wallet_fixture, MockAdapter, RecordingNotifier};

    struct Harness {
        executor: SweepExecutor,
        adapter: Arc<MockAdapter>,
        ledger: Arc<MemoryLedger>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(adapter: MockAdapter, wallets: Vec<Wallet>) -> Harness {
        let adapter = Arc::new(adapter);
        let ledger = Arc::new(MemoryLedger::with_wallets(wallets));
        let notifier = Arc::new(RecordingNotifier::new());

        let mut registry = AdapterRegistry::new();
        registry.register(adapter.clone());

        Harness {
            executor: SweepExecutor::new(registry, ledger.clone(), notifier.clone()),
            adapter,
            ledger,
            notifier,
        }
    }

    #[tokio::test]
    async fn test_scenario_a_zero_threshold_sweeps_balance_minus_fee() {
        let wallet = wallet_fixture(ChainKind::Tron, 0);
        let h = harness(
            MockAdapter::new(ChainKind::Tron, 100_000).with_balance(1_000_000),
            vec![wallet.clone()],
        );

        let outcome = h.executor.attempt(&wallet).await.unwrap();
        let AttemptOutcome::Swept { amount, tx_hash } = outcome else {
            panic!("expected a sweep, got {:?}", outcome);
        };
        assert_eq!(amount, 900_000);
        assert!(!tx_hash.is_empty());

        let requests = h.adapter.build_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].amount, 900_000);
        assert_eq!(requests[0].destination, wallet.receiver_address);

        let records = h.ledger.list_transactions_by_wallet(wallet.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 900_000);
        assert_eq!(records[0].tx_hash.as_deref(), Some(tx_hash.as_str()));

        let sent = h.notifier.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, wallet.owner_id);
        assert!(sent[0].1.contains("0.9 TRX"));
    }

    #[tokio::test]
    async fn test_scenario_b_fee_exceeds_balance() {
        let wallet = wallet_fixture(ChainKind::Tron, 0);
        let h = harness(
            MockAdapter::new(ChainKind::Tron, 100_000).with_balance(50_000),
            vec![wallet.clone()],
        );

        let outcome = h.executor.attempt(&wallet).await.unwrap();
        assert_eq!(outcome, AttemptOutcome::Skipped(SkipReason::FeeExceedsBalance));
        assert!(h.adapter.build_requests().is_empty());
        assert!(h.ledger.list_transactions_by_wallet(wallet.id).await.unwrap().is_empty());
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_below_threshold_skips_fee_and_construction() {
        let wallet = wallet_fixture(ChainKind::Solana, 2_000_000);
        let h = harness(
            MockAdapter::new(ChainKind::Solana, 5_000).with_balance(1_999_999),
            vec![wallet.clone()],
        );

        let outcome = h.executor.attempt(&wallet).await.unwrap();
        assert_eq!(outcome, AttemptOutcome::Skipped(SkipReason::BelowThreshold));
        assert_eq!(h.adapter.fee_calls(), 0);
        assert!(h.adapter.build_requests().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_c_delegated_wallet() {
        let wallet = delegated_wallet_fixture(ChainKind::Ethereum, 1_000);
        let h = harness(
            MockAdapter::new(ChainKind::Ethereum, 21_000).with_balance(1_000_000),
            vec![wallet.clone()],
        );

        let err = h.executor.attempt(&wallet).await.unwrap_err();
        assert!(matches!(err, Error::Credential(_)));
        assert!(!err.is_retryable());

        assert!(h.adapter.build_requests().is_empty());
        assert!(h.ledger.list_transactions_by_wallet(wallet.id).await.unwrap().is_empty());

        let sent = h.notifier.messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("re-authorise"));
    }

    #[tokio::test]
    async fn test_delegated_wallet_stops_before_fee_estimate() {
        // Balance is over the threshold but below the fee
        let wallet = delegated_wallet_fixture(ChainKind::Ethereum, 1_000);
        let h = harness(
            MockAdapter::new(ChainKind::Ethereum, 21_000).with_balance(10_000),
            vec![wallet.clone()],
        );

        let err = h.executor.attempt(&wallet).await.unwrap_err();
        assert!(matches!(err, Error::Credential(_)));
        assert_eq!(h.adapter.fee_calls(), 0);
        assert_eq!(h.notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_delegated_reminder_is_not_repeated() {
        let wallet = delegated_wallet_fixture(ChainKind::Ethereum, 1_000);
        let h = harness(
            MockAdapter::new(ChainKind::Ethereum, 21_000).with_balance(50_000),
            vec![wallet.clone()],
        );

        for _ in 0..3 {
            assert!(h.executor.attempt(&wallet).await.is_err());
        }
        assert_eq!(h.notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_delegated_reminder_after_balance_drops_and_returns() {
        let wallet = delegated_wallet_fixture(ChainKind::Ethereum, 1_000);
        let h = harness(MockAdapter::new(ChainKind::Ethereum, 21_000), vec![wallet.clone()]);

        h.adapter.set_balance(5_000);
        assert!(h.executor.attempt(&wallet).await.is_err());
        h.adapter.set_balance(10);
        assert_eq!(
            h.executor.attempt(&wallet).await.unwrap(),
            AttemptOutcome::Skipped(SkipReason::BelowThreshold)
        );
        h.adapter.set_balance(5_000);
        assert!(h.executor.attempt(&wallet).await.is_err());

        assert_eq!(h.notifier.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_network_error_propagates_without_record() {
        let wallet = wallet_fixture(ChainKind::Bitcoin, 0);
        let h = harness(
            MockAdapter::new(ChainKind::Bitcoin, 2_500)
                .with_balance(100_000)
                .with_build_results(vec![Err(Error::Network("timeout".into()))]),
            vec![wallet.clone()],
        );

        let err = h.executor.attempt(&wallet).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(h.ledger.list_transactions_by_wallet(wallet.id).await.unwrap().is_empty());
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_failed_notification_does_not_fail_sweep() {
        let wallet = wallet_fixture(ChainKind::Tron, 0);
        let h = harness(
            MockAdapter::new(ChainKind::Tron, 100_000).with_balance(1_000_000),
            vec![wallet.clone()],
        );
        h.notifier.fail_deliveries(true);

        let outcome = h.executor.attempt(&wallet).await.unwrap();
        assert!(matches!(outcome, AttemptOutcome::Swept { .. }));
        assert_eq!(h.ledger.list_transactions_by_wallet(wallet.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_broadcast() {
        let wallet = wallet_fixture(ChainKind::Tron, 0);
        let mut h = harness(
            MockAdapter::new(ChainKind::Tron, 100_000).with_balance(1_000_000),
            vec![wallet.clone()],
        );
        h.executor = h.executor.with_dry_run(true);

        let outcome = h.executor.attempt(&wallet).await.unwrap();
        assert_eq!(outcome, AttemptOutcome::WouldSweep { amount: 900_000 });
        assert!(h.adapter.build_requests().is_empty());
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_tampered_address_is_rejected() {
        let mut wallet = wallet_fixture(ChainKind::Tron, 0);
        wallet.address = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".into();
        let h = harness(
            MockAdapter::new(ChainKind::Tron, 100_000).with_balance(1_000_000),
            vec![wallet.clone()],
        );

        let err = h.executor.attempt(&wallet).await.unwrap_err();
        assert!(matches!(err, Error::Credential(_)));
        assert!(h.adapter.build_requests().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_chain() {
        let wallet = wallet_fixture(ChainKind::Solana, 0);
        let h = harness(MockAdapter::new(ChainKind::Tron, 1), vec![wallet.clone()]);
        assert!(matches!(
            h.executor.attempt(&wallet).await,
            Err(Error::UnsupportedChain(_))
        ));
    }
}
