//! Periodic sweep driver
//!
//! Each tick loads every wallet from the ledger and spawns one task per
//! wallet that has no attempt in flight. A wallet's attempt context lives in
//! the shared map for exactly as long as its task runs, which is what keeps
//! two attempts for the same wallet from overlapping.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::executor::{AttemptOutcome, SweepExecutor};
use super::retry::{AttemptContext, FailureKind, RetryDirective, RetryPolicy};
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::notify::messages;
use crate::wallet::{Wallet, WalletId};

/// Counts for one tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub launched: usize,
    pub in_flight: usize,
}

/// Sweep scheduler
#[derive(Clone)]
pub struct Scheduler {
    executor: Arc<SweepExecutor>,
    contexts: Arc<DashMap<WalletId, AttemptContext>>,
    policy: RetryPolicy,
    interval: Duration,
    shutdown_grace: Duration,
    notify_on_give_up: bool,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(executor: Arc<SweepExecutor>, config: &SchedulerConfig) -> Self {
        Self {
            executor,
            contexts: Arc::new(DashMap::new()),
            policy: RetryPolicy::new(config.max_retries, config.retry_base_delay()),
            interval: config.interval(),
            shutdown_grace: config.shutdown_grace(),
            notify_on_give_up: config.notify_on_give_up,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the scheduler when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Snapshot of a wallet's in-flight attempt
    pub fn attempt_context(&self, wallet_id: &WalletId) -> Option<AttemptContext> {
        self.contexts.get(wallet_id).map(|c| c.clone())
    }

    pub fn in_flight(&self) -> usize {
        self.contexts.len()
    }

    /// Tick until shutdown, then drain in-flight attempts
    pub async fn run(&self) -> Result<()> {
        info!(
            "Scheduler started (interval {}s, max retries {})",
            self.interval.as_secs(),
            self.policy.max_retries
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(&mut tasks).await {
                        error!("Tick failed: {}", e);
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Sweep task ended abnormally: {}", e);
                    }
                }
            }
        }

        self.drain(tasks).await;
        info!("Scheduler stopped");
        Ok(())
    }

    /// One tick, waiting for every attempt it launched
    pub async fn run_once(&self) -> Result<TickSummary> {
        let mut tasks = JoinSet::new();
        let summary = self.tick(&mut tasks).await?;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Sweep task ended abnormally: {}", e);
            }
        }
        Ok(summary)
    }

    /// Launch attempts for every wallet without one in flight
    pub async fn tick(&self, tasks: &mut JoinSet<()>) -> Result<TickSummary> {
        let wallets = self.executor.ledger().list_wallets().await?;
        let mut summary = TickSummary::default();

        for wallet in wallets {
            match self.contexts.entry(wallet.id) {
                Entry::Occupied(_) => {
                    debug!(wallet_id = %wallet.id, "Attempt already in flight, skipping");
                    summary.in_flight += 1;
                }
                Entry::Vacant(slot) => {
                    slot.insert(AttemptContext::new(wallet.id));
                    let scheduler = self.clone();
                    tasks.spawn(async move { scheduler.run_wallet(wallet).await });
                    summary.launched += 1;
                }
            }
        }

        debug!(
            "Tick: {} attempts launched, {} in flight",
            summary.launched, summary.in_flight
        );
        Ok(summary)
    }

    async fn run_wallet(&self, mut wallet: Wallet) {
        let wallet_id = wallet.id;

        loop {
            if let Some(mut ctx) = self.contexts.get_mut(&wallet_id) {
                ctx.begin();
            }

            let result = self.executor.attempt(&wallet).await;

            let error = match result {
                Ok(outcome) => {
                    if let Some(mut ctx) = self.contexts.get_mut(&wallet_id) {
                        ctx.succeed();
                    }
                    if let AttemptOutcome::Swept { amount, tx_hash } = &outcome {
                        debug!(wallet_id = %wallet_id, amount = *amount, tx_hash = %tx_hash, "Attempt succeeded");
                    }
                    break;
                }
                Err(e) => e,
            };

            let (directive, attempts) = match self.contexts.get_mut(&wallet_id) {
                Some(mut ctx) => {
                    let directive = ctx.fail(&error, &self.policy, Instant::now());
                    (directive, ctx.attempts())
                }
                None => break,
            };

            match directive {
                RetryDirective::RetryAfter(delay) => {
                    warn!(
                        wallet_id = %wallet_id,
                        chain = %wallet.chain,
                        "Transient failure ({}), retrying in {}s",
                        error,
                        delay.as_secs_f64()
                    );

                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            info!(wallet_id = %wallet_id, "Retry cancelled by shutdown");
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    match self.executor.ledger().get_wallet(wallet_id).await {
                        Ok(Some(latest)) => wallet = latest,
                        Ok(None) => {
                            info!(wallet_id = %wallet_id, "Wallet removed, dropping retry");
                            break;
                        }
                        Err(e) => warn!(wallet_id = %wallet_id, "Could not reload wallet: {}", e),
                    }
                }
                RetryDirective::Stop(FailureKind::MaxRetriesReached) => {
                    warn!(
                        wallet_id = %wallet_id,
                        chain = %wallet.chain,
                        "Gave up after {} attempts: {}",
                        attempts,
                        error
                    );
                    if self.notify_on_give_up {
                        self.executor
                            .notify_best_effort(
                                wallet.owner_id,
                                &messages::gave_up(&wallet, attempts, &error.to_string()),
                            )
                            .await;
                    }
                    break;
                }
                RetryDirective::Stop(_) => {
                    error!(
                        wallet_id = %wallet_id,
                        chain = %wallet.chain,
                        "Sweep failed: {}",
                        error
                    );
                    break;
                }
            }
        }

        self.contexts.remove(&wallet_id);
    }

    async fn drain(&self, mut tasks: JoinSet<()>) {
        if tasks.is_empty() {
            return;
        }

        info!(
            "Waiting up to {}s for {} in-flight attempts",
            self.shutdown_grace.as_secs(),
            tasks.len()
        );

        let finished = tokio::time::timeout(self.shutdown_grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!("Sweep task ended abnormally: {}", e);
                }
            }
        })
        .await;

        if finished.is_err() {
            warn!(
                "Abandoning {} attempts still running after the grace period",
                tasks.len()
            );
            tasks.detach_all();
        }
    }
}
