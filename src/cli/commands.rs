//! CLI command implementations

use anyhow::{Context, Result};
use dialoguer::Password;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chain::{AdapterRegistry, ChainKind};
use crate::config::Config;
use crate::ledger::{JsonFileLedger, Ledger};
use crate::notify;
use crate::setup::{SetupSession, SetupStep};
use crate::sweep::{Scheduler, SweepExecutor};
use crate::wallet::{CredentialKind, CredentialResolver, OwnerId, WalletId};

async fn open_ledger(config: &Config) -> Result<Arc<dyn Ledger>> {
    let ledger = JsonFileLedger::open(&config.ledger.path)
        .await
        .with_context(|| format!("Failed to open ledger {}", config.ledger.path))?;
    Ok(Arc::new(ledger))
}

/// Run the sweep scheduler
pub async fn start(config: &Config, once: bool, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - nothing will be signed or broadcast");
    }

    info!("Starting sweeper...");
    let ledger = open_ledger(config).await?;
    let registry = AdapterRegistry::from_config(config).context("Failed to build chain adapters")?;
    let notifier = notify::from_config(&config.notifier).context("Failed to build notifier")?;

    info!(
        "Chains: {}",
        registry
            .chains()
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let executor = Arc::new(SweepExecutor::new(registry, ledger, notifier).with_dry_run(dry_run));
    let scheduler = Scheduler::new(executor, &config.scheduler);

    if once {
        let summary = scheduler.run_once().await?;
        info!("Single pass complete: {} wallets checked", summary.launched);
        return Ok(());
    }

    let token = scheduler.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });

    scheduler.run().await?;
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Show configuration with secrets masked
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// List monitored wallets
pub async fn wallet_list(config: &Config, owner: Option<OwnerId>) -> Result<()> {
    let ledger = open_ledger(config).await?;
    let wallets = match owner {
        Some(owner_id) => ledger.list_wallets_by_owner(owner_id).await?,
        None => ledger.list_wallets().await?,
    };

    println!("\n=== MONITORED WALLETS ===\n");
    println!(
        "{:<36} {:<10} {:<10} {:<12} {:<44} {}",
        "ID", "OWNER", "CHAIN", "KIND", "ADDRESS", "THRESHOLD"
    );
    println!("{}", "-".repeat(130));

    for wallet in &wallets {
        println!(
            "{:<36} {:<10} {:<10} {:<12} {:<44} {}",
            wallet.id,
            wallet.owner_id,
            wallet.chain.to_string(),
            wallet.credential_kind.to_string(),
            wallet.address,
            wallet.chain.format_amount(wallet.threshold)
        );
    }

    println!("\n{} wallet(s)\n", wallets.len());
    Ok(())
}

/// Register a wallet backed by a private key or seed phrase
pub async fn wallet_add(
    config: &Config,
    owner: OwnerId,
    chain: &str,
    kind: &str,
    receiver: &str,
    threshold: &str,
    credential_env: Option<String>,
) -> Result<()> {
    let resolver = CredentialResolver::new();
    let mut session = SetupSession::new(owner, config.setup.session_ttl());

    session.advance(chain, &resolver)?;
    session.advance(kind, &resolver)?;
    if session.credential_kind == Some(CredentialKind::Delegated) {
        anyhow::bail!("Delegated wallets are registered with `wallet pair`");
    }

    let credential = match credential_env {
        Some(var) => std::env::var(&var)
            .with_context(|| format!("Environment variable {} is not set", var))?,
        None => Password::new()
            .with_prompt(session.prompt())
            .interact()
            .context("Failed to read credential")?,
    };

    session.advance(&credential, &resolver)?;
    session.advance(receiver, &resolver)?;
    session.advance(threshold, &resolver)?;

    save_session(config, session).await
}

/// Register a wallet from a pairing result
pub async fn wallet_pair(
    config: &Config,
    owner: OwnerId,
    chain_id: &str,
    address: &str,
    receiver: &str,
    threshold: &str,
) -> Result<()> {
    let resolver = CredentialResolver::new();
    let chain = ChainKind::from_pairing_chain_id(chain_id)?;
    let mut session = SetupSession::new(owner, config.setup.session_ttl());

    session.advance(&chain.to_string(), &resolver)?;
    session.advance("delegated", &resolver)?;
    session.pair(address, chain, &resolver)?;
    session.advance(receiver, &resolver)?;
    session.advance(threshold, &resolver)?;

    save_session(config, session).await?;
    warn!("Delegated wallets are never swept automatically; the owner is asked to act instead");
    Ok(())
}

async fn save_session(config: &Config, session: SetupSession) -> Result<()> {
    if session.step != SetupStep::Done {
        anyhow::bail!("Wallet setup incomplete (stopped at {:?})", session.step);
    }

    let wallet = session.into_wallet()?;
    let ledger = open_ledger(config).await?;
    ledger.insert_wallet(wallet.clone()).await?;

    println!("Wallet added successfully!");
    println!("ID:       {}", wallet.id);
    println!("Chain:    {}", wallet.chain);
    println!("Address:  {}", wallet.address);
    println!("Receiver: {}", wallet.receiver_address);
    println!("Sweeps at {}", wallet.chain.format_amount(wallet.threshold));
    Ok(())
}

fn parse_wallet_id(id: &str) -> Result<WalletId> {
    Uuid::parse_str(id.trim()).with_context(|| format!("Invalid wallet id: {}", id))
}

/// Remove a wallet and its history
pub async fn wallet_remove(config: &Config, id: &str, force: bool) -> Result<()> {
    let id = parse_wallet_id(id)?;
    let ledger = open_ledger(config).await?;

    let Some(wallet) = ledger.get_wallet(id).await? else {
        anyhow::bail!("Wallet {} not found", id);
    };

    if !force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Stop monitoring {} wallet {}?",
                wallet.chain, wallet.address
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let removed_records = ledger.delete_transactions_by_wallet(id).await?;
    ledger.delete_wallet(id).await?;
    info!(wallet_id = %id, "Wallet removed ({} history records)", removed_records);
    println!("Wallet {} removed.", id);
    Ok(())
}

/// Show the current balance of one wallet
pub async fn wallet_balance(config: &Config, id: &str) -> Result<()> {
    let id = parse_wallet_id(id)?;
    let ledger = open_ledger(config).await?;
    let wallet = ledger
        .get_wallet(id)
        .await?
        .with_context(|| format!("Wallet {} not found", id))?;

    let registry = AdapterRegistry::from_config(config)?;
    let balance = registry.get(wallet.chain)?.get_balance(&wallet.address).await?;

    println!("{}", crate::notify::messages::balance(&wallet, balance));
    Ok(())
}

/// Show sweep history for one wallet
pub async fn history(config: &Config, id: &str, limit: usize) -> Result<()> {
    let id = parse_wallet_id(id)?;
    let ledger = open_ledger(config).await?;
    let wallet = ledger
        .get_wallet(id)
        .await?
        .with_context(|| format!("Wallet {} not found", id))?;

    let mut records = ledger.list_transactions_by_wallet(id).await?;
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    println!("\n=== SWEEP HISTORY: {} ===\n", wallet.address);
    if records.is_empty() {
        println!("No sweeps recorded.\n");
        return Ok(());
    }

    println!("{:<20} {:<10} {:<24} {}", "TIME", "STATUS", "AMOUNT", "TX");
    println!("{}", "-".repeat(110));
    for record in records.iter().take(limit) {
        println!(
            "{:<20} {:<10} {:<24} {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            record.status.to_string(),
            record.chain.format_amount(record.amount),
            record.tx_hash.as_deref().unwrap_or("-")
        );
    }
    println!();
    Ok(())
}
