//! Chain Sweeper - forwards funds from monitored custodial wallets
//!
//! # WARNING
//! - The sweeper signs with the private keys it stores. Protect the ledger file.
//! - A sweep sends the whole balance minus fees. Double-check receiver addresses.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use chain_sweeper::cli::commands;
use chain_sweeper::config::Config;

/// Chain Sweeper - multi-chain custodial wallet sweeper
#[derive(Parser)]
#[command(name = "sweeper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sweep scheduler
    Start {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,

        /// Log decisions without signing or broadcasting
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Wallet management commands
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },

    /// Show sweep history of a wallet
    History {
        /// Wallet ID
        wallet_id: String,

        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum WalletAction {
    /// List monitored wallets
    List {
        /// Only wallets of this owner
        #[arg(long)]
        owner: Option<i64>,
    },

    /// Add a wallet backed by a private key or seed phrase
    Add {
        /// Owner (chat) id to notify
        #[arg(long)]
        owner: i64,

        /// Chain: tron, bitcoin, ethereum, bsc, solana
        #[arg(long)]
        chain: String,

        /// Credential kind: private_key or mnemonic
        #[arg(long, default_value = "private_key")]
        kind: String,

        /// Address that receives swept funds
        #[arg(long)]
        receiver: String,

        /// Sweep threshold in whole coins (0 = any balance)
        #[arg(long, default_value = "0")]
        threshold: String,

        /// Read the credential from this environment variable instead of prompting
        #[arg(long, value_name = "VAR")]
        credential_env: Option<String>,
    },

    /// Add a delegated wallet from a pairing result
    Pair {
        /// Owner (chat) id to notify
        #[arg(long)]
        owner: i64,

        /// Chain id reported by the wallet app (1, 56, eip155:1, tron, ...)
        #[arg(long)]
        chain_id: String,

        /// Paired address
        #[arg(long)]
        address: String,

        /// Address that should receive funds
        #[arg(long)]
        receiver: String,

        /// Balance that triggers a re-authorisation request (whole coins)
        #[arg(long, default_value = "0")]
        threshold: String,
    },

    /// Remove a wallet and its history
    Remove {
        /// Wallet ID
        wallet_id: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Show the current balance of a wallet
    Balance {
        /// Wallet ID
        wallet_id: String,
    },
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("chain_sweeper=info".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.json_logs)?;

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration loaded from {}", cli.config);

    // Execute command
    let result = match cli.command {
        Commands::Start { once, dry_run } => commands::start(&config, once, dry_run).await,
        Commands::Config => commands::show_config(&config),
        Commands::Wallet { action } => match action {
            WalletAction::List { owner } => commands::wallet_list(&config, owner).await,
            WalletAction::Add {
                owner,
                chain,
                kind,
                receiver,
                threshold,
                credential_env,
            } => {
                commands::wallet_add(
                    &config,
                    owner,
                    &chain,
                    &kind,
                    &receiver,
                    &threshold,
                    credential_env,
                )
                .await
            }
            WalletAction::Pair {
                owner,
                chain_id,
                address,
                receiver,
                threshold,
            } => {
                commands::wallet_pair(&config, owner, &chain_id, &address, &receiver, &threshold)
                    .await
            }
            WalletAction::Remove { wallet_id, force } => {
                commands::wallet_remove(&config, &wallet_id, force).await
            }
            WalletAction::Balance { wallet_id } => {
                commands::wallet_balance(&config, &wallet_id).await
            }
        },
        Commands::History { wallet_id, limit } => {
            commands::history(&config, &wallet_id, limit).await
        }
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
