//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub tron: TronConfig,
    #[serde(default)]
    pub bitcoin: BitcoinConfig,
    #[serde(default = "EvmConfig::ethereum")]
    pub ethereum: EvmConfig,
    #[serde(default = "EvmConfig::bsc")]
    pub bsc: EvmConfig,
    #[serde(default)]
    pub solana: SolanaConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub setup: SetupConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            tron: TronConfig::default(),
            bitcoin: BitcoinConfig::default(),
            ethereum: EvmConfig::ethereum(),
            bsc: EvmConfig::bsc(),
            solana: SolanaConfig::default(),
            ledger: LedgerConfig::default(),
            notifier: NotifierConfig::default(),
            setup: SetupConfig::default(),
        }
    }
}

/// Sweep scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between ticks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Re-attempts after a transient failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay; the n-th retry waits `base * n`
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// How long in-flight attempts may run after shutdown is requested
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Tell the owner when an attempt gives up after max retries
    #[serde(default)]
    pub notify_on_give_up: bool,
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            notify_on_give_up: false,
        }
    }
}

/// TRON full node configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TronConfig {
    /// Full node HTTP API
    #[serde(default = "default_tron_api_url")]
    pub api_url: String,

    /// TronGrid API key (optional)
    #[serde(default = "default_tron_api_key")]
    pub api_key: String,

    /// Flat fee reserved per sweep, in sun
    #[serde(default = "default_tron_fee")]
    pub fixed_fee_sun: u64,

    /// Permission the sweep is signed under (2 = first active permission)
    #[serde(default = "default_permission_id")]
    pub permission_id: u32,

    /// Refuse to sweep accounts without owner/active permissions
    #[serde(default = "default_true")]
    pub require_multisig: bool,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TronConfig {
    fn default() -> Self {
        Self {
            api_url: default_tron_api_url(),
            api_key: default_tron_api_key(),
            fixed_fee_sun: default_tron_fee(),
            permission_id: default_permission_id(),
            require_multisig: true,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Bitcoin (Esplora) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BitcoinConfig {
    /// Esplora REST base URL
    #[serde(default = "default_esplora_url")]
    pub esplora_url: String,

    /// Size the fee is computed for
    #[serde(default = "default_tx_vbytes")]
    pub estimated_tx_vbytes: u64,

    /// Confirmation target looked up in `/fee-estimates`
    #[serde(default = "default_fee_target_blocks")]
    pub fee_target_blocks: u32,

    /// Fixed rate, skips the fee-estimates lookup when set
    #[serde(default)]
    pub fee_rate_sat_per_vbyte: Option<u64>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BitcoinConfig {
    fn default() -> Self {
        Self {
            esplora_url: default_esplora_url(),
            estimated_tx_vbytes: default_tx_vbytes(),
            fee_target_blocks: default_fee_target_blocks(),
            fee_rate_sat_per_vbyte: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// EVM JSON-RPC configuration (one per network)
#[derive(Debug, Clone, Deserialize)]
pub struct EvmConfig {
    pub rpc_url: String,

    /// EIP-155 chain id used when signing
    pub chain_id: u64,

    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl EvmConfig {
    pub fn ethereum() -> Self {
        Self {
            rpc_url: default_eth_rpc_url(),
            chain_id: 1,
            gas_limit: default_gas_limit(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn bsc() -> Self {
        Self {
            rpc_url: default_bsc_rpc_url(),
            chain_id: 56,
            gas_limit: default_gas_limit(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Solana RPC configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SolanaConfig {
    #[serde(default = "default_solana_rpc_url")]
    pub rpc_url: String,

    /// Flat fee reserved per sweep, in lamports
    #[serde(default = "default_solana_fee")]
    pub fixed_fee_lamports: u64,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_solana_rpc_url(),
            fixed_fee_lamports: default_solana_fee(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Ledger storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// JSON document holding wallets and transactions
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// Owner notification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Telegram bot token; notifications go to the log when empty
    #[serde(default = "default_telegram_token")]
    pub telegram_bot_token: String,

    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: default_telegram_token(),
            telegram_api_url: default_telegram_api_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Wallet setup conversation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SetupConfig {
    /// Idle sessions expire after this many seconds
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl SetupConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

// Default value functions
fn default_interval_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    10_000
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_true() -> bool {
    true
}

fn default_tron_api_url() -> String {
    std::env::var("TRON_API_URL").unwrap_or_else(|_| "https://api.trongrid.io".into())
}

fn default_tron_api_key() -> String {
    std::env::var("TRON_API_KEY").unwrap_or_default()
}

fn default_tron_fee() -> u64 {
    100_000
}

fn default_permission_id() -> u32 {
    2
}

fn default_esplora_url() -> String {
    std::env::var("ESPLORA_URL").unwrap_or_else(|_| "https://blockstream.info/api".into())
}

fn default_tx_vbytes() -> u64 {
    250
}

fn default_fee_target_blocks() -> u32 {
    6
}

fn default_eth_rpc_url() -> String {
    std::env::var("ETH_RPC_URL").unwrap_or_else(|_| "https://eth.llamarpc.com".into())
}

fn default_bsc_rpc_url() -> String {
    std::env::var("BSC_RPC_URL").unwrap_or_else(|_| "https://bsc-dataseed.binance.org".into())
}

fn default_gas_limit() -> u64 {
    21_000
}

fn default_solana_rpc_url() -> String {
    std::env::var("SOLANA_RPC_URL").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())
}

fn default_solana_fee() -> u64 {
    5_000
}

fn default_ledger_path() -> String {
    std::env::var("LEDGER_PATH").unwrap_or_else(|_| "sweeper-ledger.json".into())
}

fn default_telegram_token() -> String {
    std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".into()
}

fn default_session_ttl_secs() -> u64 {
    600
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Network sections need both fields even when only one is overridden
            .set_default("ethereum.rpc_url", default_eth_rpc_url())?
            .set_default("ethereum.chain_id", 1i64)?
            .set_default("bsc.rpc_url", default_bsc_rpc_url())?
            .set_default("bsc.chain_id", 56i64)?
            .set_default("scheduler.interval_secs", default_interval_secs() as i64)?
            .set_default("scheduler.max_retries", default_max_retries() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SWEEPER_)
            .add_source(
                config::Environment::with_prefix("SWEEPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.interval_secs == 0 {
            anyhow::bail!("scheduler.interval_secs must be positive");
        }

        if self.scheduler.max_retries == 0 {
            anyhow::bail!("scheduler.max_retries must be at least 1");
        }

        if self.scheduler.retry_base_delay_ms == 0 {
            anyhow::bail!("scheduler.retry_base_delay_ms must be positive");
        }

        // Validate endpoints
        for (name, value) in [
            ("tron.api_url", &self.tron.api_url),
            ("bitcoin.esplora_url", &self.bitcoin.esplora_url),
            ("ethereum.rpc_url", &self.ethereum.rpc_url),
            ("bsc.rpc_url", &self.bsc.rpc_url),
            ("solana.rpc_url", &self.solana.rpc_url),
            ("notifier.telegram_api_url", &self.notifier.telegram_api_url),
        ] {
            url::Url::parse(value).with_context(|| format!("Invalid {}: {}", name, value))?;
        }

        if self.bitcoin.estimated_tx_vbytes == 0 {
            anyhow::bail!("bitcoin.estimated_tx_vbytes must be positive");
        }

        if self.bitcoin.fee_target_blocks == 0 {
            anyhow::bail!("bitcoin.fee_target_blocks must be at least 1");
        }

        if self.bitcoin.fee_rate_sat_per_vbyte == Some(0) {
            anyhow::bail!("bitcoin.fee_rate_sat_per_vbyte cannot be 0");
        }

        for (name, evm) in [("ethereum", &self.ethereum), ("bsc", &self.bsc)] {
            if evm.gas_limit < 21_000 {
                anyhow::bail!("{}.gas_limit must be at least 21000", name);
            }
        }

        if self.ethereum.chain_id == self.bsc.chain_id {
            anyhow::bail!(
                "ethereum and bsc share chain id {}",
                self.ethereum.chain_id
            );
        }

        if self.setup.session_ttl_secs == 0 {
            anyhow::bail!("setup.session_ttl_secs must be positive");
        }

        if self.tron.fixed_fee_sun == 0 {
            tracing::warn!("tron.fixed_fee_sun is 0 - sweeps may fail for lack of bandwidth");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Scheduler:
    interval: {}s
    max_retries: {}
    retry_base_delay: {}ms
    shutdown_grace: {}s
    notify_on_give_up: {}
  TRON:
    api_url: {}
    api_key: {}
    fixed_fee: {} sun
    permission_id: {}
    require_multisig: {}
  Bitcoin:
    esplora_url: {}
    estimated_tx_vbytes: {}
    fee: {}
  Ethereum:
    rpc_url: {}
    chain_id: {}
  BSC:
    rpc_url: {}
    chain_id: {}
  Solana:
    rpc_url: {}
    fixed_fee: {} lamports
  Ledger:
    path: {}
  Notifier:
    telegram_bot_token: {}
  Setup:
    session_ttl: {}s
"#,
            self.scheduler.interval_secs,
            self.scheduler.max_retries,
            self.scheduler.retry_base_delay_ms,
            self.scheduler.shutdown_grace_secs,
            self.scheduler.notify_on_give_up,
            mask_url(&self.tron.api_url),
            mask_secret(&self.tron.api_key),
            self.tron.fixed_fee_sun,
            self.tron.permission_id,
            self.tron.require_multisig,
            mask_url(&self.bitcoin.esplora_url),
            self.bitcoin.estimated_tx_vbytes,
            match self.bitcoin.fee_rate_sat_per_vbyte {
                Some(rate) => format!("{} sat/vB (fixed)", rate),
                None => format!("estimated for {} blocks", self.bitcoin.fee_target_blocks),
            },
            mask_url(&self.ethereum.rpc_url),
            self.ethereum.chain_id,
            mask_url(&self.bsc.rpc_url),
            self.bsc.chain_id,
            mask_url(&self.solana.rpc_url),
            self.solana.fixed_fee_lamports,
            self.ledger.path,
            mask_secret(&self.notifier.telegram_bot_token),
            self.setup.session_ttl_secs,
        )
    }
}

fn mask_secret(value: &str) -> &'static str {
    if value.is_empty() {
        "(not set)"
    } else {
        "***"
    }
}

/// Mask URL for display (hide API keys in query params and key-like path segments)
fn mask_url(url: &str) -> String {
    let (base, query) = match url.find('?') {
        Some(idx) => (&url[..idx], true),
        None => (url, false),
    };

    let mut masked = match base.rsplit_once('/') {
        Some((head, last)) if last.len() >= 20 && last.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') => {
            format!("{}/***", head)
        }
        _ => base.to_string(),
    };

    if query {
        masked.push_str("?***");
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scheduler.interval_secs, 60);
        assert_eq!(config.scheduler.max_retries, 3);
        assert_eq!(config.tron.fixed_fee_sun, 100_000);
        assert_eq!(config.tron.permission_id, 2);
        assert_eq!(config.ethereum.chain_id, 1);
        assert_eq!(config.bsc.chain_id, 56);
        assert_eq!(config.solana.fixed_fee_lamports, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[scheduler]
interval_secs = 15
max_retries = 5

[bsc]
rpc_url = "https://bsc.example.org"

[bitcoin]
fee_rate_sat_per_vbyte = 12
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.scheduler.interval_secs, 15);
        assert_eq!(config.scheduler.max_retries, 5);
        assert_eq!(config.bsc.rpc_url, "https://bsc.example.org");
        assert_eq!(config.bsc.chain_id, 56);
        assert_eq!(config.bitcoin.fee_rate_sat_per_vbyte, Some(12));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.scheduler.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.max_retries = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.solana.rpc_url = "not a url".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.bsc.chain_id = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://api.example.com?key=secret"),
            "https://api.example.com?***"
        );
        assert_eq!(
            mask_url("https://mainnet.infura.io/v3/0123456789abcdef0123456789abcdef"),
            "https://mainnet.infura.io/v3/***"
        );
        assert_eq!(mask_url("https://api.example.com"), "https://api.example.com");
    }

    #[test]
    fn test_masked_display_hides_tokens() {
        let mut config = Config::default();
        config.notifier.telegram_bot_token = "123456:ABCDEF".into();
        config.tron.api_key = "trongrid-key".into();

        let shown = config.masked_display();
        assert!(!shown.contains("123456:ABCDEF"));
        assert!(!shown.contains("trongrid-key"));
        assert!(shown.contains("***"));
    }
}
