//! # Chain Adapters
//!
//! Chain-agnostic interface over the ledgers the sweeper supports. Each
//! ledger family has its own adapter implementing [`ChainAdapter`]; the
//! scheduler only ever talks to the trait through [`AdapterRegistry`].
//!
//! ## Supported families
//!
//! - **TRON** - account model with multi-signature permissions
//! - **Bitcoin** - UTXO model, Esplora HTTP API
//! - **EVM** - Ethereum and BNB Smart Chain, JSON-RPC
//! - **Solana** - single-signature account model

pub mod bitcoin;
pub mod evm;
pub mod registry;
pub mod rpc;
pub mod solana;
pub mod tron;
pub mod utxo;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::wallet::Signer;

pub use registry::AdapterRegistry;

/// Amount in the chain's minor unit (sun, satoshi, wei, lamport)
pub type Amount = u128;

// ============================================================================
// Chain identifiers
// ============================================================================

/// Closed set of ledgers the engine can sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Tron,
    Bitcoin,
    Ethereum,
    Bsc,
    Solana,
}

/// Ledger family, decides which adapter and key scheme apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFamily {
    /// Account model with owner/active permission sets
    AccountMultisig,
    /// Unspent-output model
    Utxo,
    /// EVM account model
    Evm,
    /// Single-signature account model (ed25519)
    SingleSig,
}

impl ChainKind {
    /// All supported chains
    pub const ALL: [ChainKind; 5] = [
        ChainKind::Tron,
        ChainKind::Bitcoin,
        ChainKind::Ethereum,
        ChainKind::Bsc,
        ChainKind::Solana,
    ];

    pub fn family(&self) -> ChainFamily {
        match self {
            ChainKind::Tron => ChainFamily::AccountMultisig,
            ChainKind::Bitcoin => ChainFamily::Utxo,
            ChainKind::Ethereum | ChainKind::Bsc => ChainFamily::Evm,
            ChainKind::Solana => ChainFamily::SingleSig,
        }
    }

    /// Native currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            ChainKind::Tron => "TRX",
            ChainKind::Bitcoin => "BTC",
            ChainKind::Ethereum => "ETH",
            ChainKind::Bsc => "BNB",
            ChainKind::Solana => "SOL",
        }
    }

    /// Decimals of the native currency
    pub fn decimals(&self) -> u8 {
        match self {
            ChainKind::Tron => 6,
            ChainKind::Bitcoin => 8,
            ChainKind::Ethereum | ChainKind::Bsc => 18,
            ChainKind::Solana => 9,
        }
    }

    /// Explorer link for a transaction
    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        match self {
            ChainKind::Tron => format!("https://tronscan.org/#/transaction/{}", tx_hash),
            ChainKind::Bitcoin => format!("https://mempool.space/tx/{}", tx_hash),
            ChainKind::Ethereum => format!("https://etherscan.io/tx/{}", tx_hash),
            ChainKind::Bsc => format!("https://bscscan.com/tx/{}", tx_hash),
            ChainKind::Solana => format!("https://solscan.io/tx/{}", tx_hash),
        }
    }

    /// Check an address against this chain's format
    pub fn validate_address(&self, address: &str) -> Result<()> {
        match self.family() {
            ChainFamily::AccountMultisig => tron::validate_address(address),
            ChainFamily::Utxo => bitcoin::validate_address(address),
            ChainFamily::Evm => evm::validate_address(address),
            ChainFamily::SingleSig => solana::validate_address(address),
        }
    }

    /// Map the chain id reported by the pairing flow
    ///
    /// Accepts EVM numeric ids (`1`, `56`, `eip155:1`) and chain names.
    pub fn from_pairing_chain_id(chain_id: &str) -> Result<Self> {
        let id = chain_id.trim();
        let id = id.strip_prefix("eip155:").unwrap_or(id);

        match id {
            "1" | "0x1" => Ok(ChainKind::Ethereum),
            "56" | "0x38" => Ok(ChainKind::Bsc),
            other => other.parse(),
        }
    }

    /// Format a minor-unit amount in major units
    pub fn format_amount(&self, amount: Amount) -> String {
        format!("{} {}", format_units(amount, self.decimals()), self.symbol())
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::Tron => write!(f, "tron"),
            ChainKind::Bitcoin => write!(f, "bitcoin"),
            ChainKind::Ethereum => write!(f, "ethereum"),
            ChainKind::Bsc => write!(f, "bsc"),
            ChainKind::Solana => write!(f, "solana"),
        }
    }
}

impl FromStr for ChainKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tron" | "trx" => Ok(ChainKind::Tron),
            "bitcoin" | "btc" => Ok(ChainKind::Bitcoin),
            "ethereum" | "eth" => Ok(ChainKind::Ethereum),
            "bsc" | "bnb" => Ok(ChainKind::Bsc),
            "solana" | "sol" => Ok(ChainKind::Solana),
            other => Err(Error::UnsupportedChain(other.to_string())),
        }
    }
}

/// Format a raw amount with decimals, trimming trailing zeros
pub fn format_units(amount: Amount, decimals: u8) -> String {
    if amount == 0 {
        return "0".to_string();
    }

    let divisor = 10u128.pow(decimals as u32);
    let whole = amount / divisor;
    let fraction = amount % divisor;

    if fraction == 0 {
        whole.to_string()
    } else {
        let fraction_str = format!("{:0>width$}", fraction, width = decimals as usize);
        format!("{}.{}", whole, fraction_str.trim_end_matches('0'))
    }
}

/// Parse a major-unit decimal ("1.5") into minor units
pub fn parse_units(value: &str, decimals: u8) -> Result<Amount> {
    let value = value.trim();
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));

    let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !digits_only(whole) || !digits_only(fraction) {
        return Err(Error::Config(format!("Invalid amount: {:?}", value)));
    }
    if fraction.len() > decimals as usize {
        return Err(Error::Config(format!(
            "Amount {} has more than {} decimals",
            value, decimals
        )));
    }

    let padded = format!("{}{:0<width$}", whole, fraction, width = decimals as usize);
    let padded = padded.trim_start_matches('0');
    if padded.is_empty() {
        return Ok(0);
    }
    padded
        .parse::<Amount>()
        .map_err(|e| Error::Config(format!("Invalid amount {}: {}", value, e)))
}

// ============================================================================
// Adapter request / response types
// ============================================================================

/// Input to fee estimation
#[derive(Debug, Clone, Copy)]
pub struct FeeContext<'a> {
    /// Address the sweep spends from
    pub source: &'a str,
    /// Balance observed for this attempt
    pub balance: Amount,
}

/// Fee estimate for one sweep transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    /// Total fee in minor units
    pub total: Amount,
    /// Per-unit price the estimate was based on (gas price, sat/vB)
    pub unit_price: Option<u128>,
}

impl FeeQuote {
    /// A flat fee with no unit price
    pub fn fixed(total: Amount) -> Self {
        Self {
            total,
            unit_price: None,
        }
    }
}

/// Everything an adapter needs to build one sweep transaction
#[derive(Debug, Clone)]
pub struct SweepRequest {
    pub source: String,
    pub destination: String,
    /// Amount the destination receives
    pub amount: Amount,
    /// Fee quote the amount was computed with
    pub fee: FeeQuote,
}

/// Result of a successful broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReceipt {
    pub tx_hash: String,
}

// ============================================================================
// Chain Adapter Trait
// ============================================================================

/// Per-ledger capability interface
///
/// Implementations classify their failures through [`Error`]: connectivity
/// problems surface as [`Error::Network`], malformed addresses as
/// [`Error::InvalidAddress`], node refusals as [`Error::BroadcastRejected`].
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Chain served by this adapter
    fn chain(&self) -> ChainKind;

    /// Check that an address is valid on this chain
    fn validate_address(&self, address: &str) -> Result<()> {
        self.chain().validate_address(address)
    }

    /// Native balance in minor units
    async fn get_balance(&self, address: &str) -> Result<Amount>;

    /// Fee for a sweep out of `ctx.source`
    async fn estimate_fee(&self, ctx: &FeeContext<'_>) -> Result<FeeQuote>;

    /// Construct, sign and broadcast a sweep transaction
    async fn build_sign_broadcast(
        &self,
        signer: &Signer,
        request: &SweepRequest,
    ) -> Result<BroadcastReceipt>;

    /// Explorer link for a transaction
    fn explorer_tx_url(&self, tx_hash: &str) -> String {
        self.chain().explorer_tx_url(tx_hash)
    }
}
