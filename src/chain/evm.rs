//! EVM adapter (Ethereum, BNB Smart Chain)
//!
//! Balance, gas price and nonce come from an alloy HTTP provider;
//! transactions are signed locally as EIP-155 legacy transfers and submitted
//! raw.

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{Ethereum, TxSignerSync};
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::client::RpcClient;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::Http;
use alloy::transports::{RpcError, TransportError, TransportErrorKind};
use async_trait::async_trait;
use reqwest::StatusCode;
use secp256k1::SecretKey;
use tracing::{debug, info};

use super::rpc::{http_client, is_transient_message, status_error};
use super::{Amount, BroadcastReceipt, ChainAdapter, ChainKind, FeeContext, FeeQuote, SweepRequest};
use crate::config::EvmConfig;
use crate::error::{Error, Result};
use crate::wallet::Signer;

/// Check a `0x` address; mixed-case input must carry a valid EIP-55 checksum
pub fn validate_address(address: &str) -> Result<()> {
    let address = address.trim();
    let hex_part = address
        .strip_prefix("0x")
        .ok_or_else(|| Error::InvalidAddress(format!("{}: missing 0x prefix", address)))?;

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidAddress(format!("{}: expected 40 hex characters", address)));
    }

    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        Address::parse_checksummed(address, None)
            .map_err(|_| Error::InvalidAddress(format!("{}: bad checksum", address)))?;
    }

    Ok(())
}

fn local_signer(secret: &SecretKey) -> Result<PrivateKeySigner> {
    PrivateKeySigner::from_slice(&secret.secret_bytes())
        .map_err(|e| Error::Credential(format!("Invalid EVM key: {}", e)))
}

/// EIP-55 checksummed address of a key
pub fn address_from_secret(secret: &SecretKey) -> Result<String> {
    Ok(local_signer(secret)?.address().to_checksum(None))
}

/// Classify a provider error for the retry controller
fn rpc_error(error: TransportError) -> Error {
    match error {
        RpcError::ErrorResp(payload) => {
            let message = format!("RPC error {}: {}", payload.code, payload.message);
            // -32005 is the de-facto "limit exceeded" code
            if payload.code == -32005 || is_transient_message(&payload.message) {
                Error::rejected_transient(message)
            } else {
                Error::rejected(message)
            }
        }
        RpcError::Transport(TransportErrorKind::HttpError(http)) => {
            match StatusCode::from_u16(http.status) {
                Ok(status) => status_error(status, &http.body),
                Err(_) => Error::Network(format!("HTTP {}: {}", http.status, http.body)),
            }
        }
        RpcError::Transport(kind) => Error::Network(kind.to_string()),
        other => Error::Serialization(format!("Unexpected RPC response: {}", other)),
    }
}

/// Fee reserved for a transfer: `gas_price * gas_limit`
fn fee_total(gas_price: u128, gas_limit: u64) -> Result<Amount> {
    gas_price.checked_mul(gas_limit as u128).ok_or_else(|| {
        Error::Serialization(format!(
            "Gas price {} times gas limit {} overflows",
            gas_price, gas_limit
        ))
    })
}

fn parse_address(address: &str) -> Result<Address> {
    validate_address(address)?;
    address
        .trim()
        .parse()
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))
}

/// Provider-backed adapter for one EVM network
pub struct EvmAdapter {
    chain: ChainKind,
    config: EvmConfig,
    provider: DynProvider<Ethereum>,
}

impl EvmAdapter {
    /// Create an adapter for `chain` (Ethereum or BSC)
    pub fn new(chain: ChainKind, config: EvmConfig) -> Result<Self> {
        if chain.family() != super::ChainFamily::Evm {
            return Err(Error::UnsupportedChain(format!("{} is not an EVM chain", chain)));
        }

        let url = url::Url::parse(&config.rpc_url)
            .map_err(|e| Error::Config(format!("Invalid RPC URL {}: {}", config.rpc_url, e)))?;
        let transport = Http::with_client(http_client(config.timeout_ms)?, url);
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_client(RpcClient::new(transport, false))
            .erased();

        info!(
            "{} adapter initialized (chain id {}) for {}",
            chain, config.chain_id, config.rpc_url
        );
        Ok(Self {
            chain,
            config,
            provider,
        })
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider.get_gas_price().await.map_err(rpc_error)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(rpc_error)
    }

    fn sign_transfer(
        &self,
        signer: &PrivateKeySigner,
        to: Address,
        amount: Amount,
        gas_price: u128,
        nonce: u64,
    ) -> Result<Vec<u8>> {
        let mut tx = TxLegacy {
            chain_id: Some(self.config.chain_id),
            nonce,
            gas_price,
            gas_limit: self.config.gas_limit,
            to: TxKind::Call(to),
            value: U256::from(amount),
            input: Bytes::new(),
        };

        let signature = signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| Error::Internal(format!("Failed to sign transaction: {}", e)))?;
        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        Ok(envelope.encoded_2718())
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain(&self) -> ChainKind {
        self.chain
    }

    async fn get_balance(&self, address: &str) -> Result<Amount> {
        let balance = self
            .provider
            .get_balance(parse_address(address)?)
            .await
            .map_err(rpc_error)?;
        u128::try_from(balance)
            .map_err(|_| Error::Serialization(format!("Balance of {} does not fit u128", address)))
    }

    async fn estimate_fee(&self, _ctx: &FeeContext<'_>) -> Result<FeeQuote> {
        let gas_price = self.gas_price().await?;
        Ok(FeeQuote {
            total: fee_total(gas_price, self.config.gas_limit)?,
            unit_price: Some(gas_price),
        })
    }

    async fn build_sign_broadcast(
        &self,
        signer: &Signer,
        request: &SweepRequest,
    ) -> Result<BroadcastReceipt> {
        let local = local_signer(signer.secp256k1()?)?;
        if !local
            .address()
            .to_checksum(None)
            .eq_ignore_ascii_case(request.source.trim())
        {
            return Err(Error::Credential(format!(
                "Key does not control {}",
                request.source
            )));
        }

        let to = parse_address(&request.destination)?;

        if request.amount == 0 {
            return Err(Error::InsufficientFunds {
                available: 0,
                fee: request.fee.total,
            });
        }

        // Use the exact price the amount was computed with
        let gas_price = match request.fee.unit_price {
            Some(price) => price,
            None => self.gas_price().await?,
        };
        let nonce = self.pending_nonce(local.address()).await?;
        debug!("{} nonce {} gas price {}", request.source, nonce, gas_price);

        let raw = self.sign_transfer(&local, to, request.amount, gas_price, nonce)?;
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(rpc_error)?;
        let tx_hash = pending.tx_hash().to_string();

        info!(
            "{} sweep broadcast: {} wei from {} to {} (tx: {})",
            self.chain, request.amount, request.source, request.destination, tx_hash
        );

        Ok(BroadcastReceipt { tx_hash })
    }
}
