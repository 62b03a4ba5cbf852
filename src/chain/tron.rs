//! TRON adapter
//!
//! Account-model ledger with owner/active permission sets. Sweeps are created
//! through the full node HTTP API with an explicit `Permission_id`, co-signed
//! locally with the resolved key and broadcast back to the node.

use async_trait::async_trait;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use tracing::{debug, info, warn};

use super::rpc::{ensure_success, http_client, is_transient_message};
use super::{
    Amount, BroadcastReceipt, ChainAdapter, ChainKind, FeeContext, FeeQuote, SweepRequest,
};
use crate::config::TronConfig;
use crate::error::{Error, Result};
use crate::wallet::Signer;

/// Prefix byte of mainnet TRON addresses
const ADDRESS_PREFIX: u8 = 0x41;

/// Broadcast result codes that mean the node could not take the transaction right now
const TRANSIENT_CODES: [&str; 3] = ["SERVER_BUSY", "NO_CONNECTION", "NOT_ENOUGH_EFFECTIVE_CONNECTION"];

/// Check a base58check TRON address
pub fn validate_address(address: &str) -> Result<()> {
    let bytes = bs58::decode(address.trim())
        .with_check(None)
        .into_vec()
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))?;

    if bytes.len() != 21 || bytes[0] != ADDRESS_PREFIX {
        return Err(Error::InvalidAddress(format!(
            "{}: not a TRON address",
            address
        )));
    }

    Ok(())
}

/// Derive the base58check address for a secp256k1 key
pub fn address_from_secret(secret: &SecretKey) -> String {
    let public_key = PublicKey::from_secret_key(SECP256K1, secret);
    let uncompressed = public_key.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);

    let mut bytes = Vec::with_capacity(21);
    bytes.push(ADDRESS_PREFIX);
    bytes.extend_from_slice(&hash[12..]);

    bs58::encode(bytes).with_check().into_string()
}

/// Account as returned by `/wallet/getaccount`
///
/// Unactivated accounts come back as `{}`.
#[derive(Debug, Default, Deserialize)]
struct TronAccount {
    #[serde(default)]
    balance: u64,
    #[serde(default)]
    owner_permission: Option<Value>,
    #[serde(default)]
    active_permission: Vec<Value>,
}

impl TronAccount {
    fn is_multisig(&self) -> bool {
        self.owner_permission.is_some() && !self.active_permission.is_empty()
    }
}

/// Response of `/wallet/broadcasttransaction`
#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    txid: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Node messages are hex encoded; fall back to the raw text
fn decode_node_message(message: &str) -> String {
    hex::decode(message)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| message.to_string())
}

fn broadcast_failure(code: &str, message: &str) -> Error {
    let reason = format!("{}: {}", code, decode_node_message(message));
    if TRANSIENT_CODES.contains(&code) {
        Error::rejected_transient(reason)
    } else {
        Error::rejected(reason)
    }
}

/// Sign a transaction id the way java-tron expects: r || s || (v + 27)
fn sign_txid(txid: &[u8], secret: &SecretKey) -> Result<String> {
    let message = Message::from_digest_slice(txid)
        .map_err(|e| Error::Internal(format!("Invalid transaction id: {}", e)))?;
    let signature = SECP256K1.sign_ecdsa_recoverable(&message, secret);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut bytes = compact.to_vec();
    bytes.push(recovery_id.to_i32() as u8 + 27);
    Ok(hex::encode(bytes))
}

/// Sweeps may only leave accounts with owner and active permissions
fn check_permissions(address: &str, account: &TronAccount) -> Result<()> {
    if !account.is_multisig() {
        return Err(Error::rejected(format!(
            "{} is not a multi-signature account (owner and active permissions required)",
            address
        )));
    }
    Ok(())
}

/// Verify the node's `txID` against `raw_data_hex`, then append our
/// signature. Returns the transaction id.
fn cosign_transaction(tx: &mut Value, secret: &SecretKey) -> Result<String> {
    let txid = tx
        .get("txID")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::rejected("Node returned a transaction without txID"))?
        .to_string();
    let raw_data_hex = tx
        .get("raw_data_hex")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::rejected("Node returned a transaction without raw_data_hex"))?;

    // Never sign an id that does not match the raw transaction we were given
    let raw = hex::decode(raw_data_hex)
        .map_err(|e| Error::Serialization(format!("Invalid raw_data_hex: {}", e)))?;
    let txid_bytes = hex::decode(&txid)
        .map_err(|e| Error::Serialization(format!("Invalid txID: {}", e)))?;
    if Sha256::digest(&raw).as_slice() != txid_bytes.as_slice() {
        return Err(Error::rejected("txID does not match raw transaction data"));
    }

    let signature = sign_txid(&txid_bytes, secret)?;
    match tx.get_mut("signature").and_then(|s| s.as_array_mut()) {
        Some(signatures) => signatures.push(json!(signature)),
        None => tx["signature"] = json!([signature]),
    }

    Ok(txid)
}

/// TRON full-node adapter
pub struct TronAdapter {
    config: TronConfig,
    client: reqwest::Client,
}

impl TronAdapter {
    /// Create a new adapter
    pub fn new(config: TronConfig) -> Result<Self> {
        let client = http_client(config.timeout_ms)?;
        info!("TRON adapter initialized for {}", config.api_url);
        Ok(Self { config, client })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.config.api_url.trim_end_matches('/'), path);
        let mut request = self.client.post(&url).json(body);
        if !self.config.api_key.is_empty() {
            request = request.header("TRON-PRO-API-KEY", &self.config.api_key);
        }

        let response = ensure_success(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn get_account(&self, address: &str) -> Result<TronAccount> {
        validate_address(address)?;
        let value = self
            .post("/wallet/getaccount", &json!({ "address": address, "visible": true }))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Confirm the source account has both owner and active permissions
    async fn ensure_multisig(&self, address: &str) -> Result<()> {
        let account = self.get_account(address).await?;
        check_permissions(address, &account)?;
        debug!("Multi-signature permissions confirmed for {}", address);
        Ok(())
    }

    async fn create_transaction(&self, request: &SweepRequest) -> Result<Value> {
        let amount = u64::try_from(request.amount)
            .map_err(|_| Error::Internal(format!("Amount {} exceeds TRON range", request.amount)))?;

        let mut body = json!({
            "owner_address": request.source,
            "to_address": request.destination,
            "amount": amount,
            "visible": true,
        });
        if self.config.permission_id != 0 {
            body["Permission_id"] = json!(self.config.permission_id);
        }

        let tx = self.post("/wallet/createtransaction", &body).await?;
        if let Some(error) = tx.get("Error").and_then(|e| e.as_str()) {
            return Err(if is_transient_message(error) {
                Error::rejected_transient(error.to_string())
            } else {
                Error::rejected(error.to_string())
            });
        }

        Ok(tx)
    }
}

#[async_trait]
impl ChainAdapter for TronAdapter {
    fn chain(&self) -> ChainKind {
        ChainKind::Tron
    }

    async fn get_balance(&self, address: &str) -> Result<Amount> {
        let account = self.get_account(address).await?;
        Ok(account.balance as Amount)
    }

    async fn estimate_fee(&self, _ctx: &FeeContext<'_>) -> Result<FeeQuote> {
        Ok(FeeQuote::fixed(self.config.fixed_fee_sun as Amount))
    }

    async fn build_sign_broadcast(
        &self,
        signer: &Signer,
        request: &SweepRequest,
    ) -> Result<BroadcastReceipt> {
        let secret = signer.secp256k1()?;
        self.validate_address(&request.destination)?;

        if self.config.require_multisig {
            self.ensure_multisig(&request.source).await?;
        }

        let mut tx = self.create_transaction(request).await?;
        let txid = cosign_transaction(&mut tx, secret)?;

        let value = self.post("/wallet/broadcasttransaction", &tx).await?;
        let response: BroadcastResponse = serde_json::from_value(value)?;

        if !response.result {
            let code = response.code.unwrap_or_else(|| "UNKNOWN".to_string());
            let message = response.message.unwrap_or_default();
            warn!("TRON broadcast rejected: {}", code);
            return Err(broadcast_failure(&code, &message));
        }

        let tx_hash = response.txid.unwrap_or(txid);
        info!(
            "TRON sweep broadcast: {} sun from {} to {} (tx: {})",
            request.amount, request.source, request.destination, tx_hash
        );

        Ok(BroadcastReceipt { tx_hash })
    }
}
