//! Bitcoin adapter (Esplora HTTP API)
//!
//! Sweeps spend every unspent output of a legacy P2PKH address into a single
//! destination output. There is no change output and no coin selection.

use async_trait::async_trait;
use secp256k1::{PublicKey, SecretKey, SECP256K1};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

use super::rpc::{ensure_success, http_client};
use super::utxo::{hash160, p2pkh_script, p2sh_script, witness_script, LegacyTransaction, OutPoint};
use super::{Amount, BroadcastReceipt, ChainAdapter, ChainKind, FeeContext, FeeQuote, SweepRequest};
use crate::config::BitcoinConfig;
use crate::error::{Error, Result};
use crate::wallet::Signer;

const P2PKH_VERSION: u8 = 0x00;
const P2SH_VERSION: u8 = 0x05;
const WIF_VERSION: u8 = 0x80;

/// Decoded destination
#[derive(Debug, Clone, PartialEq, Eq)]
enum BitcoinAddress {
    P2pkh([u8; 20]),
    P2sh([u8; 20]),
    Witness { version: u8, program: Vec<u8> },
}

impl BitcoinAddress {
    fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        let lower = address.to_lowercase();

        if lower.starts_with("bc1") {
            let (hrp, version, program) = bech32::segwit::decode(address)
                .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))?;
            if hrp != bech32::hrp::BC {
                return Err(Error::InvalidAddress(format!("{}: not a mainnet address", address)));
            }
            return Ok(BitcoinAddress::Witness {
                version: version.to_u8(),
                program,
            });
        }

        let bytes = bs58::decode(address)
            .with_check(None)
            .into_vec()
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))?;
        if bytes.len() != 21 {
            return Err(Error::InvalidAddress(format!("{}: bad payload length", address)));
        }

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&bytes[1..]);
        match bytes[0] {
            P2PKH_VERSION => Ok(BitcoinAddress::P2pkh(hash)),
            P2SH_VERSION => Ok(BitcoinAddress::P2sh(hash)),
            v => Err(Error::InvalidAddress(format!(
                "{}: unknown version byte {:#04x}",
                address, v
            ))),
        }
    }

    fn script_pubkey(&self) -> Vec<u8> {
        match self {
            BitcoinAddress::P2pkh(hash) => p2pkh_script(hash),
            BitcoinAddress::P2sh(hash) => p2sh_script(hash),
            BitcoinAddress::Witness { version, program } => witness_script(*version, program),
        }
    }
}

/// Check a mainnet address (P2PKH, P2SH or bech32/bech32m)
pub fn validate_address(address: &str) -> Result<()> {
    BitcoinAddress::parse(address).map(|_| ())
}

/// Legacy P2PKH address of a key (compressed public key)
pub fn p2pkh_address(secret: &SecretKey) -> String {
    let public_key = PublicKey::from_secret_key(SECP256K1, secret);
    let mut bytes = Vec::with_capacity(21);
    bytes.push(P2PKH_VERSION);
    bytes.extend_from_slice(&hash160(&public_key.serialize()));
    bs58::encode(bytes).with_check().into_string()
}

/// Decode a mainnet WIF private key
///
/// Only compressed-key WIF is accepted since the derived address uses the
/// compressed public key.
pub fn secret_from_wif(wif: &str) -> Result<SecretKey> {
    let bytes = bs58::decode(wif.trim())
        .with_check(None)
        .into_vec()
        .map_err(|_| Error::Credential("Invalid WIF encoding".into()))?;

    match bytes.as_slice() {
        [WIF_VERSION, key @ .., 0x01] if key.len() == 32 => SecretKey::from_slice(key)
            .map_err(|e| Error::Credential(format!("Invalid private key: {}", e))),
        [WIF_VERSION, key @ ..] if key.len() == 32 => Err(Error::Credential(
            "Uncompressed WIF keys are not supported".into(),
        )),
        _ => Err(Error::Credential("Not a mainnet WIF private key".into())),
    }
}

/// Unspent output as returned by `/address/{addr}/utxo`
#[derive(Debug, Clone, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
}

/// Pick a rate from `/fee-estimates`
///
/// Uses the requested target if present, otherwise the closest faster target,
/// otherwise the slowest one on offer.
fn select_fee_rate(estimates: &HashMap<String, f64>, target_blocks: u32) -> Option<u64> {
    let mut parsed: Vec<(u32, f64)> = estimates
        .iter()
        .filter_map(|(k, v)| k.parse::<u32>().ok().map(|blocks| (blocks, *v)))
        .collect();
    parsed.sort_by_key(|(blocks, _)| *blocks);

    let rate = parsed
        .iter()
        .rev()
        .find(|(blocks, _)| *blocks <= target_blocks)
        .or_else(|| parsed.first())
        .map(|(_, rate)| *rate)?;

    Some((rate.ceil() as u64).max(1))
}

/// Spend every UTXO of `request.source` into one output paying
/// `request.amount` to the destination, signing each input with `secret`
fn build_sweep_transaction(
    secret: &SecretKey,
    request: &SweepRequest,
    utxos: &[EsploraUtxo],
) -> Result<LegacyTransaction> {
    let own_address = p2pkh_address(secret);
    if own_address != request.source {
        return Err(Error::Credential(format!(
            "Key controls {} but the sweep source is {}",
            own_address, request.source
        )));
    }
    let destination = BitcoinAddress::parse(&request.destination)?;

    let total: Amount = utxos.iter().map(|u| u.value as Amount).sum();
    if request.amount == 0 || request.amount > total {
        return Err(Error::InsufficientFunds {
            available: total,
            fee: request.fee.total,
        });
    }
    let value = u64::try_from(request.amount)
        .map_err(|_| Error::Internal(format!("Amount {} exceeds satoshi range", request.amount)))?;

    let outpoints = utxos
        .iter()
        .map(|u| OutPoint::from_display(&u.txid, u.vout))
        .collect::<Result<Vec<_>>>()?;

    let mut tx = LegacyTransaction::sweep(outpoints, value, destination.script_pubkey());
    tx.sign_all_p2pkh(secret)?;
    Ok(tx)
}

/// Esplora-backed Bitcoin adapter
pub struct BitcoinAdapter {
    config: BitcoinConfig,
    client: reqwest::Client,
}

impl BitcoinAdapter {
    /// Create a new adapter
    pub fn new(config: BitcoinConfig) -> Result<Self> {
        let client = http_client(config.timeout_ms)?;
        info!("Bitcoin adapter initialized for {}", config.esplora_url);
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.esplora_url.trim_end_matches('/'), path)
    }

    async fn get_utxos(&self, address: &str) -> Result<Vec<EsploraUtxo>> {
        validate_address(address)?;
        let response = self
            .client
            .get(self.url(&format!("/address/{}/utxo", address)))
            .send()
            .await?;
        let utxos: Vec<EsploraUtxo> = ensure_success(response).await?.json().await?;
        debug!("{} unspent outputs for {}", utxos.len(), address);
        Ok(utxos)
    }

    async fn fee_rate(&self) -> Result<u64> {
        if let Some(rate) = self.config.fee_rate_sat_per_vbyte {
            return Ok(rate);
        }

        let response = self.client.get(self.url("/fee-estimates")).send().await?;
        let estimates: HashMap<String, f64> = ensure_success(response).await?.json().await?;

        select_fee_rate(&estimates, self.config.fee_target_blocks)
            .ok_or_else(|| Error::Network("Fee estimates unavailable".into()))
    }

    async fn broadcast(&self, raw_hex: String) -> Result<String> {
        let response = self.client.post(self.url("/tx")).body(raw_hex).send().await?;
        let txid = ensure_success(response).await?.text().await?;
        Ok(txid.trim().to_string())
    }
}

#[async_trait]
impl ChainAdapter for BitcoinAdapter {
    fn chain(&self) -> ChainKind {
        ChainKind::Bitcoin
    }

    async fn get_balance(&self, address: &str) -> Result<Amount> {
        let utxos = self.get_utxos(address).await?;
        Ok(utxos.iter().map(|u| u.value as Amount).sum())
    }

    async fn estimate_fee(&self, _ctx: &FeeContext<'_>) -> Result<FeeQuote> {
        let rate = self.fee_rate().await?;
        Ok(FeeQuote {
            total: self.config.estimated_tx_vbytes as Amount * rate as Amount,
            unit_price: Some(rate as u128),
        })
    }

    async fn build_sign_broadcast(
        &self,
        signer: &Signer,
        request: &SweepRequest,
    ) -> Result<BroadcastReceipt> {
        let secret = signer.secp256k1()?;
        validate_address(&request.destination)?;

        let utxos = self.get_utxos(&request.source).await?;
        let tx = build_sweep_transaction(secret, request, &utxos)?;

        let local_txid = tx.txid();
        let tx_hash = self.broadcast(tx.to_hex()).await?;
        if tx_hash != local_txid {
            debug!("Node reported txid {} (local {})", tx_hash, local_txid);
        }

        info!(
            "Bitcoin sweep broadcast: {} sat from {} inputs to {} (tx: {})",
            request.amount,
            tx.inputs.len(),
            request.destination,
            tx_hash
        );

        Ok(BroadcastReceipt { tx_hash })
    }
}
