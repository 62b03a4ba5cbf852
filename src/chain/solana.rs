//! Solana adapter
//!
//! Single-signature system transfers through the nonblocking RPC client.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer as _,
    system_instruction,
    transaction::Transaction,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{Amount, BroadcastReceipt, ChainAdapter, ChainKind, FeeContext, FeeQuote, SweepRequest};
use crate::config::SolanaConfig;
use crate::error::{Error, Result};
use crate::wallet::Signer;

/// Check a base58 public key
pub fn validate_address(address: &str) -> Result<()> {
    parse_pubkey(address).map(|_| ())
}

fn parse_pubkey(address: &str) -> Result<Pubkey> {
    Pubkey::from_str(address.trim())
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))
}

/// Parse a keypair given as base58 or as a JSON byte array (`solana-keygen` format)
pub fn keypair_from_str(encoded: &str) -> Result<Keypair> {
    let encoded = encoded.trim();

    let bytes: Vec<u8> = if encoded.starts_with('[') {
        serde_json::from_str(encoded)
            .map_err(|e| Error::Credential(format!("Invalid keypair JSON: {}", e)))?
    } else {
        bs58::decode(encoded)
            .into_vec()
            .map_err(|e| Error::Credential(format!("Invalid base58 keypair: {}", e)))?
    };

    if bytes.len() != 64 {
        return Err(Error::Credential(format!(
            "Keypair must be 64 bytes, got {}",
            bytes.len()
        )));
    }

    Keypair::from_bytes(&bytes).map_err(|e| Error::Credential(format!("Invalid keypair bytes: {}", e)))
}

/// Solana RPC adapter
pub struct SolanaAdapter {
    config: SolanaConfig,
    rpc_client: RpcClient,
}

impl SolanaAdapter {
    /// Create a new adapter
    pub fn new(config: SolanaConfig) -> Self {
        let rpc_client = RpcClient::new_with_timeout_and_commitment(
            config.rpc_url.clone(),
            Duration::from_millis(config.timeout_ms),
            CommitmentConfig::confirmed(),
        );
        info!("Solana adapter initialized for {}", config.rpc_url);
        Self { config, rpc_client }
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn chain(&self) -> ChainKind {
        ChainKind::Solana
    }

    async fn get_balance(&self, address: &str) -> Result<Amount> {
        let pubkey = parse_pubkey(address)?;
        let lamports = self.rpc_client.get_balance(&pubkey).await?;
        Ok(lamports as Amount)
    }

    async fn estimate_fee(&self, _ctx: &FeeContext<'_>) -> Result<FeeQuote> {
        Ok(FeeQuote::fixed(self.config.fixed_fee_lamports as Amount))
    }

    async fn build_sign_broadcast(
        &self,
        signer: &Signer,
        request: &SweepRequest,
    ) -> Result<BroadcastReceipt> {
        let keypair = signer.ed25519()?;
        let from = keypair.pubkey();
        if from.to_string() != request.source.trim() {
            return Err(Error::Credential(format!(
                "Keypair {} does not control {}",
                from, request.source
            )));
        }
        let to = parse_pubkey(&request.destination)?;

        let lamports = u64::try_from(request.amount)
            .map_err(|_| Error::Internal(format!("Amount {} exceeds lamport range", request.amount)))?;
        if lamports == 0 {
            return Err(Error::InsufficientFunds {
                available: 0,
                fee: request.fee.total,
            });
        }

        debug!("Executing transfer: {} lamports from {} to {}", lamports, from, to);

        let instruction = system_instruction::transfer(&from, &to, lamports);
        let blockhash = self.rpc_client.get_latest_blockhash().await?;
        let transaction =
            Transaction::new_signed_with_payer(&[instruction], Some(&from), &[keypair], blockhash);

        let signature = self
            .rpc_client
            .send_and_confirm_transaction(&transaction)
            .await?;

        info!(
            "Solana sweep complete: {} lamports to {} (sig: {})",
            lamports, to, signature
        );

        Ok(BroadcastReceipt {
            tx_hash: signature.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_address() {
        assert!(validate_address("11111111111111111111111111111111").is_ok());
        assert!(validate_address("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA").is_ok());
        assert!(validate_address("0x52908400098527886E0F7030069857D2E4169EE7").is_err());
        assert!(validate_address("").is_err());
    }

    #[test]
    fn test_keypair_encodings_agree() {
        let keypair = Keypair::new();
        let bytes = keypair.to_bytes();

        let from_b58 = keypair_from_str(&bs58::encode(bytes).into_string()).unwrap();
        let from_json = keypair_from_str(&serde_json::to_string(&bytes.to_vec()).unwrap()).unwrap();

        assert_eq!(from_b58.pubkey(), keypair.pubkey());
        assert_eq!(from_json.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_keypair_length_checked() {
        let short = bs58::encode([1u8; 32]).into_string();
        let err = keypair_from_str(&short).unwrap_err();
        assert!(err.to_string().contains("64 bytes"));
    }
}
