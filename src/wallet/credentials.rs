//! Credential resolution
//!
//! Turns a stored credential into the wallet's canonical address and, when
//! the credential carries a secret, a signing capability. Resolution is pure:
//! no network access, same input always gives the same address.

use regex::Regex;
use secp256k1::SecretKey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer as _;
use tracing::debug;

use super::derivation;
use super::mnemonic;
use super::types::CredentialKind;
use crate::chain::{bitcoin, evm, solana, tron, ChainFamily, ChainKind};
use crate::error::{Error, Result};

lazy_static::lazy_static! {
    /// 32-byte hex private key, optional 0x prefix
    static ref HEX_KEY: Regex =
        Regex::new(r"^(0x|0X)?[0-9a-fA-F]{64}$").expect("Invalid hex key pattern");
}

/// Local signing capability
///
/// Never printed; dropped at the end of each attempt.
pub enum Signer {
    Secp256k1(SecretKey),
    Ed25519(Keypair),
}

impl Signer {
    /// secp256k1 key, for TRON, Bitcoin and EVM adapters
    pub fn secp256k1(&self) -> Result<&SecretKey> {
        match self {
            Signer::Secp256k1(secret) => Ok(secret),
            Signer::Ed25519(_) => Err(Error::Credential(
                "Expected a secp256k1 key, got an ed25519 keypair".into(),
            )),
        }
    }

    /// ed25519 keypair, for the Solana adapter
    pub fn ed25519(&self) -> Result<&Keypair> {
        match self {
            Signer::Ed25519(keypair) => Ok(keypair),
            Signer::Secp256k1(_) => Err(Error::Credential(
                "Expected an ed25519 keypair, got a secp256k1 key".into(),
            )),
        }
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signer::Secp256k1(_) => write!(f, "Signer::Secp256k1(***)"),
            Signer::Ed25519(keypair) => write!(f, "Signer::Ed25519({})", keypair.pubkey()),
        }
    }
}

/// Outcome of resolving a credential
#[derive(Debug)]
pub struct ResolvedCredential {
    /// Canonical address on the target chain
    pub address: String,
    /// `None` for delegated wallets
    pub signer: Option<Signer>,
}

impl ResolvedCredential {
    /// Signer, or a `Credential` error asking for manual re-authorisation
    pub fn require_signer(&self) -> Result<&Signer> {
        self.signer.as_ref().ok_or_else(|| {
            Error::Credential(format!(
                "{} is delegated; re-authorise the sweep manually",
                self.address
            ))
        })
    }
}

/// Stateless resolver from stored credentials to keys and addresses
#[derive(Debug, Default, Clone, Copy)]
pub struct CredentialResolver;

impl CredentialResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `credential` of the declared `kind` for `chain`
    pub fn resolve(
        &self,
        credential: &str,
        kind: CredentialKind,
        chain: ChainKind,
    ) -> Result<ResolvedCredential> {
        let resolved = match kind {
            CredentialKind::PrivateKey => resolve_private_key(credential, chain)?,
            CredentialKind::Mnemonic => resolve_mnemonic(credential, chain)?,
            CredentialKind::Delegated => {
                let address = credential.trim().to_string();
                chain.validate_address(&address)?;
                ResolvedCredential {
                    address,
                    signer: None,
                }
            }
        };

        debug!("Resolved {} credential for {} -> {}", kind, chain, resolved.address);
        Ok(resolved)
    }

    /// Address only, for registration flows
    pub fn derive_address(
        &self,
        credential: &str,
        kind: CredentialKind,
        chain: ChainKind,
    ) -> Result<String> {
        Ok(self.resolve(credential, kind, chain)?.address)
    }
}

fn parse_hex_secret(credential: &str) -> Result<SecretKey> {
    let trimmed = credential.trim();
    if !HEX_KEY.is_match(trimmed) {
        return Err(Error::Credential(
            "Private key must be 64 hex characters".into(),
        ));
    }

    let hex_part = trimmed.trim_start_matches("0x").trim_start_matches("0X");
    let bytes = hex::decode(hex_part)
        .map_err(|e| Error::Credential(format!("Invalid private key hex: {}", e)))?;
    SecretKey::from_slice(&bytes).map_err(|e| Error::Credential(format!("Invalid private key: {}", e)))
}

fn secp256k1_address(chain: ChainKind, secret: &SecretKey) -> Result<String> {
    match chain.family() {
        ChainFamily::AccountMultisig => Ok(tron::address_from_secret(secret)),
        ChainFamily::Utxo => Ok(bitcoin::p2pkh_address(secret)),
        ChainFamily::Evm => evm::address_from_secret(secret),
        ChainFamily::SingleSig => Err(Error::Credential(format!(
            "{} does not use secp256k1 keys",
            chain
        ))),
    }
}

fn resolve_private_key(credential: &str, chain: ChainKind) -> Result<ResolvedCredential> {
    if chain.family() == ChainFamily::SingleSig {
        let keypair = solana::keypair_from_str(credential)?;
        return Ok(ResolvedCredential {
            address: keypair.pubkey().to_string(),
            signer: Some(Signer::Ed25519(keypair)),
        });
    }

    let secret = if chain.family() == ChainFamily::Utxo && !HEX_KEY.is_match(credential.trim()) {
        bitcoin::secret_from_wif(credential)?
    } else {
        parse_hex_secret(credential)?
    };

    Ok(ResolvedCredential {
        address: secp256k1_address(chain, &secret)?,
        signer: Some(Signer::Secp256k1(secret)),
    })
}

fn resolve_mnemonic(credential: &str, chain: ChainKind) -> Result<ResolvedCredential> {
    let seed = mnemonic::to_seed(credential)?;

    match chain.family() {
        ChainFamily::Utxo => {
            let key = derivation::derive_bitcoin(&seed)?;
            Ok(ResolvedCredential {
                address: key.address,
                signer: Some(Signer::Secp256k1(key.secret)),
            })
        }
        ChainFamily::SingleSig => {
            let keypair = derivation::derive_solana(&seed)?;
            Ok(ResolvedCredential {
                address: keypair.pubkey().to_string(),
                signer: Some(Signer::Ed25519(keypair)),
            })
        }
        ChainFamily::AccountMultisig | ChainFamily::Evm => {
            let path = if chain.family() == ChainFamily::Evm {
                derivation::EVM_PATH
            } else {
                derivation::TRON_PATH
            };
            let secret = derivation::derive_secp256k1(&seed, path)?;
            Ok(ResolvedCredential {
                address: secp256k1_address(chain, &secret)?,
                signer: Some(Signer::Secp256k1(secret)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_private_key_per_chain() {
        let resolver = CredentialResolver::new();

        let eth = resolver
            .resolve(DEV_KEY, CredentialKind::PrivateKey, ChainKind::Ethereum)
            .unwrap();
        assert_eq!(eth.address, "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        assert!(eth.signer.is_some());

        // Same key, same address on BSC
        let bsc = resolver
            .derive_address(DEV_KEY, CredentialKind::PrivateKey, ChainKind::Bsc)
            .unwrap();
        assert_eq!(bsc, eth.address);

        let tron = resolver
            .derive_address(DEV_KEY, CredentialKind::PrivateKey, ChainKind::Tron)
            .unwrap();
        assert!(tron.starts_with('T'));

        let btc = resolver
            .derive_address(DEV_KEY, CredentialKind::PrivateKey, ChainKind::Bitcoin)
            .unwrap();
        assert!(btc.starts_with('1'));
    }

    #[test]
    fn test_bitcoin_wif() {
        let resolver = CredentialResolver::new();
        let resolved = resolver
            .resolve(
                "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn",
                CredentialKind::PrivateKey,
                ChainKind::Bitcoin,
            )
            .unwrap();
        assert_eq!(resolved.address, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
    }

    #[test]
    fn test_malformed_private_key() {
        let resolver = CredentialResolver::new();
        let err = resolver
            .resolve("0x1234", CredentialKind::PrivateKey, ChainKind::Ethereum)
            .unwrap_err();
        assert!(matches!(err, Error::Credential(_)));
    }

    #[test]
    fn test_mnemonic_resolution_is_deterministic() {
        let resolver = CredentialResolver::new();
        for chain in ChainKind::ALL {
            let a = resolver.derive_address(PHRASE, CredentialKind::Mnemonic, chain).unwrap();
            let b = resolver.derive_address(PHRASE, CredentialKind::Mnemonic, chain).unwrap();
            assert_eq!(a, b, "{}", chain);
            assert!(chain.validate_address(&a).is_ok(), "{} -> {}", chain, a);
        }

        let eth = resolver
            .derive_address(PHRASE, CredentialKind::Mnemonic, ChainKind::Ethereum)
            .unwrap();
        assert_eq!(eth, "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
    }

    #[test]
    fn test_bad_mnemonic_is_derivation_error() {
        let resolver = CredentialResolver::new();
        let err = resolver
            .resolve("one two three", CredentialKind::Mnemonic, ChainKind::Bitcoin)
            .unwrap_err();
        assert!(matches!(err, Error::Derivation(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_delegated_has_no_signer() {
        let resolver = CredentialResolver::new();
        let resolved = resolver
            .resolve(
                "0x52908400098527886E0F7030069857D2E4169EE7",
                CredentialKind::Delegated,
                ChainKind::Ethereum,
            )
            .unwrap();
        assert!(resolved.signer.is_none());
        assert!(matches!(resolved.require_signer(), Err(Error::Credential(_))));

        assert!(resolver
            .resolve("garbage", CredentialKind::Delegated, ChainKind::Ethereum)
            .is_err());
    }

    #[test]
    fn test_signer_debug_is_redacted() {
        let secret = parse_hex_secret(DEV_KEY).unwrap();
        let rendered = format!("{:?}", Signer::Secp256k1(secret));
        assert!(!rendered.contains("ac0974"));
    }
}
