//! HD key derivation per chain
//!
//! secp256k1 chains go through BIP-32 (`tiny-hderive`); Solana uses SLIP-10
//! ed25519 derivation from `solana-sdk`.

use secp256k1::SecretKey;
use solana_sdk::derivation_path::DerivationPath;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::keypair::keypair_from_seed_and_derivation_path;
use tiny_hderive::bip32::ExtendedPrivKey;
use tracing::debug;

use crate::chain::bitcoin::p2pkh_address;
use crate::error::{Error, Result};

/// Bitcoin paths in the order they are tried
pub const BITCOIN_PATHS: [(&str, &str); 3] = [
    ("legacy", "m/44'/0'/0'/0/0"),
    ("wrapped-segwit", "m/49'/0'/0'/0/0"),
    ("native-segwit", "m/84'/0'/0'/0/0"),
];

pub const TRON_PATH: &str = "m/44'/195'/0'/0/0";
pub const EVM_PATH: &str = "m/44'/60'/0'/0/0";
pub const SOLANA_PATH: &str = "m/44'/501'/0'/0'";

/// Derive a secp256k1 key at a BIP-32 path
pub fn derive_secp256k1(seed: &[u8], path: &str) -> Result<SecretKey> {
    let derived = ExtendedPrivKey::derive(seed, path)
        .map_err(|e| Error::Derivation(format!("{}: {:?}", path, e)))?;

    let secret = derived.secret();
    if secret.iter().all(|b| *b == 0) {
        return Err(Error::Derivation(format!("{}: empty private key", path)));
    }

    SecretKey::from_slice(&secret).map_err(|e| Error::Derivation(format!("{}: {}", path, e)))
}

/// Key selected by the Bitcoin path search
#[derive(Debug)]
pub struct BitcoinKey {
    pub secret: SecretKey,
    pub address: String,
    pub path: &'static str,
}

/// Try each Bitcoin path in order and keep the first usable one
pub fn derive_bitcoin(seed: &[u8]) -> Result<BitcoinKey> {
    let mut failures = Vec::new();

    for (label, path) in BITCOIN_PATHS {
        match derive_secp256k1(seed, path) {
            Ok(secret) => {
                let address = p2pkh_address(&secret);
                debug!("Selected {} derivation path {}", label, path);
                return Ok(BitcoinKey {
                    secret,
                    address,
                    path,
                });
            }
            Err(e) => {
                debug!("Derivation path {} unusable: {}", path, e);
                failures.push(e.to_string());
            }
        }
    }

    Err(Error::Derivation(format!(
        "no Bitcoin derivation path produced a usable key ({})",
        failures.join("; ")
    )))
}

/// Derive the Solana keypair at `m/44'/501'/0'/0'`
pub fn derive_solana(seed: &[u8]) -> Result<Keypair> {
    keypair_from_seed_and_derivation_path(seed, Some(DerivationPath::new_bip44(Some(0), Some(0))))
        .map_err(|e| Error::Derivation(format!("{}: {}", SOLANA_PATH, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::mnemonic;
    use solana_sdk::signer::Signer as _;

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_bitcoin_prefers_legacy_path() {
        let seed = mnemonic::to_seed(PHRASE).unwrap();
        let key = derive_bitcoin(&seed).unwrap();
        assert_eq!(key.path, "m/44'/0'/0'/0/0");
        assert_eq!(key.address, "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");
    }

    #[test]
    fn test_bitcoin_derivation_is_deterministic() {
        let seed = mnemonic::to_seed(PHRASE).unwrap();
        let a = derive_bitcoin(&seed).unwrap();
        let b = derive_bitcoin(&seed).unwrap();
        assert_eq!(a.address, b.address);
        assert_eq!(a.secret, b.secret);
    }

    #[test]
    fn test_paths_give_distinct_keys() {
        let seed = mnemonic::to_seed(PHRASE).unwrap();
        let tron = derive_secp256k1(&seed, TRON_PATH).unwrap();
        let evm = derive_secp256k1(&seed, EVM_PATH).unwrap();
        assert_ne!(tron, evm);
    }

    #[test]
    fn test_invalid_path() {
        let seed = mnemonic::to_seed(PHRASE).unwrap();
        assert!(matches!(
            derive_secp256k1(&seed, "not/a/path"),
            Err(Error::Derivation(_))
        ));
    }

    #[test]
    fn test_solana_derivation() {
        let seed = mnemonic::to_seed(PHRASE).unwrap();
        let a = derive_solana(&seed).unwrap();
        let b = derive_solana(&seed).unwrap();
        assert_eq!(a.pubkey(), b.pubkey());
    }
}
