//! BIP-39 mnemonic validation
//!
//! Phrases are normalised first, then the word count is checked, then the
//! checksum. No key is ever derived from a phrase that fails either check.

use bip39::{Language, Mnemonic};

use crate::error::{Error, Result};

/// Word counts accepted for stored wallets
pub const ACCEPTED_WORD_COUNTS: [usize; 2] = [12, 24];

/// Trim, lowercase and collapse runs of whitespace to single spaces
pub fn normalize(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validate a phrase and return the parsed mnemonic
pub fn parse(phrase: &str) -> Result<Mnemonic> {
    let normalized = normalize(phrase);
    let word_count = normalized.split(' ').filter(|w| !w.is_empty()).count();

    if !ACCEPTED_WORD_COUNTS.contains(&word_count) {
        return Err(Error::Derivation(format!(
            "mnemonic must have 12 or 24 words, got {}",
            word_count
        )));
    }

    Mnemonic::parse_in_normalized(Language::English, &normalized).map_err(|e| match e {
        bip39::Error::InvalidChecksum => Error::Derivation("mnemonic checksum is invalid".into()),
        bip39::Error::UnknownWord(index) => Error::Derivation(format!(
            "mnemonic word {} is not in the English word list",
            index + 1
        )),
        other => Error::Derivation(format!("invalid mnemonic: {}", other)),
    })
}

/// Validate a phrase and produce its 64-byte seed (empty passphrase)
pub fn to_seed(phrase: &str) -> Result<[u8; 64]> {
    Ok(parse(phrase)?.to_seed(""))
}
