//! Legacy (pre-segwit) transaction encoding for UTXO sweeps
//!
//! Only what a sweep needs: P2PKH inputs, one output to a P2PKH, P2SH or
//! segwit destination, SIGHASH_ALL signatures.

use ripemd::Ripemd160;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// SIGHASH_ALL
pub const SIGHASH_ALL: u32 = 0x01;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_EQUAL: u8 = 0x87;

pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(first));
    out
}

pub fn hash160(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(Sha256::digest(data)));
    out
}

/// OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
    script.extend_from_slice(pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// OP_HASH160 <hash> OP_EQUAL
pub fn p2sh_script(script_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.extend_from_slice(&[OP_HASH160, 20]);
    script.extend_from_slice(script_hash);
    script.push(OP_EQUAL);
    script
}

/// OP_n <program>
pub fn witness_script(version: u8, program: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(program.len() + 2);
    script.push(if version == 0 { 0x00 } else { 0x50 + version });
    script.push(program.len() as u8);
    script.extend_from_slice(program);
    script
}

fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    // Signatures and compressed keys are always < 76 bytes
    script.push(data.len() as u8);
    script.extend_from_slice(data);
}

fn write_varint(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x10000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Reference to an output being spent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutPoint {
    /// Transaction id in internal (little-endian) byte order
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    /// Parse a txid as displayed by explorers (big-endian hex)
    pub fn from_display(txid_hex: &str, vout: u32) -> Result<Self> {
        let bytes = hex::decode(txid_hex)
            .map_err(|e| Error::Serialization(format!("Invalid txid {}: {}", txid_hex, e)))?;
        let mut txid: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Serialization(format!("Invalid txid length: {}", txid_hex)))?;
        txid.reverse();
        Ok(Self { txid, vout })
    }
}

#[derive(Debug, Clone)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// Version-1 transaction without witness data
#[derive(Debug, Clone)]
pub struct LegacyTransaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl LegacyTransaction {
    /// Spend every outpoint into a single output
    pub fn sweep(outpoints: Vec<OutPoint>, value: u64, script_pubkey: Vec<u8>) -> Self {
        Self {
            version: 1,
            inputs: outpoints
                .into_iter()
                .map(|previous_output| TxIn {
                    previous_output,
                    script_sig: Vec::new(),
                    sequence: 0xffff_ffff,
                })
                .collect(),
            outputs: vec![TxOut {
                value,
                script_pubkey,
            }],
            lock_time: 0,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());

        write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.extend_from_slice(&input.previous_output.txid);
            buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            write_varint(&mut buf, input.script_sig.len() as u64);
            buf.extend_from_slice(&input.script_sig);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            write_varint(&mut buf, output.script_pubkey.len() as u64);
            buf.extend_from_slice(&output.script_pubkey);
        }

        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    /// Transaction id in display (big-endian) order
    pub fn txid(&self) -> String {
        let mut hash = sha256d(&self.serialize());
        hash.reverse();
        hex::encode(hash)
    }

    /// Legacy SIGHASH_ALL digest for one input
    ///
    /// Every other input's script is blanked and the signed input carries
    /// the previous output's script.
    pub fn legacy_sighash(&self, index: usize, script_code: &[u8]) -> Result<[u8; 32]> {
        if index >= self.inputs.len() {
            return Err(Error::Internal(format!(
                "Input {} out of range ({} inputs)",
                index,
                self.inputs.len()
            )));
        }

        let mut copy = self.clone();
        for (i, input) in copy.inputs.iter_mut().enumerate() {
            input.script_sig = if i == index {
                script_code.to_vec()
            } else {
                Vec::new()
            };
        }

        let mut preimage = copy.serialize();
        preimage.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
        Ok(sha256d(&preimage))
    }

    /// Sign every input as P2PKH with one key, verifying each signature
    pub fn sign_all_p2pkh(&mut self, secret: &SecretKey) -> Result<()> {
        let public_key = PublicKey::from_secret_key(SECP256K1, secret);
        let pubkey_bytes = public_key.serialize();
        let script_code = p2pkh_script(&hash160(&pubkey_bytes));

        let mut script_sigs = Vec::with_capacity(self.inputs.len());
        for index in 0..self.inputs.len() {
            let digest = self.legacy_sighash(index, &script_code)?;
            let message = Message::from_digest_slice(&digest)
                .map_err(|e| Error::Internal(format!("Invalid sighash: {}", e)))?;

            let signature = SECP256K1.sign_ecdsa(&message, secret);
            SECP256K1
                .verify_ecdsa(&message, &signature, &public_key)
                .map_err(|e| {
                    Error::Internal(format!("Signature for input {} failed to verify: {}", index, e))
                })?;

            let mut sig_bytes = signature.serialize_der().to_vec();
            sig_bytes.push(SIGHASH_ALL as u8);

            let mut script_sig = Vec::with_capacity(sig_bytes.len() + pubkey_bytes.len() + 2);
            push_data(&mut script_sig, &sig_bytes);
            push_data(&mut script_sig, &pubkey_bytes);
            script_sigs.push(script_sig);
        }

        for (input, script_sig) in self.inputs.iter_mut().zip(script_sigs) {
            input.script_sig = script_sig;
        }

        Ok(())
    }
}
