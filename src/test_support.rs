//! Shared fixtures for unit tests

use async_trait::async_trait;
use solana_sdk::signer::keypair::keypair_from_seed;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::chain::{
    Amount, BroadcastReceipt, ChainAdapter, ChainFamily, ChainKind, FeeContext, FeeQuote,
    SweepRequest,
};
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::wallet::{CredentialKind, CredentialResolver, OwnerId, Signer, Wallet};

pub const OWNER: OwnerId = 42;

/// Scripted adapter that records what the engine asked of it
pub struct MockAdapter {
    chain: ChainKind,
    fee: Amount,
    balance: Mutex<Amount>,
    build_results: Mutex<VecDeque<Result<BroadcastReceipt>>>,
    failing_source: Option<(String, Error)>,
    builds: Mutex<Vec<(Instant, SweepRequest)>>,
    balance_calls: AtomicUsize,
    fee_calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl MockAdapter {
    pub fn new(chain: ChainKind, fee: Amount) -> Self {
        Self {
            chain,
            fee,
            balance: Mutex::new(0),
            build_results: Mutex::new(VecDeque::new()),
            failing_source: None,
            builds: Mutex::new(Vec::new()),
            balance_calls: AtomicUsize::new(0),
            fee_calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn with_balance(self, balance: Amount) -> Self {
        self.set_balance(balance);
        self
    }

    pub fn set_balance(&self, balance: Amount) {
        *self.balance.lock().unwrap() = balance;
    }

    /// Results for successive broadcasts; once drained every broadcast succeeds
    pub fn with_build_results(self, results: Vec<Result<BroadcastReceipt>>) -> Self {
        *self.build_results.lock().unwrap() = results.into();
        self
    }

    /// Every broadcast out of `source` fails with `error`
    pub fn with_failing_source(mut self, source: &str, error: Error) -> Self {
        self.failing_source = Some((source.to_string(), error));
        self
    }

    /// Broadcasts block until the semaphore hands out a permit
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn build_requests(&self) -> Vec<SweepRequest> {
        self.builds.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn build_instants(&self) -> Vec<Instant> {
        self.builds.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn fee_calls(&self) -> usize {
        self.fee_calls.load(Ordering::SeqCst)
    }
}

fn copy_error(error: &Error) -> Error {
    match error {
        Error::Network(msg) => Error::Network(msg.clone()),
        Error::BroadcastRejected { reason, transient } => Error::BroadcastRejected {
            reason: reason.clone(),
            transient: *transient,
        },
        other => Error::Internal(other.to_string()),
    }
}

#[async_trait]
impl ChainAdapter for MockAdapter {
    fn chain(&self) -> ChainKind {
        self.chain
    }

    async fn get_balance(&self, _address: &str) -> Result<Amount> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.balance.lock().unwrap())
    }

    async fn estimate_fee(&self, _ctx: &FeeContext<'_>) -> Result<FeeQuote> {
        self.fee_calls.fetch_add(1, Ordering::SeqCst);
        Ok(FeeQuote::fixed(self.fee))
    }

    async fn build_sign_broadcast(
        &self,
        _signer: &Signer,
        request: &SweepRequest,
    ) -> Result<BroadcastReceipt> {
        let sequence = {
            let mut builds = self.builds.lock().unwrap();
            builds.push((Instant::now(), request.clone()));
            builds.len()
        };

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
            permit.forget();
        }

        if let Some((source, error)) = &self.failing_source {
            if *source == request.source {
                return Err(copy_error(error));
            }
        }

        let scripted = self.build_results.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(BroadcastReceipt {
                tx_hash: format!("mock-tx-{}", sequence),
            }),
        }
    }
}

/// Notifier that keeps every message in memory
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(OwnerId, String)>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(OwnerId, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Make every delivery fail (messages are not recorded)
    pub fn fail_deliveries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, owner_id: OwnerId, message: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Notification("delivery disabled".into()));
        }
        self.sent.lock().unwrap().push((owner_id, message.to_string()));
        Ok(())
    }
}

/// A valid receiver on each chain
pub fn receiver_for(chain: ChainKind) -> &'static str {
    match chain.family() {
        ChainFamily::AccountMultisig => "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t",
        ChainFamily::Utxo => "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH",
        ChainFamily::Evm => "0x52908400098527886E0F7030069857D2E4169EE7",
        ChainFamily::SingleSig => "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
    }
}

/// Private key credential built from a repeated byte
pub fn credential_for(chain: ChainKind, seed: u8) -> String {
    match chain.family() {
        ChainFamily::SingleSig => keypair_from_seed(&[seed; 32])
            .expect("32-byte seed")
            .to_base58_string(),
        _ => hex::encode([seed; 32]),
    }
}

pub fn wallet_fixture(chain: ChainKind, threshold: Amount) -> Wallet {
    wallet_fixture_seeded(chain, threshold, 0x11)
}

/// Wallet backed by a private key, address derived from the key
pub fn wallet_fixture_seeded(chain: ChainKind, threshold: Amount, seed: u8) -> Wallet {
    let credential = credential_for(chain, seed);
    let address = CredentialResolver::new()
        .derive_address(&credential, CredentialKind::PrivateKey, chain)
        .expect("fixture credential resolves");

    Wallet::new(
        OWNER,
        chain,
        address,
        credential,
        CredentialKind::PrivateKey,
        receiver_for(chain).to_string(),
        threshold,
    )
}

/// Wallet connected through pairing, with no local secret
pub fn delegated_wallet_fixture(chain: ChainKind, threshold: Amount) -> Wallet {
    let address = CredentialResolver::new()
        .derive_address(&credential_for(chain, 0x33), CredentialKind::PrivateKey, chain)
        .expect("fixture credential resolves");

    Wallet::new(
        OWNER,
        chain,
        address.clone(),
        address,
        CredentialKind::Delegated,
        receiver_for(chain).to_string(),
        threshold,
    )
}
