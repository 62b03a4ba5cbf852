//! Wallet-setup sessions
//!
//! One record per owner with a setup in progress. Each input advances the
//! record through a fixed sequence of steps:
//!
//! ```text
//! ChooseChain -> ChooseAuthMethod -> CollectCredential -> CollectReceiver -> CollectThreshold -> Done
//! ```
//!
//! Delegated wallets leave `CollectCredential` through a pairing result
//! instead of a typed secret.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::chain::{parse_units, Amount, ChainKind};
use crate::error::{Error, Result};
use crate::wallet::{CredentialKind, CredentialResolver, OwnerId, Wallet};

/// Setup sessions are keyed by the owner's chat id
pub type SessionId = OwnerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    ChooseChain,
    ChooseAuthMethod,
    CollectCredential,
    CollectReceiver,
    CollectThreshold,
    Done,
}

impl SetupStep {
    /// Question shown to the owner at this step
    pub fn prompt(&self, session: &SetupSession) -> String {
        match self {
            SetupStep::ChooseChain => {
                let chains = ChainKind::ALL
                    .iter()
                    .map(|c| c.symbol())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Which chain? ({})", chains)
            }
            SetupStep::ChooseAuthMethod => {
                "How do you want to connect the wallet? (private\\_key, mnemonic, delegated)".into()
            }
            SetupStep::CollectCredential => match session.credential_kind {
                Some(CredentialKind::Delegated) => {
                    "Approve the connection in your wallet app. I will continue once it is paired.".into()
                }
                Some(CredentialKind::Mnemonic) => "Send the 12 or 24 word seed phrase.".into(),
                _ => "Send the private key.".into(),
            },
            SetupStep::CollectReceiver => "Which address should receive the funds?".into(),
            SetupStep::CollectThreshold => {
                let symbol = session.chain.map(|c| c.symbol()).unwrap_or_default();
                format!(
                    "Sweep once the balance reaches how much {}? (0 sweeps any balance)",
                    symbol
                )
            }
            SetupStep::Done => "Wallet saved.".into(),
        }
    }
}

/// State of one owner's setup conversation
#[derive(Clone)]
pub struct SetupSession {
    pub owner_id: OwnerId,
    pub step: SetupStep,
    pub chain: Option<ChainKind>,
    pub credential_kind: Option<CredentialKind>,
    credential: Option<String>,
    pub address: Option<String>,
    pub receiver_address: Option<String>,
    pub threshold: Option<Amount>,
    pub expires_at: Instant,
}

impl std::fmt::Debug for SetupSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupSession")
            .field("owner_id", &self.owner_id)
            .field("step", &self.step)
            .field("chain", &self.chain)
            .field("credential_kind", &self.credential_kind)
            .field("credential", &self.credential.as_ref().map(|_| "***"))
            .field("address", &self.address)
            .field("receiver_address", &self.receiver_address)
            .field("threshold", &self.threshold)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl SetupSession {
    pub fn new(owner_id: OwnerId, ttl: Duration) -> Self {
        Self {
            owner_id,
            step: SetupStep::ChooseChain,
            chain: None,
            credential_kind: None,
            credential: None,
            address: None,
            receiver_address: None,
            threshold: None,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn prompt(&self) -> String {
        self.step.prompt(self)
    }

    fn chain(&self) -> Result<ChainKind> {
        self.chain
            .ok_or_else(|| Error::Internal("Setup session has no chain".into()))
    }

    /// Apply one typed input. On error the step is unchanged.
    pub fn advance(&mut self, input: &str, resolver: &CredentialResolver) -> Result<SetupStep> {
        let input = input.trim();

        match self.step {
            SetupStep::ChooseChain => {
                self.chain = Some(input.parse()?);
                self.step = SetupStep::ChooseAuthMethod;
            }
            SetupStep::ChooseAuthMethod => {
                self.credential_kind = Some(input.parse()?);
                self.step = SetupStep::CollectCredential;
            }
            SetupStep::CollectCredential => {
                let kind = self
                    .credential_kind
                    .ok_or_else(|| Error::Internal("Setup session has no credential kind".into()))?;
                if kind == CredentialKind::Delegated {
                    return Err(Error::Credential(
                        "Waiting for the wallet app to pair; no key is needed".into(),
                    ));
                }

                let address = resolver.derive_address(input, kind, self.chain()?)?;
                self.credential = Some(input.to_string());
                self.address = Some(address);
                self.step = SetupStep::CollectReceiver;
            }
            SetupStep::CollectReceiver => {
                self.chain()?.validate_address(input)?;
                self.receiver_address = Some(input.to_string());
                self.step = SetupStep::CollectThreshold;
            }
            SetupStep::CollectThreshold => {
                let chain = self.chain()?;
                self.threshold = Some(parse_units(input, chain.decimals())?);
                self.step = SetupStep::Done;
            }
            SetupStep::Done => {
                return Err(Error::Internal("Setup session already complete".into()));
            }
        }

        Ok(self.step)
    }

    /// Accept a pairing result for a delegated wallet
    pub fn pair(&mut self, address: &str, chain: ChainKind, resolver: &CredentialResolver) -> Result<SetupStep> {
        if self.step != SetupStep::CollectCredential
            || self.credential_kind != Some(CredentialKind::Delegated)
        {
            return Err(Error::Credential(
                "No delegated wallet setup is waiting for a pairing".into(),
            ));
        }

        let expected = self.chain()?;
        if chain != expected {
            return Err(Error::UnsupportedChain(format!(
                "paired with {} but setup is for {}",
                chain, expected
            )));
        }

        let address = resolver.derive_address(address, CredentialKind::Delegated, chain)?;
        self.credential = Some(address.clone());
        self.address = Some(address);
        self.step = SetupStep::CollectReceiver;
        Ok(self.step)
    }

    /// Build the wallet once every step is complete
    pub fn into_wallet(self) -> Result<Wallet> {
        let incomplete = || Error::Internal("Setup session is not complete".into());
        if self.step != SetupStep::Done {
            return Err(incomplete());
        }

        Ok(Wallet::new(
            self.owner_id,
            self.chain.ok_or_else(incomplete)?,
            self.address.ok_or_else(incomplete)?,
            self.credential.ok_or_else(incomplete)?,
            self.credential_kind.ok_or_else(incomplete)?,
            self.receiver_address.ok_or_else(incomplete)?,
            self.threshold.ok_or_else(incomplete)?,
        ))
    }
}

/// Active setup sessions with expiry
pub struct SessionStore {
    sessions: DashMap<SessionId, SetupSession>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Start a fresh session, replacing any previous one
    pub fn start(&self, owner_id: OwnerId) -> SetupSession {
        let session = SetupSession::new(owner_id, self.ttl);
        self.sessions.insert(owner_id, session.clone());
        session
    }

    /// Live session for `id`; an expired one is removed and not returned
    pub fn get(&self, id: SessionId) -> Option<SetupSession> {
        let now = Instant::now();
        let session = self.sessions.get(&id).map(|s| s.clone())?;
        if session.is_expired(now) {
            self.sessions.remove(&id);
            return None;
        }
        Some(session)
    }

    /// Whether a session existed and has expired (it is removed)
    pub fn take_expired(&self, id: SessionId) -> bool {
        let now = Instant::now();
        self.sessions
            .remove_if(&id, |_, session| session.is_expired(now))
            .is_some()
    }

    pub fn put(&self, session: SetupSession) {
        self.sessions.insert(session.owner_id, session);
    }

    pub fn remove(&self, id: SessionId) -> Option<SetupSession> {
        self.sessions.remove(&id).map(|(_, session)| session)
    }

    /// Drop every expired session, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{credential_for, receiver_for};

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn test_private_key_flow() {
        let resolver = CredentialResolver::new();
        let mut session = SetupSession::new(7, TTL);

        assert_eq!(session.advance("TRX", &resolver).unwrap(), SetupStep::ChooseAuthMethod);
        assert_eq!(
            session.advance("private_key", &resolver).unwrap(),
            SetupStep::CollectCredential
        );
        assert_eq!(
            session
                .advance(&credential_for(ChainKind::Tron, 0x11), &resolver)
                .unwrap(),
            SetupStep::CollectReceiver
        );
        assert!(session.address.as_deref().unwrap_or_default().starts_with('T'));
        assert_eq!(
            session.advance(receiver_for(ChainKind::Tron), &resolver).unwrap(),
            SetupStep::CollectThreshold
        );
        assert_eq!(session.advance("1.5", &resolver).unwrap(), SetupStep::Done);

        let wallet = session.into_wallet().unwrap();
        assert_eq!(wallet.owner_id, 7);
        assert_eq!(wallet.chain, ChainKind::Tron);
        assert_eq!(wallet.threshold, 1_500_000);
        assert_eq!(wallet.credential_kind, CredentialKind::PrivateKey);
    }

    #[tokio::test]
    async fn test_bad_input_keeps_step() {
        let resolver = CredentialResolver::new();
        let mut session = SetupSession::new(7, TTL);

        assert!(session.advance("dogecoin", &resolver).is_err());
        assert_eq!(session.step, SetupStep::ChooseChain);

        session.advance("eth", &resolver).unwrap();
        session.advance("private_key", &resolver).unwrap();
        assert!(session.advance("not a key", &resolver).is_err());
        assert_eq!(session.step, SetupStep::CollectCredential);
        assert!(session.address.is_none());

        session
            .advance(&credential_for(ChainKind::Ethereum, 0x11), &resolver)
            .unwrap();
        assert!(session.advance("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t", &resolver).is_err());
        assert_eq!(session.step, SetupStep::CollectReceiver);
    }

    #[tokio::test]
    async fn test_delegated_flow_requires_pairing() {
        let resolver = CredentialResolver::new();
        let mut session = SetupSession::new(7, TTL);
        session.advance("bsc", &resolver).unwrap();
        session.advance("delegated", &resolver).unwrap();

        assert!(session.advance("0xdeadbeef", &resolver).is_err());

        let address = "0x52908400098527886E0F7030069857D2E4169EE7";
        assert!(session.pair(address, ChainKind::Ethereum, &resolver).is_err());
        assert_eq!(
            session.pair(address, ChainKind::Bsc, &resolver).unwrap(),
            SetupStep::CollectReceiver
        );
        assert_eq!(session.address.as_deref(), Some(address));
    }

    #[tokio::test]
    async fn test_incomplete_session_has_no_wallet() {
        let resolver = CredentialResolver::new();
        let mut session = SetupSession::new(7, TTL);
        session.advance("sol", &resolver).unwrap();
        assert!(session.into_wallet().is_err());
    }

    #[tokio::test]
    async fn test_debug_hides_credential() {
        let resolver = CredentialResolver::new();
        let credential = credential_for(ChainKind::Bitcoin, 0x11);
        let mut session = SetupSession::new(7, TTL);
        session.advance("btc", &resolver).unwrap();
        session.advance("private_key", &resolver).unwrap();
        session.advance(&credential, &resolver).unwrap();

        assert!(!format!("{:?}", session).contains(&credential));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_expiry() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.start(1);
        store.start(2);

        tokio::time::advance(Duration::from_secs(30)).await;
        store.start(3);
        assert!(store.get(1).is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(store.get(1).is_none());
        assert_eq!(store.len(), 2);

        assert_eq!(store.purge_expired(), 1);
        assert!(store.get(3).is_some());
        assert_eq!(store.len(), 1);
    }
}
