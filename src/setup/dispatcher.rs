//! Front-end command dispatch
//!
//! Every event the conversational front-end produces arrives here as a
//! [`Command`]. The dispatcher answers with the text to show the owner.
//! Owner mistakes (unknown chain, bad key, malformed amount) become replies;
//! only collaborator failures are returned as errors.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::session::{SessionStore, SetupSession, SetupStep};
use crate::chain::{AdapterRegistry, ChainKind};
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::notify::messages;
use crate::wallet::{CredentialResolver, OwnerId, Wallet};

/// Output of the delegated-signing pairing flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingResult {
    pub address: String,
    /// EVM chain id (`1`, `56`, `eip155:1`) or a chain name
    pub chain_id: String,
}

/// Events from the front-end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start`
    Start,
    /// `/setwallet`
    SetWallet,
    /// `/checkbalance`
    CheckBalance,
    /// Free text, consumed by the active setup session
    Input(String),
    /// Pairing finished for the active delegated setup
    Paired(PairingResult),
    /// `/cancel`
    Cancel,
}

pub struct Dispatcher {
    sessions: SessionStore,
    ledger: Arc<dyn Ledger>,
    registry: AdapterRegistry,
    resolver: CredentialResolver,
}

impl Dispatcher {
    pub fn new(ledger: Arc<dyn Ledger>, registry: AdapterRegistry, session_ttl: Duration) -> Self {
        Self {
            sessions: SessionStore::new(session_ttl),
            ledger,
            registry,
            resolver: CredentialResolver::new(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one command from `owner_id`, returning the reply text
    pub async fn handle(&self, owner_id: OwnerId, command: Command) -> Result<String> {
        match command {
            Command::Start => Ok(messages::welcome()),
            Command::SetWallet => {
                let session = self.sessions.start(owner_id);
                info!(owner_id, "Wallet setup started");
                Ok(session.prompt())
            }
            Command::CheckBalance => self.check_balance(owner_id).await,
            Command::Input(text) => self.input(owner_id, &text).await,
            Command::Paired(pairing) => self.paired(owner_id, pairing).await,
            Command::Cancel => match self.sessions.remove(owner_id) {
                Some(_) => Ok("Setup cancelled.".into()),
                None => Ok("Nothing to cancel.".into()),
            },
        }
    }

    /// Live session, or the reply explaining why there is none
    fn live_session(&self, owner_id: OwnerId) -> std::result::Result<SetupSession, String> {
        if self.sessions.take_expired(owner_id) {
            return Err("Your setup session expired. Send /setwallet to start again.".into());
        }
        self.sessions
            .get(owner_id)
            .ok_or_else(|| "Send /setwallet to register a wallet.".to_string())
    }

    async fn input(&self, owner_id: OwnerId, text: &str) -> Result<String> {
        let mut session = match self.live_session(owner_id) {
            Ok(session) => session,
            Err(reply) => return Ok(reply),
        };

        match session.advance(text, &self.resolver) {
            Ok(SetupStep::Done) => {
                self.sessions.remove(owner_id);
                let wallet = session.into_wallet()?;
                self.save(wallet).await
            }
            Ok(_) => {
                let prompt = session.prompt();
                self.sessions.put(session);
                Ok(prompt)
            }
            Err(e) if is_owner_mistake(&e) => Ok(format!("{}\n{}", e, session.prompt())),
            Err(e) => Err(e),
        }
    }

    async fn paired(&self, owner_id: OwnerId, pairing: PairingResult) -> Result<String> {
        let mut session = match self.live_session(owner_id) {
            Ok(session) => session,
            Err(reply) => return Ok(reply),
        };

        let outcome = ChainKind::from_pairing_chain_id(&pairing.chain_id)
            .and_then(|chain| session.pair(&pairing.address, chain, &self.resolver));

        match outcome {
            Ok(_) => {
                info!(owner_id, address = %pairing.address, "Wallet paired");
                let prompt = session.prompt();
                self.sessions.put(session);
                Ok(prompt)
            }
            Err(e) if is_owner_mistake(&e) => Ok(format!("Pairing rejected: {}", e)),
            Err(e) => Err(e),
        }
    }

    async fn save(&self, wallet: Wallet) -> Result<String> {
        let reply = format!(
            "Wallet set up: {} `{}`\nFunds will be swept to `{}`.",
            wallet.chain.symbol(),
            wallet.address,
            wallet.receiver_address
        );

        match self.ledger.insert_wallet(wallet.clone()).await {
            Ok(()) => {
                info!(
                    wallet_id = %wallet.id,
                    owner_id = wallet.owner_id,
                    chain = %wallet.chain,
                    "Wallet registered"
                );
                Ok(reply)
            }
            Err(Error::Ledger(reason)) if reason.contains("already") => {
                Ok("This wallet is already registered.".into())
            }
            Err(e) => Err(e),
        }
    }

    async fn check_balance(&self, owner_id: OwnerId) -> Result<String> {
        let wallets = self.ledger.list_wallets_by_owner(owner_id).await?;
        if wallets.is_empty() {
            return Ok("No wallet found. Use /setwallet first!".into());
        }

        let mut lines = Vec::with_capacity(wallets.len());
        for wallet in &wallets {
            let line = match self.balance_of(wallet).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(wallet_id = %wallet.id, "Balance check failed: {}", e);
                    format!(
                        "{} `{}`\nBalance unavailable right now.",
                        wallet.chain.symbol(),
                        wallet.address
                    )
                }
            };
            lines.push(line);
        }

        Ok(lines.join("\n\n"))
    }

    async fn balance_of(&self, wallet: &Wallet) -> Result<String> {
        let adapter = self.registry.get(wallet.chain)?;
        let balance = adapter.get_balance(&wallet.address).await?;
        Ok(messages::balance(wallet, balance))
    }
}

fn is_owner_mistake(error: &Error) -> bool {
    matches!(
        error,
        Error::InvalidAddress(_)
            | Error::UnsupportedChain(_)
            | Error::Credential(_)
            | Error::Derivation(_)
            | Error::Config(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::test_support::{credential_for, receiver_for, wallet_fixture, MockAdapter};
    use crate::wallet::CredentialKind;

    const OWNER: OwnerId = 77;

    fn dispatcher(ledger: Arc<MemoryLedger>) -> Dispatcher {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(
            MockAdapter::new(ChainKind::Tron, 100_000).with_balance(2_500_000),
        ));
        Dispatcher::new(ledger, registry, Duration::from_secs(600))
    }

    async fn send(d: &Dispatcher, text: &str) -> String {
        d.handle(OWNER, Command::Input(text.into())).await.unwrap()
    }

    #[tokio::test]
    async fn test_full_setup_creates_wallet() {
        let ledger = Arc::new(MemoryLedger::new());
        let d = dispatcher(ledger.clone());

        let prompt = d.handle(OWNER, Command::SetWallet).await.unwrap();
        assert!(prompt.contains("Which chain"));

        send(&d, "tron").await;
        send(&d, "private_key").await;
        send(&d, &credential_for(ChainKind::Tron, 0x11)).await;
        send(&d, receiver_for(ChainKind::Tron)).await;
        let reply = send(&d, "0").await;
        assert!(reply.contains("Wallet set up"));

        let wallets = ledger.list_wallets_by_owner(OWNER).await.unwrap();
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].threshold, 0);
        assert_eq!(wallets[0].address, wallet_fixture(ChainKind::Tron, 0).address);
        assert!(d.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_mistakes_are_replies() {
        let ledger = Arc::new(MemoryLedger::new());
        let d = dispatcher(ledger.clone());
        d.handle(OWNER, Command::SetWallet).await.unwrap();

        let reply = send(&d, "dogecoin").await;
        assert!(reply.contains("Unsupported chain"));
        assert!(reply.contains("Which chain"));
    }

    #[tokio::test]
    async fn test_input_without_session() {
        let d = dispatcher(Arc::new(MemoryLedger::new()));
        assert!(send(&d, "tron").await.contains("/setwallet"));
        assert_eq!(
            d.handle(OWNER, Command::Cancel).await.unwrap(),
            "Nothing to cancel."
        );
    }

    #[tokio::test]
    async fn test_cancel_discards_session() {
        let ledger = Arc::new(MemoryLedger::new());
        let d = dispatcher(ledger.clone());
        d.handle(OWNER, Command::SetWallet).await.unwrap();
        send(&d, "tron").await;

        assert_eq!(d.handle(OWNER, Command::Cancel).await.unwrap(), "Setup cancelled.");
        assert!(d.sessions().get(OWNER).is_none());
        assert!(ledger.list_wallets().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session() {
        let d = dispatcher(Arc::new(MemoryLedger::new()));
        d.handle(OWNER, Command::SetWallet).await.unwrap();

        tokio::time::advance(Duration::from_secs(601)).await;
        assert!(send(&d, "tron").await.contains("expired"));
    }

    #[tokio::test]
    async fn test_pairing_creates_delegated_wallet() {
        let ledger = Arc::new(MemoryLedger::new());
        let d = dispatcher(ledger.clone());
        d.handle(OWNER, Command::SetWallet).await.unwrap();
        send(&d, "ethereum").await;
        let prompt = send(&d, "delegated").await;
        assert!(prompt.contains("paired"));

        let address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
        let wrong_chain = d
            .handle(
                OWNER,
                Command::Paired(PairingResult {
                    address: address.into(),
                    chain_id: "56".into(),
                }),
            )
            .await
            .unwrap();
        assert!(wrong_chain.contains("Pairing rejected"));

        d.handle(
            OWNER,
            Command::Paired(PairingResult {
                address: address.into(),
                chain_id: "eip155:1".into(),
            }),
        )
        .await
        .unwrap();
        send(&d, receiver_for(ChainKind::Ethereum)).await;
        send(&d, "0.5").await;

        let wallets = ledger.list_wallets_by_owner(OWNER).await.unwrap();
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].credential_kind, CredentialKind::Delegated);
        assert_eq!(wallets[0].address, address);
        assert_eq!(wallets[0].credential, address);
        assert_eq!(wallets[0].threshold, 500_000_000_000_000_000);
    }

    #[tokio::test]
    async fn test_check_balance() {
        let mut tron = wallet_fixture(ChainKind::Tron, 1_000_000);
        tron.owner_id = OWNER;
        let mut sol = wallet_fixture(ChainKind::Solana, 0);
        sol.owner_id = OWNER;
        let ledger = Arc::new(MemoryLedger::with_wallets(vec![tron, sol]));
        let d = dispatcher(ledger);

        let reply = d.handle(OWNER, Command::CheckBalance).await.unwrap();
        assert!(reply.contains("2.5 TRX"));
        // No adapter registered for Solana
        assert!(reply.contains("unavailable"));

        let other = d.handle(OWNER + 1, Command::CheckBalance).await.unwrap();
        assert!(other.contains("No wallet found"));
    }

    #[tokio::test]
    async fn test_start_sends_welcome() {
        let d = dispatcher(Arc::new(MemoryLedger::new()));
        let reply = d.handle(OWNER, Command::Start).await.unwrap();
        assert!(reply.contains("/setwallet"));
    }
}
