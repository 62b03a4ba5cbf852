//! Wallet setup conversation
//!
//! The chat front-end itself lives outside this crate. It turns owner
//! messages into [`Command`]s and shows whatever the [`Dispatcher`] replies.

pub mod dispatcher;
pub mod session;

pub use dispatcher::{Command, Dispatcher, PairingResult};
pub use session::{SessionId, SessionStore, SetupSession, SetupStep};
