//! Error types for the sweep engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sweep engine
#[derive(Error, Debug)]
pub enum Error {
    // Chain errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Insufficient funds: {available} available, fee {fee}")]
    InsufficientFunds { available: u128, fee: u128 },

    #[error("Broadcast rejected: {reason}")]
    BroadcastRejected { reason: String, transient: bool },

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    // Credential errors
    #[error("Derivation failed: {0}")]
    Derivation(String),

    #[error("Credential error: {0}")]
    Credential(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Collaborator errors
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// How the retry controller should treat a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth another attempt after a delay
    Transient,
    /// Retrying cannot help
    Terminal,
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::BroadcastRejected { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Classify this error for the retry controller
    pub fn classify(&self) -> FailureClass {
        if self.is_retryable() {
            FailureClass::Transient
        } else {
            FailureClass::Terminal
        }
    }

    /// Shorthand for a terminal broadcast rejection
    pub fn rejected(reason: impl Into<String>) -> Self {
        Error::BroadcastRejected {
            reason: reason.into(),
            transient: false,
        }
    }

    /// Shorthand for a rejection the node reported as temporary
    pub fn rejected_transient(reason: impl Into<String>) -> Self {
        Error::BroadcastRejected {
            reason: reason.into(),
            transient: true,
        }
    }
}

// Undecodable bodies are terminal; timeouts, refused connections and
// non-success statuses all count as the node being unreachable.
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Serialization(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        use solana_client::client_error::ClientErrorKind;

        match e.kind() {
            ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => Error::Network(e.to_string()),
            _ => Error::rejected(e.to_string()),
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
