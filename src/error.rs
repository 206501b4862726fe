//! Error types

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the NIP-44 cipher. Every variant fails closed: no plaintext is
/// returned alongside any of them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Envelope version byte (or leading `#`) is not one we understand
    #[error("unsupported encryption version")]
    UnsupportedVersion,

    /// MAC mismatch: corrupt payload or not encrypted for this key
    #[error("authentication failed")]
    AuthenticationFailure,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid padding")]
    InvalidPadding,

    #[error("plaintext is not valid UTF-8")]
    InvalidEncoding,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Plaintext must be between 1 and 65535 bytes
    #[error("invalid plaintext length: {0}")]
    InvalidPlaintextLength(usize),
}

/// Client error type
#[derive(Error, Debug)]
pub enum Error {
    /// Could not reach or talk to a relay; retryable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Relay answered `OK false`
    #[error("Event publish failed: {0}")]
    Publish(String),

    /// Deadline elapsed; the event may or may not have reached the relay
    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Not connected to relay")]
    NotConnected,

    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Relay sent something that is not a valid protocol message
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Invalid signature")]
    InvalidSignature,

    /// The event changed after its id was computed
    #[error("Event id is stale for event {0}")]
    StaleId(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("No identity found at {}", .0.display())]
    IdentityNotFound(PathBuf),

    /// The session was cancelled before the operation finished
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same operation is safe and may succeed.
    ///
    /// Publishing is idempotent by event id, so an ambiguous timeout is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Timeout(_))
    }
}

/// Client result type
pub type Result<T> = std::result::Result<T, Error>;
