//! Error types shared by every layer of the miio client.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::session::state::SessionStateError;

/// Failure modes of a miio exchange.
///
/// Every variant aborts the current call. Session counters mutated before the
/// failure (the stamp advanced after a send) are kept as they are.
#[derive(Debug, Error)]
pub enum MiioError {
    /// Frame is truncated, carries the wrong magic or a bad length.
    #[error("malformed frame: {0}")]
    Format(String),

    /// Ciphertext is not block aligned or its padding is invalid.
    #[error("payload decryption failed: {0}")]
    Decryption(String),

    /// Device answered with an all-zero payload; the token is wrong.
    #[error("device rejected the token (all-zero payload); re-pairing is required")]
    InvalidToken,

    /// Device answered the command with a JSON `error` member.
    #[error("device returned error {}: {message}", code.map(|c| c.to_string()).unwrap_or_else(|| "?".into()))]
    RemoteCommand {
        /// Numeric code reported by the device, if any.
        code: Option<i64>,
        /// Message reported by the device.
        message: String,
        /// The `error` member exactly as received.
        payload: serde_json::Value,
    },

    /// Reply violates the exchange rules.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Operation attempted before the handshake or after close.
    #[error("session is not connected")]
    NotConnected,

    /// No reply arrived within the deadline.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// Socket-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Token string could not be parsed.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Client configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias for miio operations.
pub type Result<T> = std::result::Result<T, MiioError>;

impl From<std::io::Error> for MiioError {
    fn from(err: std::io::Error) -> Self {
        MiioError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for MiioError {
    fn from(err: serde_json::Error) -> Self {
        MiioError::Protocol(format!("json: {}", err))
    }
}

impl From<SessionStateError> for MiioError {
    fn from(err: SessionStateError) -> Self {
        MiioError::Protocol(err.to_string())
    }
}
