use std::{io::Error as IoError, result::Result as StdResult};

use thiserror::Error;

/// The main error type for kp-client operations
#[derive(Error, Debug)]
pub enum Error {
    /// Establishing the connection failed
    #[error("Connect error: {0}")]
    Connect(String),

    /// The live socket reported an error
    #[error("Socket error: {0}")]
    Socket(String),

    /// Encoding or decoding a frame failed
    #[error("Protocol error: {0}")]
    Protocol(#[from] kp_protocol::Error),

    /// Invalid client configuration
    #[error("Config error: {0}")]
    Config(String),

    /// IO-related errors
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// No reply arrived for a request within its timeout
    #[error("Timed out waiting for '{action}'")]
    Timeout {
        /// Inbound action that was awaited.
        action: &'static str,
    },

    /// The client or session was disposed while an operation was pending
    #[error("Client disposed")]
    Disposed,
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<ron::error::SpannedError> for Error {
    fn from(err: ron::error::SpannedError) -> Self {
        Self::Config(err.to_string())
    }
}
