//! Error types for the native host client.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::RequestType;

/// Result type alias for host operations.
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors that can occur while talking to the native host.
#[derive(Debug, Error)]
pub enum HostError {
    /// No correlated response arrived within the timeout window of one attempt.
    #[error("native host did not respond to `{request_type}` within {}ms", timeout.as_millis())]
    Timeout {
        request_type: RequestType,
        timeout: Duration,
    },

    /// A correlated response arrived with `result = error` or an unrecognized result code.
    #[error("native host answered `{request_type}` with result `{result}`")]
    Protocol {
        request_type: RequestType,
        result: String,
    },

    /// The handshake never completed within the retry budget.
    #[error("native host unavailable after {attempts} handshake attempt(s): {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: Box<HostError>,
    },

    /// No port is open.
    #[error("not connected to the native host")]
    NotConnected,

    /// The port closed while a request was in flight.
    #[error("native host disconnected")]
    Disconnected,

    /// The connector could not open a port.
    #[error("failed to connect to native host `{host_name}`: {reason}")]
    Connect { host_name: String, reason: String },

    /// Host names are restricted to lowercase alphanumerics, `_` and dot-separated segments.
    #[error("invalid native host name `{0}`")]
    InvalidHostName(String),

    /// Manifest missing or malformed.
    #[error("manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    /// Config file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HostError {
    /// Whether a failed attempt is worth a reconnect and another try.
    ///
    /// Application-level `error` results are authoritative: repeating a request the host
    /// rejected will not change the answer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HostError::Timeout { .. }
                | HostError::Unavailable { .. }
                | HostError::NotConnected
                | HostError::Disconnected
                | HostError::Connect { .. }
                | HostError::Io(_)
        )
    }
}
