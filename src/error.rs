//! Error taxonomy for the station link client
//!
//! Every failure the client can observe collapses into one of four kinds.
//! The retry loop only ever inspects the kind: anything but
//! [`ErrorKind::Fatal`] moves it to the next candidate or the next sweep.

use crate::capture::CaptureError;
use crate::config::ConfigError;
use crate::transport::TransportError;
use std::fmt;
use thiserror::Error;

/// Closed classification of station errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Handshake failed, timed out or the endpoint was unusable
    Connect,
    /// Session-level failure after the handshake (send, receive, close, capture)
    Protocol,
    /// Inbound payload could not be decoded as an envelope
    Decode,
    /// Local failure that must terminate the process
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connect => "connect",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Decode => "decode",
            ErrorKind::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for station link operations
#[derive(Debug, Error)]
pub enum StationError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to decode envelope: {message}")]
    Decode { message: String, raw: String },

    #[error("Failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Fatal error: {message}")]
    Fatal { message: String },
}

impl StationError {
    /// Classify this error for the retry loop
    pub fn kind(&self) -> ErrorKind {
        match self {
            StationError::Transport(e) => e.kind(),
            StationError::Capture(e) => e.kind(),
            StationError::Config(_) => ErrorKind::Fatal,
            StationError::Decode { .. } => ErrorKind::Decode,
            StationError::Encode(_) => ErrorKind::Protocol,
            StationError::Fatal { .. } => ErrorKind::Fatal,
        }
    }

    /// Whether the retry loop may recover from this error
    pub fn is_retryable(&self) -> bool {
        self.kind() != ErrorKind::Fatal
    }

    /// Create decode error, keeping the offending payload for logging
    pub fn decode<S: Into<String>, R: Into<String>>(message: S, raw: R) -> Self {
        Self::Decode {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// Create fatal error
    pub fn fatal<S: Into<String>>(message: S) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }
}

/// Result type for station operations
pub type StationResult<T> = Result<T, StationError>;
