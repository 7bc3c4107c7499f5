//! Transport layer for the station link
//!
//! This module provides the channel abstraction the retry loop is written
//! against, and the WebSocket implementation used in the field.

use crate::protocol::Endpoint;
use std::time::Duration;

pub mod websocket;

pub use websocket::{TransportError, WsConnector, WsSession};

/// Opens channel sessions against endpoint candidates
///
/// Separating the connector from the session lets the retry loop own each
/// session for exactly one connect/steady-state cycle, and lets tests script
/// connection outcomes per candidate.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    type Session: Session + 'static;

    /// Perform the handshake against one candidate
    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Session, TransportError>;
}

/// One live, ordered, full-duplex text channel
#[async_trait::async_trait]
pub trait Session: Send {
    /// Send one text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next text frame
    ///
    /// A clean close by the peer is reported as [`TransportError::Closed`].
    async fn recv(&mut self) -> Result<String, TransportError>;

    /// Wait at most `wait` for the next text frame
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn recv_timeout(&mut self, wait: Duration) -> Result<Option<String>, TransportError> {
        match tokio::time::timeout(wait, self.recv()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Close the channel; errors from an already-dead channel are ignored
    async fn close(&mut self);
}
