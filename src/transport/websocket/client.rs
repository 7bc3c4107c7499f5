//! Impure I/O operations for the WebSocket transport
//!
//! Wraps tokio-tungstenite behind the [`Connector`]/[`Session`] traits.

use super::connection::{parse_endpoint, TransportError};
use super::message_handler::{FrameRoute, MessageHandler};
use crate::protocol::Endpoint;
use crate::transport::{Connector, Session};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket sessions with a bounded handshake
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Session = WsSession;

    async fn connect(&self, endpoint: &Endpoint) -> Result<WsSession, TransportError> {
        let url = parse_endpoint(endpoint)?;

        match tokio::time::timeout(self.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((stream, response))) => {
                info!(
                    endpoint = %endpoint,
                    status = %response.status(),
                    "WebSocket handshake complete"
                );
                Ok(WsSession {
                    stream,
                    endpoint: endpoint.clone(),
                })
            }
            Ok(Err(e)) => Err(TransportError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                source: Box::new(e),
            }),
            Err(_) => Err(TransportError::ConnectTimeout {
                endpoint: endpoint.to_string(),
                timeout_ms: self.connect_timeout.as_millis() as u64,
            }),
        }
    }
}

/// Live WebSocket session
pub struct WsSession {
    stream: WsStream,
    endpoint: Endpoint,
}

impl WsSession {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Session for WsSession {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(TransportError::from_send)
    }

    async fn recv(&mut self) -> Result<String, TransportError> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(TransportError::from_receive(e)),
                None => return Err(TransportError::Closed),
            };

            match MessageHandler::route_frame(message) {
                FrameRoute::Deliver(text) => return Ok(text),
                FrameRoute::Closed { reason } => {
                    debug!(
                        endpoint = %self.endpoint,
                        reason = reason.as_deref().unwrap_or(""),
                        "Close frame received"
                    );
                    return Err(TransportError::Closed);
                }
                FrameRoute::Skip => continue,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(endpoint = %self.endpoint, "Close on dead channel: {}", e);
        }
    }
}
