//! Pure connection helpers for the WebSocket transport
//!
//! Endpoint parsing and the mapping from transport failures to the
//! station's error kinds live here, away from the socket I/O.

use crate::error::ErrorKind;
use crate::protocol::Endpoint;
use thiserror::Error;
use tokio_tungstenite::tungstenite;
use url::Url;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// WebSocket transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid endpoint URL {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("Connection to {endpoint} failed: {source}")]
    ConnectionFailed {
        endpoint: String,
        #[source]
        source: BoxError,
    },
    #[error("Connection to {endpoint} timed out after {timeout_ms}ms")]
    ConnectTimeout { endpoint: String, timeout_ms: u64 },
    #[error("Send failed: {0}")]
    SendFailed(#[source] BoxError),
    #[error("Receive failed: {0}")]
    ReceiveFailed(#[source] BoxError),
    #[error("Channel closed by peer")]
    Closed,
}

impl TransportError {
    /// Handshake-phase failures are connect errors, everything later is protocol
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::InvalidEndpoint { .. }
            | TransportError::ConnectionFailed { .. }
            | TransportError::ConnectTimeout { .. } => ErrorKind::Connect,
            TransportError::SendFailed(_)
            | TransportError::ReceiveFailed(_)
            | TransportError::Closed => ErrorKind::Protocol,
        }
    }

    /// Map a tungstenite error raised while sending
    pub fn from_send(error: tungstenite::Error) -> Self {
        if is_closed(&error) {
            TransportError::Closed
        } else {
            TransportError::SendFailed(Box::new(error))
        }
    }

    /// Map a tungstenite error raised while receiving
    pub fn from_receive(error: tungstenite::Error) -> Self {
        if is_closed(&error) {
            TransportError::Closed
        } else {
            TransportError::ReceiveFailed(Box::new(error))
        }
    }
}

fn is_closed(error: &tungstenite::Error) -> bool {
    matches!(
        error,
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
    )
}

/// Parse an endpoint into a WebSocket URL (pure function)
pub fn parse_endpoint(endpoint: &Endpoint) -> Result<Url, TransportError> {
    let invalid = |reason: String| TransportError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let url = Url::parse(endpoint.url()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        let url = parse_endpoint(&Endpoint::new("ws://localhost:5000/rpi/RPI1")).unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(5000));
        assert_eq!(url.path(), "/rpi/RPI1");

        let url = parse_endpoint(&Endpoint::new(
            "wss://xeryonremotedemostation.replit.app/rpi/station-8",
        ))
        .unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.port_or_known_default(), Some(443));
    }

    #[test]
    fn test_parse_endpoint_rejects_other_schemes() {
        let result = parse_endpoint(&Endpoint::new("http://localhost:5000/rpi/RPI1"));
        assert!(matches!(
            result,
            Err(TransportError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_parse_endpoint_rejects_garbage() {
        let result = parse_endpoint(&Endpoint::new("localhost"));
        assert!(matches!(
            result,
            Err(TransportError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_error_kinds() {
        let connect_errors = vec![
            TransportError::InvalidEndpoint {
                endpoint: "x".to_string(),
                reason: "y".to_string(),
            },
            TransportError::ConnectionFailed {
                endpoint: "x".to_string(),
                source: "refused".to_string().into(),
            },
            TransportError::ConnectTimeout {
                endpoint: "x".to_string(),
                timeout_ms: 10,
            },
        ];
        for error in connect_errors {
            assert_eq!(error.kind(), ErrorKind::Connect, "{error}");
        }

        let protocol_errors = vec![
            TransportError::SendFailed("broken pipe".to_string().into()),
            TransportError::ReceiveFailed("reset".to_string().into()),
            TransportError::Closed,
        ];
        for error in protocol_errors {
            assert_eq!(error.kind(), ErrorKind::Protocol, "{error}");
        }
    }

    #[test]
    fn test_closed_tungstenite_errors_map_to_closed() {
        assert!(matches!(
            TransportError::from_send(tungstenite::Error::ConnectionClosed),
            TransportError::Closed
        ));
        assert!(matches!(
            TransportError::from_receive(tungstenite::Error::AlreadyClosed),
            TransportError::Closed
        ));
        assert!(matches!(
            TransportError::from_send(tungstenite::Error::Io(std::io::Error::other(
                "broken pipe"
            ))),
            TransportError::SendFailed(_)
        ));
    }

    #[test]
    fn test_error_display() {
        let error = TransportError::ConnectTimeout {
            endpoint: "ws://localhost:5000/rpi/RPI1".to_string(),
            timeout_ms: 250,
        };
        assert_eq!(
            error.to_string(),
            "Connection to ws://localhost:5000/rpi/RPI1 timed out after 250ms"
        );
        assert_eq!(TransportError::Closed.to_string(), "Channel closed by peer");
    }
}
