//! WebSocket transport for the station link
//!
//! Split the same way as the rest of the transport code: pure pieces are
//! kept apart from the I/O so they can be tested without a socket.
//!
//! - [`connection`] - Pure endpoint parsing and error classification
//! - [`message_handler`] - Pure routing of incoming WebSocket frames
//! - [`client`] - Impure connect/send/receive on top of tokio-tungstenite
//!
//! # Usage
//!
//! ```rust,no_run
//! use station_link::protocol::Endpoint;
//! use station_link::transport::{Connector, Session, WsConnector};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let connector = WsConnector::new(Duration::from_secs(10));
//! let mut session = connector
//!     .connect(&Endpoint::new("ws://localhost:5000/rpi/RPI1"))
//!     .await?;
//! session.send_text(r#"{"type":"register","rpi_id":"RPI1"}"#.to_string()).await?;
//! session.close().await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{WsConnector, WsSession};
pub use connection::{parse_endpoint, TransportError};
pub use message_handler::{FrameRoute, MessageHandler};
