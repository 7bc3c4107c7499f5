//! Station Link - Rust Implementation
//!
//! A resilient WebSocket client that links a camera station (typically a
//! Raspberry Pi) to its remote control server.
//!
//! # Overview
//!
//! This crate provides:
//! - Endpoint candidate resolution from URL templates
//! - A retry loop that sweeps the candidates in order with a fixed backoff
//! - Stream mode: camera frames published as base64 JPEG envelopes
//! - Relay mode: remote commands received, handed to a hardware seam and acknowledged
//! - Structured logging and in-process counters
//!
//! # Quick Start
//!
//! ```rust
//! use station_link::protocol::{resolve_endpoints, OutboundEnvelope, DEFAULT_CANDIDATES};
//!
//! let endpoints = resolve_endpoints("RPI1", None, DEFAULT_CANDIDATES);
//! assert_eq!(endpoints[0].url(), "ws://localhost:5000/rpi/RPI1");
//!
//! let register = OutboundEnvelope::register("RPI1", "RPi RPI1 online with camera");
//! let json = register.to_json().unwrap();
//! assert!(json.contains(r#""type":"register""#));
//! ```

pub mod capture;
pub mod clock;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod station;
pub mod testing;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use config::*;
pub use error::{ErrorKind, StationError, StationResult};
pub use protocol::*;
pub use station::{CommandRelay, FramePublisher, LinkMode, LinkSettings, StationRunner};
pub use transport::{Connector, Session, WsConnector};
