//! Station behavior on top of the transport
//!
//! The [`StationRunner`] owns the connect/retry cycle. What happens once a
//! session is registered is a [`SteadyState`]: either the [`FramePublisher`]
//! (stream mode) or the [`CommandRelay`] (relay mode).

use crate::error::StationError;
use crate::transport::Session;
use async_trait::async_trait;
use std::fmt;

pub mod command;
pub mod launch;
pub mod link;
pub mod publisher;
pub mod relay;
pub mod runner;
pub mod session;

pub use command::{CommandHandler, NoopCommandHandler};
pub use launch::{run_relay_station, run_stream_station};
pub use link::{LinkEvent, LinkState, RetryPolicy};
pub use publisher::FramePublisher;
pub use relay::CommandRelay;
pub use runner::{LinkSettings, StationRunner};
pub use session::SessionStats;

/// Which steady-state behavior a station runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Stream,
    Relay,
}

impl LinkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMode::Stream => "stream",
            LinkMode::Relay => "relay",
        }
    }

    /// Readiness text carried by the `register` envelope (pure function)
    pub fn registration_message(&self, station_id: &str) -> String {
        match self {
            LinkMode::Stream => format!("RPi {station_id} online with camera"),
            LinkMode::Relay => format!("RPi {station_id} online"),
        }
    }
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work done on a registered session until it fails
#[async_trait]
pub trait SteadyState: Send {
    fn mode(&self) -> LinkMode;

    /// Drive the session until it fails and return the error that ended it
    ///
    /// Decode errors are handled inside and never end a session.
    async fn run(&mut self, session: &mut dyn Session, stats: &mut SessionStats) -> StationError;
}
