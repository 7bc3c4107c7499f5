//! Relay-mode steady state
//!
//! Inbound messages are handled one at a time in arrival order. Each decoded
//! command goes to the [`CommandHandler`] and is then acknowledged; payloads
//! that do not decode are logged and left unanswered.

use super::{CommandHandler, LinkMode, NoopCommandHandler, SessionStats, SteadyState};
use crate::error::{StationError, StationResult};
use crate::observability::metrics;
use crate::protocol::{InboundEnvelope, OutboundEnvelope};
use crate::transport::Session;
use async_trait::async_trait;
use tracing::{debug, warn};

pub struct CommandRelay<H = NoopCommandHandler> {
    station_id: String,
    handler: H,
}

impl CommandRelay<NoopCommandHandler> {
    pub fn new(station_id: impl Into<String>) -> Self {
        Self::with_handler(station_id, NoopCommandHandler)
    }
}

impl<H: CommandHandler> CommandRelay<H> {
    pub fn with_handler(station_id: impl Into<String>, handler: H) -> Self {
        Self {
            station_id: station_id.into(),
            handler,
        }
    }

    /// Handle one inbound payload and return the reply to send, if any
    pub async fn handle_message(
        &self,
        text: &str,
        stats: &mut SessionStats,
    ) -> StationResult<Option<String>> {
        let envelope = match InboundEnvelope::decode(text) {
            Ok(envelope) => envelope,
            Err(error) => {
                stats.record_malformed(&error);
                return Ok(None);
            }
        };

        let command = envelope.command();
        stats.record_command(&command);
        self.handler.handle(&command).await;

        let ack = OutboundEnvelope::command_ack(&self.station_id, &command);
        Ok(Some(ack.to_json()?))
    }
}

#[async_trait]
impl<H: CommandHandler> SteadyState for CommandRelay<H> {
    fn mode(&self) -> LinkMode {
        LinkMode::Relay
    }

    async fn run(&mut self, session: &mut dyn Session, stats: &mut SessionStats) -> StationError {
        loop {
            let text = match session.recv().await {
                Ok(text) => text,
                Err(error) => {
                    let error = StationError::from(error);
                    warn!(kind = %error.kind(), error = %error, "Command relay stopped");
                    return error;
                }
            };

            let reply = match self.handle_message(&text, stats).await {
                Ok(reply) => reply,
                Err(error) => return error,
            };

            if let Some(reply) = reply {
                if let Err(error) = session.send_text(reply).await {
                    let error = StationError::from(error);
                    warn!(kind = %error.kind(), error = %error, "Failed to send acknowledgement");
                    return error;
                }
                metrics().ack_sent();
                debug!("Acknowledgement sent");
            }
        }
    }
}
