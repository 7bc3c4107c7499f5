//! Per-session bookkeeping

use crate::error::StationError;
use crate::observability::metrics;
use crate::protocol::{Command, Endpoint};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Counters for one registered session, logged when it ends
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: Uuid,
    pub endpoint: String,
    pub connected_at: DateTime<Utc>,
    pub frames_sent: u64,
    pub frame_bytes_sent: u64,
    pub commands_received: u64,
    pub malformed_messages: u64,
}

impl SessionStats {
    pub fn new(endpoint: &Endpoint) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            endpoint: endpoint.url().to_string(),
            connected_at: Utc::now(),
            frames_sent: 0,
            frame_bytes_sent: 0,
            commands_received: 0,
            malformed_messages: 0,
        }
    }

    pub fn record_frame(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.frame_bytes_sent += bytes as u64;
        metrics().frame_sent(bytes);
    }

    pub fn record_command(&mut self, command: &Command) {
        self.commands_received += 1;
        metrics().command_received();
        info!(
            command = %command.name,
            direction = %command.direction,
            "Received command"
        );
    }

    /// Log an inbound payload that could not be decoded
    pub fn record_malformed(&mut self, error: &StationError) {
        self.malformed_messages += 1;
        metrics().malformed_message();
        match error {
            StationError::Decode { message, raw } => {
                warn!(raw = %raw, reason = %message, "Ignoring malformed message");
            }
            other => warn!(error = %other, "Ignoring malformed message"),
        }
    }

    /// Log the session summary; `ended_by` is `None` on shutdown
    pub fn log_summary(&self, ended_by: Option<&StationError>) {
        let duration_secs = (Utc::now() - self.connected_at).num_seconds();
        let reason = ended_by
            .map(|e| e.to_string())
            .unwrap_or_else(|| "shutdown".to_string());

        info!(
            session_id = %self.session_id,
            endpoint = %self.endpoint,
            connected_at = %self.connected_at.to_rfc3339(),
            duration_secs,
            frames_sent = self.frames_sent,
            frame_bytes_sent = self.frame_bytes_sent,
            commands_received = self.commands_received,
            malformed_messages = self.malformed_messages,
            reason = %reason,
            "Session ended"
        );
    }
}
