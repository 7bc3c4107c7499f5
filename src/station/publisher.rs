//! Stream-mode steady state
//!
//! One iteration captures a frame, sends it as a `camera_frame` envelope,
//! briefly polls for an inbound message and sleeps the frame interval.

use super::{LinkMode, SessionStats, SteadyState};
use crate::capture::FrameSource;
use crate::clock::Clock;
use crate::config::StreamSection;
use crate::error::{StationError, StationResult};
use crate::observability::metrics;
use crate::protocol::{InboundEnvelope, OutboundEnvelope};
use crate::transport::Session;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct FramePublisher {
    station_id: String,
    source: Box<dyn FrameSource>,
    clock: Arc<dyn Clock>,
    frame_interval: Duration,
    poll_timeout: Duration,
}

impl FramePublisher {
    /// `source` must already be opened
    pub fn new(
        station_id: impl Into<String>,
        source: Box<dyn FrameSource>,
        clock: Arc<dyn Clock>,
        stream: &StreamSection,
    ) -> Self {
        Self {
            station_id: station_id.into(),
            source,
            clock,
            frame_interval: stream.frame_interval(),
            poll_timeout: stream.poll_timeout(),
        }
    }

    async fn publish_frame(
        &mut self,
        session: &mut dyn Session,
        stats: &mut SessionStats,
    ) -> StationResult<()> {
        let jpeg = match self.source.capture().await {
            Ok(frame) => self.source.compress(frame),
            Err(error) => Err(error),
        }
        .map_err(|error| {
            metrics().capture_failed();
            StationError::from(error)
        })?;

        let envelope = OutboundEnvelope::camera_frame(&self.station_id, &jpeg);
        session.send_text(envelope.to_json()?).await?;
        stats.record_frame(jpeg.len());
        debug!(bytes = jpeg.len(), "Frame sent");

        if let Some(text) = session.recv_timeout(self.poll_timeout).await? {
            match InboundEnvelope::decode(&text) {
                Ok(envelope) => stats.record_command(&envelope.command()),
                Err(error) => stats.record_malformed(&error),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl SteadyState for FramePublisher {
    fn mode(&self) -> LinkMode {
        LinkMode::Stream
    }

    async fn run(&mut self, session: &mut dyn Session, stats: &mut SessionStats) -> StationError {
        loop {
            if let Err(error) = self.publish_frame(session, stats).await {
                warn!(kind = %error.kind(), error = %error, "Frame publishing stopped");
                return error;
            }
            self.clock.sleep(self.frame_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::protocol::Endpoint;
    use crate::testing::{MockClock, MockFrameSource, MockSession};
    use serde_json::Value;

    fn publisher(source: MockFrameSource, clock: Arc<MockClock>) -> FramePublisher {
        FramePublisher::new("RPI1", Box::new(source), clock, &StreamSection::default())
    }

    fn stats() -> SessionStats {
        SessionStats::new(&Endpoint::new("ws://localhost:5000/rpi/RPI1"))
    }

    #[tokio::test]
    async fn test_frames_are_sent_until_capture_fails() {
        let clock = Arc::new(MockClock::new());
        let mut publisher = publisher(MockFrameSource::new().with_frame_limit(3), clock.clone());
        let mut session = MockSession::new();
        let sent = session.sent_handle();
        let mut stats = stats();

        let error = publisher.run(&mut session, &mut stats).await;

        assert_eq!(error.kind(), ErrorKind::Protocol);
        assert_eq!(stats.frames_sent, 3);

        let sent = sent.lock().await;
        assert_eq!(sent.len(), 3);
        for text in sent.iter() {
            let value: Value = serde_json::from_str(text).unwrap();
            assert_eq!(value["type"], "camera_frame");
            assert_eq!(value["rpi_id"], "RPI1");
            assert!(value["frame"].as_str().unwrap().starts_with("/9j/"));
        }
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(100); 3]);
    }

    #[tokio::test]
    async fn test_inbound_messages_are_logged_not_answered() {
        let clock = Arc::new(MockClock::new());
        let mut publisher = publisher(MockFrameSource::new().with_frame_limit(2), clock);
        let mut session =
            MockSession::with_inbound(vec![r#"{"command":"move"}"#.to_string(), "{oops".to_string()]);
        let sent = session.sent_handle();
        let mut stats = stats();

        publisher.run(&mut session, &mut stats).await;

        assert_eq!(stats.commands_received, 1);
        assert_eq!(stats.malformed_messages, 1);
        assert_eq!(sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_send_failure_ends_steady_state() {
        let clock = Arc::new(MockClock::new());
        let mut publisher = publisher(MockFrameSource::new(), clock);
        let mut session = MockSession::new().fail_send_after(1);
        let mut stats = stats();

        let error = publisher.run(&mut session, &mut stats).await;

        assert!(matches!(error, StationError::Transport(_)));
        assert_eq!(stats.frames_sent, 1);
    }
}
