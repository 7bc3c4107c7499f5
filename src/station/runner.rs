//! Connection and retry loop
//!
//! The runner walks the endpoint candidates in order, registers on the first
//! one that accepts, and hands the session to its [`SteadyState`]. When a
//! sweep is exhausted, or a registered session fails, it waits the fixed
//! backoff on the injected clock and starts over from the first candidate.
//! Only fatal errors leave the loop; a shutdown signal ends it cleanly.

use super::link::{log_state_transition, LinkEvent, LinkState, RetryPolicy};
use super::{SessionStats, SteadyState};
use crate::clock::Clock;
use crate::error::{StationError, StationResult};
use crate::observability::metrics;
use crate::protocol::{Endpoint, OutboundEnvelope};
use crate::transport::{Connector, Session};
use crate::{session_span, sweep_span};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

/// Identity, candidates and retry policy of one station
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub station_id: String,
    pub endpoints: Vec<Endpoint>,
    pub policy: RetryPolicy,
}

pub struct StationRunner<C: Connector, M: SteadyState> {
    settings: LinkSettings,
    connector: C,
    steady: M,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
    sweeps: u64,
}

impl<C: Connector, M: SteadyState> StationRunner<C, M> {
    pub fn new(
        settings: LinkSettings,
        connector: C,
        steady: M,
        clock: Arc<dyn Clock>,
        shutdown: watch::Receiver<bool>,
    ) -> StationResult<Self> {
        if settings.endpoints.is_empty() {
            return Err(StationError::fatal("no endpoint candidates to connect to"));
        }

        Ok(Self {
            settings,
            connector,
            steady,
            clock,
            shutdown,
            sweeps: 0,
        })
    }

    /// Number of sweeps started so far
    pub fn sweeps_started(&self) -> u64 {
        self.sweeps
    }

    /// Run until shutdown or a fatal error
    pub async fn run(&mut self) -> StationResult<()> {
        let candidate_count = self.settings.endpoints.len();
        let mut state = LinkState::Disconnected;
        let mut live: Option<C::Session> = None;

        info!(
            station_id = %self.settings.station_id,
            mode = %self.steady.mode(),
            candidates = candidate_count,
            "Station link starting"
        );

        loop {
            let stopping = *self.shutdown.borrow();
            if stopping {
                if let Some(mut session) = live.take() {
                    session.close().await;
                }
                info!("Shutdown requested, station link stopped");
                return Ok(());
            }

            let event = match state {
                LinkState::Disconnected => {
                    if !self.wait_before_sweep().await {
                        continue;
                    }
                    LinkEvent::SweepStarted
                }
                LinkState::Connecting(candidate) => {
                    let span = sweep_span!(sweep = self.sweeps, candidate = candidate);
                    match self.connect_and_register(candidate).instrument(span).await {
                        Ok(Some(session)) => {
                            live = Some(session);
                            LinkEvent::Registered
                        }
                        Ok(None) => continue,
                        Err(error) if !error.is_retryable() => return Err(error),
                        Err(error) => {
                            warn!(
                                candidate,
                                endpoint = %self.settings.endpoints[candidate],
                                kind = %error.kind(),
                                error = %error,
                                "Connection attempt failed"
                            );
                            LinkEvent::Failed
                        }
                    }
                }
                LinkState::Registered(_) => LinkEvent::SteadyEntered,
                LinkState::Steady(candidate) => match live.take() {
                    Some(mut session) => {
                        let outcome = self.run_session(&mut session, candidate).await;
                        session.close().await;
                        match outcome {
                            None => continue,
                            Some(error) if !error.is_retryable() => {
                                error!(error = %error, "Fatal error during session");
                                return Err(error);
                            }
                            Some(_) => LinkEvent::Failed,
                        }
                    }
                    None => LinkEvent::Failed,
                },
                LinkState::Failed { .. } => LinkEvent::Retry,
            };

            let next = state.next(event, candidate_count);
            log_state_transition(&state, &next);
            record_transition(&state, &next);
            state = next;
        }
    }

    /// Wait the backoff before a sweep; false when shutdown interrupted it
    async fn wait_before_sweep(&mut self) -> bool {
        let delay = self.settings.policy.delay_before_sweep(self.sweeps);
        if !delay.is_zero() {
            info!(backoff_ms = delay.as_millis() as u64, "Waiting before next sweep");
            tokio::select! {
                _ = self.clock.sleep(delay) => {}
                _ = shutdown_signalled(&mut self.shutdown) => return false,
            }
        }

        self.sweeps += 1;
        metrics().sweep_started();
        info!(
            sweep = self.sweeps,
            candidates = self.settings.endpoints.len(),
            "Starting endpoint sweep"
        );
        true
    }

    /// Handshake with one candidate and send the registration
    ///
    /// Returns `Ok(None)` when shutdown interrupted the handshake.
    async fn connect_and_register(&mut self, candidate: usize) -> StationResult<Option<C::Session>> {
        let endpoint = &self.settings.endpoints[candidate];
        info!(endpoint = %endpoint, "Connecting");
        metrics().connection_attempt();

        let connected = tokio::select! {
            result = self.connector.connect(endpoint) => result,
            _ = shutdown_signalled(&mut self.shutdown) => return Ok(None),
        };
        let mut session = match connected {
            Ok(session) => session,
            Err(error) => {
                metrics().connection_failed();
                return Err(error.into());
            }
        };

        let station_id = &self.settings.station_id;
        let register = OutboundEnvelope::register(
            station_id,
            &self.steady.mode().registration_message(station_id),
        );
        let sent = match register.to_json() {
            Ok(text) => session.send_text(text).await.map_err(StationError::from),
            Err(error) => Err(error),
        };
        if let Err(error) = sent {
            session.close().await;
            metrics().connection_failed();
            return Err(error);
        }

        metrics().connection_established();
        info!(endpoint = %endpoint, "Registered with server");
        Ok(Some(session))
    }

    /// Run the steady state on a registered session
    ///
    /// Returns the error that ended the session, or `None` on shutdown.
    async fn run_session(
        &mut self,
        session: &mut C::Session,
        candidate: usize,
    ) -> Option<StationError> {
        let mut stats = SessionStats::new(&self.settings.endpoints[candidate]);
        let span = session_span!(
            session_id = %stats.session_id,
            endpoint = %stats.endpoint,
            mode = %self.steady.mode()
        );

        let outcome = tokio::select! {
            error = self.steady.run(session, &mut stats).instrument(span) => Some(error),
            _ = shutdown_signalled(&mut self.shutdown) => None,
        };

        stats.log_summary(outcome.as_ref());
        metrics().session_ended();
        outcome
    }
}

/// Resolve once the shutdown flag is set; never resolves if the sender is gone
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stopping = *shutdown.borrow_and_update();
        if stopping {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn record_transition(from: &LinkState, to: &LinkState) {
    if let (LinkState::Failed { established: false, .. }, LinkState::Disconnected) = (from, to) {
        metrics().sweep_exhausted();
    }

    let name = match to {
        LinkState::Disconnected => "disconnected",
        LinkState::Connecting(_) => "connecting",
        LinkState::Registered(_) => "registered",
        LinkState::Steady(_) => "steady",
        LinkState::Failed { .. } => "failed",
    };
    metrics().set_link_state(name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::CommandRelay;
    use crate::testing::{MockClock, MockConnector};
    use std::time::Duration;

    fn settings(candidates: usize) -> LinkSettings {
        LinkSettings {
            station_id: "RPI1".to_string(),
            endpoints: (0..candidates)
                .map(|i| Endpoint::new(format!("ws://host{i}:5000/rpi/RPI1")))
                .collect(),
            policy: RetryPolicy::new(Duration::from_secs(5)),
        }
    }

    #[test]
    fn test_empty_candidate_list_is_fatal() {
        let (_tx, rx) = watch::channel(false);
        let result = StationRunner::new(
            settings(0),
            MockConnector::new(),
            CommandRelay::new("RPI1"),
            Arc::new(MockClock::new()),
            rx,
        );
        assert!(matches!(result, Err(StationError::Fatal { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_before_start_returns_immediately() {
        let (tx, rx) = watch::channel(false);
        let connector = MockConnector::new();
        let attempts = connector.attempts_handle();
        let mut runner = StationRunner::new(
            settings(2),
            connector,
            CommandRelay::new("RPI1"),
            Arc::new(MockClock::new()),
            rx,
        )
        .unwrap();

        tx.send(true).unwrap();
        runner.run().await.unwrap();

        assert!(attempts.lock().await.is_empty());
        assert_eq!(runner.sweeps_started(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_script_trips_shutdown() {
        let (tx, rx) = watch::channel(false);
        let connector = MockConnector::new().fail(4).shutdown_when_exhausted(tx);
        let attempts = connector.attempts_handle();
        let clock = Arc::new(MockClock::new());
        let mut runner = StationRunner::new(
            settings(2),
            connector,
            CommandRelay::new("RPI1"),
            clock.clone(),
            rx,
        )
        .unwrap();

        runner.run().await.unwrap();

        // two full sweeps, then the first attempt of the third trips shutdown
        assert_eq!(attempts.lock().await.len(), 5);
        assert_eq!(runner.sweeps_started(), 3);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5); 2]);
    }
}
