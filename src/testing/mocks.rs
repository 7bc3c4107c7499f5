//! Mock implementations for testing
//!
//! Provides mock Connector, Session, Clock, FrameSource and CommandHandler
//! implementations so the retry loop and both steady states can be driven
//! without a network, a camera or real time.

use crate::capture::{CaptureError, CaptureSettings, FrameSource, RawFrame};
use crate::clock::Clock;
use crate::protocol::{Command, Endpoint};
use crate::station::CommandHandler;
use crate::transport::{Connector, Session, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

/// Smallest byte sequence that passes as a JPEG image
pub const TEST_JPEG: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xD9];

/// A text frame sent on a mock session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Index of the session among all sessions the connector opened
    pub session: usize,
    pub text: String,
}

/// Outcome of one scripted connection attempt
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    Refuse,
    Accept(SessionScript),
}

/// What a session accepted by the mock connector will do
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    pub inbound: Vec<String>,
    pub fail_send_after: Option<usize>,
}

impl SessionScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inbound<I, S>(inbound: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inbound: inbound.into_iter().map(Into::into).collect(),
            fail_send_after: None,
        }
    }

    pub fn fail_send_after(mut self, sends: usize) -> Self {
        self.fail_send_after = Some(sends);
        self
    }
}

/// Mock connector replaying a script of connection outcomes
///
/// When the script runs out every further attempt is refused, and the
/// shutdown sender, if one was given, is tripped so the runner stops.
#[derive(Debug, Default)]
pub struct MockConnector {
    script: Mutex<VecDeque<ConnectOutcome>>,
    attempts: Arc<Mutex<Vec<String>>>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    closed: Arc<AtomicUsize>,
    sessions: AtomicUsize,
    shutdown: Option<watch::Sender<bool>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `attempts` connection attempts
    pub fn fail(mut self, attempts: usize) -> Self {
        let script = self.script.get_mut();
        script.extend(std::iter::repeat(ConnectOutcome::Refuse).take(attempts));
        self
    }

    /// Accept the next attempt with a session following `script`
    pub fn accept(mut self, script: SessionScript) -> Self {
        self.script.get_mut().push_back(ConnectOutcome::Accept(script));
        self
    }

    pub fn shutdown_when_exhausted(mut self, shutdown: watch::Sender<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// URLs of every attempt, in order
    pub fn attempts_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.attempts)
    }

    /// Every text frame sent on any session, in order
    pub fn sent_handle(&self) -> Arc<Mutex<Vec<SentMessage>>> {
        Arc::clone(&self.sent)
    }

    /// Count of sessions closed by the runner
    pub fn closed_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closed)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(&self, endpoint: &Endpoint) -> Result<MockSession, TransportError> {
        self.attempts.lock().await.push(endpoint.url().to_string());

        let outcome = self.script.lock().await.pop_front();
        match outcome {
            Some(ConnectOutcome::Accept(script)) => {
                let index = self.sessions.fetch_add(1, Ordering::SeqCst);
                Ok(MockSession {
                    index,
                    inbound: script.inbound.into(),
                    fail_send_after: script.fail_send_after,
                    sends: 0,
                    sent: Arc::clone(&self.sent),
                    closed: Arc::clone(&self.closed),
                })
            }
            Some(ConnectOutcome::Refuse) => Err(refused(endpoint)),
            None => {
                if let Some(shutdown) = &self.shutdown {
                    let _ = shutdown.send(true);
                }
                Err(refused(endpoint))
            }
        }
    }
}

fn refused(endpoint: &Endpoint) -> TransportError {
    TransportError::ConnectionFailed {
        endpoint: endpoint.url().to_string(),
        source: "connection refused".into(),
    }
}

/// Mock session with scripted inbound frames
///
/// `recv` reports a clean close once the script is drained; `recv_timeout`
/// reports that nothing arrived instead.
#[derive(Debug)]
pub struct MockSession {
    index: usize,
    inbound: VecDeque<String>,
    fail_send_after: Option<usize>,
    sends: usize,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    closed: Arc<AtomicUsize>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::with_inbound(Vec::new())
    }

    pub fn with_inbound(inbound: Vec<String>) -> Self {
        Self {
            index: 0,
            inbound: inbound.into(),
            fail_send_after: None,
            sends: 0,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fail_send_after(mut self, sends: usize) -> Self {
        self.fail_send_after = Some(sends);
        self
    }

    /// Texts sent on this session
    pub fn sent_handle(&self) -> SentTexts {
        SentTexts(Arc::clone(&self.sent))
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle over the texts a standalone [`MockSession`] sent
#[derive(Debug, Clone)]
pub struct SentTexts(Arc<Mutex<Vec<SentMessage>>>);

impl SentTexts {
    pub async fn lock(&self) -> Vec<String> {
        self.0.lock().await.iter().map(|m| m.text.clone()).collect()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.fail_send_after.is_some_and(|limit| self.sends >= limit) {
            return Err(TransportError::SendFailed("mock send failure".into()));
        }
        self.sends += 1;
        self.sent.lock().await.push(SentMessage {
            session: self.index,
            text,
        });
        Ok(())
    }

    async fn recv(&mut self) -> Result<String, TransportError> {
        self.inbound.pop_front().ok_or(TransportError::Closed)
    }

    async fn recv_timeout(&mut self, _wait: Duration) -> Result<Option<String>, TransportError> {
        Ok(self.inbound.pop_front())
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Virtual clock: sleeping advances time instantly and is recorded
#[derive(Debug)]
pub struct MockClock {
    start: Instant,
    elapsed: std::sync::Mutex<Duration>,
    sleeps: std::sync::Mutex<Vec<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: std::sync::Mutex::new(Duration::ZERO),
            sleeps: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Every requested sleep, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Virtual time advanced so far
    pub fn elapsed(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or_default()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// Mock frame source producing [`TEST_JPEG`] frames
#[derive(Debug, Default)]
pub struct MockFrameSource {
    frame_limit: Option<usize>,
    fail_open: bool,
    captures: Arc<AtomicUsize>,
    settings: Option<CaptureSettings>,
}

impl MockFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every capture after `frames` successful ones
    pub fn with_frame_limit(mut self, frames: usize) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Count of successful captures
    pub fn captures_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.captures)
    }
}

#[async_trait]
impl FrameSource for MockFrameSource {
    fn describe(&self) -> String {
        match self.settings {
            Some(s) => format!("mock {}x{} q{}", s.width, s.height, s.jpeg_quality),
            None => "mock".to_string(),
        }
    }

    async fn open(&mut self) -> Result<(), CaptureError> {
        if self.fail_open {
            return Err(CaptureError::SourceUnavailable("mock camera missing".to_string()));
        }
        Ok(())
    }

    fn configure(&mut self, settings: CaptureSettings) {
        self.settings = Some(settings);
    }

    async fn capture(&mut self) -> Result<RawFrame, CaptureError> {
        let taken = self.captures.load(Ordering::SeqCst);
        if self.frame_limit.is_some_and(|limit| taken >= limit) {
            return Err(CaptureError::CaptureFailed("mock frame limit reached".to_string()));
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(RawFrame::jpeg(TEST_JPEG.to_vec()))
    }
}

/// Command handler recording every command it is given
#[derive(Debug, Default)]
pub struct RecordingCommandHandler {
    handled: Arc<Mutex<Vec<Command>>>,
}

impl RecordingCommandHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handled_handle(&self) -> Arc<Mutex<Vec<Command>>> {
        Arc::clone(&self.handled)
    }
}

#[async_trait]
impl CommandHandler for RecordingCommandHandler {
    async fn handle(&self, command: &Command) {
        self.handled.lock().await.push(command.clone());
    }
}
