//! Pure link state machine and retry policy
//!
//! The runner feeds events into [`LinkState::next`] and acts on the state it
//! gets back. Nothing in here performs I/O, so every transition can be
//! checked directly.

use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the station is in its connect/steady-state cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No session; the next step starts a sweep
    Disconnected,
    /// Handshake in progress against the candidate at this index
    Connecting(usize),
    /// Handshake done and registration sent
    Registered(usize),
    /// Publishing frames or relaying commands
    Steady(usize),
    /// The candidate failed; `established` is true when a session had been
    /// registered on it before the failure
    Failed { candidate: usize, established: bool },
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    SweepStarted,
    Registered,
    SteadyEntered,
    Failed,
    /// Failure handled; move on
    Retry,
}

impl LinkState {
    /// Determine next state after an event (pure function)
    ///
    /// A failure before registration advances to the next candidate of the
    /// same sweep. A failure after registration ends the sweep, so the next
    /// attempt is a fresh sweep from the first candidate.
    pub fn next(self, event: LinkEvent, candidate_count: usize) -> LinkState {
        match (self, event) {
            (LinkState::Disconnected, LinkEvent::SweepStarted) => LinkState::Connecting(0),
            (LinkState::Connecting(c), LinkEvent::Registered) => LinkState::Registered(c),
            (LinkState::Connecting(c), LinkEvent::Failed) => LinkState::Failed {
                candidate: c,
                established: false,
            },
            (LinkState::Registered(c), LinkEvent::SteadyEntered) => LinkState::Steady(c),
            (LinkState::Registered(c), LinkEvent::Failed)
            | (LinkState::Steady(c), LinkEvent::Failed) => LinkState::Failed {
                candidate: c,
                established: true,
            },
            (
                LinkState::Failed {
                    candidate,
                    established: false,
                },
                LinkEvent::Retry,
            ) if candidate + 1 < candidate_count => LinkState::Connecting(candidate + 1),
            (LinkState::Failed { .. }, LinkEvent::Retry) => LinkState::Disconnected,
            (state, event) => {
                warn!("Ignoring link event {:?} in state {:?}", event, state);
                state
            }
        }
    }

    /// Candidate index the state refers to, if any
    pub fn candidate(&self) -> Option<usize> {
        match self {
            LinkState::Disconnected => None,
            LinkState::Connecting(c) | LinkState::Registered(c) | LinkState::Steady(c) => Some(*c),
            LinkState::Failed { candidate, .. } => Some(*candidate),
        }
    }
}

/// Fixed-delay retry policy
///
/// No growth, no jitter, no cap: every sweep after the first waits the same
/// backoff, forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }

    /// Delay before starting sweep number `sweeps_started + 1` (pure function)
    pub fn delay_before_sweep(&self, sweeps_started: u64) -> Duration {
        if sweeps_started == 0 {
            Duration::ZERO
        } else {
            self.backoff
        }
    }
}

/// Log a link state transition (pure logging function)
pub fn log_state_transition(from: &LinkState, to: &LinkState) {
    match (from, to) {
        (LinkState::Connecting(_), LinkState::Registered(c)) => {
            info!(candidate = c, "Station registered");
        }
        (LinkState::Failed { established: false, .. }, LinkState::Connecting(c)) => {
            info!(candidate = c, "Trying next endpoint candidate");
        }
        (LinkState::Failed { established: false, .. }, LinkState::Disconnected) => {
            warn!("All endpoint candidates failed");
        }
        (LinkState::Failed { established: true, .. }, LinkState::Disconnected) => {
            info!("Session ended, starting a new sweep");
        }
        _ => {
            debug!("Link state: {:?} -> {:?}", from, to);
        }
    }
}
