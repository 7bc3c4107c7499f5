//! Thread-safe metrics collection system
//!
//! Provides atomic counters and mutex-protected collections for tracking
//! connection attempts, frame publishing and command relaying.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Keep at most this many frame sizes for the size statistics
const FRAME_SIZE_WINDOW: usize = 1000;

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Link metrics
    connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    sessions_ended: AtomicU64,
    sweeps_started: AtomicU64,
    sweeps_exhausted: AtomicU64,
    connection_start_time: AtomicU64,

    // Stream metrics
    frames_sent: AtomicU64,
    frame_bytes_sent: AtomicU64,
    capture_failures: AtomicU64,
    frame_sizes: Mutex<Vec<u64>>,

    // Command metrics
    commands_received: AtomicU64,
    acks_sent: AtomicU64,
    malformed_messages: AtomicU64,

    // Lifecycle metrics
    link_state: Mutex<String>,
    uptime_start: AtomicU64,
    state_transitions: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            sessions_ended: AtomicU64::new(0),
            sweeps_started: AtomicU64::new(0),
            sweeps_exhausted: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frame_bytes_sent: AtomicU64::new(0),
            capture_failures: AtomicU64::new(0),
            frame_sizes: Mutex::new(Vec::new()),
            commands_received: AtomicU64::new(0),
            acks_sent: AtomicU64::new(0),
            malformed_messages: AtomicU64::new(0),
            link_state: Mutex::new("disconnected".to_string()),
            uptime_start: AtomicU64::new(current_timestamp()),
            state_transitions: AtomicU64::new(0),
        }
    }

    // Link metrics
    pub fn sweep_started(&self) {
        self.sweeps_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sweep_exhausted(&self) {
        self.sweeps_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn session_ended(&self) {
        self.sessions_ended.fetch_add(1, Ordering::Relaxed);
        self.connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    // Stream metrics
    pub fn frame_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.frame_bytes_sent
            .fetch_add(bytes as u64, Ordering::Relaxed);

        if let Ok(mut sizes) = self.frame_sizes.lock() {
            sizes.push(bytes as u64);
            if sizes.len() > FRAME_SIZE_WINDOW {
                sizes.remove(0);
            }
        }
    }

    pub fn capture_failed(&self) {
        self.capture_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Command metrics
    pub fn command_received(&self) {
        self.commands_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ack_sent(&self) {
        self.acks_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_message(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    // Lifecycle metrics
    pub fn set_link_state(&self, state: &str) {
        if let Ok(mut current_state) = self.link_state.lock() {
            if *current_state != state {
                self.state_transitions.fetch_add(1, Ordering::Relaxed);
                *current_state = state.to_string();
            }
        }
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.connection_attempts,
            &self.connections_established,
            &self.connection_failures,
            &self.sessions_ended,
            &self.sweeps_started,
            &self.sweeps_exhausted,
            &self.connection_start_time,
            &self.frames_sent,
            &self.frame_bytes_sent,
            &self.capture_failures,
            &self.commands_received,
            &self.acks_sent,
            &self.malformed_messages,
            &self.state_transitions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.connected.store(false, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);

        if let Ok(mut sizes) = self.frame_sizes.lock() {
            sizes.clear();
        }
        if let Ok(mut state) = self.link_state.lock() {
            *state = "disconnected".to_string();
        }
    }

    /// Calculate frame size statistics (pure function)
    fn calculate_frame_size_statistics(&self) -> (f64, f64) {
        if let Ok(sizes) = self.frame_sizes.lock() {
            if sizes.is_empty() {
                (0.0, 0.0)
            } else {
                let mut sorted = sizes.clone();
                sorted.sort_unstable();

                let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
                (avg, percentile(&sorted, 95.0))
            }
        } else {
            (0.0, 0.0)
        }
    }

    /// Calculate connection duration (pure function)
    fn calculate_connection_duration(&self, now: u64) -> u64 {
        if self.connected.load(Ordering::Relaxed) {
            let start_time = self.connection_start_time.load(Ordering::Relaxed);
            if start_time > 0 {
                now.saturating_sub(start_time)
            } else {
                0
            }
        } else {
            0
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_frame_bytes, frame_bytes_p95) = self.calculate_frame_size_statistics();
        let current_state = self
            .link_state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| "unknown".to_string());

        MetricsSnapshot {
            link: LinkMetrics {
                connected: self.connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                sessions_ended: self.sessions_ended.load(Ordering::Relaxed),
                sweeps_started: self.sweeps_started.load(Ordering::Relaxed),
                sweeps_exhausted: self.sweeps_exhausted.load(Ordering::Relaxed),
                connection_duration_seconds: self.calculate_connection_duration(now),
            },
            stream: StreamMetrics {
                frames_sent: self.frames_sent.load(Ordering::Relaxed),
                frame_bytes_sent: self.frame_bytes_sent.load(Ordering::Relaxed),
                capture_failures: self.capture_failures.load(Ordering::Relaxed),
                avg_frame_bytes,
                frame_bytes_p95,
            },
            commands: CommandMetrics {
                commands_received: self.commands_received.load(Ordering::Relaxed),
                acks_sent: self.acks_sent.load(Ordering::Relaxed),
                malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            },
            lifecycle: LifecycleMetrics {
                current_state,
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
                state_transitions: self.state_transitions.load(Ordering::Relaxed),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub link: LinkMetrics,
    pub stream: StreamMetrics,
    pub commands: CommandMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct LinkMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub sessions_ended: u64,
    pub sweeps_started: u64,
    pub sweeps_exhausted: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct StreamMetrics {
    pub frames_sent: u64,
    pub frame_bytes_sent: u64,
    pub capture_failures: u64,
    pub avg_frame_bytes: f64,
    pub frame_bytes_p95: f64,
}

#[derive(Debug, Serialize)]
pub struct CommandMetrics {
    pub commands_received: u64,
    pub acks_sent: u64,
    pub malformed_messages: u64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub current_state: String,
    pub uptime_seconds: u64,
    pub state_transitions: u64,
}

// Helper functions
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_index = index.floor() as usize;
        let upper_index = index.ceil() as usize;
        let lower_value = sorted_data[lower_index] as f64;
        let upper_value = sorted_data[upper_index] as f64;

        lower_value + (upper_value - lower_value) * index.fract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_link_metrics() {
        let collector = MetricsCollector::new();

        collector.sweep_started();
        collector.connection_attempt();
        collector.connection_failed();
        collector.connection_attempt();
        collector.connection_established();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.link.sweeps_started, 1);
        assert_eq!(metrics.link.connection_attempts, 2);
        assert_eq!(metrics.link.connection_failures, 1);
        assert_eq!(metrics.link.connections_established, 1);
        assert!(metrics.link.connected);

        collector.session_ended();
        assert!(!collector.get_metrics().link.connected);
    }

    #[test]
    fn test_stream_metrics() {
        let collector = MetricsCollector::new();

        collector.frame_sent(1000);
        collector.frame_sent(3000);
        collector.capture_failed();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.stream.frames_sent, 2);
        assert_eq!(metrics.stream.frame_bytes_sent, 4000);
        assert_eq!(metrics.stream.capture_failures, 1);
        assert!((metrics.stream.avg_frame_bytes - 2000.0).abs() < 0.1);
    }

    #[test]
    fn test_frame_size_window_is_bounded() {
        let collector = MetricsCollector::new();
        for i in 0..1500 {
            collector.frame_sent(i);
        }

        assert_eq!(
            collector.frame_sizes.lock().unwrap().len(),
            FRAME_SIZE_WINDOW
        );
        assert_eq!(collector.get_metrics().stream.frames_sent, 1500);
    }

    #[test]
    fn test_command_metrics() {
        let collector = MetricsCollector::new();

        collector.command_received();
        collector.ack_sent();
        collector.malformed_message();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.commands.commands_received, 1);
        assert_eq!(metrics.commands.acks_sent, 1);
        assert_eq!(metrics.commands.malformed_messages, 1);
    }

    #[test]
    fn test_state_transitions_only_count_changes() {
        let collector = MetricsCollector::new();

        collector.set_link_state("connecting");
        collector.set_link_state("connecting");
        collector.set_link_state("steady");

        let metrics = collector.get_metrics();
        assert_eq!(metrics.lifecycle.current_state, "steady");
        assert_eq!(metrics.lifecycle.state_transitions, 2);
    }

    #[test]
    fn test_thread_safety() {
        let collector = Arc::new(MetricsCollector::new());

        let mut handles = vec![];

        for _ in 0..10 {
            let collector_clone = Arc::clone(&collector);
            let handle = thread::spawn(move || {
                for _ in 0..100 {
                    collector_clone.connection_attempt();
                    collector_clone.frame_sent(10);
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = collector.get_metrics();
        assert_eq!(metrics.link.connection_attempts, 1000);
        assert_eq!(metrics.stream.frames_sent, 1000);
    }

    #[test]
    fn test_percentile_calculation() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

        let p50 = percentile(&data, 50.0);
        let p95 = percentile(&data, 95.0);

        assert!((p50 - 5.5).abs() < 0.1, "P50: expected ~5.5, got {p50}");
        assert!((p95 - 9.5).abs() < 0.1, "P95: expected ~9.5, got {p95}");
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_reset_functionality() {
        let collector = MetricsCollector::new();

        collector.connection_established();
        collector.frame_sent(100);
        collector.set_link_state("steady");

        collector.reset();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.stream.frames_sent, 0);
        assert!(!metrics.link.connected);
        assert_eq!(metrics.lifecycle.current_state, "disconnected");
        assert_eq!(metrics.stream.avg_frame_bytes, 0.0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let collector = MetricsCollector::new();
        collector.frame_sent(42);

        let value = serde_json::to_value(collector.get_metrics()).unwrap();
        assert_eq!(value["stream"]["frames_sent"], 1);
        assert_eq!(value["link"]["connected"], false);
    }
}
