//! Observability for the station link
//!
//! Structured logging through `tracing` and process-wide counters for the
//! connection loop, frame publishing and command relaying.

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{session_span, sweep_span};
