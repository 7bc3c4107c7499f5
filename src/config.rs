//! Configuration system for the station link client
//!
//! Every section is optional in the TOML file; missing sections fall back to
//! the defaults the field stations ship with. Validation runs once at load
//! time so the endpoint resolver and the retry loop never see bad input.

use crate::protocol::endpoints::{
    resolve_endpoints, validate_deployment_slug, validate_template, Endpoint, DEFAULT_CANDIDATES,
};
use crate::station::{LinkMode, LinkSettings, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Identity used when neither the CLI nor the config file provides one
pub const DEFAULT_STATION_ID: &str = "RPI1";

/// Main station configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StationConfig {
    #[serde(default)]
    pub station: StationSection,
    #[serde(default)]
    pub endpoints: EndpointsSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub capture: CaptureSection,
}

/// Station section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationSection {
    /// Station identifier (must match [a-zA-Z0-9._-]+)
    #[serde(default = "default_station_id")]
    pub id: String,
}

impl Default for StationSection {
    fn default() -> Self {
        Self {
            id: default_station_id(),
        }
    }
}

fn default_station_id() -> String {
    DEFAULT_STATION_ID.to_string()
}

/// Endpoint candidates, tried in order on every sweep
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointsSection {
    /// URL templates; `{station_id}` is required, `{deployment}` is optional
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,
    /// Environment variable holding the deployment slug
    #[serde(default = "default_deployment_env")]
    pub deployment_env: String,
    /// Handshake timeout per candidate in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for EndpointsSection {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            deployment_env: default_deployment_env(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_candidates() -> Vec<String> {
    DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect()
}

fn default_deployment_env() -> String {
    "STATION_DEPLOYMENT".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Fixed backoff between sweeps, per mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    #[serde(default = "default_stream_backoff_ms")]
    pub stream_backoff_ms: u64,
    #[serde(default = "default_relay_backoff_ms")]
    pub relay_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            stream_backoff_ms: default_stream_backoff_ms(),
            relay_backoff_ms: default_relay_backoff_ms(),
        }
    }
}

impl RetrySection {
    /// Backoff applied before a new sweep in the given mode
    pub fn backoff(&self, mode: LinkMode) -> Duration {
        match mode {
            LinkMode::Stream => Duration::from_millis(self.stream_backoff_ms),
            LinkMode::Relay => Duration::from_millis(self.relay_backoff_ms),
        }
    }
}

fn default_stream_backoff_ms() -> u64 {
    3_000
}

fn default_relay_backoff_ms() -> u64 {
    5_000
}

/// Frame publishing parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamSection {
    /// Delay after each sent frame (100ms = 10 fps)
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// How long to wait for an inbound command after each frame
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// JPEG quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            jpeg_quality: default_jpeg_quality(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl StreamSection {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

fn default_frame_interval_ms() -> u64 {
    100
}

fn default_poll_timeout_ms() -> u64 {
    10
}

fn default_jpeg_quality() -> u8 {
    70
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

/// Frame source selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureSection {
    #[serde(default)]
    pub source: CaptureSourceKind,
    /// Camera tool started once and kept streaming
    #[serde(default = "default_capture_command")]
    pub command: String,
    /// Directory of JPEG files for the directory source
    #[serde(default = "default_capture_directory")]
    pub directory: PathBuf,
    /// Upper bound on waiting for a frame, including the first one at open
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            source: CaptureSourceKind::default(),
            command: default_capture_command(),
            directory: default_capture_directory(),
            capture_timeout_ms: default_capture_timeout_ms(),
        }
    }
}

/// Available frame sources
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSourceKind {
    /// Long-lived MJPEG camera stream tool (Pi camera)
    #[default]
    Command,
    /// Pre-recorded JPEG files
    Directory,
}

fn default_capture_command() -> String {
    "rpicam-vid".to_string()
}

fn default_capture_directory() -> PathBuf {
    PathBuf::from("frames")
}

fn default_capture_timeout_ms() -> u64 {
    5_000
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid station ID format: {0}")]
    InvalidStationId(String),
    #[error("Invalid endpoint template: {0}")]
    InvalidEndpoint(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StationConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: StationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the configured identity, re-validating it
    pub fn with_station_id(mut self, station_id: Option<String>) -> Result<Self, ConfigError> {
        if let Some(id) = station_id {
            validate_station_id(&id)?;
            self.station.id = id;
        }
        Ok(self)
    }

    /// Read the deployment slug from the configured environment variable
    pub fn deployment(&self) -> Option<String> {
        let slug = std::env::var(&self.endpoints.deployment_env)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())?;

        match validate_deployment_slug(&slug) {
            Ok(()) => Some(slug),
            Err(reason) => {
                warn!(
                    env = %self.endpoints.deployment_env,
                    "Skipping deployment candidate: {}", reason
                );
                None
            }
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoints.connect_timeout_ms)
    }

    /// Ordered candidate list for the configured identity and deployment
    pub fn resolve_endpoints(&self) -> Vec<Endpoint> {
        resolve_endpoints(
            &self.station.id,
            self.deployment().as_deref(),
            &self.endpoints.candidates,
        )
    }

    /// Everything the retry loop needs for one mode
    pub fn link_settings(&self, mode: LinkMode) -> LinkSettings {
        LinkSettings {
            station_id: self.station.id.clone(),
            endpoints: self.resolve_endpoints(),
            policy: RetryPolicy::new(self.retry.backoff(mode)),
        }
    }

    /// Check every field the runtime relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_station_id(&self.station.id)?;

        if self.endpoints.candidates.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "[endpoints] candidates must not be empty".to_string(),
            ));
        }
        for template in &self.endpoints.candidates {
            validate_template(template).map_err(ConfigError::InvalidEndpoint)?;
        }

        if self.endpoints.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.stream.frame_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "frame_interval_ms must be greater than 0".to_string(),
            ));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(ConfigError::InvalidConfig(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.stream.jpeg_quality
            )));
        }
        if self.stream.width == 0 || self.stream.height == 0 {
            return Err(ConfigError::InvalidConfig(
                "stream resolution must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Validate station ID format
pub fn validate_station_id(station_id: &str) -> Result<(), ConfigError> {
    let valid_chars = station_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if station_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidStationId(format!(
            "Station ID '{station_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
