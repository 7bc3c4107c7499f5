//! Frame sources for the stream mode
//!
//! A [`FrameSource`] is opened once before the first connection attempt and
//! owned by the station for the rest of the process. Failing to open it, or
//! losing it later, is fatal; failing to capture a single frame only ends
//! the current session.

use crate::config::{CaptureSection, CaptureSourceKind, StreamSection};
use crate::error::ErrorKind;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub mod command;
pub mod directory;

pub use command::MjpegStreamSource;
pub use directory::DirectorySource;

/// JPEG start-of-image marker
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Capture errors
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Frame source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("Frame capture failed: {0}")]
    CaptureFailed(String),
    #[error("Cannot compress {0} frames")]
    UnsupportedEncoding(PixelEncoding),
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::SourceUnavailable(_) => ErrorKind::Fatal,
            CaptureError::CaptureFailed(_) | CaptureError::UnsupportedEncoding(_) => {
                ErrorKind::Protocol
            }
        }
    }
}

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelEncoding {
    /// Already JPEG-compressed by the capture pipeline
    Jpeg,
    /// Packed 8-bit RGB
    Rgb24,
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelEncoding::Jpeg => f.write_str("jpeg"),
            PixelEncoding::Rgb24 => f.write_str("rgb24"),
        }
    }
}

/// One frame as delivered by a source
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub encoding: PixelEncoding,
    pub data: Bytes,
}

impl RawFrame {
    pub fn jpeg(data: impl Into<Bytes>) -> Self {
        Self {
            encoding: PixelEncoding::Jpeg,
            data: data.into(),
        }
    }
}

/// Resolution, rate and quality requested from a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub jpeg_quality: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            framerate: 10,
            jpeg_quality: 70,
        }
    }
}

impl From<&StreamSection> for CaptureSettings {
    fn from(stream: &StreamSection) -> Self {
        Self {
            width: stream.width,
            height: stream.height,
            framerate: (1000 / stream.frame_interval_ms.max(1)).max(1) as u32,
            jpeg_quality: stream.jpeg_quality,
        }
    }
}

/// Camera or image source
#[async_trait]
pub trait FrameSource: Send {
    /// Human-readable description for logs
    fn describe(&self) -> String;

    /// Acquire the device; failure here is fatal
    async fn open(&mut self) -> Result<(), CaptureError>;

    /// Apply resolution and quality for subsequent captures
    fn configure(&mut self, settings: CaptureSettings);

    /// Capture one frame
    async fn capture(&mut self) -> Result<RawFrame, CaptureError>;

    /// Compress a captured frame to JPEG bytes
    ///
    /// Sources in this crate deliver frames already compressed by their
    /// capture pipeline, so the default only passes JPEG through.
    fn compress(&self, frame: RawFrame) -> Result<Bytes, CaptureError> {
        match frame.encoding {
            PixelEncoding::Jpeg => Ok(frame.data),
            other => Err(CaptureError::UnsupportedEncoding(other)),
        }
    }
}

/// Build, configure and open the configured frame source
pub async fn open_frame_source(
    capture: &CaptureSection,
    stream: &StreamSection,
) -> Result<Box<dyn FrameSource>, CaptureError> {
    prepare_frame_source(build_frame_source(capture), stream).await
}

/// Build the configured frame source without opening it
pub fn build_frame_source(capture: &CaptureSection) -> Box<dyn FrameSource> {
    match capture.source {
        CaptureSourceKind::Command => Box::new(MjpegStreamSource::new(
            capture.command.clone(),
            Duration::from_millis(capture.capture_timeout_ms),
        )),
        CaptureSourceKind::Directory => Box::new(DirectorySource::new(capture.directory.clone())),
    }
}

/// Configure and open a source for streaming
pub async fn prepare_frame_source(
    mut source: Box<dyn FrameSource>,
    stream: &StreamSection,
) -> Result<Box<dyn FrameSource>, CaptureError> {
    source.configure(CaptureSettings::from(stream));
    source.open().await?;
    info!(source = %source.describe(), "Frame source opened");

    Ok(source)
}

/// Check that bytes start like a JPEG image
pub fn looks_like_jpeg(data: &[u8]) -> bool {
    data.starts_with(&JPEG_SOI)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFrameSource;

    #[test]
    fn test_default_compress_passes_jpeg_through() {
        let source = MockFrameSource::new();
        let jpeg = source
            .compress(RawFrame::jpeg(vec![0xFF, 0xD8, 0x01]))
            .unwrap();
        assert_eq!(&jpeg[..], &[0xFF, 0xD8, 0x01]);
    }

    #[test]
    fn test_default_compress_rejects_raw_pixels() {
        let source = MockFrameSource::new();
        let frame = RawFrame {
            encoding: PixelEncoding::Rgb24,
            data: Bytes::from_static(&[0, 0, 0]),
        };
        let error = source.compress(frame).unwrap_err();
        assert!(matches!(
            error,
            CaptureError::UnsupportedEncoding(PixelEncoding::Rgb24)
        ));
        assert_eq!(error.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_settings_from_stream_section() {
        let stream = StreamSection {
            width: 1280,
            height: 720,
            jpeg_quality: 85,
            frame_interval_ms: 40,
            ..StreamSection::default()
        };
        assert_eq!(
            CaptureSettings::from(&stream),
            CaptureSettings {
                width: 1280,
                height: 720,
                framerate: 25,
                jpeg_quality: 85
            }
        );
    }

    #[test]
    fn test_looks_like_jpeg() {
        assert!(looks_like_jpeg(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(!looks_like_jpeg(b"GIF89a"));
        assert!(!looks_like_jpeg(&[]));
    }

    #[tokio::test]
    async fn test_missing_directory_source_is_fatal() {
        let capture = CaptureSection {
            source: CaptureSourceKind::Directory,
            directory: "/nonexistent/station-link/frames".into(),
            ..CaptureSection::default()
        };
        let error = open_frame_source(&capture, &StreamSection::default())
            .await
            .err()
            .expect("opening a missing directory must fail");
        assert_eq!(error.kind(), ErrorKind::Fatal);
    }
}
