//! Camera stream source (Pi camera)
//!
//! `open` starts one long-lived `rpicam-vid --codec mjpeg -o -` process and
//! waits for its first frame; the process holds the camera for the rest of
//! the run. `capture` hands out the next JPEG cut from its stdout.

use super::{CaptureError, CaptureSettings, FrameSource, RawFrame, JPEG_SOI};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// JPEG end-of-image marker
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Frames larger than this mean the stream lost sync
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;
const READ_CHUNK: usize = 64 * 1024;
const EXIT_WAIT: Duration = Duration::from_millis(500);

/// Frame source backed by `rpicam-vid` or a compatible MJPEG tool
pub struct MjpegStreamSource {
    program: String,
    timeout: Duration,
    settings: CaptureSettings,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr_tail: Option<JoinHandle<Option<String>>>,
    buffer: BytesMut,
    pending: Option<Bytes>,
}

impl MjpegStreamSource {
    pub fn new(program: String, timeout: Duration) -> Self {
        Self {
            program,
            timeout,
            settings: CaptureSettings::default(),
            child: None,
            stdout: None,
            stderr_tail: None,
            buffer: BytesMut::new(),
            pending: None,
        }
    }

    /// Arguments for an endless MJPEG stream on stdout (pure function)
    pub fn stream_args(settings: &CaptureSettings) -> Vec<String> {
        vec![
            "--nopreview".to_string(),
            "-t".to_string(),
            "0".to_string(),
            "--width".to_string(),
            settings.width.to_string(),
            "--height".to_string(),
            settings.height.to_string(),
            "--framerate".to_string(),
            settings.framerate.to_string(),
            "--codec".to_string(),
            "mjpeg".to_string(),
            "--quality".to_string(),
            settings.jpeg_quality.to_string(),
            "--flush".to_string(),
            "-o".to_string(),
            "-".to_string(),
        ]
    }

    /// Read until the next complete JPEG is buffered
    async fn next_frame(&mut self) -> Result<Bytes, CaptureError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Err(CaptureError::CaptureFailed(
                "source has not been opened".to_string(),
            ));
        };

        loop {
            if let Some(frame) = split_jpeg(&mut self.buffer) {
                return Ok(frame);
            }
            if self.buffer.len() > MAX_FRAME_BYTES {
                self.buffer.clear();
                return Err(CaptureError::CaptureFailed(format!(
                    "no JPEG boundary within {MAX_FRAME_BYTES} bytes"
                )));
            }

            self.buffer.reserve(READ_CHUNK);
            let read = stdout
                .read_buf(&mut self.buffer)
                .await
                .map_err(|e| CaptureError::CaptureFailed(format!("stream read failed: {e}")))?;
            if read == 0 {
                let reason = self.exit_reason().await;
                return Err(CaptureError::SourceUnavailable(format!(
                    "{} stopped streaming: {reason}",
                    self.program
                )));
            }
        }
    }

    /// Exit status and last stderr line of a process that closed its stdout
    async fn exit_reason(&mut self) -> String {
        let status = match self.child.as_mut() {
            Some(child) => match tokio::time::timeout(EXIT_WAIT, child.wait()).await {
                Ok(Ok(status)) => status.to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(_) => "still running".to_string(),
            },
            None => "not started".to_string(),
        };

        let tail = match self.stderr_tail.take() {
            Some(handle) => tokio::time::timeout(EXIT_WAIT, handle)
                .await
                .ok()
                .and_then(Result::ok)
                .flatten(),
            None => None,
        };

        match tail {
            Some(line) => format!("{status}: {line}"),
            None => status,
        }
    }

    async fn stop(&mut self) {
        self.stdout = None;
        self.buffer.clear();
        self.pending = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
    }
}

/// Log the tool's stderr and keep its last non-empty line
fn drain_stderr(stderr: ChildStderr) -> JoinHandle<Option<String>> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut last = None;
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if !line.is_empty() {
                debug!(target: "station_link::camera", "{}", line);
                last = Some(line);
            }
        }
        last
    })
}

fn find_marker(data: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(2)
        .position(|w| w == marker.as_slice())
        .map(|p| p + from)
}

/// Cut the first complete JPEG out of `buffer` (pure function)
///
/// Bytes before the start-of-image marker are discarded. Returns `None`
/// until the matching end-of-image marker has arrived.
pub fn split_jpeg(buffer: &mut BytesMut) -> Option<Bytes> {
    match find_marker(buffer, JPEG_SOI, 0) {
        Some(start) => {
            let _ = buffer.split_to(start);
        }
        None => {
            // a trailing 0xFF may be the first half of the next marker
            let keep = usize::from(buffer.last() == Some(&0xFF));
            let discard = buffer.len() - keep;
            let _ = buffer.split_to(discard);
            return None;
        }
    }

    let end = find_marker(buffer, JPEG_EOI, JPEG_SOI.len())?;
    Some(buffer.split_to(end + JPEG_EOI.len()).freeze())
}

#[async_trait]
impl FrameSource for MjpegStreamSource {
    fn describe(&self) -> String {
        format!(
            "{} {}x{}@{} q{}",
            self.program,
            self.settings.width,
            self.settings.height,
            self.settings.framerate,
            self.settings.jpeg_quality
        )
    }

    async fn open(&mut self) -> Result<(), CaptureError> {
        self.stop().await;

        let mut child = Command::new(&self.program)
            .args(Self::stream_args(&self.settings))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CaptureError::SourceUnavailable(format!("cannot run '{}': {e}", self.program))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CaptureError::SourceUnavailable(format!("no stdout from '{}'", self.program))
        })?;
        self.stderr_tail = child.stderr.take().map(drain_stderr);
        self.stdout = Some(stdout);
        self.child = Some(child);

        let first = match tokio::time::timeout(self.timeout, self.next_frame()).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(error)) => {
                self.stop().await;
                return Err(match error {
                    CaptureError::CaptureFailed(reason) => CaptureError::SourceUnavailable(reason),
                    other => other,
                });
            }
            Err(_) => {
                self.stop().await;
                return Err(CaptureError::SourceUnavailable(format!(
                    "{} sent no frame within {}ms",
                    self.program,
                    self.timeout.as_millis()
                )));
            }
        };

        info!(bytes = first.len(), "Camera stream started");
        self.pending = Some(first);
        Ok(())
    }

    fn configure(&mut self, settings: CaptureSettings) {
        self.settings = settings;
    }

    async fn capture(&mut self) -> Result<RawFrame, CaptureError> {
        if let Some(frame) = self.pending.take() {
            return Ok(RawFrame::jpeg(frame));
        }

        match tokio::time::timeout(self.timeout, self.next_frame()).await {
            Ok(Ok(frame)) => {
                debug!(bytes = frame.len(), "Frame captured");
                Ok(RawFrame::jpeg(frame))
            }
            Ok(Err(error)) => {
                if matches!(error, CaptureError::SourceUnavailable(_)) {
                    warn!(error = %error, "Camera stream lost");
                }
                Err(error)
            }
            Err(_) => Err(CaptureError::CaptureFailed(format!(
                "no frame within {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::open_frame_source;
    use crate::config::{CaptureSection, CaptureSourceKind, StreamSection};
    use crate::error::ErrorKind;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(file, "{body}").unwrap();
        file.sync_all().unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn capture_section(program: &Path, timeout_ms: u64) -> CaptureSection {
        CaptureSection {
            source: CaptureSourceKind::Command,
            command: program.display().to_string(),
            capture_timeout_ms: timeout_ms,
            ..CaptureSection::default()
        }
    }

    #[test]
    fn test_stream_args() {
        let args = MjpegStreamSource::stream_args(&CaptureSettings {
            width: 640,
            height: 480,
            framerate: 10,
            jpeg_quality: 70,
        });
        let joined = args.join(" ");
        assert!(joined.contains("-t 0"));
        assert!(joined.contains("--width 640"));
        assert!(joined.contains("--height 480"));
        assert!(joined.contains("--framerate 10"));
        assert!(joined.contains("--codec mjpeg"));
        assert!(joined.contains("--quality 70"));
        assert!(joined.ends_with("-o -"));
    }

    #[test]
    fn test_split_jpeg_waits_for_end_marker() {
        let mut buffer = BytesMut::from(&[0x00, 0x11, 0xFF, 0xD8, 0x01, 0x02][..]);
        assert_eq!(split_jpeg(&mut buffer), None);
        assert_eq!(&buffer[..], &[0xFF, 0xD8, 0x01, 0x02]);

        buffer.extend_from_slice(&[0xFF, 0xD9, 0xFF, 0xD8]);
        let frame = split_jpeg(&mut buffer).unwrap();
        assert_eq!(&frame[..], &[0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]);
        assert_eq!(&buffer[..], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_split_jpeg_drops_garbage_but_keeps_half_marker() {
        let mut buffer = BytesMut::from(&[0x10, 0x20, 0xFF][..]);
        assert_eq!(split_jpeg(&mut buffer), None);
        assert_eq!(&buffer[..], &[0xFF]);

        buffer.extend_from_slice(&[0xD8, 0xFF, 0xD9]);
        assert_eq!(
            &split_jpeg(&mut buffer).unwrap()[..],
            &[0xFF, 0xD8, 0xFF, 0xD9]
        );
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_fatal() {
        let mut source = MjpegStreamSource::new(
            "/nonexistent/rpicam-vid".to_string(),
            Duration::from_secs(1),
        );
        let error = source.open().await.unwrap_err();
        assert!(matches!(error, CaptureError::SourceUnavailable(_)));
        assert_eq!(error.kind(), ErrorKind::Fatal);
    }

    #[tokio::test]
    async fn test_camera_missing_at_startup_is_fatal() {
        // the tool is installed and answers --version, but no camera is attached
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "fake-vid",
            "if [ \"$1\" = \"--version\" ]; then echo 'rpicam-apps build'; exit 0; fi\n\
             echo 'ERROR: *** no cameras available ***' >&2\n\
             exit 255",
        );

        let error = open_frame_source(&capture_section(&script, 2_000), &StreamSection::default())
            .await
            .err()
            .expect("a missing camera must fail the open");

        assert_eq!(error.kind(), ErrorKind::Fatal);
        assert!(error.to_string().contains("255"), "{error}");
    }

    #[tokio::test]
    async fn test_silent_camera_times_out_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "fake-vid", "exec sleep 5");

        let error = open_frame_source(&capture_section(&script, 200), &StreamSection::default())
            .await
            .err()
            .expect("no first frame must fail the open");

        assert_eq!(error.kind(), ErrorKind::Fatal);
        assert!(error.to_string().contains("no frame"), "{error}");
    }

    #[tokio::test]
    async fn test_frames_come_from_one_stream_process() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("starts");
        let script = write_script(
            dir.path(),
            "fake-vid",
            &format!(
                "echo started >> '{}'\n\
                 printf '\\377\\330\\001\\377\\331\\377\\330\\002\\377\\331'\n\
                 exec sleep 5",
                marker.display()
            ),
        );

        let mut source =
            MjpegStreamSource::new(script.display().to_string(), Duration::from_secs(5));
        source.configure(CaptureSettings::default());
        source.open().await.unwrap();

        let first = source.capture().await.unwrap();
        let second = source.capture().await.unwrap();
        assert_eq!(&first.data[..], &[0xFF, 0xD8, 0x01, 0xFF, 0xD9]);
        assert_eq!(&second.data[..], &[0xFF, 0xD8, 0x02, 0xFF, 0xD9]);
        assert_eq!(source.compress(second).unwrap().len(), 5);

        let starts = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(starts.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_stream_ending_mid_run_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "fake-vid", r"printf '\377\330\001\377\331'");

        let mut source =
            MjpegStreamSource::new(script.display().to_string(), Duration::from_secs(5));
        source.open().await.unwrap();

        assert!(source.capture().await.is_ok());
        let error = source.capture().await.unwrap_err();
        assert!(matches!(error, CaptureError::SourceUnavailable(_)));
        assert_eq!(error.kind(), ErrorKind::Fatal);
    }

    #[tokio::test]
    async fn test_capture_before_open_fails() {
        let mut source = MjpegStreamSource::new("true".to_string(), Duration::from_secs(1));
        assert!(matches!(
            source.capture().await,
            Err(CaptureError::CaptureFailed(_))
        ));
    }
}
