//! Directory source for development without camera hardware
//!
//! Cycles through the JPEG files of a directory in file-name order.

use super::{looks_like_jpeg, CaptureError, CaptureSettings, FrameSource, RawFrame};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub struct DirectorySource {
    directory: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            files: Vec::new(),
            next: 0,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.files.len()
    }
}

fn is_jpeg_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

#[async_trait]
impl FrameSource for DirectorySource {
    fn describe(&self) -> String {
        format!(
            "directory {} ({} frames)",
            self.directory.display(),
            self.files.len()
        )
    }

    async fn open(&mut self) -> Result<(), CaptureError> {
        let unavailable = |reason: String| {
            CaptureError::SourceUnavailable(format!("{}: {reason}", self.directory.display()))
        };

        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| unavailable(e.to_string()))?
        {
            let path = entry.path();
            if is_jpeg_path(&path) {
                files.push(path);
            }
        }

        if files.is_empty() {
            return Err(unavailable("no .jpg or .jpeg files".to_string()));
        }

        files.sort();
        self.files = files;
        self.next = 0;
        Ok(())
    }

    fn configure(&mut self, _settings: CaptureSettings) {
        // Files are served as recorded.
    }

    async fn capture(&mut self) -> Result<RawFrame, CaptureError> {
        if self.files.is_empty() {
            return Err(CaptureError::CaptureFailed(
                "source has not been opened".to_string(),
            ));
        }

        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| CaptureError::CaptureFailed(format!("{}: {e}", path.display())))?;
        if !looks_like_jpeg(&data) {
            return Err(CaptureError::CaptureFailed(format!(
                "{} is not a JPEG file",
                path.display()
            )));
        }

        Ok(RawFrame::jpeg(data))
    }
}
