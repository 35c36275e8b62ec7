//! Where a finished recording goes.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use screenrec_common::{iso_timestamp, RecorderError, RecorderResult};
use screenrec_platform_core::WEBM_MIME_TYPE;

/// Filename prefix of every saved recording.
pub const FILENAME_PREFIX: &str = "local-screen-recorder-";

/// The concatenated recording handed to the download collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFile {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl RecordedFile {
    /// Join chunks in arrival order under a freshly timestamped name.
    pub fn from_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            filename: recording_filename(),
            mime_type: WEBM_MIME_TYPE.to_string(),
            bytes: chunks.concat(),
        }
    }
}

/// `local-screen-recorder-<UTC ISO 8601 with milliseconds>.webm`
pub fn recording_filename() -> String {
    format!("{FILENAME_PREFIX}{}.webm", iso_timestamp())
}

/// User-visible notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Nothing was recorded.
    TooShort,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::TooShort => "too short! please try again",
        }
    }
}

/// The download collaborator.
#[async_trait::async_trait]
pub trait RecordingSink: Send + Sync {
    /// Present the file to the user.
    async fn deliver(&self, file: RecordedFile) -> RecorderResult<()>;

    /// Show a notice to the user.
    async fn notice(&self, notice: Notice);
}

/// Saves recordings into a directory and prints notices.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl RecordingSink for DirectorySink {
    async fn deliver(&self, file: RecordedFile) -> RecorderResult<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            RecorderError::delivery(format!("cannot create {}: {e}", self.dir.display()))
        })?;
        let path = self.dir.join(&file.filename);
        tokio::fs::write(&path, &file.bytes)
            .await
            .map_err(|e| RecorderError::delivery(format!("cannot write {}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), bytes = file.bytes.len(), "Recording saved");
        Ok(())
    }

    async fn notice(&self, notice: Notice) {
        tracing::warn!(?notice, "{}", notice.message());
        eprintln!("{}", notice.message());
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    files: Mutex<Vec<RecordedFile>>,
    notices: Mutex<Vec<Notice>>,
    fail_with: Option<String>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose deliveries all fail with `reason`. Attempts are still
    /// recorded.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_with: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn files(&self) -> Vec<RecordedFile> {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl RecordingSink for CollectingSink {
    async fn deliver(&self, file: RecordedFile) -> RecorderResult<()> {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(file);
        match &self.fail_with {
            Some(reason) => Err(RecorderError::delivery(reason.clone())),
            None => Ok(()),
        }
    }

    async fn notice(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notice);
    }
}
