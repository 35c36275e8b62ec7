//! Error types shared across screenrec crates.

/// Top-level error type for recorder operations.
///
/// Only [`RecorderError::Capture`] and [`RecorderError::PermissionDenied`]
/// coming out of display capture ever reach the caller of `start`; degraded
/// sources and teardown failures are logged where they happen.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("A recording session is already active")]
    AlreadyRecording,

    #[error("Platform error: {message}")]
    Platform { message: String },

    #[error("Delivery error: {message}")]
    Delivery { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using RecorderError.
pub type RecorderResult<T> = Result<T, RecorderError>;

impl RecorderError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: msg.into(),
        }
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform {
            message: msg.into(),
        }
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error aborted `start` because display capture failed.
    pub fn is_fatal_capture(&self) -> bool {
        matches!(self, Self::Capture { .. } | Self::PermissionDenied { .. })
    }
}
