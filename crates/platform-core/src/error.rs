//! Errors reported by capture hosts and host-owned resources.

use screenrec_common::error::RecorderError;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The user (or the host policy) refused the capture request.
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// The device or pipeline backing a source failed.
    #[error("Device error: {message}")]
    Device { message: String },

    /// A release was attempted on a resource that is no longer live.
    #[error("{resource} already stopped")]
    AlreadyStopped { resource: String },

    #[error("Unsupported: {message}")]
    Unsupported { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

/// Result type alias using PlatformError.
pub type PlatformResult<T> = Result<T, PlatformError>;

impl PlatformError {
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: msg.into(),
        }
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device {
            message: msg.into(),
        }
    }

    pub fn already_stopped(resource: impl Into<String>) -> Self {
        Self::AlreadyStopped {
            resource: resource.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn is_already_stopped(&self) -> bool {
        matches!(self, Self::AlreadyStopped { .. })
    }
}

impl From<PlatformError> for RecorderError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::PermissionDenied { message } => RecorderError::permission_denied(message),
            other => RecorderError::platform(other.to_string()),
        }
    }
}
