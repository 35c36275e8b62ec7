//! The capture host: the environment that grants access to screens,
//! microphones, and cameras.

use serde::{Deserialize, Serialize};

use crate::error::PlatformResult;
use crate::media::MediaStream;
use crate::recorder::{MediaRecorder, RecorderConfig};

/// What a display capture request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRequest {
    /// Screen/window video.
    pub video: bool,
    /// Tab/system audio captured alongside the display.
    pub audio: bool,
}

/// A user-media capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserMediaRequest {
    Microphone,
    Camera { width: u32, height: u32 },
}

impl UserMediaRequest {
    /// Short source name for logs.
    pub fn source_name(&self) -> &'static str {
        match self {
            UserMediaRequest::Microphone => "microphone",
            UserMediaRequest::Camera { .. } => "camera",
        }
    }
}

/// Display server / platform family used for capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayServer {
    Wayland,
    X11,
    Synthetic,
    #[default]
    Unknown,
}

/// Abstract interface to the environment's capture facilities.
///
/// Every request is permission-gated: it may suspend until the user answers
/// a consent prompt, and a refusal is reported as
/// [`PlatformError::PermissionDenied`](crate::error::PlatformError::PermissionDenied).
/// Streams returned from these calls are live until their tracks are
/// stopped or their source ends.
#[async_trait::async_trait]
pub trait CaptureHost: Send + Sync {
    /// Host name for logs.
    fn name(&self) -> &str;

    /// Display server this host captures from.
    fn display_server(&self) -> DisplayServer;

    /// Ask for the screen (and optionally its audio).
    async fn get_display_media(&self, request: DisplayRequest) -> PlatformResult<MediaStream>;

    /// Ask for a microphone or camera.
    async fn get_user_media(&self, request: UserMediaRequest) -> PlatformResult<MediaStream>;

    /// Create a recorder bound to `stream`. The recorder is inactive until
    /// [`MediaRecorder::start`] is called.
    fn create_recorder(
        &self,
        stream: &MediaStream,
        config: &RecorderConfig,
    ) -> PlatformResult<Box<dyn MediaRecorder>>;
}
