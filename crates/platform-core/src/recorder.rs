//! The recorder contract: encodes a stream and emits opaque chunks.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::PlatformResult;

/// MIME type of every produced recording.
pub const WEBM_MIME_TYPE: &str = "video/webm";

/// Parameters for a recorder.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub mime_type: String,
    /// Frame rate the video track is encoded at.
    pub video_fps: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            mime_type: WEBM_MIME_TYPE.to_string(),
            video_fps: 30,
        }
    }
}

/// Something a recorder reports back to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// Encoded bytes produced since the previous emission. May be empty.
    DataAvailable(Vec<u8>),
    /// The recorder stopped. Always the last event and sent exactly once.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Inactive,
    Recording,
    Stopped,
}

/// Records a stream into chunks of an opaque container.
///
/// After a successful [`MediaRecorder::stop`] the recorder flushes what it
/// still holds as one last `DataAvailable` and then sends `Stopped`.
pub trait MediaRecorder: Send {
    /// Begin recording, emitting `DataAvailable` every `timeslice`.
    fn start(
        &mut self,
        timeslice: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> PlatformResult<()>;

    /// Request a stop. Fails with `AlreadyStopped` unless recording.
    fn stop(&mut self) -> PlatformResult<()>;

    fn state(&self) -> RecorderState;

    fn mime_type(&self) -> &str;
}
