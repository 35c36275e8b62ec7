//! screenrec Linux platform integration
//!
//! - **Host:** [`LinuxHost`] grants screen, system audio, microphone and
//!   camera tracks backed by GStreamer pipelines
//! - **Portal:** Wayland screen capture negotiated over the XDG ScreenCast portal
//! - **Recorder:** [`WebmRecorder`] muxes VP8/Opus into WebM chunks
//! - **Permissions:** capability detection and fix-up guidance

pub mod display;
pub mod host;
pub mod permissions;
pub mod pipeline;
pub mod portal;
pub mod recorder;
pub mod sources;

pub use display::detect_display_server;
pub use host::LinuxHost;
pub use recorder::WebmRecorder;
