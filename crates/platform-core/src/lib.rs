//! Screenrec platform core contracts.
//!
//! Everything the recording core needs from a host environment, without
//! coupling to a concrete OS backend:
//!
//! - [`media`]: live tracks and streams, the producer-side [`TrackFeed`]
//! - [`host`]: permission-gated capture requests ([`CaptureHost`])
//! - [`recorder`]: the chunk-emitting [`MediaRecorder`]
//! - [`release`]: the single idempotent-release capability used at teardown

pub mod error;
pub mod host;
pub mod media;
pub mod recorder;
pub mod release;

pub use error::*;
pub use host::*;
pub use media::*;
pub use recorder::*;
pub use release::*;
