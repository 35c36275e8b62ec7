//! Synthetic capture host.
//!
//! Produces deterministic sources (a coordinate-coded screen pattern, a
//! solid red camera, a 440 Hz tab tone and a 1 kHz microphone tone) and
//! answers permission prompts from a script. Used by the lifecycle tests
//! and by `screenrec record --synthetic`.

pub mod host;
pub mod patterns;
pub mod recorder;

pub use host::{Grant, SyntheticHost, SyntheticHostBuilder};
pub use recorder::SyntheticRecorder;
