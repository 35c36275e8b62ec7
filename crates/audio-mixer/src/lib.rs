//! Screenrec Audio Mixer
//!
//! Folds any number of live audio tracks (tab/system audio, microphone)
//! into exactly one output track.
//!
//! ```text
//! tab audio ──► resample/up-mix ──┐
//!                                 ├──► MixBus ──► soft clip ──► mixed-audio track
//! microphone ─► resample/up-mix ──┘
//! ```
//!
//! - [`bus`]: the synchronous summing core
//! - [`graph`]: the per-session [`MixingGraph`] that drives the bus from
//!   live tracks on a fixed render quantum
//! - [`analysis`]: level and tone measurements over sample buffers

pub mod analysis;
pub mod bus;
pub mod graph;

pub use bus::{MixBus, MixFormat};
pub use graph::{mix_sources, MixerOutput, MixingGraph};
