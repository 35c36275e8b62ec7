//! Screenrec Common Utilities
//!
//! Shared infrastructure for all screenrec crates:
//! - Error types and result aliases
//! - Recording options snapshot handed to the recorder at start
//! - Clock and rate utilities for frame pacing and chunk timestamps
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod options;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use options::*;
