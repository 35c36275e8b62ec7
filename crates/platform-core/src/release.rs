//! Idempotent release of owned resources.
//!
//! Teardown stops tracks, recorders, mixing graphs, and render loops, and
//! some of them are reachable along several paths (the passthrough screen
//! track sits both in the recorded stream and in the display stream). Every
//! release goes through [`release_quietly`], which logs and absorbs the
//! failure instead of aborting teardown.

use crate::error::PlatformResult;
use crate::media::{MediaStream, MediaTrack};
use crate::recorder::MediaRecorder;

/// A resource that must be released exactly once.
pub trait Release {
    /// Name used in teardown logs.
    fn resource_name(&self) -> String;

    /// Release the resource. Fails with `AlreadyStopped` when it was
    /// released before.
    fn release(&mut self) -> PlatformResult<()>;
}

impl Release for MediaTrack {
    fn resource_name(&self) -> String {
        self.describe()
    }

    fn release(&mut self) -> PlatformResult<()> {
        self.stop()
    }
}

impl Release for Box<dyn MediaRecorder> {
    fn resource_name(&self) -> String {
        format!("{} recorder", self.mime_type())
    }

    fn release(&mut self) -> PlatformResult<()> {
        self.stop()
    }
}

/// Release `resource`, logging instead of propagating failures.
///
/// Returns whether this call performed the release.
pub fn release_quietly(resource: &mut dyn Release) -> bool {
    match resource.release() {
        Ok(()) => {
            tracing::debug!(resource = %resource.resource_name(), "Released");
            true
        }
        Err(e) if e.is_already_stopped() => {
            tracing::debug!(resource = %resource.resource_name(), "Already stopped");
            false
        }
        Err(e) => {
            tracing::warn!(
                resource = %resource.resource_name(),
                error = %e,
                "Release failed; continuing teardown"
            );
            false
        }
    }
}

/// Release every track of a stream. Returns how many were released by
/// this call.
pub fn release_stream(stream: &MediaStream) -> usize {
    stream
        .tracks()
        .iter()
        .map(|track| release_quietly(&mut track.clone()))
        .filter(|released| *released)
        .count()
}
