//! Stream assembly: at most one video and one audio track, video first.

use screenrec_platform_core::{MediaStream, MediaTrack};

/// Combine the compositor's and the mixer's output into the recorded
/// stream. An empty stream is allowed; the recorder still runs and the
/// empty result is reported at the end.
pub fn assemble_stream(video: Option<MediaTrack>, audio: Option<MediaTrack>) -> MediaStream {
    let tracks: Vec<MediaTrack> = video.into_iter().chain(audio).collect();
    if tracks.is_empty() {
        tracing::warn!("Assembled stream has no tracks");
    } else {
        tracing::debug!(
            tracks = ?tracks.iter().map(|t| t.describe()).collect::<Vec<_>>(),
            "Assembled output stream"
        );
    }
    MediaStream::new(tracks)
}
