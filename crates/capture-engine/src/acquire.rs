//! Permission-gated acquisition of the raw sources.

use screenrec_common::{RecorderError, RecorderResult, RecordingDefaults, RecordingOptions};
use screenrec_platform_core::{
    release_stream, CaptureHost, DisplayRequest, MediaStream, MediaTrack, PlatformError,
    UserMediaRequest,
};

/// The raw streams granted by the host.
#[derive(Debug, Clone)]
pub struct AcquiredSources {
    /// Display video and/or tab audio. Always present.
    pub screen: MediaStream,
    pub microphone: Option<MediaStream>,
    pub camera: Option<MediaStream>,
}

impl AcquiredSources {
    /// Audio tracks to feed the mixer: tab audio first, then the microphone.
    pub fn audio_sources(&self) -> Vec<MediaTrack> {
        self.screen
            .audio_tracks()
            .chain(self.microphone.iter().flat_map(|s| s.audio_tracks()))
            .cloned()
            .collect()
    }

    pub fn screen_video(&self) -> Option<&MediaTrack> {
        self.screen.first_video()
    }

    pub fn camera_video(&self) -> Option<&MediaTrack> {
        self.camera.as_ref().and_then(|s| s.first_video())
    }

    /// Stop every source track: screen, microphone, camera. Each stop is
    /// independent and tolerates tracks that were stopped before. Returns
    /// how many tracks this call stopped.
    pub fn release_all(&self) -> usize {
        let mut released = release_stream(&self.screen);
        if let Some(mic) = &self.microphone {
            released += release_stream(mic);
        }
        if let Some(camera) = &self.camera {
            released += release_stream(camera);
        }
        released
    }
}

/// Ask the host for every source the options enable.
///
/// The display request comes first and is mandatory: its failure aborts
/// before anything else is allocated. Camera and microphone follow and are
/// best-effort.
pub async fn acquire_sources(
    host: &dyn CaptureHost,
    options: &RecordingOptions,
    defaults: &RecordingDefaults,
) -> RecorderResult<AcquiredSources> {
    if !options.requests_display() {
        return Err(RecorderError::capture(
            "display capture needs screen video or tab audio, and both are disabled",
        ));
    }

    let request = DisplayRequest {
        video: options.enable_screen,
        audio: options.enable_audio,
    };
    let screen = host.get_display_media(request).await.map_err(|e| {
        tracing::error!(host = host.name(), error = %e, "Display capture failed");
        RecorderError::from(e)
    })?;
    tracing::info!(
        video = screen.video_tracks().count(),
        audio = screen.audio_tracks().count(),
        "Display capture granted"
    );
    if screen.is_empty() {
        tracing::warn!("Display capture granted without any tracks");
    }
    let mut pending = PendingStreams::default();
    pending.hold(&screen);

    let camera = if options.enable_camera {
        let request = UserMediaRequest::Camera {
            width: defaults.camera_width,
            height: defaults.camera_height,
        };
        best_effort(request, host.get_user_media(request).await)
    } else {
        None
    };
    if let Some(camera) = &camera {
        pending.hold(camera);
    }

    let microphone = if options.enable_mic {
        let request = UserMediaRequest::Microphone;
        best_effort(request, host.get_user_media(request).await)
    } else {
        None
    };

    pending.disarm();
    Ok(AcquiredSources {
        screen,
        microphone,
        camera,
    })
}

/// Streams granted so far by an acquisition still in progress. Released on
/// drop unless disarmed, so a cancelled acquisition leaves nothing live.
#[derive(Default)]
struct PendingStreams(Vec<MediaStream>);

impl PendingStreams {
    fn hold(&mut self, stream: &MediaStream) {
        self.0.push(stream.clone());
    }

    fn disarm(&mut self) {
        self.0.clear();
    }
}

impl Drop for PendingStreams {
    fn drop(&mut self) {
        for stream in &self.0 {
            let released = release_stream(stream);
            if released > 0 {
                tracing::warn!(released, "Acquisition cancelled; released granted tracks");
            }
        }
    }
}

fn best_effort(
    request: UserMediaRequest,
    result: Result<MediaStream, PlatformError>,
) -> Option<MediaStream> {
    let source = request.source_name();
    match result {
        Ok(stream) => {
            tracing::info!(source, tracks = stream.tracks().len(), "Source granted");
            Some(stream)
        }
        Err(PlatformError::PermissionDenied { message }) => {
            tracing::warn!(source, %message, "Source denied; continuing without it");
            None
        }
        Err(e) => {
            tracing::warn!(source, error = %e, "Could not get source; continuing without it");
            None
        }
    }
}
