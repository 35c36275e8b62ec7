//! The Linux capture host.

use screenrec_common::RecordingDefaults;
use screenrec_platform_core::{
    CaptureHost, DisplayRequest, DisplayServer, MediaRecorder, MediaStream, MediaTrack,
    PlatformError, PlatformResult, RecorderConfig, TrackKind, UserMediaRequest,
};

use crate::display::detect_display_server;
use crate::portal;
use crate::recorder::WebmRecorder;
use crate::sources::{self, launch_source};

/// Captures through GStreamer: `ximagesrc` on X11, the ScreenCast portal
/// and `pipewiresrc` on Wayland, PulseAudio for audio and V4L2 for the
/// camera.
#[derive(Debug, Clone)]
pub struct LinuxHost {
    display_server: DisplayServer,
    capture_fps: u32,
    sample_rate: u32,
    channels: u16,
}

impl LinuxHost {
    pub fn new(defaults: &RecordingDefaults) -> Self {
        let display_server = detect_display_server();
        tracing::info!(?display_server, "Detected display server");
        Self::with_display_server(display_server, defaults)
    }

    pub fn with_display_server(display_server: DisplayServer, defaults: &RecordingDefaults) -> Self {
        Self {
            display_server,
            capture_fps: defaults.capture_fps.max(1),
            sample_rate: defaults.audio_sample_rate,
            channels: defaults.audio_channels,
        }
    }

    async fn screen_track(&self) -> PlatformResult<MediaTrack> {
        match self.display_server {
            DisplayServer::Wayland => {
                let session = portal::request_screencast().await?;
                let launch =
                    sources::portal_screen_launch(session.raw_fd(), session.node_id, self.capture_fps);
                launch_source(TrackKind::Video, "screen", &launch, session)
            }
            DisplayServer::X11 => launch_source(
                TrackKind::Video,
                "screen",
                &sources::x11_screen_launch(self.capture_fps),
                (),
            ),
            other => Err(PlatformError::unsupported(format!(
                "no screen capture on display server {other:?} (expected Wayland or X11)"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl CaptureHost for LinuxHost {
    fn name(&self) -> &str {
        "linux"
    }

    fn display_server(&self) -> DisplayServer {
        self.display_server
    }

    async fn get_display_media(&self, request: DisplayRequest) -> PlatformResult<MediaStream> {
        if !request.video && !request.audio {
            return Err(PlatformError::unsupported(
                "display capture needs video or audio",
            ));
        }

        let mut tracks = Vec::new();
        if request.video {
            tracks.push(self.screen_track().await?);
        }
        if request.audio {
            let launch = sources::system_audio_launch(self.sample_rate, self.channels);
            match launch_source(TrackKind::Audio, "system-audio", &launch, ()) {
                Ok(track) => tracks.push(track),
                Err(e) if !tracks.is_empty() => {
                    tracing::warn!(error = %e, "System audio unavailable; sharing the screen without it");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(MediaStream::new(tracks))
    }

    async fn get_user_media(&self, request: UserMediaRequest) -> PlatformResult<MediaStream> {
        let track = match request {
            UserMediaRequest::Microphone => {
                let launch = sources::microphone_launch(self.sample_rate, 1);
                launch_source(TrackKind::Audio, "microphone", &launch, ())?
            }
            UserMediaRequest::Camera { width, height } => {
                let device = sources::detect_camera_device().ok_or_else(|| {
                    PlatformError::device("no webcam found (expected a /dev/video* capture node)")
                })?;
                tracing::info!(%device, width, height, "Opening camera");
                let launch = sources::camera_launch(&device, width, height, self.capture_fps);
                launch_source(TrackKind::Video, "camera", &launch, ())?
            }
        };
        Ok(MediaStream::new(vec![track]))
    }

    fn create_recorder(
        &self,
        stream: &MediaStream,
        config: &RecorderConfig,
    ) -> PlatformResult<Box<dyn MediaRecorder>> {
        Ok(Box::new(WebmRecorder::new(stream.clone(), config.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_display_request_is_unsupported() {
        let host =
            LinuxHost::with_display_server(DisplayServer::X11, &RecordingDefaults::default());
        let err = host
            .get_display_media(DisplayRequest {
                video: false,
                audio: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn unknown_display_server_cannot_share_the_screen() {
        let host =
            LinuxHost::with_display_server(DisplayServer::Unknown, &RecordingDefaults::default());
        let err = host
            .get_display_media(DisplayRequest {
                video: true,
                audio: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Unsupported { .. }));
        assert_eq!(host.display_server(), DisplayServer::Unknown);
    }
}
