//! Video compositor: decides between passing the screen track through and
//! building a composite track with a camera inset.

use screenrec_common::RecordingDefaults;
use screenrec_platform_core::{MediaTrack, TrackKind, TrackState};

use crate::frame_loop::{CompositeFrameLoop, FrameLoopRates};
use crate::surface::Surface;

/// Label of the synthetic composite track.
pub const COMPOSITE_TRACK_LABEL: &str = "composite";

/// Compositor parameters.
#[derive(Debug, Clone, Copy)]
pub struct CompositorConfig {
    /// Surface size used when the screen track reports no resolution.
    pub fallback_width: u32,
    pub fallback_height: u32,
    pub rates: FrameLoopRates,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self::from_defaults(&RecordingDefaults::default())
    }
}

impl CompositorConfig {
    pub fn from_defaults(defaults: &RecordingDefaults) -> Self {
        Self {
            fallback_width: defaults.fallback_width,
            fallback_height: defaults.fallback_height,
            rates: FrameLoopRates {
                render_hz: defaults.render_rate_hz,
                capture_fps: defaults.capture_fps,
            },
        }
    }
}

/// How the compositor's output was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeMode {
    /// The screen track (if any) is used unmodified.
    Passthrough,
    /// A frame loop draws the screen with a camera inset.
    Composite,
    /// The surface could not be created. The composite track exists but
    /// never receives frames.
    Inert,
}

/// The compositor's video track and the render loop that feeds it.
#[derive(Debug)]
pub struct CompositorOutput {
    pub mode: CompositeMode,
    pub track: Option<MediaTrack>,
    /// Present only in [`CompositeMode::Composite`]. Must be cancelled at
    /// teardown.
    pub frame_loop: Option<CompositeFrameLoop>,
}

impl CompositorOutput {
    fn passthrough(screen: Option<&MediaTrack>) -> Self {
        Self {
            mode: CompositeMode::Passthrough,
            track: screen.cloned(),
            frame_loop: None,
        }
    }
}

/// Produce the video track for recording.
///
/// Without a camera (or without screen video) the screen track passes
/// through. With both, this waits until each has delivered a first frame,
/// sizes a surface to the screen, and starts the frame loop.
pub async fn composite_video(
    screen: Option<&MediaTrack>,
    camera: Option<&MediaTrack>,
    config: &CompositorConfig,
) -> CompositorOutput {
    let screen = screen.filter(|t| t.kind() == TrackKind::Video);
    let (screen_track, camera_track) = match (screen, camera) {
        (Some(s), Some(c)) => (s, c),
        (None, Some(_)) => {
            tracing::debug!("Camera granted without screen video; nothing to composite onto");
            return CompositorOutput::passthrough(None);
        }
        (screen, None) => return CompositorOutput::passthrough(screen),
    };

    let (screen_ready, camera_ready) =
        tokio::join!(wait_for_metadata(screen_track), wait_for_metadata(camera_track));
    if !screen_ready || !camera_ready {
        tracing::warn!(
            screen_ready,
            camera_ready,
            "Source ended before delivering a frame; falling back to passthrough"
        );
        return CompositorOutput::passthrough(Some(screen_track));
    }

    let settings = screen_track.settings();
    let width = settings.width.unwrap_or(config.fallback_width);
    let height = settings.height.unwrap_or(config.fallback_height);

    let (track, feed) = MediaTrack::new(TrackKind::Video, COMPOSITE_TRACK_LABEL);
    let Some(surface) = Surface::new(width, height) else {
        tracing::warn!(width, height, "Render surface unavailable; compositor is inert");
        return CompositorOutput {
            mode: CompositeMode::Inert,
            track: Some(track),
            frame_loop: None,
        };
    };

    let frame_loop = CompositeFrameLoop::start(
        surface,
        screen_track.clone(),
        camera_track.clone(),
        feed,
        config.rates,
    );

    CompositorOutput {
        mode: CompositeMode::Composite,
        track: Some(track),
        frame_loop: Some(frame_loop),
    }
}

/// Wait until the track has a frame. Returns false if it stopped or ended
/// first.
async fn wait_for_metadata(track: &MediaTrack) -> bool {
    let mut frames = track.watch_frames();
    let mut state = track.watch_state();
    tokio::select! {
        loaded = frames.wait_for(|frame| frame.is_some()) => loaded.is_ok(),
        _ = state.wait_for(|s| *s != TrackState::Live) => track.latest_frame().is_some(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::{Rgba, RgbaImage};
    use screenrec_platform_core::{MediaData, VideoFrame};

    use super::*;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> VideoFrame {
        VideoFrame::new(RgbaImage::from_pixel(width, height, Rgba(color)), Duration::ZERO)
    }

    #[tokio::test]
    async fn no_camera_passes_screen_through() {
        let (screen, _feed) = MediaTrack::new(TrackKind::Video, "screen");
        let output = composite_video(Some(&screen), None, &CompositorConfig::default()).await;
        assert_eq!(output.mode, CompositeMode::Passthrough);
        assert_eq!(output.track.unwrap().id(), screen.id());
        assert!(output.frame_loop.is_none());
    }

    #[tokio::test]
    async fn camera_without_screen_video_yields_nothing() {
        let (camera, _feed) = MediaTrack::new(TrackKind::Video, "camera");
        let output = composite_video(None, Some(&camera), &CompositorConfig::default()).await;
        assert_eq!(output.mode, CompositeMode::Passthrough);
        assert!(output.track.is_none());
    }

    #[tokio::test]
    async fn waits_for_both_sources_then_composites() {
        let (screen, screen_feed) = MediaTrack::new(TrackKind::Video, "screen");
        let (camera, camera_feed) = MediaTrack::new(TrackKind::Video, "camera");

        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            screen_feed.push_frame(solid(200, 150, [0, 0, 255, 255]));
            tokio::time::sleep(Duration::from_millis(20)).await;
            camera_feed.push_frame(solid(40, 30, [255, 0, 0, 255]));
            (screen_feed, camera_feed)
        });

        let mut output =
            composite_video(Some(&screen), Some(&camera), &CompositorConfig::default()).await;
        let _feeds = producer.await.unwrap();
        assert_eq!(output.mode, CompositeMode::Composite);
        let track = output.track.clone().unwrap();
        assert_eq!(track.label(), COMPOSITE_TRACK_LABEL);

        let mut rx = track.subscribe();
        let frame = match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Ok(MediaData::Video(frame))) => frame,
            other => panic!("no composite frame: {other:?}"),
        };
        assert_eq!((frame.width(), frame.height()), (200, 150));
        output.frame_loop.as_mut().unwrap().cancel().unwrap();
    }

    #[tokio::test]
    async fn source_ending_before_first_frame_falls_back() {
        let (screen, screen_feed) = MediaTrack::new(TrackKind::Video, "screen");
        let (camera, camera_feed) = MediaTrack::new(TrackKind::Video, "camera");
        screen_feed.push_frame(solid(64, 48, [0, 0, 255, 255]));
        camera_feed.end();

        let output =
            composite_video(Some(&screen), Some(&camera), &CompositorConfig::default()).await;
        assert_eq!(output.mode, CompositeMode::Passthrough);
        assert_eq!(output.track.unwrap().id(), screen.id());
    }

    #[tokio::test]
    async fn missing_resolution_uses_fallback_surface() {
        let config = CompositorConfig {
            fallback_width: 96,
            fallback_height: 64,
            ..CompositorConfig::default()
        };
        let (screen, screen_feed) = MediaTrack::new(TrackKind::Video, "screen");
        let (camera, camera_feed) = MediaTrack::new(TrackKind::Video, "camera");
        screen_feed.push_frame(solid(32, 32, [0, 0, 255, 255]));
        camera_feed.push_frame(solid(8, 8, [255, 0, 0, 255]));
        // The host withdrew its size report.
        screen_feed.update_settings(|s| {
            s.width = None;
            s.height = None;
        });

        let mut output = composite_video(Some(&screen), Some(&camera), &config).await;
        let track = output.track.clone().unwrap();
        assert_eq!(track.settings().width, Some(96));
        assert_eq!(track.settings().height, Some(64));
        output.frame_loop.as_mut().unwrap().cancel().unwrap();
    }

    #[tokio::test]
    async fn zero_sized_screen_is_inert() {
        let (screen, screen_feed) = MediaTrack::new(TrackKind::Video, "screen");
        let (camera, camera_feed) = MediaTrack::new(TrackKind::Video, "camera");
        screen_feed.push_frame(solid(16, 16, [0, 0, 255, 255]));
        camera_feed.push_frame(solid(8, 8, [255, 0, 0, 255]));
        screen_feed.update_settings(|s| s.width = Some(0));

        let output =
            composite_video(Some(&screen), Some(&camera), &CompositorConfig::default()).await;
        assert_eq!(output.mode, CompositeMode::Inert);
        let track = output.track.unwrap();
        assert!(track.is_live());
        assert!(track.latest_frame().is_none());
        assert!(output.frame_loop.is_none());
    }
}
