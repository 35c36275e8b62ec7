//! The recurring render task behind a composite track.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use screenrec_common::{RateController, RecordingClock};
use screenrec_platform_core::{
    MediaTrack, PlatformError, PlatformResult, Release, TrackFeed, VideoFrame,
};

use crate::surface::Surface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLoopState {
    Running,
    Stopped,
}

/// Rates the loop runs at.
#[derive(Debug, Clone, Copy)]
pub struct FrameLoopRates {
    /// Per-frame callback rate.
    pub render_hz: u32,
    /// Rate composited frames are published on the output track.
    pub capture_fps: u32,
}

impl Default for FrameLoopRates {
    fn default() -> Self {
        Self {
            render_hz: 60,
            capture_fps: 30,
        }
    }
}

#[derive(Debug, Default)]
struct LoopCounters {
    ticks: AtomicU64,
    published: AtomicU64,
}

/// Draws the screen and camera onto a surface on every tick and publishes
/// the result. Runs until cancelled.
#[derive(Debug)]
pub struct CompositeFrameLoop {
    stop: Arc<AtomicBool>,
    counters: Arc<LoopCounters>,
    task: Option<JoinHandle<()>>,
}

impl CompositeFrameLoop {
    /// Start drawing. Must be called from within a tokio runtime.
    pub fn start(
        surface: Surface,
        screen: MediaTrack,
        camera: MediaTrack,
        output: TrackFeed,
        rates: FrameLoopRates,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(LoopCounters::default());
        output.update_settings(|s| {
            s.width = Some(surface.width());
            s.height = Some(surface.height());
            s.frame_rate = Some(rates.capture_fps.max(1) as f64);
        });

        tracing::info!(
            width = surface.width(),
            height = surface.height(),
            render_hz = rates.render_hz,
            capture_fps = rates.capture_fps,
            "Composite frame loop started"
        );

        let task = tokio::spawn(run(
            surface,
            screen,
            camera,
            output,
            rates,
            Arc::clone(&stop),
            Arc::clone(&counters),
        ));

        Self {
            stop,
            counters,
            task: Some(task),
        }
    }

    pub fn state(&self) -> FrameLoopState {
        if self.task.is_some() {
            FrameLoopState::Running
        } else {
            FrameLoopState::Stopped
        }
    }

    /// Render ticks so far.
    pub fn ticks(&self) -> u64 {
        self.counters.ticks.load(Ordering::Relaxed)
    }

    /// Frames published on the output track so far.
    pub fn published_frames(&self) -> u64 {
        self.counters.published.load(Ordering::Relaxed)
    }

    /// Clear the scheduled callback. Fails with `AlreadyStopped` after the
    /// first call.
    pub fn cancel(&mut self) -> PlatformResult<()> {
        let Some(task) = self.task.take() else {
            return Err(PlatformError::already_stopped("composite frame loop"));
        };
        self.stop.store(true, Ordering::Release);
        task.abort();
        tracing::info!(
            ticks = self.ticks(),
            published = self.published_frames(),
            "Composite frame loop cancelled"
        );
        Ok(())
    }
}

async fn run(
    mut surface: Surface,
    screen: MediaTrack,
    camera: MediaTrack,
    output: TrackFeed,
    rates: FrameLoopRates,
    stop: Arc<AtomicBool>,
    counters: Arc<LoopCounters>,
) {
    let clock = RecordingClock::start();
    let mut publish = RateController::new(rates.capture_fps);
    let period = Duration::from_nanos(1_000_000_000 / rates.render_hz.max(1) as u64);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if stop.load(Ordering::Acquire) {
            break;
        }
        counters.ticks.fetch_add(1, Ordering::Relaxed);

        let screen_frame = screen.latest_frame();
        let camera_frame = camera.latest_frame();
        surface.compose(
            screen_frame.as_ref().map(|f| f.image.as_ref()),
            camera_frame.as_ref().map(|f| f.image.as_ref()),
        );

        if publish.should_tick(clock.elapsed_ns()) {
            let frame = VideoFrame::new(surface.canvas().clone(), clock.elapsed());
            if !output.push_frame(frame) {
                tracing::debug!("Composite track no longer live; frame loop exiting");
                break;
            }
            counters.published.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Release for CompositeFrameLoop {
    fn resource_name(&self) -> String {
        "composite frame loop".to_string()
    }

    fn release(&mut self) -> PlatformResult<()> {
        self.cancel()
    }
}

impl Drop for CompositeFrameLoop {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};
    use screenrec_platform_core::{MediaData, TrackKind};

    use super::*;

    fn sources() -> (MediaTrack, TrackFeed, MediaTrack, TrackFeed) {
        let (screen, screen_feed) = MediaTrack::new(TrackKind::Video, "screen");
        let (camera, camera_feed) = MediaTrack::new(TrackKind::Video, "camera");
        screen_feed.push_frame(VideoFrame::new(
            RgbaImage::from_pixel(160, 120, Rgba([0, 0, 255, 255])),
            Duration::ZERO,
        ));
        camera_feed.push_frame(VideoFrame::new(
            RgbaImage::from_pixel(32, 24, Rgba([255, 0, 0, 255])),
            Duration::ZERO,
        ));
        (screen, screen_feed, camera, camera_feed)
    }

    #[tokio::test]
    async fn publishes_composited_frames_until_cancelled() {
        let (screen, _sf, camera, _cf) = sources();
        let (output, feed) = MediaTrack::new(TrackKind::Video, "composite");
        let mut rx = output.subscribe();
        let surface = Surface::new(160, 120).unwrap();
        let (cx, cy) = surface.layout().center();

        let mut frame_loop =
            CompositeFrameLoop::start(surface, screen, camera, feed, FrameLoopRates::default());
        assert_eq!(frame_loop.state(), FrameLoopState::Running);

        let frame = match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Ok(MediaData::Video(frame))) => frame,
            other => panic!("no composite frame: {other:?}"),
        };
        assert_eq!((frame.width(), frame.height()), (160, 120));
        assert_eq!(frame.image.get_pixel(cx as u32, cy as u32).0, [255, 0, 0, 255]);
        assert_eq!(frame.image.get_pixel(159, 0).0, [0, 0, 255, 255]);

        assert!(frame_loop.cancel().is_ok());
        assert_eq!(frame_loop.state(), FrameLoopState::Stopped);
        assert!(frame_loop.cancel().unwrap_err().is_already_stopped());
        assert_eq!(output.settings().frame_rate, Some(30.0));
    }

    #[tokio::test]
    async fn publishing_is_decimated_to_capture_rate() {
        let (screen, _sf, camera, _cf) = sources();
        let (_output, feed) = MediaTrack::new(TrackKind::Video, "composite");
        let rates = FrameLoopRates {
            render_hz: 200,
            capture_fps: 20,
        };
        let mut frame_loop =
            CompositeFrameLoop::start(Surface::new(64, 48).unwrap(), screen, camera, feed, rates);

        tokio::time::sleep(Duration::from_millis(300)).await;
        frame_loop.cancel().unwrap();
        assert!(frame_loop.ticks() > frame_loop.published_frames());
        assert!(frame_loop.published_frames() >= 1);
    }

    #[tokio::test]
    async fn stops_when_output_track_is_stopped() {
        let (screen, _sf, camera, _cf) = sources();
        let (output, feed) = MediaTrack::new(TrackKind::Video, "composite");
        let mut frame_loop = CompositeFrameLoop::start(
            Surface::new(64, 48).unwrap(),
            screen,
            camera,
            feed,
            FrameLoopRates::default(),
        );
        output.stop().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let published = frame_loop.published_frames();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(frame_loop.published_frames(), published);
        // Cancelling a loop that exited on its own is still a first cancel.
        assert!(frame_loop.cancel().is_ok());
    }
}
