//! The scripted capture host.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use screenrec_common::RecordingClock;
use screenrec_platform_core::{
    AudioChunk, CaptureHost, DisplayRequest, DisplayServer, MediaRecorder, MediaStream,
    MediaTrack, PlatformError, PlatformResult, RecorderConfig, TrackFeed, TrackKind,
    UserMediaRequest, VideoFrame,
};

use crate::patterns;
use crate::recorder::SyntheticRecorder;

/// How the host answers one kind of permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Grant {
    #[default]
    Allow,
    /// The user dismissed the prompt.
    Deny,
    /// The device failed after consent.
    Fail,
}

impl Grant {
    fn check(self, source: &str) -> PlatformResult<()> {
        match self {
            Grant::Allow => Ok(()),
            Grant::Deny => Err(PlatformError::permission_denied(format!(
                "{source} request dismissed"
            ))),
            Grant::Fail => Err(PlatformError::device(format!("{source} unavailable"))),
        }
    }
}

#[derive(Debug, Clone)]
struct Script {
    display: Grant,
    microphone: Grant,
    camera: Grant,
    screen_size: (u32, u32),
    camera_size: Option<(u32, u32)>,
    tab_audio: bool,
    idle: bool,
    frame_rate: u32,
    sample_rate: u32,
    prompt_delay: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            display: Grant::Allow,
            microphone: Grant::Allow,
            camera: Grant::Allow,
            screen_size: (640, 360),
            camera_size: None,
            tab_audio: true,
            idle: false,
            frame_rate: 30,
            sample_rate: 48000,
            prompt_delay: Duration::ZERO,
        }
    }
}

/// Builder for [`SyntheticHost`].
#[derive(Debug, Default)]
pub struct SyntheticHostBuilder {
    script: Script,
}

impl SyntheticHostBuilder {
    pub fn display(mut self, grant: Grant) -> Self {
        self.script.display = grant;
        self
    }

    pub fn microphone(mut self, grant: Grant) -> Self {
        self.script.microphone = grant;
        self
    }

    pub fn camera(mut self, grant: Grant) -> Self {
        self.script.camera = grant;
        self
    }

    pub fn screen_size(mut self, width: u32, height: u32) -> Self {
        self.script.screen_size = (width, height);
        self
    }

    /// Produce camera frames of this size regardless of what was asked.
    pub fn camera_size(mut self, width: u32, height: u32) -> Self {
        self.script.camera_size = Some((width, height));
        self
    }

    /// Whether the display share includes an audio track when asked.
    pub fn tab_audio(mut self, enabled: bool) -> Self {
        self.script.tab_audio = enabled;
        self
    }

    /// Grant sources that never produce data.
    pub fn idle(mut self) -> Self {
        self.script.idle = true;
        self
    }

    pub fn frame_rate(mut self, fps: u32) -> Self {
        self.script.frame_rate = fps.max(1);
        self
    }

    /// Time each permission prompt takes to be answered.
    pub fn prompt_delay(mut self, delay: Duration) -> Self {
        self.script.prompt_delay = delay;
        self
    }

    pub fn build(self) -> SyntheticHost {
        SyntheticHost {
            script: self.script,
            state: Arc::new(HostState::default()),
        }
    }
}

#[derive(Default)]
struct HostState {
    issued: Mutex<Vec<MediaTrack>>,
    display_feeds: Mutex<Vec<TrackFeed>>,
    requests: Mutex<Vec<String>>,
    released: Arc<AtomicUsize>,
    recorders: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A capture host with deterministic sources and scripted prompts.
///
/// Clones share state, so a test can keep one clone to inspect the host
/// after handing another to the recorder.
#[derive(Clone)]
pub struct SyntheticHost {
    script: Script,
    state: Arc<HostState>,
}

impl Default for SyntheticHost {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SyntheticHost {
    pub fn builder() -> SyntheticHostBuilder {
        SyntheticHostBuilder::default()
    }

    /// Source tracks handed out and still live.
    pub fn live_tracks(&self) -> usize {
        lock(&self.state.issued).iter().filter(|t| t.is_live()).count()
    }

    /// Source tracks handed out in total.
    pub fn issued_tracks(&self) -> usize {
        lock(&self.state.issued).len()
    }

    /// Times a source's release hook ran.
    pub fn releases(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    pub fn recorders_created(&self) -> usize {
        self.state.recorders.load(Ordering::SeqCst)
    }

    /// Prompts asked so far, in order (`display`, `camera`, `microphone`).
    pub fn requests(&self) -> Vec<String> {
        lock(&self.state.requests).clone()
    }

    /// Simulate the user pressing the host's "stop sharing" control: every
    /// display track ends on its own. Returns how many tracks ended.
    pub fn end_screen_share(&self) -> usize {
        let feeds = lock(&self.state.display_feeds).clone();
        feeds.iter().filter(|feed| feed.end()).count()
    }

    async fn prompt(&self, name: &str) {
        lock(&self.state.requests).push(name.to_string());
        if !self.script.prompt_delay.is_zero() {
            tokio::time::sleep(self.script.prompt_delay).await;
        }
    }

    fn issue(&self, kind: TrackKind, label: &str) -> (MediaTrack, TrackFeed) {
        let (track, feed) = MediaTrack::new(kind, label);
        let released = Arc::clone(&self.state.released);
        let name = track.describe();
        track.set_release_hook(move || {
            released.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(source = %name, "Synthetic source released");
        });
        lock(&self.state.issued).push(track.clone());
        (track, feed)
    }

    fn spawn_video(&self, feed: TrackFeed, width: u32, height: u32, camera: bool) {
        let fps = self.script.frame_rate;
        feed.update_settings(|s| {
            s.width = Some(width);
            s.height = Some(height);
            s.frame_rate = Some(fps as f64);
        });
        if self.script.idle {
            return;
        }
        tokio::spawn(async move {
            let clock = RecordingClock::start();
            let mut ticker = tokio::time::interval(Duration::from_nanos(
                1_000_000_000 / fps.max(1) as u64,
            ));
            let mut index = 0u64;
            loop {
                ticker.tick().await;
                let image = if camera {
                    patterns::camera_pattern(width, height)
                } else {
                    patterns::screen_pattern(width, height, index)
                };
                if !feed.push_frame(VideoFrame::new(image, clock.elapsed())) {
                    break;
                }
                index += 1;
            }
        });
    }

    fn spawn_tone(&self, feed: TrackFeed, freq: f32, channels: u16) {
        let rate = self.script.sample_rate;
        feed.update_settings(|s| {
            s.sample_rate = Some(rate);
            s.channels = Some(channels);
        });
        if self.script.idle {
            return;
        }
        tokio::spawn(async move {
            let block = Duration::from_millis(20);
            let frames = (rate as u64 * 20 / 1000) as usize;
            let clock = RecordingClock::start();
            let mut ticker = tokio::time::interval(block);
            let mut position = 0u64;
            loop {
                ticker.tick().await;
                let samples = patterns::tone(freq, rate, channels, position, frames);
                let chunk = AudioChunk::new(samples, rate, channels, clock.elapsed());
                if !feed.push_audio(chunk) {
                    break;
                }
                position += frames as u64;
            }
        });
    }
}

#[async_trait::async_trait]
impl CaptureHost for SyntheticHost {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn display_server(&self) -> DisplayServer {
        DisplayServer::Synthetic
    }

    async fn get_display_media(&self, request: DisplayRequest) -> PlatformResult<MediaStream> {
        self.prompt("display").await;
        if !request.video && !request.audio {
            return Err(PlatformError::unsupported(
                "display request must ask for video or audio",
            ));
        }
        self.script.display.check("display")?;

        let mut tracks = Vec::new();
        if request.video {
            let (track, feed) = self.issue(TrackKind::Video, "screen");
            lock(&self.state.display_feeds).push(feed.clone());
            let (w, h) = self.script.screen_size;
            self.spawn_video(feed, w, h, false);
            tracks.push(track);
        }
        if request.audio && self.script.tab_audio {
            let (track, feed) = self.issue(TrackKind::Audio, "tab-audio");
            lock(&self.state.display_feeds).push(feed.clone());
            self.spawn_tone(feed, patterns::TAB_TONE_HZ, 2);
            tracks.push(track);
        }
        Ok(MediaStream::new(tracks))
    }

    async fn get_user_media(&self, request: UserMediaRequest) -> PlatformResult<MediaStream> {
        self.prompt(request.source_name()).await;
        match request {
            UserMediaRequest::Microphone => {
                self.script.microphone.check("microphone")?;
                let (track, feed) = self.issue(TrackKind::Audio, "microphone");
                self.spawn_tone(feed, patterns::MIC_TONE_HZ, 1);
                Ok(MediaStream::new(vec![track]))
            }
            UserMediaRequest::Camera { width, height } => {
                self.script.camera.check("camera")?;
                let (w, h) = self.script.camera_size.unwrap_or((width, height));
                let (track, feed) = self.issue(TrackKind::Video, "camera");
                self.spawn_video(feed, w, h, true);
                Ok(MediaStream::new(vec![track]))
            }
        }
    }

    fn create_recorder(
        &self,
        stream: &MediaStream,
        config: &RecorderConfig,
    ) -> PlatformResult<Box<dyn MediaRecorder>> {
        self.state.recorders.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticRecorder::new(stream.clone(), config.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grants_and_denials_follow_script() {
        let host = SyntheticHost::builder()
            .microphone(Grant::Deny)
            .camera(Grant::Fail)
            .build();

        let display = host
            .get_display_media(DisplayRequest {
                video: true,
                audio: true,
            })
            .await
            .unwrap();
        assert_eq!(display.tracks().len(), 2);

        let mic = host.get_user_media(UserMediaRequest::Microphone).await;
        assert!(matches!(mic, Err(PlatformError::PermissionDenied { .. })));
        let cam = host
            .get_user_media(UserMediaRequest::Camera {
                width: 320,
                height: 240,
            })
            .await;
        assert!(matches!(cam, Err(PlatformError::Device { .. })));

        assert_eq!(host.requests(), vec!["display", "microphone", "camera"]);
        assert_eq!(host.live_tracks(), 2);
    }

    #[tokio::test]
    async fn sources_produce_data_and_stop_on_release() {
        let host = SyntheticHost::default();
        let stream = host
            .get_user_media(UserMediaRequest::Camera {
                width: 32,
                height: 24,
            })
            .await
            .unwrap();
        let camera = stream.first_video().unwrap().clone();
        let mut frames = camera.watch_frames();
        frames.wait_for(|f| f.is_some()).await.unwrap();
        let frame = camera.latest_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (32, 24));
        assert_eq!(*frame.image.get_pixel(0, 0), patterns::CAMERA_COLOR);

        camera.stop().unwrap();
        assert_eq!(host.live_tracks(), 0);
        assert_eq!(host.releases(), 1);
    }

    #[tokio::test]
    async fn stop_sharing_ends_display_tracks() {
        let host = SyntheticHost::builder().idle().build();
        let stream = host
            .get_display_media(DisplayRequest {
                video: true,
                audio: true,
            })
            .await
            .unwrap();
        let screen = stream.first_video().unwrap().clone();
        let waiter = tokio::spawn(async move { screen.wait_ended().await });

        assert_eq!(host.end_screen_share(), 2);
        assert!(waiter.await.unwrap());
        assert_eq!(host.end_screen_share(), 0);
        assert_eq!(host.live_tracks(), 0);
    }

    #[tokio::test]
    async fn display_without_tab_audio() {
        let host = SyntheticHost::builder().tab_audio(false).build();
        let stream = host
            .get_display_media(DisplayRequest {
                video: true,
                audio: true,
            })
            .await
            .unwrap();
        assert!(stream.first_audio().is_none());
    }
}
