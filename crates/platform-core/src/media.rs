//! Live media tracks and streams.
//!
//! A [`MediaTrack`] is the consumer-side handle to one audio or video
//! channel; the host keeps the matching [`TrackFeed`] and pushes data into
//! it. Both share one inner state, so stopping the track from either side
//! is visible everywhere and runs the host's release hook exactly once.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::error::{PlatformError, PlatformResult};

/// Buffered data items per subscriber before a slow consumer starts lagging.
const DATA_CHANNEL_CAPACITY: usize = 64;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// Lifecycle of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Producing data.
    Live,
    /// Stopped by a consumer through [`MediaTrack::stop`].
    Stopped,
    /// Ended by its source (device unplugged, screen share revoked).
    Ended,
}

/// Current capabilities of a track. Fields a track kind does not use stay
/// `None`, and video sizes are only known once the first frame arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// One RGBA video frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub image: Arc<RgbaImage>,
    /// Offset from the producing source's epoch.
    pub timestamp: Duration,
}

impl VideoFrame {
    pub fn new(image: RgbaImage, timestamp: Duration) -> Self {
        Self {
            image: Arc::new(image),
            timestamp,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A block of interleaved f32 samples.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: Duration,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16, timestamp: Duration) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: channels.max(1),
            timestamp,
        }
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}

/// A data item flowing through a track.
#[derive(Debug, Clone)]
pub enum MediaData {
    Video(VideoFrame),
    Audio(AudioChunk),
}

impl MediaData {
    /// Raw payload size in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            MediaData::Video(frame) => frame.image.as_raw().len(),
            MediaData::Audio(chunk) => chunk.samples.len() * std::mem::size_of::<f32>(),
        }
    }

    pub fn timestamp(&self) -> Duration {
        match self {
            MediaData::Video(frame) => frame.timestamp,
            MediaData::Audio(chunk) => chunk.timestamp,
        }
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

struct TrackInner {
    id: u64,
    kind: TrackKind,
    label: String,
    settings: Mutex<TrackSettings>,
    state: watch::Sender<TrackState>,
    data: broadcast::Sender<MediaData>,
    latest_frame: watch::Sender<Option<VideoFrame>>,
    release_hook: Mutex<Option<ReleaseHook>>,
}

impl TrackInner {
    fn settings(&self) -> MutexGuard<'_, TrackSettings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Leave `Live` for `next`. Returns false if the track had already left.
    fn transition(&self, next: TrackState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            let hook = self
                .release_hook
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(hook) = hook {
                hook();
            }
        }
        changed
    }
}

/// Consumer-side handle to a live audio or video channel.
///
/// Cloning is cheap and every clone refers to the same track.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    /// Create a live track and the feed its producer pushes data into.
    pub fn new(kind: TrackKind, label: impl Into<String>) -> (MediaTrack, TrackFeed) {
        let (state, _) = watch::channel(TrackState::Live);
        let (data, _) = broadcast::channel(DATA_CHANNEL_CAPACITY);
        let (latest_frame, _) = watch::channel(None);
        let inner = Arc::new(TrackInner {
            id: next_id(),
            kind,
            label: label.into(),
            settings: Mutex::new(TrackSettings::default()),
            state,
            data,
            latest_frame,
            release_hook: Mutex::new(None),
        });
        (
            MediaTrack {
                inner: Arc::clone(&inner),
            },
            TrackFeed { inner },
        )
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn settings(&self) -> TrackSettings {
        *self.inner.settings()
    }

    pub fn state(&self) -> TrackState {
        *self.inner.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// Stop the track and release its source.
    ///
    /// Returns [`PlatformError::AlreadyStopped`] if the track was stopped
    /// or ended before. Watchers of [`MediaTrack::wait_ended`] are told the
    /// track stopped locally, not that its source ended.
    pub fn stop(&self) -> PlatformResult<()> {
        if self.inner.transition(TrackState::Stopped) {
            tracing::debug!(track = self.inner.id, label = %self.inner.label, "Track stopped");
            Ok(())
        } else {
            Err(PlatformError::already_stopped(self.describe()))
        }
    }

    /// Wait until the track leaves `Live`.
    ///
    /// Resolves to `true` when the source ended on its own and `false`
    /// when a consumer stopped the track.
    pub async fn wait_ended(&self) -> bool {
        let mut rx = self.inner.state.subscribe();
        let ended = match rx.wait_for(|state| *state != TrackState::Live).await {
            Ok(state) => *state == TrackState::Ended,
            Err(_) => false,
        };
        ended
    }

    /// Subscribe to every data item pushed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<MediaData> {
        self.inner.data.subscribe()
    }

    /// Most recent video frame, if the source delivered one.
    pub fn latest_frame(&self) -> Option<VideoFrame> {
        self.inner.latest_frame.borrow().clone()
    }

    /// Receiver that observes the latest video frame.
    pub fn watch_frames(&self) -> watch::Receiver<Option<VideoFrame>> {
        self.inner.latest_frame.subscribe()
    }

    /// Receiver that observes the track state.
    pub fn watch_state(&self) -> watch::Receiver<TrackState> {
        self.inner.state.subscribe()
    }

    /// Human-readable identification for logs and errors.
    pub fn describe(&self) -> String {
        format!("{} track '{}'", self.inner.kind, self.inner.label)
    }

    /// Register what to run when the track stops or ends.
    ///
    /// Runs immediately if the track is no longer live.
    pub fn set_release_hook(&self, hook: impl FnOnce() + Send + 'static) {
        if !self.is_live() {
            hook();
            return;
        }
        *self
            .inner
            .release_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Box::new(hook));
        // The track may have stopped between the check and the store.
        if !self.is_live() {
            let hook = self
                .inner
                .release_hook
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(hook) = hook {
                hook();
            }
        }
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish()
    }
}

/// Producer-side handle of a track.
#[derive(Clone)]
pub struct TrackFeed {
    inner: Arc<TrackInner>,
}

impl TrackFeed {
    /// The consumer handle for this feed.
    pub fn track(&self) -> MediaTrack {
        MediaTrack {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn is_live(&self) -> bool {
        *self.inner.state.borrow() == TrackState::Live
    }

    /// Publish a video frame. Returns false once the track is no longer
    /// live, which tells the producer to stop.
    pub fn push_frame(&self, frame: VideoFrame) -> bool {
        if !self.is_live() {
            return false;
        }
        {
            let mut settings = self.inner.settings();
            settings.width = Some(frame.width());
            settings.height = Some(frame.height());
        }
        self.inner.latest_frame.send_replace(Some(frame.clone()));
        // No subscribers is not an error.
        let _ = self.inner.data.send(MediaData::Video(frame));
        true
    }

    /// Publish a block of audio samples. Returns false once the track is no
    /// longer live.
    pub fn push_audio(&self, chunk: AudioChunk) -> bool {
        if !self.is_live() {
            return false;
        }
        {
            let mut settings = self.inner.settings();
            settings.sample_rate = Some(chunk.sample_rate);
            settings.channels = Some(chunk.channels);
        }
        let _ = self.inner.data.send(MediaData::Audio(chunk));
        true
    }

    pub fn update_settings(&self, update: impl FnOnce(&mut TrackSettings)) {
        update(&mut self.inner.settings());
    }

    /// Signal that the source ended on its own. Returns false if the track
    /// had already stopped or ended.
    pub fn end(&self) -> bool {
        let ended = self.inner.transition(TrackState::Ended);
        if ended {
            tracing::info!(track = self.inner.id, label = %self.inner.label, "Track source ended");
        }
        ended
    }
}

impl fmt::Debug for TrackFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackFeed")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("live", &self.is_live())
            .finish()
    }
}

/// An ordered set of tracks handled as one unit.
#[derive(Debug, Clone, Default)]
pub struct MediaStream {
    id: u64,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: next_id(),
            tracks,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn first_video(&self) -> Option<&MediaTrack> {
        self.video_tracks().next()
    }

    pub fn first_audio(&self) -> Option<&MediaTrack> {
        self.audio_tracks().next()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn frame(width: u32, height: u32) -> VideoFrame {
        VideoFrame::new(RgbaImage::new(width, height), Duration::ZERO)
    }

    #[test]
    fn stop_is_reported_once_then_already_stopped() {
        let (track, _feed) = MediaTrack::new(TrackKind::Video, "screen");
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        track.set_release_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(track.stop().is_ok());
        let err = track.stop().unwrap_err();
        assert!(err.is_already_stopped());
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(track.state(), TrackState::Stopped);
    }

    #[test]
    fn feed_end_runs_hook_and_blocks_further_data() {
        let (track, feed) = MediaTrack::new(TrackKind::Audio, "mic");
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        track.set_release_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(feed.end());
        assert!(!feed.end());
        assert!(track.stop().is_err());
        assert!(!feed.push_audio(AudioChunk::new(vec![0.0; 4], 48000, 2, Duration::ZERO)));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hook_registered_after_stop_runs_immediately() {
        let (track, _feed) = MediaTrack::new(TrackKind::Video, "camera");
        track.stop().unwrap();
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        track.set_release_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn frames_update_settings_and_latest() {
        let (track, feed) = MediaTrack::new(TrackKind::Video, "screen");
        assert!(track.latest_frame().is_none());
        assert!(feed.push_frame(frame(64, 48)));
        let settings = track.settings();
        assert_eq!((settings.width, settings.height), (Some(64), Some(48)));
        assert_eq!(track.latest_frame().unwrap().width(), 64);
    }

    #[tokio::test]
    async fn wait_ended_distinguishes_source_end_from_stop() {
        let (stopped, _feed) = MediaTrack::new(TrackKind::Video, "a");
        let waiter = {
            let track = stopped.clone();
            tokio::spawn(async move { track.wait_ended().await })
        };
        stopped.stop().unwrap();
        assert!(!waiter.await.unwrap());

        let (ended, feed) = MediaTrack::new(TrackKind::Video, "b");
        let waiter = {
            let track = ended.clone();
            tokio::spawn(async move { track.wait_ended().await })
        };
        feed.end();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn subscribers_receive_pushed_audio() {
        let (track, feed) = MediaTrack::new(TrackKind::Audio, "tab");
        let mut rx = track.subscribe();
        feed.push_audio(AudioChunk::new(vec![0.5; 8], 48000, 2, Duration::ZERO));
        match rx.recv().await.unwrap() {
            MediaData::Audio(chunk) => assert_eq!(chunk.frames(), 4),
            MediaData::Video(_) => panic!("expected audio"),
        }
    }

    #[test]
    fn feed_debug_shows_label_and_liveness() {
        let (track, feed) = MediaTrack::new(TrackKind::Audio, "mixed-audio");
        let shown = format!("{feed:?}");
        assert!(shown.contains("mixed-audio"));
        assert!(shown.contains("live: true"));
        track.stop().unwrap();
        assert!(format!("{feed:?}").contains("live: false"));
    }

    #[tokio::test]
    async fn wait_ended_after_the_fact_resolves_immediately() {
        let (track, feed) = MediaTrack::new(TrackKind::Video, "screen");
        feed.end();
        assert!(track.wait_ended().await);
    }

    #[test]
    fn stream_filters_by_kind() {
        let (video, _v) = MediaTrack::new(TrackKind::Video, "screen");
        let (audio, _a) = MediaTrack::new(TrackKind::Audio, "tab");
        let stream = MediaStream::new(vec![video, audio]);
        assert_eq!(stream.first_video().unwrap().label(), "screen");
        assert_eq!(stream.first_audio().unwrap().label(), "tab");
        assert_eq!(stream.live_track_count(), 2);
        stream.tracks()[0].stop().unwrap();
        assert_eq!(stream.live_track_count(), 1);
    }
}
