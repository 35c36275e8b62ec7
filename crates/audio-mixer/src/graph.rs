//! The per-session mixing graph.
//!
//! One tokio task per recording drains every connected source track, feeds
//! the [`MixBus`], and publishes the mixed quantum on a destination track.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use screenrec_common::RecordingClock;
use screenrec_platform_core::{
    AudioChunk, MediaData, MediaTrack, PlatformError, PlatformResult, Release, TrackFeed,
    TrackKind,
};

use crate::bus::{MixBus, MixFormat};

/// Label of the destination track.
pub const MIXED_TRACK_LABEL: &str = "mixed-audio";

/// Length of one render quantum.
pub const RENDER_QUANTUM: Duration = Duration::from_millis(10);

/// What [`mix_sources`] hands back: the single mixed track and the graph
/// that must be closed at teardown.
#[derive(Debug)]
pub struct MixerOutput {
    pub track: MediaTrack,
    pub graph: MixingGraph,
}

#[derive(Debug, Default)]
struct GraphStats {
    /// Peak absolute output sample, stored as `f32` bits. Non-negative
    /// floats order the same as their bit patterns.
    peak_bits: AtomicU32,
    quanta: AtomicU64,
}

impl GraphStats {
    fn record_peak(&self, peak: f32) {
        self.peak_bits.fetch_max(peak.to_bits(), Ordering::Relaxed);
    }

    fn peak(&self) -> f32 {
        f32::from_bits(self.peak_bits.load(Ordering::Relaxed))
    }
}

/// An audio processing context with connected sources and one destination.
#[derive(Debug)]
pub struct MixingGraph {
    format: MixFormat,
    source_labels: Vec<String>,
    output: TrackFeed,
    stop: Arc<AtomicBool>,
    stats: Arc<GraphStats>,
    task: Option<JoinHandle<()>>,
}

/// Connect every source to one new graph and read back the mixed track.
///
/// Returns `None` without creating a graph when there are no sources. Must
/// be called from within a tokio runtime.
pub fn mix_sources(sources: &[MediaTrack], format: MixFormat) -> Option<MixerOutput> {
    let sources: Vec<&MediaTrack> = sources
        .iter()
        .filter(|t| t.kind() == TrackKind::Audio)
        .collect();
    if sources.is_empty() {
        tracing::debug!("No audio sources; mixing graph not created");
        return None;
    }

    let mut bus = MixBus::new(format);
    let format = bus.format();
    // Subscribe before the task starts so no chunk pushed after this call
    // is missed.
    let inputs: Vec<(usize, broadcast::Receiver<MediaData>)> = sources
        .iter()
        .map(|track| (bus.add_input(track.label()), track.subscribe()))
        .collect();

    let (track, feed) = MediaTrack::new(TrackKind::Audio, MIXED_TRACK_LABEL);
    feed.update_settings(|s| {
        s.sample_rate = Some(format.sample_rate);
        s.channels = Some(format.channels);
    });

    let stop = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(GraphStats::default());
    let task = tokio::spawn(render_loop(
        bus,
        inputs,
        feed.clone(),
        Arc::clone(&stop),
        Arc::clone(&stats),
    ));

    let source_labels: Vec<String> = sources.iter().map(|t| t.label().to_string()).collect();
    tracing::info!(
        sources = ?source_labels,
        sample_rate = format.sample_rate,
        channels = format.channels,
        "Mixing graph started"
    );

    Some(MixerOutput {
        track,
        graph: MixingGraph {
            format,
            source_labels,
            output: feed,
            stop,
            stats,
            task: Some(task),
        },
    })
}

async fn render_loop(
    mut bus: MixBus,
    mut inputs: Vec<(usize, broadcast::Receiver<MediaData>)>,
    output: TrackFeed,
    stop: Arc<AtomicBool>,
    stats: Arc<GraphStats>,
) {
    let clock = RecordingClock::start();
    let frames = bus.format().frames_per(RENDER_QUANTUM.as_millis() as u64);
    let mut ticker = tokio::time::interval(RENDER_QUANTUM);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    while !stop.load(Ordering::Acquire) {
        ticker.tick().await;

        for (index, rx) in &mut inputs {
            loop {
                match rx.try_recv() {
                    Ok(MediaData::Audio(chunk)) => bus.push(*index, &chunk),
                    Ok(MediaData::Video(_)) => {}
                    Err(TryRecvError::Lagged(skipped)) => {
                        tracing::warn!(input = *index, skipped, "Mixer input lagged");
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
        }

        let mixed = bus.render(frames);
        let peak = mixed.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        stats.record_peak(peak);
        stats.quanta.fetch_add(1, Ordering::Relaxed);

        let format = bus.format();
        let chunk = AudioChunk::new(mixed, format.sample_rate, format.channels, clock.elapsed());
        if !output.push_audio(chunk) {
            tracing::debug!("Mixed track no longer live; render loop exiting");
            break;
        }
    }
}

impl MixingGraph {
    pub fn format(&self) -> MixFormat {
        self.format
    }

    /// Labels of the connected sources, in connection order.
    pub fn source_labels(&self) -> &[String] {
        &self.source_labels
    }

    /// Highest absolute output sample rendered so far.
    pub fn peak_level(&self) -> f32 {
        self.stats.peak()
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    /// Stop rendering and end the destination track.
    ///
    /// Fails with `AlreadyStopped` on every call after the first.
    pub fn close(&mut self) -> PlatformResult<()> {
        let Some(task) = self.task.take() else {
            return Err(PlatformError::already_stopped("mixing graph"));
        };
        self.stop.store(true, Ordering::Release);
        task.abort();
        self.output.end();
        tracing::info!(
            peak = self.stats.peak(),
            quanta = self.stats.quanta.load(Ordering::Relaxed),
            "Mixing graph closed"
        );
        Ok(())
    }
}

impl Release for MixingGraph {
    fn resource_name(&self) -> String {
        format!("mixing graph ({} sources)", self.source_labels.len())
    }

    fn release(&mut self) -> PlatformResult<()> {
        self.close()
    }
}

impl Drop for MixingGraph {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            tracing::debug!("Mixing graph dropped without close");
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tone_level;
    use screenrec_platform_core::release_quietly;

    fn sine(freq: f32, rate: u32, frames: usize, offset: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| {
                let t = (offset + i) as f32 / rate as f32;
                0.3 * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    #[tokio::test]
    async fn no_sources_creates_no_graph() {
        assert!(mix_sources(&[], MixFormat::default()).is_none());

        let (video, _feed) = MediaTrack::new(TrackKind::Video, "screen");
        assert!(mix_sources(&[video], MixFormat::default()).is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_ends_output() {
        let (mic, _feed) = MediaTrack::new(TrackKind::Audio, "mic");
        let MixerOutput { track, mut graph } =
            mix_sources(&[mic], MixFormat::default()).unwrap();

        assert_eq!(track.label(), MIXED_TRACK_LABEL);
        assert_eq!(track.settings().sample_rate, Some(48000));
        assert!(graph.close().is_ok());
        assert!(graph.close().unwrap_err().is_already_stopped());
        assert!(!release_quietly(&mut graph));
        assert!(track.wait_ended().await);
    }

    #[tokio::test]
    async fn output_contains_both_sources() {
        let format = MixFormat {
            sample_rate: 16000,
            channels: 1,
        };
        let (tab, tab_feed) = MediaTrack::new(TrackKind::Audio, "tab");
        let (mic, mic_feed) = MediaTrack::new(TrackKind::Audio, "mic");
        let MixerOutput { track, mut graph } = mix_sources(&[tab, mic], format).unwrap();
        let mut rx = track.subscribe();

        // 20 ms blocks of two distinct tones, pushed faster than real time
        // is fine: the queue keeps up to half a second.
        let block = 320;
        for n in 0..10 {
            tab_feed.push_audio(AudioChunk::new(
                sine(440.0, 16000, block, n * block),
                16000,
                1,
                Duration::ZERO,
            ));
            mic_feed.push_audio(AudioChunk::new(
                sine(1000.0, 16000, block, n * block),
                16000,
                1,
                Duration::ZERO,
            ));
        }

        let mut collected = Vec::new();
        while collected.len() < 3200 {
            match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Ok(MediaData::Audio(chunk))) => collected.extend_from_slice(&chunk.samples),
                Ok(Ok(MediaData::Video(_))) => {}
                Ok(Err(_)) | Err(_) => break,
            }
        }
        graph.close().unwrap();

        assert!(collected.len() >= 1600, "only {} samples", collected.len());
        let low = tone_level(&collected, 16000, 440.0);
        let high = tone_level(&collected, 16000, 1000.0);
        let absent = tone_level(&collected, 16000, 2500.0);
        assert!(low > 0.05, "440 Hz level {low}");
        assert!(high > 0.05, "1000 Hz level {high}");
        assert!(absent < low / 4.0 && absent < high / 4.0);
        assert!(graph.peak_level() > 0.3);
    }
}
