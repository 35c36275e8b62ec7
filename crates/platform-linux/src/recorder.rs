//! WebM recorder: VP8 video and Opus audio muxed by `webmmux`.
//!
//! Tracks are fed into `appsrc` elements; the muxed output accumulates from
//! an `appsink` and is emitted as one `DataAvailable` per timeslice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use screenrec_platform_core::{
    AudioChunk, MediaData, MediaRecorder, MediaStream, MediaTrack, PlatformError, PlatformResult,
    RecorderConfig, RecorderEvent, RecorderState, VideoFrame,
};

use crate::pipeline::{self, BusEvent};

const NAME: &str = "webm-recorder";

/// How long a stop waits for the muxer to flush.
const EOS_TIMEOUT: Duration = Duration::from_secs(10);

/// Launch string for a recorder with the given inputs. Appsrc caps are set
/// from the first buffer of each track.
pub fn recorder_launch(video: bool, audio: bool, fps: u32) -> String {
    let keyint = fps.saturating_mul(2).max(2);
    let mut launch =
        String::from("webmmux name=mux streamable=true ! appsink name=out sync=false");
    if video {
        launch.push_str(&format!(
            " appsrc name=video format=time is-live=true ! queue ! videoconvert ! videorate ! video/x-raw,framerate={fps}/1 ! vp8enc deadline=1 cpu-used=8 keyframe-max-dist={keyint} ! queue ! mux."
        ));
    }
    if audio {
        launch.push_str(
            " appsrc name=audio format=time is-live=true ! queue ! audioconvert ! audioresample ! opusenc ! queue ! mux.",
        );
    }
    launch
}

pub struct WebmRecorder {
    stream: MediaStream,
    config: RecorderConfig,
    state: RecorderState,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WebmRecorder {
    pub fn new(stream: MediaStream, config: RecorderConfig) -> Self {
        Self {
            stream,
            config,
            state: RecorderState::Inactive,
            stop_tx: None,
            task: None,
        }
    }
}

impl MediaRecorder for WebmRecorder {
    fn start(
        &mut self,
        timeslice: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> PlatformResult<()> {
        if self.state != RecorderState::Inactive {
            return Err(PlatformError::invalid_state(format!(
                "recorder cannot start from {:?}",
                self.state
            )));
        }

        let video = self.stream.first_video().cloned();
        let audio = self.stream.first_audio().cloned();
        let launch = recorder_launch(video.is_some(), audio.is_some(), self.config.video_fps);
        let pipeline = pipeline::parse_pipeline(NAME, &launch)?;

        let output = Arc::new(Mutex::new(Vec::new()));
        let out: gst_app::AppSink = pipeline::element(&pipeline, NAME, "out")?;
        let sink_output = output.clone();
        out.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    if let Some(buffer) = sample.buffer() {
                        let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                        sink_output
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .extend_from_slice(map.as_slice());
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        let mut inputs = Vec::new();
        if let Some(track) = video {
            inputs.push((track, pipeline::element::<gst_app::AppSrc>(&pipeline, NAME, "video")?));
        }
        if let Some(track) = audio {
            inputs.push((track, pipeline::element::<gst_app::AppSrc>(&pipeline, NAME, "audio")?));
        }

        let closed = Arc::new(AtomicBool::new(false));
        let (bus_tx, bus_rx) = mpsc::unbounded_channel();
        pipeline::watch_bus(NAME, &pipeline, closed.clone(), move |event| {
            let _ = bus_tx.send(event);
        })?;
        if let Err(e) = pipeline::play(NAME, &pipeline) {
            closed.store(true, Ordering::SeqCst);
            return Err(e);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let run = Run {
            pipeline,
            inputs,
            output,
            closed,
            bus_rx,
            events,
        };
        self.task = Some(tokio::spawn(run.run(timeslice, stop_rx)));
        self.stop_tx = Some(stop_tx);
        self.state = RecorderState::Recording;

        tracing::info!(
            tracks = self.stream.tracks().len(),
            timeslice_ms = timeslice.as_millis() as u64,
            mime = %self.config.mime_type,
            "WebM recorder started"
        );
        Ok(())
    }

    fn stop(&mut self) -> PlatformResult<()> {
        if self.state != RecorderState::Recording {
            return Err(PlatformError::already_stopped(NAME));
        }
        self.state = RecorderState::Stopped;
        if let Some(tx) = self.stop_tx.take() {
            // The task may have stopped itself after a pipeline error.
            let _ = tx.send(());
        }
        Ok(())
    }

    fn state(&self) -> RecorderState {
        self.state
    }

    fn mime_type(&self) -> &str {
        &self.config.mime_type
    }
}

impl Drop for WebmRecorder {
    fn drop(&mut self) {
        if self.state == RecorderState::Recording {
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
    }
}

struct Run {
    pipeline: gst::Pipeline,
    inputs: Vec<(MediaTrack, gst_app::AppSrc)>,
    output: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
    bus_rx: mpsc::UnboundedReceiver<BusEvent>,
    events: mpsc::UnboundedSender<RecorderEvent>,
}

impl Run {
    async fn run(mut self, timeslice: Duration, mut stop_rx: oneshot::Receiver<()>) {
        let started = Instant::now();
        let feeders: Vec<JoinHandle<()>> = self
            .inputs
            .iter()
            .map(|(track, src)| tokio::spawn(feed(track.subscribe(), src.clone(), started)))
            .collect();

        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + timeslice, timeslice);
        let failed = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.events.send(RecorderEvent::DataAvailable(self.take_output()));
                }
                Some(event) = self.bus_rx.recv() => {
                    tracing::error!(?event, "Recorder pipeline stopped on its own");
                    break true;
                }
                _ = &mut stop_rx => break false,
            }
        };

        for feeder in feeders {
            feeder.abort();
        }
        if !failed {
            self.drain().await;
        }
        self.closed.store(true, Ordering::SeqCst);
        pipeline::shut_down(NAME, &self.pipeline);

        let _ = self.events.send(RecorderEvent::DataAvailable(self.take_output()));
        let _ = self.events.send(RecorderEvent::Stopped);
        tracing::info!("WebM recorder stopped");
    }

    /// Send EOS into every input and wait for the muxer to finish.
    async fn drain(&mut self) {
        for (_, src) in &self.inputs {
            if let Err(e) = src.end_of_stream() {
                tracing::warn!(error = ?e, "Failed to send EOS; output may be truncated");
            }
        }
        match tokio::time::timeout(EOS_TIMEOUT, self.bus_rx.recv()).await {
            Ok(Some(BusEvent::Eos)) => tracing::debug!("Recorder drained"),
            Ok(Some(BusEvent::Error(e))) => tracing::warn!(error = %e, "Pipeline error during drain"),
            Ok(None) => {}
            Err(_) => tracing::warn!(
                timeout_s = EOS_TIMEOUT.as_secs(),
                "EOS drain timed out"
            ),
        }
    }

    fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut *self.output.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Push a track's data into its appsrc until the track closes or the
/// pipeline refuses more.
async fn feed(mut rx: broadcast::Receiver<MediaData>, src: gst_app::AppSrc, started: Instant) {
    let mut caps_set = false;
    loop {
        let item = match rx.recv().await {
            Ok(item) => item,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!(skipped = n, "Recorder input lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let (caps, bytes) = match &item {
            MediaData::Video(frame) => (video_caps(frame), frame.image.as_raw().clone()),
            MediaData::Audio(chunk) => (audio_caps(chunk), f32le_bytes(chunk)),
        };
        if !caps_set {
            src.set_caps(Some(&caps));
            caps_set = true;
        }

        let mut buffer = gst::Buffer::from_mut_slice(bytes);
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(pipeline::clock_time(started.elapsed()));
        }
        if let Err(e) = src.push_buffer(buffer) {
            tracing::debug!(error = ?e, "Recorder input closed");
            break;
        }
    }
}

fn video_caps(frame: &VideoFrame) -> gst::Caps {
    gst::Caps::builder("video/x-raw")
        .field("format", "RGBA")
        .field("width", frame.width() as i32)
        .field("height", frame.height() as i32)
        .field("framerate", gst::Fraction::new(0, 1))
        .build()
}

fn audio_caps(chunk: &AudioChunk) -> gst::Caps {
    gst::Caps::builder("audio/x-raw")
        .field("format", "F32LE")
        .field("layout", "interleaved")
        .field("rate", chunk.sample_rate as i32)
        .field("channels", chunk.channels as i32)
        .build()
}

fn f32le_bytes(chunk: &AudioChunk) -> Vec<u8> {
    chunk.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_links_each_input_into_the_muxer() {
        let both = recorder_launch(true, true, 30);
        assert!(both.contains("appsrc name=video"));
        assert!(both.contains("appsrc name=audio"));
        assert!(both.contains("keyframe-max-dist=60"));
        assert_eq!(both.matches("mux.").count(), 2);

        let audio_only = recorder_launch(false, true, 30);
        assert!(!audio_only.contains("vp8enc"));
        assert!(audio_only.contains("opusenc"));

        let empty = recorder_launch(false, false, 30);
        assert_eq!(empty, "webmmux name=mux streamable=true ! appsink name=out sync=false");
    }

    #[test]
    fn audio_bytes_are_little_endian_floats() {
        let chunk = AudioChunk::new(vec![1.0, -0.5], 48000, 2, Duration::ZERO);
        let bytes = f32le_bytes(&chunk);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(crate::sources::f32le_samples(&bytes), vec![1.0, -0.5]);
    }
}
