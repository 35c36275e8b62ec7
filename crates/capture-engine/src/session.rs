//! Recording session management.
//!
//! [`ScreenRecorder::start`] builds the whole pipeline and hands back an
//! [`EndHandle`]. From then on a single controller task owns every resource
//! of the session and processes [`SessionEvent`]s one at a time, so two
//! stop triggers firing together still lead to exactly one teardown.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use screenrec_audio_mixer::{mix_sources, MixFormat, MixingGraph};
use screenrec_common::{
    RecorderError, RecorderResult, RecordingClock, RecordingDefaults, RecordingOptions,
};
use screenrec_platform_core::{
    release_quietly, release_stream, CaptureHost, MediaRecorder, MediaStream, RecorderConfig,
    RecorderEvent, WEBM_MIME_TYPE,
};
use screenrec_render_engine::{composite_video, CompositeFrameLoop, CompositorConfig};

use crate::acquire::{acquire_sources, AcquiredSources};
use crate::assemble::assemble_stream;
use crate::sink::{Notice, RecordedFile, RecordingSink};

/// State of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created but not recording yet.
    Idle,
    /// Recorder running.
    Recording,
    /// Recorder asked to stop; waiting for its last chunk.
    Stopping,
    /// Teardown finished.
    Stopped,
}

/// A discrete input to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The recorder emitted a chunk (possibly empty).
    Chunk(Vec<u8>),
    /// The recorder stopped and will emit nothing more.
    RecorderStopped,
    /// The host ended the screen share out of band.
    ScreenTrackEnded,
    /// The caller asked to end the recording.
    EndRequested,
}

impl From<RecorderEvent> for SessionEvent {
    fn from(event: RecorderEvent) -> Self {
        match event {
            RecorderEvent::DataAvailable(bytes) => SessionEvent::Chunk(bytes),
            RecorderEvent::Stopped => SessionEvent::RecorderStopped,
        }
    }
}

/// How a session ended. Every [`EndHandle::end`] call of a session sees the
/// same outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndOutcome {
    /// The recording was handed to the sink.
    Saved { filename: String, bytes: usize },
    /// No data was recorded; the user was told to try again.
    TooShort,
    /// The sink refused the recording.
    DeliveryFailed { filename: String, reason: String },
    /// The controller task died before finishing teardown.
    Interrupted,
}

impl fmt::Display for EndOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndOutcome::Saved { filename, bytes } => write!(f, "saved {filename} ({bytes} bytes)"),
            EndOutcome::TooShort => f.write_str(Notice::TooShort.message()),
            EndOutcome::DeliveryFailed { filename, reason } => {
                write!(f, "could not save {filename}: {reason}")
            }
            EndOutcome::Interrupted => f.write_str("recording interrupted"),
        }
    }
}

/// What made the session end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndTrigger {
    Caller,
    ScreenShareEnded,
    RecorderStoppedItself,
    HandlesDropped,
}

/// Starts recordings against a capture host.
///
/// At most one session is active at a time; a start while another session
/// is still tearing down fails with [`RecorderError::AlreadyRecording`].
pub struct ScreenRecorder {
    host: Arc<dyn CaptureHost>,
    sink: Arc<dyn RecordingSink>,
    defaults: RecordingDefaults,
    active: Arc<AtomicBool>,
}

impl ScreenRecorder {
    pub fn new(
        host: Arc<dyn CaptureHost>,
        sink: Arc<dyn RecordingSink>,
        defaults: RecordingDefaults,
    ) -> Self {
        Self {
            host,
            sink,
            defaults,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a session is running or tearing down.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Acquire sources, build the pipeline, and start recording.
    ///
    /// Fails only when the display cannot be captured (or the host cannot
    /// create a recorder), in which case nothing stays allocated.
    pub async fn start(&self, options: RecordingOptions) -> RecorderResult<EndHandle> {
        let gate = ActiveGate::acquire(&self.active)?;
        tracing::info!(?options, host = self.host.name(), "Starting recording session");

        let sources = acquire_sources(self.host.as_ref(), &options, &self.defaults).await?;

        let format = MixFormat {
            sample_rate: self.defaults.audio_sample_rate,
            channels: self.defaults.audio_channels,
        };
        let (mixed_track, mixer) = match mix_sources(&sources.audio_sources(), format) {
            Some(output) => (Some(output.track), Some(output.graph)),
            None => (None, None),
        };

        // From here on, dropping `resources` (including by cancelling this
        // future) releases whatever has been built so far.
        let mut resources = SessionResources {
            recorder: None,
            output: MediaStream::default(),
            sources,
            mixer,
            frame_loop: None,
            released: false,
        };

        let compositor = composite_video(
            resources.sources.screen_video(),
            resources.sources.camera_video(),
            &CompositorConfig::from_defaults(&self.defaults),
        )
        .await;
        tracing::info!(mode = ?compositor.mode, "Video compositor ready");
        resources.frame_loop = compositor.frame_loop;

        let output = assemble_stream(compositor.track, mixed_track);
        resources.output = output.clone();

        let config = RecorderConfig {
            mime_type: WEBM_MIME_TYPE.to_string(),
            video_fps: self.defaults.capture_fps,
        };
        let (recorder_tx, recorder_rx) = mpsc::unbounded_channel();
        let recorder = self
            .host
            .create_recorder(&output, &config)
            .and_then(|mut recorder| {
                recorder.start(self.defaults.chunk_interval(), recorder_tx)?;
                Ok(recorder)
            });
        match recorder {
            Ok(recorder) => resources.recorder = Some(recorder),
            Err(e) => {
                tracing::error!(error = %e, "Recorder could not start; releasing sources");
                resources.release();
                return Err(RecorderError::from(e));
            }
        }

        let binding = bind_stop_trigger(&resources.sources.screen);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Recording);
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let controller = Controller {
            resources,
            sink: Arc::clone(&self.sink),
            recorder_rx,
            control_rx,
            binding,
            waiting_for_recorder: false,
            chunks: Vec::new(),
            state: state_tx,
            clock: RecordingClock::start(),
        };
        tokio::spawn(async move {
            let outcome = controller.run().await;
            // Let the next session start before anyone learns this one ended.
            drop(gate);
            outcome_tx.send_replace(Some(outcome));
        });

        tracing::info!(
            tracks = output.tracks().len(),
            chunk_interval_ms = self.defaults.chunk_interval_ms,
            "Recording started"
        );
        Ok(EndHandle {
            control: control_tx,
            state: state_rx,
            outcome: outcome_rx,
            stream: output,
        })
    }
}

/// Held for the lifetime of one session.
struct ActiveGate(Arc<AtomicBool>);

impl ActiveGate {
    fn acquire(flag: &Arc<AtomicBool>) -> RecorderResult<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| RecorderError::AlreadyRecording)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for ActiveGate {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Caller-side handle of a running session.
///
/// Clones refer to the same session.
#[derive(Debug, Clone)]
pub struct EndHandle {
    control: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Receiver<SessionState>,
    outcome: watch::Receiver<Option<EndOutcome>>,
    stream: MediaStream,
}

impl EndHandle {
    /// Stop recording, tear everything down, and deliver the result.
    ///
    /// Safe to call any number of times, concurrently, or after the host
    /// already ended the session: teardown and delivery happen once and
    /// every call returns the same outcome.
    pub async fn end(&self) -> EndOutcome {
        // Fails only when the controller already finished.
        let _ = self.control.send(SessionEvent::EndRequested);
        self.finished().await
    }

    /// Wait for the session to finish, whichever trigger ends it.
    pub async fn finished(&self) -> EndOutcome {
        let mut rx = self.outcome.clone();
        let stored = match rx.wait_for(|o| o.is_some()).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        stored.unwrap_or(EndOutcome::Interrupted)
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// The assembled stream being recorded.
    pub fn output_stream(&self) -> &MediaStream {
        &self.stream
    }
}

/// Everything a session must release exactly once.
struct SessionResources {
    recorder: Option<Box<dyn MediaRecorder>>,
    output: MediaStream,
    sources: AcquiredSources,
    mixer: Option<MixingGraph>,
    frame_loop: Option<CompositeFrameLoop>,
    released: bool,
}

impl SessionResources {
    /// Stop the recorder. Returns whether a `Stopped` event will follow.
    fn stop_recorder(&mut self) -> bool {
        match self.recorder.as_mut() {
            Some(recorder) => release_quietly(recorder),
            None => false,
        }
    }

    /// Release everything after the recorder, in teardown order.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let output = release_stream(&self.output);
        let sources = self.sources.release_all();
        tracing::debug!(output, sources, "Tracks stopped");

        if let Some(mixer) = self.mixer.as_mut() {
            release_quietly(mixer);
        }
        if let Some(frame_loop) = self.frame_loop.as_mut() {
            release_quietly(frame_loop);
        }
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!("Session abandoned before teardown; releasing its resources");
            self.stop_recorder();
            self.release();
        }
    }
}

type StopBinding = JoinSet<bool>;

/// Watch every display track for its source ending.
fn bind_stop_trigger(screen: &MediaStream) -> Option<StopBinding> {
    if screen.is_empty() {
        return None;
    }
    let mut watchers = JoinSet::new();
    for track in screen.tracks() {
        let track = track.clone();
        watchers.spawn(async move { track.wait_ended().await });
    }
    Some(watchers)
}

/// Resolves with the next display track that left `Live`: `Some(true)` if
/// its source ended, `Some(false)` if it was stopped locally, `None` when
/// no watcher is left.
async fn next_track_end(binding: &mut Option<StopBinding>) -> Option<bool> {
    match binding {
        Some(watchers) => watchers
            .join_next()
            .await
            .map(|joined| joined.unwrap_or(false)),
        None => std::future::pending().await,
    }
}

/// Why the controller loop woke up.
enum Wake {
    Event(SessionEvent),
    /// Every [`EndHandle`] was dropped.
    HandlesDropped,
    /// A display track was stopped locally; not a trigger.
    TrackStopped,
    /// All display watchers finished.
    BindingIdle,
}

struct Controller {
    resources: SessionResources,
    sink: Arc<dyn RecordingSink>,
    recorder_rx: mpsc::UnboundedReceiver<RecorderEvent>,
    control_rx: mpsc::UnboundedReceiver<SessionEvent>,
    binding: Option<StopBinding>,
    waiting_for_recorder: bool,
    chunks: Vec<Vec<u8>>,
    state: watch::Sender<SessionState>,
    clock: RecordingClock,
}

impl Controller {
    async fn run(mut self) -> EndOutcome {
        let mut recorder_open = true;
        let mut control_open = true;

        loop {
            let wake = tokio::select! {
                biased;
                event = self.recorder_rx.recv(), if recorder_open => match event {
                    Some(event) => Wake::Event(event.into()),
                    None => {
                        recorder_open = false;
                        Wake::Event(SessionEvent::RecorderStopped)
                    }
                },
                event = self.control_rx.recv(), if control_open => match event {
                    Some(event) => Wake::Event(event),
                    None => {
                        control_open = false;
                        Wake::HandlesDropped
                    }
                },
                ended = next_track_end(&mut self.binding), if self.binding.is_some() => match ended {
                    Some(true) => Wake::Event(SessionEvent::ScreenTrackEnded),
                    Some(false) => Wake::TrackStopped,
                    None => Wake::BindingIdle,
                },
                else => break,
            };

            match wake {
                Wake::Event(SessionEvent::Chunk(bytes)) => self.append(bytes),
                Wake::Event(SessionEvent::EndRequested) => self.trigger(EndTrigger::Caller),
                Wake::Event(SessionEvent::ScreenTrackEnded) => {
                    self.trigger(EndTrigger::ScreenShareEnded)
                }
                Wake::Event(SessionEvent::RecorderStopped) => {
                    if self.current_state() == SessionState::Recording {
                        self.trigger(EndTrigger::RecorderStoppedItself);
                    }
                    self.waiting_for_recorder = false;
                }
                Wake::HandlesDropped => {
                    tracing::warn!("Every end handle was dropped; ending the recording");
                    self.trigger(EndTrigger::HandlesDropped);
                }
                Wake::TrackStopped => {}
                Wake::BindingIdle => self.binding = None,
            }

            if self.current_state() == SessionState::Stopping && !self.waiting_for_recorder {
                break;
            }
        }

        self.finish().await
    }

    fn current_state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    fn append(&mut self, bytes: Vec<u8>) {
        if bytes.is_empty() {
            tracing::trace!("Skipping empty chunk");
            return;
        }
        tracing::debug!(bytes = bytes.len(), index = self.chunks.len(), "Chunk recorded");
        self.chunks.push(bytes);
    }

    /// Begin ending the session. Only the first trigger has any effect.
    fn trigger(&mut self, trigger: EndTrigger) {
        if self.current_state() != SessionState::Recording {
            tracing::debug!(?trigger, "Session already ending");
            return;
        }
        // Clear the stop binding first so no other trigger can re-enter.
        self.binding = None;
        tracing::info!(
            ?trigger,
            elapsed_secs = self.clock.elapsed_secs(),
            chunks = self.chunks.len(),
            "Ending recording"
        );
        self.set_state(SessionState::Stopping);
        self.waiting_for_recorder = match trigger {
            EndTrigger::RecorderStoppedItself => false,
            _ => self.resources.stop_recorder(),
        };
    }

    async fn finish(mut self) -> EndOutcome {
        if self.current_state() == SessionState::Recording {
            self.trigger(EndTrigger::HandlesDropped);
        }
        self.binding = None;

        // Chunks already emitted still belong to the recording.
        while let Ok(event) = self.recorder_rx.try_recv() {
            if let RecorderEvent::DataAvailable(bytes) = event {
                self.append(bytes);
            }
        }

        self.resources.release();

        let outcome = if self.chunks.is_empty() {
            tracing::warn!("No data recorded");
            self.sink.notice(Notice::TooShort).await;
            EndOutcome::TooShort
        } else {
            let file = RecordedFile::from_chunks(std::mem::take(&mut self.chunks));
            let filename = file.filename.clone();
            let bytes = file.bytes.len();
            match self.sink.deliver(file).await {
                Ok(()) => EndOutcome::Saved { filename, bytes },
                Err(e) => {
                    tracing::error!(error = %e, %filename, "Delivery failed");
                    EndOutcome::DeliveryFailed {
                        filename,
                        reason: e.to_string(),
                    }
                }
            }
        };

        self.set_state(SessionState::Stopped);
        tracing::info!(
            %outcome,
            duration_secs = self.clock.elapsed_secs(),
            "Recording session finished"
        );
        outcome
    }
}
