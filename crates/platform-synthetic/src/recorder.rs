//! A recorder that serialises what it observes on a stream.
//!
//! The output is an opaque byte log: the EBML magic once, then one record
//! per data item (`V`/`A`, timestamp in microseconds, payload length). It
//! only needs to be deterministic enough for lifecycle checks.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use screenrec_platform_core::{
    MediaData, MediaRecorder, MediaStream, PlatformError, PlatformResult, RecorderConfig,
    RecorderEvent, RecorderState,
};

/// Magic bytes that open every synthetic recording.
pub const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Bytes in one record.
pub const RECORD_LEN: usize = 1 + 8 + 4;

pub struct SyntheticRecorder {
    stream: MediaStream,
    config: RecorderConfig,
    state: RecorderState,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SyntheticRecorder {
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

impl MediaRecorder for SyntheticRecorder {
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

        let receivers: Vec<broadcast::Receiver<MediaData>> =
            self.stream.tracks().iter().map(|t| t.subscribe()).collect();
        let (stop_tx, stop_rx) = oneshot::channel();
        self.task = Some(tokio::spawn(run(receivers, timeslice, events, stop_rx)));
        self.stop_tx = Some(stop_tx);
        self.state = RecorderState::Recording;

        tracing::debug!(
            tracks = self.stream.tracks().len(),
            timeslice_ms = timeslice.as_millis() as u64,
            mime = %self.config.mime_type,
            "Synthetic recorder started"
        );
        Ok(())
    }

    fn stop(&mut self) -> PlatformResult<()> {
        if self.state != RecorderState::Recording {
            return Err(PlatformError::already_stopped("synthetic recorder"));
        }
        self.state = RecorderState::Stopped;
        if let Some(tx) = self.stop_tx.take() {
            // The task may already have exited with its event channel.
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

impl Drop for SyntheticRecorder {
    fn drop(&mut self) {
        // After a stop the task finishes on its own.
        if self.state == RecorderState::Recording {
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
    }
}

async fn run(
    receivers: Vec<broadcast::Receiver<MediaData>>,
    timeslice: Duration,
    events: mpsc::UnboundedSender<RecorderEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let (data_tx, mut data_rx) = mpsc::unbounded_channel();
    let forwarders: Vec<JoinHandle<()>> = receivers
        .into_iter()
        .map(|mut rx| {
            let data_tx = data_tx.clone();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(item) => {
                            if data_tx.send(item).is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        })
        .collect();
    drop(data_tx);

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + timeslice, timeslice);
    let mut buffer = Vec::new();
    let mut wrote_header = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = events.send(RecorderEvent::DataAvailable(std::mem::take(&mut buffer)));
            }
            Some(item) = data_rx.recv() => {
                if !wrote_header {
                    buffer.extend_from_slice(&EBML_MAGIC);
                    wrote_header = true;
                }
                append_record(&mut buffer, &item);
            }
            _ = &mut stop_rx => break,
        }
    }

    for forwarder in forwarders {
        forwarder.abort();
    }
    // Items already forwarded belong to the final chunk.
    while let Ok(item) = data_rx.try_recv() {
        if !wrote_header {
            buffer.extend_from_slice(&EBML_MAGIC);
            wrote_header = true;
        }
        append_record(&mut buffer, &item);
    }
    let _ = events.send(RecorderEvent::DataAvailable(buffer));
    let _ = events.send(RecorderEvent::Stopped);
    tracing::debug!("Synthetic recorder stopped");
}

fn append_record(buffer: &mut Vec<u8>, item: &MediaData) {
    let tag = match item {
        MediaData::Video(_) => b'V',
        MediaData::Audio(_) => b'A',
    };
    buffer.push(tag);
    buffer.extend_from_slice(&(item.timestamp().as_micros() as u64).to_le_bytes());
    buffer.extend_from_slice(&(item.byte_len() as u32).to_le_bytes());
}
