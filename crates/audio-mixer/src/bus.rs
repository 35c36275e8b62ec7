//! Synchronous summing bus.
//!
//! Each input keeps a queue of samples already converted to the bus format.
//! [`MixBus::render`] drains up to one quantum from every queue, sums them,
//! and soft-clips the result. Inputs that have fallen behind contribute
//! silence for the missing part.

use std::collections::VecDeque;

use screenrec_platform_core::AudioChunk;

/// Sample format of a mixing bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for MixFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

impl MixFormat {
    /// Frames in a render quantum of `millis` milliseconds.
    pub fn frames_per(&self, millis: u64) -> usize {
        (self.sample_rate as u64 * millis / 1000).max(1) as usize
    }
}

/// Streaming linear-interpolation resampler for interleaved audio.
///
/// Carries the last input frame and the fractional read position across
/// calls so consecutive chunks join without gaps.
#[derive(Debug)]
struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    channels: usize,
    position: f64,
    last_frame: Option<Vec<f32>>,
}

impl LinearResampler {
    fn new(from_rate: u32, to_rate: u32, channels: usize) -> Self {
        Self {
            from_rate,
            to_rate,
            channels,
            position: 0.0,
            last_frame: None,
        }
    }

    fn process(&mut self, input: &[f32], out: &mut VecDeque<f32>) {
        let ch = self.channels;
        if ch == 0 || input.is_empty() {
            return;
        }
        if self.from_rate == self.to_rate {
            out.extend(input.iter().copied());
            return;
        }

        let mut buf = Vec::with_capacity(input.len() + ch);
        if let Some(last) = self.last_frame.take() {
            buf.extend_from_slice(&last);
        }
        buf.extend_from_slice(input);
        let frames = buf.len() / ch;
        let step = self.from_rate as f64 / self.to_rate as f64;

        let mut t = self.position;
        while t + 1.0 < frames as f64 {
            let i = t.floor() as usize;
            let frac = (t - i as f64) as f32;
            for c in 0..ch {
                let a = buf[i * ch + c];
                let b = buf[(i + 1) * ch + c];
                out.push_back(a + (b - a) * frac);
            }
            t += step;
        }

        // The last frame becomes index 0 of the next call.
        self.position = t - (frames - 1) as f64;
        self.last_frame = Some(buf[(frames - 1) * ch..frames * ch].to_vec());
    }
}

#[derive(Debug)]
struct BusInput {
    label: String,
    queue: VecDeque<f32>,
    resampler: Option<LinearResampler>,
    dropped_frames: u64,
}

/// Sums inputs of arbitrary format into one interleaved output.
#[derive(Debug)]
pub struct MixBus {
    format: MixFormat,
    inputs: Vec<BusInput>,
    max_queued_frames: usize,
}

impl MixBus {
    /// Create a bus. Input queues hold at most half a second of audio.
    pub fn new(format: MixFormat) -> Self {
        let format = MixFormat {
            sample_rate: format.sample_rate.max(1),
            channels: format.channels.max(1),
        };
        Self {
            format,
            inputs: Vec::new(),
            max_queued_frames: (format.sample_rate / 2).max(1) as usize,
        }
    }

    pub fn format(&self) -> MixFormat {
        self.format
    }

    /// Add an input and return its index.
    pub fn add_input(&mut self, label: impl Into<String>) -> usize {
        self.inputs.push(BusInput {
            label: label.into(),
            queue: VecDeque::new(),
            resampler: None,
            dropped_frames: 0,
        });
        self.inputs.len() - 1
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Frames waiting in an input's queue.
    pub fn queued_frames(&self, input: usize) -> usize {
        self.inputs
            .get(input)
            .map(|i| i.queue.len() / self.format.channels as usize)
            .unwrap_or(0)
    }

    /// Frames dropped from an input because its queue overflowed.
    pub fn dropped_frames(&self, input: usize) -> u64 {
        self.inputs.get(input).map(|i| i.dropped_frames).unwrap_or(0)
    }

    /// Convert a chunk to the bus format and queue it on `input`.
    pub fn push(&mut self, input: usize, chunk: &AudioChunk) {
        let format = self.format;
        let max_samples = self.max_queued_frames * format.channels as usize;
        let Some(slot) = self.inputs.get_mut(input) else {
            tracing::warn!(input, "Audio pushed to unknown mixer input");
            return;
        };

        let converted = convert_channels(&chunk.samples, chunk.channels, format.channels);

        let needs_new = match &slot.resampler {
            Some(r) => r.from_rate != chunk.sample_rate,
            None => true,
        };
        if needs_new {
            if slot.resampler.is_some() {
                tracing::debug!(
                    input = %slot.label,
                    from = chunk.sample_rate,
                    to = format.sample_rate,
                    "Source sample rate changed; resetting resampler"
                );
            }
            slot.resampler = Some(LinearResampler::new(
                chunk.sample_rate.max(1),
                format.sample_rate,
                format.channels as usize,
            ));
        }
        if let Some(resampler) = slot.resampler.as_mut() {
            resampler.process(&converted, &mut slot.queue);
        }

        if slot.queue.len() > max_samples {
            let excess = slot.queue.len() - max_samples;
            slot.queue.drain(..excess);
            slot.dropped_frames += (excess / format.channels as usize) as u64;
        }
    }

    /// Mix up to `frames` frames from every input.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let total = frames * self.format.channels as usize;
        let mut output = vec![0.0f32; total];

        for input in &mut self.inputs {
            let available = input.queue.len().min(total);
            for (out, sample) in output.iter_mut().zip(input.queue.drain(..available)) {
                *out += sample;
            }
        }

        for sample in &mut output {
            *sample = soft_clip(*sample);
        }
        output
    }
}

/// Map interleaved samples between channel layouts: down-mix to mono by
/// averaging, up-mix mono by duplication, otherwise reuse the nearest
/// source channel.
fn convert_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    let from = from.max(1) as usize;
    let to = to.max(1) as usize;
    if from == to {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for c in 0..to {
                out.push(frame[c.min(from - 1)]);
            }
        }
    }
    out
}

/// Level above which [`soft_clip`] starts compressing.
const CLIP_KNEE: f32 = 0.9;

/// Pass samples below the knee through unchanged and bend anything louder
/// smoothly towards full scale. The output never exceeds ±1.0.
pub fn soft_clip(x: f32) -> f32 {
    let level = x.abs();
    if level <= CLIP_KNEE {
        x
    } else {
        let headroom = 1.0 - CLIP_KNEE;
        x.signum() * (CLIP_KNEE + headroom * ((level - CLIP_KNEE) / headroom).tanh())
    }
}
