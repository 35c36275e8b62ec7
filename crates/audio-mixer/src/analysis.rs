//! Level measurements over interleaved or mono sample buffers.

/// Highest absolute sample value.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Root mean square level.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Estimated amplitude of a single frequency in a mono buffer, using the
/// Goertzel algorithm. A full-scale sine at `freq` measures about 1.0.
pub fn tone_level(samples: &[f32], sample_rate: u32, freq: f32) -> f32 {
    if samples.is_empty() || sample_rate == 0 {
        return 0.0;
    }
    let omega = 2.0 * std::f64::consts::PI * freq as f64 / sample_rate as f64;
    let coeff = 2.0 * omega.cos();

    let (mut s1, mut s2) = (0.0f64, 0.0f64);
    for sample in samples {
        let s0 = *sample as f64 + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }
    let power = s1 * s1 + s2 * s2 - coeff * s1 * s2;
    (2.0 * power.max(0.0).sqrt() / samples.len() as f64) as f32
}

/// Take one channel out of an interleaved buffer.
pub fn channel(samples: &[f32], channels: u16, index: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    let index = (index as usize).min(channels - 1);
    samples
        .chunks_exact(channels)
        .map(|frame| frame[index])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, amplitude: f32, rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn silence_measures_zero() {
        let silence = vec![0.0; 480];
        assert_eq!(peak(&silence), 0.0);
        assert_eq!(rms(&silence), 0.0);
        assert_eq!(tone_level(&silence, 48000, 440.0), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn sine_levels() {
        let tone = sine(1000.0, 0.5, 48000, 4800);
        assert!((peak(&tone) - 0.5).abs() < 1e-3);
        assert!((rms(&tone) - 0.5 / 2f32.sqrt()).abs() < 1e-3);
        assert!((tone_level(&tone, 48000, 1000.0) - 0.5).abs() < 0.02);
        assert!(tone_level(&tone, 48000, 3000.0) < 0.01);
    }

    #[test]
    fn extracts_channel() {
        assert_eq!(channel(&[1.0, 2.0, 3.0, 4.0], 2, 1), vec![2.0, 4.0]);
        assert_eq!(channel(&[1.0, 2.0], 1, 5), vec![1.0, 2.0]);
    }
}
