//! Synthetic test pattern generation

use image::{Rgba, RgbaImage};

/// Colour of every camera pixel.
pub const CAMERA_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Blue channel of every screen pixel. Never zero, so screen pixels can be
/// told apart from the camera.
pub const SCREEN_BLUE: u8 = 200;

/// Tone carried by the tab/system audio source.
pub const TAB_TONE_HZ: f32 = 440.0;

/// Tone carried by the microphone source.
pub const MIC_TONE_HZ: f32 = 1000.0;

/// Amplitude of both tones.
pub const TONE_AMPLITUDE: f32 = 0.3;

/// Screen pattern whose red and green channels encode the pixel position,
/// with a moving marker column so consecutive frames differ.
pub fn screen_pattern(width: u32, height: u32, frame_index: u64) -> RgbaImage {
    let marker = if width == 0 {
        0
    } else {
        (frame_index % width as u64) as u32
    };
    RgbaImage::from_fn(width, height, |x, y| {
        if x == marker {
            Rgba([255, 255, SCREEN_BLUE, 255])
        } else {
            Rgba([(x % 256) as u8, (y % 256) as u8, SCREEN_BLUE, 255])
        }
    })
}

/// Solid camera frame.
pub fn camera_pattern(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, CAMERA_COLOR)
}

/// `frames` frames of a sine tone starting at `start_frame`, interleaved
/// over `channels` identical channels.
pub fn tone(
    freq: f32,
    sample_rate: u32,
    channels: u16,
    start_frame: u64,
    frames: usize,
) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    let mut out = Vec::with_capacity(frames * channels);
    for i in 0..frames as u64 {
        let t = (start_frame + i) as f64 / sample_rate.max(1) as f64;
        let value = TONE_AMPLITUDE * (2.0 * std::f64::consts::PI * freq as f64 * t).sin() as f32;
        out.extend(std::iter::repeat(value).take(channels));
    }
    out
}
