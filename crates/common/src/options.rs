//! Recording options supplied by the caller at start.

use serde::{Deserialize, Serialize};

/// Which sources a recording should attempt to capture.
///
/// An immutable snapshot: the recorder reads it once at start and never
/// writes it back. Keys serialize in camelCase so a persisted record stays
/// compatible with the settings form that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingOptions {
    /// Capture microphone audio.
    pub enable_mic: bool,
    /// Capture tab/system audio along with the display.
    pub enable_audio: bool,
    /// Capture display video.
    pub enable_screen: bool,
    /// Overlay the camera as a circular inset.
    pub enable_camera: bool,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            enable_mic: true,
            enable_audio: true,
            enable_screen: true,
            enable_camera: false,
        }
    }
}

impl RecordingOptions {
    /// Whether the display request asks for anything at all.
    pub fn requests_display(&self) -> bool {
        self.enable_screen || self.enable_audio
    }

    /// Every combination of the four flags, for exhaustive checks.
    pub fn all_combinations() -> Vec<Self> {
        (0u8..16)
            .map(|bits| Self {
                enable_mic: bits & 0b0001 != 0,
                enable_audio: bits & 0b0010 != 0,
                enable_screen: bits & 0b0100 != 0,
                enable_camera: bits & 0b1000 != 0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_keys_and_partial_records() {
        let options: RecordingOptions =
            serde_json::from_str(r#"{"enableMic":false,"enableCamera":true}"#).unwrap();
        assert!(!options.enable_mic);
        assert!(options.enable_camera);
        // Missing keys fall back to defaults.
        assert!(options.enable_screen);

        let json = serde_json::to_string(&options).unwrap();
        assert!(json.contains("\"enableAudio\":true"));
    }

    #[test]
    fn combinations_are_distinct() {
        let all = RecordingOptions::all_combinations();
        assert_eq!(all.len(), 16);
        assert_eq!(all.iter().filter(|o| !o.requests_display()).count(), 4);
    }
}
