//! Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::options::RecordingOptions;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory finished recordings are saved into.
    pub output_dir: PathBuf,

    /// Recording pipeline parameters.
    pub recording: RecordingDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Recording pipeline parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    /// Interval between recorder data emissions, in milliseconds.
    pub chunk_interval_ms: u64,

    /// Frame rate the composite surface is captured at.
    pub capture_fps: u32,

    /// Rate of the per-frame render callback.
    pub render_rate_hz: u32,

    /// Mixing graph sample rate.
    pub audio_sample_rate: u32,

    /// Mixing graph channel count.
    pub audio_channels: u16,

    /// Requested camera resolution.
    pub camera_width: u32,
    pub camera_height: u32,

    /// Surface size used when the screen track reports no resolution.
    pub fallback_width: u32,
    pub fallback_height: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "screenrec=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            recording: RecordingDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            chunk_interval_ms: 5000,
            capture_fps: 30,
            render_rate_hz: 60,
            audio_sample_rate: 48000,
            audio_channels: 2,
            camera_width: 320,
            camera_height: 240,
            fallback_width: 1920,
            fallback_height: 1080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl RecordingDefaults {
    /// Chunk emission interval as a duration (never zero).
    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms.max(1))
    }
}

impl AppConfig {
    /// Load `config.json` from the config directory. A missing or broken
    /// file yields the defaults.
    pub fn load() -> Self {
        read_json(&config_file_path()).unwrap_or_default()
    }

    pub fn save(&self) -> Result<(), std::io::Error> {
        write_json(&config_file_path(), self)
    }
}

/// Last-used recording options, persisted by the user-facing layer.
pub fn load_last_options() -> Option<RecordingOptions> {
    read_json(&options_file_path())
}

/// Persist the options so the next session starts from them.
pub fn save_last_options(options: &RecordingOptions) -> Result<(), std::io::Error> {
    write_json(&options_file_path(), options)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read settings file");
            return None;
        }
    };
    serde_json::from_str(&content)
        .map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed settings file");
        })
        .ok()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

fn config_dir() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    base.join("screenrec")
}

fn config_file_path() -> PathBuf {
    config_dir().join("config.json")
}

fn options_file_path() -> PathBuf {
    config_dir().join("options.json")
}

/// Default directory for saved recordings.
fn default_output_dir() -> PathBuf {
    std::env::var("XDG_DOWNLOAD_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join("Downloads"))
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}
