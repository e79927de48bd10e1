//! Player configuration for vsplay
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/vsplay/config.yaml
//!
//! The `playback` section is the engine's own [`PlaybackConfig`]; the rest
//! only concerns the headless front end.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vsplay_core::config::PlaybackConfig;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Engine tuning (sync mode, thresholds, queue caps)
    pub playback: PlaybackConfig,
    /// Audio output settings
    pub audio: AudioOutputConfig,
    /// Display settings
    pub display: DisplayConfig,
    /// Seek step for left/right (seconds)
    pub seek_step_secs: f64,
    /// Seek step for up/down (seconds)
    pub seek_long_step_secs: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            playback: PlaybackConfig::default(),
            audio: AudioOutputConfig::default(),
            display: DisplayConfig::default(),
            seek_step_secs: 10.0,
            seek_long_step_secs: 60.0,
        }
    }
}

/// Where decoded audio goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioBackend {
    /// Pull audio on a real-time schedule and discard it
    #[default]
    Headless,
    /// Play through the default CPAL output device (needs the
    /// `cpal-output` feature)
    Cpal,
}

/// Audio output section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioOutputConfig {
    pub backend: AudioBackend,
    /// Device buffer in sample frames; `None` uses the engine's
    /// `output_buffer_samples`
    pub buffer_frames: Option<u32>,
}

impl Default for AudioOutputConfig {
    fn default() -> Self {
        Self {
            backend: AudioBackend::Headless,
            buffer_frames: None,
        }
    }
}

/// Display section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Window size pictures are letterboxed into
    pub width: u32,
    pub height: u32,
    /// Log a progress line every N displayed frames (0 disables)
    pub report_every: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            report_every: 100,
        }
    }
}

/// Get the default config file path
///
/// Returns: ~/.config/vsplay/config.yaml
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("vsplay")
        .join("config.yaml")
}
