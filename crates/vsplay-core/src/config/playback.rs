//! Playback engine tuning
//!
//! Defaults give a 2-frame picture queue, a 10 ms minimum re-arm and
//! 20-observation drift averaging with a ±10% correction window. Drift
//! beyond 10 s is left alone.

use crate::sync::SyncMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for one playback session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub sync: SyncConfig,
    pub queues: QueueConfig,
    pub demux: DemuxConfig,
    pub audio: AudioRenderConfig,
}

/// Clock selection and pacing thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Which clock the other streams follow
    pub mode: SyncMode,
    /// Lower bound for the per-frame sync threshold (seconds)
    pub min_sync_threshold: f64,
    /// Drift beyond this is not corrected (seconds)
    pub no_sync_threshold: f64,
    /// Number of observations the drift average spans
    pub diff_avg_window: u32,
    /// Largest change to an audio block, in percent of its size
    pub max_correction_percent: u32,
    /// Floor for the refresh timer re-arm
    pub min_refresh_delay_ms: u64,
    /// Re-arm delay when the picture queue is empty
    pub empty_queue_retry_ms: u64,
    /// Refresh period for sessions without video
    pub idle_refresh_ms: u64,
    /// Delay before the first refresh fires
    pub initial_refresh_ms: u64,
    /// Frame delay assumed before two frames have been seen (seconds)
    pub initial_frame_delay: f64,
    /// Frame-to-frame pts deltas at or above this are treated as bogus (seconds)
    pub max_frame_delay: f64,
    /// Consecutive frames beyond the no-sync threshold before the frame
    /// timer is pulled back to the wall clock (0 disables)
    pub resync_after_frames: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            min_sync_threshold: 0.01,
            no_sync_threshold: 10.0,
            diff_avg_window: 20,
            max_correction_percent: 10,
            min_refresh_delay_ms: 10,
            empty_queue_retry_ms: 1,
            idle_refresh_ms: 100,
            initial_refresh_ms: 40,
            initial_frame_delay: 0.040,
            max_frame_delay: 1.0,
            resync_after_frames: 10,
        }
    }
}

impl SyncConfig {
    pub fn min_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.min_refresh_delay_ms)
    }

    pub fn empty_queue_retry(&self) -> Duration {
        Duration::from_millis(self.empty_queue_retry_ms)
    }

    pub fn idle_refresh(&self) -> Duration {
        Duration::from_millis(self.idle_refresh_ms)
    }

    pub fn initial_refresh(&self) -> Duration {
        Duration::from_millis(self.initial_refresh_ms)
    }
}

/// Queue capacities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Demuxing pauses while the audio packet queue holds more than this
    pub max_audio_queue_bytes: usize,
    /// Demuxing pauses while the video packet queue holds more than this
    pub max_video_queue_bytes: usize,
    /// Decoded pictures buffered ahead of display
    pub picture_queue_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_audio_queue_bytes: 20 * 16 * 1024,
            max_video_queue_bytes: 15 * 1024 * 1024,
            picture_queue_capacity: 2,
        }
    }
}

/// Demux thread polling behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxConfig {
    /// Sleep while a packet queue is over its cap
    pub backpressure_sleep_ms: u64,
    /// Sleep before re-reading after end of stream
    pub eof_retry_ms: u64,
    /// Poll interval while parked waiting for shutdown
    pub park_interval_ms: u64,
    /// Stop the session once the source ends and all queues drain,
    /// instead of waiting for the source to grow
    pub exit_on_eof: bool,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            backpressure_sleep_ms: 10,
            eof_retry_ms: 100,
            park_interval_ms: 100,
            exit_on_eof: false,
        }
    }
}

impl DemuxConfig {
    pub fn backpressure_sleep(&self) -> Duration {
        Duration::from_millis(self.backpressure_sleep_ms)
    }

    pub fn eof_retry(&self) -> Duration {
        Duration::from_millis(self.eof_retry_ms)
    }

    pub fn park_interval(&self) -> Duration {
        Duration::from_millis(self.park_interval_ms)
    }
}

/// Audio pull path settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioRenderConfig {
    /// Sample frames the output device requests per callback; the drift
    /// correction threshold is two of these buffers
    pub output_buffer_samples: u32,
    /// How long a callback waits for a packet before padding with silence
    /// (0 waits indefinitely)
    pub stall_timeout_ms: u64,
}

impl Default for AudioRenderConfig {
    fn default() -> Self {
        Self {
            output_buffer_samples: 1024,
            stall_timeout_ms: 250,
        }
    }
}

impl AudioRenderConfig {
    pub fn stall_timeout(&self) -> Option<Duration> {
        (self.stall_timeout_ms > 0).then(|| Duration::from_millis(self.stall_timeout_ms))
    }
}
