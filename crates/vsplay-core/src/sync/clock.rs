//! Clock model
//!
//! Clocks are pure functions of small snapshots. Writers publish a
//! snapshot under the owning mutex, readers copy it out and compute
//! without holding any lock, so no clock read ever nests locks.
//!
//! All times are seconds. "Now" is measured from the session epoch, which
//! also makes it the external clock. The epoch is reset when playback
//! starts.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Which clock every other stream is paced against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    AudioMaster,
    #[default]
    VideoMaster,
    ExternalMaster,
}

/// State published by the audio render path
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioClockSnapshot {
    /// Timestamp of the end of the decoded data
    pub audio_clock: f64,
    /// Decoded bytes not yet handed to the output device
    pub unconsumed_bytes: usize,
    pub bytes_per_second: usize,
}

/// State published by the refresh timer at each display
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VideoClockSnapshot {
    /// pts of the picture last shown
    pub current_pts: f64,
    /// Session time at which it was shown
    pub current_pts_time: f64,
}

/// Audio clock: decoded end time minus what is still buffered
pub fn audio_clock(s: &AudioClockSnapshot) -> f64 {
    if s.bytes_per_second == 0 {
        return s.audio_clock;
    }
    s.audio_clock - s.unconsumed_bytes as f64 / s.bytes_per_second as f64
}

/// Video clock: last displayed pts plus time elapsed since display
pub fn video_clock(s: &VideoClockSnapshot, now: f64) -> f64 {
    s.current_pts + (now - s.current_pts_time)
}

/// External clock: wall time since playback start
pub fn external_clock(now: f64) -> f64 {
    now
}

pub fn master_clock(
    mode: SyncMode,
    audio: &AudioClockSnapshot,
    video: &VideoClockSnapshot,
    now: f64,
) -> f64 {
    match mode {
        SyncMode::AudioMaster => audio_clock(audio),
        SyncMode::VideoMaster => video_clock(video, now),
        SyncMode::ExternalMaster => external_clock(now),
    }
}

/// Shared clock inputs for one session
pub struct ClockState {
    epoch: Mutex<Instant>,
    audio: Mutex<AudioClockSnapshot>,
    video: Mutex<VideoClockSnapshot>,
}

impl ClockState {
    pub fn new() -> Self {
        Self::with_epoch(Instant::now())
    }

    pub fn with_epoch(epoch: Instant) -> Self {
        Self {
            epoch: Mutex::new(epoch),
            audio: Mutex::new(AudioClockSnapshot::default()),
            video: Mutex::new(VideoClockSnapshot::default()),
        }
    }

    /// Seconds since the session epoch
    #[inline]
    pub fn now(&self) -> f64 {
        self.epoch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
            .as_secs_f64()
    }

    /// Move the epoch to the present, so time spent between opening a
    /// source and starting playback does not count as elapsed playback
    pub fn restart(&self) {
        *self.epoch.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn audio_snapshot(&self) -> AudioClockSnapshot {
        *self.audio.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn video_snapshot(&self) -> VideoClockSnapshot {
        *self.video.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish_audio(&self, snapshot: AudioClockSnapshot) {
        *self.audio.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Record that the picture with `pts` was shown at session time `now`
    pub fn publish_video(&self, pts: f64, now: f64) {
        *self.video.lock().unwrap_or_else(PoisonError::into_inner) = VideoClockSnapshot {
            current_pts: pts,
            current_pts_time: now,
        };
    }

    pub fn audio_clock(&self) -> f64 {
        audio_clock(&self.audio_snapshot())
    }

    pub fn video_clock(&self) -> f64 {
        let snapshot = self.video_snapshot();
        video_clock(&snapshot, self.now())
    }

    /// Clock named by `mode`, sampled now
    pub fn master_clock(&self, mode: SyncMode) -> f64 {
        match mode {
            SyncMode::AudioMaster => self.audio_clock(),
            SyncMode::VideoMaster => self.video_clock(),
            SyncMode::ExternalMaster => external_clock(self.now()),
        }
    }
}

impl Default for ClockState {
    fn default() -> Self {
        Self::new()
    }
}
