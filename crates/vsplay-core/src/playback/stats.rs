//! Lock-free playback counters
//!
//! Written by the playback threads, readable from anywhere without
//! locking. All operations use `Ordering::Relaxed` since the counters
//! are only reported, never used for synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PlaybackStats {
    frames_displayed: AtomicU64,
    audio_packets: AtomicU64,
    video_packets: AtomicU64,
    packets_discarded: AtomicU64,
    decode_errors: AtomicU64,
    seeks_completed: AtomicU64,
    seeks_failed: AtomicU64,
    silence_fills: AtomicU64,
    resyncs: AtomicU64,
}

/// Point-in-time copy of [`PlaybackStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_displayed: u64,
    pub audio_packets: u64,
    pub video_packets: u64,
    pub packets_discarded: u64,
    pub decode_errors: u64,
    pub seeks_completed: u64,
    pub seeks_failed: u64,
    /// Output callbacks padded with silence (starvation or shutdown)
    pub silence_fills: u64,
    pub resyncs: u64,
}

impl PlaybackStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_frame_displayed(&self) {
        self.frames_displayed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_audio_packet(&self) {
        self.audio_packets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_video_packet(&self) {
        self.video_packets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_discarded_packet(&self) {
        self.packets_discarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_seek(&self, success: bool) {
        if success {
            self.seeks_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.seeks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_silence_fill(&self) {
        self.silence_fills.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames shown so far (lock-free)
    #[inline]
    pub fn frames_displayed(&self) -> u64 {
        self.frames_displayed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_displayed: self.frames_displayed.load(Ordering::Relaxed),
            audio_packets: self.audio_packets.load(Ordering::Relaxed),
            video_packets: self.video_packets.load(Ordering::Relaxed),
            packets_discarded: self.packets_discarded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            seeks_completed: self.seeks_completed.load(Ordering::Relaxed),
            seeks_failed: self.seeks_failed.load(Ordering::Relaxed),
            silence_fills: self.silence_fills.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
        }
    }
}
