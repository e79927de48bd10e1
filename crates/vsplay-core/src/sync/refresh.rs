//! Frame refresh scheduling
//!
//! The refresh timer re-arms itself every cycle with a delay computed
//! here. Delays accumulate into an absolute `frame_timer` target rather
//! than being measured from "now", so callback jitter never compounds.
//!
//! ```text
//!   delay = pts - last_pts            (fallback: last delay)
//!   diff  = pts - master              (skipped in video-master mode)
//!   diff <= -threshold  → delay = 0   (late, show at once)
//!   diff >= +threshold  → delay *= 2  (early, hold)
//!   frame_timer += delay
//!   re-arm after max(frame_timer - now, min_refresh_delay)
//! ```

use crate::config::SyncConfig;

/// Outcome of scheduling one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshDecision {
    /// Pacing delay charged to this frame (seconds)
    pub delay: f64,
    /// Time until the timer should fire again (seconds)
    pub actual_delay: f64,
    /// Frame timer was pulled back to the wall clock
    pub resynced: bool,
}

pub struct RefreshScheduler {
    frame_timer: f64,
    frame_last_pts: f64,
    frame_last_delay: f64,
    /// Consecutive frames whose drift exceeded the no-sync threshold
    desync_frames: u32,
    min_sync_threshold: f64,
    no_sync_threshold: f64,
    max_frame_delay: f64,
    min_refresh_delay: f64,
    resync_after_frames: u32,
}

impl RefreshScheduler {
    /// Start scheduling with the frame timer at session time `now`
    pub fn new(config: &SyncConfig, now: f64) -> Self {
        Self {
            frame_timer: now,
            frame_last_pts: 0.0,
            frame_last_delay: config.initial_frame_delay,
            desync_frames: 0,
            min_sync_threshold: config.min_sync_threshold,
            no_sync_threshold: config.no_sync_threshold,
            max_frame_delay: config.max_frame_delay,
            min_refresh_delay: config.min_refresh_delay().as_secs_f64(),
            resync_after_frames: config.resync_after_frames,
        }
    }

    /// Absolute target time of the next display
    pub fn frame_timer(&self) -> f64 {
        self.frame_timer
    }

    pub fn last_delay(&self) -> f64 {
        self.frame_last_delay
    }

    /// Schedule the frame with presentation time `pts`
    ///
    /// `master` is the reference clock, or `None` when video is the master.
    pub fn schedule(&mut self, pts: f64, now: f64, master: Option<f64>) -> RefreshDecision {
        let mut delay = pts - self.frame_last_pts;
        if !(delay > 0.0 && delay < self.max_frame_delay) {
            delay = self.frame_last_delay;
        }
        self.frame_last_delay = delay;
        self.frame_last_pts = pts;

        let mut resynced = false;
        if let Some(reference) = master {
            let diff = pts - reference;
            let sync_threshold = delay.max(self.min_sync_threshold);
            if diff.abs() < self.no_sync_threshold {
                self.desync_frames = 0;
                if diff <= -sync_threshold {
                    delay = 0.0;
                } else if diff >= sync_threshold {
                    delay *= 2.0;
                }
            } else {
                self.desync_frames += 1;
                if self.resync_after_frames > 0 && self.desync_frames >= self.resync_after_frames {
                    log::info!(
                        "[REFRESH] video {:.3}s off the master clock for {} frames, resyncing frame timer",
                        diff,
                        self.desync_frames
                    );
                    self.frame_timer = self.frame_timer.max(now);
                    self.desync_frames = 0;
                    resynced = true;
                }
            }
        }

        self.frame_timer += delay;
        let actual_delay = (self.frame_timer - now).max(self.min_refresh_delay);

        RefreshDecision {
            delay,
            actual_delay,
            resynced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(now: f64) -> RefreshScheduler {
        RefreshScheduler::new(&SyncConfig::default(), now)
    }

    #[test]
    fn test_video_master_paces_by_pts_delta() {
        let mut s = scheduler(0.0);
        let first = s.schedule(1.000, 0.0, None);
        // first frame has no predecessor, initial delay applies
        assert!((first.delay - 0.040).abs() < 1e-9);

        let second = s.schedule(1.033, 0.040, None);
        assert!((second.delay - 0.033).abs() < 1e-9);
        assert!((s.frame_timer() - 0.073).abs() < 1e-9);
        assert!((second.actual_delay - 0.033).abs() < 1e-9);
    }

    #[test]
    fn test_bogus_delta_reuses_last_delay() {
        let mut s = scheduler(0.0);
        s.schedule(1.0, 0.0, None);
        s.schedule(1.05, 0.0, None);
        // jump backwards and far forwards both fall back
        assert!((s.schedule(0.5, 0.0, None).delay - 0.05).abs() < 1e-9);
        assert!((s.schedule(9.0, 0.0, None).delay - 0.05).abs() < 1e-9);
        assert!((s.last_delay() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_frame_timer_is_monotonic() {
        let mut s = scheduler(0.0);
        let pts = [1.0, 1.04, 1.04, 0.9, 0.0, -3.0, 1.08, 1.12, 50.0, 1.16];
        let mut last = s.frame_timer();
        let mut now = 0.0;
        for (i, &p) in pts.iter().enumerate() {
            let master = (i % 2 == 0).then_some(p + 0.5);
            s.schedule(p, now, master);
            assert!(s.frame_timer() >= last);
            last = s.frame_timer();
            now += 0.02;
        }
    }

    #[test]
    fn test_actual_delay_floor() {
        let mut s = scheduler(0.0);
        s.schedule(1.0, 0.0, None);
        // far behind schedule
        let d = s.schedule(1.04, 5.0, None);
        assert!((d.actual_delay - 0.010).abs() < 1e-9);
    }

    #[test]
    fn test_late_frame_collapses_delay() {
        let mut s = scheduler(0.0);
        s.schedule(1.0, 0.0, Some(1.0));
        let d = s.schedule(1.04, 0.04, Some(1.2));
        assert_eq!(d.delay, 0.0);
    }

    #[test]
    fn test_early_frame_doubles_delay() {
        let mut s = scheduler(0.0);
        s.schedule(1.0, 0.0, Some(1.0));
        let d = s.schedule(1.04, 0.04, Some(0.9));
        assert!((d.delay - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_small_drift_keeps_delay() {
        let mut s = scheduler(0.0);
        s.schedule(1.0, 0.0, Some(1.0));
        let d = s.schedule(1.04, 0.04, Some(1.035));
        assert!((d.delay - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_prolonged_desync_resyncs_frame_timer() {
        let config = SyncConfig {
            resync_after_frames: 3,
            ..SyncConfig::default()
        };
        let mut s = RefreshScheduler::new(&config, 0.0);
        let mut pts = 100.0;
        let mut resyncs = 0;
        for i in 0..3 {
            pts += 0.04;
            let d = s.schedule(pts, 30.0 + i as f64, Some(0.0));
            if d.resynced {
                resyncs += 1;
            }
        }
        assert_eq!(resyncs, 1);
        assert!(s.frame_timer() >= 32.0);
    }

    #[test]
    fn test_resync_disabled() {
        let config = SyncConfig {
            resync_after_frames: 0,
            ..SyncConfig::default()
        };
        let mut s = RefreshScheduler::new(&config, 0.0);
        for i in 0..50 {
            let d = s.schedule(100.0 + i as f64 * 0.04, 30.0, Some(0.0));
            assert!(!d.resynced);
        }
        assert!(s.frame_timer() < 30.0);
    }
}
