//! Audio drift correction
//!
//! When audio is not the master clock, each freshly decoded block is
//! nudged toward the master by dropping or repeating whole sample frames
//! at its end. Pitch never changes; the block length changes by at most
//! `max_correction_percent`.
//!
//! Drift is smoothed with an exponential average whose coefficient makes
//! an observation's weight fall to 1% after `diff_avg_window` blocks.
//! Nothing is corrected until that many observations have been seen.

use crate::config::SyncConfig;
use crate::types::AudioFormat;

pub struct DriftCorrector {
    diff_cum: f64,
    avg_coef: f64,
    avg_count: u32,
    avg_window: u32,
    /// Averaged drift below this is left alone (seconds)
    threshold: f64,
    no_sync_threshold: f64,
    max_correction_percent: u32,
}

impl DriftCorrector {
    pub fn new(config: &SyncConfig, format: AudioFormat, output_buffer_samples: u32) -> Self {
        let window = config.diff_avg_window.max(1);
        let threshold = if format.sample_rate == 0 {
            f64::INFINITY
        } else {
            2.0 * output_buffer_samples as f64 / format.sample_rate as f64
        };
        Self {
            diff_cum: 0.0,
            avg_coef: (0.01f64.ln() / window as f64).exp(),
            avg_count: 0,
            avg_window: window,
            threshold,
            no_sync_threshold: config.no_sync_threshold,
            max_correction_percent: config.max_correction_percent.min(100),
        }
    }

    /// Forget accumulated drift (after a seek or a desync event)
    pub fn reset(&mut self) {
        self.diff_cum = 0.0;
        self.avg_count = 0;
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Feed one observation; yields the averaged drift once the window is full
    pub fn observe(&mut self, diff: f64) -> Option<f64> {
        if !diff.is_finite() || diff.abs() >= self.no_sync_threshold {
            // too far off to fix by stretching
            self.reset();
            return None;
        }

        self.diff_cum = diff + self.avg_coef * self.diff_cum;
        if self.avg_count < self.avg_window {
            self.avg_count += 1;
            return None;
        }
        Some(self.diff_cum * (1.0 - self.avg_coef))
    }

    /// Adjust `block` (interleaved PCM bytes) for `diff = audio - master`
    ///
    /// Returns the new block length in bytes.
    pub fn synchronize(&mut self, block: &mut Vec<u8>, diff: f64, format: AudioFormat) -> usize {
        let samples_size = block.len();
        let bytes_per_frame = format.bytes_per_frame();
        if bytes_per_frame == 0 || samples_size < bytes_per_frame {
            return samples_size;
        }

        let Some(avg_diff) = self.observe(diff) else {
            return samples_size;
        };
        if avg_diff.abs() < self.threshold {
            return samples_size;
        }

        let frames = (diff * format.sample_rate as f64).trunc() as i64;
        let wanted = samples_size as i64 + frames * bytes_per_frame as i64;
        let wanted = clamp_wanted_size(
            samples_size,
            wanted,
            bytes_per_frame,
            self.max_correction_percent,
        );

        log::trace!(
            "[AUDIO] drift {:.4}s (avg {:.4}s): {} -> {} bytes",
            diff,
            avg_diff,
            samples_size,
            wanted
        );
        resize_block(block, wanted, bytes_per_frame);
        block.len()
    }
}

/// Clamp a requested block size to `samples_size ± percent`, in whole frames
///
/// `samples_size` must itself be a whole number of frames. If no whole
/// frame count fits inside the window the block is left unchanged.
pub fn clamp_wanted_size(
    samples_size: usize,
    wanted: i64,
    bytes_per_frame: usize,
    percent: u32,
) -> usize {
    let percent = percent.min(100) as usize;
    let min = (samples_size * (100 - percent)).div_ceil(100);
    let max = samples_size * (100 + percent) / 100;

    let clamped = wanted.clamp(min as i64, max as i64) as usize;
    let bytes_per_frame = bytes_per_frame.max(1);
    let mut aligned = clamped / bytes_per_frame * bytes_per_frame;
    if aligned < min {
        aligned += bytes_per_frame;
    }
    if aligned > max {
        return samples_size;
    }
    aligned
}

/// Truncate, or pad by repeating the final sample frame
fn resize_block(block: &mut Vec<u8>, wanted: usize, bytes_per_frame: usize) {
    if wanted <= block.len() {
        block.truncate(wanted);
        return;
    }

    let start = block.len() - bytes_per_frame;
    let last_frame = block[start..].to_vec();
    while block.len() < wanted {
        let n = bytes_per_frame.min(wanted - block.len());
        block.extend_from_slice(&last_frame[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMAT: AudioFormat = AudioFormat::new(48_000, 2);

    fn corrector() -> DriftCorrector {
        DriftCorrector::new(&SyncConfig::default(), FORMAT, 1024)
    }

    /// 1024 stereo frames, each frame tagged with its index
    fn block() -> Vec<u8> {
        (0..1024u16)
            .flat_map(|i| {
                let b = i.to_le_bytes();
                [b[0], b[1], b[0], b[1]]
            })
            .collect()
    }

    #[test]
    fn test_threshold_from_output_buffer() {
        let c = corrector();
        assert!((c.threshold() - 2048.0 / 48_000.0).abs() < 1e-12);
    }

    #[test]
    fn test_small_drift_leaves_block_unchanged() {
        // audio 5.02 vs master 5.00
        let mut c = corrector();
        let mut data = block();
        let size = c.synchronize(&mut data, 5.02 - 5.00, FORMAT);
        assert_eq!(size, 4096);
        assert_eq!(data, block());
    }

    #[test]
    fn test_drift_below_threshold_never_corrects() {
        let mut c = corrector();
        for _ in 0..50 {
            let mut data = block();
            assert_eq!(c.synchronize(&mut data, 0.02, FORMAT), 4096);
        }
    }

    #[test]
    fn test_no_correction_until_window_primed() {
        let mut c = corrector();
        for _ in 0..20 {
            let mut data = block();
            assert_eq!(c.synchronize(&mut data, 0.5, FORMAT), 4096);
        }
        let mut data = block();
        assert_ne!(c.synchronize(&mut data, 0.5, FORMAT), 4096);
    }

    #[test]
    fn test_audio_ahead_pads_with_last_frame() {
        let mut c = corrector();
        for _ in 0..20 {
            c.synchronize(&mut block(), 0.5, FORMAT);
        }
        let mut data = block();
        c.synchronize(&mut data, 0.5, FORMAT);
        // clamped to +10%, whole frames
        assert_eq!(data.len(), 4504);
        assert_eq!(&data[..4096], &block()[..]);
        let last = &block()[4092..];
        for frame in data[4096..].chunks(4) {
            assert_eq!(frame, last);
        }
    }

    #[test]
    fn test_audio_behind_truncates() {
        let mut c = corrector();
        for _ in 0..20 {
            c.synchronize(&mut block(), -0.5, FORMAT);
        }
        let mut data = block();
        c.synchronize(&mut data, -0.5, FORMAT);
        assert_eq!(data.len(), 3688);
        assert_eq!(&data[..], &block()[..3688]);
    }

    #[test]
    fn test_small_correction_is_exact() {
        let mut c = corrector();
        // prime with a large drift so the average is over threshold
        for _ in 0..20 {
            c.observe(0.3);
        }
        let mut data = block();
        // 2^-10 s at 48kHz is 46.875 frames, truncated to 46
        assert_eq!(c.synchronize(&mut data, 0.0009765625, FORMAT), 4096 + 46 * 4);
    }

    #[test]
    fn test_nosync_observation_resets_average() {
        let mut c = corrector();
        for _ in 0..25 {
            c.observe(0.5);
        }
        assert!(c.observe(0.5).is_some());
        assert!(c.observe(20.0).is_none());
        let mut data = block();
        assert_eq!(c.synchronize(&mut data, 0.5, FORMAT), 4096);
    }

    #[test]
    fn test_clamp_bounds_hold() {
        for frames in 1..600usize {
            for bytes_per_frame in [2usize, 4, 12] {
                let size = frames * bytes_per_frame;
                for wanted in [-1_000_000i64, 0, size as i64 / 2, size as i64 + 3, i64::MAX / 4] {
                    let out = clamp_wanted_size(size, wanted, bytes_per_frame, 10);
                    assert!(out as f64 >= 0.9 * size as f64 - 1e-9, "{} {}", size, out);
                    assert!(out as f64 <= 1.1 * size as f64 + 1e-9, "{} {}", size, out);
                    assert_eq!(out % bytes_per_frame, 0);
                }
            }
        }
    }

    #[test]
    fn test_clamp_passes_through_inside_window() {
        assert_eq!(clamp_wanted_size(4000, 4040, 4, 10), 4040);
        assert_eq!(clamp_wanted_size(4000, 4042, 4, 10), 4040);
    }
}
