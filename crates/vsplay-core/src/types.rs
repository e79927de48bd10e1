//! Common types for vsplay
//!
//! Stream descriptions, rational time bases and the PCM layout shared by the
//! demux, decode and render paths.

use serde::{Deserialize, Serialize};

/// Output PCM is always interleaved signed 16-bit
pub const BYTES_PER_SAMPLE: usize = 2;

/// Rational time base: one tick lasts `num / den` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBase {
    pub num: i64,
    pub den: i64,
}

impl TimeBase {
    /// Microsecond ticks, the unit seek positions are expressed in
    pub const MICROSECONDS: TimeBase = TimeBase {
        num: 1,
        den: 1_000_000,
    };

    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// Length of one tick in seconds (0 for a degenerate base)
    #[inline]
    pub fn seconds_per_tick(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// Convert a tick count to seconds
    #[inline]
    pub fn ticks_to_seconds(self, ticks: i64) -> f64 {
        ticks as f64 * self.seconds_per_tick()
    }

    /// Rescale `ticks` from this base into `target`, rounding to nearest
    ///
    /// Uses 128-bit intermediates so large timestamps in fine bases
    /// (90 kHz, microseconds) cannot overflow.
    pub fn rescale(self, ticks: i64, target: TimeBase) -> i64 {
        let num = ticks as i128 * self.num as i128 * target.den as i128;
        let den = self.den as i128 * target.num as i128;
        if den == 0 {
            return 0;
        }

        let half = den.abs() / 2;
        let magnitude = (num.abs() + half) / den.abs();
        let rounded = if (num < 0) != (den < 0) {
            -magnitude
        } else {
            magnitude
        };
        rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::MICROSECONDS
    }
}

/// What a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
    /// Subtitles, data tracks and anything else playback ignores
    Other,
}

/// PCM layout produced by audio decoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Bytes in one interleaved sample frame (all channels)
    #[inline]
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }

    #[inline]
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.bytes_per_frame()
    }
}

/// Video stream parameters the pacing path needs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    /// Nominal frame duration in seconds (0 when the container doesn't say)
    pub frame_duration: f64,
}

/// Description of one elementary stream in a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Index used to route packets (matches `CodedPacket::stream_index`)
    pub index: usize,
    pub kind: MediaKind,
    pub time_base: TimeBase,
    /// Codec name as reported by the demuxer, informational only
    pub codec: String,
    pub audio: Option<AudioFormat>,
    pub video: Option<VideoParams>,
}

impl StreamInfo {
    pub fn audio(index: usize, time_base: TimeBase, codec: &str, format: AudioFormat) -> Self {
        Self {
            index,
            kind: MediaKind::Audio,
            time_base,
            codec: codec.to_string(),
            audio: Some(format),
            video: None,
        }
    }

    pub fn video(index: usize, time_base: TimeBase, codec: &str, params: VideoParams) -> Self {
        Self {
            index,
            kind: MediaKind::Video,
            time_base,
            codec: codec.to_string(),
            audio: None,
            video: Some(params),
        }
    }

    pub fn other(index: usize, time_base: TimeBase, codec: &str) -> Self {
        Self {
            index,
            kind: MediaKind::Other,
            time_base,
            codec: codec.to_string(),
            audio: None,
            video: None,
        }
    }
}

/// First stream of the requested kind, the selection rule playback uses
pub fn select_stream(streams: &[StreamInfo], kind: MediaKind) -> Option<&StreamInfo> {
    streams.iter().find(|s| s.kind == kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescale_microseconds_to_90khz() {
        let tb = TimeBase::new(1, 90_000);
        assert_eq!(TimeBase::MICROSECONDS.rescale(1_000_000, tb), 90_000);
        assert_eq!(TimeBase::MICROSECONDS.rescale(10_500_000, tb), 945_000);
    }

    #[test]
    fn test_rescale_rounds_to_nearest() {
        let tb = TimeBase::new(1, 25);
        // 0.06s is 1.5 ticks at 25fps
        assert_eq!(TimeBase::MICROSECONDS.rescale(60_000, tb), 2);
        assert_eq!(TimeBase::MICROSECONDS.rescale(-60_000, tb), -2);
        assert_eq!(TimeBase::MICROSECONDS.rescale(50_000, tb), 1);
    }

    #[test]
    fn test_rescale_degenerate_base() {
        assert_eq!(TimeBase::new(1, 0).rescale(100, TimeBase::MICROSECONDS), 0);
        assert_eq!(TimeBase::new(1, 0).seconds_per_tick(), 0.0);
    }

    #[test]
    fn test_audio_format_sizes() {
        let fmt = AudioFormat::new(48_000, 2);
        assert_eq!(fmt.bytes_per_frame(), 4);
        assert_eq!(fmt.bytes_per_second(), 192_000);
    }

    #[test]
    fn test_select_first_stream_of_kind() {
        let tb = TimeBase::new(1, 1000);
        let streams = vec![
            StreamInfo::other(0, tb, "subrip"),
            StreamInfo::audio(1, tb, "pcm", AudioFormat::new(44_100, 2)),
            StreamInfo::audio(2, tb, "pcm", AudioFormat::new(48_000, 1)),
        ];
        assert_eq!(select_stream(&streams, MediaKind::Audio).map(|s| s.index), Some(1));
        assert!(select_stream(&streams, MediaKind::Video).is_none());
    }
}
