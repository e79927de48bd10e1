//! Synthetic media source
//!
//! Generates a counting video stream, a sine tone and optionally a data
//! stream, interleaved by timestamp. The "codecs" are trivial: video
//! packets carry their frame number, audio packets carry raw PCM. The
//! video decoder can hold back frames to mimic reordering latency, and
//! failures can be injected for error-path testing.
//!
//! Source strings look like `testsrc:duration=5,fps=30,size=320x240`.

use super::{
    AudioDecoder, DecodedFrame, Demuxer, MediaBackend, ReadOutcome, SeekDirection, VideoDecoder,
};
use crate::error::{DecodeError, SourceError};
use crate::queue::CodedPacket;
use crate::types::{AudioFormat, MediaKind, StreamInfo, TimeBase, VideoParams};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const VIDEO_CODEC: &str = "testsrc-video";
pub const AUDIO_CODEC: &str = "testsrc-pcm";
pub const DATA_CODEC: &str = "testsrc-data";

/// Shape of the generated streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSourceConfig {
    pub duration_secs: f64,
    pub video: bool,
    pub audio: bool,
    /// Adds a one-packet-per-second stream playback should ignore
    pub data_stream: bool,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Video packet payload size, for exercising queue caps
    pub video_packet_bytes: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub audio_packet_frames: u32,
    pub tone_hz: f64,
    /// Packets the video decoder holds back before emitting a frame
    pub decoder_delay: usize,
    /// Fail reads with an I/O error after this many packets
    pub fail_after_packets: Option<u64>,
    /// Reject every seek
    pub fail_seeks: bool,
}

impl Default for TestSourceConfig {
    fn default() -> Self {
        Self {
            duration_secs: 10.0,
            video: true,
            audio: true,
            data_stream: false,
            fps: 25,
            width: 320,
            height: 240,
            video_packet_bytes: 4096,
            sample_rate: 48_000,
            channels: 2,
            audio_packet_frames: 1024,
            tone_hz: 440.0,
            decoder_delay: 0,
            fail_after_packets: None,
            fail_seeks: false,
        }
    }
}

impl TestSourceConfig {
    /// Parse `testsrc[:key=value,...]`
    pub fn parse(source: &str) -> Result<Self, SourceError> {
        let invalid = |reason: String| SourceError::Open {
            source_name: source.to_string(),
            reason,
        };

        let options = match source.strip_prefix("testsrc") {
            Some("") => return Ok(Self::default()),
            Some(rest) => rest
                .strip_prefix(':')
                .ok_or_else(|| invalid("expected ':' after testsrc".into()))?,
            None => return Err(invalid("not a testsrc source".into())),
        };

        let mut config = Self::default();
        for option in options.split(',').filter(|o| !o.is_empty()) {
            let (key, value) = option
                .split_once('=')
                .ok_or_else(|| invalid(format!("option {:?} has no value", option)))?;
            let bad = || invalid(format!("bad value for {}: {:?}", key, value));
            match key {
                "duration" => config.duration_secs = value.parse().map_err(|_| bad())?,
                "fps" => config.fps = value.parse().map_err(|_| bad())?,
                "size" => {
                    let (w, h) = value.split_once('x').ok_or_else(bad)?;
                    config.width = w.parse().map_err(|_| bad())?;
                    config.height = h.parse().map_err(|_| bad())?;
                }
                "rate" => config.sample_rate = value.parse().map_err(|_| bad())?,
                "channels" => config.channels = value.parse().map_err(|_| bad())?,
                "tone" => config.tone_hz = value.parse().map_err(|_| bad())?,
                "delay" => config.decoder_delay = value.parse().map_err(|_| bad())?,
                "audio" => config.audio = value != "0",
                "video" => config.video = value != "0",
                "data" => config.data_stream = value != "0",
                _ => return Err(invalid(format!("unknown option {:?}", key))),
            }
        }

        if config.fps == 0 || config.sample_rate == 0 || config.channels == 0 {
            return Err(invalid("fps, rate and channels must be non-zero".into()));
        }
        Ok(config)
    }

    fn total_frames(&self) -> u64 {
        (self.duration_secs * self.fps as f64).round() as u64
    }

    fn total_samples(&self) -> u64 {
        (self.duration_secs * self.sample_rate as f64).round() as u64
    }
}

/// Demuxer over the generated streams
pub struct TestDemuxer {
    config: TestSourceConfig,
    streams: Vec<StreamInfo>,
    video_index: Option<usize>,
    audio_index: Option<usize>,
    data_index: Option<usize>,
    next_frame: u64,
    next_sample: u64,
    next_data_sec: u64,
    packets_read: u64,
}

impl TestDemuxer {
    pub fn new(config: TestSourceConfig) -> Self {
        let mut streams = Vec::new();
        let mut add = |kind: MediaKind| {
            let index = streams.len();
            streams.push(match kind {
                MediaKind::Video => StreamInfo::video(
                    index,
                    TimeBase::new(1, config.fps as i64),
                    VIDEO_CODEC,
                    VideoParams {
                        width: config.width,
                        height: config.height,
                        frame_duration: 1.0 / config.fps as f64,
                    },
                ),
                MediaKind::Audio => StreamInfo::audio(
                    index,
                    TimeBase::new(1, config.sample_rate as i64),
                    AUDIO_CODEC,
                    AudioFormat::new(config.sample_rate, config.channels),
                ),
                MediaKind::Other => StreamInfo::other(index, TimeBase::new(1, 1), DATA_CODEC),
            });
            index
        };

        let video_index = config.video.then(|| add(MediaKind::Video));
        let audio_index = config.audio.then(|| add(MediaKind::Audio));
        let data_index = config.data_stream.then(|| add(MediaKind::Other));

        Self {
            config,
            streams,
            video_index,
            audio_index,
            data_index,
            next_frame: 0,
            next_sample: 0,
            next_data_sec: 0,
            packets_read: 0,
        }
    }

    fn video_packet(&mut self, index: usize) -> CodedPacket {
        let frame = self.next_frame;
        self.next_frame += 1;

        let mut data = vec![0u8; self.config.video_packet_bytes.max(8)];
        data[..8].copy_from_slice(&frame.to_le_bytes());
        CodedPacket::new(index, data)
            .with_pts(frame as i64)
            .with_dts(frame as i64)
            .with_duration(1)
    }

    fn audio_packet(&mut self, index: usize) -> CodedPacket {
        let start = self.next_sample;
        let remaining = self.config.total_samples() - start;
        let frames = remaining.min(self.config.audio_packet_frames.max(1) as u64);
        self.next_sample += frames;

        let rate = self.config.sample_rate as f64;
        let channels = self.config.channels as usize;
        let amplitude = i16::MAX as f64 * 0.25;
        let mut samples = Vec::with_capacity(frames as usize * channels);
        for n in start..start + frames {
            let phase = 2.0 * std::f64::consts::PI * self.config.tone_hz * n as f64 / rate;
            let value = (phase.sin() * amplitude) as i16;
            samples.extend(std::iter::repeat(value).take(channels));
        }

        CodedPacket::new(index, bytemuck::cast_slice(&samples).to_vec())
            .with_pts(start as i64)
            .with_duration(frames as i64)
    }

    fn data_packet(&mut self, index: usize) -> CodedPacket {
        let second = self.next_data_sec;
        self.next_data_sec += 1;
        CodedPacket::new(index, b"tick".to_vec()).with_pts(second as i64)
    }
}

impl Demuxer for TestDemuxer {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<ReadOutcome, SourceError> {
        if let Some(limit) = self.config.fail_after_packets {
            if self.packets_read >= limit {
                return Err(SourceError::Io(std::io::Error::other("injected read failure")));
            }
        }

        let fps = self.config.fps as f64;
        let rate = self.config.sample_rate as f64;
        let video = self
            .video_index
            .filter(|_| self.next_frame < self.config.total_frames())
            .map(|i| (self.next_frame as f64 / fps, i, MediaKind::Video));
        let audio = self
            .audio_index
            .filter(|_| self.next_sample < self.config.total_samples())
            .map(|i| (self.next_sample as f64 / rate, i, MediaKind::Audio));
        let data = self
            .data_index
            .filter(|_| (self.next_data_sec as f64) < self.config.duration_secs)
            .map(|i| (self.next_data_sec as f64, i, MediaKind::Other));

        let next = [video, audio, data]
            .into_iter()
            .flatten()
            .min_by(|a, b| a.0.total_cmp(&b.0));
        let Some((_, index, kind)) = next else {
            return Ok(ReadOutcome::EndOfStream);
        };

        self.packets_read += 1;
        let packet = match kind {
            MediaKind::Video => self.video_packet(index),
            MediaKind::Audio => self.audio_packet(index),
            MediaKind::Other => self.data_packet(index),
        };
        Ok(ReadOutcome::Packet(packet))
    }

    fn seek(
        &mut self,
        stream_index: usize,
        target_ts: i64,
        direction: SeekDirection,
    ) -> Result<(), SourceError> {
        if self.config.fail_seeks {
            return Err(SourceError::Seek("seeking disabled".into()));
        }
        let stream = self
            .streams
            .get(stream_index)
            .ok_or_else(|| SourceError::Seek(format!("no stream {}", stream_index)))?;

        let secs = stream.time_base.ticks_to_seconds(target_ts).max(0.0);
        if secs > self.config.duration_secs {
            return Err(SourceError::Seek(format!(
                "{:.3}s is past the end ({:.3}s)",
                secs, self.config.duration_secs
            )));
        }

        let frame_pos = secs * self.config.fps as f64;
        self.next_frame = match direction {
            SeekDirection::Backward => frame_pos.floor(),
            SeekDirection::Forward => frame_pos.ceil(),
        } as u64;
        self.next_sample = (secs * self.config.sample_rate as f64) as u64;
        self.next_data_sec = secs.ceil() as u64;
        Ok(())
    }
}

/// Decoder for [`VIDEO_CODEC`] packets
pub struct TestVideoDecoder {
    width: u32,
    height: u32,
    delay: usize,
    pending: VecDeque<(u64, u64)>,
}

impl TestVideoDecoder {
    pub fn new(width: u32, height: u32, delay: usize) -> Self {
        Self {
            width,
            height,
            delay,
            pending: VecDeque::new(),
        }
    }
}

impl VideoDecoder for TestVideoDecoder {
    fn decode(
        &mut self,
        submission: u64,
        packet: &CodedPacket,
    ) -> Result<Option<DecodedFrame>, DecodeError> {
        let header: [u8; 8] = packet
            .data
            .get(..8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| DecodeError::InvalidData("video packet shorter than 8 bytes".into()))?;
        self.pending.push_back((submission, u64::from_le_bytes(header)));

        if self.pending.len() <= self.delay {
            return Ok(None);
        }
        let Some((submission, frame)) = self.pending.pop_front() else {
            return Ok(None);
        };
        Ok(Some(DecodedFrame {
            width: self.width,
            height: self.height,
            data: vec![(frame % 256) as u8; (self.width * self.height) as usize],
            repeat_pict: 0,
            submission: Some(submission),
        }))
    }

    fn flush(&mut self) {
        self.pending.clear();
    }
}

/// Decoder for [`AUDIO_CODEC`] packets
#[derive(Debug, Default)]
pub struct TestAudioDecoder;

impl AudioDecoder for TestAudioDecoder {
    fn decode(&mut self, packet: &CodedPacket) -> Result<Vec<i16>, DecodeError> {
        if packet.data.len() % 2 != 0 {
            return Err(DecodeError::InvalidData(format!(
                "odd PCM payload of {} bytes",
                packet.data.len()
            )));
        }
        Ok(packet
            .data
            .chunks_exact(2)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]))
            .collect())
    }

    fn flush(&mut self) {}
}

/// Backend producing [`TestDemuxer`]s
pub struct TestSourceBackend {
    config: TestSourceConfig,
}

impl TestSourceBackend {
    pub fn new(config: TestSourceConfig) -> Self {
        Self { config }
    }
}

impl MediaBackend for TestSourceBackend {
    fn open_demuxer(&self, source: &str) -> Result<Box<dyn Demuxer>, SourceError> {
        log::info!("[TESTSRC] Generating {} ({:.1}s)", source, self.config.duration_secs);
        Ok(Box::new(TestDemuxer::new(self.config.clone())))
    }

    fn open_audio_decoder(&self, stream: &StreamInfo) -> Result<Box<dyn AudioDecoder>, DecodeError> {
        if stream.codec != AUDIO_CODEC {
            return Err(DecodeError::Unsupported(stream.codec.clone()));
        }
        Ok(Box::new(TestAudioDecoder))
    }

    fn open_video_decoder(&self, stream: &StreamInfo) -> Result<Box<dyn VideoDecoder>, DecodeError> {
        let params = match (&stream.video, stream.codec.as_str()) {
            (Some(params), VIDEO_CODEC) => params,
            _ => return Err(DecodeError::Unsupported(stream.codec.clone())),
        };
        Ok(Box::new(TestVideoDecoder::new(
            params.width,
            params.height,
            self.config.decoder_delay,
        )))
    }
}
