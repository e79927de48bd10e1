//! Media backend for real files, built on Symphonia
//!
//! Symphonia covers containers and audio codecs only, so files play as
//! audio-only sessions; video tracks are reported and skipped.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use vsplay_core::error::{DecodeError, SourceError};
use vsplay_core::media::{
    AudioDecoder, Demuxer, MediaBackend, ReadOutcome, SeekDirection, VideoDecoder,
};
use vsplay_core::queue::CodedPacket;
use vsplay_core::{AudioFormat, StreamInfo, TimeBase};

/// Opens files through Symphonia's probe and codec registry
#[derive(Default)]
pub struct SymphoniaBackend {
    /// Codec parameters of the last opened source, by stream index
    tracks: Mutex<HashMap<usize, (u32, CodecParameters)>>,
}

impl SymphoniaBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MediaBackend for SymphoniaBackend {
    fn open_demuxer(&self, source: &str) -> Result<Box<dyn Demuxer>, SourceError> {
        let path = Path::new(source);
        let file = File::open(path).map_err(|e| SourceError::Open {
            source_name: source.to_string(),
            reason: e.to_string(),
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| SourceError::Open {
                source_name: source.to_string(),
                reason: e.to_string(),
            })?;
        let reader = probed.format;

        let mut tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        tracks.clear();

        let mut streams = Vec::with_capacity(reader.tracks().len());
        let mut track_ids = Vec::with_capacity(reader.tracks().len());
        for (index, track) in reader.tracks().iter().enumerate() {
            let stream = stream_info(index, &track.codec_params);
            log::debug!(
                "[SYMPHONIA] Track {} -> stream {}: {:?} {}",
                track.id,
                index,
                stream.kind,
                stream.codec
            );
            tracks.insert(index, (track.id, track.codec_params.clone()));
            track_ids.push(track.id);
            streams.push(stream);
        }

        Ok(Box::new(SymphoniaDemuxer {
            reader,
            streams,
            track_ids,
        }))
    }

    fn open_audio_decoder(&self, stream: &StreamInfo) -> Result<Box<dyn AudioDecoder>, DecodeError> {
        let tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        let (track_id, params) = tracks
            .get(&stream.index)
            .ok_or_else(|| DecodeError::Open(format!("unknown stream {}", stream.index)))?;

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported(format!("{}: {}", stream.codec, e)))?;

        Ok(Box::new(SymphoniaAudioDecoder {
            decoder,
            track_id: *track_id,
            sample_buf: None,
        }))
    }

    fn open_video_decoder(&self, stream: &StreamInfo) -> Result<Box<dyn VideoDecoder>, DecodeError> {
        Err(DecodeError::Unsupported(stream.codec.clone()))
    }
}

fn codec_name(params: &CodecParameters) -> String {
    symphonia::default::get_codecs()
        .get_codec(params.codec)
        .map(|descriptor| descriptor.short_name.to_string())
        .unwrap_or_else(|| format!("{:?}", params.codec))
}

fn stream_info(index: usize, params: &CodecParameters) -> StreamInfo {
    let codec = codec_name(params);
    let sample_rate = params.sample_rate.unwrap_or(0);
    let time_base = match params.time_base {
        Some(tb) => TimeBase::new(tb.numer as i64, tb.denom as i64),
        None if sample_rate > 0 => TimeBase::new(1, sample_rate as i64),
        None => TimeBase::MICROSECONDS,
    };

    match params.channels {
        Some(channels) if params.codec != CODEC_TYPE_NULL && sample_rate > 0 => {
            let format = AudioFormat::new(sample_rate, channels.count() as u16);
            StreamInfo::audio(index, time_base, &codec, format)
        }
        _ => StreamInfo::other(index, time_base, &codec),
    }
}

/// Packet reader over a probed container
pub struct SymphoniaDemuxer {
    reader: Box<dyn FormatReader>,
    streams: Vec<StreamInfo>,
    track_ids: Vec<u32>,
}

impl Demuxer for SymphoniaDemuxer {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<ReadOutcome, SourceError> {
        let packet = match self.reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(ReadOutcome::EndOfStream);
            }
            Err(SymphoniaError::IoError(e)) => return Err(SourceError::Io(e)),
            Err(e) => return Err(SourceError::Malformed(e.to_string())),
        };

        let index = self
            .track_ids
            .iter()
            .position(|&id| id == packet.track_id())
            .ok_or_else(|| SourceError::Malformed(format!("packet for unknown track {}", packet.track_id())))?;

        let ts = packet.ts() as i64;
        let coded = CodedPacket::new(index, packet.data.to_vec())
            .with_pts(ts)
            .with_dts(ts)
            .with_duration(packet.dur() as i64);
        Ok(ReadOutcome::Packet(coded))
    }

    fn seek(
        &mut self,
        stream_index: usize,
        target_ts: i64,
        direction: SeekDirection,
    ) -> Result<(), SourceError> {
        let track_id = self
            .track_ids
            .get(stream_index)
            .copied()
            .ok_or_else(|| SourceError::Seek(format!("no stream {}", stream_index)))?;

        // Accurate lands at or before the target, coarse may overshoot
        let mode = match direction {
            SeekDirection::Backward => SeekMode::Accurate,
            SeekDirection::Forward => SeekMode::Coarse,
        };
        let seek_to = SeekTo::TimeStamp {
            ts: target_ts.max(0) as u64,
            track_id,
        };

        let seeked = self
            .reader
            .seek(mode, seek_to)
            .map_err(|e| SourceError::Seek(e.to_string()))?;
        log::debug!(
            "[SYMPHONIA] Seek to {} landed at {}",
            seeked.required_ts,
            seeked.actual_ts
        );
        Ok(())
    }
}

/// Symphonia decoder producing interleaved i16
pub struct SymphoniaAudioDecoder {
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_buf: Option<SampleBuffer<i16>>,
}

impl AudioDecoder for SymphoniaAudioDecoder {
    fn decode(&mut self, packet: &CodedPacket) -> Result<Vec<i16>, DecodeError> {
        let input = symphonia::core::formats::Packet::new_from_slice(
            self.track_id,
            packet.pts.unwrap_or(0).max(0) as u64,
            packet.duration.max(0) as u64,
            &packet.data,
        );

        let decoded = match self.decoder.decode(&input) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                return Err(DecodeError::InvalidData(msg.to_string()));
            }
            Err(e) => return Err(DecodeError::InvalidData(e.to_string())),
        };

        if decoded.frames() == 0 {
            return Ok(Vec::new());
        }

        let spec = *decoded.spec();
        let needed = decoded.frames() * spec.channels.count();
        let capacity = decoded.capacity() as u64;
        if matches!(&self.sample_buf, Some(buf) if buf.capacity() < needed) {
            self.sample_buf = None;
        }
        let sample_buf = self
            .sample_buf
            .get_or_insert_with(|| SampleBuffer::new(capacity, spec));
        sample_buf.copy_interleaved_ref(decoded);
        Ok(sample_buf.samples().to_vec())
    }

    fn flush(&mut self) {
        self.decoder.reset();
    }
}
