//! Audio render path
//!
//! [`AudioRenderer::fill`] is called from the output device's own thread
//! whenever it needs samples. It always writes exactly the requested
//! number of bytes: decoded audio while it lasts, silence when the queue
//! stalls or the session is shutting down.
//!
//! Never sends anything to the control thread and never holds a lock
//! across the blocking packet wait.

use super::session::SessionShared;
use crate::media::AudioDecoder;
use crate::queue::{Packet, PopResult};
use crate::sync::{AudioClockSnapshot, DriftCorrector, SyncMode};
use crate::types::{AudioFormat, TimeBase};
use std::sync::Arc;
use std::time::Duration;

pub struct AudioRenderer {
    shared: Arc<SessionShared>,
    decoder: Box<dyn AudioDecoder>,
    format: AudioFormat,
    time_base: TimeBase,
    /// Current decoded block, interleaved i16 as bytes
    buffer: Vec<u8>,
    buffer_index: usize,
    /// Presentation time of the end of `buffer`
    audio_clock: f64,
    drift: DriftCorrector,
    stall_timeout: Option<Duration>,
}

impl AudioRenderer {
    pub(crate) fn new(
        shared: Arc<SessionShared>,
        decoder: Box<dyn AudioDecoder>,
        format: AudioFormat,
        time_base: TimeBase,
    ) -> Self {
        let config = &shared.config;
        let drift = DriftCorrector::new(&config.sync, format, config.audio.output_buffer_samples);
        let stall_timeout = config.audio.stall_timeout();
        Self {
            shared,
            decoder,
            format,
            time_base,
            buffer: Vec::new(),
            buffer_index: 0,
            audio_clock: 0.0,
            drift,
            stall_timeout,
        }
    }

    /// PCM layout `fill` produces
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Output buffer size the drift threshold assumes, in sample frames
    pub fn preferred_buffer_frames(&self) -> u32 {
        self.shared.config.audio.output_buffer_samples
    }

    /// Fill `out` completely with interleaved native-endian i16 samples
    pub fn fill(&mut self, out: &mut [u8]) {
        let mut written = 0;
        while written < out.len() {
            if self.buffer_index >= self.buffer.len() && !self.refill() {
                out[written..].fill(0);
                self.shared.stats.record_silence_fill();
                break;
            }

            let available = &self.buffer[self.buffer_index..];
            let n = available.len().min(out.len() - written);
            out[written..written + n].copy_from_slice(&available[..n]);
            written += n;
            self.buffer_index += n;
        }
        self.publish_clock();
    }

    /// Typed convenience for i16 output buffers
    pub fn fill_i16(&mut self, out: &mut [i16]) {
        self.fill(bytemuck::cast_slice_mut(out));
    }

    /// Decode the next block into `buffer`; false on quit or stall
    fn refill(&mut self) -> bool {
        let bytes_per_frame = self.format.bytes_per_frame().max(1);
        loop {
            let popped = match self.stall_timeout {
                Some(timeout) => self.shared.audio_queue.pop_timeout(timeout),
                None => self.shared.audio_queue.pop(true),
            };
            let packet = match popped {
                PopResult::Quit => return false,
                PopResult::Empty => {
                    log::trace!("[AUDIO] Packet queue starved");
                    return false;
                }
                PopResult::Packet(Packet::FlushMarker) => {
                    self.decoder.flush();
                    self.drift.reset();
                    self.buffer.clear();
                    self.buffer_index = 0;
                    log::debug!("[AUDIO] Decoder flushed");
                    continue;
                }
                PopResult::Packet(Packet::Data(packet)) => packet,
            };

            if let Some(pts) = packet.pts {
                self.audio_clock = self.time_base.ticks_to_seconds(pts);
            }

            let samples = match self.decoder.decode(&packet) {
                Ok(samples) => samples,
                Err(e) => {
                    self.shared.stats.record_decode_error();
                    log::debug!("[AUDIO] Dropping undecodable packet: {}", e);
                    continue;
                }
            };

            self.buffer.clear();
            self.buffer.extend_from_slice(bytemuck::cast_slice(&samples));
            let whole = self.buffer.len() / bytes_per_frame * bytes_per_frame;
            self.buffer.truncate(whole);
            if self.buffer.is_empty() {
                continue;
            }

            let bytes_per_second = self.format.bytes_per_second();
            if bytes_per_second > 0 {
                self.audio_clock += self.buffer.len() as f64 / bytes_per_second as f64;
            }
            self.synchronize_audio();
            self.buffer_index = 0;
            return true;
        }
    }

    /// Stretch the fresh block toward the master clock
    fn synchronize_audio(&mut self) {
        if self.shared.sync_mode() == SyncMode::AudioMaster {
            return;
        }
        // measured at the end of the new block, where the stretch lands
        let diff = self.audio_clock - self.shared.master_clock();
        self.drift.synchronize(&mut self.buffer, diff, self.format);
    }

    fn publish_clock(&self) {
        self.shared.clocks.publish_audio(AudioClockSnapshot {
            audio_clock: self.audio_clock,
            unconsumed_bytes: self.buffer.len() - self.buffer_index.min(self.buffer.len()),
            bytes_per_second: self.format.bytes_per_second(),
        });
    }
}
