//! Video decode thread
//!
//! Pops coded packets, decodes them, stamps each frame with a presentation
//! time and pushes it into the picture queue (blocking while it is full).
//!
//! Decoders with reordering latency emit frames for earlier submissions.
//! Each packet's pts is remembered in a side table keyed by submission
//! number, and looked up again when the decoder reports which submission
//! a frame came from.

use super::controller::ControlEvent;
use super::session::SessionShared;
use crate::media::{PixelConverter, VideoDecoder};
use crate::queue::{CodedPacket, Packet, PopResult};
use crate::types::TimeBase;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Entries kept for submissions whose frame never came out
const MAX_PENDING_PTS: usize = 64;

/// Submission number → packet pts, oldest evicted first
#[derive(Debug, Default)]
pub struct PtsSideTable {
    entries: BTreeMap<u64, Option<i64>>,
}

impl PtsSideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, submission: u64, pts: Option<i64>) {
        self.entries.insert(submission, pts);
        while self.entries.len() > MAX_PENDING_PTS {
            self.entries.pop_first();
        }
    }

    /// Consume the pts recorded for `submission`
    pub fn take(&mut self, submission: u64) -> Option<i64> {
        self.entries.remove(&submission).flatten()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Frame timestamp in stream ticks: side table, then packet dts, then 0
pub fn resolve_pts(side_table: Option<i64>, dts: Option<i64>) -> i64 {
    side_table.or(dts).unwrap_or(0)
}

/// Running estimate of the next frame's presentation time
#[derive(Debug, Clone, Copy)]
pub struct VideoClock {
    clock: f64,
    frame_duration: f64,
}

impl VideoClock {
    pub fn new(frame_duration: f64) -> Self {
        Self {
            clock: 0.0,
            frame_duration,
        }
    }

    /// Presentation time for a frame whose resolved pts is `pts` seconds
    ///
    /// A zero pts means unknown and takes the running estimate. The
    /// estimate then advances by one frame plus half a frame per repeat.
    pub fn synchronize(&mut self, pts: f64, repeat_pict: u32) -> f64 {
        let pts = if pts != 0.0 {
            self.clock = pts;
            pts
        } else {
            self.clock
        };
        let frame_delay =
            self.frame_duration + repeat_pict as f64 * self.frame_duration * 0.5;
        self.clock += frame_delay;
        pts
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }
}

pub(crate) struct VideoDecodeWorker {
    shared: Arc<SessionShared>,
    decoder: Box<dyn VideoDecoder>,
    converter: Box<dyn PixelConverter>,
    time_base: TimeBase,
    pts_table: PtsSideTable,
    clock: VideoClock,
    next_submission: u64,
}

impl VideoDecodeWorker {
    pub fn new(
        shared: Arc<SessionShared>,
        decoder: Box<dyn VideoDecoder>,
        converter: Box<dyn PixelConverter>,
    ) -> Self {
        let stream = shared.video_stream();
        let time_base = stream.map(|s| s.time_base).unwrap_or_default();
        let frame_duration = stream
            .and_then(|s| s.video)
            .map(|v| v.frame_duration)
            .filter(|d| *d > 0.0)
            .unwrap_or(shared.config.sync.initial_frame_delay);

        Self {
            shared,
            decoder,
            converter,
            time_base,
            pts_table: PtsSideTable::new(),
            clock: VideoClock::new(frame_duration),
            next_submission: 0,
        }
    }

    pub fn run(mut self) {
        log::info!("[VIDEO] Thread started");
        let mut frames = 0u64;

        loop {
            let packet = match self.shared.video_queue.pop(true) {
                PopResult::Quit => break,
                PopResult::Empty => continue,
                PopResult::Packet(Packet::FlushMarker) => {
                    self.decoder.flush();
                    self.pts_table.clear();
                    log::debug!("[VIDEO] Decoder flushed");
                    continue;
                }
                PopResult::Packet(Packet::Data(packet)) => packet,
            };

            match self.decode_packet(&packet) {
                Some(true) => frames += 1,
                Some(false) => {}
                None => break,
            }
        }

        log::info!("[VIDEO] Thread exiting after {} frames", frames);
        self.shared.notify(ControlEvent::VideoFinished);
    }

    /// Some(produced a frame), or None once the picture queue is aborted
    fn decode_packet(&mut self, packet: &CodedPacket) -> Option<bool> {
        let submission = self.next_submission;
        self.next_submission += 1;
        self.pts_table.record(submission, packet.pts);

        let frame = match self.decoder.decode(submission, packet) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Some(false),
            Err(e) => {
                self.shared.stats.record_decode_error();
                log::debug!("[VIDEO] Dropping undecodable packet: {}", e);
                return Some(false);
            }
        };

        let side = frame.submission.and_then(|s| self.pts_table.take(s));
        let ticks = resolve_pts(side, packet.dts);
        let pts = self
            .clock
            .synchronize(self.time_base.ticks_to_seconds(ticks), frame.repeat_pict);

        let shared = &self.shared;
        shared
            .pictures
            .push(&frame, pts, self.converter.as_mut(), |request| {
                shared.notify(ControlEvent::AllocPicture(request))
            })
            .ok()
            .map(|()| true)
    }
}
