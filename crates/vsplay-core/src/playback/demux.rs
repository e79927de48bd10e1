//! Demux thread
//!
//! Sole producer for both packet queues. Each iteration services at most
//! one of: a pending seek, backpressure, or one packet read.

use super::controller::ControlEvent;
use super::seek::SeekRequest;
use super::session::SessionShared;
use crate::error::SourceError;
use crate::media::{Demuxer, ReadOutcome};
use crate::queue::{CodedPacket, Packet};
use crate::types::{MediaKind, TimeBase};
use std::sync::Arc;
use std::thread;

/// What one loop iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DemuxStep {
    Quit,
    Seeked,
    Backpressure,
    Routed(MediaKind),
    Discarded,
    EndOfStream,
}

pub(crate) struct DemuxProducer {
    shared: Arc<SessionShared>,
    demuxer: Box<dyn Demuxer>,
    packets_read: u64,
}

impl DemuxProducer {
    pub fn new(shared: Arc<SessionShared>, demuxer: Box<dyn Demuxer>) -> Self {
        Self {
            shared,
            demuxer,
            packets_read: 0,
        }
    }

    pub fn run(mut self) {
        log::info!("[DEMUX] Thread started");
        let config = self.shared.config.demux.clone();

        loop {
            match self.step() {
                Ok(DemuxStep::Quit) => break,
                Ok(DemuxStep::Backpressure) => thread::sleep(config.backpressure_sleep()),
                Ok(DemuxStep::EndOfStream) => thread::sleep(config.eof_retry()),
                Ok(_) => {}
                Err(e) => {
                    log::error!("[DEMUX] Read failed: {}", e);
                    self.shared.notify(ControlEvent::SourceFailed(e.to_string()));
                    break;
                }
            }
        }

        // parked until the session is torn down
        while !self.shared.is_quitting() {
            thread::sleep(config.park_interval());
        }
        log::info!("[DEMUX] Thread exiting after {} packets", self.packets_read);
        self.shared.notify(ControlEvent::DemuxFinished);
    }

    /// One loop iteration
    pub fn step(&mut self) -> Result<DemuxStep, SourceError> {
        if self.shared.is_quitting() {
            return Ok(DemuxStep::Quit);
        }

        // seeks flush the queues, so they go ahead of backpressure
        if let Some(request) = self.shared.seek.pending() {
            self.perform_seek(request);
            return Ok(DemuxStep::Seeked);
        }

        let audio_queue = &self.shared.audio_queue;
        let video_queue = &self.shared.video_queue;
        if let Some(full) = [audio_queue, video_queue].into_iter().find(|q| q.is_over_cap()) {
            log::trace!(
                "[DEMUX] {} queue over cap ({} > {} bytes), backing off",
                full.name(),
                full.size(),
                full.byte_cap()
            );
            return Ok(DemuxStep::Backpressure);
        }

        match self.demuxer.read_packet()? {
            ReadOutcome::Packet(packet) => {
                self.packets_read += 1;
                Ok(self.route(packet))
            }
            ReadOutcome::EndOfStream => {
                if !self.shared.end_of_input() {
                    log::info!("[DEMUX] End of stream after {} packets", self.packets_read);
                    self.shared.set_end_of_input(true);
                }
                Ok(DemuxStep::EndOfStream)
            }
        }
    }

    fn perform_seek(&mut self, request: SeekRequest) {
        let shared = &self.shared;
        let Some(stream) = shared.video_stream().or(shared.audio_stream()) else {
            shared.finish_seek();
            return;
        };

        let target = TimeBase::MICROSECONDS.rescale(request.position_us, stream.time_base);
        match self.demuxer.seek(stream.index, target, request.direction) {
            Ok(()) => {
                let dropped_audio = match shared.audio_stream() {
                    Some(_) => shared.audio_queue.flush_with_marker(),
                    None => 0,
                };
                let dropped_video = match shared.video_stream() {
                    Some(_) => shared.video_queue.flush_with_marker(),
                    None => 0,
                };
                shared.set_end_of_input(false);
                shared.stats.record_seek(true);
                log::info!(
                    "[SEEK] At {:.3}s ({} audio, {} video packets dropped)",
                    request.position_secs(),
                    dropped_audio,
                    dropped_video
                );
            }
            Err(e) => {
                shared.stats.record_seek(false);
                log::warn!("[SEEK] Seek to {:.3}s failed: {}", request.position_secs(), e);
            }
        }
        shared.finish_seek();
    }

    fn route(&self, packet: CodedPacket) -> DemuxStep {
        let shared = &self.shared;
        let index = packet.stream_index;

        if shared.video_stream().is_some_and(|s| s.index == index) {
            shared.video_queue.push(Packet::Data(packet));
            shared.stats.record_video_packet();
            DemuxStep::Routed(MediaKind::Video)
        } else if shared.audio_stream().is_some_and(|s| s.index == index) {
            shared.audio_queue.push(Packet::Data(packet));
            shared.stats.record_audio_packet();
            DemuxStep::Routed(MediaKind::Audio)
        } else {
            shared.stats.record_discarded_packet();
            DemuxStep::Discarded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlaybackConfig;
    use crate::media::testsrc::{TestDemuxer, TestSourceConfig};
    use crate::media::SeekDirection;
    use crate::playback::SessionState;
    use crate::queue::PopResult;
    use crate::types::select_stream;

    fn producer(
        source: TestSourceConfig,
        config: PlaybackConfig,
    ) -> (DemuxProducer, Arc<SessionShared>) {
        let demuxer = TestDemuxer::new(source);
        let streams = demuxer.streams().to_vec();
        let (tx, _rx) = crossbeam::channel::unbounded();
        let shared = Arc::new(SessionShared::new(
            config,
            select_stream(&streams, MediaKind::Audio).cloned(),
            select_stream(&streams, MediaKind::Video).cloned(),
            tx,
        ));
        (DemuxProducer::new(Arc::clone(&shared), Box::new(demuxer)), shared)
    }

    fn drain(queue: &crate::queue::PacketQueue) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let PopResult::Packet(p) = queue.pop(false) {
            packets.push(p);
        }
        packets
    }

    #[test]
    fn test_routes_by_stream_and_discards_others() {
        let (mut demux, shared) = producer(
            TestSourceConfig {
                data_stream: true,
                ..Default::default()
            },
            PlaybackConfig::default(),
        );

        let steps: Vec<_> = (0..20).map(|_| demux.step().unwrap()).collect();
        assert!(steps.contains(&DemuxStep::Routed(MediaKind::Video)));
        assert!(steps.contains(&DemuxStep::Routed(MediaKind::Audio)));
        assert!(steps.contains(&DemuxStep::Discarded));

        assert!(drain(&shared.video_queue).iter().all(|p| match p {
            Packet::Data(p) => p.stream_index == 0,
            Packet::FlushMarker => false,
        }));
        assert!(drain(&shared.audio_queue).iter().all(|p| match p {
            Packet::Data(p) => p.stream_index == 1,
            Packet::FlushMarker => false,
        }));
        assert_eq!(shared.stats.snapshot().packets_discarded, 1);
    }

    #[test]
    fn test_seek_mid_loop_flushes_with_single_marker() {
        let (mut demux, shared) = producer(TestSourceConfig::default(), PlaybackConfig::default());
        for _ in 0..30 {
            demux.step().unwrap();
        }
        assert!(shared.audio_queue.len() > 1);
        assert!(shared.video_queue.len() > 1);

        assert!(shared.request_seek(SeekRequest {
            position_us: 2_000_000,
            direction: SeekDirection::Forward,
        }));
        assert!(!shared.request_seek(SeekRequest {
            position_us: 8_000_000,
            direction: SeekDirection::Forward,
        }));

        assert_eq!(demux.step().unwrap(), DemuxStep::Seeked);
        assert!(!shared.seek.is_pending());
        assert_eq!(shared.state(), SessionState::Playing);
        assert_eq!(shared.audio_queue.len(), 1);
        assert_eq!(shared.video_queue.len(), 1);
        assert_eq!(shared.audio_queue.size(), 0);

        for _ in 0..30 {
            demux.step().unwrap();
        }
        let video = drain(&shared.video_queue);
        let audio = drain(&shared.audio_queue);
        assert_eq!(video[0], Packet::FlushMarker);
        assert_eq!(audio[0], Packet::FlushMarker);
        for packet in video.iter().skip(1) {
            match packet {
                Packet::Data(p) => assert!(p.pts.unwrap() >= 50),
                Packet::FlushMarker => panic!("second marker"),
            }
        }
        for packet in audio.iter().skip(1) {
            match packet {
                Packet::Data(p) => assert!(p.pts.unwrap() >= 96_000),
                Packet::FlushMarker => panic!("second marker"),
            }
        }
        assert_eq!(shared.stats.snapshot().seeks_completed, 1);
    }

    #[test]
    fn test_failed_seek_clears_pending_and_keeps_queues() {
        let (mut demux, shared) = producer(
            TestSourceConfig {
                fail_seeks: true,
                ..Default::default()
            },
            PlaybackConfig::default(),
        );
        for _ in 0..10 {
            demux.step().unwrap();
        }
        let queued = shared.video_queue.len() + shared.audio_queue.len();

        shared.request_seek(SeekRequest {
            position_us: 1_000_000,
            direction: SeekDirection::Backward,
        });
        assert_eq!(demux.step().unwrap(), DemuxStep::Seeked);
        assert!(!shared.seek.is_pending());
        assert_eq!(shared.video_queue.len() + shared.audio_queue.len(), queued);
        assert_eq!(shared.stats.snapshot().seeks_failed, 1);
    }

    #[test]
    fn test_backpressure_stops_reading() {
        let mut config = PlaybackConfig::default();
        config.queues.max_video_queue_bytes = 5000;
        let (mut demux, shared) = producer(TestSourceConfig::default(), config);

        let mut steps = Vec::new();
        for _ in 0..10 {
            steps.push(demux.step().unwrap());
        }
        // two 4 KiB video packets put the queue over its cap
        assert_eq!(shared.video_queue.len(), 2);
        assert_eq!(steps.last(), Some(&DemuxStep::Backpressure));
        assert!(shared.video_queue.is_over_cap() && !shared.audio_queue.is_over_cap());
        assert_eq!(shared.video_queue.name(), "video");

        drain(&shared.video_queue);
        assert_ne!(demux.step().unwrap(), DemuxStep::Backpressure);
    }

    #[test]
    fn test_end_of_stream_is_reported_and_retried() {
        let (mut demux, shared) = producer(
            TestSourceConfig {
                duration_secs: 0.1,
                ..Default::default()
            },
            PlaybackConfig::default(),
        );
        let mut steps = 0;
        while demux.step().unwrap() != DemuxStep::EndOfStream {
            steps += 1;
            assert!(steps < 100);
        }
        assert!(shared.end_of_input());
        assert_eq!(demux.step().unwrap(), DemuxStep::EndOfStream);

        // seeking back re-arms the source
        shared.request_seek(SeekRequest {
            position_us: 0,
            direction: SeekDirection::Backward,
        });
        demux.step().unwrap();
        assert!(!shared.end_of_input());
        assert!(matches!(demux.step().unwrap(), DemuxStep::Routed(_)));
    }

    #[test]
    fn test_read_error_is_returned() {
        let (mut demux, _shared) = producer(
            TestSourceConfig {
                fail_after_packets: Some(2),
                ..Default::default()
            },
            PlaybackConfig::default(),
        );
        demux.step().unwrap();
        demux.step().unwrap();
        assert!(matches!(demux.step(), Err(SourceError::Io(_))));
    }

    #[test]
    fn test_quit_stops_loop() {
        let (mut demux, shared) = producer(TestSourceConfig::default(), PlaybackConfig::default());
        shared.request_quit();
        assert_eq!(demux.step().unwrap(), DemuxStep::Quit);
    }
}
