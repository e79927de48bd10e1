//! Playback session
//!
//! One session per open source. [`SessionShared`] holds everything the
//! threads share; each field carries its own lock (or is atomic), and no
//! code path holds two of them at once.
//!
//! State machine:
//!
//! ```text
//!   Opening ──▶ Playing ⇄ Seeking
//!                  │          │
//!                  ▼          ▼
//!               Quitting ──▶ Closed
//! ```

use super::audio::AudioRenderer;
use super::controller::{CommandHandle, ControlEvent, Controller};
use super::demux::DemuxProducer;
use super::seek::{SeekController, SeekRequest};
use super::stats::{PlaybackStats, StatsSnapshot};
use super::video::VideoDecodeWorker;
use crate::config::PlaybackConfig;
use crate::error::{DecodeError, PlaybackError, PlaybackResult};
use crate::media::{Demuxer, DisplaySurface, MediaBackend, PixelConverter, VideoDecoder};
use crate::queue::{PacketQueue, PictureQueue};
use crate::sync::{ClockState, SyncMode};
use crate::types::{select_stream, MediaKind, StreamInfo};
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Opening = 0,
    Playing = 1,
    Seeking = 2,
    Quitting = 3,
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Playing,
            2 => SessionState::Seeking,
            3 => SessionState::Quitting,
            4 => SessionState::Closed,
            _ => SessionState::Opening,
        }
    }
}

/// State shared by every playback thread
pub struct SessionShared {
    pub(crate) config: PlaybackConfig,
    pub(crate) audio_queue: PacketQueue,
    pub(crate) video_queue: PacketQueue,
    pub(crate) pictures: PictureQueue,
    pub(crate) clocks: ClockState,
    pub(crate) seek: SeekController,
    pub(crate) stats: PlaybackStats,
    audio_stream: Option<StreamInfo>,
    video_stream: Option<StreamInfo>,
    sync_mode: SyncMode,
    quit: AtomicBool,
    end_of_input: AtomicBool,
    state: AtomicU8,
    control_tx: Sender<ControlEvent>,
}

impl SessionShared {
    pub(crate) fn new(
        config: PlaybackConfig,
        audio_stream: Option<StreamInfo>,
        video_stream: Option<StreamInfo>,
        control_tx: Sender<ControlEvent>,
    ) -> Self {
        let sync_mode = effective_sync_mode(
            config.sync.mode,
            audio_stream.is_some(),
            video_stream.is_some(),
        );
        if sync_mode != config.sync.mode {
            log::info!(
                "[SESSION] {:?} unavailable for this source, using {:?}",
                config.sync.mode,
                sync_mode
            );
        }

        Self {
            audio_queue: PacketQueue::new("audio", config.queues.max_audio_queue_bytes),
            video_queue: PacketQueue::new("video", config.queues.max_video_queue_bytes),
            pictures: PictureQueue::new(config.queues.picture_queue_capacity),
            clocks: ClockState::new(),
            seek: SeekController::new(),
            stats: PlaybackStats::new(),
            audio_stream,
            video_stream,
            sync_mode,
            quit: AtomicBool::new(false),
            end_of_input: AtomicBool::new(false),
            state: AtomicU8::new(SessionState::Opening as u8),
            control_tx,
            config,
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn audio_stream(&self) -> Option<&StreamInfo> {
        self.audio_stream.as_ref()
    }

    pub fn video_stream(&self) -> Option<&StreamInfo> {
        self.video_stream.as_ref()
    }

    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }

    pub fn clocks(&self) -> &ClockState {
        &self.clocks
    }

    /// Sync mode in effect (the configured one, adjusted for missing streams)
    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn master_clock(&self) -> f64 {
        self.clocks.master_clock(self.sync_mode)
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_quitting(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    /// Enter `Quitting` and wake every blocked thread
    pub fn request_quit(&self) {
        if self.quit.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("[SESSION] Quitting");
        self.set_state(SessionState::Quitting);
        self.audio_queue.abort();
        self.video_queue.abort();
        self.pictures.abort();
    }

    /// Queue a seek; ignored while another one is pending
    pub fn request_seek(&self, request: SeekRequest) -> bool {
        if self.is_quitting() || !self.seek.request_seek(request) {
            return false;
        }
        self.set_state(SessionState::Seeking);
        true
    }

    /// Leave `Opening` and restart the session clock from zero
    ///
    /// A seek or quit requested while opening keeps its state.
    pub(crate) fn start_playback(&self) {
        self.clocks.restart();
        let _ = self.state.compare_exchange(
            SessionState::Opening as u8,
            SessionState::Playing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn finish_seek(&self) {
        self.seek.complete();
        // a concurrent quit must not be overwritten
        let _ = self.state.compare_exchange(
            SessionState::Seeking as u8,
            SessionState::Playing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn end_of_input(&self) -> bool {
        self.end_of_input.load(Ordering::Acquire)
    }

    pub(crate) fn set_end_of_input(&self, reached: bool) {
        self.end_of_input.store(reached, Ordering::Release);
    }

    /// Post an event to the control thread
    pub(crate) fn notify(&self, event: ControlEvent) {
        if self.control_tx.send(event).is_err() {
            log::debug!("[SESSION] Control thread gone, event dropped");
        }
    }

    pub(crate) fn command_handle(&self) -> CommandHandle {
        CommandHandle::new(self.control_tx.clone())
    }
}

/// Fall back to a clock that can actually advance
fn effective_sync_mode(requested: SyncMode, has_audio: bool, has_video: bool) -> SyncMode {
    match requested {
        SyncMode::AudioMaster if !has_audio => SyncMode::VideoMaster,
        SyncMode::VideoMaster if !has_video => SyncMode::AudioMaster,
        mode => mode,
    }
}

/// What a finished session reports
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSummary {
    pub stats: StatsSnapshot,
    /// Master clock when playback stopped (seconds)
    pub position: f64,
}

/// An opened source, ready to play
pub struct PlaybackSession {
    shared: Arc<SessionShared>,
    demuxer: Box<dyn Demuxer>,
    video_decoder: Option<Box<dyn VideoDecoder>>,
    audio_renderer: Option<AudioRenderer>,
    control_rx: Receiver<ControlEvent>,
}

impl PlaybackSession {
    /// Open `source`, select the first audio and video streams and open
    /// their decoders
    pub fn open(
        backend: &dyn MediaBackend,
        source: &str,
        config: PlaybackConfig,
    ) -> PlaybackResult<Self> {
        log::info!("[SESSION] Opening {}", source);
        let demuxer = backend.open_demuxer(source)?;

        let streams = demuxer.streams();
        let audio_stream = select_stream(streams, MediaKind::Audio).cloned();
        let video_stream = select_stream(streams, MediaKind::Video).cloned();
        if audio_stream.is_none() && video_stream.is_none() {
            return Err(PlaybackError::NoPlayableStreams);
        }

        let audio_decoder = match &audio_stream {
            Some(stream) => {
                let format = stream
                    .audio
                    .ok_or_else(|| DecodeError::Open("audio stream has no sample format".into()))?;
                Some((backend.open_audio_decoder(stream)?, format, stream.time_base))
            }
            None => None,
        };
        let video_decoder = match &video_stream {
            Some(stream) => Some(backend.open_video_decoder(stream)?),
            None => None,
        };

        log::info!(
            "[SESSION] Streams: audio={:?} video={:?}",
            audio_stream.as_ref().map(|s| (s.index, s.codec.as_str())),
            video_stream.as_ref().map(|s| (s.index, s.codec.as_str())),
        );

        let (control_tx, control_rx) = channel::unbounded();
        let shared = Arc::new(SessionShared::new(
            config,
            audio_stream,
            video_stream,
            control_tx,
        ));
        let audio_renderer = audio_decoder.map(|(decoder, format, time_base)| {
            AudioRenderer::new(Arc::clone(&shared), decoder, format, time_base)
        });

        Ok(Self {
            shared,
            demuxer,
            video_decoder,
            audio_renderer,
            control_rx,
        })
    }

    /// The audio pull path, to be driven by the output device
    ///
    /// Must be taken and started before [`run`](Self::run) when the source
    /// has audio, otherwise the audio queue fills and demuxing stalls.
    pub fn take_audio_renderer(&mut self) -> Option<AudioRenderer> {
        self.audio_renderer.take()
    }

    pub fn commands(&self) -> CommandHandle {
        self.shared.command_handle()
    }

    pub fn shared(&self) -> Arc<SessionShared> {
        Arc::clone(&self.shared)
    }

    /// Play until quit, on the calling thread
    ///
    /// Spawns the demux and video threads, runs the refresh timer and
    /// command loop, then joins everything. A source failure mid-stream is
    /// returned as [`PlaybackError::Aborted`] after a clean shutdown.
    pub fn run(
        self,
        display: &mut dyn DisplaySurface,
        converter: Box<dyn PixelConverter>,
    ) -> PlaybackResult<PlaybackSummary> {
        let PlaybackSession {
            shared,
            demuxer,
            video_decoder,
            audio_renderer,
            control_rx,
        } = self;

        if audio_renderer.is_some() {
            log::warn!("[SESSION] Audio renderer was never started, audio will not be consumed");
        }
        drop(audio_renderer);

        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(2);

        let demux = DemuxProducer::new(Arc::clone(&shared), demuxer);
        workers.push(spawn_worker(&shared, "vsplay-demux", move || demux.run())?);

        if let Some(decoder) = video_decoder {
            let worker = VideoDecodeWorker::new(Arc::clone(&shared), decoder, converter);
            match spawn_worker(&shared, "vsplay-video", move || worker.run()) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shared.request_quit();
                    join_workers(workers);
                    return Err(e);
                }
            }
        }

        shared.start_playback();
        let fatal = Controller::new(&shared, control_rx, display).run();

        let position = shared.master_clock();
        shared.request_quit();
        join_workers(workers);
        shared.set_state(SessionState::Closed);

        let stats = shared.stats.snapshot();
        log::info!(
            "[SESSION] Closed at {:.3}s: {} frames shown, {} seeks, {} decode errors",
            position,
            stats.frames_displayed,
            stats.seeks_completed,
            stats.decode_errors
        );

        match fatal {
            Some(reason) => Err(PlaybackError::Aborted(reason)),
            None => Ok(PlaybackSummary { stats, position }),
        }
    }
}

fn spawn_worker<F>(
    shared: &SessionShared,
    name: &'static str,
    body: F,
) -> PlaybackResult<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| {
            log::error!("[SESSION] Failed to spawn {} thread: {}", name, source);
            shared.request_quit();
            PlaybackError::ThreadSpawn { name, source }
        })
}

fn join_workers(workers: Vec<JoinHandle<()>>) {
    for handle in workers {
        let name = handle.thread().name().unwrap_or("worker").to_string();
        if handle.join().is_err() {
            log::error!("[SESSION] {} thread panicked", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testsrc::{TestSourceBackend, TestSourceConfig};
    use crate::media::{PassthroughConverter, PictureBuffer};
    use crate::queue::DecodedPicture;
    use crate::media::SeekDirection;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingDisplay {
        /// (pts, first pixel) per blit
        shown: Vec<(f64, u8)>,
        shown_at: Vec<Instant>,
        allocations: usize,
    }

    impl DisplaySurface for RecordingDisplay {
        fn allocate_surface(&mut self, width: u32, height: u32) -> PictureBuffer {
            self.allocations += 1;
            PictureBuffer::new(width, height, (width * height) as usize)
        }

        fn blit(&mut self, picture: &DecodedPicture) {
            let pixel = picture.buffer.data.first().copied().unwrap_or(0);
            self.shown.push((picture.pts, pixel));
            self.shown_at.push(Instant::now());
        }
    }

    fn small_source() -> TestSourceConfig {
        TestSourceConfig {
            duration_secs: 0.4,
            width: 8,
            height: 8,
            video_packet_bytes: 64,
            sample_rate: 8_000,
            channels: 1,
            audio_packet_frames: 400,
            ..Default::default()
        }
    }

    fn exit_on_eof() -> PlaybackConfig {
        let mut config = PlaybackConfig::default();
        config.demux.exit_on_eof = true;
        config
    }

    fn open(source: TestSourceConfig, config: PlaybackConfig) -> PlaybackSession {
        let backend = TestSourceBackend::new(source);
        PlaybackSession::open(&backend, "testsrc", config).unwrap()
    }

    /// Stand-in for an output device, pulling faster than real time
    fn start_audio_sink(session: &mut PlaybackSession) -> Option<JoinHandle<()>> {
        let mut renderer = session.take_audio_renderer()?;
        let shared = session.shared();
        Some(thread::spawn(move || {
            let mut buffer = vec![0u8; 512];
            while !shared.is_quitting() {
                renderer.fill(&mut buffer);
                thread::sleep(Duration::from_millis(2));
            }
        }))
    }

    fn play(mut session: PlaybackSession) -> (PlaybackResult<PlaybackSummary>, RecordingDisplay) {
        let sink = start_audio_sink(&mut session);
        let mut display = RecordingDisplay::default();
        let result = session.run(&mut display, Box::new(PassthroughConverter));
        if let Some(sink) = sink {
            sink.join().unwrap();
        }
        (result, display)
    }

    #[test]
    fn test_plays_to_end_in_order() {
        let session = open(small_source(), exit_on_eof());
        let shared = session.shared();
        assert_eq!(shared.state(), SessionState::Opening);

        let (result, display) = play(session);
        let summary = result.unwrap();

        assert_eq!(shared.state(), SessionState::Closed);
        assert!(display.shown.len() >= 8, "only {} frames shown", display.shown.len());
        assert_eq!(summary.stats.frames_displayed, display.shown.len() as u64);
        for (i, (pts, pixel)) in display.shown.iter().enumerate() {
            assert!((pts - i as f64 * 0.04).abs() < 1e-9);
            assert_eq!(*pixel, i as u8);
        }
        // both slots allocated once, frame size never changes
        assert_eq!(display.allocations, 2);
        assert!(summary.stats.audio_packets > 0);
    }

    #[test]
    fn test_decoder_latency_keeps_timestamps() {
        let source = TestSourceConfig {
            decoder_delay: 2,
            audio: false,
            ..small_source()
        };
        let (result, display) = play(open(source, exit_on_eof()));
        result.unwrap();

        // the last two frames stay inside the decoder
        assert!(display.shown.len() >= 6 && display.shown.len() <= 8);
        for (i, (pts, pixel)) in display.shown.iter().enumerate() {
            assert!((pts - i as f64 * 0.04).abs() < 1e-9);
            assert_eq!(*pixel, i as u8);
        }
    }

    #[test]
    fn test_seek_command_jumps_forward() {
        let source = TestSourceConfig {
            duration_secs: 20.0,
            audio: false,
            ..small_source()
        };
        let session = open(source, PlaybackConfig::default());
        let shared = session.shared();
        let commands = session.commands();

        let driver = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            assert!(commands.seek(5.0));
            thread::sleep(Duration::from_millis(400));
            commands.quit();
        });
        let (result, display) = play(session);
        driver.join().unwrap();

        let summary = result.unwrap();
        assert_eq!(summary.stats.seeks_completed, 1);
        assert!(!shared.seek.is_pending());
        let first_after_jump = display
            .shown
            .windows(2)
            .position(|w| w[1].0 - w[0].0 > 1.0)
            .expect("no jump in displayed pts");
        assert!(display.shown[first_after_jump + 1].0 >= 5.0);
    }

    #[test]
    fn test_source_failure_aborts_session() {
        let source = TestSourceConfig {
            fail_after_packets: Some(5),
            audio: false,
            ..small_source()
        };
        let session = open(source, PlaybackConfig::default());
        let shared = session.shared();
        let (result, _display) = play(session);

        assert!(matches!(result, Err(PlaybackError::Aborted(_))));
        assert_eq!(shared.state(), SessionState::Closed);
    }

    #[test]
    fn test_quit_command_stops_playback() {
        let session = open(
            TestSourceConfig {
                duration_secs: 60.0,
                ..small_source()
            },
            PlaybackConfig::default(),
        );
        let commands = session.commands();
        let quitter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            commands.quit();
        });
        let (result, display) = play(session);
        quitter.join().unwrap();

        result.unwrap();
        assert!(!display.shown.is_empty());
    }

    #[test]
    fn test_audio_only_session() {
        let source = TestSourceConfig {
            video: false,
            ..small_source()
        };
        let session = open(source, exit_on_eof());
        let shared = session.shared();
        // video master is impossible without video
        assert_eq!(shared.sync_mode(), SyncMode::AudioMaster);

        let (result, display) = play(session);
        let summary = result.unwrap();
        assert!(display.shown.is_empty());
        assert!(summary.stats.audio_packets >= 8);
        assert!(summary.position > 0.0);
    }

    #[test]
    fn test_external_clock_starts_with_playback() {
        let source = TestSourceConfig {
            duration_secs: 1.0,
            audio: false,
            ..small_source()
        };
        let mut config = exit_on_eof();
        config.sync.mode = SyncMode::ExternalMaster;
        let session = open(source, config);
        assert_eq!(session.shared().sync_mode(), SyncMode::ExternalMaster);

        // a slow caller between open and run must not make frames late
        thread::sleep(Duration::from_millis(600));
        let (result, display) = play(session);
        result.unwrap();

        assert!(display.shown.len() >= 10, "only {} frames shown", display.shown.len());
        assert!(display.shown[0].0 < 1e-9);
        // nine frame periods at 25 fps are 0.36s; late frames go out back to back
        let spread = display.shown_at[9] - display.shown_at[0];
        assert!(spread >= Duration::from_millis(250), "frames 0..9 shown within {:?}", spread);
    }

    #[test]
    fn test_start_playback_keeps_seek_and_quit() {
        let session = open(small_source(), PlaybackConfig::default());
        let shared = session.shared();
        assert!(shared.request_seek(SeekRequest {
            position_us: 200_000,
            direction: SeekDirection::Forward,
        }));
        assert_eq!(shared.state(), SessionState::Seeking);
        shared.start_playback();
        assert_eq!(shared.state(), SessionState::Seeking);
        shared.finish_seek();
        assert_eq!(shared.state(), SessionState::Playing);

        let session = open(small_source(), PlaybackConfig::default());
        let shared = session.shared();
        shared.request_quit();
        shared.start_playback();
        assert_eq!(shared.state(), SessionState::Quitting);

        let session = open(small_source(), PlaybackConfig::default());
        let shared = session.shared();
        shared.start_playback();
        assert_eq!(shared.state(), SessionState::Playing);
    }

    #[test]
    fn test_no_playable_streams() {
        let backend = TestSourceBackend::new(TestSourceConfig {
            video: false,
            audio: false,
            data_stream: true,
            ..Default::default()
        });
        let result = PlaybackSession::open(&backend, "testsrc", PlaybackConfig::default());
        assert!(matches!(result, Err(PlaybackError::NoPlayableStreams)));
    }

    #[test]
    fn test_effective_sync_mode() {
        assert_eq!(effective_sync_mode(SyncMode::AudioMaster, false, true), SyncMode::VideoMaster);
        assert_eq!(effective_sync_mode(SyncMode::VideoMaster, true, false), SyncMode::AudioMaster);
        assert_eq!(effective_sync_mode(SyncMode::ExternalMaster, true, false), SyncMode::ExternalMaster);
        assert_eq!(effective_sync_mode(SyncMode::AudioMaster, true, true), SyncMode::AudioMaster);
    }
}
