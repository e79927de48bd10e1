//! Control thread: refresh timer and command processing
//!
//! The refresh timer is a deadline on the event channel. Each timeout
//! shows at most one picture and computes the next deadline, so the timer
//! re-arms itself with a delay that adapts every cycle. Events (commands,
//! display allocation requests, worker failures) are handled between
//! timeouts.

use super::seek::relative_seek_target;
use super::session::SessionShared;
use crate::media::DisplaySurface;
use crate::queue::AllocRequest;
use crate::sync::{RefreshScheduler, SyncMode};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// Messages handled by the control thread
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Seek by this many seconds relative to the master clock
    Seek(f64),
    Quit,
    /// The video thread needs a display buffer for a picture slot
    AllocPicture(AllocRequest),
    /// The source failed; playback must stop
    SourceFailed(String),
    DemuxFinished,
    VideoFinished,
}

/// User-facing command surface for a running session
#[derive(Debug, Clone)]
pub struct CommandHandle {
    tx: Sender<ControlEvent>,
}

impl CommandHandle {
    pub(crate) fn new(tx: Sender<ControlEvent>) -> Self {
        Self { tx }
    }

    /// Seek relative to the current playback position
    ///
    /// Returns false once the session has closed.
    pub fn seek(&self, relative_seconds: f64) -> bool {
        self.tx.send(ControlEvent::Seek(relative_seconds)).is_ok()
    }

    /// Stop playback
    pub fn quit(&self) -> bool {
        self.tx.send(ControlEvent::Quit).is_ok()
    }
}

pub(crate) struct Controller<'a> {
    shared: &'a SessionShared,
    events: Receiver<ControlEvent>,
    display: &'a mut dyn DisplaySurface,
    scheduler: RefreshScheduler,
    fatal: Option<String>,
}

impl<'a> Controller<'a> {
    pub fn new(
        shared: &'a SessionShared,
        events: Receiver<ControlEvent>,
        display: &'a mut dyn DisplaySurface,
    ) -> Self {
        let scheduler = RefreshScheduler::new(&shared.config.sync, shared.clocks.now());
        Self {
            shared,
            events,
            display,
            scheduler,
            fatal: None,
        }
    }

    /// Run until the session quits; returns the fatal error, if any
    pub fn run(mut self) -> Option<String> {
        let mut next_refresh = Instant::now() + self.shared.config.sync.initial_refresh();

        while !self.shared.is_quitting() {
            match self.events.recv_deadline(next_refresh) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {
                    let delay = self.refresh();
                    next_refresh = Instant::now() + delay;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.fatal
    }

    fn handle_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Seek(increment) => self.seek_relative(increment),
            ControlEvent::Quit => {
                log::info!("[SESSION] Quit requested");
                self.shared.request_quit();
            }
            ControlEvent::AllocPicture(request) => {
                log::debug!(
                    "[VIDEO] Allocating {}x{} surface for slot {}",
                    request.width,
                    request.height,
                    request.slot
                );
                let buffer = self.display.allocate_surface(request.width, request.height);
                self.shared.pictures.install_surface(request, buffer);
            }
            ControlEvent::SourceFailed(reason) => {
                log::error!("[SESSION] Source failed: {}", reason);
                self.fatal = Some(reason);
                self.shared.request_quit();
            }
            ControlEvent::DemuxFinished => log::debug!("[SESSION] Demux thread finished"),
            ControlEvent::VideoFinished => {
                if !self.shared.is_quitting() {
                    log::warn!("[SESSION] Video thread stopped during playback");
                }
            }
        }
    }

    fn seek_relative(&mut self, increment: f64) {
        let master = self.shared.master_clock();
        let request = relative_seek_target(master, increment);
        if self.shared.request_seek(request) {
            log::info!(
                "[SEEK] {:+.1}s from {:.3}s -> {:.3}s",
                increment,
                master,
                request.position_secs()
            );
        } else {
            log::debug!("[SEEK] Ignored {:+.1}s, a seek is already pending", increment);
        }
    }

    /// One refresh timer tick; returns the delay until the next one
    fn refresh(&mut self) -> Duration {
        let sync = &self.shared.config.sync;
        if self.shared.video_stream().is_none() {
            self.check_drained();
            return sync.idle_refresh();
        }

        let Some(pts) = self.shared.pictures.peek_pts() else {
            self.check_drained();
            return sync.empty_queue_retry();
        };

        let now = self.shared.clocks.now();
        let master = match self.shared.sync_mode() {
            SyncMode::VideoMaster => None,
            mode => Some(self.shared.clocks.master_clock(mode)),
        };
        let decision = self.scheduler.schedule(pts, now, master);
        if decision.resynced {
            self.shared.stats.record_resync();
        }
        self.shared.clocks.publish_video(pts, now);

        let display = &mut *self.display;
        self.shared.pictures.peek_ready(|picture| display.blit(picture));
        self.shared.pictures.advance();
        self.shared.stats.record_frame_displayed();

        log::trace!(
            "[REFRESH] pts {:.3} delay {:.3} next in {:.3}",
            pts,
            decision.delay,
            decision.actual_delay
        );
        Duration::try_from_secs_f64(decision.actual_delay).unwrap_or(sync.min_refresh_delay())
    }

    /// Quit once the source has ended and nothing is left to play
    fn check_drained(&self) {
        let shared = self.shared;
        if !shared.config.demux.exit_on_eof || !shared.end_of_input() {
            return;
        }
        // Queues before pictures: a decoder counts as drained only once it
        // is back for another packet, after its last picture was queued
        if shared.audio_queue.is_drained()
            && shared.video_queue.is_drained()
            && shared.pictures.is_empty()
        {
            log::info!("[SESSION] End of input, all queues drained");
            shared.request_quit();
        }
    }
}
