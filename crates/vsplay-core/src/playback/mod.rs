//! Playback session and its threads
//!
//! # Architecture
//!
//! - **Demux thread**: sole writer of both packet queues, services seeks
//! - **Video thread**: decodes, timestamps and queues pictures
//! - **Audio output thread**: owned by the output device, calls
//!   [`AudioRenderer::fill`]
//! - **Control thread**: the caller of [`PlaybackSession::run`]; runs the
//!   refresh timer, display allocation and user commands
//!
//! Shutdown sets one atomic flag and aborts every queue, so each thread
//! wakes within one wait cycle.
//!
//! # Example Usage
//!
//! ```ignore
//! let mut session = PlaybackSession::open(&backend, "movie.mkv", PlaybackConfig::default())?;
//! let commands = session.commands();
//! if let Some(renderer) = session.take_audio_renderer() {
//!     start_output(renderer)?; // calls renderer.fill() from the device thread
//! }
//! commands.seek(10.0);
//! let summary = session.run(&mut display, Box::new(PassthroughConverter))?;
//! ```

mod audio;
mod controller;
mod demux;
mod seek;
mod session;
mod stats;
mod video;

pub use audio::AudioRenderer;
pub use controller::{CommandHandle, ControlEvent};
pub use seek::{relative_seek_target, SeekController, SeekRequest};
pub use session::{PlaybackSession, PlaybackSummary, SessionShared, SessionState};
pub use stats::{PlaybackStats, StatsSnapshot};
pub use video::{resolve_pts, PtsSideTable, VideoClock};
