//! Clock model and pacing
//!
//! - [`clock`]: audio, video and external clocks derived from snapshots
//! - [`drift`]: audio block stretching toward the master clock
//! - [`refresh`]: per-frame display delay computation

pub mod clock;
pub mod drift;
pub mod refresh;

pub use clock::{AudioClockSnapshot, ClockState, SyncMode, VideoClockSnapshot};
pub use drift::{clamp_wanted_size, DriftCorrector};
pub use refresh::{RefreshDecision, RefreshScheduler};
