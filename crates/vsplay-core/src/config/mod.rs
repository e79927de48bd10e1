//! Configuration for the playback engine
//!
//! - Generic YAML config loading/saving shared with the player binary
//! - [`PlaybackConfig`]: every threshold and polling interval the engine uses
//!
//! # Usage
//!
//! ```ignore
//! use vsplay_core::config::{load_config, save_config, PlaybackConfig};
//!
//! let config: PlaybackConfig = load_config(&config_path);
//! save_config(&config, &config_path)?;
//! ```

mod io;
mod playback;

pub use io::{load_config, save_config};
pub use playback::{AudioRenderConfig, DemuxConfig, PlaybackConfig, QueueConfig, SyncConfig};
