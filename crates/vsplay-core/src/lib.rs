//! vsplay core - synchronization and buffering engine for A/V playback
//!
//! Takes demultiplexed coded packets from a [`media::Demuxer`], decodes them
//! through pluggable decoders and paces audio and video output against a
//! shared master clock.
//!
//! ```text
//!                  ┌──────────────┐
//!  Demuxer ──────▶ │ Demux thread │──┬──▶ audio PacketQueue ──▶ AudioRenderer (output callback)
//!                  └──────────────┘  │
//!                                    └──▶ video PacketQueue ──▶ video thread ──▶ PictureQueue
//!                                                                                    │
//!                      control thread: refresh timer + commands ◀───────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod playback;
pub mod queue;
pub mod sync;
pub mod types;

pub use types::*;
