//! Error types for the playback engine

use thiserror::Error;

/// Errors raised by a demuxer
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source could not be opened or probed
    #[error("Failed to open source {source_name}: {reason}")]
    Open { source_name: String, reason: String },

    /// Unrecoverable read failure
    #[error("I/O error reading source: {0}")]
    Io(#[from] std::io::Error),

    /// Container-level corruption
    #[error("Malformed container data: {0}")]
    Malformed(String),

    /// Seek rejected by the demuxer
    #[error("Seek failed: {0}")]
    Seek(String),
}

/// Errors raised by audio or video decoders
#[derive(Error, Debug)]
pub enum DecodeError {
    /// No decoder for the stream's codec
    #[error("Unsupported codec: {0}")]
    Unsupported(String),

    /// Decoder could not be initialized
    #[error("Failed to open decoder: {0}")]
    Open(String),

    /// A single packet could not be decoded
    #[error("Invalid packet data: {0}")]
    InvalidData(String),
}

/// Errors surfaced by a playback session
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Neither an audio nor a video stream was found
    #[error("Source has no playable audio or video stream")]
    NoPlayableStreams,

    /// Worker thread could not be started
    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        source: std::io::Error,
    },

    /// Playback stopped because the source failed mid-stream
    #[error("Playback aborted: {0}")]
    Aborted(String),
}

/// Result type for playback operations
pub type PlaybackResult<T> = Result<T, PlaybackError>;
