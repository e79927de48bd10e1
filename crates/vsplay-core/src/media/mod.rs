//! Collaborator interfaces
//!
//! The engine never parses containers, decodes bitstreams, converts pixels
//! or touches devices itself. Those services come in through the traits
//! here; [`testsrc`] provides a deterministic implementation of all of them.

pub mod testsrc;

use crate::error::{DecodeError, SourceError};
use crate::queue::{CodedPacket, DecodedPicture};
use crate::types::StreamInfo;

/// Result of asking a demuxer for the next packet
#[derive(Debug)]
pub enum ReadOutcome {
    Packet(CodedPacket),
    /// No more data right now; a growing source may produce more later
    EndOfStream,
}

/// Which side of the target a seek should land on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Forward,
    Backward,
}

/// Container reader
pub trait Demuxer: Send {
    /// Streams found when the source was opened
    fn streams(&self) -> &[StreamInfo];

    fn read_packet(&mut self) -> Result<ReadOutcome, SourceError>;

    /// Reposition to `target_ts`, expressed in `stream_index`'s time base
    fn seek(
        &mut self,
        stream_index: usize,
        target_ts: i64,
        direction: SeekDirection,
    ) -> Result<(), SourceError>;
}

/// Audio decoder producing interleaved i16 PCM in the stream's format
pub trait AudioDecoder: Send {
    /// Decode one packet; an empty vector means the decoder needs more input
    fn decode(&mut self, packet: &CodedPacket) -> Result<Vec<i16>, DecodeError>;

    /// Drop buffered state after a seek
    fn flush(&mut self);
}

/// A frame as it leaves the video decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    /// Pixel data in the decoder's native layout
    pub data: Vec<u8>,
    /// Extra fields to hold the frame for (each adds half a frame duration)
    pub repeat_pict: u32,
    /// Submission number of the packet this frame was decoded from,
    /// when the decoder can tell
    pub submission: Option<u64>,
}

/// Video decoder, possibly with internal reordering latency
pub trait VideoDecoder: Send {
    /// Submit the packet tagged `submission` and return whichever frame
    /// (if any) the decoder completes as a result
    fn decode(
        &mut self,
        submission: u64,
        packet: &CodedPacket,
    ) -> Result<Option<DecodedFrame>, DecodeError>;

    fn flush(&mut self);
}

/// Factory for the demuxer and decoders of one source
pub trait MediaBackend {
    fn open_demuxer(&self, source: &str) -> Result<Box<dyn Demuxer>, SourceError>;

    fn open_audio_decoder(&self, stream: &StreamInfo) -> Result<Box<dyn AudioDecoder>, DecodeError>;

    fn open_video_decoder(&self, stream: &StreamInfo) -> Result<Box<dyn VideoDecoder>, DecodeError>;
}

/// Display-owned pixel storage for one picture queue slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PictureBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PictureBuffer {
    pub fn new(width: u32, height: u32, len: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; len],
        }
    }
}

/// Converts decoder output into the display's pixel format
pub trait PixelConverter: Send {
    fn convert(&mut self, frame: &DecodedFrame, dst: &mut PictureBuffer);
}

/// Byte copy for displays that accept the decoder's layout as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughConverter;

impl PixelConverter for PassthroughConverter {
    fn convert(&mut self, frame: &DecodedFrame, dst: &mut PictureBuffer) {
        let n = frame.data.len().min(dst.data.len());
        dst.data[..n].copy_from_slice(&frame.data[..n]);
    }
}

/// Presentation surface, driven from the control thread only
pub trait DisplaySurface {
    /// Provide storage for a `width` x `height` picture
    fn allocate_surface(&mut self, width: u32, height: u32) -> PictureBuffer;

    /// Show a picture; the buffer stays valid for the whole call
    fn blit(&mut self, picture: &DecodedPicture);
}
