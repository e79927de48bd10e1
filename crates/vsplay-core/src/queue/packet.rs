//! Coded packets as they travel from the demuxer to the decoders

/// One compressed unit of media produced by a demuxer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodedPacket {
    /// Stream this packet belongs to
    pub stream_index: usize,
    /// Opaque payload handed to the decoder
    pub data: Vec<u8>,
    /// Presentation timestamp in stream ticks
    pub pts: Option<i64>,
    /// Decode timestamp in stream ticks
    pub dts: Option<i64>,
    /// Duration in stream ticks (0 when unknown)
    pub duration: i64,
}

impl CodedPacket {
    pub fn new(stream_index: usize, data: Vec<u8>) -> Self {
        Self {
            stream_index,
            data,
            ..Default::default()
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    /// Payload size, the unit packet queues account in
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Entry of a packet queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(CodedPacket),
    /// Decoder state must be discarded before the next data packet
    FlushMarker,
}

impl Packet {
    #[inline]
    pub fn size(&self) -> usize {
        match self {
            Packet::Data(packet) => packet.size(),
            Packet::FlushMarker => 0,
        }
    }

    #[inline]
    pub fn is_flush_marker(&self) -> bool {
        matches!(self, Packet::FlushMarker)
    }
}

impl From<CodedPacket> for Packet {
    fn from(packet: CodedPacket) -> Self {
        Packet::Data(packet)
    }
}
