//! Producer/consumer queues between the playback threads
//!
//! - [`PacketQueue`]: byte-capped FIFO of coded packets (one for audio, one for video)
//! - [`PictureQueue`]: fixed-capacity ring of decoded pictures awaiting display

mod packet;
mod packet_queue;
mod picture_queue;

pub use packet::{CodedPacket, Packet};
pub use packet_queue::{PacketQueue, PopResult};
pub use picture_queue::{AllocRequest, DecodedPicture, PictureQueue, QueueAborted};
