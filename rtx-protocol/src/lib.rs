//! Send-Side RTP Retransmission Core
//!
//! This crate implements the sender half of an RTP stream's reliability
//! machinery: a bounded sequence-ordered retention buffer backed by a fixed
//! payload pool, NACK decoding with resend rate limiting and in-place RTX
//! re-encoding, and the sender-report/receiver-report bookkeeping that feeds
//! quality scoring.

pub mod buffer;
pub mod counter;
pub mod packet;
pub mod random;
pub mod rtcp;
pub mod sequence;
pub mod stream;
pub mod time;

pub use buffer::{BufferEntry, BufferError, PayloadPool, RetransmissionBuffer};
pub use counter::{RateCalculator, TransmissionCounter};
pub use packet::{PacketError, RtpPacket, MTU_SIZE, RTX_ENCODING_MARGIN};
pub use random::{RandomSource, SecureRandom};
pub use rtcp::{
    KeyFrameRequest, NackItem, NackPacket, ReceiverReport, RttEstimator, SdesChunk, SenderReport,
};
pub use sequence::SeqNumber;
pub use stream::{
    RtpStreamParams, RtpStreamSend, RtpStreamSendListener, RtxParams, StreamStats,
};
