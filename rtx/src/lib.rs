//! RTX - Send-Side RTP Retransmission
//!
//! High-level Rust API for the send-side retransmission subsystem of an
//! RTP stream.

pub use rtx_protocol as protocol;

// Re-export commonly used types
pub use protocol::{
    KeyFrameRequest, NackItem, NackPacket, ReceiverReport, RtpPacket, RtpStreamParams,
    RtpStreamSend, RtpStreamSendListener, SecureRandom, SeqNumber, StreamStats,
};
