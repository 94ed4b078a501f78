//! RTP Packet Access and Retransmission-Format Conversion
//!
//! Full RTP wire parsing lives outside this crate; packets arrive as
//! validated byte buffers and are consumed through the fixed-header
//! accessors here. The one byte-level transformation owned by this crate is
//! the in-place conversion of a stored packet into retransmission (RTX)
//! format: the original sequence number is inserted ahead of the payload and
//! the header is rewritten with the RTX sequence number, SSRC and payload
//! type, all inside the packet's payload slot.

use crate::sequence::SeqNumber;
use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// RTP protocol version
pub const RTP_VERSION: u8 = 2;

/// Size of the fixed RTP header in bytes (without CSRCs or extensions)
pub const RTP_HEADER_SIZE: usize = 12;

/// Maximum size of a network packet this stream handles
pub const MTU_SIZE: usize = 1500;

/// Extra slot headroom reserved for the retransmission-format rewrite
pub const RTX_ENCODING_MARGIN: usize = 200;

/// Size of the original-sequence-number field an RTX payload starts with
pub const RTX_OSN_SIZE: usize = 2;

/// Packet errors
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("unsupported RTP version {0}")]
    BadVersion(u8),

    #[error("packet of {size} bytes exceeds maximum {max}")]
    PacketTooLarge { size: usize, max: usize },
}

/// An outgoing RTP packet as handed to the send stream
///
/// Owns its bytes; the send stream copies them into a payload-pool slot when
/// the packet is retained for retransmission.
#[derive(Debug, Clone)]
pub struct RtpPacket {
    data: BytesMut,
}

impl RtpPacket {
    /// Build a packet from header fields and payload
    pub fn new(
        payload_type: u8,
        sequence: SeqNumber,
        timestamp: u32,
        ssrc: u32,
        marker: bool,
        payload: &[u8],
    ) -> Self {
        let mut data = BytesMut::with_capacity(RTP_HEADER_SIZE + payload.len());

        data.put_u8(RTP_VERSION << 6);
        data.put_u8((payload_type & 0x7F) | if marker { 0x80 } else { 0 });
        data.put_u16(sequence.as_raw());
        data.put_u32(timestamp);
        data.put_u32(ssrc);
        data.put_slice(payload);

        RtpPacket { data }
    }

    /// Validate and take ownership of raw packet bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < RTP_HEADER_SIZE {
            return Err(PacketError::TooShort {
                expected: RTP_HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let version = bytes[0] >> 6;
        if version != RTP_VERSION {
            return Err(PacketError::BadVersion(version));
        }

        // The full header (CSRCs, extension) must fit in the buffer.
        Self::header_len_of(bytes)?;

        Ok(RtpPacket {
            data: BytesMut::from(bytes),
        })
    }

    /// Get the sequence number
    #[inline]
    pub fn sequence(&self) -> SeqNumber {
        Self::read_sequence(&self.data)
    }

    /// Get the SSRC
    #[inline]
    pub fn ssrc(&self) -> u32 {
        Self::read_ssrc(&self.data)
    }

    /// Get the payload type
    #[inline]
    pub fn payload_type(&self) -> u8 {
        Self::read_payload_type(&self.data)
    }

    /// Get the marker bit
    #[inline]
    pub fn marker(&self) -> bool {
        self.data[1] & 0x80 != 0
    }

    /// Get the RTP media timestamp
    #[inline]
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]])
    }

    /// Length of the header including CSRCs and extension
    pub fn header_len(&self) -> usize {
        // Validated at construction.
        Self::header_len_of(&self.data).unwrap_or(RTP_HEADER_SIZE)
    }

    /// The packet payload (after header, CSRCs and extension)
    pub fn payload(&self) -> &[u8] {
        &self.data[self.header_len()..]
    }

    /// Total wire size of the packet
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The full packet bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Read the sequence number out of raw packet bytes
    #[inline]
    pub fn read_sequence(buf: &[u8]) -> SeqNumber {
        SeqNumber::new(u16::from_be_bytes([buf[2], buf[3]]))
    }

    /// Write the sequence number into raw packet bytes
    #[inline]
    pub fn write_sequence(buf: &mut [u8], seq: SeqNumber) {
        buf[2..4].copy_from_slice(&seq.as_raw().to_be_bytes());
    }

    /// Read the SSRC out of raw packet bytes
    #[inline]
    pub fn read_ssrc(buf: &[u8]) -> u32 {
        u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]])
    }

    /// Write the SSRC into raw packet bytes
    #[inline]
    pub fn write_ssrc(buf: &mut [u8], ssrc: u32) {
        buf[8..12].copy_from_slice(&ssrc.to_be_bytes());
    }

    /// Read the payload type out of raw packet bytes
    #[inline]
    pub fn read_payload_type(buf: &[u8]) -> u8 {
        buf[1] & 0x7F
    }

    /// Write the payload type into raw packet bytes, preserving the marker bit
    #[inline]
    pub fn write_payload_type(buf: &mut [u8], payload_type: u8) {
        buf[1] = (buf[1] & 0x80) | (payload_type & 0x7F);
    }

    /// Header length (fixed header + CSRCs + extension) of raw packet bytes
    pub fn header_len_of(buf: &[u8]) -> Result<usize, PacketError> {
        if buf.len() < RTP_HEADER_SIZE {
            return Err(PacketError::TooShort {
                expected: RTP_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let csrc_count = (buf[0] & 0x0F) as usize;
        let has_extension = buf[0] & 0x10 != 0;
        let mut len = RTP_HEADER_SIZE + csrc_count * 4;

        if has_extension {
            if buf.len() < len + 4 {
                return Err(PacketError::TooShort {
                    expected: len + 4,
                    actual: buf.len(),
                });
            }
            let ext_words = u16::from_be_bytes([buf[len + 2], buf[len + 3]]) as usize;
            len += 4 + ext_words * 4;
        }

        if buf.len() < len {
            return Err(PacketError::TooShort {
                expected: len,
                actual: buf.len(),
            });
        }

        Ok(len)
    }

    /// Convert stored packet bytes into retransmission format, in place
    ///
    /// The payload is shifted right by [`RTX_OSN_SIZE`] bytes, the original
    /// sequence number is written at the payload head, and the header's
    /// sequence number, SSRC and payload type are replaced with the RTX
    /// values. Returns the new packet length. The caller must have reserved
    /// [`RTX_ENCODING_MARGIN`] headroom in `buf`.
    pub fn rtx_encode_in_place(
        buf: &mut [u8],
        len: usize,
        rtx_seq: SeqNumber,
        rtx_ssrc: u32,
        rtx_payload_type: u8,
    ) -> Result<usize, PacketError> {
        let header_len = Self::header_len_of(&buf[..len])?;
        let new_len = len + RTX_OSN_SIZE;

        if new_len > buf.len() {
            return Err(PacketError::PacketTooLarge {
                size: new_len,
                max: buf.len(),
            });
        }

        let original_seq = Self::read_sequence(buf);

        buf.copy_within(header_len..len, header_len + RTX_OSN_SIZE);
        buf[header_len..header_len + RTX_OSN_SIZE]
            .copy_from_slice(&original_seq.as_raw().to_be_bytes());

        Self::write_sequence(buf, rtx_seq);
        Self::write_ssrc(buf, rtx_ssrc);
        Self::write_payload_type(buf, rtx_payload_type);

        Ok(new_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_packet(seq: u16, payload: &[u8]) -> RtpPacket {
        RtpPacket::new(96, SeqNumber::new(seq), 90_000, 0x1234_5678, false, payload)
    }

    #[test]
    fn test_build_and_read_fields() {
        let packet = test_packet(1000, b"media");

        assert_eq!(packet.sequence(), SeqNumber::new(1000));
        assert_eq!(packet.ssrc(), 0x1234_5678);
        assert_eq!(packet.payload_type(), 96);
        assert_eq!(packet.timestamp(), 90_000);
        assert!(!packet.marker());
        assert_eq!(packet.header_len(), RTP_HEADER_SIZE);
        assert_eq!(packet.payload(), b"media");
        assert_eq!(packet.size(), RTP_HEADER_SIZE + 5);
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let packet = test_packet(42, b"payload");
        let parsed = RtpPacket::from_bytes(packet.as_bytes()).unwrap();

        assert_eq!(parsed.sequence(), SeqNumber::new(42));
        assert_eq!(parsed.payload(), b"payload");
    }

    #[test]
    fn test_from_bytes_too_short() {
        let err = RtpPacket::from_bytes(&[0x80, 96, 0, 1]).unwrap_err();
        assert!(matches!(err, PacketError::TooShort { .. }));
    }

    #[test]
    fn test_from_bytes_bad_version() {
        let mut bytes = test_packet(1, b"x").as_bytes().to_vec();
        bytes[0] = 0x40; // version 1
        let err = RtpPacket::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, PacketError::BadVersion(1)));
    }

    #[test]
    fn test_header_len_with_csrc_and_extension() {
        // Two CSRCs and a one-word extension.
        let mut bytes = vec![0u8; RTP_HEADER_SIZE + 8 + 8 + 4];
        bytes[0] = (RTP_VERSION << 6) | 0x10 | 2;
        // Extension length field: 1 word.
        let ext_offset = RTP_HEADER_SIZE + 8;
        bytes[ext_offset + 3] = 1;

        let len = RtpPacket::header_len_of(&bytes).unwrap();
        assert_eq!(len, RTP_HEADER_SIZE + 8 + 4 + 4);
    }

    #[test]
    fn test_slice_field_writes() {
        let packet = test_packet(7, b"abc");
        let mut buf = packet.as_bytes().to_vec();

        RtpPacket::write_sequence(&mut buf, SeqNumber::new(9_999));
        RtpPacket::write_ssrc(&mut buf, 0xAABB_CCDD);
        RtpPacket::write_payload_type(&mut buf, 97);

        assert_eq!(RtpPacket::read_sequence(&buf), SeqNumber::new(9_999));
        assert_eq!(RtpPacket::read_ssrc(&buf), 0xAABB_CCDD);
        assert_eq!(RtpPacket::read_payload_type(&buf), 97);
    }

    #[test]
    fn test_rtx_encode_in_place() {
        let packet = test_packet(500, b"frame-data");
        let mut slot = vec![0u8; packet.size() + RTX_ENCODING_MARGIN];
        slot[..packet.size()].copy_from_slice(packet.as_bytes());

        let new_len = RtpPacket::rtx_encode_in_place(
            &mut slot,
            packet.size(),
            SeqNumber::new(1),
            0x9999_0000,
            97,
        )
        .unwrap();

        assert_eq!(new_len, packet.size() + RTX_OSN_SIZE);
        assert_eq!(RtpPacket::read_sequence(&slot), SeqNumber::new(1));
        assert_eq!(RtpPacket::read_ssrc(&slot), 0x9999_0000);
        assert_eq!(RtpPacket::read_payload_type(&slot), 97);

        // Payload now starts with the original sequence number.
        let osn = u16::from_be_bytes([slot[RTP_HEADER_SIZE], slot[RTP_HEADER_SIZE + 1]]);
        assert_eq!(osn, 500);
        assert_eq!(&slot[RTP_HEADER_SIZE + RTX_OSN_SIZE..new_len], b"frame-data");
    }

    #[test]
    fn test_rtx_encode_needs_headroom() {
        let packet = test_packet(500, b"frame-data");
        let mut slot = packet.as_bytes().to_vec(); // no margin

        let err = RtpPacket::rtx_encode_in_place(
            &mut slot,
            packet.size(),
            SeqNumber::new(1),
            0x9999_0000,
            97,
        )
        .unwrap_err();

        assert!(matches!(err, PacketError::PacketTooLarge { .. }));
    }
}
