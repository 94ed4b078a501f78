//! End-to-end retransmission scenarios
//!
//! Drives a send stream through the full lifecycle: media packets in, NACK
//! feedback and receiver reports back, retransmissions and sender reports
//! out.

use rtx::{
    KeyFrameRequest, NackItem, NackPacket, ReceiverReport, RtpPacket, RtpStreamParams,
    RtpStreamSend, RtpStreamSendListener, SeqNumber,
};
use rtx_protocol::packet::{RTP_HEADER_SIZE, RTX_OSN_SIZE};
use rtx_protocol::random::RandomSource;

const MEDIA_SSRC: u32 = 0x0102_0304;
const RTX_SSRC: u32 = 0x0506_0708;
const RECEIVER_SSRC: u32 = 0x0909_0909;
const MEDIA_PT: u8 = 96;
const RTX_PT: u8 = 97;

struct SeedRandom(u16);

impl RandomSource for SeedRandom {
    fn random_u16(&mut self, _min: u16, _max: u16) -> u16 {
        self.0
    }
}

#[derive(Default)]
struct Wire {
    retransmits: Vec<Vec<u8>>,
    key_frames: Vec<KeyFrameRequest>,
}

impl RtpStreamSendListener for Wire {
    fn on_retransmit_packet(&mut self, packet: &[u8]) {
        self.retransmits.push(packet.to_vec());
    }

    fn on_key_frame_needed(&mut self, request: KeyFrameRequest) {
        self.key_frames.push(request);
    }
}

fn media_packet(seq: u16) -> RtpPacket {
    RtpPacket::new(
        MEDIA_PT,
        SeqNumber::new(seq),
        seq as u32 * 3000,
        MEDIA_SSRC,
        false,
        b"frame payload bytes",
    )
}

fn make_stream(buffer_size: usize, rtx_seed: u16) -> RtpStreamSend {
    let mut stream = RtpStreamSend::new(
        RtpStreamParams::new(MEDIA_SSRC, MEDIA_PT, 90_000, "sender@example"),
        buffer_size,
    );
    stream.set_rtx(RTX_PT, RTX_SSRC, &mut SeedRandom(rtx_seed));
    stream
}

fn nack_for(seq: u16) -> NackPacket {
    NackPacket::new(
        RECEIVER_SSRC,
        MEDIA_SSRC,
        vec![NackItem::new(SeqNumber::new(seq), 0)],
    )
}

/// Original sequence number carried at the head of an RTX payload
fn original_seq(rtx_bytes: &[u8]) -> u16 {
    u16::from_be_bytes([rtx_bytes[RTP_HEADER_SIZE], rtx_bytes[RTP_HEADER_SIZE + 1]])
}

#[test]
fn test_round_trip_window_of_five() {
    let mut stream = make_stream(5, 40_000);
    let mut wire = Wire::default();

    // Send sequences 0..=9 into a window of capacity 5.
    for seq in 0..10u16 {
        assert!(stream.receive_packet(&media_packet(seq), 1000 + seq as u64));
    }

    // The window holds exactly 5..=9.
    assert_eq!(stream.retained_len(), 5);
    for seq in 0..5u16 {
        assert!(!stream.retains(SeqNumber::new(seq)));
    }
    for seq in 5..10u16 {
        assert!(stream.retains(SeqNumber::new(seq)));
    }

    // Sequence 3 was evicted: no retransmit.
    stream.receive_nack(&nack_for(3), 2000, &mut wire);
    assert!(wire.retransmits.is_empty());

    // Sequence 7 is retained: exactly one re-encoded retransmit.
    stream.receive_nack(&nack_for(7), 2000, &mut wire);
    assert_eq!(wire.retransmits.len(), 1);

    let rtx = &wire.retransmits[0];
    assert_eq!(RtpPacket::read_ssrc(rtx), RTX_SSRC);
    assert_eq!(RtpPacket::read_payload_type(rtx), RTX_PT);
    assert_eq!(original_seq(rtx), 7);
    assert_eq!(rtx.len(), media_packet(7).size() + RTX_OSN_SIZE);
}

#[test]
fn test_multi_item_nack_emits_in_sequence_order() {
    let mut stream = make_stream(32, 100);
    let mut wire = Wire::default();

    for seq in 200..232u16 {
        stream.receive_packet(&media_packet(seq), 1000);
    }

    let nack = NackPacket::new(
        RECEIVER_SSRC,
        MEDIA_SSRC,
        vec![
            NackItem::new(SeqNumber::new(201), 0b11),
            NackItem::new(SeqNumber::new(220), 0b1000),
        ],
    );
    stream.receive_nack(&nack, 2000, &mut wire);

    let originals: Vec<u16> = wire.retransmits.iter().map(|p| original_seq(p)).collect();
    assert_eq!(originals, vec![201, 202, 203, 220, 224]);
}

#[test]
fn test_burst_loss_larger_than_window() {
    let mut stream = make_stream(4, 1);
    let mut wire = Wire::default();

    for seq in 0..20u16 {
        stream.receive_packet(&media_packet(seq), 1000);
    }

    // A 17-candidate NACK covering 8..=24: only 16..=19 survive in the
    // window, and 20..=24 were never sent.
    let nack = NackPacket::new(
        RECEIVER_SSRC,
        MEDIA_SSRC,
        vec![NackItem::new(SeqNumber::new(8), u16::MAX)],
    );
    stream.receive_nack(&nack, 2000, &mut wire);

    let originals: Vec<u16> = wire.retransmits.iter().map(|p| original_seq(p)).collect();
    assert_eq!(originals, vec![16, 17, 18, 19]);
}

#[test]
fn test_sequence_wraparound_round_trip() {
    let mut stream = make_stream(8, 7);
    let mut wire = Wire::default();

    // Cross the 16-bit boundary.
    for offset in 0..8u16 {
        let seq = 65532u16.wrapping_add(offset);
        stream.receive_packet(&media_packet(seq), 1000);
    }

    assert!(stream.retains(SeqNumber::new(65533)));
    assert!(stream.retains(SeqNumber::new(2)));

    stream.receive_nack(&nack_for(65534), 2000, &mut wire);
    stream.receive_nack(&nack_for(1), 2000, &mut wire);

    let originals: Vec<u16> = wire.retransmits.iter().map(|p| original_seq(p)).collect();
    assert_eq!(originals, vec![65534, 1]);
}

#[test]
fn test_rate_limit_suppresses_duplicate_nack() {
    let mut stream = make_stream(8, 9);
    let mut wire = Wire::default();

    stream.receive_packet(&media_packet(10), 1000);

    stream.receive_nack(&nack_for(10), 5000, &mut wire);
    stream.receive_nack(&nack_for(10), 5040, &mut wire);

    // The second NACK arrived inside the resend interval.
    assert_eq!(wire.retransmits.len(), 1);
}

#[test]
fn test_retransmit_bytes_stable_across_resends() {
    let mut stream = make_stream(8, 500);
    let mut wire = Wire::default();

    stream.receive_packet(&media_packet(11), 1000);

    stream.receive_nack(&nack_for(11), 2000, &mut wire);
    stream.receive_nack(&nack_for(11), 3000, &mut wire);
    stream.receive_nack(&nack_for(11), 4000, &mut wire);

    assert_eq!(wire.retransmits.len(), 3);
    assert_eq!(wire.retransmits[0], wire.retransmits[1]);
    assert_eq!(wire.retransmits[1], wire.retransmits[2]);
}

#[test]
fn test_pause_forgets_prior_packets() {
    let mut stream = make_stream(8, 3);
    let mut wire = Wire::default();

    for seq in 0..8u16 {
        stream.receive_packet(&media_packet(seq), 1000);
    }

    stream.pause();
    assert_eq!(stream.retained_len(), 0);

    stream.resume();
    stream.receive_packet(&media_packet(100), 2000);

    // Pre-pause sequences are gone; the post-resume packet is answerable.
    stream.receive_nack(&nack_for(4), 3000, &mut wire);
    assert!(wire.retransmits.is_empty());

    stream.receive_nack(&nack_for(100), 3000, &mut wire);
    assert_eq!(wire.retransmits.len(), 1);
    assert_eq!(original_seq(&wire.retransmits[0]), 100);
}

#[test]
fn test_key_frame_request_bypasses_window() {
    let mut stream = make_stream(4, 3);
    let mut wire = Wire::default();

    // No packets sent at all; the request is still forwarded.
    stream.receive_key_frame_request(KeyFrameRequest::Pli, &mut wire);

    assert_eq!(wire.key_frames, vec![KeyFrameRequest::Pli]);
    assert!(wire.retransmits.is_empty());
}

#[test]
fn test_reports_and_stats_over_a_session() {
    let mut stream = make_stream(16, 1234);
    let mut wire = Wire::default();

    for seq in 0..40u16 {
        stream.receive_packet(&media_packet(seq), 1000 + seq as u64);
    }

    // Receiver saw 4 of the interval's 40 packets lost.
    stream.receive_rtcp_receiver_report(
        &ReceiverReport {
            ssrc: MEDIA_SSRC,
            total_lost: 4,
            fraction_lost: 26,
            ..Default::default()
        },
        2000,
    );

    stream.receive_nack(&nack_for(30), 3000, &mut wire);

    let stats = stream.stats(3000);
    assert_eq!(stats.packets_sent, 40);
    assert_eq!(stats.packets_retransmitted, 1);
    assert_eq!(stats.nacks_received, 1);
    assert!(stats.score < 10);
    assert!(stats.bytes_retransmitted > 0);

    let sr = stream.get_rtcp_sender_report(4000).unwrap();
    assert_eq!(sr.packet_count, 40);
    assert_eq!(sr.ssrc, MEDIA_SSRC);

    let sdes = stream.get_rtcp_sdes_chunk();
    assert_eq!(sdes.cname, "sender@example");
}
