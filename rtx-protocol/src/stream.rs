//! Send-Side RTP Stream
//!
//! Tracks the outgoing packets of one logical stream, answers NACKs from the
//! retention window, and keeps the send-rate and loss-score bookkeeping fed
//! by receiver reports. Every entry point runs to completion on the caller's
//! thread; the retransmission path reuses pooled packet bytes and performs
//! no allocation.

use std::collections::VecDeque;

use crate::buffer::{BufferEntry, BufferError, PayloadPool, RetransmissionBuffer};
use crate::counter::TransmissionCounter;
use crate::packet::{RtpPacket, MTU_SIZE};
use crate::random::RandomSource;
use crate::rtcp::{
    KeyFrameRequest, NackPacket, ReceiverReport, RttEstimator, SdesChunk, SenderReport,
};
use crate::sequence::SeqNumber;
use crate::time::{compact_ntp_from_unix_ms, compact_ntp_to_ms, NtpTime};

/// Resend interval floor until a receiver report has measured the RTT
pub const DEFAULT_RTT_MS: u64 = 100;

/// Default cap on retransmissions of a single packet
pub const DEFAULT_MAX_RESEND_ATTEMPTS: u8 = 8;

/// Number of report intervals the quality score averages over
const SCORE_HISTORY: usize = 8;

/// Static parameters of a send stream
#[derive(Debug, Clone)]
pub struct RtpStreamParams {
    /// SSRC of the media stream
    pub ssrc: u32,
    /// Payload type of the media stream
    pub payload_type: u8,
    /// RTP clock rate in Hz
    pub clock_rate: u32,
    /// Maximum network packet size this stream handles
    pub mtu: usize,
    /// Canonical end-point identifier for SDES
    pub cname: String,
    /// Maximum number of times a single packet is retransmitted
    pub max_resend_attempts: u8,
}

impl RtpStreamParams {
    /// Create parameters with default MTU and resend cap
    pub fn new(ssrc: u32, payload_type: u8, clock_rate: u32, cname: &str) -> Self {
        RtpStreamParams {
            ssrc,
            payload_type,
            clock_rate,
            mtu: MTU_SIZE,
            cname: cname.to_string(),
            max_resend_attempts: DEFAULT_MAX_RESEND_ATTEMPTS,
        }
    }
}

/// Parameters of the associated RTX stream
#[derive(Debug, Clone, Copy)]
pub struct RtxParams {
    /// SSRC of the retransmission stream
    pub ssrc: u32,
    /// Payload type of the retransmission stream
    pub payload_type: u8,
}

/// Callbacks the stream emits toward its owner
///
/// The stream depends only on this capability interface; the owner decides
/// how retransmitted packets reach the wire and how key frame requests are
/// propagated to the media source.
pub trait RtpStreamSendListener {
    /// A NACKed packet is ready to be sent immediately
    ///
    /// Called once per eligible packet, in ascending original sequence
    /// order. The bytes borrow from the stream's payload pool and must be
    /// consumed before the call returns.
    fn on_retransmit_packet(&mut self, packet: &[u8]);

    /// The receiver asked for a fresh key frame
    fn on_key_frame_needed(&mut self, request: KeyFrameRequest);
}

/// Snapshot of stream counters for external reporting
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    /// Total packets sent
    pub packets_sent: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total packets retransmitted
    pub packets_retransmitted: u64,
    /// Total bytes retransmitted
    pub bytes_retransmitted: u64,
    /// NACK feedback packets received
    pub nacks_received: u64,
    /// Key frame requests received
    pub key_frame_requests: u64,
    /// Current quality score, 0 (unusable) to 10 (perfect)
    pub score: u8,
    /// Smoothed round-trip time in milliseconds
    pub rtt_ms: f32,
    /// Outbound bitrate in bits per second
    pub bitrate_bps: u32,
}

/// The send half of one RTP stream
pub struct RtpStreamSend {
    params: RtpStreamParams,
    /// Sequence-ordered retention window
    window: RetransmissionBuffer,
    /// Byte slots backing the window entries
    pool: PayloadPool,
    paused: bool,
    rtx: Option<RtxParams>,
    /// Next RTX sequence number, randomly seeded at activation
    rtx_seq: SeqNumber,
    /// Cumulative lost count at the previous receiver report
    lost_prior: u32,
    /// Packets sent at the previous receiver report
    sent_prior: u64,
    rtt: RttEstimator,
    /// Recent per-interval quality scores, newest last
    scores: VecDeque<u8>,
    transmission_counter: TransmissionCounter,
    /// RTP timestamp of the most recently sent packet
    last_packet_rtp_ts: u32,
    /// Wall-clock time the most recent packet was sent
    last_packet_at_ms: u64,
    retransmitted_packets: u64,
    retransmitted_bytes: u64,
    nack_count: u64,
    key_frame_request_count: u64,
}

impl RtpStreamSend {
    /// Create a stream retaining up to `buffer_size` packets for
    /// retransmission (0 disables retention)
    pub fn new(params: RtpStreamParams, buffer_size: usize) -> Self {
        let mtu = params.mtu;

        RtpStreamSend {
            params,
            window: RetransmissionBuffer::new(buffer_size),
            pool: PayloadPool::new(buffer_size + 1, mtu),
            paused: false,
            rtx: None,
            rtx_seq: SeqNumber::new(0),
            lost_prior: 0,
            sent_prior: 0,
            rtt: RttEstimator::new(),
            scores: VecDeque::with_capacity(SCORE_HISTORY),
            transmission_counter: TransmissionCounter::new(),
            last_packet_rtp_ts: 0,
            last_packet_at_ms: 0,
            retransmitted_packets: 0,
            retransmitted_bytes: 0,
            nack_count: 0,
            key_frame_request_count: 0,
        }
    }

    /// SSRC of the media stream
    pub fn ssrc(&self) -> u32 {
        self.params.ssrc
    }

    /// Activate retransmission encoding and seed the RTX sequence counter
    pub fn set_rtx(&mut self, payload_type: u8, ssrc: u32, random: &mut dyn RandomSource) {
        self.rtx = Some(RtxParams { ssrc, payload_type });
        self.rtx_seq = SeqNumber::new(random.random_u16(0, u16::MAX));
    }

    /// Whether the stream is paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Number of packets currently retained
    pub fn retained_len(&self) -> usize {
        self.window.len()
    }

    /// Whether a packet with this sequence number is retained
    pub fn retains(&self, seq: SeqNumber) -> bool {
        self.window.find_by_sequence(seq).is_some()
    }

    /// Record an outgoing packet and retain it for retransmission
    ///
    /// Returns false when the packet was not retained (stream paused, wrong
    /// SSRC, retention disabled, duplicate, or too large for a slot).
    pub fn receive_packet(&mut self, packet: &RtpPacket, now_ms: u64) -> bool {
        if self.paused {
            return false;
        }

        if packet.ssrc() != self.params.ssrc {
            tracing::warn!(
                packet_ssrc = packet.ssrc(),
                stream_ssrc = self.params.ssrc,
                "dropping packet with wrong SSRC"
            );
            return false;
        }

        self.transmission_counter.add_packet(packet.size(), now_ms);
        self.last_packet_rtp_ts = packet.timestamp();
        self.last_packet_at_ms = now_ms;

        if self.window.max_size() == 0 {
            return true;
        }

        self.store_packet(packet)
    }

    /// Copy the packet into a pool slot and admit its window entry
    fn store_packet(&mut self, packet: &RtpPacket) -> bool {
        let Some(slot) = self.pool.acquire() else {
            // The window invariant guarantees a free slot; reaching this
            // means entry/slot bookkeeping diverged.
            tracing::warn!(seq = %packet.sequence(), "no free payload slot, packet not retained");
            return false;
        };

        if let Err(error) = self.pool.store(slot, packet.as_bytes()) {
            tracing::warn!(seq = %packet.sequence(), %error, "packet not retained");
            self.pool.release(slot);
            return false;
        }

        let entry = BufferEntry::new(packet.sequence(), slot, packet.size());
        match self.window.insert_ordered(entry) {
            Ok(_) => {}
            Err(BufferError::Duplicate(seq)) => {
                tracing::debug!(%seq, "duplicate packet, keeping the stored original");
                self.pool.release(slot);
                return false;
            }
            Err(error) => {
                tracing::warn!(seq = %packet.sequence(), %error, "packet not retained");
                self.pool.release(slot);
                return false;
            }
        }

        // Trim back to the retention limit, freeing the evicted slot for
        // the next admission.
        while self.window.len() > self.window.max_size() {
            if let Some(evicted) = self.window.evict_oldest() {
                self.pool.release(evicted.storage_index);
            }
        }

        true
    }

    /// Answer a NACK feedback packet
    ///
    /// Each requested sequence number still in the window and not
    /// rate-limited is emitted to the listener, RTX-encoded in place on its
    /// first resend.
    pub fn receive_nack(
        &mut self,
        nack: &NackPacket,
        now_ms: u64,
        listener: &mut dyn RtpStreamSendListener,
    ) {
        self.nack_count += 1;
        let resend_interval = self.resend_interval_ms();

        for item in &nack.items {
            for seq in item.lost_sequences() {
                let Some(entry) = self.window.find_by_sequence_mut(seq) else {
                    tracing::debug!(%seq, "NACKed packet not retained, cannot retransmit");
                    continue;
                };

                if entry.resend_count >= self.params.max_resend_attempts {
                    tracing::debug!(%seq, "retransmission attempts exhausted");
                    continue;
                }

                if entry.resent_at != 0 && now_ms.saturating_sub(entry.resent_at) < resend_interval
                {
                    tracing::debug!(%seq, "resent too recently, rate limited");
                    continue;
                }

                if !entry.rtx_encoded {
                    if let Some(rtx) = self.rtx {
                        self.rtx_seq.increment();
                        let slot = self.pool.slot_mut(entry.storage_index);
                        match RtpPacket::rtx_encode_in_place(
                            slot,
                            entry.packet_len,
                            self.rtx_seq,
                            rtx.ssrc,
                            rtx.payload_type,
                        ) {
                            Ok(new_len) => {
                                entry.packet_len = new_len;
                                entry.rtx_encoded = true;
                            }
                            Err(error) => {
                                tracing::warn!(%seq, %error, "RTX conversion failed, resending original");
                            }
                        }
                    }
                }

                entry.resent_at = now_ms;
                entry.resend_count += 1;
                self.retransmitted_packets += 1;
                self.retransmitted_bytes += entry.packet_len as u64;

                let bytes = &self.pool.slot(entry.storage_index)[..entry.packet_len];
                listener.on_retransmit_packet(bytes);
            }
        }
    }

    /// Forward a key frame request upstream
    ///
    /// Key frames are not recoverable from the retention window, so the
    /// request bypasses it entirely.
    pub fn receive_key_frame_request(
        &mut self,
        request: KeyFrameRequest,
        listener: &mut dyn RtpStreamSendListener,
    ) {
        self.key_frame_request_count += 1;
        tracing::debug!(ssrc = self.params.ssrc, ?request, "forwarding key frame request");
        listener.on_key_frame_needed(request);
    }

    /// Process a receiver report: update RTT and the quality score
    pub fn receive_rtcp_receiver_report(&mut self, report: &ReceiverReport, now_ms: u64) {
        if report.last_sr != 0 {
            let compact_now = compact_ntp_from_unix_ms(now_ms);
            let echoed = report.last_sr.wrapping_add(report.delay_since_last_sr);
            if compact_now > echoed {
                self.rtt.update(compact_ntp_to_ms(compact_now - echoed));
            }
        }

        self.update_score(report);
    }

    /// Build a sender report snapshot for `now_ms`
    ///
    /// Returns `None` until the stream has sent anything. Pure function of
    /// the transmission counter and clock; the window is not consulted.
    pub fn get_rtcp_sender_report(&self, now_ms: u64) -> Option<SenderReport> {
        if self.transmission_counter.packet_count() == 0 {
            return None;
        }

        let ntp = NtpTime::from_unix_ms(now_ms);
        let elapsed_ms = now_ms.saturating_sub(self.last_packet_at_ms);
        let rtp_timestamp = self
            .last_packet_rtp_ts
            .wrapping_add((elapsed_ms * self.params.clock_rate as u64 / 1000) as u32);

        Some(SenderReport {
            ssrc: self.params.ssrc,
            ntp_sec: ntp.seconds,
            ntp_frac: ntp.fractions,
            rtp_timestamp,
            packet_count: self.transmission_counter.packet_count() as u32,
            octet_count: self.transmission_counter.byte_count() as u32,
        })
    }

    /// Build the source-description chunk for this stream
    pub fn get_rtcp_sdes_chunk(&self) -> SdesChunk {
        SdesChunk {
            ssrc: self.params.ssrc,
            cname: self.params.cname.clone(),
        }
    }

    /// Pause the stream, dropping all retained packets
    ///
    /// Resends can no longer target pre-pause packets.
    pub fn pause(&mut self) {
        self.paused = true;
        self.clear_retention();
        tracing::debug!(ssrc = self.params.ssrc, "stream paused, retention cleared");
    }

    /// Resume the stream with an empty retention window
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Drop all retained packets and free their slots
    fn clear_retention(&mut self) {
        self.window.clear();
        self.pool.reset();
    }

    /// Outbound bitrate in bits per second as of `now_ms`
    pub fn bitrate(&mut self, now_ms: u64) -> u32 {
        self.transmission_counter.bitrate(now_ms)
    }

    /// Current quality score, 0 (unusable) to 10 (perfect)
    ///
    /// Recency-weighted average of the per-interval scores; 10 until the
    /// first receiver report arrives.
    pub fn score(&self) -> u8 {
        if self.scores.is_empty() {
            return 10;
        }

        let mut weighted = 0u32;
        let mut weights = 0u32;
        for (index, score) in self.scores.iter().enumerate() {
            let weight = index as u32 + 1;
            weighted += *score as u32 * weight;
            weights += weight;
        }

        (weighted / weights) as u8
    }

    /// Smoothed round-trip time in milliseconds, 0.0 until measured
    pub fn rtt_ms(&self) -> f32 {
        self.rtt.srtt_ms()
    }

    /// Counter snapshot for external reporting
    pub fn stats(&mut self, now_ms: u64) -> StreamStats {
        StreamStats {
            packets_sent: self.transmission_counter.packet_count(),
            bytes_sent: self.transmission_counter.byte_count(),
            packets_retransmitted: self.retransmitted_packets,
            bytes_retransmitted: self.retransmitted_bytes,
            nacks_received: self.nack_count,
            key_frame_requests: self.key_frame_request_count,
            score: self.score(),
            rtt_ms: self.rtt.srtt_ms(),
            bitrate_bps: self.transmission_counter.bitrate(now_ms),
        }
    }

    /// Minimum interval between resends of the same packet
    fn resend_interval_ms(&self) -> u64 {
        if self.rtt.has_sample() {
            self.rtt.srtt_ms() as u64
        } else {
            DEFAULT_RTT_MS
        }
    }

    /// Fold one report interval into the score history
    fn update_score(&mut self, report: &ReceiverReport) {
        let total_sent = self.transmission_counter.packet_count();
        let sent = total_sent - self.sent_prior;
        let lost = report.total_lost.saturating_sub(self.lost_prior) as u64;

        self.sent_prior = total_sent;
        self.lost_prior = report.total_lost;

        if sent == 0 {
            return;
        }

        let lost = lost.min(sent);
        let delivered = (sent - lost) as f32 / sent as f32;
        let interval_score = (delivered.powi(4) * 10.0).round() as u8;

        if self.scores.len() == SCORE_HISTORY {
            self.scores.pop_front();
        }
        self.scores.push_back(interval_score);
    }
}
