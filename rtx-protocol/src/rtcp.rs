//! RTCP Feedback and Report Objects
//!
//! The send stream consumes receiver feedback (NACK, receiver reports) and
//! produces sender reports and SDES chunks. Wire encode/decode of these
//! packets happens outside this crate; here they are plain structures with
//! the accessors the retransmission and scoring paths need.

use crate::sequence::SeqNumber;

/// Number of sequence numbers one NACK item can name: the base plus 16 bits
pub const NACK_ITEM_SPAN: usize = 17;

/// One generic-NACK item: a definitely-lost base sequence number plus a
/// bitmask where bit `i` marks `packet_id + i + 1` as also lost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NackItem {
    /// First lost sequence number
    pub packet_id: SeqNumber,
    /// Bitmask of the 16 following sequence numbers
    pub bitmask: u16,
}

impl NackItem {
    /// Create a new NACK item
    pub fn new(packet_id: SeqNumber, bitmask: u16) -> Self {
        NackItem { packet_id, bitmask }
    }

    /// The lost sequence numbers this item names, in ascending order
    pub fn lost_sequences(&self) -> impl Iterator<Item = SeqNumber> + '_ {
        let base = self.packet_id;
        let mask = self.bitmask;

        std::iter::once(base).chain((0..16u16).filter_map(move |bit| {
            if mask & (1 << bit) != 0 {
                Some(base + bit + 1)
            } else {
                None
            }
        }))
    }
}

/// A NACK feedback packet: a sequence of lost-packet items for one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NackPacket {
    /// SSRC of the packet sender (the receiver of the media)
    pub sender_ssrc: u32,
    /// SSRC of the media stream the losses belong to
    pub media_ssrc: u32,
    /// Lost-packet items
    pub items: Vec<NackItem>,
}

impl NackPacket {
    /// Create a new NACK packet
    pub fn new(sender_ssrc: u32, media_ssrc: u32, items: Vec<NackItem>) -> Self {
        NackPacket {
            sender_ssrc,
            media_ssrc,
            items,
        }
    }
}

/// One receiver-report block, as seen by the stream it reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiverReport {
    /// SSRC of the reported stream
    pub ssrc: u32,
    /// Fraction of packets lost since the previous report (fixed point /256)
    pub fraction_lost: u8,
    /// Cumulative number of packets lost
    pub total_lost: u32,
    /// Extended highest sequence number received
    pub highest_sequence: u32,
    /// Interarrival jitter in timestamp units
    pub jitter: u32,
    /// Compact NTP timestamp of the last sender report received
    pub last_sr: u32,
    /// Delay since that sender report, in 1/65536 s units
    pub delay_since_last_sr: u32,
}

/// A sender report snapshot for one reporting interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReport {
    /// SSRC of the sending stream
    pub ssrc: u32,
    /// NTP seconds at report time
    pub ntp_sec: u32,
    /// NTP fraction at report time
    pub ntp_frac: u32,
    /// RTP media timestamp corresponding to the NTP time
    pub rtp_timestamp: u32,
    /// Total packets sent
    pub packet_count: u32,
    /// Total payload bytes sent
    pub octet_count: u32,
}

/// A source-description chunk carrying the stream's canonical name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesChunk {
    /// SSRC the description belongs to
    pub ssrc: u32,
    /// Canonical end-point identifier
    pub cname: String,
}

/// Key frame request types forwarded upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFrameRequest {
    /// Picture loss indication
    Pli,
    /// Full intra request
    Fir,
}

/// Smoothed round-trip-time estimator
///
/// Keeps an exponentially weighted moving average of RTT samples in
/// milliseconds. The first sample initializes the estimate directly.
#[derive(Debug, Clone, Default)]
pub struct RttEstimator {
    srtt_ms: f32,
    has_sample: bool,
}

impl RttEstimator {
    /// Smoothing factor for new samples
    const ALPHA: f32 = 0.125;

    /// Create a new estimator with no samples
    pub fn new() -> Self {
        RttEstimator::default()
    }

    /// Update with a new RTT sample in milliseconds
    pub fn update(&mut self, sample_ms: f32) {
        if self.has_sample {
            self.srtt_ms += Self::ALPHA * (sample_ms - self.srtt_ms);
        } else {
            self.srtt_ms = sample_ms;
            self.has_sample = true;
        }
    }

    /// Smoothed RTT in milliseconds, 0.0 until the first sample
    pub fn srtt_ms(&self) -> f32 {
        self.srtt_ms
    }

    /// Whether any sample has been observed
    pub fn has_sample(&self) -> bool {
        self.has_sample
    }
}
