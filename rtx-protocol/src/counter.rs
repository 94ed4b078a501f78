//! Outbound Transmission Counting
//!
//! Tracks packets and bytes sent by a stream and derives a short-horizon
//! bitrate from a sliding window of fixed buckets. All state is sized at
//! construction; updating and reading never allocate.

/// Length of the rate window in milliseconds
const WINDOW_MS: u64 = 1000;

/// Number of buckets the window is divided into
const BUCKET_COUNT: usize = 100;

/// Byte-rate calculator over a sliding window of fixed buckets
#[derive(Debug, Clone)]
pub struct RateCalculator {
    /// Bytes recorded per bucket
    buckets: Vec<u64>,
    /// Milliseconds covered by one bucket
    bucket_ms: u64,
    /// Total bytes currently inside the window
    total_bytes: u64,
    /// Start time of the newest bucket (aligned to bucket_ms)
    newest_bucket_start: u64,
    /// Index of the newest bucket
    newest_index: usize,
    /// Whether any update has been recorded
    started: bool,
}

impl RateCalculator {
    /// Create a calculator with the default 1 s window
    pub fn new() -> Self {
        RateCalculator {
            buckets: vec![0; BUCKET_COUNT],
            bucket_ms: WINDOW_MS / BUCKET_COUNT as u64,
            total_bytes: 0,
            newest_bucket_start: 0,
            newest_index: 0,
            started: false,
        }
    }

    /// Record `size` bytes at time `now_ms`
    pub fn update(&mut self, size: usize, now_ms: u64) {
        self.advance_to(now_ms);
        self.buckets[self.newest_index] += size as u64;
        self.total_bytes += size as u64;
    }

    /// Current rate in bits per second as of `now_ms`
    pub fn rate(&mut self, now_ms: u64) -> u32 {
        self.advance_to(now_ms);
        (self.total_bytes.saturating_mul(8).saturating_mul(1000) / WINDOW_MS) as u32
    }

    /// Slide the window forward so the newest bucket covers `now_ms`
    fn advance_to(&mut self, now_ms: u64) {
        let bucket_start = now_ms - now_ms % self.bucket_ms;

        if !self.started {
            self.started = true;
            self.newest_bucket_start = bucket_start;
            return;
        }

        if bucket_start <= self.newest_bucket_start {
            // Same bucket, or time moved backwards; keep the newest bucket.
            return;
        }

        if bucket_start - self.newest_bucket_start >= WINDOW_MS {
            // The whole window expired.
            self.buckets.iter_mut().for_each(|b| *b = 0);
            self.total_bytes = 0;
            self.newest_bucket_start = bucket_start;
            return;
        }

        while self.newest_bucket_start < bucket_start {
            self.newest_index = (self.newest_index + 1) % self.buckets.len();
            self.total_bytes -= self.buckets[self.newest_index];
            self.buckets[self.newest_index] = 0;
            self.newest_bucket_start += self.bucket_ms;
        }
    }
}

impl Default for RateCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Running counter of everything a stream has transmitted
#[derive(Debug, Clone, Default)]
pub struct TransmissionCounter {
    rate: RateCalculator,
    packets: u64,
    bytes: u64,
}

impl TransmissionCounter {
    /// Create a new counter
    pub fn new() -> Self {
        TransmissionCounter::default()
    }

    /// Record one sent packet of `size` bytes at time `now_ms`
    pub fn add_packet(&mut self, size: usize, now_ms: u64) {
        self.rate.update(size, now_ms);
        self.packets += 1;
        self.bytes += size as u64;
    }

    /// Outbound bitrate in bits per second as of `now_ms`
    pub fn bitrate(&mut self, now_ms: u64) -> u32 {
        self.rate.rate(now_ms)
    }

    /// Total packets recorded
    pub fn packet_count(&self) -> u64 {
        self.packets
    }

    /// Total bytes recorded
    pub fn byte_count(&self) -> u64 {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_within_window() {
        let mut calc = RateCalculator::new();

        calc.update(1000, 0);
        calc.update(250, 400);

        // 1250 bytes over a 1 s window.
        assert_eq!(calc.rate(900), 1250 * 8);
    }

    #[test]
    fn test_rate_expires() {
        let mut calc = RateCalculator::new();

        calc.update(1000, 0);
        assert_eq!(calc.rate(500), 8000);
        assert_eq!(calc.rate(2000), 0);
    }

    #[test]
    fn test_rate_partial_expiry() {
        let mut calc = RateCalculator::new();

        calc.update(1000, 0);
        calc.update(500, 600);

        // At 1100 the first update has slid out, the second is still in.
        assert_eq!(calc.rate(1100), 500 * 8);
    }

    #[test]
    fn test_counter_totals() {
        let mut counter = TransmissionCounter::new();

        counter.add_packet(1200, 10);
        counter.add_packet(800, 20);

        assert_eq!(counter.packet_count(), 2);
        assert_eq!(counter.byte_count(), 2000);
        assert_eq!(counter.bitrate(500), 2000 * 8);
    }
}
