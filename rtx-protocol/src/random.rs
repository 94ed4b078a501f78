//! Randomness Capability
//!
//! The RTX sequence counter is seeded randomly when retransmission is
//! activated, so restarts do not collide in the RTX sequence space. The
//! source is an explicit capability rather than ambient global state, which
//! lets tests supply deterministic values.

use ring::rand::{SecureRandom as _, SystemRandom};

/// Uniform random source for protocol values
pub trait RandomSource {
    /// A uniformly distributed value in `[min, max]` (inclusive)
    fn random_u16(&mut self, min: u16, max: u16) -> u16;
}

/// Production random source backed by the system CSPRNG
pub struct SecureRandom {
    rng: SystemRandom,
}

impl SecureRandom {
    /// Create a new system-backed random source
    pub fn new() -> Self {
        SecureRandom {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for SecureRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SecureRandom {
    fn random_u16(&mut self, min: u16, max: u16) -> u16 {
        let mut bytes = [0u8; 2];
        if self.rng.fill(&mut bytes).is_err() {
            // The system RNG failing is not actionable here; fall back to
            // the lower bound rather than aborting the stream.
            tracing::warn!("system random source failed, falling back to {}", min);
            return min;
        }

        let value = u16::from_be_bytes(bytes);
        let span = (max as u32 - min as u32) + 1;

        min + (value as u32 % span) as u16
    }
}
