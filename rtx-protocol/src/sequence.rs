//! Sequence Number Handling
//!
//! RTP sequence numbers are 16 bits and wrap at 65536. This module provides
//! a wrapped sequence number type whose ordering and arithmetic stay correct
//! across the wrap boundary.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Number of distinct sequence numbers (the wrap modulus)
pub const SEQ_NUMBER_SPACE: u32 = 1 << 16;

/// Half of the sequence number space, used as the ordering threshold
const HALF_SPACE: i32 = (SEQ_NUMBER_SPACE / 2) as i32;

/// Sequence number with 16-bit wraparound semantics
///
/// A sequence number `a` is "before" `b` when the forward distance from `a`
/// to `b`, modulo 65536, is less than 32768. Raw integer ordering gives the
/// wrong answer across the wrap boundary, so `Ord`/`PartialOrd` are
/// intentionally not derived; use [`SeqNumber::lt`] and friends.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct SeqNumber(u16);

impl SeqNumber {
    /// Create a new sequence number
    #[inline]
    pub fn new(value: u16) -> Self {
        SeqNumber(value)
    }

    /// Get the raw sequence number value
    #[inline]
    pub fn as_raw(self) -> u16 {
        self.0
    }

    /// Increment the sequence number by 1, wrapping at the boundary
    #[inline]
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    /// Get the next sequence number
    #[inline]
    pub fn next(self) -> Self {
        SeqNumber(self.0.wrapping_add(1))
    }

    /// Calculate the signed distance from this sequence number to another
    ///
    /// Returns a distance in `[-32768, 32767]` that accounts for wraparound.
    /// Positive values mean `other` is ahead of `self`, negative means
    /// `other` is behind; a forward distance of exactly half the space maps
    /// to `-32768`, so it never counts as "ahead".
    pub fn distance_to(self, other: SeqNumber) -> i32 {
        let diff = other.0.wrapping_sub(self.0) as i32;

        if diff >= HALF_SPACE {
            diff - SEQ_NUMBER_SPACE as i32
        } else {
            diff
        }
    }

    /// Forward distance from this sequence number to another, modulo 65536
    ///
    /// This is the number of increments needed to reach `other` from `self`,
    /// which doubles as the offset of `other` in a window whose oldest entry
    /// is `self`.
    #[inline]
    pub fn forward_distance_to(self, other: SeqNumber) -> u16 {
        other.0.wrapping_sub(self.0)
    }

    /// Check if this sequence number is before another under wraparound
    #[inline]
    pub fn lt(self, other: SeqNumber) -> bool {
        self.distance_to(other) > 0
    }

    /// Check if this sequence number is before or equal to another
    #[inline]
    pub fn le(self, other: SeqNumber) -> bool {
        self == other || self.lt(other)
    }

    /// Check if this sequence number is after another under wraparound
    #[inline]
    pub fn gt(self, other: SeqNumber) -> bool {
        self.distance_to(other) < 0
    }

    /// Check if this sequence number is after or equal to another
    #[inline]
    pub fn ge(self, other: SeqNumber) -> bool {
        self == other || self.gt(other)
    }
}

impl fmt::Debug for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNumber({})", self.0)
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for SeqNumber {
    fn from(value: u16) -> Self {
        SeqNumber(value)
    }
}

impl From<SeqNumber> for u16 {
    fn from(seq: SeqNumber) -> u16 {
        seq.0
    }
}

impl Add<u16> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: u16) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs))
    }
}

impl AddAssign<u16> for SeqNumber {
    fn add_assign(&mut self, rhs: u16) {
        self.0 = self.0.wrapping_add(rhs);
    }
}

impl Sub<u16> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: u16) -> SeqNumber {
        SeqNumber(self.0.wrapping_sub(rhs))
    }
}

impl SubAssign<u16> for SeqNumber {
    fn sub_assign(&mut self, rhs: u16) {
        self.0 = self.0.wrapping_sub(rhs);
    }
}

impl Sub for SeqNumber {
    type Output = i32;

    /// Calculate the signed distance between two sequence numbers
    fn sub(self, rhs: SeqNumber) -> i32 {
        rhs.distance_to(self)
    }
}
