//! Retention Buffer for Outgoing Packets
//!
//! Two pieces back the retransmission path: a payload pool of fixed-size
//! byte slots holding the physical packet bytes, and a sequence-ordered
//! window of buffer entries referencing those slots. Both are sized once at
//! construction (`N` logical entries, `N + 1` physical cells so a new packet
//! can be admitted before the oldest is evicted) and never allocate again.

use crate::packet::RTX_ENCODING_MARGIN;
use crate::sequence::SeqNumber;
use thiserror::Error;

/// Buffer errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer is full")]
    Full,

    #[error("entry with sequence number {0} already stored")]
    Duplicate(SeqNumber),

    #[error("sequence number {0} would break ascending order")]
    OutOfOrder(SeqNumber),

    #[error("packet of {size} bytes exceeds slot size {max}")]
    PacketTooLarge { size: usize, max: usize },
}

/// Fixed arena of payload slots
///
/// Each slot holds one retained packet's wire bytes plus headroom for the
/// retransmission-format rewrite. Slot occupancy is tracked with a free
/// list so an evicted entry's slot can be handed to the next admission.
pub struct PayloadPool {
    /// One contiguous allocation, `slot_count * slot_size` bytes
    data: Box<[u8]>,
    slot_size: usize,
    /// Indices of unoccupied slots
    free: Vec<usize>,
}

impl PayloadPool {
    /// Create a pool of `slot_count` slots sized for `mtu`-byte packets
    pub fn new(slot_count: usize, mtu: usize) -> Self {
        let slot_size = mtu + RTX_ENCODING_MARGIN;

        PayloadPool {
            data: vec![0u8; slot_count * slot_size].into_boxed_slice(),
            slot_size,
            free: (0..slot_count).rev().collect(),
        }
    }

    /// Bytes available in each slot
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Total number of slots
    pub fn slot_count(&self) -> usize {
        self.data.len() / self.slot_size
    }

    /// Number of unoccupied slots
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    /// Take ownership of a free slot, if any
    pub fn acquire(&mut self) -> Option<usize> {
        self.free.pop()
    }

    /// Return a slot to the free list
    pub fn release(&mut self, index: usize) {
        debug_assert!(index < self.slot_count());
        debug_assert!(!self.free.contains(&index));
        self.free.push(index);
    }

    /// Copy packet bytes into a slot, returning the writable slot bytes
    pub fn store(&mut self, index: usize, bytes: &[u8]) -> Result<&mut [u8], BufferError> {
        if bytes.len() > self.slot_size {
            return Err(BufferError::PacketTooLarge {
                size: bytes.len(),
                max: self.slot_size,
            });
        }

        let slot = self.slot_mut(index);
        slot[..bytes.len()].copy_from_slice(bytes);
        Ok(slot)
    }

    /// Read-only view of a slot
    pub fn slot(&self, index: usize) -> &[u8] {
        let offset = index * self.slot_size;
        &self.data[offset..offset + self.slot_size]
    }

    /// Writable view of a slot
    pub fn slot_mut(&mut self, index: usize) -> &mut [u8] {
        let offset = index * self.slot_size;
        &mut self.data[offset..offset + self.slot_size]
    }

    /// Free every slot at once (stream pause/reset path)
    pub fn reset(&mut self) {
        self.free.clear();
        self.free.extend((0..self.slot_count()).rev());
    }
}

/// Retransmission metadata for one retained packet
#[derive(Debug, Clone, Copy)]
pub struct BufferEntry {
    /// RTP sequence number of the stored packet
    pub seq: SeqNumber,
    /// Pool slot holding the packet bytes
    pub storage_index: usize,
    /// Live byte length inside the slot
    pub packet_len: usize,
    /// Last time this packet was resent (ms, 0 = never)
    pub resent_at: u64,
    /// Number of times this packet was resent
    pub resend_count: u8,
    /// Whether the slot bytes have been rewritten into RTX format
    pub rtx_encoded: bool,
}

impl BufferEntry {
    /// Create an entry for a freshly stored packet
    pub fn new(seq: SeqNumber, storage_index: usize, packet_len: usize) -> Self {
        BufferEntry {
            seq,
            storage_index,
            packet_len,
            resent_at: 0,
            resend_count: 0,
            rtx_encoded: false,
        }
    }
}

impl Default for BufferEntry {
    fn default() -> Self {
        BufferEntry::new(SeqNumber::new(0), 0, 0)
    }
}

/// Sequence-ordered window of retained packets
///
/// A fixed arena of `max_size + 1` entry cells addressed with a head index
/// and length, using index arithmetic modulo the arena size. Entries are
/// kept in ascending wraparound sequence order; the cell beyond `max_size`
/// exists so admission can momentarily overshoot before the oldest entry is
/// trimmed.
pub struct RetransmissionBuffer {
    /// Entry arena, `max_size + 1` cells
    entries: Vec<BufferEntry>,
    /// Arena index of the oldest live entry
    start: usize,
    /// Number of live entries
    len: usize,
    /// Maximum number of entries between operations
    max_size: usize,
}

impl RetransmissionBuffer {
    /// Create an empty window retaining up to `max_size` packets
    pub fn new(max_size: usize) -> Self {
        RetransmissionBuffer {
            entries: vec![BufferEntry::default(); max_size + 1],
            start: 0,
            len: 0,
            max_size,
        }
    }

    /// Maximum number of live entries between operations
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Check whether the window holds no entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Arena index for a position relative to the oldest entry
    #[inline]
    fn physical(&self, index: usize) -> usize {
        (self.start + index) % self.entries.len()
    }

    /// The oldest live entry
    pub fn first(&self) -> Option<&BufferEntry> {
        if self.is_empty() {
            None
        } else {
            Some(&self.entries[self.start])
        }
    }

    /// The newest live entry
    pub fn last(&self) -> Option<&BufferEntry> {
        if self.is_empty() {
            None
        } else {
            Some(&self.entries[self.physical(self.len - 1)])
        }
    }

    /// Entry at `index` relative to the oldest (0 = oldest)
    pub fn get(&self, index: usize) -> Option<&BufferEntry> {
        if index < self.len {
            Some(&self.entries[self.physical(index)])
        } else {
            None
        }
    }

    /// Mutable entry at `index` relative to the oldest
    pub fn get_mut(&mut self, index: usize) -> Option<&mut BufferEntry> {
        if index < self.len {
            let physical = self.physical(index);
            Some(&mut self.entries[physical])
        } else {
            None
        }
    }

    /// Look up the live entry for `seq`, if any
    pub fn find_by_sequence(&self, seq: SeqNumber) -> Option<&BufferEntry> {
        self.position_of(seq).map(|i| &self.entries[self.physical(i)])
    }

    /// Mutable lookup of the live entry for `seq`, if any
    pub fn find_by_sequence_mut(&mut self, seq: SeqNumber) -> Option<&mut BufferEntry> {
        let position = self.position_of(seq)?;
        let physical = self.physical(position);
        Some(&mut self.entries[physical])
    }

    /// Position of `seq` relative to the oldest entry
    ///
    /// Packets are admitted in non-decreasing sequence order during normal
    /// operation, so the forward distance from the oldest entry's sequence
    /// number usually IS the position. When insertions arrived out of
    /// sequence order (probe or padding packets) that mapping has gaps, and
    /// an ordered scan with early exit resolves the general case.
    fn position_of(&self, seq: SeqNumber) -> Option<usize> {
        let first = self.first()?;

        let offset = first.seq.forward_distance_to(seq) as usize;
        if offset < self.len && self.entries[self.physical(offset)].seq == seq {
            return Some(offset);
        }

        for index in 0..self.len {
            let entry = &self.entries[self.physical(index)];
            if entry.seq == seq {
                return Some(index);
            }
            if entry.seq.gt(seq) {
                break;
            }
        }

        None
    }

    /// Admit an entry at the tail
    ///
    /// Fails if the entry does not extend the ascending order or if every
    /// physical cell is occupied (the caller must evict first).
    pub fn append(&mut self, entry: BufferEntry) -> Result<(), BufferError> {
        if self.len == self.entries.len() {
            return Err(BufferError::Full);
        }

        if let Some(last) = self.last() {
            if last.seq == entry.seq {
                return Err(BufferError::Duplicate(entry.seq));
            }
            if last.seq.gt(entry.seq) {
                return Err(BufferError::OutOfOrder(entry.seq));
            }
        }

        let physical = self.physical(self.len);
        self.entries[physical] = entry;
        self.len += 1;
        Ok(())
    }

    /// Insert an entry at the position preserving ascending wraparound order
    ///
    /// Returns the placed entry, [`BufferError::Duplicate`] if the sequence
    /// number is already live (the window is unchanged), or
    /// [`BufferError::Full`] when every physical cell is occupied.
    pub fn insert_ordered(&mut self, entry: BufferEntry) -> Result<&mut BufferEntry, BufferError> {
        if self.len == self.entries.len() {
            return Err(BufferError::Full);
        }

        // Scan from the newest entry; normal admission lands at the tail.
        let mut position = self.len;
        while position > 0 {
            let prev = self.entries[self.physical(position - 1)];
            if prev.seq == entry.seq {
                return Err(BufferError::Duplicate(entry.seq));
            }
            if prev.seq.lt(entry.seq) {
                break;
            }
            position -= 1;
        }

        // Shift newer entries one cell toward the tail within the ring.
        let mut index = self.len;
        while index > position {
            let to = self.physical(index);
            let from = self.physical(index - 1);
            self.entries[to] = self.entries[from];
            index -= 1;
        }

        let physical = self.physical(position);
        self.entries[physical] = entry;
        self.len += 1;
        Ok(&mut self.entries[physical])
    }

    /// Remove and return the oldest entry, freeing its cell
    ///
    /// The caller is responsible for releasing the evicted entry's pool slot.
    pub fn evict_oldest(&mut self) -> Option<BufferEntry> {
        if self.is_empty() {
            return None;
        }

        let entry = self.entries[self.start];
        self.start = (self.start + 1) % self.entries.len();
        self.len -= 1;
        Some(entry)
    }

    /// Drop all live entries
    pub fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
    }
}
