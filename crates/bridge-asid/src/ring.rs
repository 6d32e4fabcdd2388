//! Growable ring buffer for streamed register writes.
//!
//! The ring stores fixed 4-byte entries of `(register, value, delay_hi,
//! delay_lo)`. The backing allocation is made once at the maximum size;
//! only the logical window grows, so growth never reallocates and never
//! stalls the stream.

use log::warn;

/// Register writes in one ASID frame.
pub const FRAME_WRITES: usize = 28;
/// Bytes one full frame occupies in the ring.
pub const FRAME_BYTES: usize = FRAME_WRITES * 4;
/// Logical ring size at startup, in frames.
pub const RING_DEFAULT_FRAMES: usize = 20;
/// Ceiling for ring growth, in frames.
pub const RING_MAX_FRAMES: usize = 150;
/// Headroom in bytes below which the ring should grow.
pub const LOW_HEADROOM: usize = 4 * FRAME_BYTES;

const GROW_STEP: usize = RING_DEFAULT_FRAMES * FRAME_BYTES;
const DEFAULT_BYTES: usize = RING_DEFAULT_FRAMES * FRAME_BYTES;
const MAX_BYTES: usize = RING_MAX_FRAMES * FRAME_BYTES;

/// Byte ring with a one-slot gap between the write and read cursors.
///
/// Entries are pushed and popped whole. A push that would collide with
/// the read cursor drops the entry rather than block or overwrite.
pub struct FrameRing {
    buffer: Box<[u8]>,
    ring_size: usize,
    ring_read: usize,
    ring_write: usize,
}

impl FrameRing {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: vec![0; MAX_BYTES].into_boxed_slice(),
            ring_size: DEFAULT_BYTES,
            ring_read: 0,
            ring_write: 0,
        }
    }

    /// Bytes currently stored.
    #[must_use]
    pub fn fill(&self) -> usize {
        (self.ring_write + self.ring_size - self.ring_read) % self.ring_size
    }

    /// Bytes that can still be pushed before the cursors collide.
    #[must_use]
    pub fn headroom(&self) -> usize {
        self.ring_size - 1 - self.fill()
    }

    /// Current logical size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.ring_size
    }

    #[must_use]
    pub fn at_max(&self) -> bool {
        self.ring_size >= MAX_BYTES
    }

    /// Queue one register write. Returns false when the ring is full;
    /// the entry is dropped, never partially stored.
    pub fn push(&mut self, entry: [u8; 4]) -> bool {
        if self.headroom() < entry.len() {
            warn!("ring full, register write dropped");
            return false;
        }
        for byte in entry {
            self.buffer[self.ring_write] = byte;
            self.ring_write = (self.ring_write + 1) % self.ring_size;
        }
        true
    }

    /// Take the oldest register write off the ring.
    pub fn pop(&mut self) -> Option<[u8; 4]> {
        if self.fill() < 4 {
            return None;
        }
        let mut entry = [0u8; 4];
        for byte in &mut entry {
            *byte = self.buffer[self.ring_read];
            self.ring_read = (self.ring_read + 1) % self.ring_size;
        }
        Some(entry)
    }

    /// Widen the logical window by whole growth steps.
    ///
    /// When the stored data crosses the old logical end, the post-wrap
    /// segment (bytes `[0, ring_write)`) is first copied to the region
    /// beyond the old size so the data stays one contiguous run from
    /// `ring_read`. The new size is chosen to cover the relocated write
    /// cursor; if even the maximum cannot, the ring stays as it is.
    pub fn grow(&mut self) -> bool {
        if self.ring_size >= MAX_BYTES {
            return false;
        }
        let old = self.ring_size;
        let tail = if self.ring_write < self.ring_read {
            Some(self.ring_write)
        } else {
            None
        };
        let mut new_size = (old + GROW_STEP).min(MAX_BYTES);
        if let Some(len) = tail {
            while new_size <= old + len {
                if new_size == MAX_BYTES {
                    return false;
                }
                new_size = (new_size + GROW_STEP).min(MAX_BYTES);
            }
            self.buffer.copy_within(..len, old);
            self.ring_write = old + len;
        }
        self.ring_size = new_size;
        true
    }

    /// Drop all stored data and shrink back to the default size.
    pub fn reset(&mut self) {
        self.ring_size = DEFAULT_BYTES;
        self.ring_read = 0;
        self.ring_write = 0;
    }
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn entry(sequence: u32) -> [u8; 4] {
        [
            sequence as u8,
            (sequence >> 8) as u8,
            (sequence >> 16) as u8,
            0,
        ]
    }

    #[test]
    fn entries_come_back_in_push_order() {
        let mut ring = FrameRing::new();
        for i in 0..10 {
            assert!(ring.push(entry(i)), "push {i} should fit an empty ring");
        }
        for i in 0..10 {
            assert_eq!(ring.pop(), Some(entry(i)), "entry {i} out of order");
        }
        assert_eq!(ring.pop(), None, "drained ring should be empty");
    }

    #[test]
    fn full_ring_drops_the_entry() {
        let mut ring = FrameRing::new();
        let mut pushed = 0;
        while ring.push(entry(pushed)) {
            pushed += 1;
        }
        // 20 frames of 112 bytes leave one byte shy of 560 entries.
        assert_eq!(pushed, 559, "default window should hold 559 writes");
        assert_eq!(ring.fill(), 559 * 4);
        assert_eq!(ring.pop(), Some(entry(0)), "drop must not disturb stored data");
    }

    #[test]
    fn growth_preserves_order_across_a_wrapped_tail() {
        let mut ring = FrameRing::new();
        let mut next_in = 0u32;
        let mut next_out = 0u32;
        for _ in 0..500 {
            assert!(ring.push(entry(next_in)));
            next_in += 1;
        }
        for _ in 0..400 {
            assert_eq!(ring.pop(), Some(entry(next_out)));
            next_out += 1;
        }
        // 100 more entries wrap the write cursor past the logical end.
        for _ in 0..100 {
            assert!(ring.push(entry(next_in)));
            next_in += 1;
        }
        assert!(ring.grow(), "one step should cover a 160-byte tail");
        assert_eq!(ring.size(), 2 * RING_DEFAULT_FRAMES * FRAME_BYTES);
        while next_out < next_in {
            assert_eq!(
                ring.pop(),
                Some(entry(next_out)),
                "entry {next_out} lost or reordered by growth"
            );
            next_out += 1;
        }
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn growth_handles_a_write_cursor_parked_at_zero() {
        let mut ring = FrameRing::new();
        let mut next_in = 0u32;
        let mut next_out = 0u32;
        for _ in 0..300 {
            assert!(ring.push(entry(next_in)));
            next_in += 1;
        }
        for _ in 0..200 {
            assert_eq!(ring.pop(), Some(entry(next_out)));
            next_out += 1;
        }
        // 260 more land the write cursor exactly on byte zero.
        for _ in 0..260 {
            assert!(ring.push(entry(next_in)));
            next_in += 1;
        }
        assert!(ring.grow());
        while next_out < next_in {
            assert_eq!(ring.pop(), Some(entry(next_out)), "entry {next_out} lost");
            next_out += 1;
        }
    }

    #[test]
    fn growth_stops_at_the_maximum() {
        let mut ring = FrameRing::new();
        let mut steps = 0;
        while ring.grow() {
            steps += 1;
        }
        assert!(ring.at_max(), "growth should end at the ceiling");
        assert_eq!(ring.size(), RING_MAX_FRAMES * FRAME_BYTES);
        assert_eq!(steps, 7, "20 to 150 frames is seven steps");
        assert!(!ring.grow(), "a maxed ring must refuse to grow");
    }

    #[test]
    fn reset_restores_the_default_window() {
        let mut ring = FrameRing::new();
        for i in 0..600 {
            if !ring.push(entry(i)) {
                assert!(ring.grow());
                assert!(ring.push(entry(i)));
            }
        }
        assert!(ring.size() > RING_DEFAULT_FRAMES * FRAME_BYTES);
        ring.reset();
        assert_eq!(ring.size(), RING_DEFAULT_FRAMES * FRAME_BYTES);
        assert_eq!(ring.fill(), 0);
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn random_interleaving_matches_a_queue_model() {
        let mut rng = StdRng::seed_from_u64(0x51D_B41D);
        let mut ring = FrameRing::new();
        let mut model: VecDeque<u32> = VecDeque::new();
        let mut sequence = 0u32;
        for _ in 0..20_000 {
            match rng.random_range(0..10) {
                0..=4 => {
                    if ring.push(entry(sequence)) {
                        model.push_back(sequence);
                    }
                    sequence += 1;
                }
                5..=8 => {
                    let expected = model.pop_front().map(entry);
                    assert_eq!(ring.pop(), expected, "ring diverged from the model");
                }
                _ => {
                    // Growth at arbitrary cursor positions must be invisible.
                    ring.grow();
                }
            }
            assert_eq!(ring.fill(), model.len() * 4, "fill accounting diverged");
        }
        while let Some(expected) = model.pop_front() {
            assert_eq!(ring.pop(), Some(entry(expected)));
        }
        assert_eq!(ring.pop(), None);
    }
}
