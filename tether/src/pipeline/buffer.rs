//! Fixed buffers and the fill/drain ring.

use crate::trace::trace;

/// One fixed-capacity byte buffer with read and write positions.
///
/// Bytes in `read_pos..write_pos` are pending for the consumer.
#[derive(Debug)]
pub(crate) struct Buffer {
    data: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
}

impl Buffer {
    fn new(capacity: usize) -> Self {
        Self { data: vec![0; capacity].into_boxed_slice(), read_pos: 0, write_pos: 0 }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Space left after `write_pos`.
    #[inline]
    pub(crate) fn free(&self) -> usize {
        self.data.len() - self.write_pos
    }

    #[inline]
    pub(crate) fn pending(&self) -> usize {
        self.write_pos - self.read_pos
    }

    #[inline]
    pub(crate) fn is_drained(&self) -> bool {
        self.read_pos == self.write_pos
    }

    #[inline]
    pub(crate) fn readable(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_pos]
    }

    /// Writable space up to (not including) `limit`.
    #[inline]
    pub(crate) fn spare_mut(&mut self, limit: usize) -> &mut [u8] {
        &mut self.data[self.write_pos..limit]
    }

    #[inline]
    pub(crate) fn commit(&mut self, n: usize) {
        debug_assert!(self.write_pos + n <= self.data.len());
        self.write_pos += n;
    }

    #[inline]
    pub(crate) fn consume(&mut self, n: usize) {
        debug_assert!(self.read_pos + n <= self.write_pos);
        self.read_pos += n;
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Places `residue` in front of the pending bytes, compacting to offset 0.
    ///
    /// Caller checks `residue.len() + self.pending() <= self.capacity()`.
    pub(crate) fn prepend(&mut self, residue: &[u8]) {
        let pending = self.pending();
        debug_assert!(residue.len() + pending <= self.capacity());
        self.data.copy_within(self.read_pos..self.write_pos, residue.len());
        self.data[..residue.len()].copy_from_slice(residue);
        self.read_pos = 0;
        self.write_pos = residue.len() + pending;
    }
}

/// Ring of `R` buffers with a fill cursor (producer side) and a drain
/// cursor (consumer side).
///
/// The fill cursor may equal the drain cursor or run ahead of it. It is never
/// moved onto the drain buffer, so the producer gets at most `R - 1` buffers
/// ahead of a stalled consumer.
#[derive(Debug)]
pub(crate) struct Ring {
    buffers: Box<[Buffer]>,
    fill: usize,
    drain: usize,
    /// A fill buffer with this much space or less is due for rotation.
    reserve: usize,
}

impl Ring {
    pub(crate) fn new(ring_size: usize, capacity: usize, reserve: usize) -> Self {
        Self {
            buffers: (0..ring_size).map(|_| Buffer::new(capacity)).collect(),
            fill: 0,
            drain: 0,
            reserve,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub(crate) const fn fill(&self) -> usize {
        self.fill
    }

    #[inline]
    pub(crate) const fn drain(&self) -> usize {
        self.drain
    }

    #[inline]
    pub(crate) const fn reserve(&self) -> usize {
        self.reserve
    }

    #[inline]
    pub(crate) fn next(&self, index: usize) -> usize {
        (index + 1) % self.buffers.len()
    }

    #[inline]
    pub(crate) fn is_sealed(&self) -> bool {
        self.drain != self.fill
    }

    pub(crate) fn fill_buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffers[self.fill]
    }

    pub(crate) fn drain_buffer(&self) -> &Buffer {
        &self.buffers[self.drain]
    }

    pub(crate) fn drain_buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffers[self.drain]
    }

    /// Total bytes waiting for the consumer across the ring.
    pub(crate) fn pending(&self) -> usize {
        self.buffers.iter().map(Buffer::pending).sum()
    }

    /// Moves the fill cursor on if its buffer is down to the reserve.
    ///
    /// Returns `false` when the next buffer is the drain buffer; the cursor
    /// stays put.
    pub(crate) fn rotate_fill(&mut self) -> bool {
        if self.buffers[self.fill].free() > self.reserve {
            return true;
        }
        let next = self.next(self.fill);
        if next == self.drain {
            return false;
        }
        self.buffers[next].clear();
        trace!(from = self.fill, to = next, "fill rotated");
        self.fill = next;
        true
    }

    /// Moves the drain cursor to the next buffer, clearing the one left.
    pub(crate) fn advance_drain(&mut self) {
        debug_assert!(self.is_sealed());
        self.buffers[self.drain].clear();
        let next = self.next(self.drain);
        trace!(from = self.drain, to = next, "drain rotated");
        self.drain = next;
    }

    /// Resets both positions to zero once the consumer has caught up with
    /// the producer in the same buffer.
    pub(crate) fn reset_if_drained(&mut self) {
        if !self.is_sealed() && self.buffers[self.drain].is_drained() {
            self.buffers[self.drain].clear();
        }
    }

    /// Carries the unconsumed bytes of the sealed drain buffer over to the
    /// front of the next buffer and advances the drain cursor.
    ///
    /// Returns `Err((residue, free))` without touching anything when the
    /// residue does not fit.
    pub(crate) fn stitch_residue(&mut self) -> Result<(), (usize, usize)> {
        debug_assert!(self.is_sealed());
        let next = self.next(self.drain);
        let residue = self.buffers[self.drain].pending();
        if residue > 0 {
            let free = self.buffers[next].capacity() - self.buffers[next].pending();
            if residue > free {
                return Err((residue, free));
            }
            let (from, to) = pair_mut(&mut self.buffers, self.drain, next);
            to.prepend(from.readable());
            trace!(residue, into = next, "residue stitched");
        }
        self.advance_drain();
        Ok(())
    }
}

/// Two distinct elements of `slice` borrowed mutably at once.
fn pair_mut<T>(slice: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = slice.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = slice.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
