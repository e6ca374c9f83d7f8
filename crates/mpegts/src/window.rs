//! A logical window over packet buffers owned elsewhere.
//!
//! [`PacketWindow`] indexes one or more disjoint (packet, metadata) slice
//! pairs as a single run of logical indices `0..size`. It never owns the
//! memory; the owning buffer clears and rebuilds the window each
//! processing cycle.
//!
//! Dropping a packet flips a per-slot validity bit in the window itself,
//! leaving the packet bytes untouched, so a drop is reversible and
//! inspectable. Nullifying replaces the packet content with the null
//! packet and records the fact in its metadata.

use std::cell::Cell;

use crate::metadata::PacketMetadata;
use crate::packet::TsPacket;

struct WindowRange<'a> {
    packets: &'a mut [TsPacket],
    metadata: &'a mut [PacketMetadata],
    /// Logical index of the first slot in this range.
    first: usize,
}

/// A read/write view over externally owned packet buffers.
pub struct PacketWindow<'a> {
    ranges: Vec<WindowRange<'a>>,
    size: usize,
    /// Per logical slot; `false` means dropped.
    valid: Vec<bool>,
    dropped_count: usize,
    nullified_count: usize,
    /// Range index of the last lookup, sequential access stays O(1).
    cursor: Cell<usize>,
}

impl<'a> PacketWindow<'a> {
    /// Create an empty window.
    pub fn new() -> Self {
        PacketWindow {
            ranges: Vec::new(),
            size: 0,
            valid: Vec::new(),
            dropped_count: 0,
            nullified_count: 0,
            cursor: Cell::new(0),
        }
    }

    /// Append a contiguous run of slots to the window. The two slices
    /// must be parallel; the shorter length wins when they differ.
    pub fn add_range(
        &mut self,
        packets: &'a mut [TsPacket],
        metadata: &'a mut [PacketMetadata],
    ) {
        let count = packets.len().min(metadata.len());
        if count == 0 {
            return;
        }
        self.ranges.push(WindowRange {
            packets: &mut packets[..count],
            metadata: &mut metadata[..count],
            first: self.size,
        });
        self.size += count;
        self.valid.resize(self.size, true);
    }

    /// Number of logical slots in the window, dropped ones included.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Check if the window has no slots at all.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of packets dropped from the window.
    pub fn dropped_count(&self) -> usize {
        self.dropped_count
    }

    /// Number of packets nullified in the window.
    pub fn nullified_count(&self) -> usize {
        self.nullified_count
    }

    /// Map a logical index to (range index, offset within range).
    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.size {
            return None;
        }
        // Fast path: same range as the previous lookup, or the next one.
        let mut r = self.cursor.get().min(self.ranges.len() - 1);
        loop {
            let range = &self.ranges[r];
            if index < range.first {
                r -= 1; // never underflows: range 0 starts at index 0
            } else if index >= range.first + range.packets.len() {
                r += 1;
            } else {
                self.cursor.set(r);
                return Some((r, index - range.first));
            }
        }
    }

    /// Check if a slot has been dropped.
    pub fn is_dropped(&self, index: usize) -> bool {
        index < self.size && !self.valid[index]
    }

    /// The packet at a logical index; `None` for out-of-range or dropped
    /// slots.
    pub fn packet(&self, index: usize) -> Option<&TsPacket> {
        if !self.valid.get(index).copied().unwrap_or(false) {
            return None;
        }
        let (r, off) = self.locate(index)?;
        Some(&self.ranges[r].packets[off])
    }

    /// Mutable access to the packet at a logical index.
    pub fn packet_mut(&mut self, index: usize) -> Option<&mut TsPacket> {
        if !self.valid.get(index).copied().unwrap_or(false) {
            return None;
        }
        let (r, off) = self.locate(index)?;
        Some(&mut self.ranges[r].packets[off])
    }

    /// The metadata record at a logical index. Available even for dropped
    /// slots, since metadata describes what happened to the packet.
    pub fn metadata(&self, index: usize) -> Option<&PacketMetadata> {
        let (r, off) = self.locate(index)?;
        Some(&self.ranges[r].metadata[off])
    }

    /// Mutable access to the metadata record at a logical index.
    pub fn metadata_mut(&mut self, index: usize) -> Option<&mut PacketMetadata> {
        let (r, off) = self.locate(index)?;
        Some(&mut self.ranges[r].metadata[off])
    }

    /// Drop the packet at a logical index: the slot becomes invisible but
    /// the underlying bytes are untouched. Counted once per slot no
    /// matter how often it is called.
    pub fn drop_packet(&mut self, index: usize) {
        if index < self.size && self.valid[index] {
            self.valid[index] = false;
            self.dropped_count += 1;
        }
    }

    /// Undo a drop, making the slot visible again.
    pub fn restore_packet(&mut self, index: usize) {
        if index < self.size && !self.valid[index] {
            self.valid[index] = true;
            self.dropped_count -= 1;
        }
    }

    /// Replace the packet at a logical index with the null packet and
    /// mark its metadata. Counted once per slot: nullifying an already
    /// nullified packet changes nothing.
    pub fn nullify_packet(&mut self, index: usize) {
        let Some((r, off)) = self.locate(index) else {
            return;
        };
        let range = &mut self.ranges[r];
        if range.metadata[off].nullified() {
            return;
        }
        range.packets[off] = TsPacket::NULL;
        range.metadata[off].set_nullified(true);
        self.nullified_count += 1;
    }

    /// Iterate over the packets that have not been dropped, with their
    /// logical indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &TsPacket)> {
        self.ranges.iter().flat_map(move |range| {
            range
                .packets
                .iter()
                .enumerate()
                .filter(move |(off, _)| self.valid[range.first + off])
                .map(move |(off, packet)| (range.first + off, packet))
        })
    }

    /// Detach all ranges and reset every counter.
    pub fn clear(&mut self) {
        self.ranges.clear();
        self.size = 0;
        self.valid.clear();
        self.dropped_count = 0;
        self.nullified_count = 0;
        self.cursor.set(0);
    }
}

impl Default for PacketWindow<'_> {
    fn default() -> Self {
        PacketWindow::new()
    }
}
