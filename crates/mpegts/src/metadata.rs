//! Per-packet metadata carried alongside each transport packet.
//!
//! The metadata record travels next to its packet through buffers and
//! windows, and has a fixed 14-byte wire serialization used by the DUCK
//! envelope format. Auxiliary data and the transient flags (flush request,
//! bitrate change) are deliberately not serialized.

use crate::{Result, TsError};

/// Serialized metadata size in bytes.
pub const METADATA_SERIALIZED_SIZE: usize = 14;

/// Magic byte of a serialized metadata record: the sync byte XOR 0xFF,
/// which can never be mistaken for the start of a raw packet.
pub const METADATA_MAGIC: u8 = 0xB8;

/// Maximum auxiliary data size in bytes.
pub const AUX_DATA_MAX: usize = 16;

/// Sentinel for an absent input timestamp on the wire.
const TIMESTAMP_INVALID: u64 = u64::MAX;

/// Origin of a packet's input timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TimeSource {
    /// No known origin.
    #[default]
    Undefined = 0,
    /// Stamped by receiving hardware.
    Hardware = 1,
    /// Stamped by the kernel at reception.
    Kernel = 2,
    /// Supplied by the application.
    User = 3,
    /// Recovered from an RTP envelope.
    Rtp = 4,
    /// Extracted from an M2TS 4-byte packet header.
    M2ts = 5,
    /// Extracted from an RS204 trailer.
    Rs204 = 6,
    /// Deserialized from a DUCK metadata header.
    Duck = 7,
}

impl TimeSource {
    /// Decode a 4-bit time source value, unknown codes map to `Undefined`.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x0F {
            1 => TimeSource::Hardware,
            2 => TimeSource::Kernel,
            3 => TimeSource::User,
            4 => TimeSource::Rtp,
            5 => TimeSource::M2ts,
            6 => TimeSource::Rs204,
            7 => TimeSource::Duck,
            _ => TimeSource::Undefined,
        }
    }
}

/// A fixed-width set of packet labels, 0 to 31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LabelSet(u32);

impl LabelSet {
    /// Highest usable label.
    pub const MAX_LABEL: u8 = 31;

    /// The empty label set.
    pub fn new() -> Self {
        LabelSet(0)
    }

    /// Build a set from its raw 32-bit representation.
    pub fn from_bits(bits: u32) -> Self {
        LabelSet(bits)
    }

    /// Raw 32-bit representation.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Add a label. Labels above 31 are ignored.
    pub fn set(&mut self, label: u8) {
        if label <= Self::MAX_LABEL {
            self.0 |= 1 << label;
        }
    }

    /// Remove a label.
    pub fn clear(&mut self, label: u8) {
        if label <= Self::MAX_LABEL {
            self.0 &= !(1 << label);
        }
    }

    /// Check label membership.
    pub fn has(&self, label: u8) -> bool {
        label <= Self::MAX_LABEL && self.0 & (1 << label) != 0
    }

    /// Check if any label of `other` is present in this set.
    pub fn intersects(&self, other: LabelSet) -> bool {
        self.0 & other.0 != 0
    }

    /// Check if every label of `other` is present in this set.
    pub fn contains_all(&self, other: LabelSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// Add every label of `other` to this set.
    pub fn union_with(&mut self, other: LabelSet) {
        self.0 |= other.0;
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Metadata attached to one transport packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketMetadata {
    timestamp: Option<u64>,
    time_source: TimeSource,
    labels: LabelSet,
    flush_requested: bool,
    bitrate_changed: bool,
    input_stuffing: bool,
    nullified: bool,
    from_datagram: bool,
    aux: [u8; AUX_DATA_MAX],
    aux_len: u8,
}

impl PacketMetadata {
    /// A fresh metadata record with no timestamp, no labels, no flags.
    pub fn new() -> Self {
        PacketMetadata::default()
    }

    /// Input timestamp, when one was captured.
    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    /// Origin of the input timestamp.
    pub fn time_source(&self) -> TimeSource {
        self.time_source
    }

    /// Record an input timestamp and its origin.
    pub fn set_timestamp(&mut self, timestamp: u64, source: TimeSource) {
        // The all-ones value is the wire sentinel for "absent".
        self.timestamp = Some(timestamp.min(TIMESTAMP_INVALID - 1));
        self.time_source = source;
    }

    /// Forget the input timestamp.
    pub fn clear_timestamp(&mut self) {
        self.timestamp = None;
        self.time_source = TimeSource::Undefined;
    }

    /// Labels attached to the packet.
    pub fn labels(&self) -> LabelSet {
        self.labels
    }

    /// Mutable access to the label set.
    pub fn labels_mut(&mut self) -> &mut LabelSet {
        &mut self.labels
    }

    /// Check if a flush was requested at this packet.
    pub fn flush_requested(&self) -> bool {
        self.flush_requested
    }

    /// Request a flush at this packet.
    pub fn set_flush_requested(&mut self, on: bool) {
        self.flush_requested = on;
    }

    /// Check if the bitrate changed at this packet.
    pub fn bitrate_changed(&self) -> bool {
        self.bitrate_changed
    }

    /// Mark a bitrate change at this packet.
    pub fn set_bitrate_changed(&mut self, on: bool) {
        self.bitrate_changed = on;
    }

    /// Check if the packet was artificial input stuffing.
    pub fn input_stuffing(&self) -> bool {
        self.input_stuffing
    }

    /// Mark the packet as artificial input stuffing.
    pub fn set_input_stuffing(&mut self, on: bool) {
        self.input_stuffing = on;
    }

    /// Check if the packet was nullified.
    pub fn nullified(&self) -> bool {
        self.nullified
    }

    /// Mark the packet as nullified.
    pub fn set_nullified(&mut self, on: bool) {
        self.nullified = on;
    }

    /// Check if the packet came from a datagram.
    pub fn from_datagram(&self) -> bool {
        self.from_datagram
    }

    /// Mark the packet as received in a datagram.
    pub fn set_from_datagram(&mut self, on: bool) {
        self.from_datagram = on;
    }

    /// Auxiliary data bytes.
    pub fn aux_data(&self) -> &[u8] {
        &self.aux[..self.aux_len as usize]
    }

    /// Attach auxiliary data, truncated to 16 bytes.
    pub fn set_aux_data(&mut self, data: &[u8]) {
        let len = data.len().min(AUX_DATA_MAX);
        self.aux[..len].copy_from_slice(&data[..len]);
        self.aux_len = len as u8;
    }

    /// Drop the auxiliary data.
    pub fn clear_aux_data(&mut self) {
        self.aux_len = 0;
    }

    /// Reset the record to its default state.
    pub fn reset(&mut self) {
        *self = PacketMetadata::default();
    }

    /// Serialize into the fixed 14-byte wire layout.
    ///
    /// Auxiliary data and the flush/bitrate flags are transient and not
    /// carried on the wire.
    pub fn serialize(&self, out: &mut [u8; METADATA_SERIALIZED_SIZE]) {
        out[0] = METADATA_MAGIC;
        let ts = self.timestamp.unwrap_or(TIMESTAMP_INVALID);
        out[1..9].copy_from_slice(&ts.to_be_bytes());
        out[9..13].copy_from_slice(&self.labels.bits().to_be_bytes());
        out[13] = (u8::from(self.input_stuffing) << 7)
            | (u8::from(self.nullified) << 6)
            | (u8::from(self.from_datagram) << 5)
            | (self.time_source as u8 & 0x0F);
    }

    /// Deserialize from the 14-byte wire layout, replacing the whole
    /// record. Fields absent from the wire come back at their defaults.
    pub fn deserialize(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < METADATA_SERIALIZED_SIZE {
            return Err(TsError::MetadataTooShort(data.len()));
        }
        if data[0] != METADATA_MAGIC {
            return Err(TsError::InvalidMetadataMagic(data[0]));
        }
        self.reset();
        let mut ts_bytes = [0u8; 8];
        ts_bytes.copy_from_slice(&data[1..9]);
        let ts = u64::from_be_bytes(ts_bytes);
        self.timestamp = (ts != TIMESTAMP_INVALID).then_some(ts);
        let mut label_bytes = [0u8; 4];
        label_bytes.copy_from_slice(&data[9..13]);
        self.labels = LabelSet::from_bits(u32::from_be_bytes(label_bytes));
        self.input_stuffing = data[13] & 0x80 != 0;
        self.nullified = data[13] & 0x40 != 0;
        self.from_datagram = data[13] & 0x20 != 0;
        self.time_source = TimeSource::from_bits(data[13]);
        Ok(())
    }
}
