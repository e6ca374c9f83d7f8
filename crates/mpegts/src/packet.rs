//! 188-byte transport stream packet model.
//!
//! [`TsPacket`] is a plain value wrapping the raw 188 bytes; every accessor
//! performs its mask/shift arithmetic directly on the byte array, so arrays
//! of packets are contiguous and exactly 188 bytes apart.

use crate::{Result, TsError};

/// Size of a TS packet in bytes.
pub const PACKET_SIZE: usize = 188;

/// Synchronization byte. Each packet starts with this byte.
pub const SYNC_BYTE: u8 = 0x47;

/// PAT PID (always 0x0000)
pub const PID_PAT: u16 = 0x0000;

/// CAT PID (always 0x0001)
pub const PID_CAT: u16 = 0x0001;

/// NULL PID (always 0x1FFF)
pub const PID_NULL: u16 = 0x1FFF;

/// Maximum valid PID value (13 bits).
pub const PID_MAX: u16 = 0x1FFF;

/// Transport Stream packet, a fixed 188-byte value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsPacket {
    pub(crate) data: [u8; PACKET_SIZE],
}

impl TsPacket {
    /// A null packet: PID 0x1FFF, payload only, 0xFF filler.
    pub const NULL: TsPacket = {
        let mut data = [0xFFu8; PACKET_SIZE];
        data[0] = SYNC_BYTE;
        data[1] = 0x1F;
        data[2] = 0xFF;
        data[3] = 0x10; // payload only, continuity counter 0
        TsPacket { data }
    };

    /// An empty packet: a full 183-byte stuffing adaptation field and no
    /// payload.
    pub const EMPTY: TsPacket = {
        let mut data = [0xFFu8; PACKET_SIZE];
        data[0] = SYNC_BYTE;
        data[1] = 0x1F;
        data[2] = 0xFF;
        data[3] = 0x20; // adaptation field only
        data[4] = 0xB7; // adaptation field length: 183
        data[5] = 0x00; // flags byte, no optional field
        TsPacket { data }
    };

    /// Reinitialize the packet in place: sync byte, given PID and
    /// continuity counter, no adaptation field, payload filled with `fill`.
    pub fn init(&mut self, pid: u16, cc: u8, fill: u8) {
        self.data = [fill; PACKET_SIZE];
        self.data[0] = SYNC_BYTE;
        self.data[1] = ((pid >> 8) & 0x1F) as u8;
        self.data[2] = (pid & 0xFF) as u8;
        self.data[3] = 0x10 | (cc & 0x0F);
    }

    /// Copy a packet out of a byte slice. The slice must hold at least 188
    /// bytes; no sync validation is performed here.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() < PACKET_SIZE {
            return Err(TsError::InvalidPacketSize(data.len()));
        }
        let mut packet = TsPacket::NULL;
        packet.data.copy_from_slice(&data[..PACKET_SIZE]);
        Ok(packet)
    }

    /// Raw packet bytes.
    pub fn as_bytes(&self) -> &[u8; PACKET_SIZE] {
        &self.data
    }

    /// Mutable raw packet bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8; PACKET_SIZE] {
        &mut self.data
    }

    /// Check that the sync byte is 0x47.
    pub fn has_valid_sync(&self) -> bool {
        self.data[0] == SYNC_BYTE
    }

    /// 13-bit Packet Identifier.
    pub fn pid(&self) -> u16 {
        ((self.data[1] as u16 & 0x1F) << 8) | self.data[2] as u16
    }

    /// Set the PID.
    pub fn set_pid(&mut self, pid: u16) {
        self.data[1] = (self.data[1] & 0xE0) | ((pid >> 8) & 0x1F) as u8;
        self.data[2] = (pid & 0xFF) as u8;
    }

    /// Check if this is a null packet.
    pub fn is_null(&self) -> bool {
        self.pid() == PID_NULL
    }

    /// Transport Error Indicator.
    pub fn transport_error(&self) -> bool {
        (self.data[1] & 0x80) != 0
    }

    /// Payload Unit Start Indicator.
    pub fn payload_unit_start(&self) -> bool {
        (self.data[1] & 0x40) != 0
    }

    /// Set the Payload Unit Start Indicator.
    pub fn set_payload_unit_start(&mut self, on: bool) {
        if on {
            self.data[1] |= 0x40;
        } else {
            self.data[1] &= !0x40;
        }
    }

    /// Transport Priority.
    pub fn priority(&self) -> bool {
        (self.data[1] & 0x20) != 0
    }

    /// 2-bit Transport Scrambling Control.
    pub fn scrambling_control(&self) -> u8 {
        (self.data[3] >> 6) & 0x03
    }

    /// Check if the packet is scrambled (scrambling control non-zero).
    pub fn is_scrambled(&self) -> bool {
        self.scrambling_control() != 0
    }

    /// 4-bit continuity counter.
    pub fn continuity_counter(&self) -> u8 {
        self.data[3] & 0x0F
    }

    /// Set the continuity counter.
    pub fn set_continuity_counter(&mut self, cc: u8) {
        self.data[3] = (self.data[3] & 0xF0) | (cc & 0x0F);
    }

    /// Check if the packet has an adaptation field.
    pub fn has_adaptation_field(&self) -> bool {
        (self.data[3] & 0x20) != 0
    }

    /// Check if the packet has a payload.
    pub fn has_payload(&self) -> bool {
        (self.data[3] & 0x10) != 0
    }

    /// Declared adaptation field length (the value of the length byte),
    /// 0 when no adaptation field is present.
    pub fn adaptation_field_size(&self) -> usize {
        if self.has_adaptation_field() {
            self.data[4] as usize
        } else {
            0
        }
    }

    /// Total header size: 4 bytes plus the adaptation field (length byte
    /// included), clamped to the packet size. A corrupted adaptation field
    /// length never yields a header larger than the packet.
    pub fn header_size(&self) -> usize {
        let size = if self.has_adaptation_field() {
            4 + 1 + self.data[4] as usize
        } else {
            4
        };
        size.min(PACKET_SIZE)
    }

    /// Payload size in bytes. `header_size() + payload_size()` equals 188
    /// for any packet carrying a payload.
    pub fn payload_size(&self) -> usize {
        if self.has_payload() {
            PACKET_SIZE - self.header_size()
        } else {
            0
        }
    }

    /// Payload bytes, empty when the packet has none.
    pub fn payload(&self) -> &[u8] {
        let start = PACKET_SIZE - self.payload_size();
        &self.data[start..]
    }

    /// Mutable payload bytes.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let start = PACKET_SIZE - self.payload_size();
        &mut self.data[start..]
    }

    /// Check if `other` is a duplicate of this packet.
    ///
    /// Duplicates are intentional retransmissions: both packets carry a
    /// payload, neither is a null packet, the header and the first two
    /// adaptation-field-or-payload bytes match, and everything past the PCR
    /// (when one is present) is byte-identical. Only the PCR value itself
    /// is allowed to differ.
    pub fn is_duplicate(&self, other: &TsPacket) -> bool {
        if !self.has_payload() || !other.has_payload() {
            return false;
        }
        if self.is_null() || other.is_null() {
            return false;
        }
        if self.data[0..6] != other.data[0..6] {
            return false;
        }
        // The first 6 bytes match, so both packets agree on adaptation
        // field length and flags; the PCR, when present, spans bytes 6-11.
        let start = if self.pcr_offset().is_some() { 12 } else { 6 };
        self.data[start..] == other.data[start..]
    }
}

impl Default for TsPacket {
    fn default() -> Self {
        TsPacket::NULL
    }
}

impl AsRef<[u8]> for TsPacket {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
