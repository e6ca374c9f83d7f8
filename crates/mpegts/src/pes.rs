//! PES layer view over a transport packet.
//!
//! Detection of PES packet starts, PTS/DTS extraction and in-place rewrite,
//! and location of the PES header stuffing area. Everything here operates on
//! the payload of a single TS packet; a PES header that continues into the
//! next packet is reported as far as this packet allows.

use crate::packet::TsPacket;

/// Stream ids using the short (6-byte) PES header form. All other stream
/// ids carry the long form with flags and header data length.
fn is_long_header_stream_id(stream_id: u8) -> bool {
    !matches!(
        stream_id,
        0xBC // program stream map
        | 0xBE // padding stream
        | 0xBF // private stream 2
        | 0xF0 // ECM
        | 0xF1 // EMM
        | 0xF2 // DSM-CC
        | 0xF8 // ITU-T H.222.1 type E
        | 0xFF // program stream directory
    )
}

/// Decode a 33-bit PTS or DTS from its 5-byte encoding. Returns `None`
/// when any of the three marker bits is wrong.
fn parse_timestamp(data: &[u8; 5]) -> Option<u64> {
    if data[0] & 0x01 == 0 || data[2] & 0x01 == 0 || data[4] & 0x01 == 0 {
        return None;
    }
    Some(
        (((data[0] >> 1) & 0x07) as u64) << 30
            | (data[1] as u64) << 22
            | (((data[2] >> 1) & 0x7F) as u64) << 15
            | (data[3] as u64) << 7
            | (data[4] as u64) >> 1,
    )
}

/// Encode a 33-bit timestamp in place, preserving the 4-bit prefix of the
/// first byte and setting the three marker bits.
fn write_timestamp(data: &mut [u8; 5], value: u64) {
    data[0] = (data[0] & 0xF0) | (((value >> 29) & 0x0E) as u8) | 0x01;
    data[1] = (value >> 22) as u8;
    data[2] = (((value >> 14) & 0xFE) as u8) | 0x01;
    data[3] = (value >> 7) as u8;
    data[4] = ((value << 1) as u8) | 0x01;
}

/// Location of the stuffing bytes inside a long-form PES header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesStuffingArea {
    /// Payload offset where the stuffing starts.
    pub offset: usize,
    /// Declared stuffing size; may extend past this TS packet.
    pub size: usize,
    /// Stuffing bytes actually present in this packet's payload.
    pub in_packet: usize,
}

impl TsPacket {
    /// Check if this packet starts a PES packet.
    ///
    /// True iff the sync byte is valid, no transport error, payload unit
    /// start is set, the packet is unscrambled, and the payload begins with
    /// the 0x00 0x00 0x01 start code. That prefix cannot occur at this
    /// position in a PSI/SI payload: it would require a pointer field of
    /// zero followed by table id 0x00 with section_syntax_indicator zero,
    /// which is not a valid PAT encoding. So the check needs no knowledge
    /// of the PID type.
    pub fn starts_pes(&self) -> bool {
        if !self.has_valid_sync()
            || self.transport_error()
            || !self.payload_unit_start()
            || self.is_scrambled()
        {
            return false;
        }
        let payload = self.payload();
        payload.len() >= 3 && payload[0] == 0x00 && payload[1] == 0x00 && payload[2] == 0x01
    }

    /// PES stream id, when this packet starts a PES packet.
    pub fn pes_stream_id(&self) -> Option<u8> {
        if !self.starts_pes() {
            return None;
        }
        self.payload().get(3).copied()
    }

    fn pts_dts_flags(&self) -> u8 {
        if !self.starts_pes() {
            return 0;
        }
        let payload = self.payload();
        if payload.len() < 14 || !is_long_header_stream_id(payload[3]) {
            return 0;
        }
        (payload[7] >> 6) & 0x03
    }

    /// Check if the packet carries a PTS.
    pub fn has_pts(&self) -> bool {
        self.pts_dts_flags() & 0x02 != 0
    }

    /// Check if the packet carries a DTS.
    pub fn has_dts(&self) -> bool {
        self.pts_dts_flags() == 0x03 && self.payload().len() >= 19
    }

    /// 33-bit Presentation Time Stamp, when present.
    pub fn pts(&self) -> Option<u64> {
        if !self.has_pts() {
            return None;
        }
        parse_timestamp(self.payload()[9..].first_chunk::<5>()?)
    }

    /// 33-bit Decoding Time Stamp, when present.
    pub fn dts(&self) -> Option<u64> {
        if !self.has_dts() {
            return None;
        }
        parse_timestamp(self.payload()[14..].first_chunk::<5>()?)
    }

    /// Rewrite the PTS in place. Returns `false` when the packet carries
    /// no PTS; a timestamp is never inserted, only overwritten.
    pub fn set_pts(&mut self, pts: u64) -> bool {
        if !self.has_pts() {
            return false;
        }
        if let Some(buf) = self.payload_mut()[9..].first_chunk_mut::<5>() {
            write_timestamp(buf, pts & 0x1_FFFF_FFFF);
            true
        } else {
            false
        }
    }

    /// Rewrite the DTS in place. Returns `false` when the packet carries
    /// no DTS.
    pub fn set_dts(&mut self, dts: u64) -> bool {
        if !self.has_dts() {
            return false;
        }
        if let Some(buf) = self.payload_mut()[14..].first_chunk_mut::<5>() {
            write_timestamp(buf, dts & 0x1_FFFF_FFFF);
            true
        } else {
            false
        }
    }

    /// Locate the stuffing area of a long-form PES header starting in this
    /// packet. Walks the optional fields declared by the header flags and
    /// reports where the stuffing begins, its declared size (which may
    /// extend past this packet) and how much of it this packet holds.
    ///
    /// Returns `None` when the packet does not start a long-form PES
    /// header, or when the walk runs past the bytes available here before
    /// the stuffing is reached.
    pub fn pes_stuffing_area(&self) -> Option<PesStuffingArea> {
        if !self.starts_pes() {
            return None;
        }
        let payload = self.payload();
        if payload.len() < 9 || !is_long_header_stream_id(payload[3]) {
            return None;
        }
        let flags = payload[7];
        let header_data_len = payload[8] as usize;
        let mut consumed = 0usize;
        match (flags >> 6) & 0x03 {
            0x02 => consumed += 5,
            0x03 => consumed += 10,
            _ => {}
        }
        if flags & 0x20 != 0 {
            consumed += 6; // ESCR
        }
        if flags & 0x10 != 0 {
            consumed += 3; // ES rate
        }
        if flags & 0x08 != 0 {
            consumed += 1; // DSM trick mode
        }
        if flags & 0x04 != 0 {
            consumed += 1; // additional copy info
        }
        if flags & 0x02 != 0 {
            consumed += 2; // previous PES CRC
        }
        if flags & 0x01 != 0 {
            // PES extension: one sub-flags byte, then its own fields.
            let ext_flags = *payload.get(9 + consumed)?;
            consumed += 1;
            if ext_flags & 0x80 != 0 {
                consumed += 16; // PES private data
            }
            if ext_flags & 0x40 != 0 {
                let pack_len = *payload.get(9 + consumed)? as usize;
                consumed += 1 + pack_len;
            }
            if ext_flags & 0x20 != 0 {
                consumed += 2; // program packet sequence counter
            }
            if ext_flags & 0x10 != 0 {
                consumed += 2; // P-STD buffer
            }
            if ext_flags & 0x01 != 0 {
                let ext2_len = *payload.get(9 + consumed)? as usize & 0x7F;
                consumed += 1 + ext2_len;
            }
        }
        if consumed > header_data_len {
            return None; // declared header length too small for its flags
        }
        let offset = 9 + consumed;
        let size = header_data_len - consumed;
        let in_packet = size.min(payload.len().saturating_sub(offset));
        Some(PesStuffingArea {
            offset,
            size,
            in_packet,
        })
    }
}
