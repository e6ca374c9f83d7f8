//! Adaptation field accessors and the in-place mutation engine.
//!
//! The adaptation field lives between the 4-byte packet header and the
//! payload: one length byte, one flags byte, then the optional sub-fields
//! in strict order (PCR, OPCR, splice countdown, private data, extension)
//! followed by 0xFF stuffing up to the declared length. All mutators below
//! preserve that ordering and the total packet size; growing a field
//! consumes stuffing, shrinking a field re-creates it.
//!
//! Every offset is re-derived from the flags byte with a bounds check
//! against the declared length, so a corrupted or truncated adaptation
//! field can never cause an out-of-bounds access.

use crate::packet::{PACKET_SIZE, TsPacket};

/// Program Clock Reference — 33-bit base @ 90kHz + 9-bit extension @ 27MHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pcr {
    /// 33-bit base value at 90 kHz
    pub base: u64,
    /// 9-bit extension value at 27 MHz
    pub extension: u16,
}

impl Pcr {
    /// Create a new PCR, masking the components to their field widths.
    pub fn new(base: u64, extension: u16) -> Self {
        Pcr {
            base: base & 0x1_FFFF_FFFF,
            extension: extension & 0x1FF,
        }
    }

    /// Parse PCR from exactly 6 bytes.
    ///
    /// Layout: `[base32..25][base24..17][base16..9][base8..1][base0 | reserved(6) | ext_high][ext_low]`
    pub fn parse(data: &[u8]) -> Option<Self> {
        let data = data.first_chunk::<6>()?;
        let base = ((data[0] as u64) << 25)
            | ((data[1] as u64) << 17)
            | ((data[2] as u64) << 9)
            | ((data[3] as u64) << 1)
            | ((data[4] as u64) >> 7);
        let extension = (((data[4] & 0x01) as u16) << 8) | data[5] as u16;
        Some(Pcr { base, extension })
    }

    /// Write the PCR into 6 bytes, reserved bits set to one.
    pub fn write(&self, out: &mut [u8; 6]) {
        out[0] = (self.base >> 25) as u8;
        out[1] = (self.base >> 17) as u8;
        out[2] = (self.base >> 9) as u8;
        out[3] = (self.base >> 1) as u8;
        out[4] = (((self.base & 0x01) << 7) as u8) | 0x7E | ((self.extension >> 8) & 0x01) as u8;
        out[5] = (self.extension & 0xFF) as u8;
    }

    /// Full PCR value at 27 MHz resolution.
    pub fn as_27mhz(&self) -> u64 {
        self.base * 300 + self.extension as u64
    }

    /// Build a PCR from a 27 MHz clock value.
    pub fn from_27mhz(value: u64) -> Self {
        Pcr::new(value / 300, (value % 300) as u16)
    }

    /// PCR as seconds (floating point).
    pub fn as_seconds(&self) -> f64 {
        self.as_27mhz() as f64 / 27_000_000.0
    }
}

impl TsPacket {
    /// Flags byte of the adaptation field, `None` when there is no
    /// adaptation field, it is too short to hold one, or its declared
    /// length does not fit in the packet.
    fn af_flags(&self) -> Option<u8> {
        if !self.has_adaptation_field() {
            return None;
        }
        let len = self.data[4] as usize;
        if len < 1 || len > PACKET_SIZE - 5 {
            return None;
        }
        Some(self.data[5])
    }

    /// Discontinuity indicator bit.
    pub fn discontinuity_indicator(&self) -> bool {
        self.af_flags().is_some_and(|f| f & 0x80 != 0)
    }

    /// Random access indicator bit.
    pub fn random_access_indicator(&self) -> bool {
        self.af_flags().is_some_and(|f| f & 0x40 != 0)
    }

    /// Elementary stream priority indicator bit.
    pub fn es_priority_indicator(&self) -> bool {
        self.af_flags().is_some_and(|f| f & 0x20 != 0)
    }

    /// Set or clear the discontinuity indicator, creating a minimal
    /// adaptation field when needed. Returns `false` when the field would
    /// have to grow and `shift_payload` is not allowed.
    pub fn set_discontinuity_indicator(&mut self, on: bool, shift_payload: bool) -> bool {
        self.set_af_flag_bit(0x80, on, shift_payload)
    }

    /// Set or clear the random access indicator.
    pub fn set_random_access_indicator(&mut self, on: bool, shift_payload: bool) -> bool {
        self.set_af_flag_bit(0x40, on, shift_payload)
    }

    /// Set or clear the elementary stream priority indicator.
    pub fn set_es_priority_indicator(&mut self, on: bool, shift_payload: bool) -> bool {
        self.set_af_flag_bit(0x20, on, shift_payload)
    }

    fn set_af_flag_bit(&mut self, mask: u8, on: bool, shift_payload: bool) -> bool {
        if !on && self.af_flags().is_none() {
            // Clearing a bit that cannot be set is a no-op.
            return true;
        }
        if !self.reserve_stuffing(0, shift_payload, true) {
            return false;
        }
        if on {
            self.data[5] |= mask;
        } else {
            self.data[5] &= !mask;
        }
        true
    }

    /// Byte offset of the PCR inside the packet, `None` when absent or
    /// when the declared adaptation field length cannot contain it.
    pub fn pcr_offset(&self) -> Option<usize> {
        let flags = self.af_flags()?;
        if flags & 0x10 == 0 {
            return None;
        }
        let len = self.data[4] as usize;
        if len < 1 + 6 {
            return None;
        }
        Some(6)
    }

    /// Byte offset of the OPCR inside the packet.
    pub fn opcr_offset(&self) -> Option<usize> {
        let flags = self.af_flags()?;
        if flags & 0x08 == 0 {
            return None;
        }
        let before = 1 + if flags & 0x10 != 0 { 6 } else { 0 };
        if (self.data[4] as usize) < before + 6 {
            return None;
        }
        Some(5 + before)
    }

    /// Byte offset of the splice countdown inside the packet.
    pub fn splice_countdown_offset(&self) -> Option<usize> {
        let flags = self.af_flags()?;
        if flags & 0x04 == 0 {
            return None;
        }
        let before = 1
            + if flags & 0x10 != 0 { 6 } else { 0 }
            + if flags & 0x08 != 0 { 6 } else { 0 };
        if (self.data[4] as usize) < before + 1 {
            return None;
        }
        Some(5 + before)
    }

    /// Byte offset of the private data length byte inside the packet.
    pub fn private_data_offset(&self) -> Option<usize> {
        let flags = self.af_flags()?;
        if flags & 0x02 == 0 {
            return None;
        }
        let before = 1
            + if flags & 0x10 != 0 { 6 } else { 0 }
            + if flags & 0x08 != 0 { 6 } else { 0 }
            + if flags & 0x04 != 0 { 1 } else { 0 };
        let len = self.data[4] as usize;
        if len < before + 1 {
            return None;
        }
        let data_len = self.data[5 + before] as usize;
        if len < before + 1 + data_len {
            return None;
        }
        Some(5 + before)
    }

    /// Check if the packet carries a PCR.
    pub fn has_pcr(&self) -> bool {
        self.pcr_offset().is_some()
    }

    /// Check if the packet carries an OPCR.
    pub fn has_opcr(&self) -> bool {
        self.opcr_offset().is_some()
    }

    /// Program Clock Reference, when present.
    pub fn pcr(&self) -> Option<Pcr> {
        let off = self.pcr_offset()?;
        Pcr::parse(&self.data[off..])
    }

    /// Original Program Clock Reference, when present.
    pub fn opcr(&self) -> Option<Pcr> {
        let off = self.opcr_offset()?;
        Pcr::parse(&self.data[off..])
    }

    /// Splice countdown, when present.
    pub fn splice_countdown(&self) -> Option<i8> {
        let off = self.splice_countdown_offset()?;
        Some(self.data[off] as i8)
    }

    /// Transport private data, when present.
    pub fn private_data(&self) -> Option<&[u8]> {
        let off = self.private_data_offset()?;
        let len = self.data[off] as usize;
        Some(&self.data[off + 1..off + 1 + len])
    }

    /// Number of stuffing bytes at the end of the adaptation field.
    pub fn af_stuffing_size(&self) -> usize {
        let Some(flags) = self.af_flags() else {
            return 0;
        };
        let len = self.data[4] as usize;
        let mut used = 1usize;
        if flags & 0x10 != 0 {
            used += 6;
        }
        if flags & 0x08 != 0 {
            used += 6;
        }
        if flags & 0x04 != 0 {
            used += 1;
        }
        if flags & 0x02 != 0 {
            if used + 1 > len {
                return 0;
            }
            used += 1 + self.data[5 + used] as usize;
        }
        if flags & 0x01 != 0 {
            if used + 1 > len {
                return 0;
            }
            used += 1 + self.data[5 + used] as usize;
        }
        len.saturating_sub(used)
    }

    /// Resize the payload in place, trading bytes with the adaptation
    /// field. This is the single primitive beneath every field mutator.
    ///
    /// Shrinking always succeeds: a minimal adaptation field is created
    /// when none exists (consuming up to 2 bytes of the shrink budget),
    /// the freed region is filled with `pad`, and when `shift_payload` is
    /// set the retained bytes are the prefix of the old payload (moved up),
    /// otherwise its suffix (left in place).
    ///
    /// Growing consumes stuffing bytes and fails (returns `false`, packet
    /// untouched) when the request exceeds what the adaptation field can
    /// give back. An adaptation field holding nothing but stuffing can be
    /// reclaimed entirely, including its length and flags bytes.
    pub fn set_payload_size(&mut self, size: usize, shift_payload: bool, pad: u8) -> bool {
        let cur = self.payload_size();
        if size == cur {
            return true;
        }
        if size < cur {
            let mut delta = cur - size;
            let start = PACKET_SIZE - cur;
            if shift_payload {
                self.data.copy_within(start..start + size, start + delta);
            }
            if !self.has_adaptation_field() {
                self.data[3] |= 0x20;
                if delta == 1 {
                    self.data[4] = 0; // length byte only
                    return true;
                }
                self.data[4] = 1;
                self.data[5] = 0x00; // flags byte
                delta -= 2;
            } else if self.data[4] == 0 {
                // The first grown byte becomes the flags byte.
                self.data[4] = 1;
                self.data[5] = 0x00;
                delta -= 1;
            }
            let len = self.data[4] as usize;
            self.data[4] = (len + delta) as u8;
            self.data[5 + len..5 + len + delta].fill(pad);
            true
        } else {
            if !self.has_adaptation_field() || size > PACKET_SIZE - 4 {
                return false;
            }
            let len = self.data[4] as usize;
            if len > PACKET_SIZE - 5 {
                return false; // malformed length, do not touch
            }
            let delta = size - cur;
            let pure_stuffing = len >= 1 && self.data[5] == 0x00;
            let available = if len == 0 {
                1
            } else if pure_stuffing {
                len + 1
            } else {
                self.af_stuffing_size()
            };
            if delta > available {
                return false;
            }
            if len == 0 || (pure_stuffing && delta == len + 1) {
                self.data[3] &= !0x20; // adaptation field fully reclaimed
            } else if pure_stuffing && delta == len {
                self.data[4] = 0;
            } else {
                self.data[4] = (len - delta) as u8;
            }
            self.data[3] |= 0x10;
            if shift_payload && cur > 0 {
                let start = PACKET_SIZE - cur;
                self.data.copy_within(start..PACKET_SIZE, start - delta);
                self.data[PACKET_SIZE - delta..].fill(pad);
            }
            true
        }
    }

    /// Guarantee at least `needed` stuffing bytes in the adaptation field,
    /// shrinking the payload when required. With `enforce_af` the
    /// adaptation field is created (with its flags byte) even when
    /// `needed` is zero.
    ///
    /// Returns `false` when more room is needed but `shift_payload` is not
    /// allowed, or the payload is too small to give it.
    pub fn reserve_stuffing(&mut self, needed: usize, shift_payload: bool, enforce_af: bool) -> bool {
        let stuffing = self.af_stuffing_size();
        let has_flags = self.af_flags().is_some();
        if stuffing >= needed && (has_flags || !enforce_af) {
            return true;
        }
        let mut shrink = needed.saturating_sub(stuffing);
        if !self.has_adaptation_field() {
            shrink += 2;
        } else if self.data[4] == 0 {
            shrink += 1;
        }
        if !shift_payload || shrink > self.payload_size() {
            return false;
        }
        self.set_payload_size(self.payload_size() - shrink, true, 0xFF)
    }

    /// Shift adaptation field bytes `ins..end-n` up by `n`, vacating
    /// `ins..ins+n` and consuming the last `n` stuffing bytes.
    fn af_insert_shift(&mut self, ins: usize, n: usize) {
        let end = 5 + self.data[4] as usize;
        if ins + n <= end {
            self.data.copy_within(ins..end - n, ins + n);
        }
    }

    /// Remove an adaptation field sub-field: close the gap and turn the
    /// freed tail into stuffing.
    fn remove_af_field(&mut self, off: usize, n: usize, flag: u8) {
        let end = 5 + self.data[4] as usize;
        self.data.copy_within(off + n..end, off);
        self.data[end - n..end].fill(0xFF);
        self.data[5] &= !flag;
    }

    /// Insert or overwrite the PCR. Returns `false` when there is no room
    /// and the payload may not be shifted.
    pub fn set_pcr(&mut self, pcr: Pcr, shift_payload: bool) -> bool {
        if let Some(off) = self.pcr_offset() {
            if let Some(buf) = self.data[off..].first_chunk_mut::<6>() {
                pcr.write(buf);
            }
            return true;
        }
        if !self.reserve_stuffing(6, shift_payload, true) {
            return false;
        }
        self.af_insert_shift(6, 6);
        if let Some(buf) = self.data[6..].first_chunk_mut::<6>() {
            pcr.write(buf);
        }
        self.data[5] |= 0x10;
        true
    }

    /// Remove the PCR. Removing an absent field is a no-op.
    pub fn remove_pcr(&mut self) {
        if let Some(off) = self.pcr_offset() {
            self.remove_af_field(off, 6, 0x10);
        }
    }

    /// Insert or overwrite the OPCR.
    pub fn set_opcr(&mut self, opcr: Pcr, shift_payload: bool) -> bool {
        if let Some(off) = self.opcr_offset() {
            if let Some(buf) = self.data[off..].first_chunk_mut::<6>() {
                opcr.write(buf);
            }
            return true;
        }
        if !self.reserve_stuffing(6, shift_payload, true) {
            return false;
        }
        let flags = self.data[5];
        let ins = 6 + if flags & 0x10 != 0 { 6 } else { 0 };
        self.af_insert_shift(ins, 6);
        if let Some(buf) = self.data[ins..].first_chunk_mut::<6>() {
            opcr.write(buf);
        }
        self.data[5] |= 0x08;
        true
    }

    /// Remove the OPCR. Removing an absent field is a no-op.
    pub fn remove_opcr(&mut self) {
        if let Some(off) = self.opcr_offset() {
            self.remove_af_field(off, 6, 0x08);
        }
    }

    /// Insert or overwrite the splice countdown.
    pub fn set_splice_countdown(&mut self, countdown: i8, shift_payload: bool) -> bool {
        if let Some(off) = self.splice_countdown_offset() {
            self.data[off] = countdown as u8;
            return true;
        }
        if !self.reserve_stuffing(1, shift_payload, true) {
            return false;
        }
        let flags = self.data[5];
        let ins = 6
            + if flags & 0x10 != 0 { 6 } else { 0 }
            + if flags & 0x08 != 0 { 6 } else { 0 };
        self.af_insert_shift(ins, 1);
        self.data[ins] = countdown as u8;
        self.data[5] |= 0x04;
        true
    }

    /// Remove the splice countdown. Removing an absent field is a no-op.
    pub fn remove_splice_countdown(&mut self) {
        if let Some(off) = self.splice_countdown_offset() {
            self.remove_af_field(off, 1, 0x04);
        }
    }

    /// Insert or replace the transport private data block. Fails without
    /// modifying the packet when the block can never fit (more than 181
    /// bytes) or when there is no room and the payload may not be shifted.
    pub fn set_private_data(&mut self, private_data: &[u8], shift_payload: bool) -> bool {
        if private_data.len() > PACKET_SIZE - 7 {
            return false;
        }
        let needed = 1 + private_data.len();

        // Room check before mutating anything: bytes reclaimed by removing
        // the existing block count toward the new one.
        let reclaimed = match self.private_data_offset() {
            Some(off) => 1 + self.data[off] as usize,
            None => 0,
        };
        let available = self.af_stuffing_size() + reclaimed;
        if available < needed {
            let mut shrink = needed - available;
            if !self.has_adaptation_field() {
                shrink += 2;
            } else if self.data[4] == 0 {
                shrink += 1;
            }
            if !shift_payload || shrink > self.payload_size() {
                return false;
            }
        }

        self.remove_private_data();
        if !self.reserve_stuffing(needed, shift_payload, true) {
            return false;
        }
        let flags = self.data[5];
        let ins = 6
            + if flags & 0x10 != 0 { 6 } else { 0 }
            + if flags & 0x08 != 0 { 6 } else { 0 }
            + if flags & 0x04 != 0 { 1 } else { 0 };
        self.af_insert_shift(ins, needed);
        self.data[ins] = private_data.len() as u8;
        self.data[ins + 1..ins + needed].copy_from_slice(private_data);
        self.data[5] |= 0x02;
        true
    }

    /// Remove the transport private data block. Removing an absent field
    /// is a no-op.
    pub fn remove_private_data(&mut self) {
        if let Some(off) = self.private_data_offset() {
            let n = 1 + self.data[off] as usize;
            self.remove_af_field(off, n, 0x02);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(pid: u16) -> TsPacket {
        let mut packet = TsPacket::NULL;
        packet.init(pid, 0, 0x5A);
        packet
    }

    #[test]
    fn test_pcr_round_trip() {
        for value in [
            0u64,
            1,
            299,
            300,
            90_000 * 300,
            ((1u64 << 33) - 1) * 300 + 299, // maximum 42-bit PCR
        ] {
            let pcr = Pcr::from_27mhz(value);
            let mut buf = [0u8; 6];
            pcr.write(&mut buf);
            let parsed = Pcr::parse(&buf).unwrap();
            assert_eq!(parsed.as_27mhz(), value);
            assert_eq!(parsed, pcr);
        }
    }

    #[test]
    fn test_size_invariant_after_mutations() {
        let mut packet = fresh(0x0100);
        assert!(packet.set_pcr(Pcr::new(12345, 67), true));
        assert!(packet.set_opcr(Pcr::new(54321, 8), true));
        assert!(packet.set_splice_countdown(-3, true));
        assert!(packet.set_private_data(&[0xDE, 0xAD, 0xBE, 0xEF], true));
        assert_eq!(packet.header_size() + packet.payload_size(), PACKET_SIZE);
        packet.remove_opcr();
        assert_eq!(packet.header_size() + packet.payload_size(), PACKET_SIZE);
    }

    #[test]
    fn test_field_ordering_preserved() {
        let mut packet = fresh(0x0100);
        // Insert out of layout order; offsets must still come out ordered.
        assert!(packet.set_splice_countdown(5, true));
        assert!(packet.set_opcr(Pcr::new(2, 2), true));
        assert!(packet.set_pcr(Pcr::new(1, 1), true));
        let pcr_off = packet.pcr_offset().unwrap();
        let opcr_off = packet.opcr_offset().unwrap();
        let splice_off = packet.splice_countdown_offset().unwrap();
        assert_eq!(pcr_off, 6);
        assert_eq!(opcr_off, 12);
        assert_eq!(splice_off, 18);
        assert_eq!(packet.pcr().unwrap(), Pcr::new(1, 1));
        assert_eq!(packet.opcr().unwrap(), Pcr::new(2, 2));
        assert_eq!(packet.splice_countdown(), Some(5));
    }

    #[test]
    fn test_remove_middle_field_shifts_following() {
        let mut packet = fresh(0x0100);
        assert!(packet.set_pcr(Pcr::new(1, 1), true));
        assert!(packet.set_opcr(Pcr::new(2, 2), true));
        assert!(packet.set_splice_countdown(-7, true));
        packet.remove_opcr();
        assert!(packet.opcr().is_none());
        assert_eq!(packet.pcr().unwrap(), Pcr::new(1, 1));
        assert_eq!(packet.splice_countdown(), Some(-7));
        assert_eq!(packet.splice_countdown_offset(), Some(12));
    }

    #[test]
    fn test_remove_pcr_idempotent() {
        let mut packet = fresh(0x0100);
        let before = *packet.as_bytes();
        packet.remove_pcr();
        assert_eq!(*packet.as_bytes(), before); // absent: byte-identical no-op

        assert!(packet.set_pcr(Pcr::new(77, 0), true));
        packet.remove_pcr();
        let after_once = *packet.as_bytes();
        packet.remove_pcr();
        assert_eq!(*packet.as_bytes(), after_once);
        assert!(packet.pcr().is_none());
    }

    #[test]
    fn test_set_payload_size_round_trip() {
        let mut packet = fresh(0x0100);
        assert_eq!(packet.payload_size(), 184);
        assert!(packet.set_payload_size(100, true, 0xFF));
        assert_eq!(packet.payload_size(), 100);
        assert_eq!(packet.header_size() + packet.payload_size(), PACKET_SIZE);
        assert!(packet.set_payload_size(184, true, 0xFF));
        assert_eq!(packet.payload_size(), 184);
        assert!(!packet.has_adaptation_field());
    }

    #[test]
    fn test_shrink_keeps_payload_prefix_when_shifting() {
        let mut packet = fresh(0x0100);
        for (i, b) in packet.payload_mut().iter_mut().enumerate() {
            *b = i as u8;
        }
        assert!(packet.set_payload_size(10, true, 0xFF));
        assert_eq!(packet.payload(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_shrink_by_one_creates_length_only_field() {
        let mut packet = fresh(0x0100);
        assert!(packet.set_payload_size(183, true, 0xFF));
        assert!(packet.has_adaptation_field());
        assert_eq!(packet.adaptation_field_size(), 0);
        assert_eq!(packet.payload_size(), 183);
    }

    #[test]
    fn test_grow_fails_beyond_stuffing() {
        let mut packet = fresh(0x0100);
        assert!(packet.set_pcr(Pcr::new(1, 0), true));
        // Adaptation field holds flags + PCR and no stuffing beyond what
        // reserve_stuffing left; growing past it must fail untouched.
        let before = *packet.as_bytes();
        assert!(!packet.set_payload_size(184, true, 0xFF));
        assert_eq!(*packet.as_bytes(), before);
    }

    #[test]
    fn test_private_data_too_large_fails_unmodified() {
        let mut packet = fresh(0x0100);
        let before = *packet.as_bytes();
        let too_big = vec![0xAA; PACKET_SIZE - 7 + 1];
        assert!(!packet.set_private_data(&too_big, true));
        assert_eq!(*packet.as_bytes(), before);
    }

    #[test]
    fn test_private_data_max_size_fits() {
        let mut packet = fresh(0x0100);
        let max = vec![0xAA; PACKET_SIZE - 7];
        assert!(packet.set_private_data(&max, true));
        assert_eq!(packet.private_data().unwrap(), &max[..]);
        assert_eq!(packet.payload_size(), 0);
        assert_eq!(packet.header_size(), PACKET_SIZE);
    }

    #[test]
    fn test_private_data_replace_reuses_room() {
        let mut packet = fresh(0x0100);
        assert!(packet.set_private_data(&[1, 2, 3, 4, 5, 6, 7, 8], true));
        let payload_before = packet.payload_size();
        assert!(packet.set_private_data(&[9, 8, 7], true));
        assert_eq!(packet.private_data().unwrap(), &[9, 8, 7]);
        // Replacing with a smaller block never shrinks the payload further.
        assert!(packet.payload_size() >= payload_before);
    }

    #[test]
    fn test_set_without_shift_fails_when_no_room() {
        let mut packet = fresh(0x0100);
        let before = *packet.as_bytes();
        assert!(!packet.set_pcr(Pcr::new(5, 5), false));
        assert_eq!(*packet.as_bytes(), before);
    }

    #[test]
    fn test_set_pcr_overwrite_in_place() {
        let mut packet = fresh(0x0100);
        assert!(packet.set_pcr(Pcr::new(100, 1), true));
        let size = packet.payload_size();
        // Overwriting needs no room, so shifting is irrelevant.
        assert!(packet.set_pcr(Pcr::new(200, 2), false));
        assert_eq!(packet.pcr().unwrap(), Pcr::new(200, 2));
        assert_eq!(packet.payload_size(), size);
    }

    #[test]
    fn test_truncated_adaptation_field_offsets_are_none() {
        let mut packet = fresh(0x0100);
        packet.data[3] |= 0x20;
        packet.data[4] = 3; // too short for a 6-byte PCR
        packet.data[5] = 0x10; // PCR flag claims one anyway
        assert_eq!(packet.pcr_offset(), None);
        assert!(packet.pcr().is_none());
    }

    #[test]
    fn test_indicator_bits() {
        let mut packet = fresh(0x0100);
        assert!(!packet.discontinuity_indicator());
        assert!(packet.set_discontinuity_indicator(true, true));
        assert!(packet.discontinuity_indicator());
        assert!(packet.set_random_access_indicator(true, true));
        assert!(packet.random_access_indicator());
        assert!(packet.set_discontinuity_indicator(false, true));
        assert!(!packet.discontinuity_indicator());
        assert!(packet.random_access_indicator());
        assert_eq!(packet.header_size() + packet.payload_size(), PACKET_SIZE);
    }

    #[test]
    fn test_clear_indicator_without_field_is_noop() {
        let mut packet = fresh(0x0100);
        let before = *packet.as_bytes();
        assert!(packet.set_discontinuity_indicator(false, false));
        assert_eq!(*packet.as_bytes(), before);
    }
}
