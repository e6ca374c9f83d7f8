//! PSI/SI sections and reassembled tables.
//!
//! A [`Section`] wraps the complete raw bytes of one section (trailing
//! CRC included for the long form) in a shared, immutable buffer: during
//! reassembly the same section object is referenced by the in-flight
//! table and by the section handler without copying.

use bytes::Bytes;

use crate::{Result, TsError};

/// Maximum value of the 12-bit section length field.
pub const SECTION_LENGTH_MAX: u16 = 4093;

/// Minimum section length of a long-form section: the 5 fixed header
/// bytes after the length field plus the 4-byte CRC.
pub const LONG_SECTION_LENGTH_MIN: u16 = 9;

/// Extended table id: the table id plus, for long-form sections, the
/// table id extension. This is the unit of table reassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Etid {
    /// 8-bit table id.
    pub table_id: u8,
    /// Table id extension, long-form sections only.
    pub extension: Option<u16>,
}

/// One complete PSI/SI section, raw bytes shared and immutable.
#[derive(Debug, Clone)]
pub struct Section {
    data: Bytes,
    pid: u16,
}

impl Section {
    /// Wrap the complete raw bytes of one section. The buffer must hold
    /// exactly the section: 3 header bytes plus the declared section
    /// length.
    pub fn from_bytes(data: Bytes, pid: u16) -> Result<Self> {
        if data.len() < 3 {
            return Err(TsError::InsufficientData {
                expected: 3,
                actual: data.len(),
            });
        }
        let length = (((data[1] & 0x0F) as u16) << 8) | data[2] as u16;
        let long = data[1] & 0x80 != 0;
        if length > SECTION_LENGTH_MAX || (long && length < LONG_SECTION_LENGTH_MIN) {
            return Err(TsError::InvalidSectionLength(length));
        }
        let total = 3 + length as usize;
        if data.len() != total {
            return Err(TsError::InsufficientData {
                expected: total,
                actual: data.len(),
            });
        }
        Ok(Section { data, pid })
    }

    /// PID the section arrived on.
    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// Raw section bytes, CRC included for the long form.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Total section size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 8-bit table id.
    pub fn table_id(&self) -> u8 {
        self.data[0]
    }

    /// Check the section syntax indicator: long form has the 5 extra
    /// header bytes and a trailing CRC.
    pub fn is_long(&self) -> bool {
        self.data[1] & 0x80 != 0
    }

    /// Value of the 12-bit section length field.
    pub fn section_length(&self) -> u16 {
        (((self.data[1] & 0x0F) as u16) << 8) | self.data[2] as u16
    }

    /// Table id extension, long form only.
    pub fn table_id_extension(&self) -> Option<u16> {
        self.is_long()
            .then(|| ((self.data[3] as u16) << 8) | self.data[4] as u16)
    }

    /// Extended table id for reassembly.
    pub fn etid(&self) -> Etid {
        Etid {
            table_id: self.table_id(),
            extension: self.table_id_extension(),
        }
    }

    /// 5-bit version number; 0 for short-form sections.
    pub fn version(&self) -> u8 {
        if self.is_long() {
            (self.data[5] >> 1) & 0x1F
        } else {
            0
        }
    }

    /// Check the current/next indicator; short-form sections are always
    /// current.
    pub fn is_current(&self) -> bool {
        !self.is_long() || self.data[5] & 0x01 != 0
    }

    /// Section number within its table; 0 for short-form sections.
    pub fn section_number(&self) -> u8 {
        if self.is_long() { self.data[6] } else { 0 }
    }

    /// Highest section number of the table.
    pub fn last_section_number(&self) -> u8 {
        if self.is_long() { self.data[7] } else { 0 }
    }

    /// Section payload: everything between the header and the CRC.
    pub fn payload(&self) -> &[u8] {
        if self.is_long() {
            &self.data[8..self.data.len() - 4]
        } else {
            &self.data[3..]
        }
    }

    /// Stored CRC-32 of a long-form section.
    pub fn crc32(&self) -> Option<u32> {
        if !self.is_long() {
            return None;
        }
        let tail = self.data[self.data.len() - 4..].first_chunk::<4>()?;
        Some(u32::from_be_bytes(*tail))
    }
}

/// A complete table: every section numbered `0..=last_section_number`
/// for one ETID and version, in section-number order.
#[derive(Debug, Clone)]
pub struct Table {
    sections: Vec<Section>,
}

impl Table {
    pub(crate) fn new(sections: Vec<Section>) -> Self {
        Table { sections }
    }

    /// 8-bit table id.
    pub fn table_id(&self) -> u8 {
        self.sections[0].table_id()
    }

    /// Extended table id.
    pub fn etid(&self) -> Etid {
        self.sections[0].etid()
    }

    /// Version of the table; 0 for short-form tables.
    pub fn version(&self) -> u8 {
        self.sections[0].version()
    }

    /// PID the table arrived on.
    pub fn pid(&self) -> u16 {
        self.sections[0].pid()
    }

    /// Number of sections in the table.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// The sections, indexed by section number.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc32::mpeg2_crc32;

    fn long_section(table_id: u8, ext: u16, version: u8, number: u8, last: u8) -> Bytes {
        let payload = [0xA0u8, 0xA1, 0xA2, 0xA3];
        let length = (5 + payload.len() + 4) as u16;
        let mut data = vec![
            table_id,
            0xB0 | (length >> 8) as u8,
            (length & 0xFF) as u8,
            (ext >> 8) as u8,
            (ext & 0xFF) as u8,
            0xC0 | (version << 1) | 0x01,
            number,
            last,
        ];
        data.extend_from_slice(&payload);
        let crc = mpeg2_crc32(&data);
        data.extend_from_slice(&crc.to_be_bytes());
        Bytes::from(data)
    }

    #[test]
    fn test_long_section_accessors() {
        let section = Section::from_bytes(long_section(0x42, 0x1234, 7, 1, 2), 0x0011).unwrap();
        assert_eq!(section.table_id(), 0x42);
        assert!(section.is_long());
        assert_eq!(section.table_id_extension(), Some(0x1234));
        assert_eq!(section.version(), 7);
        assert!(section.is_current());
        assert_eq!(section.section_number(), 1);
        assert_eq!(section.last_section_number(), 2);
        assert_eq!(section.payload(), &[0xA0, 0xA1, 0xA2, 0xA3]);
        assert_eq!(section.pid(), 0x0011);
        assert_eq!(
            section.etid(),
            Etid {
                table_id: 0x42,
                extension: Some(0x1234)
            }
        );
    }

    #[test]
    fn test_short_section_accessors() {
        let data = Bytes::from_static(&[0x72, 0x00, 0x03, 0x01, 0x02, 0x03]);
        let section = Section::from_bytes(data, 0x0014).unwrap();
        assert!(!section.is_long());
        assert_eq!(section.table_id(), 0x72);
        assert_eq!(section.table_id_extension(), None);
        assert_eq!(section.version(), 0);
        assert!(section.is_current());
        assert_eq!(section.payload(), &[0x01, 0x02, 0x03]);
        assert_eq!(section.crc32(), None);
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let mut data = long_section(0x42, 0, 0, 0, 0).to_vec();
        data.pop();
        assert!(Section::from_bytes(Bytes::from(data), 0).is_err());
    }

    #[test]
    fn test_rejects_undersized_long_section() {
        // Long form with a declared length below the fixed header + CRC.
        let data = Bytes::from_static(&[0x42, 0xB0, 0x05, 0, 0, 0, 0, 0]);
        assert!(matches!(
            Section::from_bytes(data, 0),
            Err(TsError::InvalidSectionLength(5))
        ));
    }

    #[test]
    fn test_stored_crc_accessor() {
        let raw = long_section(0x42, 0, 0, 0, 0);
        let expected = u32::from_be_bytes(raw[raw.len() - 4..].try_into().unwrap());
        let section = Section::from_bytes(raw, 0).unwrap();
        assert_eq!(section.crc32(), Some(expected));
    }
}
