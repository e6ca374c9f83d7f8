//! MPEG-2 CRC-32 (ITU-T H.222.0 / ISO 13818-1)
//!
//! Polynomial: 0x04C11DB7, init: 0xFFFFFFFF, no bit reflection, no final XOR.
//! This is NOT the same as the zlib/ISO 3309 CRC-32.

/// Compile-time generated 256-entry lookup table for MPEG-2 CRC-32.
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i << 24;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ 0x04C1_1DB7;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

/// Incremental MPEG-2 CRC-32 accumulator.
///
/// Used by the section demultiplexer to hash a section while it is being
/// reassembled from multiple packets.
#[derive(Debug, Clone, Copy)]
pub struct Crc32(u32);

impl Crc32 {
    /// Start a new accumulation.
    pub fn new() -> Self {
        Crc32(0xFFFF_FFFF)
    }

    /// Feed more bytes into the accumulator.
    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.0;
        for &byte in data {
            crc = (crc << 8) ^ CRC32_TABLE[((crc >> 24) ^ byte as u32) as usize];
        }
        self.0 = crc;
    }

    /// Current CRC value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute MPEG-2 CRC-32 over a byte slice in one shot.
pub fn mpeg2_crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.value()
}

/// Validate that the MPEG-2 CRC-32 over the full PSI section (including the
/// stored 4-byte CRC at the end) equals zero.
pub fn validate_section_crc32(section_data: &[u8]) -> bool {
    mpeg2_crc32(section_data) == 0x0000_0000
}
