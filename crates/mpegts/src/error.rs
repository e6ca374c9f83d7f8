//! Error types for transport stream operations.

use thiserror::Error;

/// Errors that can occur while reading, writing or parsing transport
/// stream data.
#[derive(Error, Debug)]
pub enum TsError {
    /// An I/O error occurred on the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A packet buffer was not exactly 188 bytes.
    #[error("invalid packet size: {0} bytes")]
    InvalidPacketSize(usize),

    /// The sync byte was not 0x47.
    #[error("invalid sync byte: {0:#04x}")]
    InvalidSyncByte(u8),

    /// The leading bytes of the stream match none of the known
    /// packet envelope formats.
    #[error("cannot detect transport stream format")]
    FormatDetection,

    /// A serialized packet metadata record did not start with the
    /// expected magic byte.
    #[error("invalid metadata magic: expected 0xb8, got {0:#04x}")]
    InvalidMetadataMagic(u8),

    /// A serialized packet metadata record was shorter than 14 bytes.
    #[error("metadata record too short: {0} bytes")]
    MetadataTooShort(usize),

    /// Not enough data to parse a structure.
    #[error("insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes available.
        actual: usize,
    },

    /// A section declared a length outside the legal range.
    #[error("invalid section length: {0}")]
    InvalidSectionLength(u16),
}
