//! MPEG-2 Transport Stream packet toolkit
//!
//! This crate provides the 188-byte packet binary model with in-place
//! adaptation field mutation, per-packet metadata, stream framing with
//! envelope format auto-detection (TS, M2TS, RS204, DUCK), buffer
//! windowing, and PSI/SI section and table reassembly.

pub mod adaptation_field;
pub mod crc32;
pub mod demux;
pub mod error;
pub mod metadata;
pub mod packet;
pub mod pes;
pub mod section;
pub mod stream;
pub mod window;

pub use adaptation_field::Pcr;
pub use crc32::{Crc32, mpeg2_crc32, validate_section_crc32};
pub use demux::{DemuxStats, SectionDemux};
pub use error::TsError;
pub use metadata::{
    AUX_DATA_MAX, LabelSet, METADATA_MAGIC, METADATA_SERIALIZED_SIZE, PacketMetadata, TimeSource,
};
pub use packet::{PACKET_SIZE, PID_CAT, PID_MAX, PID_NULL, PID_PAT, SYNC_BYTE, TsPacket};
pub use pes::PesStuffingArea;
pub use section::{Etid, Section, Table};
pub use stream::{PacketReader, PacketWriter, RS204_TRAILER_SIZE, TsFormat, find_sync};
pub use window::PacketWindow;

/// Result type for transport stream operations
pub type Result<T> = std::result::Result<T, TsError>;
