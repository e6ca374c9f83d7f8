//! Packet stream framing: turn raw bytes into (packet, metadata) pairs
//! and back, hiding the per-format envelope.
//!
//! Four envelope formats are supported: raw TS (bare 188-byte packets),
//! M2TS (4-byte timestamp header per packet), RS204 (16-byte Reed-Solomon
//! trailer per packet, ignored on input and zero-filled on output) and
//! DUCK (14-byte serialized metadata header per packet). Readers default
//! to auto-detection on the first read; writers default to raw TS.

use std::io::{Read, Write};

use memchr::memchr_iter;
use tracing::debug;

use crate::metadata::{METADATA_SERIALIZED_SIZE, PacketMetadata, TimeSource};
use crate::packet::{PACKET_SIZE, SYNC_BYTE, TsPacket};
use crate::{Result, TsError};

/// Packet envelope format of a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TsFormat {
    /// Detect the format on the first read.
    #[default]
    Autodetect,
    /// Raw 188-byte packets back to back.
    Ts,
    /// 4-byte timestamp header before each packet.
    M2ts,
    /// 16-byte Reed-Solomon trailer after each packet.
    Rs204,
    /// 14-byte serialized metadata header before each packet.
    Duck,
}

impl TsFormat {
    /// Per-packet header size in bytes.
    pub fn header_size(&self) -> usize {
        match self {
            TsFormat::M2ts => 4,
            TsFormat::Duck => METADATA_SERIALIZED_SIZE,
            _ => 0,
        }
    }

    /// Per-packet trailer size in bytes.
    pub fn trailer_size(&self) -> usize {
        match self {
            TsFormat::Rs204 => RS204_TRAILER_SIZE,
            _ => 0,
        }
    }

    /// Total size of one packet on the wire.
    pub fn packet_size(&self) -> usize {
        self.header_size() + PACKET_SIZE + self.trailer_size()
    }
}

/// Size of the RS204 Reed-Solomon trailer.
pub const RS204_TRAILER_SIZE: usize = 16;

/// Find the offset of a plausible packet start in a byte buffer: a sync
/// byte that is either followed by another sync byte one packet later or
/// too close to the end of the buffer to disprove.
pub fn find_sync(data: &[u8]) -> Option<usize> {
    for pos in memchr_iter(SYNC_BYTE, data) {
        match data.get(pos + PACKET_SIZE) {
            Some(&b) if b == SYNC_BYTE => return Some(pos),
            None => return Some(pos),
            Some(_) => {}
        }
    }
    None
}

/// Fill `buf` from the reader, retrying until full or end-of-stream.
/// Returns the number of bytes actually placed in the buffer.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Reads (packet, metadata) pairs from a raw byte stream.
///
/// The format is fixed on the first read when constructed with
/// [`TsFormat::Autodetect`]. A detection failure is fatal for the stream:
/// every subsequent read reports the same error.
pub struct PacketReader<R> {
    reader: R,
    format: TsFormat,
    /// Sync byte captured by the RS204 trailer probe, start of the next
    /// packet.
    carry: Option<u8>,
    /// Raw bytes left over from the previous bulk read (TS format only).
    trail: Vec<u8>,
    packets_read: u64,
    failed: bool,
}

impl<R: Read> PacketReader<R> {
    /// Create a reader that detects the stream format on first use.
    pub fn new(reader: R) -> Self {
        Self::with_format(reader, TsFormat::Autodetect)
    }

    /// Create a reader with a known format, skipping detection.
    pub fn with_format(reader: R, format: TsFormat) -> Self {
        PacketReader {
            reader,
            format,
            carry: None,
            trail: Vec::new(),
            packets_read: 0,
            failed: false,
        }
    }

    /// Current format; [`TsFormat::Autodetect`] until the first read.
    pub fn format(&self) -> TsFormat {
        self.format
    }

    /// Total packets returned so far.
    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    /// Consume the reader and return the underlying byte stream.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read packets into the two parallel slices, up to the shorter
    /// length. Returns the number of whole packets obtained; zero with no
    /// error means clean end-of-stream. A trailing partial packet is
    /// never returned.
    pub fn read_packets(
        &mut self,
        packets: &mut [TsPacket],
        metadata: &mut [PacketMetadata],
    ) -> Result<usize> {
        let n = packets.len().min(metadata.len());
        if n == 0 {
            return Ok(0);
        }
        if self.failed {
            return Err(TsError::FormatDetection);
        }
        let mut start = 0;
        if self.format == TsFormat::Autodetect {
            match self.detect(&mut packets[0], &mut metadata[0]) {
                Ok(true) => start = 1,
                Ok(false) => return Ok(0),
                Err(e) => {
                    self.failed = true;
                    return Err(e);
                }
            }
        }
        let count = match self.format {
            TsFormat::Ts => self.read_ts(&mut packets[start..], &mut metadata[start..])?,
            TsFormat::Rs204 => self.read_rs204(&mut packets[start..], &mut metadata[start..])?,
            TsFormat::M2ts => self.read_m2ts(&mut packets[start..], &mut metadata[start..])?,
            TsFormat::Duck => self.read_duck(&mut packets[start..], &mut metadata[start..])?,
            TsFormat::Autodetect => 0, // detection just consumed the only slot
        };
        self.packets_read += (start + count) as u64;
        Ok(start + count)
    }

    /// Read a single packet; `None` at clean end-of-stream.
    pub fn read_packet(&mut self) -> Result<Option<(TsPacket, PacketMetadata)>> {
        let mut packets = [TsPacket::NULL];
        let mut metadata = [PacketMetadata::new()];
        match self.read_packets(&mut packets, &mut metadata)? {
            0 => Ok(None),
            _ => Ok(Some((packets[0], metadata[0]))),
        }
    }

    /// Inspect the first 188-byte block of the stream to fix the format
    /// and produce the first packet. `Ok(false)` means the stream ended
    /// before a whole packet was available.
    fn detect(&mut self, packet: &mut TsPacket, meta: &mut PacketMetadata) -> Result<bool> {
        let mut block = [0u8; PACKET_SIZE];
        let got = read_exact_or_eof(&mut self.reader, &mut block)?;
        if got < PACKET_SIZE {
            return Ok(false);
        }
        meta.reset();
        if block[0] == SYNC_BYTE {
            self.format = TsFormat::Ts;
            self.probe_rs204_trailer()?;
        } else if block[4] == SYNC_BYTE {
            // 30-bit M2TS timestamp, top two copy-control bits ignored.
            self.format = TsFormat::M2ts;
            let mut stamp = [0u8; 4];
            stamp.copy_from_slice(&block[..4]);
            let ts = u32::from_be_bytes(stamp) & 0x3FFF_FFFF;
            meta.set_timestamp(ts as u64, TimeSource::M2ts);
            block.copy_within(4.., 0);
            if read_exact_or_eof(&mut self.reader, &mut block[PACKET_SIZE - 4..])? < 4 {
                return Ok(false);
            }
        } else if block[0] == crate::metadata::METADATA_MAGIC
            && block[METADATA_SERIALIZED_SIZE] == SYNC_BYTE
        {
            self.format = TsFormat::Duck;
            meta.deserialize(&block[..METADATA_SERIALIZED_SIZE])?;
            block.copy_within(METADATA_SERIALIZED_SIZE.., 0);
            let tail = &mut block[PACKET_SIZE - METADATA_SERIALIZED_SIZE..];
            if read_exact_or_eof(&mut self.reader, tail)? < METADATA_SERIALIZED_SIZE {
                return Ok(false);
            }
        } else {
            return Err(TsError::FormatDetection);
        }
        debug!(format = ?self.format, "packet stream format detected");
        *packet.as_bytes_mut() = block;
        Ok(true)
    }

    /// After a leading sync byte, look for an RS204 trailer: a non-sync
    /// byte right after the packet with a sync byte exactly 16 bytes
    /// later. Best effort; a stream ending inside the probe stays TS.
    fn probe_rs204_trailer(&mut self) -> Result<()> {
        let mut first = [0u8; 1];
        if read_exact_or_eof(&mut self.reader, &mut first)? == 0 {
            return Ok(());
        }
        if first[0] == SYNC_BYTE {
            self.trail.push(SYNC_BYTE);
            return Ok(());
        }
        let mut rest = [0u8; RS204_TRAILER_SIZE];
        let got = read_exact_or_eof(&mut self.reader, &mut rest)?;
        if got == RS204_TRAILER_SIZE && rest[RS204_TRAILER_SIZE - 1] == SYNC_BYTE {
            self.format = TsFormat::Rs204;
            self.carry = Some(SYNC_BYTE);
            return Ok(());
        }
        // Neither plain TS nor RS204 cadence.
        Err(TsError::FormatDetection)
    }

    /// Bulk read for raw TS: one read call for as many whole packets as
    /// fit, leftover bytes carried to the next call.
    fn read_ts(
        &mut self,
        packets: &mut [TsPacket],
        metadata: &mut [PacketMetadata],
    ) -> Result<usize> {
        let n = packets.len().min(metadata.len());
        if n == 0 {
            return Ok(0);
        }
        let mut buf = std::mem::take(&mut self.trail);
        let start = buf.len();
        buf.resize(n * PACKET_SIZE, 0);
        let got = read_exact_or_eof(&mut self.reader, &mut buf[start..])?;
        buf.truncate(start + got);
        let whole = buf.len() / PACKET_SIZE;
        for i in 0..whole {
            packets[i] = TsPacket::from_slice(&buf[i * PACKET_SIZE..])?;
            metadata[i].reset();
        }
        self.trail = buf.split_off(whole * PACKET_SIZE);
        Ok(whole)
    }

    fn read_rs204(
        &mut self,
        packets: &mut [TsPacket],
        metadata: &mut [PacketMetadata],
    ) -> Result<usize> {
        let n = packets.len().min(metadata.len());
        for i in 0..n {
            let mut block = [0u8; PACKET_SIZE];
            let mut off = 0;
            if let Some(b) = self.carry.take() {
                block[0] = b;
                off = 1;
            }
            if off + read_exact_or_eof(&mut self.reader, &mut block[off..])? < PACKET_SIZE {
                return Ok(i);
            }
            *packets[i].as_bytes_mut() = block;
            metadata[i].reset();
            // Parity trailer, ignored.
            let mut trailer = [0u8; RS204_TRAILER_SIZE];
            read_exact_or_eof(&mut self.reader, &mut trailer)?;
        }
        Ok(n)
    }

    fn read_m2ts(
        &mut self,
        packets: &mut [TsPacket],
        metadata: &mut [PacketMetadata],
    ) -> Result<usize> {
        let n = packets.len().min(metadata.len());
        for i in 0..n {
            let mut header = [0u8; 4];
            if read_exact_or_eof(&mut self.reader, &mut header)? < 4 {
                return Ok(i);
            }
            let mut block = [0u8; PACKET_SIZE];
            if read_exact_or_eof(&mut self.reader, &mut block)? < PACKET_SIZE {
                return Ok(i);
            }
            *packets[i].as_bytes_mut() = block;
            metadata[i].reset();
            let ts = u32::from_be_bytes(header) & 0x3FFF_FFFF;
            metadata[i].set_timestamp(ts as u64, TimeSource::M2ts);
        }
        Ok(n)
    }

    fn read_duck(
        &mut self,
        packets: &mut [TsPacket],
        metadata: &mut [PacketMetadata],
    ) -> Result<usize> {
        let n = packets.len().min(metadata.len());
        for i in 0..n {
            let mut header = [0u8; METADATA_SERIALIZED_SIZE];
            if read_exact_or_eof(&mut self.reader, &mut header)? < METADATA_SERIALIZED_SIZE {
                return Ok(i);
            }
            let mut block = [0u8; PACKET_SIZE];
            if read_exact_or_eof(&mut self.reader, &mut block)? < PACKET_SIZE {
                return Ok(i);
            }
            *packets[i].as_bytes_mut() = block;
            metadata[i].deserialize(&header)?;
        }
        Ok(n)
    }
}

/// Writes (packet, metadata) pairs to a raw byte stream in a fixed
/// envelope format. [`TsFormat::Autodetect`] writes raw TS.
pub struct PacketWriter<W> {
    writer: W,
    format: TsFormat,
    /// Last known input timestamp, carried forward so every M2TS packet
    /// gets a stamp even when the caller supplied none for it.
    last_timestamp: u64,
    packets_written: u64,
}

impl<W: Write> PacketWriter<W> {
    /// Create a writer emitting raw TS packets.
    pub fn new(writer: W) -> Self {
        Self::with_format(writer, TsFormat::Ts)
    }

    /// Create a writer with an explicit envelope format.
    pub fn with_format(writer: W, format: TsFormat) -> Self {
        PacketWriter {
            writer,
            format: if format == TsFormat::Autodetect {
                TsFormat::Ts
            } else {
                format
            },
            last_timestamp: 0,
            packets_written: 0,
        }
    }

    /// Envelope format being written.
    pub fn format(&self) -> TsFormat {
        self.format
    }

    /// Total packets written so far.
    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    /// Consume the writer and return the underlying byte stream.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Write all packets, pairing each with its metadata record when one
    /// is available at the same index.
    pub fn write_packets(
        &mut self,
        packets: &[TsPacket],
        metadata: &[PacketMetadata],
    ) -> Result<()> {
        match self.format {
            TsFormat::Ts | TsFormat::Autodetect => {
                // Single bulk write of the concatenated packets.
                let mut buf = Vec::with_capacity(packets.len() * PACKET_SIZE);
                for packet in packets {
                    buf.extend_from_slice(packet.as_bytes());
                }
                self.writer.write_all(&buf)?;
            }
            TsFormat::Rs204 => {
                for packet in packets {
                    self.writer.write_all(packet.as_bytes())?;
                    self.writer.write_all(&[0u8; RS204_TRAILER_SIZE])?;
                }
            }
            TsFormat::M2ts => {
                for (i, packet) in packets.iter().enumerate() {
                    if let Some(ts) = metadata.get(i).and_then(|m| m.timestamp()) {
                        self.last_timestamp = ts;
                    }
                    let header = ((self.last_timestamp as u32) & 0x3FFF_FFFF).to_be_bytes();
                    self.writer.write_all(&header)?;
                    self.writer.write_all(packet.as_bytes())?;
                }
            }
            TsFormat::Duck => {
                for (i, packet) in packets.iter().enumerate() {
                    let meta = metadata.get(i).copied().unwrap_or_default();
                    let mut header = [0u8; METADATA_SERIALIZED_SIZE];
                    meta.serialize(&mut header);
                    self.writer.write_all(&header)?;
                    self.writer.write_all(packet.as_bytes())?;
                }
            }
        }
        self.packets_written += packets.len() as u64;
        Ok(())
    }

    /// Flush the underlying byte stream.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
