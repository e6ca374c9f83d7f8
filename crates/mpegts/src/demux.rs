//! Section and table reassembly from a transport packet sequence.
//!
//! [`SectionDemux`] is fed packets in transport-stream order and invokes
//! handlers for every complete, CRC-valid section and for every complete
//! table. Integrity errors (bad CRC, bad section length, continuity
//! breaks) never stop the demux: the damaged data is dropped, a counter
//! is bumped and processing continues with the next packet. A single
//! corrupted section must not halt analysis of the whole multiplex.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use crate::crc32::validate_section_crc32;
use crate::packet::TsPacket;
use crate::section::{Etid, LONG_SECTION_LENGTH_MIN, SECTION_LENGTH_MAX, Section, Table};

/// Monotonic demux diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    /// Packets with a bad sync byte or the transport error bit set.
    pub invalid_sync: u64,
    /// Continuity counter breaks.
    pub discontinuities: u64,
    /// Scrambled packets, skipped entirely.
    pub scrambled: u64,
    /// Sections with a length outside the legal range.
    pub invalid_section_length: u64,
    /// Sections with section_number > last_section_number.
    pub invalid_section_index: u64,
    /// Long sections whose CRC-32 did not match.
    pub wrong_crc: u64,
}

/// Reassembly state for one table in flight: one ETID at one version.
struct EtidContext {
    version: u8,
    expected: usize,
    received: usize,
    sections: Vec<Option<Section>>,
    /// Packet index of the first and last section arrival, for
    /// repetition-interval statistics.
    first_index: u64,
    last_index: u64,
}

/// Reassembly state for one PID.
#[derive(Default)]
struct PidContext {
    /// A PID starts unsynchronized; the first payload-unit-start flips it.
    sync: bool,
    last_cc: Option<u8>,
    /// Raw payload bytes not yet forming a complete section.
    buffer: BytesMut,
    etids: HashMap<Etid, EtidContext>,
    last_pusi_index: u64,
}

type SectionHandler = Box<dyn FnMut(&Section)>;
type TableHandler = Box<dyn FnMut(&Table)>;

/// Section/table reassembly state machine.
///
/// Packets must be fed in transport-stream order; per-PID continuity and
/// section boundary tracking is meaningless otherwise.
pub struct SectionDemux {
    pids: HashMap<u16, PidContext>,
    stats: DemuxStats,
    validate_crc: bool,
    section_handler: Option<SectionHandler>,
    table_handler: Option<TableHandler>,
    packet_index: u64,
}

impl SectionDemux {
    /// Create a demux with no handlers and CRC validation enabled.
    pub fn new() -> Self {
        SectionDemux {
            pids: HashMap::new(),
            stats: DemuxStats::default(),
            validate_crc: true,
            section_handler: None,
            table_handler: None,
            packet_index: 0,
        }
    }

    /// Install a handler invoked for every complete table.
    pub fn on_table(mut self, handler: impl FnMut(&Table) + 'static) -> Self {
        self.table_handler = Some(Box::new(handler));
        self
    }

    /// Install a handler invoked for every valid current section, before
    /// the table it belongs to completes.
    pub fn on_section(mut self, handler: impl FnMut(&Section) + 'static) -> Self {
        self.section_handler = Some(Box::new(handler));
        self
    }

    /// Enable or disable CRC-32 validation of long sections.
    pub fn with_crc_validation(mut self, validate: bool) -> Self {
        self.validate_crc = validate;
        self
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> DemuxStats {
        self.stats
    }

    /// Number of packets fed so far.
    pub fn packet_count(&self) -> u64 {
        self.packet_index
    }

    /// Drop all reassembly state and statistics.
    pub fn reset(&mut self) {
        self.pids.clear();
        self.stats = DemuxStats::default();
        self.packet_index = 0;
    }

    /// Drop the reassembly state of one PID.
    pub fn remove_pid(&mut self, pid: u16) {
        self.pids.remove(&pid);
    }

    /// Index of the last packet carrying a payload unit start on a PID,
    /// `None` for PIDs never seen.
    pub fn last_pusi_index(&self, pid: u16) -> Option<u64> {
        self.pids.get(&pid).map(|ctx| ctx.last_pusi_index)
    }

    /// Feed the next packet of the stream. Never fails: malformed input
    /// is counted and skipped.
    pub fn feed_packet(&mut self, packet: &TsPacket) {
        let index = self.packet_index;
        self.packet_index += 1;

        if !packet.has_valid_sync() || packet.transport_error() {
            self.stats.invalid_sync += 1;
            return;
        }
        if packet.is_scrambled() {
            self.stats.scrambled += 1;
            return;
        }
        if !packet.has_payload() {
            return;
        }

        let pid = packet.pid();
        let ctx = self.pids.entry(pid).or_default();
        let cc = packet.continuity_counter();
        if let Some(last) = ctx.last_cc {
            if cc == last {
                // Intentional duplicate, only the first copy counts.
                return;
            }
            if cc != (last + 1) & 0x0F {
                self.stats.discontinuities += 1;
                ctx.sync = false;
                ctx.buffer.clear();
                trace!(pid, last, cc, "continuity break, reassembly reset");
            }
        }
        ctx.last_cc = Some(cc);

        let payload = packet.payload();
        if packet.payload_unit_start() {
            if payload.is_empty() {
                return;
            }
            let pointer = payload[0] as usize;
            ctx.last_pusi_index = index;
            if !ctx.sync || ctx.buffer.is_empty() {
                // Start of accumulation: skip straight to the first
                // section starting in this packet.
                ctx.sync = true;
                ctx.buffer.clear();
                if 1 + pointer <= payload.len() {
                    ctx.buffer.put_slice(&payload[1 + pointer..]);
                }
            } else {
                // The bytes before the pointer complete the pending
                // section; extraction below is driven by section lengths.
                ctx.buffer.put_slice(&payload[1..]);
            }
        } else {
            if !ctx.sync {
                return;
            }
            ctx.buffer.put_slice(payload);
        }

        // Pull every complete section out of the accumulation buffer.
        let mut completed = Vec::new();
        loop {
            if ctx.buffer.is_empty() {
                break;
            }
            if ctx.buffer[0] == 0xFF {
                // Stuffing: nothing else in this packet run.
                ctx.buffer.clear();
                break;
            }
            if ctx.buffer.len() < 3 {
                break;
            }
            let long = ctx.buffer[1] & 0x80 != 0;
            let length = (((ctx.buffer[1] & 0x0F) as u16) << 8) | ctx.buffer[2] as u16;
            if length > SECTION_LENGTH_MAX || (long && length < LONG_SECTION_LENGTH_MIN) {
                self.stats.invalid_section_length += 1;
                ctx.sync = false;
                ctx.buffer.clear();
                break;
            }
            let total = 3 + length as usize;
            if ctx.buffer.len() < total {
                break;
            }
            let raw = ctx.buffer.split_to(total).freeze();
            match Section::from_bytes(raw, pid) {
                Ok(section) => completed.push(section),
                Err(_) => {
                    // Length was validated above; treat as desync anyway.
                    self.stats.invalid_section_length += 1;
                    ctx.sync = false;
                    ctx.buffer.clear();
                    break;
                }
            }
        }

        for section in completed {
            self.process_section(pid, section, index);
        }
    }

    /// Validate one extracted section and feed it into table reassembly.
    fn process_section(&mut self, pid: u16, section: Section, index: u64) {
        if section.is_long() && self.validate_crc && !validate_section_crc32(section.as_bytes()) {
            self.stats.wrong_crc += 1;
            debug!(pid, table_id = section.table_id(), "section dropped: wrong CRC-32");
            return;
        }
        if !section.is_current() {
            // "Next" sections describe a future table version, never
            // reported.
            return;
        }
        if section.section_number() > section.last_section_number() {
            self.stats.invalid_section_index += 1;
            return;
        }

        if let Some(handler) = self.section_handler.as_mut() {
            handler(&section);
        }

        if !section.is_long() {
            // Short sections form single-section tables immediately.
            if let Some(handler) = self.table_handler.as_mut() {
                handler(&Table::new(vec![section]));
            }
            return;
        }

        let expected = section.last_section_number() as usize + 1;
        let version = section.version();
        let etid = section.etid();
        let Some(ctx) = self.pids.get_mut(&pid) else {
            return;
        };
        let ectx = ctx.etids.entry(etid).or_insert_with(|| EtidContext {
            version,
            expected,
            received: 0,
            sections: vec![None; expected],
            first_index: index,
            last_index: index,
        });
        if ectx.version != version || ectx.expected != expected {
            // A new version discards the whole partial collection.
            *ectx = EtidContext {
                version,
                expected,
                received: 0,
                sections: vec![None; expected],
                first_index: index,
                last_index: index,
            };
        }
        let number = section.section_number() as usize;
        if ectx.sections[number].is_none() {
            ectx.received += 1;
        }
        ectx.sections[number] = Some(section);
        ectx.last_index = index;

        if ectx.received == ectx.expected {
            let sections: Vec<Section> = ectx.sections.drain(..).flatten().collect();
            trace!(
                pid,
                table_id = etid.table_id,
                version,
                spread = ectx.last_index - ectx.first_index,
                "table complete"
            );
            // Reset for the next repetition of the same version.
            ectx.received = 0;
            ectx.sections = vec![None; ectx.expected];
            ectx.first_index = index;
            if let Some(handler) = self.table_handler.as_mut() {
                handler(&Table::new(sections));
            }
        }
    }
}

impl Default for SectionDemux {
    fn default() -> Self {
        SectionDemux::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc32::mpeg2_crc32;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Build a long-form section with a valid CRC.
    fn long_section(
        table_id: u8,
        ext: u16,
        version: u8,
        number: u8,
        last: u8,
        payload: &[u8],
    ) -> Vec<u8> {
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
        data.extend_from_slice(payload);
        let crc = mpeg2_crc32(&data);
        data.extend_from_slice(&crc.to_be_bytes());
        data
    }

    /// Split section bytes into TS packets on one PID, pointer field 0 on
    /// the first packet, 0xFF stuffing at the end.
    fn packetize(pid: u16, first_cc: u8, sections: &[Vec<u8>]) -> Vec<TsPacket> {
        let mut data = vec![0u8]; // pointer field
        for section in sections {
            data.extend_from_slice(section);
        }
        let mut packets = Vec::new();
        let mut cc = first_cc;
        let mut offset = 0;
        while offset < data.len() {
            let mut packet = TsPacket::NULL;
            packet.init(pid, cc, 0xFF);
            packet.set_payload_unit_start(offset == 0);
            let payload = packet.payload_mut();
            let take = payload.len().min(data.len() - offset);
            payload[..take].copy_from_slice(&data[offset..offset + take]);
            packets.push(packet);
            offset += take;
            cc = (cc + 1) & 0x0F;
        }
        packets
    }

    fn counting_demux() -> (SectionDemux, Rc<RefCell<Vec<usize>>>, Rc<RefCell<u64>>) {
        let tables = Rc::new(RefCell::new(Vec::new()));
        let sections = Rc::new(RefCell::new(0u64));
        let t = tables.clone();
        let s = sections.clone();
        let demux = SectionDemux::new()
            .on_table(move |table: &Table| t.borrow_mut().push(table.section_count()))
            .on_section(move |_| *s.borrow_mut() += 1);
        (demux, tables, sections)
    }

    #[test]
    fn test_table_complete_in_order() {
        let (mut demux, tables, sections) = counting_demux();
        let mut cc = 0;
        for number in 0..3u8 {
            let section = long_section(0x42, 0x0001, 1, number, 2, &[number; 10]);
            for packet in packetize(0x0100, cc, &[section]) {
                demux.feed_packet(&packet);
                cc = (cc + 1) & 0x0F;
            }
        }
        assert_eq!(*tables.borrow(), vec![3]);
        assert_eq!(*sections.borrow(), 3);
        assert_eq!(demux.stats(), DemuxStats::default());
    }

    #[test]
    fn test_table_complete_out_of_order() {
        let (mut demux, tables, _) = counting_demux();
        let mut cc = 0;
        for number in [0u8, 2, 1] {
            let section = long_section(0x42, 0x0001, 1, number, 2, &[number; 10]);
            for packet in packetize(0x0100, cc, &[section]) {
                demux.feed_packet(&packet);
                cc = (cc + 1) & 0x0F;
            }
        }
        assert_eq!(*tables.borrow(), vec![3]);
    }

    #[test]
    fn test_table_sections_ordered_by_number() {
        let delivered: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let d = delivered.clone();
        let mut demux = SectionDemux::new().on_table(move |table: &Table| {
            d.borrow_mut()
                .extend(table.sections().iter().map(|s| s.section_number()));
        });
        let mut cc = 0;
        for number in [1u8, 0] {
            let section = long_section(0x42, 0, 3, number, 1, &[0xEE; 4]);
            for packet in packetize(0x0100, cc, &[section]) {
                demux.feed_packet(&packet);
                cc = (cc + 1) & 0x0F;
            }
        }
        assert_eq!(*delivered.borrow(), vec![0, 1]);
    }

    #[test]
    fn test_wrong_crc_counted_and_dropped() {
        let (mut demux, tables, sections) = counting_demux();
        let mut section = long_section(0x42, 0, 0, 0, 0, &[1, 2, 3]);
        let len = section.len();
        section[len - 1] ^= 0xFF; // corrupt the CRC
        for packet in packetize(0x0100, 0, &[section]) {
            demux.feed_packet(&packet);
        }
        assert_eq!(demux.stats().wrong_crc, 1);
        assert!(tables.borrow().is_empty());
        assert_eq!(*sections.borrow(), 0);
    }

    #[test]
    fn test_crc_validation_can_be_disabled() {
        let tables = Rc::new(RefCell::new(Vec::new()));
        let t = tables.clone();
        let mut demux = SectionDemux::new()
            .with_crc_validation(false)
            .on_table(move |table: &Table| t.borrow_mut().push(table.table_id()));
        let mut section = long_section(0x42, 0, 0, 0, 0, &[1, 2, 3]);
        let len = section.len();
        section[len - 1] ^= 0xFF;
        for packet in packetize(0x0100, 0, &[section]) {
            demux.feed_packet(&packet);
        }
        assert_eq!(*tables.borrow(), vec![0x42]);
    }

    #[test]
    fn test_version_change_discards_partial_table() {
        let (mut demux, tables, _) = counting_demux();
        let mut cc = 0;
        // Two of three sections at version 1, then a full run at version 2.
        for (version, number, last) in [(1u8, 0u8, 2u8), (1, 1, 2), (2, 0, 0)] {
            let section = long_section(0x42, 0, version, number, last, &[version; 8]);
            for packet in packetize(0x0100, cc, &[section]) {
                demux.feed_packet(&packet);
                cc = (cc + 1) & 0x0F;
            }
        }
        // Only the version-2 single-section table completes.
        assert_eq!(*tables.borrow(), vec![1]);
    }

    #[test]
    fn test_discontinuity_discards_partial_section() {
        let (mut demux, tables, sections) = counting_demux();
        // A section large enough to span three packets.
        let section = long_section(0x42, 0, 0, 0, 0, &[0x55; 400]);
        let packets = packetize(0x0100, 0, &[section]);
        assert!(packets.len() >= 3);
        for (i, packet) in packets.iter().enumerate() {
            if i == 1 {
                continue; // lose the middle packet
            }
            demux.feed_packet(packet);
        }
        assert_eq!(demux.stats().discontinuities, 1);
        assert!(tables.borrow().is_empty());
        assert_eq!(*sections.borrow(), 0);
    }

    #[test]
    fn test_section_split_across_packets() {
        let (mut demux, tables, sections) = counting_demux();
        let section = long_section(0x42, 0, 0, 0, 0, &[0x55; 400]);
        for packet in packetize(0x0100, 0, &[section]) {
            demux.feed_packet(&packet);
        }
        assert_eq!(*sections.borrow(), 1);
        assert_eq!(*tables.borrow(), vec![1]);
    }

    #[test]
    fn test_two_sections_in_one_packet() {
        let (mut demux, tables, sections) = counting_demux();
        let a = long_section(0x42, 0, 0, 0, 0, &[1; 4]);
        let b = long_section(0x43, 0, 0, 0, 0, &[2; 4]);
        for packet in packetize(0x0100, 0, &[a, b]) {
            demux.feed_packet(&packet);
        }
        assert_eq!(*sections.borrow(), 2);
        assert_eq!(*tables.borrow(), vec![1, 1]);
    }

    #[test]
    fn test_pointer_field_skips_continuation() {
        let (mut demux, tables, _) = counting_demux();
        let section = long_section(0x42, 0, 0, 0, 0, &[9; 4]);
        // First packet of this PID carries the tail of some earlier
        // section (pointer = 5): those bytes must be skipped, not parsed.
        let mut packet = TsPacket::NULL;
        packet.init(0x0100, 0, 0xFF);
        packet.set_payload_unit_start(true);
        let payload = packet.payload_mut();
        payload[0] = 5; // pointer
        payload[1..6].fill(0xAB); // tail of an unseen section
        payload[6..6 + section.len()].copy_from_slice(&section);
        demux.feed_packet(&packet);
        assert_eq!(*tables.borrow(), vec![1]);
        assert_eq!(demux.stats(), DemuxStats::default());
    }

    #[test]
    fn test_data_before_first_pusi_is_discarded() {
        let (mut demux, tables, sections) = counting_demux();
        let section = long_section(0x42, 0, 0, 0, 0, &[7; 300]);
        let packets = packetize(0x0100, 0, &[section]);
        // Start mid-section: no unit start seen yet on this PID.
        for packet in &packets[1..] {
            demux.feed_packet(packet);
        }
        assert_eq!(*sections.borrow(), 0);
        assert!(tables.borrow().is_empty());
        assert_eq!(demux.stats().discontinuities, 0);
    }

    #[test]
    fn test_short_section_immediate_table() {
        let (mut demux, tables, sections) = counting_demux();
        let short = vec![0x72u8, 0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF];
        for packet in packetize(0x0014, 0, &[short]) {
            demux.feed_packet(&packet);
        }
        assert_eq!(*sections.borrow(), 1);
        assert_eq!(*tables.borrow(), vec![1]);
    }

    #[test]
    fn test_next_section_ignored() {
        let (mut demux, tables, sections) = counting_demux();
        let mut section = long_section(0x42, 0, 0, 0, 0, &[3; 4]);
        section[5] &= !0x01; // current/next = next
        // Fix the CRC after the flip.
        let len = section.len();
        let crc = mpeg2_crc32(&section[..len - 4]);
        section[len - 4..].copy_from_slice(&crc.to_be_bytes());
        for packet in packetize(0x0100, 0, &[section]) {
            demux.feed_packet(&packet);
        }
        assert_eq!(*sections.borrow(), 0);
        assert!(tables.borrow().is_empty());
    }

    #[test]
    fn test_invalid_section_index_counted() {
        let (mut demux, tables, _) = counting_demux();
        let section = long_section(0x42, 0, 0, 5, 2, &[1; 4]); // number > last
        for packet in packetize(0x0100, 0, &[section]) {
            demux.feed_packet(&packet);
        }
        assert_eq!(demux.stats().invalid_section_index, 1);
        assert!(tables.borrow().is_empty());
    }

    #[test]
    fn test_scrambled_packet_skipped() {
        let mut demux = SectionDemux::new();
        let mut packet = TsPacket::NULL;
        packet.init(0x0100, 0, 0x00);
        packet.as_bytes_mut()[3] |= 0x80; // scrambling control
        demux.feed_packet(&packet);
        assert_eq!(demux.stats().scrambled, 1);
    }

    #[test]
    fn test_duplicate_packet_ignored() {
        let (mut demux, tables, sections) = counting_demux();
        let section = long_section(0x42, 0, 0, 0, 0, &[4; 4]);
        let packets = packetize(0x0100, 0, &[section]);
        assert_eq!(packets.len(), 1);
        demux.feed_packet(&packets[0]);
        demux.feed_packet(&packets[0]); // same continuity counter
        assert_eq!(*sections.borrow(), 1);
        assert_eq!(*tables.borrow(), vec![1]);
        assert_eq!(demux.stats().discontinuities, 0);
    }

    #[test]
    fn test_table_repetition_delivered_each_time() {
        let (mut demux, tables, _) = counting_demux();
        let section = long_section(0x00, 0x0001, 0, 0, 0, &[0xE0, 0x10]);
        let mut cc = 0;
        for _ in 0..3 {
            for packet in packetize(0x0000, cc, &[section.clone()]) {
                demux.feed_packet(&packet);
                cc = (cc + 1) & 0x0F;
            }
        }
        assert_eq!(*tables.borrow(), vec![1, 1, 1]);
    }

    #[test]
    fn test_reset_clears_state_and_stats() {
        let (mut demux, _, _) = counting_demux();
        let mut packet = TsPacket::NULL;
        packet.init(0x0100, 0, 0x00);
        packet.as_bytes_mut()[0] = 0x00; // bad sync
        demux.feed_packet(&packet);
        assert_eq!(demux.stats().invalid_sync, 1);
        demux.reset();
        assert_eq!(demux.stats(), DemuxStats::default());
        assert_eq!(demux.packet_count(), 0);
    }
}
