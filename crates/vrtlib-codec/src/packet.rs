//! VRT packet decoding.
//!
//! A [`VrtPacket`] borrows exactly `packet_size * 4` bytes of the input and
//! decodes fields lazily. Optional fields appear in a fixed order:
//!
//! | Field                | Words | Present when                          |
//! |----------------------|-------|---------------------------------------|
//! | header               | 1     | always                                |
//! | stream id            | 1     | packet types 0x1, 0x3, 0x4, 0x5       |
//! | class id             | 2     | C bit set                             |
//! | integer timestamp    | 1     | TSI != None                           |
//! | fractional timestamp | 2     | TSF != None                           |
//! | payload              | rest  | always (may be empty)                 |
//! | trailer              | 1     | data packet types with the T bit set  |
//!
//! Every accessor finds its offset by walking this chain, since the absence
//! of an earlier field shifts everything after it.

use std::fmt;

use vrtlib_core::{ByteOrder, Error, PacketField, Result};

use crate::header::{
    FractionalTimestampType, IntegerTimestampType, PacketType, TimestampMode, VrtHeader,
};

/// Size of one VRT word in bytes.
pub const WORD_SIZE: usize = 4;

/// Class identifier carried in the two words after the stream id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId {
    /// 24-bit IEEE OUI of the organization defining the class.
    pub organization_id: u32,
    /// Information class code.
    pub info_class_code: u16,
    /// Packet class code.
    pub packet_class_code: u16,
}

/// A decoded VRT packet borrowing its bytes from the input buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VrtPacket<'a> {
    header: VrtHeader,
    packet_type: PacketType,
    bytes: &'a [u8],
    order: ByteOrder,
}

/// Parse a big-endian VRT packet from the start of `data`.
///
/// Bytes beyond the packet's declared size are ignored.
///
/// # Errors
///
/// - [`Error::InsufficientData`] if `data` is shorter than one word or
///   than the declared packet size. Retry once more bytes exist.
/// - [`Error::UnsupportedPacketType`] for type codes above `0x5`.
/// - [`Error::Malformed`] for a zero size or a size too small to hold the
///   fields the header announces.
pub fn parse_packet(data: &[u8]) -> Result<VrtPacket<'_>> {
    parse_packet_with(data, ByteOrder::Big)
}

/// Parse a VRT packet whose words are encoded in `order`.
///
/// See [`parse_packet`] for the error contract.
pub fn parse_packet_with(data: &[u8], order: ByteOrder) -> Result<VrtPacket<'_>> {
    if data.len() < WORD_SIZE {
        return Err(Error::InsufficientData {
            needed: WORD_SIZE,
            available: data.len(),
        });
    }

    let header = VrtHeader::from_word(order.read_u32(data));
    let packet_type = header.packet_type()?;

    let size_words = header.packet_size() as usize;
    if size_words == 0 {
        return Err(Error::Malformed("VRT packet declares zero size".into()));
    }

    let size_bytes = size_words * WORD_SIZE;
    if size_bytes > data.len() {
        return Err(Error::InsufficientData {
            needed: size_bytes,
            available: data.len(),
        });
    }

    let trailer_words = usize::from(trailer_present(header, packet_type));
    let required = payload_offset(header, packet_type) + trailer_words;
    if size_words < required {
        return Err(Error::Malformed(format!(
            "VRT packet of {size_words} words cannot hold its {required} header words"
        )));
    }

    Ok(VrtPacket {
        header,
        packet_type,
        bytes: &data[..size_bytes],
        order,
    })
}

fn trailer_present(header: VrtHeader, packet_type: PacketType) -> bool {
    packet_type.is_data() && header.trailer_bit()
}

/// Word offset of the payload: one past the last optional prologue field.
fn payload_offset(header: VrtHeader, packet_type: PacketType) -> usize {
    let mut offset = 1;
    if packet_type.has_stream_id() {
        offset += 1;
    }
    if header.class_id_present() {
        offset += 2;
    }
    if header.integer_timestamp_type() != IntegerTimestampType::None {
        offset += 1;
    }
    if header.fractional_timestamp_type() != FractionalTimestampType::None {
        offset += 2;
    }
    offset
}

impl<'a> VrtPacket<'a> {
    /// The header word.
    pub fn header(&self) -> VrtHeader {
        self.header
    }

    /// The packet type.
    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// The modulo-16 packet counter.
    pub fn packet_count(&self) -> u8 {
        self.header.packet_count()
    }

    /// Packet length in words, header included.
    pub fn packet_size(&self) -> usize {
        self.header.packet_size() as usize
    }

    /// Packet length in bytes.
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Byte order the packet was decoded with.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// The raw bytes of the whole packet.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Whether a stream id word is present.
    pub fn has_stream_id(&self) -> bool {
        self.packet_type.has_stream_id()
    }

    /// Whether a class id is present.
    pub fn has_class_id(&self) -> bool {
        self.header.class_id_present()
    }

    /// Whether a trailer word is present. Always false for context packets.
    pub fn has_trailer(&self) -> bool {
        trailer_present(self.header, self.packet_type)
    }

    /// Integer timestamp type from the header.
    pub fn integer_timestamp_type(&self) -> IntegerTimestampType {
        self.header.integer_timestamp_type()
    }

    /// Fractional timestamp type from the header.
    pub fn fractional_timestamp_type(&self) -> FractionalTimestampType {
        self.header.fractional_timestamp_type()
    }

    /// Word offset of `field` within the packet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotPresent`] if the header says the field is
    /// absent. [`PacketField::TimestampMode`] lives in the header word and
    /// reports offset 0 for context packets.
    pub fn field_offset(&self, field: PacketField) -> Result<usize> {
        let absent = Err(Error::FieldNotPresent(field));
        let mut offset = 1;

        match field {
            PacketField::TimestampMode => {
                return if self.packet_type.is_context() { Ok(0) } else { absent };
            }
            PacketField::Trailer => {
                return if self.has_trailer() { Ok(self.packet_size() - 1) } else { absent };
            }
            PacketField::StreamId => {
                return if self.has_stream_id() { Ok(offset) } else { absent };
            }
            _ => {}
        }
        if self.has_stream_id() {
            offset += 1;
        }

        if field == PacketField::ClassId {
            return if self.has_class_id() { Ok(offset) } else { absent };
        }
        if self.has_class_id() {
            offset += 2;
        }

        let tsi = self.integer_timestamp_type() != IntegerTimestampType::None;
        if field == PacketField::IntegerTimestamp {
            return if tsi { Ok(offset) } else { absent };
        }
        if tsi {
            offset += 1;
        }

        let tsf = self.fractional_timestamp_type() != FractionalTimestampType::None;
        if field == PacketField::FractionalTimestamp {
            return if tsf { Ok(offset) } else { absent };
        }
        if tsf {
            offset += 2;
        }

        // Only the payload is left.
        Ok(offset)
    }

    /// The stream identifier.
    pub fn stream_id(&self) -> Result<u32> {
        let offset = self.field_offset(PacketField::StreamId)?;
        Ok(self.word(offset))
    }

    /// The class identifier.
    pub fn class_id(&self) -> Result<ClassId> {
        let offset = self.field_offset(PacketField::ClassId)?;
        let upper = self.word(offset);
        let lower = self.word(offset + 1);
        Ok(ClassId {
            organization_id: upper & 0x00FF_FFFF,
            info_class_code: (lower >> 16) as u16,
            packet_class_code: (lower & 0xFFFF) as u16,
        })
    }

    /// The integer timestamp.
    pub fn integer_timestamp(&self) -> Result<u32> {
        let offset = self.field_offset(PacketField::IntegerTimestamp)?;
        Ok(self.word(offset))
    }

    /// The 64-bit fractional timestamp, most significant word first.
    pub fn fractional_timestamp(&self) -> Result<u64> {
        let offset = self.field_offset(PacketField::FractionalTimestamp)?;
        let high = self.word(offset) as u64;
        let low = self.word(offset + 1) as u64;
        Ok((high << 32) | low)
    }

    /// Timestamp precision. Only defined for context packets.
    pub fn timestamp_mode(&self) -> Result<TimestampMode> {
        self.field_offset(PacketField::TimestampMode)?;
        Ok(if self.header.timestamp_mode_bit() {
            TimestampMode::General
        } else {
            TimestampMode::Precise
        })
    }

    /// The trailer word. Only present on data packets with the T bit set.
    pub fn trailer(&self) -> Result<u32> {
        let offset = self.field_offset(PacketField::Trailer)?;
        Ok(self.word(offset))
    }

    /// Payload length in bytes.
    pub fn payload_size(&self) -> usize {
        self.payload().len()
    }

    /// The raw payload bytes, trailer excluded.
    pub fn payload(&self) -> &'a [u8] {
        let start = payload_offset(self.header, self.packet_type) * WORD_SIZE;
        let end = self.bytes.len() - usize::from(self.has_trailer()) * WORD_SIZE;
        &self.bytes[start..end]
    }

    /// Iterate the payload as words decoded in the packet's byte order.
    pub fn payload_words(&self) -> impl Iterator<Item = u32> + 'a {
        let order = self.order;
        self.payload()
            .chunks_exact(WORD_SIZE)
            .map(move |w| order.read_u32(w))
    }

    fn word(&self, index: usize) -> u32 {
        self.order.read_u32(&self.bytes[index * WORD_SIZE..])
    }
}

impl fmt::Debug for VrtPacket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VrtPacket")
            .field("header", &self.header)
            .field("byte_order", &self.order)
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

impl fmt::Display for VrtPacket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} count={} size={}w",
            self.packet_type,
            self.packet_count(),
            self.packet_size()
        )?;
        if let Ok(sid) = self.stream_id() {
            write!(f, " sid=0x{sid:08X}")?;
        }
        if let Ok(cid) = self.class_id() {
            write!(
                f,
                " oui=0x{:06X} icc=0x{:04X} pcc=0x{:04X}",
                cid.organization_id, cid.info_class_code, cid.packet_class_code
            )?;
        }
        if let Ok(ts) = self.integer_timestamp() {
            write!(f, " tsi={:?}:{ts}", self.integer_timestamp_type())?;
        }
        if let Ok(ts) = self.fractional_timestamp() {
            write!(f, " tsf={:?}:{ts}", self.fractional_timestamp_type())?;
        }
        if let Ok(mode) = self.timestamp_mode() {
            write!(f, " tsm={mode:?}")?;
        }
        write!(f, " payload={}B", self.payload_size())?;
        if let Ok(trailer) = self.trailer() {
            write!(f, " trailer=0x{trailer:08X}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
