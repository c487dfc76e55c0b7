//! VRT packet header word.
//!
//! The header is a single 32-bit word. Bit positions follow ANSI/VITA 49.0
//! section 6.1.1:
//!
//! ```text
//!  31..28  27  26  25  24  23..22  21..20  19..16  15..0
//!  type    C   T   R   TSM TSI     TSF     count   size
//! ```
//!
//! Fields are exposed through explicit shift/mask accessors so the layout
//! is independent of host byte order and compiler bit-field rules.

use std::fmt;

use vrtlib_core::{Error, Result};

const TYPE_SHIFT: u32 = 28;
const CLASS_ID_BIT: u32 = 27;
const TRAILER_BIT: u32 = 26;
const RESERVED_BIT: u32 = 25;
const TSM_BIT: u32 = 24;
const TSI_SHIFT: u32 = 22;
const TSF_SHIFT: u32 = 20;
const COUNT_SHIFT: u32 = 16;

const NIBBLE: u32 = 0x0F;
const TWO_BITS: u32 = 0x03;
const SIZE_MASK: u32 = 0xFFFF;

/// Modulus of the 4-bit packet counter.
pub const PACKET_COUNT_MODULUS: u16 = 16;

/// Type of VRT packet (ANSI/VITA 49.0 table 6.1.1-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// IF data without a stream identifier.
    IfDataNoStreamId = 0x0,
    /// IF data with a stream identifier. Carries I/Q samples.
    IfData = 0x1,
    /// Extension data without a stream identifier.
    ExtensionDataNoStreamId = 0x2,
    /// Extension data with a stream identifier.
    ExtensionData = 0x3,
    /// IF context.
    IfContext = 0x4,
    /// Extension context.
    ExtensionContext = 0x5,
}

impl PacketType {
    /// Map a 4-bit type code to a packet type.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x0 => Some(PacketType::IfDataNoStreamId),
            0x1 => Some(PacketType::IfData),
            0x2 => Some(PacketType::ExtensionDataNoStreamId),
            0x3 => Some(PacketType::ExtensionData),
            0x4 => Some(PacketType::IfContext),
            0x5 => Some(PacketType::ExtensionContext),
            _ => None,
        }
    }

    /// The 4-bit wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether packets of this type carry a stream identifier word.
    pub fn has_stream_id(self) -> bool {
        !matches!(
            self,
            PacketType::IfDataNoStreamId | PacketType::ExtensionDataNoStreamId
        )
    }

    /// Whether this is one of the four data packet types.
    pub fn is_data(self) -> bool {
        !self.is_context()
    }

    /// Whether this is a context packet type.
    pub fn is_context(self) -> bool {
        matches!(self, PacketType::IfContext | PacketType::ExtensionContext)
    }
}

/// Integer timestamp type (ANSI/VITA 49.0 table 6.1.1-2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerTimestampType {
    /// No integer timestamp field.
    None,
    /// Seconds since the UTC epoch.
    Utc,
    /// GPS time.
    Gps,
    /// Other, application defined.
    Other,
}

impl IntegerTimestampType {
    fn from_bits(bits: u32) -> Self {
        match bits & TWO_BITS {
            0 => IntegerTimestampType::None,
            1 => IntegerTimestampType::Utc,
            2 => IntegerTimestampType::Gps,
            _ => IntegerTimestampType::Other,
        }
    }

    fn bits(self) -> u32 {
        match self {
            IntegerTimestampType::None => 0,
            IntegerTimestampType::Utc => 1,
            IntegerTimestampType::Gps => 2,
            IntegerTimestampType::Other => 3,
        }
    }
}

/// Fractional timestamp type (ANSI/VITA 49.0 table 6.1.1-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FractionalTimestampType {
    /// No fractional timestamp field.
    None,
    /// Sample count since the integer timestamp.
    SampleCount,
    /// Picoseconds since the integer timestamp.
    RealTime,
    /// Free-running count.
    FreeRunning,
}

impl FractionalTimestampType {
    fn from_bits(bits: u32) -> Self {
        match bits & TWO_BITS {
            0 => FractionalTimestampType::None,
            1 => FractionalTimestampType::SampleCount,
            2 => FractionalTimestampType::RealTime,
            _ => FractionalTimestampType::FreeRunning,
        }
    }

    fn bits(self) -> u32 {
        match self {
            FractionalTimestampType::None => 0,
            FractionalTimestampType::SampleCount => 1,
            FractionalTimestampType::RealTime => 2,
            FractionalTimestampType::FreeRunning => 3,
        }
    }
}

/// Timestamp precision of a context packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampMode {
    /// Timestamps are precise to the event they describe.
    Precise,
    /// Timestamps are general to the packet.
    General,
}

/// A raw VRT header word with typed accessors.
///
/// The `with_*` methods return a modified copy and exist so that encoders
/// share the one bit layout defined here.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VrtHeader(u32);

impl VrtHeader {
    /// Wrap a decoded header word.
    pub fn from_word(word: u32) -> Self {
        VrtHeader(word)
    }

    /// The raw header word.
    pub fn word(&self) -> u32 {
        self.0
    }

    /// The raw 4-bit packet type code.
    pub fn packet_type_code(&self) -> u8 {
        ((self.0 >> TYPE_SHIFT) & NIBBLE) as u8
    }

    /// The packet type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPacketType`] for codes above `0x5`.
    pub fn packet_type(&self) -> Result<PacketType> {
        let code = self.packet_type_code();
        PacketType::from_code(code).ok_or(Error::UnsupportedPacketType(code))
    }

    /// The C bit: a class identifier follows the stream id.
    pub fn class_id_present(&self) -> bool {
        self.bit(CLASS_ID_BIT)
    }

    /// The T bit. Only meaningful for data packets.
    pub fn trailer_bit(&self) -> bool {
        self.bit(TRAILER_BIT)
    }

    /// The reserved bit.
    pub fn reserved_bit(&self) -> bool {
        self.bit(RESERVED_BIT)
    }

    /// The TSM bit. Only meaningful for context packets.
    pub fn timestamp_mode_bit(&self) -> bool {
        self.bit(TSM_BIT)
    }

    /// The integer timestamp type.
    pub fn integer_timestamp_type(&self) -> IntegerTimestampType {
        IntegerTimestampType::from_bits(self.0 >> TSI_SHIFT)
    }

    /// The fractional timestamp type.
    pub fn fractional_timestamp_type(&self) -> FractionalTimestampType {
        FractionalTimestampType::from_bits(self.0 >> TSF_SHIFT)
    }

    /// The modulo-16 packet counter.
    pub fn packet_count(&self) -> u8 {
        ((self.0 >> COUNT_SHIFT) & NIBBLE) as u8
    }

    /// Total packet length in 32-bit words, header included.
    pub fn packet_size(&self) -> u16 {
        (self.0 & SIZE_MASK) as u16
    }

    /// Set the packet type.
    pub fn with_packet_type(self, packet_type: PacketType) -> Self {
        self.with_field(TYPE_SHIFT, NIBBLE, packet_type.code() as u32)
    }

    /// Set the C bit.
    pub fn with_class_id(self, present: bool) -> Self {
        self.with_field(CLASS_ID_BIT, 1, present as u32)
    }

    /// Set the T bit.
    pub fn with_trailer(self, present: bool) -> Self {
        self.with_field(TRAILER_BIT, 1, present as u32)
    }

    /// Set the TSM bit.
    pub fn with_timestamp_mode(self, mode: TimestampMode) -> Self {
        self.with_field(TSM_BIT, 1, (mode == TimestampMode::General) as u32)
    }

    /// Set the integer timestamp type.
    pub fn with_integer_timestamp_type(self, tsi: IntegerTimestampType) -> Self {
        self.with_field(TSI_SHIFT, TWO_BITS, tsi.bits())
    }

    /// Set the fractional timestamp type.
    pub fn with_fractional_timestamp_type(self, tsf: FractionalTimestampType) -> Self {
        self.with_field(TSF_SHIFT, TWO_BITS, tsf.bits())
    }

    /// Set the packet counter (taken modulo 16).
    pub fn with_packet_count(self, count: u8) -> Self {
        self.with_field(COUNT_SHIFT, NIBBLE, count as u32)
    }

    /// Set the packet size in words.
    pub fn with_packet_size(self, words: u16) -> Self {
        self.with_field(0, SIZE_MASK, words as u32)
    }

    fn bit(&self, bit: u32) -> bool {
        (self.0 >> bit) & 1 == 1
    }

    fn with_field(self, shift: u32, mask: u32, value: u32) -> Self {
        VrtHeader((self.0 & !(mask << shift)) | ((value & mask) << shift))
    }
}

impl fmt::Debug for VrtHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VrtHeader")
            .field("packet_type", &self.packet_type_code())
            .field("class_id", &self.class_id_present())
            .field("trailer", &self.trailer_bit())
            .field("tsm", &self.timestamp_mode_bit())
            .field("tsi", &self.integer_timestamp_type())
            .field("tsf", &self.fractional_timestamp_type())
            .field("packet_count", &self.packet_count())
            .field("packet_size", &self.packet_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_type_codes() {
        for code in 0..=5u8 {
            let pt = PacketType::from_code(code).unwrap();
            assert_eq!(pt.code(), code);
        }
        for code in 6..=15u8 {
            assert!(PacketType::from_code(code).is_none(), "code {code}");
        }
    }

    #[test]
    fn stream_id_presence_by_type() {
        assert!(!PacketType::IfDataNoStreamId.has_stream_id());
        assert!(PacketType::IfData.has_stream_id());
        assert!(!PacketType::ExtensionDataNoStreamId.has_stream_id());
        assert!(PacketType::ExtensionData.has_stream_id());
        assert!(PacketType::IfContext.has_stream_id());
        assert!(PacketType::ExtensionContext.has_stream_id());
    }

    #[test]
    fn data_and_context_classification() {
        assert!(PacketType::IfData.is_data());
        assert!(PacketType::ExtensionDataNoStreamId.is_data());
        assert!(PacketType::IfContext.is_context());
        assert!(!PacketType::ExtensionContext.is_data());
    }

    #[test]
    fn decode_known_word() {
        // IF data, C=1, T=1, TSI=UTC, TSF=real time, count=9, size=0x0123
        let h = VrtHeader::from_word(0x1C69_0123);
        assert_eq!(h.packet_type().unwrap(), PacketType::IfData);
        assert!(h.class_id_present());
        assert!(h.trailer_bit());
        assert!(!h.reserved_bit());
        assert!(!h.timestamp_mode_bit());
        assert_eq!(h.integer_timestamp_type(), IntegerTimestampType::Utc);
        assert_eq!(h.fractional_timestamp_type(), FractionalTimestampType::RealTime);
        assert_eq!(h.packet_count(), 9);
        assert_eq!(h.packet_size(), 0x0123);
    }

    #[test]
    fn builder_methods_produce_known_word() {
        let h = VrtHeader::default()
            .with_packet_type(PacketType::IfData)
            .with_class_id(true)
            .with_trailer(true)
            .with_integer_timestamp_type(IntegerTimestampType::Utc)
            .with_fractional_timestamp_type(FractionalTimestampType::RealTime)
            .with_packet_count(9)
            .with_packet_size(0x0123);
        assert_eq!(h.word(), 0x1C69_0123);
    }

    #[test]
    fn unsupported_type_code() {
        let h = VrtHeader::from_word(0xF000_0001);
        assert_eq!(h.packet_type_code(), 0xF);
        assert!(matches!(h.packet_type(), Err(Error::UnsupportedPacketType(0xF))));
    }

    #[test]
    fn packet_count_wraps_to_nibble() {
        let h = VrtHeader::default().with_packet_count(17);
        assert_eq!(h.packet_count(), 1);
    }

    #[test]
    fn setters_do_not_disturb_neighbours() {
        let h = VrtHeader::from_word(0xFFFF_FFFF).with_packet_count(0);
        assert_eq!(h.packet_size(), 0xFFFF);
        assert_eq!(h.fractional_timestamp_type(), FractionalTimestampType::FreeRunning);
        assert_eq!(h.packet_count(), 0);
    }

    #[test]
    fn timestamp_mode_bit() {
        let h = VrtHeader::default().with_timestamp_mode(TimestampMode::General);
        assert!(h.timestamp_mode_bit());
        let h = h.with_timestamp_mode(TimestampMode::Precise);
        assert!(!h.timestamp_mode_bit());
    }
}
