//! Core types used throughout vrtlib.
//!
//! These are shared by the codec, the demultiplexer and the ingest side so
//! that none of them needs to depend on another just to name a channel or a
//! sample.

use std::fmt;

use num_complex::Complex32;

/// A normalized complex I/Q sample as delivered to consumers.
pub type ComplexSample = Complex32;

/// One-based identifier of a logical sample stream (a radio tuner).
///
/// The radio tags every data packet with a stream id whose low byte names
/// the tuner, counting from zero. Consumers count tuners from one, so
/// [`ChannelId::from_stream_id`] adds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u16);

impl ChannelId {
    /// The first channel.
    pub const FIRST: ChannelId = ChannelId(1);

    /// Create a `ChannelId` from a one-based channel number.
    ///
    /// Returns `None` for zero.
    pub fn new(number: u16) -> Option<Self> {
        if number == 0 {
            None
        } else {
            Some(ChannelId(number))
        }
    }

    /// Create a `ChannelId` from a zero-based slot index.
    pub fn from_index(index: usize) -> Option<Self> {
        u16::try_from(index).ok()?.checked_add(1).map(ChannelId)
    }

    /// Derive the channel a VRT stream id belongs to.
    pub fn from_stream_id(stream_id: u32) -> Self {
        ChannelId((stream_id & 0xFF) as u16 + 1)
    }

    /// Return the one-based channel number.
    pub fn number(&self) -> u16 {
        self.0
    }

    /// Return the zero-based slot index used for per-channel tables.
    pub fn index(&self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Byte order of 32-bit words on the wire.
///
/// VITA-49 specifies network (big-endian) order, but some radios can be
/// switched to emit little-endian words instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Network byte order.
    #[default]
    Big,
    /// Little-endian words.
    Little,
}

impl ByteOrder {
    /// Read one 32-bit word from the first four bytes of `bytes`.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than four bytes; callers bounds-check
    /// before decoding.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let word = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::Big => u32::from_be_bytes(word),
            ByteOrder::Little => u32::from_le_bytes(word),
        }
    }

    /// Encode one 32-bit word.
    #[inline]
    pub fn write_u32(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::Big => value.to_be_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
        }
    }
}

/// Optional fields of a VRT packet, in wire order.
///
/// Used to name the field in [`Error::FieldNotPresent`](crate::Error::FieldNotPresent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketField {
    /// Stream identifier (1 word).
    StreamId,
    /// Class identifier (2 words).
    ClassId,
    /// Integer timestamp (1 word).
    IntegerTimestamp,
    /// Fractional timestamp (2 words).
    FractionalTimestamp,
    /// Payload (remaining words).
    Payload,
    /// Trailer (1 word, data packets only).
    Trailer,
    /// Timestamp precision bit (context packets only).
    TimestampMode,
}

impl fmt::Display for PacketField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PacketField::StreamId => "stream id",
            PacketField::ClassId => "class id",
            PacketField::IntegerTimestamp => "integer timestamp",
            PacketField::FractionalTimestamp => "fractional timestamp",
            PacketField::Payload => "payload",
            PacketField::Trailer => "trailer",
            PacketField::TimestampMode => "timestamp mode",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_rejects_zero() {
        assert!(ChannelId::new(0).is_none());
        assert_eq!(ChannelId::new(3).map(|c| c.number()), Some(3));
    }

    #[test]
    fn channel_id_from_stream_id_uses_low_byte() {
        assert_eq!(ChannelId::from_stream_id(0x0000_0000), ChannelId::FIRST);
        assert_eq!(ChannelId::from_stream_id(0xABCD_EF01).number(), 2);
        assert_eq!(ChannelId::from_stream_id(0x0000_01FF).number(), 256);
    }

    #[test]
    fn channel_id_index_is_zero_based() {
        assert_eq!(ChannelId::FIRST.index(), 0);
        assert_eq!(ChannelId::new(4).map(|c| c.index()), Some(3));
        assert_eq!(ChannelId::from_index(0), Some(ChannelId::FIRST));
        assert_eq!(ChannelId::from_index(65535), None);
    }

    #[test]
    fn channel_id_display() {
        assert_eq!(ChannelId::FIRST.to_string(), "ch1");
    }

    #[test]
    fn byte_order_reads_words() {
        let bytes = [0x56, 0x52, 0x4C, 0x50];
        assert_eq!(ByteOrder::Big.read_u32(&bytes), 0x5652_4C50);
        assert_eq!(ByteOrder::Little.read_u32(&bytes), 0x504C_5256);
    }

    #[test]
    fn byte_order_write_matches_read() {
        for order in [ByteOrder::Big, ByteOrder::Little] {
            let bytes = order.write_u32(0x1234_5678);
            assert_eq!(order.read_u32(&bytes), 0x1234_5678);
        }
    }

    #[test]
    fn byte_order_defaults_to_network() {
        assert_eq!(ByteOrder::default(), ByteOrder::Big);
    }

    #[test]
    fn packet_field_display() {
        assert_eq!(PacketField::ClassId.to_string(), "class id");
        assert_eq!(PacketField::TimestampMode.to_string(), "timestamp mode");
    }
}
