//! Encoders for hand-built VRT packets and VRL frames.
//!
//! The decoder never needs to write packets, so tests build them here.
//! Header bits are set through [`VrtHeader`]'s `with_*` methods so the
//! encoder and decoder share one bit layout; only the word sequence is
//! assembled here.
//!
//! # Example
//!
//! ```
//! use vrtlib_test_harness::{iq_word, VrlFrameBuilder, VrtPacketBuilder};
//!
//! let bytes = VrlFrameBuilder::new()
//!     .frame_count(7)
//!     .packet(VrtPacketBuilder::if_data(0).iq_samples(&[(16384, -16384); 4]))
//!     .build();
//! assert_eq!(bytes.len(), 9 * 4);
//! assert_eq!(iq_word(1, -1), 0x0001_FFFF);
//! ```

use vrtlib_codec::{
    ClassId, FractionalTimestampType, IntegerTimestampType, PacketType, TimestampMode,
    VrlFrameInfo, VrtHeader, ALIGNMENT_VRLP, TRAILER_VEND,
};
use vrtlib_core::ByteOrder;

/// Pack one I/Q pair into a payload word (I high, Q low).
pub fn iq_word(i: i16, q: i16) -> u32 {
    ((i as u16 as u32) << 16) | (q as u16 as u32)
}

fn to_bytes(words: &[u32], order: ByteOrder) -> Vec<u8> {
    words.iter().flat_map(|w| order.write_u32(*w)).collect()
}

/// Fluent encoder for a single VRT packet.
#[derive(Debug, Clone)]
pub struct VrtPacketBuilder {
    packet_type: PacketType,
    stream_id: u32,
    class_id: Option<ClassId>,
    integer_timestamp: Option<(IntegerTimestampType, u32)>,
    fractional_timestamp: Option<(FractionalTimestampType, u64)>,
    timestamp_mode: TimestampMode,
    packet_count: u8,
    payload: Vec<u32>,
    trailer: Option<u32>,
    declared_size: Option<u16>,
}

impl VrtPacketBuilder {
    /// Start a packet of the given type with stream id 0 and no payload.
    pub fn new(packet_type: PacketType) -> Self {
        VrtPacketBuilder {
            packet_type,
            stream_id: 0,
            class_id: None,
            integer_timestamp: None,
            fractional_timestamp: None,
            timestamp_mode: TimestampMode::Precise,
            packet_count: 0,
            payload: Vec::new(),
            trailer: None,
            declared_size: None,
        }
    }

    /// Start an IF data packet for `stream_id`.
    pub fn if_data(stream_id: u32) -> Self {
        Self::new(PacketType::IfData).stream_id(stream_id)
    }

    /// Set the stream id. Ignored for types without one.
    pub fn stream_id(mut self, stream_id: u32) -> Self {
        self.stream_id = stream_id;
        self
    }

    /// Add a class id.
    pub fn class_id(mut self, class_id: ClassId) -> Self {
        self.class_id = Some(class_id);
        self
    }

    /// Add an integer timestamp.
    pub fn integer_timestamp(mut self, kind: IntegerTimestampType, value: u32) -> Self {
        self.integer_timestamp = Some((kind, value));
        self
    }

    /// Add a fractional timestamp.
    pub fn fractional_timestamp(mut self, kind: FractionalTimestampType, value: u64) -> Self {
        self.fractional_timestamp = Some((kind, value));
        self
    }

    /// Set the TSM bit.
    pub fn timestamp_mode(mut self, mode: TimestampMode) -> Self {
        self.timestamp_mode = mode;
        self
    }

    /// Set the modulo-16 packet counter.
    pub fn packet_count(mut self, count: u8) -> Self {
        self.packet_count = count;
        self
    }

    /// Append raw payload words.
    pub fn payload_words(mut self, words: &[u32]) -> Self {
        self.payload.extend_from_slice(words);
        self
    }

    /// Append packed I/Q samples.
    pub fn iq_samples(mut self, samples: &[(i16, i16)]) -> Self {
        self.payload
            .extend(samples.iter().map(|&(i, q)| iq_word(i, q)));
        self
    }

    /// Add a trailer word and set the T bit.
    pub fn trailer(mut self, word: u32) -> Self {
        self.trailer = Some(word);
        self
    }

    /// Override the size field instead of computing it.
    pub fn declared_size(mut self, words: u16) -> Self {
        self.declared_size = Some(words);
        self
    }

    /// The packet as 32-bit words.
    pub fn words(&self) -> Vec<u32> {
        let mut body = Vec::new();
        if self.packet_type.has_stream_id() {
            body.push(self.stream_id);
        }
        if let Some(cid) = self.class_id {
            body.push(cid.organization_id & 0x00FF_FFFF);
            body.push(((cid.info_class_code as u32) << 16) | cid.packet_class_code as u32);
        }
        if let Some((_, ts)) = self.integer_timestamp {
            body.push(ts);
        }
        if let Some((_, ts)) = self.fractional_timestamp {
            body.push((ts >> 32) as u32);
            body.push(ts as u32);
        }
        body.extend_from_slice(&self.payload);
        if let Some(t) = self.trailer {
            body.push(t);
        }

        let size = self
            .declared_size
            .unwrap_or((body.len() + 1) as u16);
        let header = VrtHeader::default()
            .with_packet_type(self.packet_type)
            .with_class_id(self.class_id.is_some())
            .with_trailer(self.trailer.is_some())
            .with_timestamp_mode(self.timestamp_mode)
            .with_integer_timestamp_type(
                self.integer_timestamp
                    .map_or(IntegerTimestampType::None, |(k, _)| k),
            )
            .with_fractional_timestamp_type(
                self.fractional_timestamp
                    .map_or(FractionalTimestampType::None, |(k, _)| k),
            )
            .with_packet_count(self.packet_count)
            .with_packet_size(size);

        let mut words = Vec::with_capacity(body.len() + 1);
        words.push(header.word());
        words.extend(body);
        words
    }

    /// Encode in `order`.
    pub fn encode(&self, order: ByteOrder) -> Vec<u8> {
        to_bytes(&self.words(), order)
    }

    /// Encode big-endian.
    pub fn build(&self) -> Vec<u8> {
        self.encode(ByteOrder::Big)
    }
}

/// Fluent encoder for a VRL frame.
#[derive(Debug, Clone)]
pub struct VrlFrameBuilder {
    alignment_word: u32,
    frame_count: u16,
    body: Vec<u32>,
    trailer: u32,
    declared_size: Option<u32>,
}

impl VrlFrameBuilder {
    /// Start an empty "VRLP" frame with count 0 and a "VEND" trailer.
    pub fn new() -> Self {
        VrlFrameBuilder {
            alignment_word: ALIGNMENT_VRLP,
            frame_count: 0,
            body: Vec::new(),
            trailer: TRAILER_VEND,
            declared_size: None,
        }
    }

    /// Use a different alignment word.
    pub fn alignment_word(mut self, word: u32) -> Self {
        self.alignment_word = word;
        self
    }

    /// Set the 12-bit frame counter.
    pub fn frame_count(mut self, count: u16) -> Self {
        self.frame_count = count;
        self
    }

    /// Append an encoded packet.
    pub fn packet(mut self, packet: VrtPacketBuilder) -> Self {
        self.body.extend(packet.words());
        self
    }

    /// Append raw words between the packets.
    pub fn raw_words(mut self, words: &[u32]) -> Self {
        self.body.extend_from_slice(words);
        self
    }

    /// Set the trailer word.
    pub fn trailer(mut self, word: u32) -> Self {
        self.trailer = word;
        self
    }

    /// Override the frame size field instead of computing it.
    pub fn declared_size(mut self, words: u32) -> Self {
        self.declared_size = Some(words);
        self
    }

    /// The frame as 32-bit words.
    pub fn words(&self) -> Vec<u32> {
        let size = self
            .declared_size
            .unwrap_or((self.body.len() + 3) as u32);
        let mut words = Vec::with_capacity(self.body.len() + 3);
        words.push(self.alignment_word);
        words.push(VrlFrameInfo::new(self.frame_count, size).word());
        words.extend_from_slice(&self.body);
        words.push(self.trailer);
        words
    }

    /// Encode in `order`.
    pub fn encode(&self, order: ByteOrder) -> Vec<u8> {
        to_bytes(&self.words(), order)
    }

    /// Encode big-endian.
    pub fn build(&self) -> Vec<u8> {
        self.encode(ByteOrder::Big)
    }
}

impl Default for VrlFrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
