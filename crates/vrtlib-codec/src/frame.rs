//! VRL frame decoding.
//!
//! A VRL frame wraps a run of VRT packets:
//!
//! ```text
//! word 0        alignment word ("VRLP" or "VS49")
//! word 1        frame_count (12 bits) | frame_size (20 bits)
//! word 2..N-1   VRT packets, back to back
//! word N-1      trailer ("VEND" or a CRC32)
//! ```
//!
//! Input windows may begin with padding or the tail of a previous frame, so
//! [`parse_frame`] scans forward one word at a time for the alignment word.

use std::fmt;

use vrtlib_core::{ByteOrder, Error, Result};

use crate::header::VrtHeader;
use crate::packet::{parse_packet_with, VrtPacket, WORD_SIZE};

/// Alignment word "VRLP".
pub const ALIGNMENT_VRLP: u32 = 0x5652_4C50;

/// Vendor alignment word "VS49".
pub const ALIGNMENT_VS49: u32 = 0x5653_3439;

/// End-of-frame trailer word "VEND".
pub const TRAILER_VEND: u32 = 0x5645_4E44;

/// Words of framing around the packets: alignment, info and trailer.
pub const FRAME_OVERHEAD_WORDS: usize = 3;

/// The scan gives up once fewer than this many words remain.
pub const MIN_SCAN_WORDS: usize = 5;

/// Modulus of the 12-bit frame counter.
pub const FRAME_COUNT_MODULUS: u16 = 4096;

const FRAME_SIZE_MASK: u32 = 0x000F_FFFF;
const FRAME_COUNT_SHIFT: u32 = 20;

/// Returns `true` for either accepted alignment word.
pub fn is_alignment_word(word: u32) -> bool {
    word == ALIGNMENT_VRLP || word == ALIGNMENT_VS49
}

/// The frame information word (word 1 of a frame).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VrlFrameInfo(u32);

impl VrlFrameInfo {
    /// Wrap a decoded information word.
    pub fn from_word(word: u32) -> Self {
        VrlFrameInfo(word)
    }

    /// Build an information word from its fields.
    pub fn new(frame_count: u16, frame_size: u32) -> Self {
        VrlFrameInfo(
            ((frame_count as u32) << FRAME_COUNT_SHIFT) | (frame_size & FRAME_SIZE_MASK),
        )
    }

    /// The raw word.
    pub fn word(&self) -> u32 {
        self.0
    }

    /// Frame length in words, alignment and trailer included.
    pub fn frame_size(&self) -> u32 {
        self.0 & FRAME_SIZE_MASK
    }

    /// The modulo-4096 frame counter.
    pub fn frame_count(&self) -> u16 {
        (self.0 >> FRAME_COUNT_SHIFT) as u16
    }
}

impl fmt::Debug for VrlFrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VrlFrameInfo")
            .field("frame_count", &self.frame_count())
            .field("frame_size", &self.frame_size())
            .finish()
    }
}

/// Interpretation of the last word of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTrailer {
    /// The "VEND" marker.
    End,
    /// Any other value is taken to be a CRC32. It is not verified.
    Crc(u32),
}

/// A decoded VRL frame and the packets inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrlFrame<'a> {
    alignment_word: u32,
    info: VrlFrameInfo,
    trailer: u32,
    packets: Vec<VrtPacket<'a>>,
    bytes: &'a [u8],
}

impl<'a> VrlFrame<'a> {
    /// The alignment word the frame started with.
    pub fn alignment_word(&self) -> u32 {
        self.alignment_word
    }

    /// The frame information word.
    pub fn info(&self) -> VrlFrameInfo {
        self.info
    }

    /// The modulo-4096 frame counter.
    pub fn frame_count(&self) -> u16 {
        self.info.frame_count()
    }

    /// Frame length in words.
    pub fn frame_size(&self) -> usize {
        self.info.frame_size() as usize
    }

    /// Frame length in bytes.
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// The raw trailer word.
    pub fn trailer(&self) -> u32 {
        self.trailer
    }

    /// Classify the trailer word.
    pub fn trailer_kind(&self) -> FrameTrailer {
        if self.trailer == TRAILER_VEND {
            FrameTrailer::End
        } else {
            FrameTrailer::Crc(self.trailer)
        }
    }

    /// All packets, in wire order.
    pub fn packets(&self) -> &[VrtPacket<'a>] {
        &self.packets
    }

    /// Number of packets in the frame.
    pub fn num_packets(&self) -> usize {
        self.packets.len()
    }

    /// The packet at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `index` is out of range.
    pub fn packet(&self, index: usize) -> Result<&VrtPacket<'a>> {
        self.packets.get(index).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "packet index {index} out of range for frame with {} packets",
                self.packets.len()
            ))
        })
    }

    /// The raw bytes of the whole frame.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl fmt::Display for VrlFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let align = match self.alignment_word {
            ALIGNMENT_VS49 => "VS49",
            _ => "VRLP",
        };
        write!(
            f,
            "{align} frame count={} size={}w packets={} trailer=",
            self.frame_count(),
            self.frame_size(),
            self.num_packets()
        )?;
        match self.trailer_kind() {
            FrameTrailer::End => write!(f, "VEND"),
            FrameTrailer::Crc(crc) => write!(f, "crc:0x{crc:08X}"),
        }
    }
}

/// Parse the first big-endian VRL frame in `data`.
///
/// Returns the frame and the number of words skipped before its alignment
/// word.
///
/// # Errors
///
/// - [`Error::InsufficientData`] when the window is shorter than the scan
///   minimum, or the frame (or a packet inside it) runs past the end of
///   `data`. `needed` and `available` are relative to the start of `data`.
/// - [`Error::NoAlignmentWord`] when no alignment word is found; `scanned`
///   is the byte offset of the first word that was not examined.
/// - [`Error::Malformed`] / [`Error::UnsupportedPacketType`] for a frame or
///   packet that can never decode.
pub fn parse_frame(data: &[u8]) -> Result<(VrlFrame<'_>, usize)> {
    parse_frame_with(data, ByteOrder::Big)
}

/// Parse the first VRL frame in `data` with words encoded in `order`.
///
/// See [`parse_frame`] for the error contract.
pub fn parse_frame_with(data: &[u8], order: ByteOrder) -> Result<(VrlFrame<'_>, usize)> {
    let min_bytes = MIN_SCAN_WORDS * WORD_SIZE;
    if data.len() < min_bytes {
        return Err(Error::InsufficientData {
            needed: min_bytes,
            available: data.len(),
        });
    }

    let mut start = 0;
    loop {
        if data.len() - start < min_bytes {
            return Err(Error::NoAlignmentWord { scanned: start });
        }
        if is_alignment_word(order.read_u32(&data[start..])) {
            break;
        }
        start += WORD_SIZE;
    }

    let frame_data = &data[start..];
    let alignment_word = order.read_u32(frame_data);
    let info = VrlFrameInfo::from_word(order.read_u32(&frame_data[WORD_SIZE..]));
    let size_words = info.frame_size() as usize;

    if size_words < FRAME_OVERHEAD_WORDS {
        return Err(Error::Malformed(format!(
            "VRL frame declares {size_words} words, minimum is {FRAME_OVERHEAD_WORDS}"
        )));
    }

    let size_bytes = size_words * WORD_SIZE;
    if size_bytes > frame_data.len() {
        return Err(Error::InsufficientData {
            needed: start + size_bytes,
            available: data.len(),
        });
    }

    let bytes = &frame_data[..size_bytes];
    let trailer_at = (size_words - 1) * WORD_SIZE;
    let trailer = order.read_u32(&bytes[trailer_at..]);

    let mut packets = Vec::new();
    let mut offset = 2;
    while size_words - offset >= 2 {
        let region = &bytes[offset * WORD_SIZE..trailer_at];
        if VrtHeader::from_word(order.read_u32(region)).packet_size() == 0 {
            break;
        }
        let packet = parse_packet_with(region, order).map_err(|e| match e {
            Error::InsufficientData { needed, .. } => Error::InsufficientData {
                needed: start + offset * WORD_SIZE + needed,
                available: data.len(),
            },
            other => other,
        })?;
        offset += packet.packet_size();
        packets.push(packet);
    }

    tracing::trace!(
        skipped_words = start / WORD_SIZE,
        frame_count = info.frame_count(),
        frame_size = size_words,
        packets = packets.len(),
        "parsed VRL frame"
    );

    Ok((
        VrlFrame {
            alignment_word,
            info,
            trailer,
            packets,
            bytes,
        },
        start / WORD_SIZE,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::PacketType;
    use proptest::prelude::*;

    fn if_data_packet(stream_id: u32, count: u8, payload: &[u32]) -> Vec<u32> {
        let header = VrtHeader::default()
            .with_packet_type(PacketType::IfData)
            .with_packet_count(count)
            .with_packet_size(payload.len() as u16 + 2);
        let mut words = vec![header.word(), stream_id];
        words.extend_from_slice(payload);
        words
    }

    fn frame_words(count: u16, packets: &[Vec<u32>], trailer: u32) -> Vec<u32> {
        let body: usize = packets.iter().map(Vec::len).sum();
        let size = (body + FRAME_OVERHEAD_WORDS) as u32;
        let mut words = vec![ALIGNMENT_VRLP, VrlFrameInfo::new(count, size).word()];
        for p in packets {
            words.extend_from_slice(p);
        }
        words.push(trailer);
        words
    }

    fn to_bytes(words: &[u32], order: ByteOrder) -> Vec<u8> {
        words.iter().flat_map(|w| order.write_u32(*w)).collect()
    }

    // -- frame info word --

    #[test]
    fn frame_info_fields() {
        let info = VrlFrameInfo::new(0xABC, 0x12345);
        assert_eq!(info.word(), 0xABC1_2345);
        assert_eq!(info.frame_count(), 0xABC);
        assert_eq!(info.frame_size(), 0x12345);
    }

    #[test]
    fn alignment_words() {
        assert!(is_alignment_word(ALIGNMENT_VRLP));
        assert!(is_alignment_word(ALIGNMENT_VS49));
        assert!(!is_alignment_word(TRAILER_VEND));
    }

    // -- parse_frame: valid frames --

    #[test]
    fn parse_single_packet_frame() {
        let pkt = if_data_packet(0, 3, &[0x4000_C000; 4]);
        let words = frame_words(17, &[pkt], TRAILER_VEND);
        let bytes = to_bytes(&words, ByteOrder::Big);

        let (frame, skipped) = parse_frame(&bytes).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(frame.alignment_word(), ALIGNMENT_VRLP);
        assert_eq!(frame.frame_count(), 17);
        assert_eq!(frame.frame_size(), 9);
        assert_eq!(frame.size_bytes(), 36);
        assert_eq!(frame.trailer_kind(), FrameTrailer::End);
        assert_eq!(frame.num_packets(), 1);

        let p = frame.packet(0).unwrap();
        assert_eq!(p.packet_count(), 3);
        assert_eq!(p.stream_id().unwrap(), 0);
        assert_eq!(p.payload_size(), 16);
    }

    #[test]
    fn parse_multiple_packets() {
        let packets = vec![
            if_data_packet(0, 0, &[1, 2]),
            if_data_packet(1, 0, &[3]),
            if_data_packet(2, 0, &[]),
        ];
        let bytes = to_bytes(&frame_words(0, &packets, TRAILER_VEND), ByteOrder::Big);
        let (frame, _) = parse_frame(&bytes).unwrap();
        assert_eq!(frame.num_packets(), 3);
        let ids: Vec<u32> = frame.packets().iter().map(|p| p.stream_id().unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn skip_leading_garbage() {
        let pkt = if_data_packet(5, 0, &[7]);
        let mut words = vec![0xDEAD_BEEF, 0x0000_0000, TRAILER_VEND];
        words.extend(frame_words(1, &[pkt], TRAILER_VEND));
        let bytes = to_bytes(&words, ByteOrder::Big);

        let (frame, skipped) = parse_frame(&bytes).unwrap();
        assert_eq!(skipped, 3);
        assert_eq!(frame.as_bytes(), &bytes[12..]);
    }

    #[test]
    fn vs49_alignment_and_crc_trailer() {
        let mut words = frame_words(0, &[if_data_packet(0, 0, &[0])], 0x1234_5678);
        words[0] = ALIGNMENT_VS49;
        let bytes = to_bytes(&words, ByteOrder::Big);
        let (frame, _) = parse_frame(&bytes).unwrap();
        assert_eq!(frame.alignment_word(), ALIGNMENT_VS49);
        assert_eq!(frame.trailer_kind(), FrameTrailer::Crc(0x1234_5678));
        assert!(frame.to_string().starts_with("VS49 frame"));
    }

    #[test]
    fn little_endian_frame() {
        let words = frame_words(2, &[if_data_packet(9, 1, &[0xAAAA_5555])], TRAILER_VEND);
        let bytes = to_bytes(&words, ByteOrder::Little);
        assert!(parse_frame(&bytes).is_err());

        let (frame, _) = parse_frame_with(&bytes, ByteOrder::Little).unwrap();
        assert_eq!(frame.frame_count(), 2);
        let p = frame.packet(0).unwrap();
        assert_eq!(p.stream_id().unwrap(), 9);
        assert_eq!(p.payload_words().next(), Some(0xAAAA_5555));
    }

    #[test]
    fn zero_size_packet_stops_walk() {
        let mut packets = vec![if_data_packet(0, 0, &[1])];
        packets.push(vec![0x1000_0000, 0, 0]); // size 0 then filler
        let bytes = to_bytes(&frame_words(0, &packets, TRAILER_VEND), ByteOrder::Big);
        let (frame, _) = parse_frame(&bytes).unwrap();
        assert_eq!(frame.num_packets(), 1);
    }

    #[test]
    fn empty_frame_has_no_packets() {
        let mut words = frame_words(0, &[], TRAILER_VEND);
        words.extend([0, 0]); // pad the window to the scan minimum
        let bytes = to_bytes(&words, ByteOrder::Big);
        let (frame, _) = parse_frame(&bytes).unwrap();
        assert_eq!(frame.frame_size(), 3);
        assert_eq!(frame.num_packets(), 0);
    }

    #[test]
    fn trailing_bytes_after_frame_ignored() {
        let mut words = frame_words(0, &[if_data_packet(0, 0, &[1])], TRAILER_VEND);
        words.extend([0xFFFF_FFFF; 8]);
        let bytes = to_bytes(&words, ByteOrder::Big);
        let (frame, _) = parse_frame(&bytes).unwrap();
        assert_eq!(frame.size_bytes(), 24);
    }

    // -- parse_frame: error cases --

    #[test]
    fn short_window_is_recoverable() {
        let err = parse_frame(&[0; 16]).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { needed: 20, available: 16 }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn no_alignment_word_reports_scan_end() {
        let err = parse_frame(&[0; 40]).unwrap_err();
        assert!(matches!(err, Error::NoAlignmentWord { scanned: 24 }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn truncated_frame_is_recoverable() {
        let words = frame_words(0, &[if_data_packet(0, 0, &[1, 2, 3, 4])], TRAILER_VEND);
        let bytes = to_bytes(&words, ByteOrder::Big);
        let err = parse_frame(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { needed: 36, available: 32 }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn undersized_frame_is_malformed() {
        let words = [ALIGNMENT_VRLP, VrlFrameInfo::new(0, 2).word(), 0, 0, 0];
        let bytes = to_bytes(&words, ByteOrder::Big);
        assert!(matches!(parse_frame(&bytes), Err(Error::Malformed(_))));
    }

    #[test]
    fn packet_overrunning_frame_is_not_recoverable() {
        // Packet claims 6 words but the frame only leaves room for 3.
        let mut pkt = if_data_packet(0, 0, &[1]);
        pkt[0] = VrtHeader::from_word(pkt[0]).with_packet_size(6).word();
        let mut words = frame_words(0, &[pkt], TRAILER_VEND);
        words.extend([0; 8]);
        let bytes = to_bytes(&words, ByteOrder::Big);

        let err = parse_frame(&bytes).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { needed: 32, .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn unsupported_packet_type_propagates() {
        let mut pkt = if_data_packet(0, 0, &[1]);
        pkt[0] |= 0x7000_0000;
        let bytes = to_bytes(&frame_words(0, &[pkt], TRAILER_VEND), ByteOrder::Big);
        assert!(matches!(
            parse_frame(&bytes),
            Err(Error::UnsupportedPacketType(0x7))
        ));
    }

    #[test]
    fn packet_index_out_of_range() {
        let bytes = to_bytes(
            &frame_words(0, &[if_data_packet(0, 0, &[1])], TRAILER_VEND),
            ByteOrder::Big,
        );
        let (frame, _) = parse_frame(&bytes).unwrap();
        assert!(frame.packet(0).is_ok());
        assert!(matches!(frame.packet(1), Err(Error::InvalidParameter(_))));
    }

    // -- properties --

    proptest! {
        #[test]
        fn frame_matches_reference_encoding(
            padding in 0usize..8,
            count in 0u16..FRAME_COUNT_MODULUS,
            payloads in proptest::collection::vec(
                proptest::collection::vec(any::<u32>(), 0..16), 1..5),
        ) {
            let packets: Vec<Vec<u32>> = payloads
                .iter()
                .enumerate()
                .map(|(i, p)| if_data_packet(i as u32, i as u8, p))
                .collect();
            let mut words = vec![0u32; padding];
            words.extend(frame_words(count, &packets, TRAILER_VEND));
            words.extend([0u32; 4]);
            let bytes = to_bytes(&words, ByteOrder::Big);

            let (frame, skipped) = parse_frame(&bytes).unwrap();
            prop_assert_eq!(skipped, padding);
            prop_assert_eq!(frame.frame_count(), count);
            prop_assert_eq!(frame.num_packets(), payloads.len());
            for (pkt, expected) in frame.packets().iter().zip(&payloads) {
                prop_assert_eq!(&pkt.payload_words().collect::<Vec<_>>(), expected);
            }
        }

        #[test]
        fn frame_parsing_is_idempotent(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let first = parse_frame(&bytes).map_err(|e| e.to_string());
            let second = parse_frame(&bytes).map_err(|e| e.to_string());
            prop_assert_eq!(first, second);
        }
    }
}
