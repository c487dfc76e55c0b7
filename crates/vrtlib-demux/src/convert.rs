//! Fixed-point to float sample conversion.
//!
//! Each payload word packs one I/Q pair: the high 16 bits are I, the low 16
//! bits are Q, both two's complement. Values are scaled into `[-1.0, 1.0)`.

use vrtlib_core::{ByteOrder, ComplexSample};

/// Divisor that maps a signed 16-bit value into `[-1.0, 1.0)`.
pub const SAMPLE_SCALE: f32 = 32768.0;

/// Bytes occupied by one packed I/Q pair.
pub const BYTES_PER_SAMPLE: usize = 4;

/// Number of complex samples in a payload of `bytes` length.
pub fn sample_count(bytes: usize) -> usize {
    bytes / BYTES_PER_SAMPLE
}

/// Convert one packed I/Q word.
#[inline]
pub fn convert_word(word: u32) -> ComplexSample {
    let i = (word >> 16) as u16 as i16;
    let q = word as u16 as i16;
    ComplexSample::new(i as f32 / SAMPLE_SCALE, q as f32 / SAMPLE_SCALE)
}

/// Convert packed samples from `payload` into `dst`.
///
/// Converts as many whole samples as both slices allow and returns that
/// count. A trailing partial word in `payload` is ignored.
pub fn convert_samples(payload: &[u8], order: ByteOrder, dst: &mut [ComplexSample]) -> usize {
    let mut converted = 0;
    for (out, word) in dst.iter_mut().zip(payload.chunks_exact(BYTES_PER_SAMPLE)) {
        *out = convert_word(order.read_u32(word));
        converted += 1;
    }
    converted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_scale_pair() {
        // (16384, -16384)
        let s = convert_word(0x4000_C000);
        assert_eq!(s.re, 0.5);
        assert_eq!(s.im, -0.5);
    }

    #[test]
    fn extremes() {
        let s = convert_word(0x8000_7FFF);
        assert_eq!(s.re, -1.0);
        assert!((s.im - 32767.0 / 32768.0).abs() < f32::EPSILON);
        assert_eq!(convert_word(0), ComplexSample::new(0.0, 0.0));
    }

    #[test]
    fn converts_in_byte_order() {
        let big = [0x40, 0x00, 0xC0, 0x00];
        let little = [0x00, 0xC0, 0x00, 0x40];
        let mut a = [ComplexSample::default(); 1];
        let mut b = [ComplexSample::default(); 1];
        assert_eq!(convert_samples(&big, ByteOrder::Big, &mut a), 1);
        assert_eq!(convert_samples(&little, ByteOrder::Little, &mut b), 1);
        assert_eq!(a, b);
        assert_eq!(a[0], ComplexSample::new(0.5, -0.5));
    }

    #[test]
    fn stops_at_shorter_slice() {
        let payload = [0u8; 16];
        let mut dst = [ComplexSample::new(9.0, 9.0); 2];
        assert_eq!(convert_samples(&payload, ByteOrder::Big, &mut dst), 2);

        let mut dst = [ComplexSample::default(); 8];
        assert_eq!(convert_samples(&payload[..10], ByteOrder::Big, &mut dst), 2);
    }

    #[test]
    fn sample_count_rounds_down() {
        assert_eq!(sample_count(16), 4);
        assert_eq!(sample_count(15), 3);
        assert_eq!(sample_count(0), 0);
    }
}
