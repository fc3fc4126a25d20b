//! Little-endian sample codec.
//!
//! Every sample is stored little-endian. Integer samples are normalized by
//! the maximum value of their width; float samples are passed through, with
//! half floats promoted to `f32` and doubles narrowed.

use crate::meta::SampleType;

/// Read one sample from the start of `bytes` and normalize it.
///
/// `bytes` must hold at least `ty.bytes()` bytes.
pub fn read_sample(ty: SampleType, bytes: &[u8]) -> f32 {
    match ty {
        SampleType::UInt(8) => bytes[0] as f32 / u8::MAX as f32,
        SampleType::UInt(16) => u16::from_le_bytes(le(bytes)) as f32 / u16::MAX as f32,
        SampleType::UInt(32) => (u32::from_le_bytes(le(bytes)) as f64 / u32::MAX as f64) as f32,
        SampleType::UInt(64) => (u64::from_le_bytes(le(bytes)) as f64 / u64::MAX as f64) as f32,
        SampleType::Float(16) => f16_to_f32(u16::from_le_bytes(le(bytes))),
        SampleType::Float(32) => f32::from_le_bytes(le(bytes)),
        SampleType::Float(64) => f64::from_le_bytes(le(bytes)) as f32,
        _ => 0.0,
    }
}

/// Write `value` into the start of `bytes` in the native representation.
///
/// Integer kinds clamp to `[0, 1]` before scaling and round to nearest.
pub fn write_sample(ty: SampleType, bytes: &mut [u8], value: f32) {
    match ty {
        SampleType::UInt(8) => bytes[0] = quantize(value, u8::MAX as f64) as u8,
        SampleType::UInt(16) => {
            put(bytes, &(quantize(value, u16::MAX as f64) as u16).to_le_bytes())
        }
        SampleType::UInt(32) => {
            put(bytes, &(quantize(value, u32::MAX as f64) as u32).to_le_bytes())
        }
        SampleType::UInt(64) => {
            // `as` saturates, so 1.0 * u64::MAX rounds up to exactly u64::MAX.
            put(bytes, &(quantize(value, u64::MAX as f64) as u64).to_le_bytes())
        }
        SampleType::Float(16) => put(bytes, &f32_to_f16(value).to_le_bytes()),
        SampleType::Float(32) => put(bytes, &value.to_le_bytes()),
        SampleType::Float(64) => put(bytes, &(value as f64).to_le_bytes()),
        _ => {}
    }
}

fn quantize(value: f32, max: f64) -> f64 {
    let v = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) as f64 };
    (v * max).round()
}

fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

fn put(dst: &mut [u8], src: &[u8]) {
    dst[..src.len()].copy_from_slice(src);
}

/// Decode an IEEE 754 binary16 value.
pub fn f16_to_f32(half: u16) -> f32 {
    let sign = ((half as u32) & 0x8000) << 16;
    let exp = ((half >> 10) & 0x1f) as u32;
    let man = (half & 0x3ff) as u32;

    let bits = match (exp, man) {
        (0, 0) => sign,
        (0, _) => {
            // Subnormal: man * 2^-24.
            let v = man as f32 * f32::from_bits(0x3380_0000);
            return if sign != 0 { -v } else { v };
        }
        (0x1f, 0) => sign | 0x7f80_0000,
        (0x1f, _) => sign | 0x7fc0_0000 | (man << 13),
        _ => sign | ((exp + 112) << 23) | (man << 13),
    };
    f32::from_bits(bits)
}

/// Encode an `f32` as IEEE 754 binary16, rounding to nearest even.
pub fn f32_to_f16(value: f32) -> u16 {
    let x = value.to_bits();
    let sign = ((x >> 16) & 0x8000) as u16;
    let exp = ((x >> 23) & 0xff) as i32;
    let man = x & 0x7f_ffff;

    if exp == 0xff {
        let nan = if man != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }

    let half_exp = exp - 127 + 15;
    if half_exp >= 0x1f {
        return sign | 0x7c00;
    }

    if half_exp <= 0 {
        let shift = 14 - half_exp;
        if shift > 24 {
            return sign;
        }
        let man = man | 0x80_0000;
        let mut half_man = man >> shift;
        let round_bit = 1u32 << (shift - 1);
        if man & round_bit != 0 && man & (3 * round_bit - 1) != 0 {
            half_man += 1;
        }
        return sign | half_man as u16;
    }

    let round_bit = 0x1000u32;
    let mut out = ((half_exp as u32) << 10) | (man >> 13);
    if man & round_bit != 0 && man & (3 * round_bit - 1) != 0 {
        // A carry into the exponent is the correct result, up to infinity.
        out += 1;
    }
    sign | out as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn half_known_values() {
        assert_eq!(f32_to_f16(0.0), 0x0000);
        assert_eq!(f32_to_f16(-0.0), 0x8000);
        assert_eq!(f32_to_f16(1.0), 0x3c00);
        assert_eq!(f32_to_f16(0.5), 0x3800);
        assert_eq!(f32_to_f16(-2.0), 0xc000);
        assert_eq!(f32_to_f16(65504.0), 0x7bff);
        assert_eq!(f32_to_f16(1.0e6), 0x7c00);
        assert_eq!(f32_to_f16(f32::INFINITY), 0x7c00);
        assert!(f16_to_f32(f32_to_f16(f32::NAN)).is_nan());

        assert_eq!(f16_to_f32(0x3c00), 1.0);
        assert_eq!(f16_to_f32(0x3555), 0.333_251_95);
        assert_eq!(f16_to_f32(0x0001), 5.960_464_5e-8);
        assert_eq!(f16_to_f32(0x7c00), f32::INFINITY);
    }

    #[test]
    fn half_rounds_to_nearest_even() {
        // 1 + 2^-11 is exactly halfway between 1.0 and the next half.
        assert_eq!(f32_to_f16(1.0 + 2f32.powi(-11)), 0x3c00);
        // 1 + 3 * 2^-11 is halfway and rounds up to the even mantissa.
        assert_eq!(f32_to_f16(1.0 + 3.0 * 2f32.powi(-11)), 0x3c02);
    }

    #[test]
    fn integer_samples_clamp_and_round() {
        let mut buf = [0u8; 8];
        write_sample(SampleType::U8, &mut buf, 1.5);
        assert_eq!(buf[0], 255);
        write_sample(SampleType::U8, &mut buf, -0.2);
        assert_eq!(buf[0], 0);
        write_sample(SampleType::U8, &mut buf, 0.5);
        assert_eq!(buf[0], 128);

        write_sample(SampleType::U16, &mut buf, 1.0);
        assert_eq!(&buf[..2], &[0xff, 0xff]);
        assert_eq!(read_sample(SampleType::U16, &buf), 1.0);

        write_sample(SampleType::U64, &mut buf, 1.0);
        assert_eq!(u64::from_le_bytes(buf), u64::MAX);
        assert_eq!(read_sample(SampleType::U64, &buf), 1.0);
    }

    #[test]
    fn samples_are_little_endian() {
        let mut buf = [0u8; 4];
        write_sample(SampleType::F32, &mut buf, 1.0);
        assert_eq!(buf, 1.0f32.to_le_bytes());
        write_sample(SampleType::U16, &mut buf, 1.0 / 65535.0);
        assert_eq!(&buf[..2], &[0x01, 0x00]);
    }

    proptest! {
        #[test]
        fn float_samples_are_exact(v in -1.0e6f32..1.0e6) {
            let mut buf = [0u8; 8];
            write_sample(SampleType::F32, &mut buf, v);
            prop_assert_eq!(read_sample(SampleType::F32, &buf), v);
            write_sample(SampleType::F64, &mut buf, v);
            prop_assert_eq!(read_sample(SampleType::F64, &buf), v);
        }

        #[test]
        fn integer_samples_within_quantization(v in 0.0f32..=1.0) {
            let mut buf = [0u8; 8];
            for (ty, step) in [(SampleType::U8, 1.0 / 255.0), (SampleType::U16, 1.0 / 65535.0)] {
                write_sample(ty, &mut buf, v);
                prop_assert!((read_sample(ty, &buf) - v).abs() <= step);
            }
        }

        #[test]
        fn half_roundtrip_of_representable_values(bits in 0u16..0x7c00) {
            prop_assert_eq!(f32_to_f16(f16_to_f32(bits)), bits);
        }
    }
}
