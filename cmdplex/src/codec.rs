//! Text codec for exact-width integers and floats.
//!
//! Parsing is overflow-exact: every width/signedness combination accepts its
//! full two's-complement range (including the most-negative value, whose
//! magnitude has no positive counterpart) and rejects the first value past
//! the boundary. Hex is nibble-exact, capped at two nibbles per byte, and
//! bit-pattern compatible with the little-endian binary wire representation.
//!
//! Formatting for floats uses `core::fmt`, which already emits the shortest
//! text that round-trips; explicit precision requests go through the standard
//! fixed/scientific paths.

use crate::error::Error;
use core::fmt::{self, Write as _};

/// Fixed-width integer usable with the text codec and the binary marshaller.
///
/// Implementations are macro-generated for the eight 1/2/4/8-byte types. The
/// magnitude bounds encode the two's-complement boundary table: `MAX_MAG` is
/// the largest magnitude valid after a `+`, `MIN_MAG` after a `-`.
pub trait Int: Copy {
    /// Width in bytes.
    const WIDTH: usize;
    const SIGNED: bool;
    const MAX_MAG: u64;
    const MIN_MAG: u64;
    /// Widest possible decimal rendering, sign included.
    const DEC_WIDTH: usize;

    fn from_parts(neg: bool, mag: u64) -> Self;
    fn from_bits(bits: u64) -> Self;
    /// Raw two's-complement bit pattern, zero-extended to 64 bits.
    fn to_bits(self) -> u64;
    /// Split into `(negative, magnitude)`.
    fn split(self) -> (bool, u64);
}

macro_rules! int_signed {
    ($t:ty, $ut:ty, $dec:expr) => {
        impl Int for $t {
            const WIDTH: usize = core::mem::size_of::<$t>();
            const SIGNED: bool = true;
            const MAX_MAG: u64 = <$t>::MAX as u64;
            const MIN_MAG: u64 = (<$t>::MAX as u64) + 1;
            const DEC_WIDTH: usize = $dec;

            fn from_parts(neg: bool, mag: u64) -> Self {
                if neg {
                    (mag as $ut).wrapping_neg() as $t
                } else {
                    mag as $t
                }
            }

            fn from_bits(bits: u64) -> Self {
                bits as $ut as $t
            }

            fn to_bits(self) -> u64 {
                (self as $ut) as u64
            }

            fn split(self) -> (bool, u64) {
                if self < 0 {
                    (true, ((self as $ut).wrapping_neg()) as u64)
                } else {
                    (false, self as u64)
                }
            }
        }
    };
}

macro_rules! int_unsigned {
    ($t:ty, $dec:expr) => {
        impl Int for $t {
            const WIDTH: usize = core::mem::size_of::<$t>();
            const SIGNED: bool = false;
            const MAX_MAG: u64 = <$t>::MAX as u64;
            const MIN_MAG: u64 = 0;
            const DEC_WIDTH: usize = $dec;

            fn from_parts(_neg: bool, mag: u64) -> Self {
                mag as $t
            }

            fn from_bits(bits: u64) -> Self {
                bits as $t
            }

            fn to_bits(self) -> u64 {
                self as u64
            }

            fn split(self) -> (bool, u64) {
                (false, self as u64)
            }
        }
    };
}

int_signed!(i8, u8, 4);
int_signed!(i16, u16, 6);
int_signed!(i32, u32, 11);
int_signed!(i64, u64, 20);
int_unsigned!(u8, 3);
int_unsigned!(u16, 5);
int_unsigned!(u32, 10);
int_unsigned!(u64, 20);

/// Parse a decimal integer, honoring a `0x`/`0X` prefix as hex.
pub fn parse_int<T: Int>(s: &str) -> Result<T, Error> {
    parse_int_inner(s, false)
}

/// Parse a hex integer with or without a `0x` prefix.
pub fn parse_int_hex<T: Int>(s: &str) -> Result<T, Error> {
    parse_int_inner(s, true)
}

fn parse_int_inner<T: Int>(s: &str, force_hex: bool) -> Result<T, Error> {
    let b = s.as_bytes();
    let mut neg = false;
    let rest = match b.first() {
        Some(b'+') => &b[1..],
        Some(b'-') if T::SIGNED => {
            neg = true;
            &b[1..]
        }
        _ => b,
    };
    let prefixed = rest.starts_with(b"0x") || rest.starts_with(b"0X");
    if force_hex || prefixed {
        // Hex is a raw bit pattern, a sign makes no sense here.
        if neg {
            return Err(Error::BadArg);
        }
        let digits = if prefixed { &rest[2..] } else { rest };
        return parse_hex_digits(digits);
    }
    if rest.is_empty() {
        return Err(Error::BadArg);
    }
    let limit = if neg { T::MIN_MAG } else { T::MAX_MAG };
    let mut mag: u64 = 0;
    for &c in rest {
        let d = match c {
            b'0'..=b'9' => (c - b'0') as u64,
            _ => return Err(Error::BadArg),
        };
        mag = mag
            .checked_mul(10)
            .and_then(|m| m.checked_add(d))
            .ok_or(Error::BadArg)?;
        if mag > limit {
            return Err(Error::BadArg);
        }
    }
    Ok(T::from_parts(neg, mag))
}

fn parse_hex_digits<T: Int>(d: &[u8]) -> Result<T, Error> {
    if d.is_empty() || d.len() > T::WIDTH * 2 {
        return Err(Error::BadArg);
    }
    let mut bits: u64 = 0;
    for &c in d {
        let nib = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            _ => return Err(Error::BadArg),
        };
        bits = (bits << 4) | nib as u64;
    }
    Ok(T::from_bits(bits))
}

/// Integer formatting options.
///
/// `width` requests a minimum field width, capped at the widest rendering the
/// type can produce (`2 * WIDTH` nibbles for hex, [`Int::DEC_WIDTH`] for
/// decimal). Zero padding goes between the sign and the digits; space padding
/// goes in front of the sign.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntFmt {
    pub hex: bool,
    pub upper: bool,
    pub width: u8,
    pub pad_zero: bool,
}

/// Format an integer into `buf`, returning the rendered text.
pub fn format_int<'a, T: Int>(v: T, fmt: &IntFmt, buf: &'a mut [u8]) -> Result<&'a str, Error> {
    let mut digits = [0u8; 20]; // u64::MAX is 20 digits
    let mut n = 0;
    let neg;
    if fmt.hex {
        neg = false;
        let mut bits = v.to_bits();
        loop {
            let nib = (bits & 0xF) as u8;
            digits[n] = match nib {
                0..=9 => b'0' + nib,
                _ if fmt.upper => b'A' + nib - 10,
                _ => b'a' + nib - 10,
            };
            n += 1;
            bits >>= 4;
            if bits == 0 {
                break;
            }
        }
    } else {
        let (is_neg, mut mag) = v.split();
        neg = is_neg;
        loop {
            digits[n] = b'0' + (mag % 10) as u8;
            n += 1;
            mag /= 10;
            if mag == 0 {
                break;
            }
        }
    }
    let cap = if fmt.hex { T::WIDTH * 2 } else { T::DEC_WIDTH };
    let width = (fmt.width as usize).min(cap);
    let body = n + usize::from(neg);
    let pad = width.saturating_sub(body);
    if body + pad > buf.len() {
        return Err(Error::SendOverflow);
    }
    let mut w = 0;
    if fmt.pad_zero {
        if neg {
            buf[w] = b'-';
            w += 1;
        }
        for _ in 0..pad {
            buf[w] = b'0';
            w += 1;
        }
    } else {
        for _ in 0..pad {
            buf[w] = b' ';
            w += 1;
        }
        if neg {
            buf[w] = b'-';
            w += 1;
        }
    }
    for i in (0..n).rev() {
        buf[w] = digits[i];
        w += 1;
    }
    core::str::from_utf8(&buf[..w]).map_err(|_| Error::BadArg)
}

/// Float formatting options.
///
/// A negative `precision` means "unspecified": the output is the shortest
/// text that round-trips, with no trailing zeros or dangling decimal point.
#[cfg(feature = "float")]
#[derive(Clone, Copy, Debug)]
pub struct FloatFmt {
    pub precision: i8,
    pub scientific: bool,
}

#[cfg(feature = "float")]
impl Default for FloatFmt {
    fn default() -> Self {
        Self {
            precision: -1,
            scientific: false,
        }
    }
}

#[cfg(feature = "float")]
macro_rules! float_codec {
    ($parse:ident, $format:ident, $t:ty) => {
        /// Parse a float; rejects trailing garbage and out-of-range values.
        pub fn $parse(s: &str) -> Result<$t, Error> {
            if s.is_empty() {
                return Err(Error::BadArg);
            }
            let v: $t = s.parse().map_err(|_| Error::BadArg)?;
            if v.is_finite() {
                Ok(v)
            } else {
                Err(Error::BadArg)
            }
        }

        /// Format a float into `buf`, returning the rendered text.
        pub fn $format<'a>(v: $t, fmt: &FloatFmt, buf: &'a mut [u8]) -> Result<&'a str, Error> {
            let mut w = SliceWriter { buf, len: 0 };
            let r = if fmt.precision < 0 {
                if fmt.scientific {
                    write!(w, "{:e}", v)
                } else {
                    write!(w, "{}", v)
                }
            } else {
                let p = fmt.precision as usize;
                if fmt.scientific {
                    write!(w, "{:.*e}", p, v)
                } else {
                    write!(w, "{:.*}", p, v)
                }
            };
            r.map_err(|_| Error::SendOverflow)?;
            let SliceWriter { buf, len } = w;
            core::str::from_utf8(&buf[..len]).map_err(|_| Error::BadArg)
        }
    };
}

#[cfg(feature = "float")]
float_codec!(parse_f32, format_f32, f32);
#[cfg(feature = "float")]
float_codec!(parse_f64, format_f64, f64);

/// `core::fmt::Write` adapter over a fixed byte slice.
pub(crate) struct SliceWriter<'a> {
    pub(crate) buf: &'a mut [u8],
    pub(crate) len: usize,
}

impl fmt::Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let b = s.as_bytes();
        if self.len + b.len() > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len..self.len + b.len()].copy_from_slice(b);
        self.len += b.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt_plain<T: Int>(v: T) -> heapless::String<24> {
        let mut buf = [0u8; 24];
        let s = format_int(v, &IntFmt::default(), &mut buf).unwrap();
        heapless::String::try_from(s).unwrap()
    }

    #[test]
    fn decimal_boundaries_signed() {
        assert_eq!(parse_int::<i8>("127"), Ok(127));
        assert_eq!(parse_int::<i8>("-128"), Ok(-128));
        assert_eq!(parse_int::<i8>("128"), Err(Error::BadArg));
        assert_eq!(parse_int::<i8>("-129"), Err(Error::BadArg));
        assert_eq!(parse_int::<i16>("-32768"), Ok(i16::MIN));
        assert_eq!(parse_int::<i32>("2147483647"), Ok(i32::MAX));
        assert_eq!(parse_int::<i32>("2147483648"), Err(Error::BadArg));
        assert_eq!(parse_int::<i64>("-9223372036854775808"), Ok(i64::MIN));
        assert_eq!(parse_int::<i64>("9223372036854775807"), Ok(i64::MAX));
        assert_eq!(parse_int::<i64>("9223372036854775808"), Err(Error::BadArg));
    }

    #[test]
    fn decimal_boundaries_unsigned() {
        assert_eq!(parse_int::<u8>("255"), Ok(255));
        assert_eq!(parse_int::<u8>("256"), Err(Error::BadArg));
        assert_eq!(parse_int::<u8>("-1"), Err(Error::BadArg));
        assert_eq!(parse_int::<u64>("18446744073709551615"), Ok(u64::MAX));
        assert_eq!(parse_int::<u64>("18446744073709551616"), Err(Error::BadArg));
        // One digit past the max digit count must fail.
        assert_eq!(parse_int::<u64>("184467440737095516150"), Err(Error::BadArg));
    }

    #[test]
    fn decimal_oddities() {
        assert_eq!(parse_int::<u16>("00042"), Ok(42));
        assert_eq!(parse_int::<i32>("+42"), Ok(42));
        assert_eq!(parse_int::<i32>(""), Err(Error::BadArg));
        assert_eq!(parse_int::<i32>("-"), Err(Error::BadArg));
        assert_eq!(parse_int::<i32>("12a"), Err(Error::BadArg));
        assert_eq!(parse_int::<i32>("1 2"), Err(Error::BadArg));
    }

    #[test]
    fn hex_parse() {
        assert_eq!(parse_int::<u8>("0xff"), Ok(255));
        assert_eq!(parse_int::<u8>("0XFF"), Ok(255));
        assert_eq!(parse_int::<i8>("0xff"), Ok(-1));
        assert_eq!(parse_int_hex::<u8>("ff"), Ok(255));
        assert_eq!(parse_int::<u32>("0xDEADBEEF"), Ok(0xDEAD_BEEF));
        // More nibbles than 2 * width is rejected, even leading zeros.
        assert_eq!(parse_int::<u8>("0x100"), Err(Error::BadArg));
        assert_eq!(parse_int::<u8>("0x0ff"), Err(Error::BadArg));
        assert_eq!(parse_int::<u8>("0x"), Err(Error::BadArg));
        assert_eq!(parse_int::<u8>("0xg1"), Err(Error::BadArg));
        assert_eq!(parse_int::<u8>("-0x01"), Err(Error::BadArg));
    }

    #[test]
    fn format_decimal() {
        assert_eq!(fmt_plain(0u8).as_str(), "0");
        assert_eq!(fmt_plain(-128i8).as_str(), "-128");
        assert_eq!(fmt_plain(i64::MIN).as_str(), "-9223372036854775808");
        assert_eq!(fmt_plain(u64::MAX).as_str(), "18446744073709551615");
    }

    #[test]
    fn format_padding() {
        let mut buf = [0u8; 24];
        let f = IntFmt {
            width: 4,
            pad_zero: true,
            ..IntFmt::default()
        };
        assert_eq!(format_int(5u16, &f, &mut buf).unwrap(), "0005");
        let f = IntFmt {
            width: 4,
            ..IntFmt::default()
        };
        assert_eq!(format_int(-5i16, &f, &mut buf).unwrap(), "  -5");
        let f = IntFmt {
            width: 4,
            pad_zero: true,
            ..IntFmt::default()
        };
        assert_eq!(format_int(-5i16, &f, &mut buf).unwrap(), "-005");
        // Field width is capped per width class: u8 caps at 3.
        let f = IntFmt {
            width: 10,
            ..IntFmt::default()
        };
        assert_eq!(format_int(7u8, &f, &mut buf).unwrap(), "  7");
    }

    #[test]
    fn format_hex() {
        let mut buf = [0u8; 24];
        let f = IntFmt {
            hex: true,
            ..IntFmt::default()
        };
        assert_eq!(format_int(255u8, &f, &mut buf).unwrap(), "ff");
        assert_eq!(format_int(-1i8, &f, &mut buf).unwrap(), "ff");
        assert_eq!(format_int(0u32, &f, &mut buf).unwrap(), "0");
        let f = IntFmt {
            hex: true,
            upper: true,
            width: 4,
            pad_zero: true,
            ..IntFmt::default()
        };
        assert_eq!(format_int(0xABu16, &f, &mut buf).unwrap(), "00AB");
        // Hex width caps at 2 nibbles per byte.
        let f = IntFmt {
            hex: true,
            width: 10,
            pad_zero: true,
            ..IntFmt::default()
        };
        assert_eq!(format_int(1u8, &f, &mut buf).unwrap(), "01");
    }

    #[test]
    fn int_round_trip() {
        for v in [i64::MIN, -1_000_000, -1, 0, 1, 65_535, i64::MAX] {
            let mut buf = [0u8; 24];
            let s = format_int(v, &IntFmt::default(), &mut buf).unwrap();
            assert_eq!(parse_int::<i64>(s), Ok(v));
        }
        for v in [0u64, 9, 10, 12_345, u64::MAX] {
            let mut buf = [0u8; 24];
            let f = IntFmt {
                hex: true,
                ..IntFmt::default()
            };
            let s = format_int(v, &f, &mut buf).unwrap();
            assert_eq!(parse_int_hex::<u64>(s), Ok(v));
        }
    }

    #[cfg(feature = "float")]
    #[test]
    fn float_format_trims() {
        let mut buf = [0u8; 48];
        let d = FloatFmt::default();
        assert_eq!(format_f64(1.5, &d, &mut buf).unwrap(), "1.5");
        assert_eq!(format_f64(0.0, &d, &mut buf).unwrap(), "0");
        assert_eq!(format_f64(-2.25, &d, &mut buf).unwrap(), "-2.25");
        let sci = FloatFmt {
            precision: -1,
            scientific: true,
        };
        assert_eq!(format_f64(1500.0, &sci, &mut buf).unwrap(), "1.5e3");
        let fixed2 = FloatFmt {
            precision: 2,
            scientific: false,
        };
        assert_eq!(format_f64(1.0, &fixed2, &mut buf).unwrap(), "1.00");
    }

    #[cfg(feature = "float")]
    #[test]
    fn float_parse() {
        assert_eq!(parse_f64("1.5"), Ok(1.5));
        assert_eq!(parse_f64("-2.25e2"), Ok(-225.0));
        assert_eq!(parse_f64("bogus"), Err(Error::BadArg));
        assert_eq!(parse_f64("1.5x"), Err(Error::BadArg));
        assert_eq!(parse_f64("1e999"), Err(Error::BadArg));
        assert_eq!(parse_f32("3.25"), Ok(3.25f32));
    }

    #[cfg(feature = "float")]
    #[test]
    fn float_round_trip() {
        for v in [0.0f64, 1.0, -1.0, 0.1, 123_456.789, 1e-10] {
            let mut buf = [0u8; 48];
            let s = format_f64(v, &FloatFmt::default(), &mut buf).unwrap();
            assert_eq!(parse_f64(s), Ok(v));
        }
    }
}
