//! Typed argument conversion for [`CmdContext::recv`] and
//! [`CmdContext::send`].
//!
//! Text mode goes through the decimal/hex codec; binary mode moves raw
//! little-endian bytes. The two traits are deliberately narrow: a `RecvArg`
//! pulls exactly one argument past the cursor, a `SendArg` appends exactly
//! one value to the response.
//!
//! [`CmdContext::recv`]: crate::interp::CmdContext::recv
//! [`CmdContext::send`]: crate::interp::CmdContext::send

#[cfg(feature = "float")]
use crate::codec::FloatFmt;
use crate::codec::{self, IntFmt};
use crate::interp::{CmdContext, Mode};
use crate::stream::ByteStream;
use crate::Error;

/// A type readable as one command argument.
pub trait RecvArg: Sized {
    /// `hex` forces base-16 parsing for integer text tokens; other types
    /// ignore it.
    fn recv<S: ByteStream>(ctx: &mut CmdContext<'_, S>, hex: bool) -> Result<Self, Error>;
}

/// A type writable as one response value.
pub trait SendArg {
    fn send<S: ByteStream>(&self, ctx: &mut CmdContext<'_, S>) -> Result<(), Error>;
}

macro_rules! int_arg {
    ($($t:ty),+) => {$(
        impl RecvArg for $t {
            fn recv<S: ByteStream>(ctx: &mut CmdContext<'_, S>, hex: bool) -> Result<Self, Error> {
                match ctx.mode() {
                    Mode::Text => {
                        let tok = ctx.take_token()?;
                        if hex {
                            codec::parse_int_hex(tok)
                        } else {
                            codec::parse_int(tok)
                        }
                    }
                    Mode::Binary => {
                        let mut le = [0u8; core::mem::size_of::<$t>()];
                        ctx.take_bytes(&mut le)?;
                        Ok(<$t>::from_le_bytes(le))
                    }
                }
            }
        }

        impl SendArg for $t {
            fn send<S: ByteStream>(&self, ctx: &mut CmdContext<'_, S>) -> Result<(), Error> {
                ctx.send_int_inner(*self, &IntFmt::default())
            }
        }
    )+};
}

int_arg!(u8, i8, u16, i16, u32, i32, u64, i64);

impl RecvArg for bool {
    fn recv<S: ByteStream>(ctx: &mut CmdContext<'_, S>, _hex: bool) -> Result<Self, Error> {
        match ctx.mode() {
            Mode::Text => match ctx.take_token()? {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(Error::BadArg),
            },
            Mode::Binary => {
                let mut b = [0u8; 1];
                ctx.take_bytes(&mut b)?;
                Ok(b[0] != 0)
            }
        }
    }
}

impl SendArg for bool {
    fn send<S: ByteStream>(&self, ctx: &mut CmdContext<'_, S>) -> Result<(), Error> {
        match ctx.mode() {
            Mode::Text => {
                ctx.emit_value_plain(if *self { b"true" } else { b"false" });
                Ok(())
            }
            Mode::Binary => ctx.push_packet(&[*self as u8]),
        }
    }
}

// Only single-byte chars fit the wire format, so both directions are
// ASCII-only.
impl RecvArg for char {
    fn recv<S: ByteStream>(ctx: &mut CmdContext<'_, S>, _hex: bool) -> Result<Self, Error> {
        match ctx.mode() {
            Mode::Text => {
                let tok = ctx.take_token()?;
                let mut chars = tok.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii() => Ok(c),
                    _ => Err(Error::BadArg),
                }
            }
            Mode::Binary => {
                let mut b = [0u8; 1];
                ctx.take_bytes(&mut b)?;
                if b[0].is_ascii() {
                    Ok(b[0] as char)
                } else {
                    Err(Error::BadArg)
                }
            }
        }
    }
}

impl SendArg for char {
    fn send<S: ByteStream>(&self, ctx: &mut CmdContext<'_, S>) -> Result<(), Error> {
        if !self.is_ascii() {
            return Err(Error::BadArg);
        }
        let b = *self as u8;
        match ctx.mode() {
            Mode::Text => {
                ctx.emit_cooked(&[b], b'\'');
                Ok(())
            }
            Mode::Binary => ctx.push_packet(&[b]),
        }
    }
}

impl SendArg for &str {
    fn send<S: ByteStream>(&self, ctx: &mut CmdContext<'_, S>) -> Result<(), Error> {
        match ctx.mode() {
            Mode::Text => {
                ctx.emit_cooked(self.as_bytes(), b'"');
                Ok(())
            }
            Mode::Binary => ctx.push_packet(self.as_bytes()),
        }
    }
}

#[cfg(feature = "float")]
macro_rules! float_arg {
    ($t:ty, $parse:ident, $inner:ident) => {
        impl RecvArg for $t {
            fn recv<S: ByteStream>(ctx: &mut CmdContext<'_, S>, _hex: bool) -> Result<Self, Error> {
                match ctx.mode() {
                    Mode::Text => {
                        let tok = ctx.take_token()?;
                        codec::$parse(tok)
                    }
                    Mode::Binary => {
                        let mut le = [0u8; core::mem::size_of::<$t>()];
                        ctx.take_bytes(&mut le)?;
                        Ok(<$t>::from_le_bytes(le))
                    }
                }
            }
        }

        impl SendArg for $t {
            fn send<S: ByteStream>(&self, ctx: &mut CmdContext<'_, S>) -> Result<(), Error> {
                ctx.$inner(*self, &FloatFmt::default())
            }
        }
    };
}

#[cfg(feature = "float")]
float_arg!(f32, parse_f32, send_f32_inner);
#[cfg(feature = "float")]
float_arg!(f64, parse_f64, send_f64_inner);
