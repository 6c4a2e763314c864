//! Cmdplex is a dual-protocol serial command interpreter for small targets.
//!
//! One engine speaks two wire protocols over a single byte stream:
//!
//!   * Text mode: a human-friendly shell with tokenized lines, quoting and
//!     escapes, `#` comments, echo with backspace editing, a prompt, and
//!     one-entry history recall via the up arrow.
//!   * Binary mode: checksummed machine packets of the form
//!     `[length][code][payload...][checksum]`, length counting itself and
//!     all multi-byte values little-endian.
//!
//! Command handlers are registered at runtime under a numeric code and an
//! optional name, and are written once: the same handler serves both
//! protocols through the typed [`CmdContext::recv`]/[`CmdContext::send`]
//! surface, which parses decimal/hex text in one mode and moves raw
//! little-endian bytes in the other.
//!
//! The crate is `no_std` by default, performs no dynamic allocation, and
//! holds all state in fixed buffers sized by const generics. Nothing inside
//! blocks: the application pumps the engine from its own loop by calling
//! [`Interpreter::update`] with a millisecond timestamp, and at most one
//! command is dispatched per pump. The engine never sleeps; where a send
//! path may wait for the stream it instead polls [`ByteStream::idle`] under
//! a configurable [`SendWait`] bound.
//!
//! A minimal text-mode setup:
//!
//! ```
//! use cmdplex::{CmdContext, FifoStream, Interpreter};
//!
//! fn add(ctx: &mut CmdContext<'_, FifoStream<64, 64>>) -> bool {
//!     let r = ctx.skip().and_then(|_| {
//!         let a: i32 = ctx.recv()?;
//!         let b: i32 = ctx.recv()?;
//!         ctx.send(a + b)
//!     });
//!     ctx.end_cmd();
//!     r.is_ok()
//! }
//!
//! let mut interp: Interpreter<_, 8, 128, 64> = Interpreter::new(FifoStream::new());
//! interp.set_prompt(Some("> "));
//! interp.add_fn(1, Some("add"), add, Some("add A B: print A+B")).unwrap();
//!
//! interp.stream_mut().inject(b"add 2 3\r");
//! interp.update(0);
//! assert_eq!(interp.stream().sent(), b"5\r\n> ");
//! ```
//!
//! The `std` feature (or building the tests) links the standard library for
//! host-side harnesses; the `float` feature, on by default, adds `f32`/`f64`
//! argument support.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod args;
pub mod codec;
mod error;
mod framer;
mod interp;
mod registry;
mod stream;
mod tokenizer;

pub use args::{RecvArg, SendArg};
#[cfg(feature = "float")]
pub use codec::FloatFmt;
pub use codec::IntFmt;
pub use error::Error;
pub use framer::{checksum, encode_frame, FRAME_OVERHEAD};
pub use interp::{report_error_text, CmdContext, Interpreter, Mode, SendWait};
pub use registry::{CmdEntry, Handler, HandlerFn, Runnable};
pub use stream::{ByteStream, FifoStream};
