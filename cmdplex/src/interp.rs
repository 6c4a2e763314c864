//! Interpreter state machine and the handler-facing command context.
//!
//! The interpreter owns exactly one byte stream, a fixed-capacity command
//! table, a receive buffer and a send buffer. The application calls
//! [`Interpreter::update`] once per scheduler tick; the pump consumes
//! available input one byte at a time, recognizes at most one complete
//! command per call, and dispatches it through the table. Handlers receive a
//! [`CmdContext`], a split borrow over the interpreter internals, and finish
//! a command with [`CmdContext::end_cmd`], either directly or, for
//! multi-tick commands, from a later tick.

use crate::args::{RecvArg, SendArg};
#[cfg(feature = "float")]
use crate::codec::FloatFmt;
use crate::codec::{self, Int, IntFmt};
use crate::framer::{self, FrameEvent, TxCore};
use crate::registry::{CmdEntry, Handler, HandlerFn, Hooks, Registry, Runnable};
use crate::stream::ByteStream;
use crate::tokenizer::{self, Esc, LineEvent};
use crate::Error;

/// Stock error handler: in text mode, print the latched error's message on
/// its own line; in binary mode stay silent (diagnostics would corrupt the
/// channel). Always resolves the latch, so the prompt resumes. Install with
/// [`Interpreter::set_error_handler`].
pub fn report_error_text<S: ByteStream>(ctx: &mut CmdContext<'_, S>) -> bool {
    use core::fmt::Write as _;

    if let Some(e) = ctx.error() {
        if ctx.mode == Mode::Text {
            let mut scratch = [0u8; 48];
            let mut w = codec::SliceWriter {
                buf: &mut scratch,
                len: 0,
            };
            let _ = write!(w, "error: {}", e);
            let codec::SliceWriter { len, .. } = w;
            ctx.emit_text(&scratch[..len]);
            ctx.emit_text(b"\r\n");
            ctx.tx.sep_pending = false;
        }
    }
    true
}

/// Wire protocol selector. Switching is a destructive reset, not a drain.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    Text,
    Binary,
}

/// How long a send path may wait for the stream to accept bytes.
///
/// The engine cannot sleep, so the bound counts [`ByteStream::idle`] polls;
/// host streams sleep about a millisecond per poll. Anything left after the
/// bound drains opportunistically on later [`Interpreter::update`] calls.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SendWait {
    None,
    Polls(u16),
    Forever,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum RxState {
    Idle,
    Receiving,
    Handling,
}

/// Receive-side cursors and state, kept separate from the buffer arena so the
/// two can be borrowed independently.
pub(crate) struct RxCore {
    pub state: RxState,
    /// Bytes buffered while receiving; token-region length while handling.
    pub len: usize,
    /// Argument read position: byte index (binary) or token scan index (text).
    pub cursor: usize,
    pub argc: usize,
    /// Length of the saved previous command in the buffer's upper half.
    pub hist_len: usize,
    pub esc: Esc,
    pub deadline: Option<u32>,
}

impl RxCore {
    pub(crate) const fn new() -> Self {
        Self {
            state: RxState::Idle,
            len: 0,
            cursor: 0,
            argc: 0,
            hist_len: 0,
            esc: Esc::None,
            deadline: None,
        }
    }

    fn reset(&mut self) {
        // hist_len survives, the saved command stays recallable
        self.state = RxState::Idle;
        self.len = 0;
        self.cursor = 0;
        self.argc = 0;
        self.esc = Esc::None;
        self.deadline = None;
    }
}

pub(crate) struct Options {
    pub echo: bool,
    pub prompt: Option<&'static str>,
    pub recv_timeout: Option<u32>,
    pub send_wait: SendWait,
}

/// The command interpreter engine.
///
/// `MAX_CMDS` bounds the command table, `RECV_SZ` the longest receivable
/// line/packet, `SEND_SZ` the longest binary response packet. All three are
/// compile-time constants; nothing allocates.
pub struct Interpreter<S: ByteStream + 'static, const MAX_CMDS: usize, const RECV_SZ: usize, const SEND_SZ: usize> {
    stream: S,
    mode: Mode,
    table: Registry<S, MAX_CMDS>,
    hooks: Hooks<S>,
    rx: RxCore,
    rx_buf: [u8; RECV_SZ],
    tx: TxCore,
    tx_buf: [u8; SEND_SZ],
    err: Option<Error>,
    err_fresh: bool,
    opt: Options,
}

impl<S: ByteStream, const MAX_CMDS: usize, const RECV_SZ: usize, const SEND_SZ: usize>
    Interpreter<S, MAX_CMDS, RECV_SZ, SEND_SZ>
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            mode: Mode::Text,
            table: Registry::new(),
            hooks: Hooks::new(),
            rx: RxCore::new(),
            rx_buf: [0u8; RECV_SZ],
            tx: TxCore::new(),
            tx_buf: [0u8; SEND_SZ],
            err: None,
            err_fresh: false,
            opt: Options {
                echo: false,
                prompt: None,
                recv_timeout: None,
                send_wait: SendWait::None,
            },
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch protocol. This is a hard reset: both buffers, all cursors and
    /// the latched error are cleared, and text mode re-sends the prompt.
    pub fn set_mode(&mut self, mode: Mode) {
        log::debug!("mode switch to {:?}", mode);
        self.mode = mode;
        self.rx.reset();
        self.rx.hist_len = 0;
        self.tx.reset();
        self.err = None;
        self.err_fresh = false;
        if mode == Mode::Text {
            self.ctx().send_prompt();
        }
    }

    pub fn set_echo(&mut self, echo: bool) {
        self.opt.echo = echo;
    }

    pub fn set_prompt(&mut self, prompt: Option<&'static str>) {
        self.opt.prompt = prompt;
    }

    /// Inter-byte receive timeout in milliseconds, `None` to disable.
    pub fn set_recv_timeout(&mut self, ms: Option<u32>) {
        self.opt.recv_timeout = ms;
    }

    pub fn set_send_wait(&mut self, wait: SendWait) {
        self.opt.send_wait = wait;
    }

    /// Register a function-backed command.
    pub fn add_fn(
        &mut self,
        code: u8,
        name: Option<&'static str>,
        handler: HandlerFn<S>,
        help: Option<&'static str>,
    ) -> Result<(), Error> {
        self.table.add(code, name, Handler::Func(handler), help)
    }

    /// Register an object-backed command.
    pub fn add_obj(
        &mut self,
        code: u8,
        name: Option<&'static str>,
        handler: &'static dyn Runnable<S>,
        help: Option<&'static str>,
    ) -> Result<(), Error> {
        self.table.add(code, name, Handler::Obj(handler), help)
    }

    pub fn remove_by_code(&mut self, code: u8) -> bool {
        self.table.remove_by_code(code)
    }

    pub fn remove_by_name(&mut self, name: &str) -> bool {
        self.table.remove_by_name(name)
    }

    pub fn remove_by_handler(&mut self, handler: &Handler<S>) -> bool {
        self.table.remove_by_handler(handler)
    }

    /// Install a handler that receives every command/packet before any table
    /// lookup. Used e.g. by client state machines awaiting a response frame.
    pub fn set_universal_handler(&mut self, h: Option<Handler<S>>) {
        self.hooks.universal = h;
    }

    /// Install a handler for commands that match nothing in the table.
    pub fn set_fallback_handler(&mut self, h: Option<Handler<S>>) {
        self.hooks.fallback = h;
    }

    /// Install the handler run at finalization while an error is latched.
    /// Returning `true` from it clears the latch.
    pub fn set_error_handler(&mut self, h: Option<Handler<S>>) {
        self.hooks.error = h;
    }

    pub fn command_count(&self) -> usize {
        self.table.len()
    }

    pub fn command_capacity(&self) -> usize {
        self.table.capacity()
    }

    pub fn name_for_code(&self, code: u8) -> Option<&'static str> {
        self.table.lookup_code(code).and_then(|e| e.name())
    }

    pub fn code_for_name(&self, name: &str) -> Option<u8> {
        self.table.lookup_name(name).map(|e| e.code())
    }

    /// The sticky latched error, if any. First error wins until cleared.
    pub fn error(&self) -> Option<Error> {
        self.err
    }

    pub fn clear_error(&mut self) {
        self.err = None;
        self.err_fresh = false;
    }

    /// Re-send the prompt (text mode). Typically called once at startup.
    pub fn print_prompt(&mut self) {
        self.ctx().send_prompt();
    }

    /// Borrow the handler-facing context outside of dispatch. This is how
    /// multi-tick commands (and client code composing requests) reach the
    /// recv/send surface between pump calls.
    pub fn context(&mut self) -> CmdContext<'_, S> {
        self.ctx()
    }

    /// Pump the engine. Call once per scheduler tick with a millisecond
    /// timestamp (wrap-safe). At most one command is dispatched per call.
    pub fn update(&mut self, now: u32) {
        if self.rx.state == RxState::Receiving {
            if let Some(deadline) = self.rx.deadline {
                if (now.wrapping_sub(deadline) as i32) >= 0 {
                    log::warn!("receive timeout, discarding partial command");
                    self.latch(Error::RecvTimeout);
                    self.rx.reset();
                    self.ctx().report_pending_error();
                }
            }
        }

        while self.rx.state != RxState::Handling && self.stream.available() > 0 {
            let b = match self.stream.read() {
                Some(b) => b,
                None => break,
            };
            if self.rx.state == RxState::Idle {
                self.rx.state = RxState::Receiving;
                self.rx.deadline = self.opt.recv_timeout.map(|t| now.wrapping_add(t));
            }
            if self.pump_byte(b) {
                self.dispatch();
                break;
            }
        }

        if self.rx.state != RxState::Handling && self.err.is_some() && self.err_fresh {
            self.ctx().report_pending_error();
        }

        if self.mode == Mode::Binary && self.tx.draining {
            self.tx.drain(&self.tx_buf, &mut self.stream);
        }
    }

    fn latch(&mut self, e: Error) {
        if self.err.is_none() {
            log::warn!("latched error: {}", e);
            self.err = Some(e);
            self.err_fresh = true;
        }
    }

    /// Consume one byte. Returns `true` when a complete command is ready for
    /// dispatch.
    fn pump_byte(&mut self, b: u8) -> bool {
        match self.mode {
            Mode::Text => {
                let ev = tokenizer::feed_text(
                    &mut self.rx,
                    &mut self.rx_buf,
                    &mut self.stream,
                    self.opt.echo,
                    b,
                );
                match ev {
                    LineEvent::Pending => false,
                    LineEvent::Overflow => {
                        log::warn!("line exceeds receive buffer, discarding");
                        self.latch(Error::RecvOverflow);
                        self.rx.reset();
                        self.ctx().report_pending_error();
                        false
                    }
                    LineEvent::Complete => {
                        tokenizer::save_history(&mut self.rx, &mut self.rx_buf);
                        match tokenizer::tokenize(&mut self.rx_buf, self.rx.len) {
                            Err(e) => {
                                self.latch(e);
                                self.rx.reset();
                                self.ctx().report_pending_error();
                                false
                            }
                            Ok((0, _)) => {
                                // empty command is a no-op, not an error
                                self.rx.reset();
                                self.ctx().send_prompt();
                                false
                            }
                            Ok((argc, used)) => {
                                self.rx.len = used;
                                self.rx.argc = argc;
                                self.rx.cursor = 0;
                                self.rx.state = RxState::Handling;
                                true
                            }
                        }
                    }
                }
            }
            Mode::Binary => match framer::feed_binary(&mut self.rx, &mut self.rx_buf, b) {
                FrameEvent::Pending => false,
                FrameEvent::Overflow => {
                    log::warn!("packet exceeds receive buffer, discarding");
                    self.latch(Error::RecvOverflow);
                    self.rx.reset();
                    self.ctx().report_pending_error();
                    false
                }
                FrameEvent::BadFrame => {
                    self.latch(Error::BadPacket);
                    self.rx.reset();
                    self.ctx().report_pending_error();
                    false
                }
                FrameEvent::Complete => {
                    self.rx.argc = self.rx_buf[0] as usize - 2;
                    self.rx.cursor = 1;
                    self.rx.state = RxState::Handling;
                    true
                }
            },
        }
    }

    /// Resolve and invoke the handler for the just-completed command.
    ///
    /// Precedence: universal hook, exact table match, fallback hook,
    /// otherwise BAD_CMD with auto-finalization.
    fn dispatch(&mut self) {
        let resolved = if let Some(h) = self.hooks.universal {
            Some(h)
        } else {
            let entry = match self.mode {
                Mode::Binary => {
                    log::debug!("dispatching code {}", self.rx_buf[1]);
                    self.table.lookup_code(self.rx_buf[1])
                }
                Mode::Text => {
                    let mut c = self.rx.cursor;
                    tokenizer::next_token(&self.rx_buf, self.rx.len, &mut c)
                        .and_then(|(a, b)| core::str::from_utf8(&self.rx_buf[a..b]).ok())
                        .and_then(|name| {
                            log::debug!("dispatching {:?}", name);
                            self.table.lookup_name(name)
                        })
                }
            };
            entry.map(|e| e.handler).or(self.hooks.fallback)
        };
        match resolved {
            None => {
                self.latch(Error::BadCmd);
                self.ctx().end_cmd();
            }
            Some(h) => {
                let ok = h.invoke(&mut self.ctx());
                if !ok {
                    self.latch(Error::BadHandler);
                    if self.rx.state == RxState::Handling {
                        self.ctx().end_cmd();
                    }
                }
                // success without end_cmd leaves the command in progress
            }
        }
    }

    fn ctx(&mut self) -> CmdContext<'_, S> {
        CmdContext {
            mode: self.mode,
            stream: &mut self.stream,
            rx: &mut self.rx,
            rx_buf: &mut self.rx_buf,
            tx: &mut self.tx,
            tx_buf: &mut self.tx_buf,
            err: &mut self.err,
            err_fresh: &mut self.err_fresh,
            hooks: &mut self.hooks,
            opt: &self.opt,
            entries: self.table.entries(),
        }
    }
}

/// Handler-facing view of one interpreter.
///
/// Everything a command handler may touch lives here: the argument cursor
/// (`recv`/`skip`), the response surface (`send`/`end_cmd`), the latched
/// error and the override hooks. The command table itself is visible
/// read-only via [`CmdContext::commands`].
pub struct CmdContext<'a, S: ByteStream + 'static> {
    mode: Mode,
    stream: &'a mut S,
    rx: &'a mut RxCore,
    rx_buf: &'a mut [u8],
    tx: &'a mut TxCore,
    tx_buf: &'a mut [u8],
    err: &'a mut Option<Error>,
    err_fresh: &'a mut bool,
    hooks: &'a mut Hooks<S>,
    opt: &'a Options,
    entries: &'a [CmdEntry<S>],
}

impl<'a, S: ByteStream> CmdContext<'a, S> {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Argument count of the current command: tokens including the command
    /// name (text), or `length - 2` bytes including the code byte (binary).
    pub fn arg_count(&self) -> usize {
        self.rx.argc
    }

    /// Tokens (text) or payload bytes (binary) left at the cursor.
    pub fn args_available(&self) -> usize {
        match self.mode {
            Mode::Text => {
                let mut c = self.rx.cursor;
                let mut n = 0;
                while tokenizer::next_token(self.rx_buf, self.rx.len, &mut c).is_some() {
                    n += 1;
                }
                n
            }
            // saturate twice: len is 0 outside of HANDLING
            Mode::Binary => self.rx.len.saturating_sub(1).saturating_sub(self.rx.cursor),
        }
    }

    pub fn error(&self) -> Option<Error> {
        *self.err
    }

    pub fn clear_error(&mut self) {
        *self.err = None;
        *self.err_fresh = false;
    }

    /// Registered commands, for `help`-style introspection.
    pub fn commands(&self) -> &[CmdEntry<S>] {
        self.entries
    }

    pub fn set_universal_handler(&mut self, h: Option<Handler<S>>) {
        self.hooks.universal = h;
    }

    /// Skip one token/byte without returning it. Handlers conventionally
    /// call this first to discard the command name or code.
    pub fn skip(&mut self) -> Result<(), Error> {
        if let Err(e) = self.recv_guard() {
            self.latch(e);
            return Err(e);
        }
        let r = match self.mode {
            Mode::Text => tokenizer::next_token(self.rx_buf, self.rx.len, &mut self.rx.cursor)
                .map(|_| ())
                .ok_or(Error::RecvUnderflow),
            Mode::Binary => {
                if self.rx.cursor < self.rx.len - 1 {
                    self.rx.cursor += 1;
                    Ok(())
                } else {
                    Err(Error::RecvUnderflow)
                }
            }
        };
        if let Err(e) = r {
            self.latch(e);
        }
        r
    }

    /// Read the next argument as `T`.
    pub fn recv<T: RecvArg>(&mut self) -> Result<T, Error> {
        self.recv_impl(false)
    }

    /// Read the next argument as `T`, forcing hex for integer types.
    pub fn recv_hex<T: RecvArg>(&mut self) -> Result<T, Error> {
        self.recv_impl(true)
    }

    fn recv_impl<T: RecvArg>(&mut self, hex: bool) -> Result<T, Error> {
        if let Err(e) = self.recv_guard() {
            self.latch(e);
            return Err(e);
        }
        match T::recv(self, hex) {
            Ok(v) => Ok(v),
            Err(e) => {
                self.latch(e);
                Err(e)
            }
        }
    }

    /// Read the next string argument: a token in text mode, the remainder of
    /// the payload in binary mode.
    pub fn recv_str(&mut self) -> Result<&str, Error> {
        if let Err(e) = self.recv_guard() {
            self.latch(e);
            return Err(e);
        }
        let (a, b) = match self.mode {
            Mode::Text => {
                match tokenizer::next_token(self.rx_buf, self.rx.len, &mut self.rx.cursor) {
                    Some(r) => r,
                    None => {
                        self.latch(Error::RecvUnderflow);
                        return Err(Error::RecvUnderflow);
                    }
                }
            }
            Mode::Binary => {
                let end = self.rx.len - 1;
                if self.rx.cursor >= end {
                    self.latch(Error::RecvUnderflow);
                    return Err(Error::RecvUnderflow);
                }
                let a = self.rx.cursor;
                self.rx.cursor = end;
                (a, end)
            }
        };
        // Validate (and latch) before taking the returned slice: the `Ok`
        // borrow lives as long as `self`, so it must be the last one made.
        if core::str::from_utf8(&self.rx_buf[a..b]).is_err() {
            self.latch(Error::BadArg);
            return Err(Error::BadArg);
        }
        core::str::from_utf8(&self.rx_buf[a..b]).map_err(|_| Error::BadArg)
    }

    /// Send one typed value: cooked text token, or little-endian packet
    /// bytes.
    pub fn send<T: SendArg>(&mut self, v: T) -> Result<(), Error> {
        match v.send(self) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.latch(e);
                Err(e)
            }
        }
    }

    /// Send an integer with explicit width/pad/hex formatting (text mode;
    /// binary mode sends the little-endian bytes and ignores the options).
    pub fn send_int_fmt<T: Int>(&mut self, v: T, fmt: &IntFmt) -> Result<(), Error> {
        match self.send_int_inner(v, fmt) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.latch(e);
                Err(e)
            }
        }
    }

    #[cfg(feature = "float")]
    pub fn send_f32_fmt(&mut self, v: f32, fmt: &FloatFmt) -> Result<(), Error> {
        let r = self.send_f32_inner(v, fmt);
        if let Err(e) = r {
            self.latch(e);
        }
        r
    }

    #[cfg(feature = "float")]
    pub fn send_f64_fmt(&mut self, v: f64, fmt: &FloatFmt) -> Result<(), Error> {
        let r = self.send_f64_inner(v, fmt);
        if let Err(e) = r {
            self.latch(e);
        }
        r
    }

    /// Send a cooked string value (quoted and escaped when needed).
    pub fn send_str(&mut self, s: &str) -> Result<(), Error> {
        self.send(s)
    }

    /// Send bytes uncooked: no separator, no quoting (text), raw packet
    /// bytes (binary).
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let r = match self.mode {
            Mode::Text => {
                self.emit_text(bytes);
                if !bytes.is_empty() {
                    // raw output still counts as a pending response line, so
                    // finalization terminates it; no separator was emitted
                    // here and none precedes these bytes
                    self.tx.sep_pending = true;
                }
                Ok(())
            }
            Mode::Binary => self.push_packet(bytes),
        };
        if let Err(e) = r {
            self.latch(e);
        }
        r
    }

    /// Force a line break in a text response and clear the separator flag.
    pub fn send_eol(&mut self) -> Result<(), Error> {
        if self.mode != Mode::Text {
            self.latch(Error::Unsupported);
            return Err(Error::Unsupported);
        }
        self.emit_text(b"\r\n");
        self.tx.sep_pending = false;
        Ok(())
    }

    /// Finalize and flush the outgoing packet without ending the command
    /// (binary mode). An empty packet is discarded.
    pub fn send_packet(&mut self) -> Result<(), Error> {
        if self.mode != Mode::Binary {
            self.latch(Error::Unsupported);
            return Err(Error::Unsupported);
        }
        if self.tx.finalize(self.tx_buf) {
            self.flush_packet_wait();
        }
        Ok(())
    }

    /// End the current command: run pending error handling, terminate the
    /// response (text: separator-aware `\r\n` plus prompt; binary: finalize
    /// and flush the packet), and reset to idle.
    pub fn end_cmd(&mut self) {
        self.run_error_hook();
        let was_active = self.rx.state == RxState::Handling;
        match self.mode {
            Mode::Text => {
                if was_active {
                    if self.tx.sep_pending {
                        self.emit_text(b"\r\n");
                        self.tx.sep_pending = false;
                    }
                    self.rx.reset();
                    self.send_prompt();
                }
            }
            Mode::Binary => {
                if self.tx.finalize(self.tx_buf) {
                    self.flush_packet_wait();
                }
                if was_active {
                    self.rx.reset();
                }
            }
        }
    }

    // ---- internals -----------------------------------------------------

    fn recv_guard(&self) -> Result<(), Error> {
        if self.rx.state == RxState::Handling {
            Ok(())
        } else {
            Err(Error::Unsupported)
        }
    }

    pub(crate) fn latch(&mut self, e: Error) {
        if self.err.is_none() {
            log::warn!("latched error: {}", e);
            *self.err = Some(e);
            *self.err_fresh = true;
        }
    }

    /// Run the error hook once per latched error. A `true` return clears the
    /// latch.
    pub(crate) fn run_error_hook(&mut self) {
        if self.err.is_some() && *self.err_fresh {
            *self.err_fresh = false;
            if let Some(h) = self.hooks.error {
                if h.invoke(self) {
                    *self.err = None;
                }
            }
        }
    }

    /// Receive-stage failure reporting: run the hook and, if the error got
    /// resolved, resume the text prompt.
    pub(crate) fn report_pending_error(&mut self) {
        self.run_error_hook();
        if self.err.is_none() && self.mode == Mode::Text {
            self.send_prompt();
        }
    }

    pub(crate) fn send_prompt(&mut self) {
        if self.mode == Mode::Text {
            if let Some(p) = self.opt.prompt {
                self.emit_text(p.as_bytes());
            }
        }
    }

    /// Next text token as a str slice of the receive buffer.
    pub(crate) fn take_token(&mut self) -> Result<&str, Error> {
        let (a, b) = tokenizer::next_token(self.rx_buf, self.rx.len, &mut self.rx.cursor)
            .ok_or(Error::RecvUnderflow)?;
        core::str::from_utf8(&self.rx_buf[a..b]).map_err(|_| Error::BadArg)
    }

    /// Raw-byte receive primitive underlying all binary typed receives.
    pub(crate) fn take_bytes(&mut self, out: &mut [u8]) -> Result<(), Error> {
        let end = self.rx.len - 1; // checksum byte is not an argument
        if self.rx.cursor + out.len() > end {
            return Err(Error::RecvUnderflow);
        }
        out.copy_from_slice(&self.rx_buf[self.rx.cursor..self.rx.cursor + out.len()]);
        self.rx.cursor += out.len();
        Ok(())
    }

    /// Write one byte to the stream, honoring the configured send wait.
    fn put_byte(&mut self, b: u8) {
        let mut polls: u32 = match self.opt.send_wait {
            SendWait::None => 0,
            SendWait::Polls(n) => n as u32,
            SendWait::Forever => u32::MAX,
        };
        loop {
            if self.stream.available_for_write() > 0 && self.stream.write(b) == 1 {
                return;
            }
            if polls == 0 {
                log::trace!("stream full, dropping output byte");
                return;
            }
            if polls != u32::MAX {
                polls -= 1;
            }
            self.stream.idle();
        }
    }

    pub(crate) fn emit_text(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.put_byte(b);
        }
    }

    /// Emit the single-space separator before every value after the first.
    fn sep_before_value(&mut self) {
        if self.tx.sep_pending {
            self.put_byte(b' ');
        }
        self.tx.sep_pending = true;
    }

    /// Separator plus uncooked rendering, for values that never need quoting.
    pub(crate) fn emit_value_plain(&mut self, bytes: &[u8]) {
        self.sep_before_value();
        self.emit_text(bytes);
    }

    /// Separator plus cooked rendering: quoted and escaped when the value
    /// contains whitespace, quotes, or unprintable bytes.
    pub(crate) fn emit_cooked(&mut self, bytes: &[u8], quote_char: u8) {
        self.sep_before_value();
        if tokenizer::needs_quoting(bytes) {
            self.put_byte(quote_char);
            for &b in bytes {
                match tokenizer::escape_code(b) {
                    Some(c) => {
                        self.put_byte(b'\\');
                        self.put_byte(c);
                    }
                    None => self.put_byte(b),
                }
            }
            self.put_byte(quote_char);
        } else {
            self.emit_text(bytes);
        }
    }

    /// Append bytes to the outgoing packet body.
    pub(crate) fn push_packet(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.tx.draining {
            // previous packet still flushing; give it a bounded chance
            self.flush_packet_wait();
            if self.tx.draining {
                return Err(Error::SendOverflow);
            }
        }
        for &b in bytes {
            self.tx.push(self.tx_buf, b)?;
        }
        Ok(())
    }

    pub(crate) fn send_int_inner<T: Int>(&mut self, v: T, fmt: &IntFmt) -> Result<(), Error> {
        match self.mode {
            Mode::Text => {
                let mut scratch = [0u8; 24];
                let n = codec::format_int(v, fmt, &mut scratch)?.len();
                self.emit_value_plain(&scratch[..n]);
                Ok(())
            }
            Mode::Binary => {
                let bits = v.to_bits().to_le_bytes();
                self.push_packet(&bits[..T::WIDTH])
            }
        }
    }

    #[cfg(feature = "float")]
    pub(crate) fn send_f32_inner(&mut self, v: f32, fmt: &FloatFmt) -> Result<(), Error> {
        match self.mode {
            Mode::Text => {
                let mut scratch = [0u8; 48];
                let n = codec::format_f32(v, fmt, &mut scratch)?.len();
                self.emit_value_plain(&scratch[..n]);
                Ok(())
            }
            Mode::Binary => self.push_packet(&v.to_le_bytes()),
        }
    }

    #[cfg(feature = "float")]
    pub(crate) fn send_f64_inner(&mut self, v: f64, fmt: &FloatFmt) -> Result<(), Error> {
        match self.mode {
            Mode::Text => {
                let mut scratch = [0u8; 48];
                let n = codec::format_f64(v, fmt, &mut scratch)?.len();
                self.emit_value_plain(&scratch[..n]);
                Ok(())
            }
            Mode::Binary => self.push_packet(&v.to_le_bytes()),
        }
    }

    /// Drain the finalized packet, waiting per the send-wait policy. What is
    /// left over drains on later pumps.
    fn flush_packet_wait(&mut self) {
        let mut polls: u32 = match self.opt.send_wait {
            SendWait::None => 0,
            SendWait::Polls(n) => n as u32,
            SendWait::Forever => u32::MAX,
        };
        loop {
            if self.tx.drain(self.tx_buf, self.stream) {
                return;
            }
            if polls == 0 {
                return;
            }
            if polls != u32::MAX {
                polls -= 1;
            }
            self.stream.idle();
        }
    }
}
