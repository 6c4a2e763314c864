//! Command table and dispatch hooks.
//!
//! Each registered command binds a wire identity (a numeric code for binary
//! mode, an optional name for text mode) to a handler. A handler is either a
//! plain function pointer or a reference to a long-lived [`Runnable`] object;
//! the two share one registry slot through the [`Handler`] sum type.

use heapless::Vec;

use crate::interp::CmdContext;
use crate::stream::ByteStream;
use crate::Error;

/// Plain-function command handler.
///
/// Returns `true` on success. Returning `false` latches
/// [`Error::BadHandler`] and auto-finalizes the command. A handler may also
/// return `true` *without* calling [`CmdContext::end_cmd`]; the command then
/// stays in progress and some other agent finishes it on a later tick.
pub type HandlerFn<S> = fn(&mut CmdContext<'_, S>) -> bool;

/// Object-backed command handler for commands that carry their own state
/// (multi-tick handlers, client state machines). Interior mutability is the
/// expected pattern: `run` takes `&self` so that a single static object can
/// be registered.
pub trait Runnable<S: ByteStream> {
    fn run(&self, ctx: &mut CmdContext<'_, S>) -> bool;
}

/// One registry slot: a function pointer or a runnable object.
pub enum Handler<S: ByteStream + 'static> {
    Func(HandlerFn<S>),
    Obj(&'static dyn Runnable<S>),
}

impl<S: ByteStream> Handler<S> {
    pub fn invoke(&self, ctx: &mut CmdContext<'_, S>) -> bool {
        match self {
            Handler::Func(f) => f(ctx),
            Handler::Obj(o) => o.run(ctx),
        }
    }
}

impl<S: ByteStream> Clone for Handler<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ByteStream> Copy for Handler<S> {}

impl<S: ByteStream> PartialEq for Handler<S> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Handler::Func(a), Handler::Func(b)) => *a as usize == *b as usize,
            (Handler::Obj(a), Handler::Obj(b)) => {
                // Compare object identity, not vtables.
                core::ptr::eq(*a as *const dyn Runnable<S> as *const u8, *b as *const dyn Runnable<S> as *const u8)
            }
            _ => false,
        }
    }
}

impl<S: ByteStream> core::fmt::Debug for Handler<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Handler::Func(func) => f.debug_tuple("Func").field(&(*func as usize)).finish(),
            Handler::Obj(o) => f
                .debug_tuple("Obj")
                .field(&(*o as *const dyn Runnable<S> as *const u8))
                .finish(),
        }
    }
}

impl<S: ByteStream> From<HandlerFn<S>> for Handler<S> {
    fn from(f: HandlerFn<S>) -> Self {
        Handler::Func(f)
    }
}

impl<S: ByteStream> From<&'static dyn Runnable<S>> for Handler<S> {
    fn from(o: &'static dyn Runnable<S>) -> Self {
        Handler::Obj(o)
    }
}

/// A registered command.
pub struct CmdEntry<S: ByteStream + 'static> {
    pub(crate) code: u8,
    pub(crate) name: Option<&'static str>,
    pub(crate) handler: Handler<S>,
    pub(crate) help: Option<&'static str>,
}

impl<S: ByteStream> CmdEntry<S> {
    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    pub fn help(&self) -> Option<&'static str> {
        self.help
    }
}

impl<S: ByteStream> Clone for CmdEntry<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ByteStream> Copy for CmdEntry<S> {}

/// Fixed-capacity command table. Codes are unique; names, where present, are
/// unique too. Capacity is a compile-time constant and registration past it
/// fails with [`Error::CmdOverflow`].
pub(crate) struct Registry<S: ByteStream + 'static, const N: usize> {
    entries: Vec<CmdEntry<S>, N>,
}

impl<S: ByteStream, const N: usize> Registry<S, N> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(
        &mut self,
        code: u8,
        name: Option<&'static str>,
        handler: Handler<S>,
        help: Option<&'static str>,
    ) -> Result<(), Error> {
        if self.lookup_code(code).is_some() {
            return Err(Error::CmdOverflow);
        }
        if let Some(n) = name {
            if self.lookup_name(n).is_some() {
                return Err(Error::CmdOverflow);
            }
        }
        self.entries
            .push(CmdEntry {
                code,
                name,
                handler,
                help,
            })
            .map_err(|_| Error::CmdOverflow)
    }

    pub fn remove_by_code(&mut self, code: u8) -> bool {
        self.remove_where(|e| e.code == code)
    }

    pub fn remove_by_name(&mut self, name: &str) -> bool {
        self.remove_where(|e| e.name == Some(name))
    }

    pub fn remove_by_handler(&mut self, handler: &Handler<S>) -> bool {
        self.remove_where(|e| e.handler == *handler)
    }

    fn remove_where(&mut self, pred: impl Fn(&CmdEntry<S>) -> bool) -> bool {
        match self.entries.iter().position(pred) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn lookup_code(&self, code: u8) -> Option<&CmdEntry<S>> {
        self.entries.iter().find(|e| e.code == code)
    }

    pub fn lookup_name(&self, name: &str) -> Option<&CmdEntry<S>> {
        self.entries.iter().find(|e| e.name == Some(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn entries(&self) -> &[CmdEntry<S>] {
        &self.entries
    }
}

/// Override slots consulted around the command table.
///
/// The universal handler, when installed, receives every complete command or
/// packet before any table lookup; the fallback runs for unmatched commands;
/// the error handler runs at finalization while an error is latched, and
/// clears the latch by returning `true`.
pub(crate) struct Hooks<S: ByteStream + 'static> {
    pub universal: Option<Handler<S>>,
    pub fallback: Option<Handler<S>>,
    pub error: Option<Handler<S>>,
}

impl<S: ByteStream> Hooks<S> {
    pub const fn new() -> Self {
        Self {
            universal: None,
            fallback: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FifoStream;

    type S = FifoStream<16, 16>;

    fn ok(_: &mut CmdContext<'_, S>) -> bool {
        true
    }

    fn other(_: &mut CmdContext<'_, S>) -> bool {
        true
    }

    #[test]
    fn add_and_lookup() {
        let mut r: Registry<S, 4> = Registry::new();
        r.add(1, Some("ec"), Handler::Func(ok), Some("echo one char"))
            .unwrap();
        r.add(2, None, Handler::Func(other), None).unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.capacity(), 4);
        assert_eq!(r.lookup_code(1).unwrap().name(), Some("ec"));
        assert_eq!(r.lookup_name("ec").unwrap().code(), 1);
        assert!(r.lookup_name("nope").is_none());
    }

    #[test]
    fn duplicate_keys_rejected() {
        let mut r: Registry<S, 4> = Registry::new();
        r.add(1, Some("ec"), Handler::Func(ok), None).unwrap();
        assert_eq!(r.add(1, Some("zz"), Handler::Func(ok), None), Err(Error::CmdOverflow));
        assert_eq!(r.add(2, Some("ec"), Handler::Func(ok), None), Err(Error::CmdOverflow));
    }

    #[test]
    fn capacity_enforced() {
        let mut r: Registry<S, 2> = Registry::new();
        r.add(1, None, Handler::Func(ok), None).unwrap();
        r.add(2, None, Handler::Func(ok), None).unwrap();
        assert_eq!(r.add(3, None, Handler::Func(ok), None), Err(Error::CmdOverflow));
    }

    #[test]
    fn remove_by_each_key() {
        let mut r: Registry<S, 4> = Registry::new();
        r.add(1, Some("a"), Handler::Func(ok), None).unwrap();
        r.add(2, Some("b"), Handler::Func(other), None).unwrap();
        assert!(r.remove_by_code(1));
        assert!(!r.remove_by_code(1));
        assert!(r.remove_by_name("b"));
        r.add(3, Some("c"), Handler::Func(other), None).unwrap();
        assert!(r.remove_by_handler(&Handler::Func(other)));
        assert_eq!(r.len(), 0);
    }

    #[test]
    fn handler_identity() {
        let a: Handler<S> = Handler::Func(ok);
        let b: Handler<S> = Handler::Func(other);
        assert_eq!(a, a);
        assert_ne!(a, b);
    }
}
