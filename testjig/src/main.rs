//! Native test harness: runs a cmdplex interpreter on one end of a PTY so a
//! human (or a script) can attach a terminal program to the other end.
//!
//! `JIG_MODE` selects the role:
//!   * `text` (default): interactive shell with echo, prompt, history and a
//!     handful of demo commands. Attach with e.g. `picocom <tty>`.
//!   * `binary`: packet server answering the same commands by code.
//!   * `client`: packet client that periodically sends an echo request and
//!     logs the response, for pointing at a `binary` jig through `socat`.

use cmdplex::{ByteStream, CmdContext, CmdEntry, Handler, Interpreter, Mode, Runnable, SendWait};
use lazy_static::lazy_static;
use std::{
    cell::Cell,
    collections::VecDeque,
    env,
    os::unix::io::RawFd,
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

const MAX_CMDS: usize = 16;
const RECV_SZ: usize = 128;
const SEND_SZ: usize = 64;

type JigInterp = Interpreter<SerialEmulator, MAX_CMDS, RECV_SZ, SEND_SZ>;
type JigCtx<'a> = CmdContext<'a, SerialEmulator>;

/// PTY-backed serial port. The interpreter sits on the master side; humans
/// and peers attach to the slave tty.
struct SerialEmulator {
    master: RawFd,
    slave: RawFd,
    pending: VecDeque<u8>,
}

impl SerialEmulator {
    fn new() -> Self {
        use nix::fcntl::{fcntl, FcntlArg, OFlag};
        use nix::sys::termios::Termios;

        let termios: Termios = unsafe { std::mem::zeroed() };
        let ptys = nix::pty::openpty(None, &Some(termios)).expect("could not allocate pty");
        fcntl(ptys.master, FcntlArg::F_SETFL(OFlag::O_NONBLOCK))
            .expect("could not set master non-blocking");

        SerialEmulator {
            master: ptys.master,
            slave: ptys.slave,
            pending: VecDeque::new(),
        }
    }

    fn ttyname(&self) -> PathBuf {
        nix::unistd::ttyname(self.slave).expect("could not get tty name")
    }

    fn pump(&mut self) {
        let mut tmp = [0u8; 256];
        loop {
            match nix::unistd::read(self.master, &mut tmp) {
                Ok(0) => break,
                Ok(n) => self.pending.extend(&tmp[..n]),
                Err(nix::errno::Errno::EWOULDBLOCK) => break,
                Err(e) => {
                    log::error!("pty read failed: {e}");
                    break;
                }
            }
        }
    }
}

impl Drop for SerialEmulator {
    fn drop(&mut self) {
        let _ = nix::unistd::close(self.master);
        let _ = nix::unistd::close(self.slave);
    }
}

impl ByteStream for SerialEmulator {
    fn available(&mut self) -> usize {
        self.pump();
        self.pending.len()
    }

    fn read(&mut self) -> Option<u8> {
        if self.pending.is_empty() {
            self.pump();
        }
        self.pending.pop_front()
    }

    fn peek(&mut self) -> Option<u8> {
        if self.pending.is_empty() {
            self.pump();
        }
        self.pending.front().copied()
    }

    fn available_for_write(&mut self) -> usize {
        // the kernel buffers PTY output well past any packet we can build
        SEND_SZ
    }

    fn write(&mut self, byte: u8) -> usize {
        match nix::unistd::write(self.master, &[byte]) {
            Ok(n) => n,
            Err(nix::errno::Errno::EWOULDBLOCK) => 0,
            Err(e) => {
                log::error!("pty write failed: {e}");
                0
            }
        }
    }

    fn idle(&mut self) {
        thread::sleep(Duration::from_millis(1));
    }
}

fn now_ms() -> u32 {
    lazy_static! {
        static ref BEGIN: Instant = Instant::now();
    }
    (BEGIN.elapsed().as_millis() & 0xFFFF_FFFF) as u32
}

fn ec(ctx: &mut JigCtx) -> bool {
    let r = ctx.skip().and_then(|_| {
        let arg = ctx.recv_str()?.to_string();
        ctx.send(arg.as_str())
    });
    ctx.end_cmd();
    r.is_ok()
}

fn add(ctx: &mut JigCtx) -> bool {
    let r = ctx.skip().and_then(|_| {
        let a: i32 = ctx.recv()?;
        let b: i32 = ctx.recv()?;
        ctx.send(a + b)
    });
    ctx.end_cmd();
    r.is_ok()
}

fn uptime(ctx: &mut JigCtx) -> bool {
    let r = ctx.skip().and_then(|_| ctx.send(now_ms()));
    ctx.end_cmd();
    r.is_ok()
}

fn help(ctx: &mut JigCtx) -> bool {
    let _ = ctx.skip();
    let listing: Vec<(Option<&str>, Option<&str>)> = ctx
        .commands()
        .iter()
        .map(|e: &CmdEntry<SerialEmulator>| (e.name(), e.help()))
        .collect();
    for (name, help) in listing {
        if let Some(name) = name {
            let _ = ctx.send_raw(name.as_bytes());
            if let Some(help) = help {
                let _ = ctx.send_raw(b" - ");
                let _ = ctx.send_raw(help.as_bytes());
            }
            let _ = ctx.send_eol();
        }
    }
    ctx.end_cmd();
    true
}

/// Multi-tick countdown: `after MS` answers MS milliseconds later. The
/// handler arms the timer and leaves the command in progress; the main loop
/// finishes it once the deadline passes.
struct After {
    due: Cell<Option<u32>>,
}

impl Runnable<SerialEmulator> for After {
    fn run(&self, ctx: &mut JigCtx) -> bool {
        match ctx.skip().and_then(|_| ctx.recv::<u32>()) {
            Ok(ms) => {
                self.due.set(Some(now_ms().wrapping_add(ms)));
                true
            }
            Err(_) => {
                ctx.end_cmd();
                false
            }
        }
    }
}

impl After {
    fn poll(&self, interp: &mut JigInterp) {
        if let Some(due) = self.due.get() {
            if (now_ms().wrapping_sub(due) as i32) >= 0 {
                self.due.set(None);
                let mut ctx = interp.context();
                let _ = ctx.send_str("done");
                ctx.end_cmd();
            }
        }
    }
}

/// Client side: every response frame lands here via the universal hook.
fn client_rx(ctx: &mut JigCtx) -> bool {
    match ctx.recv::<i32>() {
        Ok(v) => log::info!("add response: {v}"),
        Err(e) => log::warn!("unusable response: {e}"),
    }
    ctx.clear_error();
    ctx.end_cmd();
    true
}

fn register_commands(interp: &mut JigInterp, after: &'static After) {
    interp
        .add_fn(1, Some("ec"), ec, Some("ec S: echo S back"))
        .expect("register ec");
    interp
        .add_fn(2, Some("add"), add, Some("add A B: print A+B"))
        .expect("register add");
    interp
        .add_fn(3, Some("uptime"), uptime, Some("uptime: milliseconds since start"))
        .expect("register uptime");
    interp
        .add_fn(4, Some("help"), help, Some("help: list commands"))
        .expect("register help");
    interp
        .add_obj(5, Some("after"), after, Some("after MS: answer MS milliseconds later"))
        .expect("register after");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mode = env::var("JIG_MODE").unwrap_or_else(|_| "text".into());

    let serial = SerialEmulator::new();
    log::info!("serial jig at {} (JIG_MODE={mode})", serial.ttyname().display());

    let after: &'static After = Box::leak(Box::new(After {
        due: Cell::new(None),
    }));

    let mut interp = JigInterp::new(serial);
    interp.set_send_wait(SendWait::Polls(100));
    register_commands(&mut interp, after);

    match mode.as_str() {
        "binary" => {
            interp.set_mode(Mode::Binary);
        }
        "client" => {
            interp.set_mode(Mode::Binary);
            interp.set_universal_handler(Some(Handler::Func(client_rx)));
        }
        _ => {
            interp.set_echo(true);
            interp.set_prompt(Some("jig> "));
            interp.set_recv_timeout(Some(30_000));
            interp.set_error_handler(Some(Handler::Func(cmdplex::report_error_text)));
            interp.print_prompt();
        }
    }

    let mut last_request = now_ms();
    let mut counter: u32 = 0;
    loop {
        let now = now_ms();
        interp.update(now);
        after.poll(&mut interp);

        // client role: fire an add request once a second
        if mode == "client" && now.wrapping_sub(last_request) >= 1_000 {
            last_request = now;
            counter = counter.wrapping_add(1);
            let mut ctx = interp.context();
            let r = ctx
                .send(2u8)
                .and_then(|_| ctx.send(counter as i32))
                .and_then(|_| ctx.send(100i32))
                .and_then(|_| ctx.send_packet());
            match r {
                Ok(()) => log::debug!("sent add request {counter}"),
                Err(e) => {
                    log::warn!("could not send request: {e}");
                    ctx.clear_error();
                }
            }
        }

        if let Some(e) = interp.error() {
            log::debug!("latched error observed by jig: {e}");
            interp.clear_error();
        }

        thread::sleep(Duration::from_millis(1));
    }
}
