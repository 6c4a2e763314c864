//! Text-mode receive path: line editing and in-place tokenization.
//!
//! Bytes arrive one at a time from the interpreter pump. The line editor
//! handles echo, backspace/DEL erase and a minimal VT100 recognizer
//! (`ESC [ A/B/C/D` is consumed without being buffered; up-arrow recalls the
//! one-entry history kept in the upper half of the receive buffer). Once a
//! terminator arrives, [`tokenize`] rewrites the raw line in place into
//! null-separated tokens: quotes collapse to separators, escapes shrink to
//! their byte value, and `#` truncates the rest of the line.

use crate::interp::RxCore;
use crate::stream::ByteStream;
use crate::Error;

/// Minimal VT100 escape recognizer state.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub(crate) enum Esc {
    #[default]
    None,
    Esc,
    Csi,
}

pub(crate) enum LineEvent {
    Pending,
    Complete,
    Overflow,
}

/// Feed one received byte into the line editor.
pub(crate) fn feed_text<S: ByteStream>(
    rx: &mut RxCore,
    buf: &mut [u8],
    stream: &mut S,
    echo: bool,
    b: u8,
) -> LineEvent {
    match rx.esc {
        Esc::None => {}
        Esc::Esc => {
            rx.esc = if b == b'[' { Esc::Csi } else { Esc::None };
            return LineEvent::Pending;
        }
        Esc::Csi => {
            if b == b'A' {
                recall_history(rx, buf, stream, echo);
            }
            // B/C/D (and anything else) are consumed without buffering
            rx.esc = Esc::None;
            return LineEvent::Pending;
        }
    }
    match b {
        0x1B => {
            rx.esc = Esc::Esc;
            LineEvent::Pending
        }
        b'\r' | b'\n' => {
            if echo {
                emit(stream, b"\r\n");
            }
            LineEvent::Complete
        }
        0x08 | 0x7F => {
            if rx.len > 0 {
                rx.len -= 1;
                if echo {
                    // cursor left, erase, cursor left
                    emit(stream, b"\x08 \x08");
                }
            }
            LineEvent::Pending
        }
        0x20..=0x7E => {
            if rx.len >= buf.len() {
                return LineEvent::Overflow;
            }
            buf[rx.len] = b;
            rx.len += 1;
            if echo {
                emit(stream, &[b]);
            }
            LineEvent::Pending
        }
        _ => LineEvent::Pending,
    }
}

/// Save the raw line into the upper half of the buffer, if it fits there.
pub(crate) fn save_history(rx: &mut RxCore, buf: &mut [u8]) {
    let half = buf.len() / 2;
    if rx.len > 0 && rx.len <= buf.len() - half {
        buf.copy_within(0..rx.len, half);
        rx.hist_len = rx.len;
    }
}

fn recall_history<S: ByteStream>(rx: &mut RxCore, buf: &mut [u8], stream: &mut S, echo: bool) {
    if rx.hist_len == 0 {
        return;
    }
    if echo {
        for _ in 0..rx.len {
            emit(stream, b"\x08 \x08");
        }
    }
    let half = buf.len() / 2;
    buf.copy_within(half..half + rx.hist_len, 0);
    rx.len = rx.hist_len;
    if echo {
        for i in 0..rx.len {
            emit(stream, &buf[i..i + 1]);
        }
    }
}

fn emit<S: ByteStream>(stream: &mut S, bytes: &[u8]) {
    // Echo is best effort, a full transmit buffer just drops it.
    for &b in bytes {
        stream.write(b);
    }
}

/// Rewrite the raw line into null-separated tokens, in place.
///
/// Returns `(argument_count, token_region_length)`. Quote delimiters and
/// unquoted whitespace collapse to null bytes; escape sequences inside quotes
/// shrink to their value; a `#` outside quotes drops the rest of the line.
/// The region past the tokens is zero padded. An unterminated quote or a bad
/// escape is a [`Error::ParseErr`].
pub(crate) fn tokenize(buf: &mut [u8], len: usize) -> Result<(usize, usize), Error> {
    let mut w = 0;
    let mut r = 0;
    let mut quote: u8 = 0;
    while r < len {
        let c = buf[r];
        if quote == 0 {
            match c {
                b'#' => break,
                b'\'' | b'"' => {
                    quote = c;
                    buf[w] = 0;
                    w += 1;
                }
                b' ' | b'\t' => {
                    buf[w] = 0;
                    w += 1;
                }
                _ => {
                    buf[w] = c;
                    w += 1;
                }
            }
        } else if c == quote {
            quote = 0;
            buf[w] = 0;
            w += 1;
        } else if c == b'\\' {
            r += 1;
            if r >= len {
                return Err(Error::ParseErr);
            }
            match unescape(buf[r]) {
                Some(e) => {
                    buf[w] = e;
                    w += 1;
                }
                None => return Err(Error::ParseErr),
            }
        } else {
            buf[w] = c;
            w += 1;
        }
        r += 1;
    }
    if quote != 0 {
        return Err(Error::ParseErr);
    }
    for i in w..len {
        buf[i] = 0;
    }
    let mut argc = 0;
    let mut in_tok = false;
    for &c in &buf[..w] {
        if c != 0 && !in_tok {
            argc += 1;
            in_tok = true;
        } else if c == 0 {
            in_tok = false;
        }
    }
    Ok((argc, w))
}

/// Advance `cursor` to the next token in a tokenized region.
pub(crate) fn next_token(buf: &[u8], len: usize, cursor: &mut usize) -> Option<(usize, usize)> {
    let mut i = *cursor;
    while i < len && buf[i] == 0 {
        i += 1;
    }
    if i >= len {
        *cursor = i;
        return None;
    }
    let start = i;
    while i < len && buf[i] != 0 {
        i += 1;
    }
    *cursor = i;
    Some((start, i))
}

fn unescape(c: u8) -> Option<u8> {
    Some(match c {
        b'n' => 0x0A,
        b'r' => 0x0D,
        b't' => 0x09,
        b'b' => 0x08,
        b'f' => 0x0C,
        b'a' => 0x07,
        b'v' => 0x0B,
        b'e' => 0x1B, // nonstandard: ESC
        b'd' => 0x7F, // nonstandard: DEL
        b'\'' | b'"' | b'\\' => c,
        _ => return None,
    })
}

/// Escape code for a byte that cannot appear bare inside quotes, if any.
pub(crate) fn escape_code(b: u8) -> Option<u8> {
    Some(match b {
        0x0A => b'n',
        0x0D => b'r',
        0x09 => b't',
        0x08 => b'b',
        0x0C => b'f',
        0x07 => b'a',
        0x0B => b'v',
        0x1B => b'e',
        0x7F => b'd',
        b'\'' | b'"' | b'\\' => b,
        _ => return None,
    })
}

/// Does a value need quoting when cooked onto the text wire?
pub(crate) fn needs_quoting(bytes: &[u8]) -> bool {
    bytes.is_empty()
        || bytes
            .iter()
            .any(|&b| matches!(b, b' ' | b'\t' | b'\'' | b'"' | b'\\' | b'#') || !(0x20..=0x7E).contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FifoStream;

    fn tokens(buf: &[u8], len: usize) -> std::vec::Vec<std::string::String> {
        let mut out = std::vec::Vec::new();
        let mut cursor = 0;
        while let Some((a, b)) = next_token(buf, len, &mut cursor) {
            out.push(core::str::from_utf8(&buf[a..b]).unwrap().to_string());
        }
        out
    }

    fn run(line: &str) -> Result<std::vec::Vec<std::string::String>, Error> {
        let mut buf = [0u8; 64];
        buf[..line.len()].copy_from_slice(line.as_bytes());
        let (argc, used) = tokenize(&mut buf, line.len())?;
        let toks = tokens(&buf, used);
        assert_eq!(argc, toks.len());
        Ok(toks)
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(run("ec X").unwrap(), ["ec", "X"]);
        assert_eq!(run("  a \t b  ").unwrap(), ["a", "b"]);
        assert_eq!(run("").unwrap(), [""; 0]);
        assert_eq!(run("   ").unwrap(), [""; 0]);
    }

    #[test]
    fn quoting_and_escapes() {
        assert_eq!(run(r#"say "hello there" 'x'"#).unwrap(), ["say", "hello there", "x"]);
        assert_eq!(run(r#"say "a\tb\\c\"d""#).unwrap(), ["say", "a\tb\\c\"d"]);
        assert_eq!(run(r#"put '\e' '\d'"#).unwrap(), ["put", "\x1b", "\x7f"]);
        // '#' inside quotes is literal
        assert_eq!(run(r##"say "# not a comment""##).unwrap(), ["say", "# not a comment"]);
    }

    #[test]
    fn comments() {
        assert_eq!(run("a b # the rest is gone").unwrap(), ["a", "b"]);
        assert_eq!(run("# whole line").unwrap(), [""; 0]);
    }

    #[test]
    fn parse_errors() {
        assert_eq!(run(r#"say "unterminated"#), Err(Error::ParseErr));
        assert_eq!(run(r#"say 'u"#), Err(Error::ParseErr));
        assert_eq!(run(r#"say "bad \q escape""#), Err(Error::ParseErr));
        assert_eq!(run(r#"say "dangling \"#), Err(Error::ParseErr));
    }

    #[test]
    fn backspace_edits_line() {
        let mut rx = RxCore::new();
        let mut buf = [0u8; 32];
        let mut s: FifoStream<8, 64> = FifoStream::new();
        for &b in b"ecq\x08 X\r" {
            match feed_text(&mut rx, &mut buf, &mut s, true, b) {
                LineEvent::Complete => break,
                LineEvent::Pending => {}
                LineEvent::Overflow => panic!("overflow"),
            }
        }
        assert_eq!(&buf[..rx.len], b"ec X");
        // echo stream saw the erase sequence
        assert!(s.sent().windows(3).any(|w| w == b"\x08 \x08"));
    }

    #[test]
    fn arrow_keys_not_buffered() {
        let mut rx = RxCore::new();
        let mut buf = [0u8; 32];
        let mut s: FifoStream<8, 8> = FifoStream::new();
        for &b in b"a\x1b[Cb\x1b[Db" {
            feed_text(&mut rx, &mut buf, &mut s, false, b);
        }
        assert_eq!(&buf[..rx.len], b"abb");
    }

    #[test]
    fn history_recall() {
        let mut rx = RxCore::new();
        let mut buf = [0u8; 32];
        let mut s: FifoStream<8, 64> = FifoStream::new();
        for &b in b"ping" {
            feed_text(&mut rx, &mut buf, &mut s, false, b);
        }
        save_history(&mut rx, &mut buf);
        rx.len = 0;
        // up arrow recalls the previous line
        for &b in b"\x1b[A" {
            feed_text(&mut rx, &mut buf, &mut s, false, b);
        }
        assert_eq!(&buf[..rx.len], b"ping");
    }

    #[test]
    fn history_saves_line_filling_the_slot() {
        let mut rx = RxCore::new();
        let mut buf = [0u8; 32];
        let mut s: FifoStream<8, 64> = FifoStream::new();
        // 16 bytes fill the upper-half history slot exactly
        for &b in b"0123456789abcdef" {
            feed_text(&mut rx, &mut buf, &mut s, false, b);
        }
        assert_eq!(rx.len, 16);
        save_history(&mut rx, &mut buf);
        rx.len = 0;
        for &b in b"\x1b[A" {
            feed_text(&mut rx, &mut buf, &mut s, false, b);
        }
        assert_eq!(&buf[..rx.len], b"0123456789abcdef");
    }

    #[test]
    fn cooking_predicates() {
        assert!(!needs_quoting(b"plain"));
        assert!(needs_quoting(b"two words"));
        assert!(needs_quoting(b"say\"it"));
        assert!(needs_quoting(b""));
        assert_eq!(escape_code(0x0A), Some(b'n'));
        assert_eq!(escape_code(b'x'), None);
    }
}
