//! Binary packet framing.
//!
//! Frame layout on the wire:
//!
//! ```text
//! +--------+------+-------------------+----------+
//! | length | code | payload           | checksum |
//! +--------+------+-------------------+----------+
//! ```
//!
//! `length` counts every byte of the frame, itself included; the minimum
//! valid frame is an empty-payload command of [`FRAME_OVERHEAD`] bytes. The
//! checksum is chosen so the unsigned byte-sum of the whole frame is zero mod
//! 256. Multi-byte payload values are little-endian.

use crate::interp::RxCore;
use crate::stream::ByteStream;
use crate::Error;

/// Frame bytes that are not payload: length, code and checksum.
pub const FRAME_OVERHEAD: usize = 3;

/// Unsigned byte-sum mod 256. Zero for a well-formed frame.
pub fn checksum(frame: &[u8]) -> u8 {
    frame.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Build a complete frame for `code` and `payload` into `out`.
///
/// Mostly useful to peers and tests; the interpreter's send path composes
/// frames incrementally through [`TxCore`] instead.
pub fn encode_frame<'a>(code: u8, payload: &[u8], out: &'a mut [u8]) -> Result<&'a [u8], Error> {
    let len = payload.len() + FRAME_OVERHEAD;
    if len > u8::MAX as usize || len > out.len() {
        return Err(Error::SendOverflow);
    }
    out[0] = len as u8;
    out[1] = code;
    out[2..2 + payload.len()].copy_from_slice(payload);
    out[len - 1] = checksum(&out[..len - 1]).wrapping_neg();
    Ok(&out[..len])
}

pub(crate) enum FrameEvent {
    Pending,
    Complete,
    BadFrame,
    Overflow,
}

/// Feed one received byte into the frame accumulator.
pub(crate) fn feed_binary(rx: &mut RxCore, buf: &mut [u8], b: u8) -> FrameEvent {
    if rx.len == 0 {
        let declared = b as usize;
        if declared < FRAME_OVERHEAD {
            log::debug!("runt frame, declared length {}", declared);
            return FrameEvent::BadFrame;
        }
        if declared > buf.len() {
            return FrameEvent::Overflow;
        }
        buf[0] = b;
        rx.len = 1;
        return FrameEvent::Pending;
    }
    buf[rx.len] = b;
    rx.len += 1;
    if rx.len < buf[0] as usize {
        return FrameEvent::Pending;
    }
    if checksum(&buf[..rx.len]) != 0 {
        log::debug!("frame checksum mismatch");
        FrameEvent::BadFrame
    } else {
        FrameEvent::Complete
    }
}

/// Send-side packet state: compose cursor, drain cursor and the text-mode
/// separator flag.
///
/// The first buffer byte is reserved for the length, the byte after the last
/// payload byte for the checksum. Compose (`active`) and drain (`draining`)
/// are mutually exclusive phases; the write cursor only re-enables once a
/// finalized packet has been fully flushed.
pub(crate) struct TxCore {
    pub active: bool,
    pub widx: usize,
    pub ridx: usize,
    pub rlen: usize,
    pub draining: bool,
    pub sep_pending: bool,
}

impl TxCore {
    pub const fn new() -> Self {
        Self {
            active: false,
            widx: 1,
            ridx: 0,
            rlen: 0,
            draining: false,
            sep_pending: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Append one byte to the packet body, starting a packet if necessary.
    pub fn push(&mut self, buf: &mut [u8], b: u8) -> Result<(), Error> {
        debug_assert!(!self.draining);
        if !self.active {
            self.active = true;
            self.widx = 1;
        }
        // Keep room for the trailing checksum, and fit the length in a u8.
        if self.widx + 1 >= buf.len() || self.widx + 1 >= u8::MAX as usize {
            return Err(Error::SendOverflow);
        }
        buf[self.widx] = b;
        self.widx += 1;
        Ok(())
    }

    /// Stamp length and checksum and flip the buffer to the drain phase.
    ///
    /// Returns `false` when nothing was written: an empty packet is silently
    /// discarded, not sent.
    pub fn finalize(&mut self, buf: &mut [u8]) -> bool {
        if !self.active || self.widx <= 1 {
            self.active = false;
            self.widx = 1;
            return false;
        }
        buf[0] = (self.widx + 1) as u8;
        buf[self.widx] = checksum(&buf[..self.widx]).wrapping_neg();
        self.rlen = self.widx + 1;
        self.ridx = 0;
        self.active = false;
        self.draining = true;
        self.widx = 1;
        true
    }

    /// Push drained bytes to the stream without blocking.
    ///
    /// Returns `true` once the packet is fully flushed.
    pub fn drain<S: ByteStream>(&mut self, buf: &[u8], stream: &mut S) -> bool {
        while self.draining && self.ridx < self.rlen {
            if stream.available_for_write() == 0 || stream.write(buf[self.ridx]) == 0 {
                return false;
            }
            self.ridx += 1;
        }
        self.draining = false;
        self.ridx = 0;
        self.rlen = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FifoStream;

    fn feed_all(frame: &[u8]) -> (RxCore, [u8; 64], Option<bool>) {
        let mut rx = RxCore::new();
        let mut buf = [0u8; 64];
        let mut outcome = None;
        for &b in frame {
            match feed_binary(&mut rx, &mut buf, b) {
                FrameEvent::Pending => {}
                FrameEvent::Complete => {
                    outcome = Some(true);
                    break;
                }
                FrameEvent::BadFrame | FrameEvent::Overflow => {
                    outcome = Some(false);
                    break;
                }
            }
        }
        (rx, buf, outcome)
    }

    #[test]
    fn whole_frame_sums_to_zero() {
        let mut out = [0u8; 16];
        let frame = encode_frame(5, &1000u32.to_le_bytes(), &mut out).unwrap();
        assert_eq!(frame.len(), 7);
        assert_eq!(frame[0], 7);
        assert_eq!(frame[1], 5);
        assert_eq!(checksum(frame), 0);
    }

    #[test]
    fn receive_round_trip() {
        let mut out = [0u8; 16];
        let frame = encode_frame(9, b"hi", &mut out).unwrap();
        let (rx, buf, outcome) = feed_all(frame);
        assert_eq!(outcome, Some(true));
        assert_eq!(&buf[..rx.len], frame);
    }

    #[test]
    fn single_bit_flip_fails_checksum() {
        let mut out = [0u8; 16];
        let frame = encode_frame(5, &1000u32.to_le_bytes(), &mut out).unwrap();
        for byte in 1..frame.len() - 1 {
            for bit in 0..8 {
                let mut bad = [0u8; 16];
                bad[..frame.len()].copy_from_slice(frame);
                bad[byte] ^= 1 << bit;
                let (_, _, outcome) = feed_all(&bad[..frame.len()]);
                assert_eq!(outcome, Some(false), "flip {}:{} slipped through", byte, bit);
            }
        }
    }

    #[test]
    fn runt_length_rejected() {
        let (_, _, outcome) = feed_all(&[2]);
        assert_eq!(outcome, Some(false));
    }

    #[test]
    fn oversize_length_overflows() {
        let mut rx = RxCore::new();
        let mut buf = [0u8; 8];
        assert!(matches!(
            feed_binary(&mut rx, &mut buf, 200),
            FrameEvent::Overflow
        ));
    }

    #[test]
    fn compose_finalize_drain() {
        let mut tx = TxCore::new();
        let mut buf = [0u8; 16];
        for b in [5, 0xE8, 0x03, 0, 0] {
            tx.push(&mut buf, b).unwrap();
        }
        assert!(tx.finalize(&mut buf));
        assert!(tx.draining);
        let mut s: FifoStream<4, 32> = FifoStream::new();
        assert!(tx.drain(&buf, &mut s));
        assert_eq!(s.sent()[0], 7);
        assert_eq!(checksum(s.sent()), 0);
        assert!(!tx.draining);
    }

    #[test]
    fn empty_packet_discarded() {
        let mut tx = TxCore::new();
        let mut buf = [0u8; 16];
        assert!(!tx.finalize(&mut buf));
        assert!(!tx.draining);
    }

    #[test]
    fn drain_respects_backpressure() {
        let mut tx = TxCore::new();
        let mut buf = [0u8; 16];
        tx.push(&mut buf, 1).unwrap();
        tx.push(&mut buf, 2).unwrap();
        assert!(tx.finalize(&mut buf));
        let mut s: FifoStream<4, 2> = FifoStream::new();
        assert!(!tx.drain(&buf, &mut s)); // only two bytes fit
        assert_eq!(s.sent().len(), 2);
        s.clear_sent();
        // pretend the transmit buffer emptied out; rest follows
        let mut s2: FifoStream<4, 32> = FifoStream::new();
        assert!(tx.drain(&buf, &mut s2));
        assert_eq!(s.sent().len() + s2.sent().len(), 2);
    }

    #[test]
    fn push_overflow() {
        let mut tx = TxCore::new();
        let mut buf = [0u8; 4];
        tx.push(&mut buf, 1).unwrap();
        tx.push(&mut buf, 2).unwrap();
        assert_eq!(tx.push(&mut buf, 3), Err(Error::SendOverflow));
    }

    #[test]
    fn length_byte_reaches_cap_exactly() {
        let mut tx = TxCore::new();
        let mut buf = [0u8; 300];
        // 253 payload bytes finalize to the maximum frame length of 255
        for i in 0..253u16 {
            tx.push(&mut buf, i as u8).unwrap();
        }
        assert_eq!(tx.push(&mut buf, 0xFF), Err(Error::SendOverflow));
        assert!(tx.finalize(&mut buf));
        assert_eq!(buf[0], 255);
        assert_eq!(checksum(&buf[..255]), 0);
    }
}
