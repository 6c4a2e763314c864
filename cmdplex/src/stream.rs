//! Byte stream contract between the interpreter and its transport.
//!
//! The interpreter drives exactly one duplex byte stream: a UART, a USB CDC
//! endpoint, a PTY on the host, or the in-memory [`FifoStream`] used by the
//! test suite. All calls are non-blocking; the only waiting the engine ever
//! does is a bounded spin on [`ByteStream::available_for_write`] with
//! [`ByteStream::idle`] called between polls.

/// Non-blocking duplex byte source/sink.
pub trait ByteStream {
    /// Number of bytes ready to be read.
    fn available(&mut self) -> usize;
    /// Read one byte, or `None` if nothing is pending.
    fn read(&mut self) -> Option<u8>;
    /// Look at the next byte without consuming it.
    fn peek(&mut self) -> Option<u8>;
    /// Number of bytes the stream can currently accept for transmission.
    fn available_for_write(&mut self) -> usize;
    /// Write one byte. Returns the number of bytes accepted (0 or 1).
    fn write(&mut self, byte: u8) -> usize;
    /// Called between polls while the engine waits for write space.
    ///
    /// Host implementations typically sleep around a millisecond here;
    /// bare-metal implementations can service their peripheral instead.
    fn idle(&mut self) {}
}

/// In-memory duplex stream backed by two flat FIFO arrays.
///
/// `RX` bytes of input capacity (filled with [`FifoStream::inject`]) and `TX`
/// bytes of output capture (inspected with [`FifoStream::sent`]). Used by the
/// unit and integration tests and by demo code; it gives the tests control
/// over flow: a full `TX` side makes `available_for_write` report zero, just
/// like a busy UART.
pub struct FifoStream<const RX: usize, const TX: usize> {
    rx_buf: [u8; RX],
    rx_used: usize,
    tx_buf: [u8; TX],
    tx_used: usize,
}

impl<const RX: usize, const TX: usize> FifoStream<RX, TX> {
    pub const fn new() -> Self {
        Self {
            rx_buf: [0u8; RX],
            rx_used: 0,
            tx_buf: [0u8; TX],
            tx_used: 0,
        }
    }

    /// Queue bytes on the receive side, as if they arrived from the wire.
    ///
    /// Bytes that do not fit are dropped, mirroring a UART whose hardware
    /// FIFO overruns.
    pub fn inject(&mut self, data: &[u8]) {
        let room = RX - self.rx_used;
        let n = data.len().min(room);
        if n < data.len() {
            log::warn!("FifoStream rx overrun, dropping {} bytes", data.len() - n);
        }
        self.rx_buf[self.rx_used..self.rx_used + n].copy_from_slice(&data[..n]);
        self.rx_used += n;
    }

    /// Everything written to the stream since the last [`Self::clear_sent`].
    pub fn sent(&self) -> &[u8] {
        &self.tx_buf[..self.tx_used]
    }

    /// Discard the captured output.
    pub fn clear_sent(&mut self) {
        self.tx_used = 0;
    }
}

impl<const RX: usize, const TX: usize> Default for FifoStream<RX, TX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const RX: usize, const TX: usize> ByteStream for FifoStream<RX, TX> {
    fn available(&mut self) -> usize {
        self.rx_used
    }

    fn read(&mut self) -> Option<u8> {
        if self.rx_used == 0 {
            return None;
        }
        let b = self.rx_buf[0];
        self.rx_buf.copy_within(1..self.rx_used, 0);
        self.rx_used -= 1;
        Some(b)
    }

    fn peek(&mut self) -> Option<u8> {
        if self.rx_used == 0 {
            None
        } else {
            Some(self.rx_buf[0])
        }
    }

    fn available_for_write(&mut self) -> usize {
        TX - self.tx_used
    }

    fn write(&mut self, byte: u8) -> usize {
        if self.tx_used == TX {
            return 0;
        }
        self.tx_buf[self.tx_used] = byte;
        self.tx_used += 1;
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_read_write_order() {
        let mut s: FifoStream<8, 8> = FifoStream::new();
        s.inject(b"abc");
        assert_eq!(s.available(), 3);
        assert_eq!(s.peek(), Some(b'a'));
        assert_eq!(s.read(), Some(b'a'));
        assert_eq!(s.read(), Some(b'b'));
        assert_eq!(s.read(), Some(b'c'));
        assert_eq!(s.read(), None);

        assert_eq!(s.write(b'x'), 1);
        assert_eq!(s.sent(), b"x");
        s.clear_sent();
        assert_eq!(s.sent(), b"");
    }

    #[test]
    fn fifo_write_backpressure() {
        let mut s: FifoStream<4, 2> = FifoStream::new();
        assert_eq!(s.available_for_write(), 2);
        assert_eq!(s.write(1), 1);
        assert_eq!(s.write(2), 1);
        assert_eq!(s.available_for_write(), 0);
        assert_eq!(s.write(3), 0);
        assert_eq!(s.sent(), &[1, 2]);
    }

    #[test]
    fn fifo_rx_overrun_drops() {
        let mut s: FifoStream<2, 2> = FifoStream::new();
        s.inject(b"abcd");
        assert_eq!(s.available(), 2);
        assert_eq!(s.read(), Some(b'a'));
        assert_eq!(s.read(), Some(b'b'));
    }
}
