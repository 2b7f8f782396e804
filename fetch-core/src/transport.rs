/// Serial channel to the modem
/// Implementors only move bytes; all waiting and interpretation lives in the callers

use core::fmt;

use crate::clock::{poll_until, Clock};

/// Longest response line kept; longer lines are truncated
pub const MAX_LINE_LEN: usize = 256;

pub type Line = heapless::String<MAX_LINE_LEN>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    WriteFailed(String),
    ShortWrite { written: usize, expected: usize },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::WriteFailed(reason) => write!(f, "serial write failed: {}", reason),
            TransportError::ShortWrite { written, expected } => {
                write!(f, "serial write truncated: {}/{} bytes", written, expected)
            }
        }
    }
}

impl std::error::Error for TransportError {}

pub trait Transport {
    /// Queue bytes for transmission
    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Bytes that can be read right now without waiting
    fn available(&mut self) -> usize;

    /// Non-blocking read of up to `buf.len()` bytes; returns the count read
    fn read_available(&mut self, buf: &mut [u8]) -> usize;

    fn write_line(&mut self, text: &str) -> Result<(), TransportError> {
        self.write_raw(text.as_bytes())?;
        self.write_raw(b"\r\n")
    }

    /// Collect bytes until a newline or the timeout; returns whatever arrived.
    ///
    /// Reads one byte at a time so binary data following the line stays queued.
    /// The trailing CR/LF is stripped.
    fn read_line_within(&mut self, clock: &dyn Clock, timeout_ms: u64) -> Line {
        let mut line = Line::new();
        let mut byte = [0u8; 1];
        let _ = poll_until(clock, timeout_ms, || {
            while self.available() > 0 {
                if self.read_available(&mut byte) == 0 {
                    break;
                }
                match byte[0] {
                    b'\n' => return Some(()),
                    b'\r' => {}
                    other => {
                        // Overlong lines are truncated; the marker we care about is at the start
                        let _ = line.push(other as char);
                    }
                }
            }
            None
        });
        line
    }

    /// Read until `buf` is full or the timeout elapses; returns the count read
    fn read_exactly(&mut self, clock: &dyn Clock, buf: &mut [u8], timeout_ms: u64) -> usize {
        let mut filled = 0;
        let _ = poll_until(clock, timeout_ms, || {
            if filled < buf.len() && self.available() > 0 {
                filled += self.read_available(&mut buf[filled..]);
            }
            (filled == buf.len()).then_some(())
        });
        filled
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write_raw(bytes)
    }

    fn available(&mut self) -> usize {
        (**self).available()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        (**self).read_available(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeModem, ManualClock, ModemScript};

    fn idle_modem(clock: &ManualClock) -> FakeModem {
        FakeModem::new(clock.clone(), ModemScript::default())
    }

    #[test]
    fn test_line_read_strips_terminators() {
        let clock = ManualClock::new();
        let mut modem = idle_modem(&clock);
        modem.inject(b"\r\n+QHTTPGET: 0,200,12\r\nOK\r\n");
        assert_eq!(modem.read_line_within(&clock, 100).as_str(), "");
        assert_eq!(modem.read_line_within(&clock, 100).as_str(), "+QHTTPGET: 0,200,12");
        assert_eq!(modem.read_line_within(&clock, 100).as_str(), "OK");
    }

    #[test]
    fn test_line_read_leaves_binary_tail_queued() {
        let clock = ManualClock::new();
        let mut modem = idle_modem(&clock);
        modem.inject(b"CONNECT\r\n\x00\x01\x02");
        assert_eq!(modem.read_line_within(&clock, 100).as_str(), "CONNECT");
        assert_eq!(modem.available(), 3);
    }

    #[test]
    fn test_partial_line_returned_on_timeout() {
        let clock = ManualClock::new();
        let mut modem = idle_modem(&clock);
        modem.inject(b"+QHTT");
        assert_eq!(modem.read_line_within(&clock, 50).as_str(), "+QHTT");
        assert!(clock.now_ms() >= 50);
    }

    #[test]
    fn test_overlong_line_is_truncated() {
        let clock = ManualClock::new();
        let mut modem = idle_modem(&clock);
        let long = vec![b'x'; MAX_LINE_LEN * 2];
        modem.inject(&long);
        modem.inject(b"\n");
        assert_eq!(modem.read_line_within(&clock, 100).len(), MAX_LINE_LEN);
    }

    #[test]
    fn test_read_exactly_reports_short_count() {
        let clock = ManualClock::new();
        let mut modem = idle_modem(&clock);
        modem.inject(&[7u8; 10]);
        let mut buf = [0u8; 16];
        assert_eq!(modem.read_exactly(&clock, &mut buf, 20), 10);
        assert_eq!(&buf[..10], &[7u8; 10]);
    }
}
