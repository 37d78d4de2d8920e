//! Per-connection byte buffer that reassembles newline-framed lines out of
//! arbitrarily-chunked TCP reads.

use crate::MAX_WIRE;

/// Holds the partial message not yet terminated by `\n` for one neighbor
/// stream. Overflow is tolerated, not fatal: a line that would exceed
/// [`MAX_WIRE`] has its oldest bytes discarded rather than aborting the
/// connection.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(MAX_WIRE),
        }
    }

    /// Appends freshly read bytes, discarding the oldest bytes first if the
    /// buffer would otherwise exceed [`MAX_WIRE`].
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);

        if self.buf.len() > MAX_WIRE {
            let overflow = self.buf.len() - MAX_WIRE;
            self.buf.drain(..overflow);
        }
    }

    /// Extracts and removes the next complete line (without its `\n`), if
    /// one is buffered. Call repeatedly after [`feed`](Self::feed): a single
    /// read can contain more than one line.
    pub fn next_line(&mut self) -> Option<String> {
        let newline_at = self.buf.iter().position(|&b| b == b'\n')?;
        let line = self.buf.drain(..=newline_at).collect::<Vec<u8>>();
        Some(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_one_line_per_call() {
        let mut buf = LineBuffer::new();
        buf.feed(b"ENTRY 1.0.0.2 5002\nSAFE 1.0.0.1 5001\n");

        assert_eq!(buf.next_line().as_deref(), Some("ENTRY 1.0.0.2 5002"));
        assert_eq!(buf.next_line().as_deref(), Some("SAFE 1.0.0.1 5001"));
        assert_eq!(buf.next_line(), None);
    }

    #[test]
    fn handles_a_line_split_across_two_reads() {
        let mut buf = LineBuffer::new();
        buf.feed(b"INTER");
        assert_eq!(buf.next_line(), None);

        buf.feed(b"EST photo\n");
        assert_eq!(buf.next_line().as_deref(), Some("INTEREST photo"));
    }

    #[test]
    fn overflow_discards_oldest_bytes_instead_of_failing() {
        let mut buf = LineBuffer::new();
        // One line, with no newline, far longer than MAX_WIRE.
        let junk = vec![b'x'; MAX_WIRE * 2];
        buf.feed(&junk);
        assert!(buf.buf.len() <= MAX_WIRE);

        // The buffer is still usable afterwards: the first line returned is
        // whatever garbage survived the trim, the next is a real message.
        buf.feed(b"\nOBJECT photo\n");
        assert!(buf.next_line().is_some());
        assert_eq!(buf.next_line().as_deref(), Some("OBJECT photo"));
    }
}
