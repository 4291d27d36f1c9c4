//! The ciphertext buffer (SPEC_FULL.md §4.3): an unbounded FIFO of bytes
//! with a soft capacity used only as a back-pressure hint.

use std::collections::VecDeque;
use std::io;

/// Default soft cap in bytes, used when a [`crate::config::ChannelConfig`]
/// doesn't override it.
pub const DEFAULT_SOFT_CAP: usize = 4096;

/// FIFO byte buffer mediating between the synchronous TLS engine and the
/// asynchronous transport.
///
/// Writes never fail: the soft cap is advisory. A single write may push
/// `used_space` past `soft_cap`; `available_space` will then report zero
/// and callers are expected to stop enqueuing until it recovers, but
/// nothing in this type enforces that — it is the engine's job (see
/// `crate::channel`).
#[derive(Debug, Default)]
pub struct CiphertextBuffer {
    data: VecDeque<u8>,
    soft_cap: usize,
}

impl CiphertextBuffer {
    /// Create an empty buffer with the given soft cap.
    pub fn new(soft_cap: usize) -> Self {
        Self {
            data: VecDeque::new(),
            soft_cap,
        }
    }

    /// Bytes currently buffered.
    pub fn used_space(&self) -> usize {
        self.data.len()
    }

    /// The configured soft cap.
    pub fn soft_cap(&self) -> usize {
        self.soft_cap
    }

    /// `max(0, soft_cap - used_space)`.
    pub fn available_space(&self) -> usize {
        self.soft_cap.saturating_sub(self.used_space())
    }

    /// True if no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a batch of bytes. Always succeeds in full.
    pub fn write_all(&mut self, bytes: &[u8]) {
        self.data.extend(bytes);
    }

    /// Read up to `max` bytes (or all buffered bytes, if `max` is `None`).
    /// Returns `None` if the buffer is empty, `Some(bytes)` otherwise
    /// (never an empty `Vec` — an empty buffer always returns `None`).
    pub fn read(&mut self, max: Option<usize>) -> Option<Vec<u8>> {
        if self.data.is_empty() {
            return None;
        }
        let n = max.unwrap_or(self.data.len()).min(self.data.len());
        Some(self.data.drain(..n).collect())
    }

    /// Reserve `n` bytes of scratch space at the tail of the buffer and
    /// return it as a contiguous mutable slice, for APIs (like Rustls's
    /// unbuffered connection) that encode directly into caller-supplied
    /// space rather than through `io::Write`. Pair with [`Self::commit`]
    /// to shrink back to the bytes actually used.
    ///
    /// Mirrors the `space`/`commit` idiom the teacher crate uses via
    /// `pipebuf`'s `PBufRdWr::wr.space()`/`.commit()`.
    pub fn reserve(&mut self, n: usize) -> &mut [u8] {
        let start = self.data.len();
        self.data.resize(start + n, 0);
        &mut self.data.make_contiguous()[start..start + n]
    }

    /// Shrink a [`Self::reserve`]d region from `reserved_len` down to
    /// `actual_len` bytes actually used, dropping the unused tail.
    pub fn commit(&mut self, reserved_len: usize, actual_len: usize) {
        debug_assert!(actual_len <= reserved_len);
        for _ in 0..(reserved_len - actual_len) {
            self.data.pop_back();
        }
    }

    /// A contiguous mutable view of every byte currently buffered, for
    /// APIs that need to scan the whole pending ingress in one call (as
    /// Rustls's unbuffered `process_tls_records` does).
    #[cfg_attr(not(feature = "unbuffered"), allow(dead_code))]
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.make_contiguous()
    }

    /// Discard the first `n` bytes (already processed by the caller).
    #[cfg_attr(not(feature = "unbuffered"), allow(dead_code))]
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.data.len());
        self.data.drain(..n);
    }
}

/// Lets Rustls's `read_tls`/`process_tls_records`-style calls pull bytes
/// straight out of the ingress buffer, the same role `PBufRdWr`'s read side
/// plays for the teacher crate's `sc.read_tls(&mut ext.rd)` call sites.
impl io::Read for CiphertextBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.data.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.data.pop_front().expect("checked length above");
        }
        Ok(n)
    }
}

/// Lets Rustls's `write_tls` push bytes straight into the egress buffer,
/// the same role `PBufRdWr`'s write side plays for the teacher crate's
/// `sc.write_tls(&mut ext.wr)` call sites. Never fails or blocks: the soft
/// cap is a hint, not an enforced limit.
impl io::Write for CiphertextBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_all(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn available_space_tracks_soft_cap() {
        let mut buf = CiphertextBuffer::new(10);
        assert_eq!(buf.available_space(), 10);
        buf.write_all(&[0u8; 4]);
        assert_eq!(buf.used_space(), 4);
        assert_eq!(buf.available_space(), 6);
    }

    #[test]
    fn a_single_write_may_exceed_soft_cap() {
        let mut buf = CiphertextBuffer::new(4);
        buf.write_all(&[0u8; 10]);
        assert_eq!(buf.used_space(), 10);
        assert_eq!(buf.available_space(), 0);
    }

    #[test]
    fn read_returns_none_when_empty() {
        let mut buf = CiphertextBuffer::new(16);
        assert!(buf.read(None).is_none());
        assert!(buf.read(Some(4)).is_none());
    }

    #[test]
    fn read_respects_max_and_drains_fifo_order() {
        let mut buf = CiphertextBuffer::new(16);
        buf.write_all(b"hello world");
        let first = buf.read(Some(5)).unwrap();
        assert_eq!(&first, b"hello");
        let rest = buf.read(None).unwrap();
        assert_eq!(&rest, b" world");
        assert!(buf.read(None).is_none());
    }

    #[test]
    fn io_read_and_write_round_trip() {
        let mut buf = CiphertextBuffer::new(16);
        buf.write(b"abcdef").unwrap();
        let mut out = [0u8; 3];
        let n = Read::read(&mut buf, &mut out).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&out, b"abc");
        assert_eq!(buf.used_space(), 3);
    }
}
