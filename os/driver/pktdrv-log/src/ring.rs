use core::fmt;

/// Size of the resident log buffer.
pub const LOG_RING_BYTES: usize = 8 * 1024;

/// Byte ring that keeps the most recent [`LOG_RING_BYTES`] bytes written.
pub struct LogRing {
    buf: [u8; LOG_RING_BYTES],
    /// Next write position.
    head: usize,
    /// Valid bytes, at most `LOG_RING_BYTES`.
    len: usize,
    /// Total bytes ever written, including overwritten ones.
    written: u64,
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}

impl LogRing {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [0; LOG_RING_BYTES],
            head: 0,
            len: 0,
            written: 0,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.buf[self.head] = b;
            self.head = (self.head + 1) % LOG_RING_BYTES;
        }
        self.len = (self.len + bytes.len()).min(LOG_RING_BYTES);
        self.written += bytes.len() as u64;
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes lost to wrap-around so far.
    #[must_use]
    pub const fn overwritten(&self) -> u64 {
        self.written - self.len as u64
    }

    /// Copies the newest `min(len, out.len())` bytes into `out`, oldest first.
    pub fn copy_to(&self, out: &mut [u8]) -> usize {
        let n = self.len.min(out.len());
        let start = (self.head + LOG_RING_BYTES - n) % LOG_RING_BYTES;
        for (i, slot) in out.iter_mut().take(n).enumerate() {
            *slot = self.buf[(start + i) % LOG_RING_BYTES];
        }
        n
    }

    pub const fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
        self.written = 0;
    }
}

impl fmt::Write for LogRing {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push(s.as_bytes());
        Ok(())
    }
}
