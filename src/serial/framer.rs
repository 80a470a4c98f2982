//! Splits the inbound byte stream into text lines.
//!
//! Bytes accumulate until a `\n` arrives. A trailing `\r` and surrounding
//! whitespace are stripped and the bytes are decoded as UTF-8, replacing
//! invalid sequences. A line longer than [`MAX_LINE_LENGTH`] is dropped up to
//! and including its terminator, whether or not the terminator has arrived.

use bytes::BytesMut;
use tracing::warn;

/// Longest line kept before it is treated as noise
pub const MAX_LINE_LENGTH: usize = 256;

const LINE_DELIMITER: u8 = b'\n';

#[derive(Debug, Default)]
pub struct LineFramer {
    buf: BytesMut,
    /// Dropping bytes until the next delimiter
    discarding: bool,
    overflows: u64,
}

impl LineFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue freshly read bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next complete line, if one is buffered
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == LINE_DELIMITER) else {
                if self.buf.len() > MAX_LINE_LENGTH {
                    if !self.discarding {
                        self.overflows += 1;
                        warn!("Dropping {} bytes without a line terminator", self.buf.len());
                    }
                    self.buf.clear();
                    self.discarding = true;
                }
                return None;
            };

            let raw = self.buf.split_to(pos + 1);
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if pos > MAX_LINE_LENGTH {
                self.overflows += 1;
                warn!("Dropping {} byte line over the length limit", pos);
                continue;
            }

            let text = String::from_utf8_lossy(&raw[..pos]);
            return Some(text.trim().to_string());
        }
    }

    /// Over-long lines dropped since the last call
    pub fn take_overflows(&mut self) -> u64 {
        std::mem::take(&mut self.overflows)
    }

    /// Forget buffered bytes
    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}
