//! Growable read buffer with terminator search

use crate::{
    constants::{BUF_CHUNK, MAX_BUFFER_SIZE},
    error::{AmiError, AmiResult},
};

/// Bytes received from the socket but not yet consumed by the parser.
#[derive(Debug)]
pub(crate) struct AmiBuffer {
    data: Vec<u8>,
    /// Start of unconsumed data.
    pos: usize,
    /// Offset (relative to `pos`) before which no terminator can start.
    scanned: usize,
}

impl AmiBuffer {
    pub(crate) fn new() -> Self {
        Self {
            data: Vec::with_capacity(BUF_CHUNK),
            pos: 0,
            scanned: 0,
        }
    }

    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data
            .extend_from_slice(bytes);
    }

    /// Unconsumed byte count.
    pub(crate) fn len(&self) -> usize {
        self.data
            .len()
            - self.pos
    }

    pub(crate) fn check_size_limits(&self) -> AmiResult<()> {
        if self.len() > MAX_BUFFER_SIZE {
            return Err(AmiError::protocol_error(format!(
                "read buffer holds {} bytes without a complete block (limit {})",
                self.len(),
                MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }

    /// Offset of `pattern` in the unconsumed data.
    pub(crate) fn find(&mut self, pattern: &[u8]) -> Option<usize> {
        let window = &self.data[self.pos..];
        let start = self
            .scanned
            .min(window.len());
        let found = window[start..]
            .windows(pattern.len())
            .position(|w| w == pattern)
            .map(|i| start + i);
        if found.is_none() {
            // A terminator split across reads may begin in the last few bytes.
            self.scanned = window
                .len()
                .saturating_sub(pattern.len() - 1);
        }
        found
    }

    /// Consume and return everything before `pattern`, dropping the pattern itself.
    pub(crate) fn extract_until_pattern(&mut self, pattern: &[u8]) -> Option<Vec<u8>> {
        let offset = self.find(pattern)?;
        let start = self.pos;
        let out = self.data[start..start + offset].to_vec();
        self.pos = start + offset + pattern.len();
        self.scanned = 0;
        Some(out)
    }

    /// Release consumed bytes once they dominate the allocation.
    pub(crate) fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        let total = self
            .data
            .len();
        if self.pos == total {
            self.data
                .clear();
            self.pos = 0;
        } else if self.pos >= BUF_CHUNK || self.pos >= total / 2 {
            self.data
                .drain(..self.pos);
            self.pos = 0;
        }
    }
}
