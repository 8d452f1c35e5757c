//! Save-state byte stream primitives.
//!
//! Every component contributes its own slice to a single flat buffer through
//! [`StateWriter`], and reads it back through [`StateReader`] in the exact
//! same field order. The encode/decode order is a binary contract: reordering
//! fields breaks save-state compatibility.

use thiserror::Error;

/// Error decoding a save-state stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    /// The stream ended before a field could be read.
    #[error("save state truncated at offset {offset}: wanted {wanted} more byte(s)")]
    UnexpectedEof { offset: usize, wanted: usize },
}

/// Append-only state buffer with typed little-endian put primitives.
#[derive(Debug, Default)]
pub struct StateWriter {
    buf: Vec<u8>,
}

impl StateWriter {
    pub fn new() -> Self {
        // State size is bounded and known; one page of slack avoids most
        // reallocation during a full-machine walk.
        Self {
            buf: Vec::with_capacity(0x1_0000),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    /// Append exactly `expected_len` bytes. Callers must pre-size their
    /// buffers; a mismatch is truncated or zero-padded to keep the stream
    /// layout fixed, and logged since it indicates a serialization bug.
    pub fn put_bytes(&mut self, bytes: &[u8], expected_len: usize) {
        if bytes.len() != expected_len {
            log::warn!(
                "state slice length mismatch: got {} bytes, expected {}",
                bytes.len(),
                expected_len
            );
        }
        let n = bytes.len().min(expected_len);
        self.buf.extend_from_slice(&bytes[..n]);
        for _ in n..expected_len {
            self.buf.push(0);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an encoded state buffer with typed little-endian get
/// primitives mirroring [`StateWriter`].
#[derive(Debug)]
pub struct StateReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], StateError> {
        if self.data.len() - self.pos < n {
            return Err(StateError::UnexpectedEof {
                offset: self.pos,
                wanted: n - (self.data.len() - self.pos),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, StateError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, StateError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32, StateError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_bool(&mut self) -> Result<bool, StateError> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn get_bytes(&mut self, len: usize) -> Result<&'a [u8], StateError> {
        self.take(len)
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}
