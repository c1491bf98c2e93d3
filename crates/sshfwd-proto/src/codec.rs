//! SSH wire encoding for forwarding payloads
//!
//! Only the two primitives the forwarding payloads need are supported:
//! `uint32` (big endian) and `string` (`uint32` length followed by the bytes).

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

/// Codec errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Payload truncated: needed {needed} more bytes for {field}")]
    Truncated { field: &'static str, needed: usize },

    #[error("Field {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("Unexpected {0} trailing bytes after payload")]
    TrailingBytes(usize),
}

/// Cursor over an incoming payload
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn read_u32(&mut self, field: &'static str) -> Result<u32, CodecError> {
        if self.buf.remaining() < 4 {
            return Err(CodecError::Truncated {
                field,
                needed: 4 - self.buf.remaining(),
            });
        }
        Ok(self.buf.get_u32())
    }

    pub(crate) fn read_string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let len = self.read_u32(field)? as usize;
        if self.buf.remaining() < len {
            return Err(CodecError::Truncated {
                field,
                needed: len - self.buf.remaining(),
            });
        }
        let raw = &self.buf[..len];
        let value = std::str::from_utf8(raw)
            .map_err(|_| CodecError::InvalidUtf8(field))?
            .to_string();
        self.buf.advance(len);
        Ok(value)
    }

    /// Reject leftover bytes
    pub(crate) fn finish(self) -> Result<(), CodecError> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

pub(crate) fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}
