//! SSH wire encoding (RFC 4251 §5) for key and signature blobs.

use thiserror::Error;

/// Errors reading a length-prefixed SSH blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum WireError {
    #[error("truncated blob")]
    Truncated,
    #[error("field is not valid UTF-8")]
    InvalidUtf8,
    #[error("field of {0} bytes exceeds the u32 length prefix")]
    TooLong(usize),
}

/// Cursor over an SSH wire-encoded buffer.
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn read_u32(&mut self) -> Result<u32, WireError> {
        let Some((head, rest)) = self.buf.split_first_chunk::<4>() else {
            return Err(WireError::Truncated);
        };
        self.buf = rest;
        Ok(u32::from_be_bytes(*head))
    }

    /// Reads a `string` (u32 length followed by that many bytes).
    pub(crate) fn read_string(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_u32()? as usize;
        if self.buf.len() < len {
            return Err(WireError::Truncated);
        }
        let (data, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(data)
    }

    /// Reads a `string` that must be UTF-8, such as an algorithm name.
    pub(crate) fn read_utf8(&mut self) -> Result<&'a str, WireError> {
        std::str::from_utf8(self.read_string()?).map_err(|_| WireError::InvalidUtf8)
    }

    /// Bytes not yet consumed.
    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }
}

/// Length prefix for a field of `len` bytes.
fn string_len(len: usize) -> Result<u32, WireError> {
    u32::try_from(len).map_err(|_| WireError::TooLong(len))
}

/// Appends a `string` field.
pub(crate) fn put_string(out: &mut Vec<u8>, data: &[u8]) -> Result<(), WireError> {
    out.extend_from_slice(&string_len(data.len())?.to_be_bytes());
    out.extend_from_slice(data);
    Ok(())
}

/// Appends an unsigned big-endian integer as an `mpint`.
#[cfg(any(test, feature = "testutil"))]
pub(crate) fn put_mpint(out: &mut Vec<u8>, magnitude_be: &[u8]) -> Result<(), WireError> {
    let start = magnitude_be.iter().position(|&b| b != 0).unwrap_or(magnitude_be.len());
    let trimmed = &magnitude_be[start..];
    if trimmed.first().is_some_and(|&b| b & 0x80 != 0) {
        let mut padded = Vec::with_capacity(trimmed.len() + 1);
        padded.push(0);
        padded.extend_from_slice(trimmed);
        put_string(out, &padded)
    } else {
        put_string(out, trimmed)
    }
}
