//! PostgreSQL wire protocol encoding and decoding primitives.
//!
//! PostgreSQL uses big-endian (network byte order) for all integers.
//! Readers return the decoded value together with the unread tail so that
//! message parsers can be written as a chain of `let (x, rest) = read_*(rest)?`.

use zerocopy::FromBytes;

use super::types::{I16BE, I32BE, U16BE, U32BE};
use crate::error::{Error, Result};

fn split<'a>(data: &'a [u8], len: usize, what: &str) -> Result<(&'a [u8], &'a [u8])> {
    data.split_at_checked(len).ok_or_else(|| {
        Error::Protocol(format!(
            "{what}: buffer too short: {} < {len}",
            data.len()
        ))
    })
}

/// Read 1-byte unsigned integer.
#[inline]
pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((&value, rest)) => Ok((value, rest)),
        None => Err(Error::Protocol("read_u8: empty buffer".into())),
    }
}

/// Read 2-byte big-endian signed integer.
#[inline]
pub fn read_i16(data: &[u8]) -> Result<(i16, &[u8])> {
    let (head, rest) = split(data, 2, "read_i16")?;
    Ok((I16BE::read_from_bytes(head)?.get(), rest))
}

/// Read 2-byte big-endian unsigned integer.
#[inline]
pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    let (head, rest) = split(data, 2, "read_u16")?;
    Ok((U16BE::read_from_bytes(head)?.get(), rest))
}

/// Read 4-byte big-endian signed integer.
#[inline]
pub fn read_i32(data: &[u8]) -> Result<(i32, &[u8])> {
    let (head, rest) = split(data, 4, "read_i32")?;
    Ok((I32BE::read_from_bytes(head)?.get(), rest))
}

/// Read 4-byte big-endian unsigned integer.
#[inline]
pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    let (head, rest) = split(data, 4, "read_u32")?;
    Ok((U32BE::read_from_bytes(head)?.get(), rest))
}

/// Read fixed-length bytes.
#[inline]
pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    split(data, len, "read_bytes")
}

/// Read null-terminated string (PostgreSQL String type).
/// Returns the string bytes (without the null terminator) and remaining data.
#[inline]
pub fn read_cstring(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let pos = memchr::memchr(0, data)
        .ok_or_else(|| Error::Protocol("read_cstring: no null terminator found".into()))?;
    let (bytes, rest) = data.split_at(pos);
    Ok((bytes, rest.get(1..).unwrap_or_default()))
}

/// Read null-terminated string as &str.
#[inline]
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let (bytes, rest) = read_cstring(data)?;
    let s = simdutf8::basic::from_utf8(bytes)
        .map_err(|e| Error::Protocol(format!("read_cstr: invalid UTF-8: {e}")))?;
    Ok((s, rest))
}

/// Write 1-byte unsigned integer.
#[inline]
pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte big-endian signed integer.
#[inline]
pub fn write_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 2-byte big-endian unsigned integer.
#[inline]
pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian signed integer.
#[inline]
pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian unsigned integer.
#[inline]
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write null-terminated string from &str.
#[inline]
pub fn write_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Message builder helper that handles the length field.
///
/// PostgreSQL message format:
/// - Type byte (1 byte) - NOT included in length
/// - Length (4 bytes) - includes itself
/// - Payload (Length - 4 bytes)
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start building a message with a type byte.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]); // Placeholder for length
        Self { buf, start }
    }

    /// Start building a startup message (no type byte).
    pub fn new_startup(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]); // Placeholder for length
        Self { buf, start }
    }

    /// Get mutable access to the underlying buffer.
    pub fn buf(&mut self) -> &mut Vec<u8> {
        self.buf
    }

    /// Write a u8.
    pub fn write_u8(&mut self, value: u8) {
        write_u8(self.buf, value);
    }

    /// Write an i16.
    pub fn write_i16(&mut self, value: i16) {
        write_i16(self.buf, value);
    }

    /// Write a u16.
    pub fn write_u16(&mut self, value: u16) {
        write_u16(self.buf, value);
    }

    /// Write an i32.
    pub fn write_i32(&mut self, value: i32) {
        write_i32(self.buf, value);
    }

    /// Write a u32.
    pub fn write_u32(&mut self, value: u32) {
        write_u32(self.buf, value);
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Write null-terminated string.
    pub fn write_cstr(&mut self, s: &str) {
        write_cstr(self.buf, s);
    }

    /// Finish building the message and fill in the length field.
    pub fn finish(self) -> Result<()> {
        let len = i32::try_from(self.buf.len() - self.start)
            .map_err(|_| Error::Encode("message exceeds 2GB".into()))?;
        if let Some(slot) = self.buf.get_mut(self.start..self.start + 4) {
            slot.copy_from_slice(&len.to_be_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_chain() {
        let data = [0x00, 0x01, 0xff, 0xff, 0xff, 0xff, b'a', b'b', 0, 7];
        let (a, rest) = read_u16(&data).unwrap();
        let (b, rest) = read_i32(rest).unwrap();
        let (c, rest) = read_cstr(rest).unwrap();
        let (d, rest) = read_u8(rest).unwrap();
        assert_eq!((a, b, c, d), (1, -1, "ab", 7));
        assert!(rest.is_empty());
    }

    #[test]
    fn short_buffers_are_protocol_errors() {
        assert!(matches!(read_i32(&[0, 1]), Err(Error::Protocol(_))));
        assert!(matches!(read_u8(&[]), Err(Error::Protocol(_))));
        assert!(matches!(read_cstr(b"abc"), Err(Error::Protocol(_))));
        assert!(matches!(read_bytes(&[1, 2], 3), Err(Error::Protocol(_))));
    }

    #[test]
    fn builder_backfills_length() {
        let mut buf = Vec::new();
        let mut msg = MessageBuilder::new(&mut buf, b'X');
        msg.write_cstr("hi");
        msg.write_i16(3);
        msg.finish().unwrap();
        // length = 4 + 3 (cstr) + 2
        assert_eq!(buf, [b'X', 0, 0, 0, 9, b'h', b'i', 0, 0, 3]);
    }
}
