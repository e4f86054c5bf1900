//! Big-endian byte cursors for the class-file format

use crate::{Error, Result};

/// Bounds-checked big-endian reader.
pub struct ByteReader<'a> {
    /// Name used in error messages
    name: &'a str,
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(name: &'a str, data: &'a [u8]) -> Self {
        Self { name, data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Build a decode error located at the current position
    pub fn error(&self, reason: impl std::fmt::Display) -> Error {
        Error::decode(self.name, format!("{} (at byte {})", reason, self.pos))
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.error(format!("unexpected end of data, wanted {} bytes", len)));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64> {
        let hi = self.u32()? as u64;
        let lo = self.u32()? as u64;
        Ok((hi << 32) | lo)
    }
}

/// Growable big-endian writer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// A tag byte followed by u16 operands
    pub fn tagged(&mut self, tag: u8, operands: &[u16]) {
        self.u8(tag);
        for operand in operands {
            self.u16(*operand);
        }
    }

    /// Overwrite a previously written u16
    pub fn patch_u16(&mut self, at: usize, v: u16) {
        self.buf[at..at + 2].copy_from_slice(&v.to_be_bytes());
    }

    /// Overwrite a previously written i32
    pub fn patch_i32(&mut self, at: usize, v: i32) {
        self.buf[at..at + 4].copy_from_slice(&v.to_be_bytes());
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_bounds() {
        let data = [0x00, 0x01, 0xCA, 0xFE, 0xBA, 0xBE];
        let mut reader = ByteReader::new("t", &data);
        assert_eq!(reader.u16().unwrap(), 1);
        assert_eq!(reader.u32().unwrap(), 0xCAFE_BABE);
        assert_eq!(reader.remaining(), 0);
        let err = reader.u8().unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_writer_patch() {
        let mut w = ByteWriter::new();
        w.u16(0);
        w.i32(-1);
        w.patch_u16(0, 0xBEEF);
        w.patch_i32(2, 7);
        assert_eq!(w.into_inner(), vec![0xBE, 0xEF, 0, 0, 0, 7]);
    }
}
