//! Fixed-width, little-endian serialization primitives.
//!
//! Spec.md §9 calls for "a single primitive layer (fixed-width integers,
//! length-prefixed bytes)... never depend on host struct layout." Every
//! on-disk structure in this workspace — page headers, slot directories,
//! catalog pages, row payloads, B+Tree entries — is built out of the
//! `Encoder`/`Decoder` pair below rather than a derive macro, so the byte
//! offsets the spec pins down (e.g. the meta page's magic number at offset
//! 0) are exactly the offsets the code produces.

use crate::{DbError, DbResult};

/// Appends fixed-width fields to a growable byte buffer, little-endian.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn put_u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_f32(&mut self, v: f32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Raw bytes, no length prefix. Caller already knows the length
    /// (e.g. a fixed-width `CHAR(n)` field or a page-sized buffer).
    pub fn put_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// A `u16`-length-prefixed byte string.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.put_u16(bytes.len() as u16);
        self.put_raw(bytes)
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Reads fixed-width fields from a byte slice, little-endian, advancing a
/// cursor. Every `get_*` returns `Corruption` on a short read instead of
/// panicking — untrusted bytes from disk are a fact of life, not a
/// programmer error.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn take(&mut self, n: usize) -> DbResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(DbError::Corruption(format!(
                "short read: need {n} bytes at offset {}, have {}",
                self.pos,
                self.buf.len()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> DbResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> DbResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> DbResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64(&mut self) -> DbResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn get_i32(&mut self) -> DbResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_f32(&mut self) -> DbResult<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_raw(&mut self, n: usize) -> DbResult<&'a [u8]> {
        self.take(n)
    }

    pub fn get_bytes(&mut self) -> DbResult<&'a [u8]> {
        let len = self.get_u16()? as usize;
        self.take(len)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalar_fields() {
        let mut enc = Encoder::new();
        enc.put_u8(0xAB).put_u16(0x1234).put_u32(0xDEADBEEF);
        let bytes = enc.into_vec();

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.get_u8().unwrap(), 0xAB);
        assert_eq!(dec.get_u16().unwrap(), 0x1234);
        assert_eq!(dec.get_u32().unwrap(), 0xDEADBEEF);
    }

    #[test]
    fn little_endian_byte_order() {
        let mut enc = Encoder::new();
        enc.put_u32(0x4D4E5351);
        assert_eq!(enc.into_vec(), vec![0x51, 0x53, 0x4E, 0x4D]);
    }

    #[test]
    fn length_prefixed_bytes_round_trip() {
        let mut enc = Encoder::new();
        enc.put_bytes(b"hello");
        let bytes = enc.into_vec();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.get_bytes().unwrap(), b"hello");
    }

    #[test]
    fn short_read_is_corruption_not_panic() {
        let bytes = vec![1u8];
        let mut dec = Decoder::new(&bytes);
        let err = dec.get_u32().unwrap_err();
        assert!(matches!(err, DbError::Corruption(_)));
    }

    #[test]
    fn float_round_trips_bitwise() {
        let mut enc = Encoder::new();
        enc.put_f32(3.5);
        let bytes = enc.into_vec();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.get_f32().unwrap(), 3.5);
    }
}
