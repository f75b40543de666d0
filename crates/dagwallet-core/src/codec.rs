//! Versioned binary codec
//!
//! Every stored record and the transaction wire format go through
//! [`Encoder`] / [`Decoder`]. Integers are little-endian, variable-length
//! fields are prefixed with a compact-size varint, and stored records open
//! with a one-byte layout version so old layouts are detected instead of
//! misread.

use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Upper bound for any length prefix, guards against hostile input
pub const MAX_VAR_BYTES: u64 = 32 * 1024 * 1024;

/// Serialized size of a compact-size varint
pub const fn varint_size(n: u64) -> usize {
    if n < 0xfd {
        1
    } else if n <= 0xffff {
        3
    } else if n <= 0xffff_ffff {
        5
    } else {
        9
    }
}

/// Binary layout contract for a record type
pub trait Codec: Sized {
    /// Append the encoding of `self`
    fn encode(&self, enc: &mut Encoder);

    /// Read one value
    fn decode(dec: &mut Decoder<'_>) -> Result<Self>;

    /// Encode into a fresh buffer
    fn to_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode(&mut enc);
        enc.finish()
    }

    /// Decode a complete buffer, rejecting trailing bytes
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let value = Self::decode(&mut dec)?;
        dec.finish()?;
        Ok(value)
    }
}

/// Append-only byte writer
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Empty encoder
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Encoder with reserved capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Write one byte
    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Write a bool as one byte
    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    /// Write a u16
    pub fn put_u16(&mut self, v: u16) {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    /// Write a u32
    pub fn put_u32(&mut self, v: u32) {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    /// Write an i32
    pub fn put_i32(&mut self, v: i32) {
        let mut b = [0u8; 4];
        LittleEndian::write_i32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    /// Write a u64
    pub fn put_u64(&mut self, v: u64) {
        let mut b = [0u8; 8];
        LittleEndian::write_u64(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    /// Write an i64
    pub fn put_i64(&mut self, v: i64) {
        let mut b = [0u8; 8];
        LittleEndian::write_i64(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    /// Write a compact-size varint
    pub fn put_varint(&mut self, n: u64) {
        if n < 0xfd {
            self.put_u8(n as u8);
        } else if n <= 0xffff {
            self.put_u8(0xfd);
            self.put_u16(n as u16);
        } else if n <= 0xffff_ffff {
            self.put_u8(0xfe);
            self.put_u32(n as u32);
        } else {
            self.put_u8(0xff);
            self.put_u64(n);
        }
    }

    /// Write raw bytes without a length prefix
    pub fn put_fixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a varint length followed by the bytes
    pub fn put_var_bytes(&mut self, bytes: &[u8]) {
        self.put_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Write a string as var bytes
    pub fn put_str(&mut self, s: &str) {
        self.put_var_bytes(s.as_bytes());
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the buffer
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an encoded buffer
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Start decoding `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                Error::Codec(format!(
                    "unexpected end of data: need {} bytes at offset {}, have {}",
                    n,
                    self.pos,
                    self.data.len()
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read one byte
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a bool, rejecting values other than 0 and 1
    pub fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::Codec(format!("invalid bool byte {}", other))),
        }
    }

    /// Read a u16
    pub fn u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    /// Read a u32
    pub fn u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Read an i32
    pub fn i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    /// Read a u64
    pub fn u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// Read an i64
    pub fn i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    /// Read a compact-size varint, rejecting non-canonical encodings
    pub fn varint(&mut self) -> Result<u64> {
        let (value, min) = match self.u8()? {
            0xfd => (self.u16()? as u64, 0xfd),
            0xfe => (self.u32()? as u64, 0x1_0000),
            0xff => (self.u64()?, 0x1_0000_0000),
            b => return Ok(b as u64),
        };
        if value < min {
            return Err(Error::Codec(format!("non-canonical varint {}", value)));
        }
        Ok(value)
    }

    /// Read a fixed-size array
    pub fn fixed<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read varint-prefixed bytes
    pub fn var_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.varint()?;
        if len > MAX_VAR_BYTES {
            return Err(Error::Codec(format!("length prefix {} too large", len)));
        }
        Ok(self.take(len as usize)?.to_vec())
    }

    /// Read a varint-prefixed UTF-8 string
    pub fn string(&mut self) -> Result<String> {
        String::from_utf8(self.var_bytes()?)
            .map_err(|e| Error::Codec(format!("invalid utf-8: {}", e)))
    }

    /// Read a count prefix, bounded by the bytes left so a bogus count
    /// cannot trigger a huge allocation
    pub fn count(&mut self, min_item_size: usize) -> Result<usize> {
        let n = self.varint()?;
        let max = (self.remaining() / min_item_size.max(1)) as u64;
        if n > max {
            return Err(Error::Codec(format!(
                "item count {} exceeds remaining data",
                n
            )));
        }
        Ok(n as usize)
    }

    /// Check the leading layout version byte
    pub fn expect_version(&mut self, record: &str, expected: u8) -> Result<()> {
        let found = self.u8()?;
        if found != expected {
            return Err(Error::Codec(format!(
                "unsupported {} layout version {} (expected {})",
                record, found, expected
            )));
        }
        Ok(())
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fail if any bytes are left
    pub fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(Error::Codec(format!(
                "{} trailing bytes",
                self.remaining()
            )));
        }
        Ok(())
    }
}
