//! Little-endian codec primitives shared by every block

use crate::error::{IidError, Result};
use crate::types::{Bbox, BufLoc};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

/// Bounds-checked decode cursor over a byte slice.
///
/// All multi-byte integers are little-endian. Reads past the end of the
/// slice fail with [`IidError::Truncated`] carrying the block name given at
/// construction.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    context: &'static str,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8], context: &'static str) -> Self {
        Self {
            buf,
            pos: 0,
            context,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(IidError::Truncated {
                context: self.context,
                needed: n as u64,
                available: self.remaining() as u64,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// `n` raw bytes, borrowed from the underlying slice.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Length-prefixed byte string: `u32` length, then that many raw bytes.
    /// No terminator, no encoding enforced at this layer.
    pub fn string(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()?;
        self.take(len as usize)
    }

    pub fn bufloc(&mut self) -> Result<BufLoc> {
        let offset = self.u32()?;
        let length = self.u32()?;
        Ok(BufLoc::new(offset, length))
    }

    pub fn bbox(&mut self) -> Result<Bbox> {
        let min_row = self.u32()?;
        let min_col = self.u32()?;
        let max_row = self.u32()?;
        let max_col = self.u32()?;
        Ok(Bbox::new(min_row, min_col, max_row, max_col))
    }
}

/// Narrow a byte count or offset to the format's `u32` fields.
///
/// Anything past `u32::MAX` is a fatal encoding error at write time.
pub fn narrow(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| IidError::Corrupt(format!("{what} of {value} exceeds the format's u32 range")))
}

/// Write a length-prefixed byte string.
pub fn write_string<W: Write>(w: &mut W, bytes: &[u8]) -> Result<()> {
    let len = narrow(bytes.len() as u64, "byte string")?;
    w.write_u32::<LittleEndian>(len)?;
    w.write_all(bytes)?;
    Ok(())
}

pub fn write_bufloc<W: Write>(w: &mut W, loc: BufLoc) -> Result<()> {
    w.write_u32::<LittleEndian>(loc.offset)?;
    w.write_u32::<LittleEndian>(loc.length)?;
    Ok(())
}

pub fn write_bbox<W: Write>(w: &mut W, bbox: &Bbox) -> Result<()> {
    w.write_u32::<LittleEndian>(bbox.min_row)?;
    w.write_u32::<LittleEndian>(bbox.min_col)?;
    w.write_u32::<LittleEndian>(bbox.max_row)?;
    w.write_u32::<LittleEndian>(bbox.max_col)?;
    Ok(())
}
