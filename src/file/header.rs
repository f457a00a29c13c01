//! Fixed-size file header

use crate::codec::{self, Decoder};
use crate::error::{IidError, Result};
use crate::types::BufLoc;
use std::io::Write;
use tracing::debug;

/// Serialized header size: two `u32`s plus five buflocs.
pub const HEADER_SIZE: usize = 48;

/// Format version this crate reads and writes. There is no magic prefix in
/// version 1; the version field is the compatibility gate.
pub const FORMAT_VERSION: u32 = 1;

/// The only assigned resource format: image segmentation. Other values are
/// reserved and surfaced to the caller without being rejected.
pub const RFORMAT_IMAGE: u32 = 0;

/// File header: format gates plus the absolute location of every block.
///
/// Block order on disk is not part of the contract; readers must go through
/// these buflocs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
    pub rformat: u32,
    pub lut: BufLoc,
    pub iids: BufLoc,
    pub meta: BufLoc,
    pub groups: BufLoc,
    pub segments: BufLoc,
}

impl FileHeader {
    /// Header with current version, image rformat, and null buflocs; the
    /// writer emits this first and patches the buflocs once the blocks have
    /// landed.
    pub fn placeholder() -> Self {
        Self {
            version: FORMAT_VERSION,
            rformat: RFORMAT_IMAGE,
            lut: BufLoc::NULL,
            iids: BufLoc::NULL,
            meta: BufLoc::NULL,
            groups: BufLoc::NULL,
            segments: BufLoc::NULL,
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf, "file header");
        let version = dec.u32()?;
        if version != FORMAT_VERSION {
            return Err(IidError::BadVersion {
                found: version,
                expected: FORMAT_VERSION,
            });
        }
        let rformat = dec.u32()?;
        if rformat != RFORMAT_IMAGE {
            debug!("File carries reserved rformat {}", rformat);
        }
        Ok(Self {
            version,
            rformat,
            lut: dec.bufloc()?,
            iids: dec.bufloc()?,
            meta: dec.bufloc()?,
            groups: dec.bufloc()?,
            segments: dec.bufloc()?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        use byteorder::{LittleEndian, WriteBytesExt};
        w.write_u32::<LittleEndian>(self.version)?;
        w.write_u32::<LittleEndian>(self.rformat)?;
        codec::write_bufloc(w, self.lut)?;
        codec::write_bufloc(w, self.iids)?;
        codec::write_bufloc(w, self.meta)?;
        codec::write_bufloc(w, self.groups)?;
        codec::write_bufloc(w, self.segments)?;
        Ok(())
    }
}
