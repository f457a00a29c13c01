//! The lookup table, the only block parsed eagerly on open

use crate::codec::{self, Decoder};
use crate::error::{IidError, Result};
use crate::types::LutEntry;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;
use tracing::debug;

/// Serialized size of one record: `u32` key plus two buflocs.
pub const LUT_RECORD_SIZE: usize = 20;

/// Packed array of `(key, iid location, segment location)` records. Keys are
/// dense `0..N` in creation order; every on-demand read goes through this
/// table.
#[derive(Debug, Clone, Default)]
pub struct Lut {
    entries: Vec<LutEntry>,
}

impl Lut {
    /// Parse the whole table from its block. The block extent must be an
    /// exact multiple of the record size and keys must be dense from zero.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() % LUT_RECORD_SIZE != 0 {
            return Err(IidError::Corrupt(format!(
                "lookup table length {} is not a multiple of {LUT_RECORD_SIZE}",
                buf.len()
            )));
        }
        let count = buf.len() / LUT_RECORD_SIZE;
        let mut dec = Decoder::new(buf, "lookup table");
        let mut entries = Vec::with_capacity(count);
        for expected in 0..count {
            let key = dec.u32()?;
            if key != expected as u32 {
                return Err(IidError::Corrupt(format!(
                    "lookup table record {expected} carries key {key}"
                )));
            }
            let iid_loc = dec.bufloc()?;
            let seg_loc = dec.bufloc()?;
            entries.push(LutEntry {
                key,
                iid_loc,
                seg_loc,
            });
        }
        debug!("Materialized lookup table: {} entries", entries.len());
        Ok(Self { entries })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        for entry in &self.entries {
            w.write_u32::<LittleEndian>(entry.key)?;
            codec::write_bufloc(w, entry.iid_loc)?;
            codec::write_bufloc(w, entry.seg_loc)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: u32) -> Option<&LutEntry> {
        self.entries.get(key as usize)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LutEntry> {
        self.entries.iter()
    }
}
