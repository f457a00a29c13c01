//! Serialization of an entry set into the canonical block layout
//!
//! Blocks are emitted as header placeholder, lookup-table placeholder, IID
//! block, metadata, groups, segments. Each block's absolute location is
//! recorded as it lands; afterwards the lookup table and header are patched
//! in place. IID record locations are relative to the IID block start so the
//! block can move without rewriting every record; segment locations are
//! absolute.

use crate::codec::{self, narrow};
use crate::error::{IidError, Result};
use crate::file::{FileHeader, HEADER_SIZE};
use crate::index::{self, LUT_RECORD_SIZE};
use crate::storage::EntrySet;
use crate::types::BufLoc;
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::OpenOptions;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

pub(crate) fn save(set: &EntrySet, path: &Path) -> Result<()> {
    debug!("Writing IIDF file {:?}: {} entries", path, set.len());
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);

    let result = match write_file(set, &mut writer) {
        Ok(()) => writer.flush().map_err(IidError::from),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        // Never leave a half-written file behind.
        drop(writer);
        let _ = std::fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

fn write_file<W: Write + Seek>(set: &EntrySet, w: &mut W) -> Result<()> {
    let mut header = FileHeader::placeholder();
    header.write(w)?;

    let entry_count = set.len();
    let lut_offset = HEADER_SIZE as u64;
    w.write_all(&vec![0u8; entry_count * LUT_RECORD_SIZE])?;

    let iids_offset = w.stream_position()?;
    let mut iid_locs = Vec::with_capacity(entry_count);
    for (key, iid, _) in set.entries() {
        let start = w.stream_position()? - iids_offset;
        w.write_u32::<LittleEndian>(key)?;
        w.write_u32::<LittleEndian>(narrow(iid.domain().len() as u64, "IID domain")?)?;
        w.write_u32::<LittleEndian>(narrow(iid.address().len() as u64, "IID address")?)?;
        w.write_all(iid.domain())?;
        w.write_all(iid.address())?;
        let length = w.stream_position()? - iids_offset - start;
        iid_locs.push(BufLoc::new(
            narrow(start, "IID record offset")?,
            narrow(length, "IID record length")?,
        ));
    }
    header.iids = block_loc(iids_offset, w.stream_position()?)?;

    let meta_offset = w.stream_position()?;
    let meta = serde_json::to_vec(set.metadata())
        .map_err(|e| IidError::Corrupt(format!("metadata failed to serialize: {e}")))?;
    codec::write_string(w, &meta)?;
    header.meta = block_loc(meta_offset, w.stream_position()?)?;

    let groups_offset = w.stream_position()?;
    w.write_all(&index::encode_block(set.groups_map())?)?;
    header.groups = block_loc(groups_offset, w.stream_position()?)?;

    let segs_offset = w.stream_position()?;
    let mut seg_locs = Vec::with_capacity(entry_count);
    for (key, _, segment) in set.entries() {
        let start = w.stream_position()?;
        segment.write_record(w, key)?;
        let length = w.stream_position()? - start;
        seg_locs.push(BufLoc::new(
            narrow(start, "segment record offset")?,
            narrow(length, "segment record length")?,
        ));
    }
    header.segments = block_loc(segs_offset, w.stream_position()?)?;
    header.lut = block_loc(lut_offset, iids_offset)?;

    w.seek(SeekFrom::Start(lut_offset))?;
    for key in 0..entry_count {
        w.write_u32::<LittleEndian>(key as u32)?;
        codec::write_bufloc(w, iid_locs[key])?;
        codec::write_bufloc(w, seg_locs[key])?;
    }
    w.seek(SeekFrom::Start(0))?;
    header.write(w)?;

    debug!(
        "Wrote blocks: lut {:?}, iids {:?}, meta {:?}, groups {:?}, segments {:?}",
        header.lut, header.iids, header.meta, header.groups, header.segments
    );
    Ok(())
}

fn block_loc(start: u64, end: u64) -> Result<BufLoc> {
    Ok(BufLoc::new(
        narrow(start, "block offset")?,
        narrow(end - start, "block length")?,
    ))
}
