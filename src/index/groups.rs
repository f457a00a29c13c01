//! Groups block: named key subsets behind a JSON header
//!
//! The block is `u32 header_len, json header, payload`. The header maps each
//! group name to a byte offset and key count inside the payload region that
//! starts immediately after it, so a reader can enumerate names and sizes
//! without touching any key list, then resolve only the groups it needs.

use crate::codec::{self, Decoder};
use crate::error::{IidError, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header record for one group: where its key list sits in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpan {
    /// Byte offset of the key list, relative to the payload start.
    pub offset: u32,
    /// Number of `u32` keys.
    pub count: u32,
}

/// Decoded groups header. Key lists are resolved on demand from the block.
#[derive(Debug, Clone, Default)]
pub struct GroupsIndex {
    spans: BTreeMap<String, GroupSpan>,
    payload_offset: usize,
}

impl GroupsIndex {
    /// Decode the header and validate every span against the block extent.
    /// Key lists themselves are not read.
    pub fn parse(block: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(block, "groups block");
        let header = dec.string()?;
        let spans: BTreeMap<String, GroupSpan> = serde_json::from_slice(header)
            .map_err(|e| IidError::Corrupt(format!("groups header is not valid JSON: {e}")))?;

        let payload_offset = dec.position();
        let payload_len = block.len() - payload_offset;
        for (name, span) in &spans {
            let end = span.offset as u64 + span.count as u64 * 4;
            if end > payload_len as u64 {
                return Err(IidError::Corrupt(format!(
                    "group {name:?} extends to payload byte {end}, only {payload_len} present"
                )));
            }
        }

        Ok(Self {
            spans,
            payload_offset,
        })
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.spans.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.spans.keys().map(String::as_str)
    }

    /// Key count of one group without reading its list.
    pub fn group_len(&self, name: &str) -> Option<u32> {
        self.spans.get(name).map(|s| s.count)
    }

    /// Resolve one group's key list from the block it was parsed from.
    pub fn group_keys(&self, name: &str, block: &[u8]) -> Result<Vec<u32>> {
        let span = self
            .spans
            .get(name)
            .ok_or_else(|| IidError::GroupNotFound(name.to_string()))?;
        let start = self.payload_offset + span.offset as usize;
        let mut dec = Decoder::new(&block[start..], "group key list");
        let mut keys = Vec::with_capacity(span.count as usize);
        for _ in 0..span.count {
            keys.push(dec.u32()?);
        }
        Ok(keys)
    }
}

/// Serialize a whole groups block from name -> member keys.
///
/// Groups are laid out in name order; the header length does not influence
/// the payload-relative offsets, so it is written first without fixups.
pub fn encode_block(groups: &BTreeMap<String, Vec<u32>>) -> Result<Vec<u8>> {
    let mut spans = BTreeMap::new();
    let mut offset: u64 = 0;
    for (name, keys) in groups {
        spans.insert(
            name.clone(),
            GroupSpan {
                offset: codec::narrow(offset, "group payload")?,
                count: codec::narrow(keys.len() as u64, "group key count")?,
            },
        );
        offset += keys.len() as u64 * 4;
    }
    let header = serde_json::to_vec(&spans)
        .map_err(|e| IidError::Corrupt(format!("groups header failed to serialize: {e}")))?;

    let mut block = Vec::with_capacity(4 + header.len() + offset as usize);
    codec::write_string(&mut block, &header)?;
    for keys in groups.values() {
        for &key in keys {
            block.write_u32::<LittleEndian>(key)?;
        }
    }
    Ok(block)
}
