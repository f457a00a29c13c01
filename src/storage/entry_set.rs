//! In-memory entry collection feeding the writer

use crate::error::{IidError, Result};
use crate::segment::{Mask, Segment};
use crate::storage::writer;
use crate::types::{Bbox, Iid};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// An in-memory collection of entries, keyed densely from 0 in insertion
/// order.
///
/// `(domain, address)` pairs are unique across the set; adding a duplicate
/// fails. Entries are immutable once added; modification of a saved file is
/// read-all plus rewrite.
#[derive(Debug)]
pub struct EntrySet {
    entries: Vec<(Iid, Segment)>,
    by_iid: HashMap<Iid, u32>,
    groups: BTreeMap<String, Vec<u32>>,
    metadata: serde_json::Value,
}

impl EntrySet {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_iid: HashMap::new(),
            groups: BTreeMap::new(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Add one entry, assigning the next key, and append it to the named
    /// groups.
    pub fn add(&mut self, iid: Iid, segment: Segment, groups: &[&str]) -> Result<u32> {
        if self.by_iid.contains_key(&iid) {
            return Err(IidError::DuplicateIid(iid.to_string()));
        }
        let key = u32::try_from(self.entries.len())
            .map_err(|_| IidError::Corrupt("entry count exceeds the format limit".into()))?;
        self.by_iid.insert(iid.clone(), key);
        self.entries.push((iid, segment));
        for name in groups {
            self.assign_group(name, key)?;
        }
        Ok(key)
    }

    /// Add one entry from a mask covering `bbox`, decomposing it into
    /// regions.
    pub fn add_mask(&mut self, iid: Iid, bbox: Bbox, mask: &Mask, groups: &[&str]) -> Result<u32> {
        let segment = Segment::from_mask(bbox, mask)?;
        self.add(iid, segment, groups)
    }

    /// Append an existing entry to a group, creating the group on first use.
    pub fn assign_group(&mut self, name: &str, key: u32) -> Result<()> {
        if key as usize >= self.entries.len() {
            return Err(IidError::KeyNotFound(key));
        }
        let members = self.groups.entry(name.to_string()).or_default();
        if !members.contains(&key) {
            members.push(key);
        }
        Ok(())
    }

    /// Replace the opaque metadata document.
    ///
    /// Any JSON document is accepted. The recommended (unenforced) shape is
    /// `{"image": {"width", "height"}, "camera": {"translate", "rotate",
    /// "fstop", "focus"}, "keyframes": {"frame", "firstFrame", "lastFrame"}}`.
    pub fn set_metadata(&mut self, metadata: serde_json::Value) {
        self.metadata = metadata;
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iid(&self, key: u32) -> Option<&Iid> {
        self.entries.get(key as usize).map(|(iid, _)| iid)
    }

    pub fn segment(&self, key: u32) -> Option<&Segment> {
        self.entries.get(key as usize).map(|(_, seg)| seg)
    }

    pub fn contains_iid(&self, iid: &Iid) -> bool {
        self.by_iid.contains_key(iid)
    }

    pub fn key_of(&self, iid: &Iid) -> Option<u32> {
        self.by_iid.get(iid).copied()
    }

    /// Entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &Iid, &Segment)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(key, (iid, seg))| (key as u32, iid, seg))
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn group_keys(&self, name: &str) -> Option<&[u32]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    pub(crate) fn groups_map(&self) -> &BTreeMap<String, Vec<u32>> {
        &self.groups
    }

    /// Serialize the set to disk in the canonical block layout. On any
    /// failure the partial output is removed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        writer::save(self, path.as_ref())
    }
}

impl Default for EntrySet {
    fn default() -> Self {
        Self::new()
    }
}
