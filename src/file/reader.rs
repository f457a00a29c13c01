//! Memory-mapped file reader with on-demand materialization
//!
//! The reader decodes the header and lookup table eagerly, then resolves IID
//! bytes and segment records per key as queries ask for them. The mapping is
//! read-only and held for the reader's lifetime; materialization copies only
//! the slices of the requested keys.

use crate::codec::Decoder;
use crate::error::{IidError, Result};
use crate::file::header::{FileHeader, HEADER_SIZE};
use crate::index::{GroupsIndex, Lut};
use crate::segment::Segment;
use crate::storage::EntrySet;
use crate::types::{Bbox, BufLoc, Iid};
use memmap2::{Mmap, MmapOptions};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::path::Path;
use tracing::{debug, trace};

/// One entry of an opened file. The IID and segment are `None` until a fetch
/// (or an autoloading query) materializes them.
#[derive(Debug, Clone)]
pub struct Entry {
    key: u32,
    iid: Option<Iid>,
    segment: Option<Segment>,
}

impl Entry {
    pub fn key(&self) -> u32 {
        self.key
    }

    pub fn iid(&self) -> Option<&Iid> {
        self.iid.as_ref()
    }

    pub fn segment(&self) -> Option<&Segment> {
        self.segment.as_ref()
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.iid.is_some() && self.segment.is_some()
    }
}

/// Selector for [`IidFile::fetch`].
///
/// Selection is the union of `keys` and the members of `groups`, or every
/// key when `everything`/`all_keys` is set. The `iids` and `segments` flags
/// choose which halves to materialize and default to true; `everything`
/// overrides both. Fetches are additive: per-key loaded state persists
/// across calls.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Load IIDs and segments for all keys, ignoring the other options.
    pub everything: bool,
    /// Select all keys but obey the `iids`/`segments` flags.
    pub all_keys: bool,
    /// Explicit keys to select.
    pub keys: Option<Vec<u32>>,
    /// Groups whose members to select.
    pub groups: Option<Vec<String>>,
    /// Materialize IID bytes for the selected keys.
    pub iids: Option<bool>,
    /// Materialize segment records for the selected keys.
    pub segments: Option<bool>,
}

impl FetchOptions {
    pub fn everything() -> Self {
        Self {
            everything: true,
            ..Default::default()
        }
    }
}

/// Options for [`IidFile::region`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionOptions {
    /// Restrict the query to already-materialized segments; no I/O happens.
    pub only_loaded: bool,
    /// Test only the envelope box of each segment instead of its bits.
    pub conservative: bool,
}

/// In-memory predicate for [`IidFile::filter`]. Entries whose tested
/// attribute is not materialized are excluded.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Keep entries belonging to any of these groups.
    pub groups: Option<Vec<String>>,
    /// Keep entries whose segment area lies in this inclusive range.
    pub area: Option<(u32, u32)>,
}

/// A memory-mapped IIDF file.
///
/// Opening validates the header and materializes the lookup table; all other
/// blocks resolve on demand. Queries that need segment data fail with
/// [`IidError::NotLoaded`] when it has not been fetched, unless autoload is
/// enabled.
pub struct IidFile {
    mmap: Mmap,
    header: FileHeader,
    lut: Lut,
    entries: Vec<Entry>,
    groups: Option<GroupsIndex>,
    metadata: Option<serde_json::Value>,
    autoload: bool,
    strict: bool,
}

impl IidFile {
    /// Map a file read-only and decode its header and lookup table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < HEADER_SIZE as u64 {
            return Err(IidError::Truncated {
                context: "file header",
                needed: HEADER_SIZE as u64,
                available: len,
            });
        }
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        debug!("Opened IIDF file {:?} ({} bytes)", path, mmap.len());

        let header = FileHeader::parse(&mmap)?;
        let lut = Lut::parse(Self::slice_for(&mmap, header.lut, "lookup table")?)?;
        let entries = (0..lut.len() as u32)
            .map(|key| Entry {
                key,
                iid: None,
                segment: None,
            })
            .collect();

        Ok(Self {
            mmap,
            header,
            lut,
            entries,
            groups: None,
            metadata: None,
            autoload: false,
            strict: false,
        })
    }

    /// Let point and rectangle queries materialize missing segments instead
    /// of failing with [`IidError::NotLoaded`].
    pub fn set_autoload(&mut self, autoload: bool) {
        self.autoload = autoload;
    }

    /// Re-check segment envelope and area invariants on every materialization.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Number of entries in the file.
    pub fn len(&self) -> usize {
        self.lut.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lut.is_empty()
    }

    /// Advisory resource-format discriminator from the header.
    pub fn rformat(&self) -> u32 {
        self.header.rformat
    }

    pub fn entry(&self, key: u32) -> Option<&Entry> {
        self.entries.get(key as usize)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// True once every entry has both its IID and its segment materialized.
    /// The writer consults this before re-serializing a read file.
    pub fn is_fully_loaded(&self) -> bool {
        self.entries.iter().all(Entry::is_fully_loaded)
    }

    /// Materialize IIDs and/or segments for a selection of keys and return
    /// the selected entries.
    pub fn fetch(&mut self, opts: &FetchOptions) -> Result<Vec<&Entry>> {
        let load_iids = opts.everything || opts.iids.unwrap_or(true);
        let load_segments = opts.everything || opts.segments.unwrap_or(true);

        let keys: Vec<u32> = if opts.everything || opts.all_keys {
            (0..self.lut.len() as u32).collect()
        } else {
            let mut selected = BTreeSet::new();
            if let Some(keys) = &opts.keys {
                for &key in keys {
                    if self.lut.get(key).is_none() {
                        return Err(IidError::KeyNotFound(key));
                    }
                    selected.insert(key);
                }
            }
            if let Some(groups) = &opts.groups {
                for name in groups {
                    selected.extend(self.group_keys(name)?);
                }
            }
            selected.into_iter().collect()
        };

        debug!(
            "Fetching {} keys (iids: {load_iids}, segments: {load_segments})",
            keys.len()
        );
        for &key in &keys {
            if load_iids {
                self.load_iid(key)?;
            }
            if load_segments {
                self.load_segment(key)?;
            }
        }
        Ok(keys.iter().map(|&key| &self.entries[key as usize]).collect())
    }

    /// Entries whose IID matches any of the given addresses, optionally
    /// constrained to the given domains. Loads the IID block for every key
    /// that has not resolved its IID yet.
    pub fn look_for(
        &mut self,
        addresses: &[&[u8]],
        domains: Option<&[&[u8]]>,
    ) -> Result<Vec<&Entry>> {
        for key in 0..self.lut.len() as u32 {
            self.load_iid(key)?;
        }
        Ok(self
            .entries
            .iter()
            .filter(|e| {
                e.iid.as_ref().is_some_and(|iid| {
                    addresses.iter().any(|a| *a == iid.address())
                        && domains.is_none_or(|ds| ds.iter().any(|d| *d == iid.domain()))
                })
            })
            .collect())
    }

    /// Entries whose segment covers the pixel at column `x`, row `y`.
    ///
    /// Every entry is a candidate until its segment's envelope box is known,
    /// so unresolved segments fail with [`IidError::NotLoaded`] unless
    /// autoload is on.
    pub fn at(&mut self, x: u32, y: u32) -> Result<Vec<&Entry>> {
        for key in 0..self.lut.len() as u32 {
            self.require_segment(key)?;
        }
        Ok(self
            .entries
            .iter()
            .filter(|e| e.segment.as_ref().is_some_and(|s| s.contains(y, x)))
            .collect())
    }

    /// Entries whose segment intersects the query rectangle.
    pub fn region(&mut self, qbox: &Bbox, opts: &RegionOptions) -> Result<Vec<&Entry>> {
        if !opts.only_loaded {
            for key in 0..self.lut.len() as u32 {
                self.load_segment(key)?;
            }
        }
        Ok(self
            .entries
            .iter()
            .filter(|e| {
                e.segment
                    .as_ref()
                    .is_some_and(|s| s.intersects(qbox, opts.conservative))
            })
            .collect())
    }

    /// Apply an in-memory predicate to the currently loaded entries.
    pub fn filter(&mut self, opts: &FilterOptions) -> Result<Vec<&Entry>> {
        let group_members: Option<BTreeSet<u32>> = match &opts.groups {
            Some(names) => {
                let mut members = BTreeSet::new();
                for name in names {
                    members.extend(self.group_keys(name)?);
                }
                Some(members)
            }
            None => None,
        };
        Ok(self
            .entries
            .iter()
            .filter(|e| {
                if e.iid.is_none() && e.segment.is_none() {
                    return false;
                }
                if let Some(members) = &group_members {
                    if !members.contains(&e.key) {
                        return false;
                    }
                }
                if let Some((min, max)) = opts.area {
                    match &e.segment {
                        Some(s) => {
                            if s.area() < min || s.area() > max {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                true
            })
            .collect())
    }

    /// Pairwise overlap graph over the currently loaded segments: an edge
    /// `(a, b)` means the two masks share at least one set pixel. Pairs are
    /// pruned by envelope box before any bits are compared.
    pub fn compute_overlap(&self) -> Vec<(u32, u32)> {
        let loaded: Vec<(u32, &Segment)> = self
            .entries
            .iter()
            .filter_map(|e| e.segment.as_ref().map(|s| (e.key, s)))
            .collect();
        let mut edges = Vec::new();
        for (i, (ka, a)) in loaded.iter().enumerate() {
            for (kb, b) in &loaded[i + 1..] {
                if a.overlaps(b) {
                    edges.push((*ka, *kb));
                }
            }
        }
        debug!(
            "Computed overlap graph: {} edges over {} loaded segments",
            edges.len(),
            loaded.len()
        );
        edges
    }

    /// The decoded metadata document, resolved and cached on first use.
    pub fn metadata(&mut self) -> Result<&serde_json::Value> {
        if self.metadata.is_none() {
            let block = Self::slice_for(&self.mmap, self.header.meta, "metadata block")?;
            let mut dec = Decoder::new(block, "metadata block");
            let value: serde_json::Value = serde_json::from_slice(dec.string()?)
                .map_err(|e| IidError::Corrupt(format!("metadata is not valid JSON: {e}")))?;
            self.metadata = Some(value);
        }
        Ok(self.metadata.get_or_insert_default())
    }

    /// Names of all groups, from the groups header alone.
    pub fn group_names(&mut self) -> Result<Vec<String>> {
        self.ensure_groups()?;
        Ok(self
            .groups
            .get_or_insert_default()
            .names()
            .map(str::to_string)
            .collect())
    }

    /// Member keys of one group, read from the mapped key list.
    pub fn group_keys(&mut self, name: &str) -> Result<Vec<u32>> {
        self.ensure_groups()?;
        let block = Self::slice_for(&self.mmap, self.header.groups, "groups block")?;
        let keys = self.groups.get_or_insert_default().group_keys(name, block)?;
        for &key in &keys {
            if self.lut.get(key).is_none() {
                return Err(IidError::Corrupt(format!(
                    "group {name:?} references key {key} beyond the lookup table"
                )));
            }
        }
        Ok(keys)
    }

    /// Raw bytes of one IID record, borrowed from the mapping.
    pub fn iid_bytes(&self, key: u32) -> Result<&[u8]> {
        let rec = self.lut.get(key).ok_or(IidError::KeyNotFound(key))?;
        let block = Self::slice_for(&self.mmap, self.header.iids, "IID block")?;
        // The lookup table stores IID locations relative to the block start.
        let end = rec.iid_loc.end();
        if end > block.len() as u64 {
            return Err(IidError::Truncated {
                context: "IID record",
                needed: end,
                available: block.len() as u64,
            });
        }
        Ok(&block[rec.iid_loc.range()])
    }

    /// Raw bytes of one segment record, borrowed from the mapping.
    pub fn segment_bytes(&self, key: u32) -> Result<&[u8]> {
        let rec = self.lut.get(key).ok_or(IidError::KeyNotFound(key))?;
        Self::slice_for(&self.mmap, rec.seg_loc, "segment record")
    }

    /// Convert into a writable entry set, re-keying densely.
    ///
    /// Refuses with [`IidError::NotLoaded`] unless every entry is fully
    /// materialized or `allow_partial` is set, in which case entries that
    /// were never loaded are dropped from the result.
    pub fn to_entry_set(&mut self, allow_partial: bool) -> Result<EntrySet> {
        if !allow_partial {
            for entry in &self.entries {
                if entry.iid.is_none() {
                    return Err(IidError::NotLoaded {
                        key: entry.key,
                        what: "IID",
                    });
                }
                if entry.segment.is_none() {
                    return Err(IidError::NotLoaded {
                        key: entry.key,
                        what: "segment",
                    });
                }
            }
        }

        let mut set = EntrySet::new();
        set.set_metadata(self.metadata()?.clone());

        let mut remap = HashMap::new();
        for entry in &self.entries {
            if let (Some(iid), Some(segment)) = (&entry.iid, &entry.segment) {
                let key = set.add(iid.clone(), segment.clone(), &[])?;
                remap.insert(entry.key, key);
            }
        }
        for name in self.group_names()? {
            for old in self.group_keys(&name)? {
                if let Some(&new) = remap.get(&old) {
                    set.assign_group(&name, new)?;
                }
            }
        }
        Ok(set)
    }

    fn slice_for<'m>(mmap: &'m Mmap, loc: BufLoc, context: &'static str) -> Result<&'m [u8]> {
        let end = loc.end();
        if end > mmap.len() as u64 {
            return Err(IidError::Truncated {
                context,
                needed: end,
                available: mmap.len() as u64,
            });
        }
        Ok(&mmap[loc.range()])
    }

    fn ensure_groups(&mut self) -> Result<()> {
        if self.groups.is_some() {
            return Ok(());
        }
        let block = Self::slice_for(&self.mmap, self.header.groups, "groups block")?;
        let index = GroupsIndex::parse(block)?;
        debug!("Parsed groups header: {} groups", index.len());
        self.groups = Some(index);
        Ok(())
    }

    fn load_iid(&mut self, key: u32) -> Result<()> {
        if self.entries[key as usize].iid.is_some() {
            return Ok(());
        }
        let buf = self.iid_bytes(key)?;
        let mut dec = Decoder::new(buf, "IID record");
        let embedded = dec.u32()?;
        if embedded != key {
            return Err(IidError::Corrupt(format!(
                "IID record for key {key} carries key {embedded}"
            )));
        }
        let domain_len = dec.u32()?;
        let address_len = dec.u32()?;
        let domain = dec.bytes(domain_len as usize)?.to_vec();
        let address = dec.bytes(address_len as usize)?.to_vec();
        if !dec.is_empty() {
            return Err(IidError::Corrupt(format!(
                "IID record for key {key} has {} trailing bytes",
                dec.remaining()
            )));
        }
        trace!("Resolved IID for key {key}");
        self.entries[key as usize].iid = Some(Iid::new(domain, address));
        Ok(())
    }

    fn load_segment(&mut self, key: u32) -> Result<()> {
        if self.entries[key as usize].segment.is_some() {
            return Ok(());
        }
        let (embedded, segment) = Segment::read_record(self.segment_bytes(key)?)?;
        if embedded != key {
            return Err(IidError::Corrupt(format!(
                "segment record for key {key} carries key {embedded}"
            )));
        }
        if self.strict {
            segment.validate()?;
        }
        trace!("Resolved segment for key {key}: area {}", segment.area());
        self.entries[key as usize].segment = Some(segment);
        Ok(())
    }

    fn require_segment(&mut self, key: u32) -> Result<()> {
        if self.entries[key as usize].segment.is_some() {
            return Ok(());
        }
        if self.autoload {
            self.load_segment(key)
        } else {
            Err(IidError::NotLoaded {
                key,
                what: "segment",
            })
        }
    }
}
