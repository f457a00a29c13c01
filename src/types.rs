//! Common types used throughout the IIDF storage crate

use std::fmt;
use std::ops::Range;

/// Individual IDentifier: a `(domain, address)` pair of opaque byte strings
/// that globally names one individual.
///
/// Both halves may be empty. Equality and hashing are byte-exact; no encoding
/// is assumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Iid {
    domain: Vec<u8>,
    address: Vec<u8>,
}

impl Iid {
    pub fn new(domain: impl Into<Vec<u8>>, address: impl Into<Vec<u8>>) -> Self {
        Self {
            domain: domain.into(),
            address: address.into(),
        }
    }

    pub fn domain(&self) -> &[u8] {
        &self.domain
    }

    pub fn address(&self) -> &[u8] {
        &self.address
    }
}

impl fmt::Display for Iid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            String::from_utf8_lossy(&self.domain),
            String::from_utf8_lossy(&self.address)
        )
    }
}

/// Location of a byte slice inside the file: `(offset, length)`.
///
/// Offsets are absolute file offsets everywhere except the per-entry IID
/// locations stored in the lookup table, which are relative to the start of
/// the IID block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufLoc {
    pub offset: u32,
    pub length: u32,
}

impl BufLoc {
    /// Serialized size: two little-endian `u32`s.
    pub const SIZE: usize = 8;

    /// Placeholder location written before the real one is known.
    pub const NULL: BufLoc = BufLoc {
        offset: 0,
        length: 0,
    };

    pub fn new(offset: u32, length: u32) -> Self {
        Self { offset, length }
    }

    /// One-past-the-end byte offset, widened so it cannot wrap.
    pub fn end(&self) -> u64 {
        self.offset as u64 + self.length as u64
    }

    pub fn range(&self) -> Range<usize> {
        self.offset as usize..self.offset as usize + self.length as usize
    }
}

/// Rectangular bounding box in image coordinates, half-open on both axes:
/// rows `min_row..max_row`, columns `min_col..max_col`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bbox {
    pub min_row: u32,
    pub min_col: u32,
    pub max_row: u32,
    pub max_col: u32,
}

impl Bbox {
    /// Serialized size: four little-endian `u32`s.
    pub const SIZE: usize = 16;

    pub fn new(min_row: u32, min_col: u32, max_row: u32, max_col: u32) -> Self {
        Self {
            min_row,
            min_col,
            max_row,
            max_col,
        }
    }

    pub fn height(&self) -> u32 {
        self.max_row - self.min_row
    }

    pub fn width(&self) -> u32 {
        self.max_col - self.min_col
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0 || self.width() == 0
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.min_row && row < self.max_row && col >= self.min_col && col < self.max_col
    }

    pub fn intersects(&self, other: &Bbox) -> bool {
        self.min_row < other.max_row
            && other.min_row < self.max_row
            && self.min_col < other.max_col
            && other.min_col < self.max_col
    }

    /// Overlapping area of two boxes, or `None` when they are disjoint.
    pub fn intersection(&self, other: &Bbox) -> Option<Bbox> {
        if !self.intersects(other) {
            return None;
        }
        Some(Bbox::new(
            self.min_row.max(other.min_row),
            self.min_col.max(other.min_col),
            self.max_row.min(other.max_row),
            self.max_col.min(other.max_col),
        ))
    }

    /// Element-wise min/max envelope of two boxes.
    pub fn envelope(&self, other: &Bbox) -> Bbox {
        Bbox::new(
            self.min_row.min(other.min_row),
            self.min_col.min(other.min_col),
            self.max_row.max(other.max_row),
            self.max_col.max(other.max_col),
        )
    }
}

/// One record of the lookup table: a dense key plus the locations of the
/// entry's IID record (IID-block-relative) and segment record (absolute).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutEntry {
    pub key: u32,
    pub iid_loc: BufLoc,
    pub seg_loc: BufLoc,
}
