//! IIDF segmentation file storage
//!
//! This crate implements the IIDF binary format: a file holds a collection
//! of entries, each pairing a globally unique Individual IDentifier (an
//! opaque `(domain, address)` byte pair) with a segment (a binary image mask
//! stored as one or more rectangular regions). The format is built so a
//! consumer can memory-map a file and materialize subsets on demand: headers
//! and lookup table only, IIDs only, segments only, the members of named
//! groups, or explicit key lists, without parsing the whole buffer.
//!
//! [`IidFile`] is the lazy reader, [`EntrySet`] the in-memory collection
//! behind the writer, and [`Segment`]/[`Mask`] the segment data model.

pub mod codec;
pub mod error;
pub mod file;
pub mod index;
pub mod segment;
pub mod storage;
pub mod types;

pub use error::{IidError, Result};
pub use file::{Entry, FetchOptions, FilterOptions, IidFile, RegionOptions};
pub use segment::{Mask, Region, Segment};
pub use storage::EntrySet;
pub use types::{Bbox, BufLoc, Iid};
