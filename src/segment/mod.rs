//! Segment data model: binary image masks decomposed into rectangular
//! regions

mod mask;
mod region;

pub use mask::Mask;
pub use region::Region;

use crate::codec::{self, Decoder};
use crate::error::{IidError, Result};
use crate::types::Bbox;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

/// A binary mask over an image, stored as one or more rectangular regions so
/// that empty space is not serialized.
///
/// Invariants: at least one region; `bbox` is the element-wise envelope of
/// the region boxes; `area` is the total number of set bits across the
/// regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    bbox: Bbox,
    area: u32,
    regions: Vec<Region>,
}

impl Segment {
    /// Assemble a segment from regions, computing the envelope and area.
    pub fn new(regions: Vec<Region>) -> Result<Self> {
        let mut iter = regions.iter();
        let first = iter
            .next()
            .ok_or_else(|| IidError::Corrupt("segment requires at least one region".into()))?;
        let bbox = iter.fold(*first.bbox(), |acc, r| acc.envelope(r.bbox()));
        let area = regions.iter().map(Region::count_ones).sum();
        Ok(Self { bbox, area, regions })
    }

    /// Decompose a mask covering `bbox` into regions.
    ///
    /// The cover used here is contiguous bands of non-empty rows, each
    /// clipped to its set-column extent. Any cover whose union reproduces the
    /// mask is a valid serialization; an all-empty mask degenerates to a
    /// single zero-extent region at the box origin.
    pub fn from_mask(bbox: Bbox, mask: &Mask) -> Result<Self> {
        if mask.height() != bbox.height() || mask.width() != bbox.width() {
            return Err(IidError::Corrupt(format!(
                "mask is {}x{} but bounding box is {}x{}",
                mask.height(),
                mask.width(),
                bbox.height(),
                bbox.width()
            )));
        }

        let mut regions = Vec::new();
        let mut r = 0;
        while r < mask.height() {
            if row_is_empty(mask, r) {
                r += 1;
                continue;
            }
            let band_start = r;
            let mut min_col = u32::MAX;
            let mut max_col = 0;
            while r < mask.height() && !row_is_empty(mask, r) {
                for c in 0..mask.width() {
                    if mask.get(r, c) {
                        min_col = min_col.min(c);
                        max_col = max_col.max(c);
                    }
                }
                r += 1;
            }
            let band = Bbox::new(
                bbox.min_row + band_start,
                bbox.min_col + min_col,
                bbox.min_row + r,
                bbox.min_col + max_col + 1,
            );
            regions.push(Region::from_mask(band, mask, bbox.min_row, bbox.min_col));
        }

        if regions.is_empty() {
            let origin = Bbox::new(bbox.min_row, bbox.min_col, bbox.min_row, bbox.min_col);
            regions.push(Region::from_mask(origin, mask, bbox.min_row, bbox.min_col));
        }

        Self::new(regions)
    }

    pub fn bbox(&self) -> &Bbox {
        &self.bbox
    }

    pub fn area(&self) -> u32 {
        self.area
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Point test: true iff some region's box contains the pixel and the
    /// corresponding bit is set.
    pub fn contains(&self, row: u32, col: u32) -> bool {
        self.bbox.contains(row, col) && self.regions.iter().any(|r| r.contains(row, col))
    }

    /// Rectangle test. Conservative mode only consults the envelope box;
    /// exact mode additionally requires a set bit inside the query.
    pub fn intersects(&self, qbox: &Bbox, conservative: bool) -> bool {
        if !self.bbox.intersects(qbox) {
            return false;
        }
        if conservative {
            return true;
        }
        self.regions.iter().any(|r| r.intersects_area(qbox))
    }

    /// Reconstruct the mask over the segment's own bounding box.
    pub fn to_mask(&self) -> Mask {
        self.mask_in(&self.bbox)
    }

    /// Reconstruct the mask restricted to a query rectangle. Only regions
    /// whose box intersects the rectangle are walked; regions union.
    pub fn mask_in(&self, qbox: &Bbox) -> Mask {
        let mut mask = Mask::new(qbox.height(), qbox.width());
        for region in &self.regions {
            let Some(overlap) = region.bbox().intersection(qbox) else {
                continue;
            };
            for row in overlap.min_row..overlap.max_row {
                for col in overlap.min_col..overlap.max_col {
                    if region.contains(row, col) {
                        mask.set(row - qbox.min_row, col - qbox.min_col, true);
                    }
                }
            }
        }
        mask
    }

    /// True iff the two segments share at least one set pixel.
    pub fn overlaps(&self, other: &Segment) -> bool {
        if !self.bbox.intersects(&other.bbox) {
            return false;
        }
        for a in &self.regions {
            for b in &other.regions {
                let Some(overlap) = a.bbox().intersection(b.bbox()) else {
                    continue;
                };
                for row in overlap.min_row..overlap.max_row {
                    for col in overlap.min_col..overlap.max_col {
                        if a.contains(row, col) && b.contains(row, col) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Re-check the envelope and area invariants against the regions.
    pub fn validate(&self) -> Result<()> {
        let envelope = self
            .regions
            .iter()
            .skip(1)
            .fold(*self.regions[0].bbox(), |acc, r| acc.envelope(r.bbox()));
        if envelope != self.bbox {
            return Err(IidError::Corrupt(format!(
                "segment box {:?} is not the envelope of its regions ({envelope:?})",
                self.bbox
            )));
        }
        let area: u32 = self.regions.iter().map(Region::count_ones).sum();
        if area != self.area {
            return Err(IidError::Corrupt(format!(
                "segment area {} disagrees with its {} set bits",
                self.area, area
            )));
        }
        Ok(())
    }

    /// Decode one segment-block record, returning the embedded key.
    pub(crate) fn read_record(buf: &[u8]) -> Result<(u32, Segment)> {
        let mut dec = Decoder::new(buf, "segment record");
        let key = dec.u32()?;
        let bbox = read_checked_bbox(&mut dec)?;
        let area = dec.u32()?;
        let region_count = dec.u32()?;
        if region_count == 0 {
            return Err(IidError::Corrupt(format!(
                "segment record for key {key} has no regions"
            )));
        }
        let mut regions = Vec::with_capacity(region_count as usize);
        for _ in 0..region_count {
            let mask_len = dec.u32()?;
            let rbox = read_checked_bbox(&mut dec)?;
            let bytes = dec.bytes(mask_len as usize)?;
            regions.push(Region::new(rbox, bytes.to_vec())?);
        }
        if !dec.is_empty() {
            return Err(IidError::Corrupt(format!(
                "segment record for key {key} has {} trailing bytes",
                dec.remaining()
            )));
        }
        Ok((key, Segment { bbox, area, regions }))
    }

    /// Encode one segment-block record.
    pub(crate) fn write_record<W: Write>(&self, w: &mut W, key: u32) -> Result<()> {
        w.write_u32::<LittleEndian>(key)?;
        codec::write_bbox(w, &self.bbox)?;
        w.write_u32::<LittleEndian>(self.area)?;
        w.write_u32::<LittleEndian>(codec::narrow(self.regions.len() as u64, "region count")?)?;
        for region in &self.regions {
            let mask = region.mask_bytes();
            w.write_u32::<LittleEndian>(codec::narrow(mask.len() as u64, "region mask")?)?;
            codec::write_bbox(w, region.bbox())?;
            w.write_all(mask)?;
        }
        Ok(())
    }
}

fn read_checked_bbox(dec: &mut Decoder<'_>) -> Result<Bbox> {
    let bbox = dec.bbox()?;
    if bbox.min_row > bbox.max_row || bbox.min_col > bbox.max_col {
        return Err(IidError::Corrupt(format!("inverted bounding box {bbox:?}")));
    }
    Ok(bbox)
}

fn row_is_empty(mask: &Mask, row: u32) -> bool {
    (0..mask.width()).all(|c| !mask.get(row, c))
}
