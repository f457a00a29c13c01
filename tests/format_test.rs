//! Bit-exact layout checks against hand-decoded files

use iid_storage::{Bbox, EntrySet, FetchOptions, Iid, IidError, IidFile, Mask};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use std::path::{Path, PathBuf};

const HEADER_SIZE: usize = 48;
const LUT_RECORD_SIZE: usize = 20;

fn single_entry_file(dir: &Path) -> PathBuf {
    let path = dir.join("single.iidf");
    let mut set = EntrySet::new();
    set.add_mask(
        Iid::new("ex", "tree"),
        Bbox::new(0, 0, 2, 3),
        &Mask::from_rows(&[vec![true, false, true], vec![true, true, false]]),
        &["g"],
    )
    .unwrap();
    set.save(&path).unwrap();
    path
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

#[test]
fn alternating_row_packs_msb_first() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bits.iidf");

    let mut set = EntrySet::new();
    set.add_mask(
        Iid::new("ex", "stripe"),
        Bbox::new(0, 0, 1, 9),
        &Mask::from_rows(&[vec![
            true, false, true, false, true, false, true, false, true,
        ]]),
        &[],
    )
    .unwrap();
    set.save(&path).unwrap();

    let file = IidFile::open(&path).unwrap();
    let record = file.segment_bytes(0).unwrap();
    // key, bbox, area, region count, then one region: mask length, bbox,
    // mask bytes.
    assert_eq!(u32_at(record, 0), 0);
    assert_eq!(u32_at(record, 20), 5); // area
    assert_eq!(u32_at(record, 24), 1); // region count
    assert_eq!(u32_at(record, 28), 2); // mask length
    assert_eq!(&record[record.len() - 2..], &[0xAA, 0x80]);

    // And it round-trips.
    let mut file = IidFile::open(&path).unwrap();
    let entries = file.fetch(&FetchOptions::everything()).unwrap();
    let segment = entries[0].segment().unwrap();
    assert_eq!(segment.area(), 5);
    assert!(segment.contains(0, 8));
    assert!(!segment.contains(0, 7));
}

#[test]
fn header_is_48_bytes_and_lut_is_packed_20_byte_records() {
    let dir = tempdir().unwrap();
    let bytes = std::fs::read(single_entry_file(dir.path())).unwrap();

    assert_eq!(u32_at(&bytes, 0), 1); // version
    assert_eq!(u32_at(&bytes, 4), 0); // rformat: image

    let lut_offset = u32_at(&bytes, 8) as usize;
    let lut_length = u32_at(&bytes, 12) as usize;
    assert_eq!(lut_offset, HEADER_SIZE);
    assert_eq!(lut_length % LUT_RECORD_SIZE, 0);
    assert_eq!(lut_length / LUT_RECORD_SIZE, 1);

    // The lookup table's IID location is relative to the IID block.
    let iids_offset = u32_at(&bytes, 16) as usize;
    let rel = u32_at(&bytes, lut_offset + 4) as usize;
    assert_eq!(rel, 0);
    assert_eq!(u32_at(&bytes, iids_offset + rel), 0); // embedded key
    // Domain and address bytes follow the three leading fields.
    let record = &bytes[iids_offset + rel..];
    assert_eq!(u32_at(record, 4), 2);
    assert_eq!(u32_at(record, 8), 4);
    assert_eq!(&record[12..14], b"ex");
    assert_eq!(&record[14..18], b"tree");

    // The segment location is absolute.
    let seg_offset = u32_at(&bytes, lut_offset + 12) as usize;
    assert_eq!(u32_at(&bytes, seg_offset), 0);
}

#[test]
fn unknown_version_is_rejected() {
    let dir = tempdir().unwrap();
    let path = single_entry_file(dir.path());
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0..4].copy_from_slice(&2u32.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        IidFile::open(&path),
        Err(IidError::BadVersion { found: 2, .. })
    ));
}

#[test]
fn short_files_are_truncated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("short.iidf");
    std::fs::write(&path, [1, 0, 0, 0]).unwrap();
    assert!(matches!(
        IidFile::open(&path),
        Err(IidError::Truncated { .. })
    ));
}

#[test]
fn ragged_lookup_table_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = single_entry_file(dir.path());
    let mut bytes = std::fs::read(&path).unwrap();
    // Shrink the declared LUT length so it stops being a record multiple.
    bytes[12..16].copy_from_slice(&19u32.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(IidFile::open(&path), Err(IidError::Corrupt(_))));
}

#[test]
fn overshooting_block_is_truncated() {
    let dir = tempdir().unwrap();
    let path = single_entry_file(dir.path());
    let mut bytes = std::fs::read(&path).unwrap();
    // Point the LUT past the end of the file (still a record multiple).
    let len = bytes.len() as u32;
    bytes[8..12].copy_from_slice(&len.to_le_bytes());
    bytes[12..16].copy_from_slice(&20u32.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        IidFile::open(&path),
        Err(IidError::Truncated { .. })
    ));
}

#[test]
fn mismatched_region_mask_length_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = single_entry_file(dir.path());
    let mut bytes = std::fs::read(&path).unwrap();

    // Widen the region's box without growing its mask bytes.
    let lut_offset = u32_at(&bytes, 8) as usize;
    let seg_offset = u32_at(&bytes, lut_offset + 12) as usize;
    let region_bbox = seg_offset + 32;
    bytes[region_bbox + 12..region_bbox + 16].copy_from_slice(&100u32.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let mut file = IidFile::open(&path).unwrap();
    assert!(matches!(
        file.fetch(&FetchOptions::everything()),
        Err(IidError::Corrupt(_))
    ));
}

#[test]
fn strict_mode_checks_the_recorded_area() {
    let dir = tempdir().unwrap();
    let path = single_entry_file(dir.path());
    let mut bytes = std::fs::read(&path).unwrap();

    let lut_offset = u32_at(&bytes, 8) as usize;
    let seg_offset = u32_at(&bytes, lut_offset + 12) as usize;
    // Bump the recorded area; the mask still has 4 set bits.
    bytes[seg_offset + 20..seg_offset + 24].copy_from_slice(&9u32.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    // Lenient readers take the recorded value.
    let mut file = IidFile::open(&path).unwrap();
    let entries = file.fetch(&FetchOptions::everything()).unwrap();
    assert_eq!(entries[0].segment().unwrap().area(), 9);

    let mut strict = IidFile::open(&path).unwrap();
    strict.set_strict(true);
    assert!(matches!(
        strict.fetch(&FetchOptions::everything()),
        Err(IidError::Corrupt(_))
    ));
}
