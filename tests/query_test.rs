//! Point, rectangle, filter, and overlap queries

use iid_storage::{
    Bbox, EntrySet, FetchOptions, FilterOptions, Iid, IidFile, Mask, RegionOptions,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use std::path::PathBuf;

/// Two 2x2 squares overlapping at pixel (1, 1), plus a far-away singleton.
fn overlap_file(dir: &std::path::Path) -> PathBuf {
    let path = dir.join("overlap.iidf");
    let full = Mask::from_rows(&[vec![true, true], vec![true, true]]);
    let mut set = EntrySet::new();
    set.add_mask(Iid::new("ex", "lower"), Bbox::new(0, 0, 2, 2), &full, &["near"])
        .unwrap();
    set.add_mask(Iid::new("ex", "upper"), Bbox::new(1, 1, 3, 3), &full, &["near"])
        .unwrap();
    set.add_mask(
        Iid::new("ex", "far"),
        Bbox::new(20, 20, 21, 21),
        &Mask::from_rows(&[vec![true]]),
        &["far"],
    )
    .unwrap();
    set.save(&path).unwrap();
    path
}

#[test]
fn overlap_graph_has_one_edge() {
    let dir = tempdir().unwrap();
    let mut file = IidFile::open(overlap_file(dir.path())).unwrap();
    file.fetch(&FetchOptions::everything()).unwrap();

    assert_eq!(file.compute_overlap(), vec![(0, 1)]);

    // The shared pixel resolves to both entries.
    let hits = file.at(1, 1).unwrap();
    let keys: Vec<u32> = hits.iter().map(|e| e.key()).collect();
    assert_eq!(keys, vec![0, 1]);

    // A pixel owned by only one of them.
    assert_eq!(file.at(0, 0).unwrap()[0].key(), 0);
    assert_eq!(file.at(2, 2).unwrap()[0].key(), 1);
}

#[test]
fn overlap_only_considers_loaded_segments() {
    let dir = tempdir().unwrap();
    let mut file = IidFile::open(overlap_file(dir.path())).unwrap();
    assert!(file.compute_overlap().is_empty());

    file.fetch(&FetchOptions {
        keys: Some(vec![0, 2]),
        ..Default::default()
    })
    .unwrap();
    // Key 1 is not loaded, so its edge cannot exist yet.
    assert!(file.compute_overlap().is_empty());
}

#[test]
fn region_queries_distinguish_exact_from_conservative() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("holes.iidf");
    let mut set = EntrySet::new();
    // Bit pattern 101 / 110: pixel (1, 2) is inside the box but clear.
    set.add_mask(
        Iid::new("ex", "tree"),
        Bbox::new(0, 0, 2, 3),
        &Mask::from_rows(&[vec![true, false, true], vec![true, true, false]]),
        &[],
    )
    .unwrap();
    set.save(&path).unwrap();

    let mut file = IidFile::open(&path).unwrap();
    let probe = Bbox::new(1, 2, 2, 3);
    assert!(
        file.region(&probe, &RegionOptions::default())
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        file.region(
            &probe,
            &RegionOptions {
                conservative: true,
                ..Default::default()
            }
        )
        .unwrap()
        .len(),
        1
    );

    let outside = Bbox::new(5, 5, 8, 8);
    assert!(
        file.region(&outside, &RegionOptions { conservative: true, ..Default::default() })
            .unwrap()
            .is_empty()
    );
}

#[test]
fn region_with_only_loaded_performs_no_io() {
    let dir = tempdir().unwrap();
    let mut file = IidFile::open(overlap_file(dir.path())).unwrap();

    let everywhere = Bbox::new(0, 0, 50, 50);
    let opts = RegionOptions {
        only_loaded: true,
        ..Default::default()
    };
    // Nothing materialized, nothing returned, nothing read.
    assert!(file.region(&everywhere, &opts).unwrap().is_empty());
    assert!(file.entries().iter().all(|e| e.segment().is_none()));

    file.fetch(&FetchOptions {
        keys: Some(vec![2]),
        ..Default::default()
    })
    .unwrap();
    let hits = file.region(&everywhere, &opts).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].key(), 2);

    // Without the restriction the query materializes the rest.
    let hits = file.region(&everywhere, &RegionOptions::default()).unwrap();
    assert_eq!(hits.len(), 3);
}

#[test]
fn filter_applies_in_memory_predicates() {
    let dir = tempdir().unwrap();
    let mut file = IidFile::open(overlap_file(dir.path())).unwrap();
    file.fetch(&FetchOptions::everything()).unwrap();

    // Areas: two 4-pixel squares and one singleton.
    let big = file
        .filter(&FilterOptions {
            area: Some((2, 10)),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(big.len(), 2);

    let far = file
        .filter(&FilterOptions {
            groups: Some(vec!["far".to_string()]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(far.len(), 1);
    assert_eq!(far[0].key(), 2);

    let near_small = file
        .filter(&FilterOptions {
            groups: Some(vec!["near".to_string()]),
            area: Some((0, 1)),
            ..Default::default()
        })
        .unwrap();
    assert!(near_small.is_empty());
}

#[test]
fn filter_excludes_entries_with_unresolved_attributes() {
    let dir = tempdir().unwrap();
    let mut file = IidFile::open(overlap_file(dir.path())).unwrap();

    // Only key 0 has anything loaded, and only its IID.
    file.fetch(&FetchOptions {
        keys: Some(vec![0]),
        segments: Some(false),
        ..Default::default()
    })
    .unwrap();

    // An area predicate needs the segment, which is unresolved for
    // everything.
    let by_area = file
        .filter(&FilterOptions {
            area: Some((0, 100)),
            ..Default::default()
        })
        .unwrap();
    assert!(by_area.is_empty());

    // Without predicates the filter still reports only loaded entries.
    let loaded = file.filter(&FilterOptions::default()).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].key(), 0);
}
