use crate::*;
use anyhow::Result;
use bloom::BloomProbe;
use memtable::{Key, Record};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn int(n: i64) -> Key {
    Key::Int(n)
}

/// Table over integer keys `keys`, each with value `v{key}`.
fn table_of(keys: &[i64], opts: TableOptions) -> SSTable {
    let records = keys
        .iter()
        .enumerate()
        .map(|(i, &k)| Record::put(int(k), format!("v{}", k), i as u64 + 1))
        .collect();
    SSTable::new(1, 3, records, opts)
}

// -------------------- Construction --------------------

#[test]
fn new_sorts_and_stamps_generation() -> Result<()> {
    let t = table_of(&[5, 1, 3], TableOptions::default());
    let keys: Vec<_> = t.records().iter().map(|r| r.key.clone()).collect();
    assert_eq!(keys, vec![int(1), int(3), int(5)]);
    assert!(t.records().iter().all(|r| r.generation == 3));
    assert_eq!(t.generation(), 3);
    assert_eq!(t.first_key(), Some(&int(1)));
    assert_eq!(t.last_key(), Some(&int(5)));
    Ok(())
}

#[test]
fn max_timestamp_ignores_key_order() -> Result<()> {
    // Timestamps 1, 2, 3 land on keys 5, 1, 3.
    let t = table_of(&[5, 1, 3], TableOptions::default());
    assert_eq!(t.max_timestamp(), 3);
    assert_eq!(t.get(&int(5)).map(|r| r.timestamp), Some(1));
    Ok(())
}

#[test]
fn empty_table_has_no_range() -> Result<()> {
    let t = SSTable::new(1, 1, Vec::new(), TableOptions::default());
    assert!(t.is_empty());
    assert_eq!(t.max_timestamp(), 0);
    assert!(!t.key_in_range(&int(0)));
    assert!(!t.overlaps(&int(0), &int(10)));
    Ok(())
}

#[test]
fn key_in_range_and_overlaps() -> Result<()> {
    let t = table_of(&[10, 20, 30], TableOptions::default());
    assert!(t.key_in_range(&int(15)));
    assert!(!t.key_in_range(&int(31)));
    assert!(t.overlaps(&int(25), &int(40)));
    assert!(t.overlaps(&int(0), &int(10)));
    assert!(!t.overlaps(&int(31), &int(40)));
    Ok(())
}

// -------------------- Point lookup --------------------

#[test]
fn lookup_without_fence_skips_nothing() -> Result<()> {
    let t = table_of(&[1, 2, 3, 4, 5, 6], TableOptions::default());
    let l = t.lookup(&int(4), false);
    assert_eq!(l.record.map(|r| r.display_value()), Some("v4"));
    assert_eq!(l.blocks_skipped, 0);
    Ok(())
}

#[test]
fn lookup_with_fence_skips_other_blocks() -> Result<()> {
    // Blocks of two: [1,2] [3,4] [5,6]
    let t = table_of(&[1, 2, 3, 4, 5, 6], TableOptions::default());
    let l = t.lookup(&int(4), true);
    assert_eq!(l.record.map(|r| r.display_value()), Some("v4"));
    assert_eq!(l.blocks_skipped, 2);

    // Falls in a gap between blocks: nothing scanned.
    let t = table_of(&[1, 2, 10, 11], TableOptions::default());
    let l = t.lookup(&int(5), true);
    assert!(l.record.is_none());
    assert_eq!(l.blocks_skipped, 2);
    Ok(())
}

#[test]
fn lookup_finds_tombstones() -> Result<()> {
    let records = vec![Record::tombstone(int(7), 1, 0)];
    let t = SSTable::new(1, 1, records, TableOptions::default());
    let l = t.lookup(&int(7), true);
    assert!(l.record.map_or(false, |r| r.is_tombstone()));
    Ok(())
}

// -------------------- Range scan --------------------

#[test]
fn scan_range_is_inclusive() -> Result<()> {
    let t = table_of(&[1, 2, 3, 4, 5, 6], TableOptions::default());
    let scan = t.scan_range(&int(2), &int(5), false);
    let keys: Vec<_> = scan.records.iter().map(|r| r.key.clone()).collect();
    assert_eq!(keys, vec![int(2), int(3), int(4), int(5)]);
    assert_eq!(scan.blocks_skipped, 0);
    Ok(())
}

#[test]
fn scan_range_with_fence_skips_disjoint_blocks() -> Result<()> {
    let t = table_of(&[1, 2, 3, 4, 5, 6, 7, 8], TableOptions::default());
    let scan = t.scan_range(&int(3), &int(4), true);
    assert_eq!(scan.records.len(), 2);
    assert_eq!(scan.blocks_skipped, 3);
    Ok(())
}

// -------------------- Bloom --------------------

#[test]
fn bloom_probe_never_rejects_present_key() -> Result<()> {
    let opts = TableOptions {
        bloom_false_positive_rate: 0.0,
        ..TableOptions::default()
    };
    let t = table_of(&[1, 2, 3], opts);
    let mut rng = StdRng::seed_from_u64(1);
    assert_eq!(t.bloom_probe(&int(2), &mut rng), BloomProbe::Present);
    assert_eq!(t.bloom_probe(&int(9), &mut rng), BloomProbe::Absent);
    Ok(())
}
