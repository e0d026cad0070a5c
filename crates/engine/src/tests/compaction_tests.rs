use std::sync::Arc;

use super::helpers::*;
use crate::compaction::{level_capacity, similar_size_group};
use crate::*;
use anyhow::Result;
use memtable::Key;
use sstable::{SSTable, TableOptions};

fn leveled() -> config::EngineConfigBuilder {
    config().compaction_strategy(CompactionStrategy::Leveled)
}

fn table_of_len(id: u64, len: i64) -> Arc<SSTable> {
    let records = (0..len)
        .map(|k| memtable::Record::put(Key::Int(k), "v", k as u64 + 1))
        .collect();
    Arc::new(SSTable::new(id, 1, records, TableOptions::default()))
}

/// Asserts that no two files of any level >= 1 share a key range.
fn assert_levels_disjoint(levels: &[Vec<Arc<SSTable>>]) {
    for (level, files) in levels.iter().enumerate().skip(1) {
        let mut ranges: Vec<(Key, Key)> = files
            .iter()
            .map(|f| (f.first_key().unwrap().clone(), f.last_key().unwrap().clone()))
            .collect();
        ranges.sort();
        for pair in ranges.windows(2) {
            assert!(
                pair[0].1 < pair[1].0,
                "overlapping files in L{}: {:?} and {:?}",
                level,
                pair[0],
                pair[1]
            );
        }
    }
}

// --------------------- Size-tiered ---------------------

#[tokio::test]
async fn two_similar_tables_merge_into_one() -> Result<()> {
    let engine = engine(
        config()
            .key_kind(KeyKind::String)
            .memtable_capacity(3)
            .size_tiered_threshold(2),
    );
    for (k, v) in [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5"), ("f", "6")] {
        engine.put(s(k), v).await?;
    }
    engine.wait_idle().await;

    let snap = engine.snapshot();
    let tables = snap.tables.tables().unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].len(), 6);
    assert_eq!(tables[0].generation(), 2, "max generation among inputs");
    assert_eq!(snap.stats.compactions, 1);
    assert_eq!(snap.compaction_round, 1);
    assert!(!snap.compacting);

    for k in ["a", "b", "c", "d", "e", "f"] {
        assert!(engine.get(s(k)).await?.found, "{} lost in compaction", k);
    }
    Ok(())
}

#[tokio::test]
async fn merge_keeps_newest_timestamp() -> Result<()> {
    let engine = engine(
        config()
            .key_kind(KeyKind::String)
            .memtable_capacity(2)
            .size_tiered_threshold(2),
    );
    put_all(&engine, &[(s("a"), "old"), (s("b"), "1")]).await?;
    engine.wait_idle().await;
    put_all(&engine, &[(s("a"), "new"), (s("c"), "1")]).await?;
    engine.wait_idle().await;

    let snap = engine.snapshot();
    let tables = snap.tables.tables().unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].len(), 3);
    let a = engine.get(s("a")).await?;
    assert_eq!(a.value.as_deref(), Some("new"));
    Ok(())
}

#[test]
fn similar_sizes_group_within_ten_percent() {
    let tables = vec![table_of_len(1, 30), table_of_len(2, 10), table_of_len(3, 11)];
    let group = similar_size_group(&tables, 2).unwrap();
    let mut ids: Vec<_> = group.iter().map(|t| t.id()).collect();
    ids.sort();
    assert_eq!(ids, vec![2, 3]);

    let apart = vec![table_of_len(1, 10), table_of_len(2, 12)];
    assert!(similar_size_group(&apart, 2).is_none());
}

#[test]
fn similarity_chains_single_link() {
    // 10 -> 11 -> 12 chain even though 10 and 12 are 20% apart.
    let tables = vec![table_of_len(1, 10), table_of_len(2, 11), table_of_len(3, 12)];
    let group = similar_size_group(&tables, 3).unwrap();
    assert_eq!(group.len(), 3);
}

#[tokio::test]
async fn compaction_reports_write_amplification() -> Result<()> {
    let engine = engine(config().memtable_capacity(2).size_tiered_threshold(2));
    for i in 0..4 {
        engine.put(int(i), "v").await?;
    }
    engine.wait_idle().await;

    let stats = engine.snapshot().stats;
    assert_eq!(stats.user_writes, 4);
    assert_eq!(stats.records_flushed, 4);
    assert_eq!(stats.records_compacted_in, 4);
    assert_eq!(stats.records_compacted_out, 4);
    assert!((stats.write_amplification() - 2.0).abs() < f64::EPSILON);
    Ok(())
}

/// Flushes one table of `keys.len()` records by sizing the memtable to fit.
async fn flush_table(engine: &Engine, keys: &[(i64, &str)]) -> Result<()> {
    engine
        .configure(Setting::MemtableCapacity(keys.len()))
        .await?;
    for (k, v) in keys {
        engine.put(int(*k), *v).await?;
    }
    engine.wait_idle().await;
    Ok(())
}

fn table_lens(engine: &Engine) -> Vec<usize> {
    let snap = engine.snapshot();
    snap.tables.tables().unwrap().iter().map(|t| t.len()).collect()
}

#[tokio::test]
async fn merge_that_skips_newer_table_keeps_newest_value() -> Result<()> {
    let engine = engine(config().size_tiered_threshold(2));
    flush_table(&engine, &[(1, "old"), (2, "x")]).await?;
    flush_table(&engine, &[(1, "new"), (3, "y"), (4, "z")]).await?;
    assert_eq!(table_lens(&engine), vec![3, 2]);

    // The two-record tables merge around the newer three-record one.
    flush_table(&engine, &[(5, "a"), (6, "b")]).await?;
    assert_eq!(table_lens(&engine), vec![4, 3]);

    let point = engine.get(int(1)).await?;
    assert_eq!(point.value.as_deref(), Some("new"));
    assert_eq!(point.source, "sstable-1");
    let rows = engine.range_get(int(1), int(1)).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value, "new");
    assert_eq!(rows[0].source, point.source);
    Ok(())
}

#[tokio::test]
async fn tombstone_still_hides_value_after_reordering_merge() -> Result<()> {
    let engine = engine(config().size_tiered_threshold(2));
    flush_table(&engine, &[(1, "old"), (2, "x")]).await?;

    engine.configure(Setting::MemtableCapacity(3)).await?;
    engine.delete(int(1)).await?;
    put_all(&engine, &[(int(3), "y"), (int(4), "z")]).await?;
    engine.wait_idle().await;

    flush_table(&engine, &[(5, "a"), (6, "b")]).await?;
    assert_eq!(table_lens(&engine), vec![4, 3]);

    let point = engine.get(int(1)).await?;
    assert!(!point.found, "deleted key resurfaced: {}", point);
    assert_eq!(point.source, "sstable-1");
    let rows = engine.range_get(int(1), int(2)).await?;
    let keys: Vec<Key> = rows.iter().map(|r| r.key.clone()).collect();
    assert_eq!(keys, vec![int(2)]);
    Ok(())
}

#[tokio::test]
async fn merged_table_takes_slot_of_newest_input() -> Result<()> {
    let engine = engine(config().size_tiered_threshold(5));
    flush_table(&engine, &[(1, "v"), (2, "v")]).await?;
    flush_table(&engine, &[(3, "v"), (4, "v"), (5, "v")]).await?;
    flush_table(&engine, &[(6, "v"), (7, "v")]).await?;
    flush_table(&engine, &[(8, "v"), (9, "v"), (10, "v"), (11, "v"), (12, "v")]).await?;
    assert_eq!(table_lens(&engine), vec![5, 2, 3, 2]);

    engine.configure(Setting::SizeTieredThreshold(2)).await?;
    engine.wait_idle().await;

    let snap = engine.snapshot();
    let tables = snap.tables.tables().unwrap();
    assert_eq!(tables.iter().map(|t| t.len()).collect::<Vec<_>>(), vec![5, 4, 3]);
    let merged: Vec<Key> = tables[1].records().iter().map(|r| r.key.clone()).collect();
    assert_eq!(merged, vec![int(1), int(2), int(6), int(7)]);
    Ok(())
}

#[tokio::test]
async fn point_and_range_reads_agree_across_rounds() -> Result<()> {
    let engine = engine(config().size_tiered_threshold(2));
    let mut model: std::collections::BTreeMap<i64, Option<String>> = Default::default();
    let capacities = [2, 3, 2, 5, 2, 3, 2, 4, 2, 3];

    let mut i = 0;
    for cap in capacities {
        engine.configure(Setting::MemtableCapacity(cap)).await?;
        for _ in 0..cap {
            let k = (i * 7) % 10;
            if i % 5 == 4 {
                engine.delete(int(k)).await?;
                model.insert(k, None);
            } else {
                let v = format!("v{}", i);
                engine.put(int(k), v.clone()).await?;
                model.insert(k, Some(v));
            }
            i += 1;
        }
        engine.wait_idle().await;
    }
    assert!(engine.snapshot().compaction_round >= 2);

    let rows = engine.range_get(int(0), int(9)).await?;
    for (k, expected) in &model {
        let point = engine.get(int(*k)).await?;
        assert_eq!(&point.value, expected, "get({}) from {}", k, point.source);
        let ranged = rows.iter().find(|r| r.key == int(*k)).map(|r| r.value.clone());
        assert_eq!(&ranged, expected, "range value for {}", k);
    }
    Ok(())
}

// --------------------- Leveled ---------------------

#[tokio::test]
async fn l0_threshold_moves_everything_to_l1() -> Result<()> {
    let engine = engine(leveled().memtable_capacity(2).l0_compaction_threshold(2));
    for i in 1..=4 {
        engine.put(int(i), "v").await?;
    }
    engine.wait_idle().await;

    let snap = engine.snapshot();
    let levels = snap.tables.levels().unwrap();
    assert!(levels[0].is_empty());
    assert_eq!(levels[1].len(), 1);
    assert_eq!(levels[1][0].len(), 4);
    for i in 1..=4 {
        assert!(engine.get(int(i)).await?.found);
    }
    Ok(())
}

#[tokio::test]
async fn leveled_files_never_overlap_and_respect_capacity() -> Result<()> {
    let engine = engine(leveled().memtable_capacity(2).l0_compaction_threshold(2));
    let keys: Vec<i64> = (0..24).map(|i| (i * 7) % 50).collect();
    for &k in &keys {
        engine.put(int(k), format!("v{}", k)).await?;
    }
    engine.wait_idle().await;

    let snap = engine.snapshot();
    let levels = snap.tables.levels().unwrap();
    assert!(levels[0].len() < 2, "L0 is below its threshold once idle");
    assert_levels_disjoint(levels);
    for (level, files) in levels.iter().enumerate().skip(1).take(levels.len() - 2) {
        let records: usize = files.iter().map(|f| f.len()).sum();
        assert!(records <= level_capacity(level), "L{} over capacity", level);
    }
    for &k in &keys {
        let res = engine.get(int(k)).await?;
        assert_eq!(res.value, Some(format!("v{}", k)));
    }
    Ok(())
}

#[tokio::test]
async fn overflow_cascades_to_l2() -> Result<()> {
    let engine = engine(leveled().memtable_capacity(4).l0_compaction_threshold(3));
    for i in 0..12 {
        engine.put(int(i), "v").await?;
    }
    engine.wait_idle().await;

    let snap = engine.snapshot();
    let levels = snap.tables.levels().unwrap();
    let l1: usize = levels[1].iter().map(|f| f.len()).sum();
    let l2: usize = levels[2].iter().map(|f| f.len()).sum();
    assert_eq!(l1, 10);
    assert_eq!(l2, 2);
    assert_eq!(levels[1].len(), 2);
    assert_levels_disjoint(levels);
    Ok(())
}

#[test]
fn level_capacity_scales_by_ten() {
    assert_eq!(level_capacity(1), 10);
    assert_eq!(level_capacity(2), 100);
    assert_eq!(level_capacity(3), 1000);
}

// --------------------- Tombstone GC ---------------------

#[tokio::test]
async fn tombstone_survives_grace_period_then_is_dropped() -> Result<()> {
    let engine = engine(
        leveled()
            .key_kind(KeyKind::String)
            .memtable_capacity(2)
            .l0_compaction_threshold(2),
    );
    put_all(&engine, &[(s("a"), "1"), (s("b"), "1")]).await?;
    engine.wait_idle().await;
    engine.delete(s("a")).await?;
    engine.put(s("c"), "1").await?;
    engine.wait_idle().await;

    // Round 1: tombstone stamped, kept.
    let res = engine.get(s("a")).await?;
    assert!(!res.found);
    assert_eq!(res.source, "L1-0");
    assert_eq!(engine.snapshot().compaction_round, 1);

    put_all(&engine, &[(s("d"), "1"), (s("e"), "1")]).await?;
    engine.wait_idle().await;
    put_all(&engine, &[(s("f"), "1"), (s("g"), "1")]).await?;
    engine.wait_idle().await;

    // Round 2: one round old, still within grace.
    let snap = engine.snapshot();
    assert_eq!(snap.compaction_round, 2);
    assert_eq!(snap.stats.tombstones_dropped, 0);
    let res = engine.get(s("a")).await?;
    assert!(!res.found);
    assert_eq!(res.source, "L1-0");

    put_all(&engine, &[(s("h"), "1"), (s("i"), "1")]).await?;
    engine.wait_idle().await;
    put_all(&engine, &[(s("j"), "1"), (s("k"), "1")]).await?;
    engine.wait_idle().await;

    // Round 3: grace over and nothing older remains: physically removed.
    let snap = engine.snapshot();
    assert_eq!(snap.compaction_round, 3);
    assert_eq!(snap.stats.tombstones_dropped, 1);
    let res = engine.get(s("a")).await?;
    assert!(!res.found);
    assert_eq!(res.source, SOURCE_NONE);

    let remaining: usize = snap
        .tables
        .iter()
        .flat_map(|t| t.records().iter())
        .filter(|r| r.key == s("a"))
        .count();
    assert_eq!(remaining, 0);
    Ok(())
}

#[tokio::test]
async fn tombstone_kept_while_older_table_outside_merge() -> Result<()> {
    // Size-tiered: the big old table holding `x` never joins the small-table
    // merges, so the tombstone may not be dropped however old it gets.
    let engine = engine(
        config()
            .key_kind(KeyKind::String)
            .memtable_capacity(8)
            .size_tiered_threshold(2),
    );
    for k in ["r", "s", "t", "u", "v", "w", "x", "y"] {
        engine.put(s(k), "old").await?;
    }
    engine.wait_idle().await;
    engine.configure(Setting::MemtableCapacity(1)).await?;

    engine.delete(s("x")).await?;
    engine.wait_idle().await;
    for k in ["m1", "m2", "m3", "m4", "m5", "m6"] {
        engine.put(s(k), "v").await?;
        engine.wait_idle().await;
    }

    let snap = engine.snapshot();
    assert!(snap.compaction_round >= 3);
    assert_eq!(snap.stats.tombstones_dropped, 0);
    assert!(!engine.get(s("x")).await?.found);
    Ok(())
}
