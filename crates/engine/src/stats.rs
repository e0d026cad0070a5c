/// Read-path optimization counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizationCounters {
    /// Bloom filters that said "maybe" for an absent key.
    pub bloom_false_positives: u64,
    /// Tables skipped because their bloom filter ruled the key out.
    pub bloom_skips: u64,
    /// Blocks eliminated by fence pointers (I/O saved).
    pub blocks_skipped: u64,
    /// Level files skipped because the key lay outside their range.
    pub files_skipped_by_range: u64,
}

/// Write-path and maintenance totals since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub user_writes: u64,
    pub flushes: u64,
    pub records_flushed: u64,
    pub compactions: u64,
    pub records_compacted_in: u64,
    pub records_compacted_out: u64,
    pub tombstones_dropped: u64,
}

impl EngineStats {
    /// Records written to tables per user write.
    #[must_use]
    pub fn write_amplification(&self) -> f64 {
        if self.user_writes == 0 {
            return 0.0;
        }
        (self.records_flushed + self.records_compacted_out) as f64 / self.user_writes as f64
    }
}
