//! Pass statistics.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

use crate::obfuscation::PatchStats;

/// Summary of a completed transform pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    /// Whether the pass ran incrementally (after fingerprint promotion)
    pub incremental: bool,
    /// Hex fingerprint of the configuration
    pub fingerprint: String,
    /// Class files written in rewritten form
    pub classes_patched: usize,
    /// Files and archive entries written unchanged
    pub files_copied: usize,
    /// Outputs deleted for removed inputs
    pub files_removed: usize,
    /// Archives written
    pub archives_written: usize,
    /// Literal loads rewritten
    pub literals: usize,
    /// Constant fields moved into static initializers
    pub fields: usize,
    /// Literals or fields the codec could not carry
    pub skipped_literals: usize,
    /// Methods left unpatched because they would exceed a class file limit
    pub skipped_methods: usize,
    /// Literal texts cleared from constant pools
    pub scrubbed: usize,
}

/// Counters shared by the workers of a pass.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    patched: AtomicUsize,
    copied: AtomicUsize,
    removed: AtomicUsize,
    archives: AtomicUsize,
    literals: AtomicUsize,
    fields: AtomicUsize,
    skipped_literals: AtomicUsize,
    skipped_methods: AtomicUsize,
    scrubbed: AtomicUsize,
}

impl Counters {
    pub(crate) fn patched(&self, stats: &PatchStats) {
        self.patched.fetch_add(1, Ordering::Relaxed);
        self.record(stats);
    }

    pub(crate) fn copied(&self, stats: &PatchStats) {
        self.copied.fetch_add(1, Ordering::Relaxed);
        self.record(stats);
    }

    pub(crate) fn removed(&self) {
        self.removed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn archive(&self) {
        self.archives.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, stats: &PatchStats) {
        self.literals.fetch_add(stats.literals, Ordering::Relaxed);
        self.fields.fetch_add(stats.fields, Ordering::Relaxed);
        self.skipped_literals
            .fetch_add(stats.skipped, Ordering::Relaxed);
        self.skipped_methods
            .fetch_add(stats.skipped_methods, Ordering::Relaxed);
        self.scrubbed.fetch_add(stats.scrubbed, Ordering::Relaxed);
    }

    pub(crate) fn report(&self, incremental: bool, fingerprint: String) -> TransformReport {
        TransformReport {
            incremental,
            fingerprint,
            classes_patched: self.patched.load(Ordering::Relaxed),
            files_copied: self.copied.load(Ordering::Relaxed),
            files_removed: self.removed.load(Ordering::Relaxed),
            archives_written: self.archives.load(Ordering::Relaxed),
            literals: self.literals.load(Ordering::Relaxed),
            fields: self.fields.load(Ordering::Relaxed),
            skipped_literals: self.skipped_literals.load(Ordering::Relaxed),
            skipped_methods: self.skipped_methods.load(Ordering::Relaxed),
            scrubbed: self.scrubbed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn concurrent_updates() {
        let counters = Counters::default();
        let stats = PatchStats {
            literals: 2,
            fields: 1,
            skipped: 0,
            skipped_methods: 1,
            scrubbed: 2,
        };
        (0..1000).into_par_iter().for_each(|i| {
            if i % 2 == 0 {
                counters.patched(&stats);
            } else {
                counters.copied(&PatchStats::default());
            }
        });
        counters.removed();
        counters.archive();

        let report = counters.report(true, "ab".into());
        assert_eq!(report.classes_patched, 500);
        assert_eq!(report.files_copied, 500);
        assert_eq!(report.literals, 1000);
        assert_eq!(report.fields, 500);
        assert_eq!(report.skipped_methods, 500);
        assert_eq!(report.scrubbed, 1000);
        assert_eq!(report.files_removed, 1);
        assert_eq!(report.archives_written, 1);
        assert!(report.incremental);
    }
}
