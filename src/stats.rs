use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters collected across the whole build. Shared by reference between
/// planner, workers and the writer thread; all increments are relaxed.
#[derive(Default)]
pub struct BuildStats {
    pub stories_rendered: AtomicU64,
    pub stories_skipped: AtomicU64,
    pub artifacts_failed: AtomicU64,
    pub artifacts_written: AtomicU64,
    pub redirects_written: AtomicU64,
    pub bytes_written: AtomicU64,
    pub jobs_completed: AtomicU64,
}

/// Plain snapshot of [`BuildStats`], reported at the end of a build and
/// written to the log directory when one is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStatsReport {
    pub stories_rendered: u64,
    pub stories_skipped: u64,
    pub artifacts_failed: u64,
    pub artifacts_written: u64,
    pub redirects_written: u64,
    pub bytes_written: u64,
    pub jobs_completed: u64,
}

impl BuildStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_stories_rendered(&self) {
        self.stories_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_stories_skipped(&self) {
        self.stories_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_artifacts_failed(&self) {
        self.artifacts_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_artifact_written(&self, bytes: u64, redirect: bool) {
        self.artifacts_written.fetch_add(1, Ordering::Relaxed);
        if redirect {
            self.redirects_written.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn inc_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> BuildStatsReport {
        BuildStatsReport {
            stories_rendered: self.stories_rendered.load(Ordering::Relaxed),
            stories_skipped: self.stories_skipped.load(Ordering::Relaxed),
            artifacts_failed: self.artifacts_failed.load(Ordering::Relaxed),
            artifacts_written: self.artifacts_written.load(Ordering::Relaxed),
            redirects_written: self.redirects_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_zero() {
        let report = BuildStats::new().report();
        assert_eq!(report, BuildStatsReport::default());
    }

    #[test]
    fn counters_accumulate() {
        let stats = BuildStats::new();
        stats.inc_stories_rendered();
        stats.inc_stories_rendered();
        stats.inc_stories_skipped();
        stats.add_artifact_written(100, false);
        stats.add_artifact_written(0, true);
        stats.inc_jobs_completed();

        let report = stats.report();
        assert_eq!(report.stories_rendered, 2);
        assert_eq!(report.stories_skipped, 1);
        assert_eq!(report.artifacts_written, 2);
        assert_eq!(report.redirects_written, 1);
        assert_eq!(report.bytes_written, 100);
        assert_eq!(report.jobs_completed, 1);
    }

    #[test]
    fn report_serializes_to_json() {
        let stats = BuildStats::new();
        stats.add_artifact_written(42, false);
        let json = serde_json::to_value(stats.report()).unwrap();
        assert_eq!(json["artifacts_written"], 1);
        assert_eq!(json["bytes_written"], 42);
    }
}
