//! Run reports
//!
//! Every `compute`/`future` walk produces a [`RunReport`] alongside the value:
//! which places were evaluated, which rows were skipped and which artifacts
//! were written.

use canopy_table::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A row excluded from a row-wise transition's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    /// Partition index
    pub partition: usize,
    /// Row index within the partition
    pub row: usize,
    /// Failure message
    pub message: String,
}

/// Aggregate outcome of one walk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    evaluated: Vec<String>,
    skipped: IndexMap<String, Vec<RowFailure>>,
    persisted: IndexMap<String, PathBuf>,
}

impl RunReport {
    /// Create an empty report
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places evaluated, upstream before downstream
    #[inline]
    #[must_use]
    pub fn evaluated(&self) -> &[String] {
        &self.evaluated
    }

    /// Whether a place was evaluated in this walk
    #[must_use]
    pub fn was_evaluated(&self, place: &str) -> bool {
        self.evaluated.iter().any(|p| p == place)
    }

    /// Rows skipped by a place
    #[must_use]
    pub fn skipped_rows(&self, place: &str) -> &[RowFailure] {
        self.skipped.get(place).map(Vec::as_slice).unwrap_or_default()
    }

    /// Total skipped rows across all places
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.skipped.values().map(Vec::len).sum()
    }

    /// Artifacts written, by place
    #[inline]
    #[must_use]
    pub fn persisted(&self) -> &IndexMap<String, PathBuf> {
        &self.persisted
    }

    pub(crate) fn record_evaluated(&mut self, place: &str) {
        if !self.was_evaluated(place) {
            self.evaluated.push(place.to_string());
        }
    }

    pub(crate) fn record_failures(&mut self, place: &str, failures: Vec<RowFailure>) {
        if !failures.is_empty() {
            self.skipped.insert(place.to_string(), failures);
        }
    }

    pub(crate) fn record_persisted(&mut self, place: &str, path: PathBuf) {
        self.persisted.insert(place.to_string(), path);
    }

    /// Fold an upstream report into this one
    ///
    /// Shared upstream places reached through several paths are only
    /// recorded once.
    pub(crate) fn merge(&mut self, other: &RunReport) {
        for place in &other.evaluated {
            self.record_evaluated(place);
        }
        for (place, failures) in &other.skipped {
            self.skipped
                .entry(place.clone())
                .or_insert_with(|| failures.clone());
        }
        for (place, path) in &other.persisted {
            self.persisted
                .entry(place.clone())
                .or_insert_with(|| path.clone());
        }
    }
}

/// A computed value with its report
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Value of the driven place
    pub value: Value,
    /// Report of the walk
    pub report: RunReport,
}

impl Evaluation {
    /// Drop the report
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(row: usize) -> RowFailure {
        RowFailure {
            partition: 0,
            row,
            message: "bad".into(),
        }
    }

    #[test]
    fn merge_deduplicates_shared_upstream() {
        let mut left = RunReport::new();
        left.record_evaluated("recordings");
        left.record_failures("matches", vec![failure(1)]);

        let mut right = RunReport::new();
        right.record_evaluated("recordings");
        right.record_evaluated("npartitions");
        right.record_failures("matches", vec![failure(1)]);

        left.merge(&right);
        assert_eq!(left.evaluated(), &["recordings".to_string(), "npartitions".to_string()]);
        assert_eq!(left.skipped_count(), 1);
    }

    #[test]
    fn empty_failures_are_not_recorded() {
        let mut report = RunReport::new();
        report.record_failures("matches", Vec::new());
        assert!(report.skipped_rows("matches").is_empty());
        assert_eq!(report.skipped_count(), 0);
    }
}
