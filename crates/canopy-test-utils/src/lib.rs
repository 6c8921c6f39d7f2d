//! Testing utilities for the Canopy workspace
//!
//! Shared fixtures: recordings tables, probes with known outputs, indexers,
//! counting transitions and temporary work directories.

#![allow(missing_docs)]

use canopy_pipeline::{FnTransition, PlaceKind, RowError, Transition, TransitionError};
use canopy_soundscape::{Indexer, Probe};
use canopy_table::{row, Dict, Recording, Row, Table, Value};
use serde_json::{json, Value as Json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// `n` recordings with `path = rec_{i}.wav` and integer `id = i`
pub fn recordings(n: usize) -> Table {
    (0..n)
        .map(|i| row([("path", json!(format!("rec_{i}.wav"))), ("id", json!(i))]))
        .collect()
}

/// Like [`recordings`], with a `time` column in epoch seconds
pub fn timed_recordings(n: usize, start: f64, step: f64) -> Table {
    (0..n)
        .map(|i| {
            row([
                ("path", json!(format!("rec_{i}.wav"))),
                ("id", json!(i)),
                ("time", json!(start + step * i as f64)),
            ])
        })
        .collect()
}

/// Integer ids of a table column, in row order
pub fn ids(table: &Table, column: &str) -> Vec<i64> {
    table.column(column).flatten().filter_map(Json::as_i64).collect()
}

pub fn work_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn recording_id(recording: &Recording) -> Result<i64, RowError> {
    recording
        .id
        .as_ref()
        .and_then(Json::as_i64)
        .ok_or_else(|| RowError::new("recording has no integer id"))
}

/// One match, at 1s..2s, for every recording whose id ends in 0
#[derive(Debug, Default)]
pub struct FlagEndingInZero;

impl Probe for FlagEndingInZero {
    fn name(&self) -> &str {
        "flag_ending_in_zero"
    }

    fn probe(&self, recording: &Recording, config: &Dict) -> Result<Vec<Row>, RowError> {
        if recording_id(recording)? % 10 != 0 {
            return Ok(Vec::new());
        }
        let label = config.get("label").cloned().unwrap_or(Json::Null);
        Ok(vec![row([
            ("label", label),
            ("start_time", json!(1.0)),
            ("end_time", json!(2.0)),
        ])])
    }
}

/// One match per recording, failing on ids divisible by 5
#[derive(Debug, Default)]
pub struct FailDivisibleByFive;

impl Probe for FailDivisibleByFive {
    fn name(&self) -> &str {
        "fail_divisible_by_five"
    }

    fn probe(&self, recording: &Recording, _config: &Dict) -> Result<Vec<Row>, RowError> {
        let id = recording_id(recording)?;
        if id % 5 == 0 {
            return Err(RowError::new(format!("cannot decode recording {id}")));
        }
        Ok(vec![row([("path", json!(recording.path))])])
    }
}

/// `windows` index rows per recording, each `width` seconds wide
#[derive(Debug)]
pub struct WindowIndexer {
    pub windows: usize,
    pub width: f64,
}

impl Default for WindowIndexer {
    fn default() -> Self {
        Self { windows: 2, width: 60.0 }
    }
}

impl Indexer for WindowIndexer {
    fn name(&self) -> &str {
        "window_indexer"
    }

    fn indices(&self, recording: &Recording, _config: &Dict) -> Result<Vec<Row>, RowError> {
        let id = recording_id(recording)?;
        Ok((0..self.windows)
            .map(|w| {
                let start = self.width * w as f64;
                row([
                    ("start_time", json!(start)),
                    ("end_time", json!(start + self.width)),
                    ("energy", json!(id * 10 + w as i64)),
                ])
            })
            .collect())
    }
}

/// Pass-through transition counting its invocations
pub fn counting(name: &str, kind: PlaceKind, counter: Arc<AtomicUsize>) -> Arc<dyn Transition> {
    FnTransition::new(name, kind, move |inputs: Vec<Value>, _feed| {
        counter.fetch_add(1, Ordering::SeqCst);
        inputs
            .into_iter()
            .next()
            .ok_or_else(|| TransitionError::invalid_input(0, "missing input"))
    })
    .shared()
}

/// Transition that always fails
pub fn failing(name: &str, kind: PlaceKind) -> Arc<dyn Transition> {
    FnTransition::new(name, kind, |_inputs: Vec<Value>, _feed| Err(TransitionError::failed("boom"))).shared()
}
