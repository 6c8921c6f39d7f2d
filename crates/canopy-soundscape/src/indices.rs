//! Acoustic indices per recording

use crate::probe::RECORDING_COLUMN;
use crate::time::{add_absolute_times, RecordingTime};
use canopy_pipeline::{RowContext, RowError, RowFunction};
use canopy_table::recording::build_recording;
use canopy_table::{Dict, Recording, RecordingColumns, Row};
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;

/// An externally supplied index computation
pub trait Indexer: Send + Sync + fmt::Debug {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Index rows for one recording, typically one per analysis window
    ///
    /// Rows may carry `start_time` / `end_time` offsets in seconds.
    fn indices(&self, recording: &Recording, config: &Dict) -> Result<Vec<Row>, RowError>;
}

/// Row function running an [`Indexer`] on each recording row
///
/// Static parameters, in order: index configuration (dict), recording time
/// column (scalar or null).
#[derive(Debug, Clone)]
pub struct IndexRows {
    indexer: Arc<dyn Indexer>,
    columns: RecordingColumns,
}

impl IndexRows {
    /// Adapt an indexer, reading recordings with `columns`
    pub fn new(indexer: Arc<dyn Indexer>, columns: RecordingColumns) -> Self {
        Self { indexer, columns }
    }
}

impl RowFunction for IndexRows {
    fn name(&self) -> &str {
        self.indexer.name()
    }

    fn apply(&self, row: &Row, ctx: &RowContext<'_>) -> Result<Vec<Row>, RowError> {
        let config = ctx
            .param(0)
            .ok_or_else(|| RowError::new("missing index configuration"))?
            .as_dict()?;
        let base_time = match ctx.param(1).map(|p| p.as_scalar()).transpose()? {
            Some(Json::String(col)) => row.get(col).map_or(Ok(None), RecordingTime::parse)?,
            _ => None,
        };

        let recording = build_recording(row, &self.columns)?;
        let id = recording.id.clone().unwrap_or(Json::Null);

        let mut rows = self.indexer.indices(&recording, config)?;
        for out in &mut rows {
            out.insert(RECORDING_COLUMN.to_string(), id.clone());
            if let Some(base) = &base_time {
                add_absolute_times(out, base)?;
            }
        }
        Ok(rows)
    }
}
