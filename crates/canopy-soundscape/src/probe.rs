//! Probes: per-recording detectors
//!
//! A [`Probe`] inspects one recording and returns zero or more match rows.
//! [`ProbeRows`] adapts a probe to the row-wise mapping transition: it
//! builds the typed recording from each row, runs the probe, and tags every
//! match with the source recording's identifier and absolute times.

use crate::time::{add_absolute_times, RecordingTime};
use canopy_pipeline::{RowContext, RowError, RowFunction};
use canopy_table::recording::build_recording;
use canopy_table::{Dict, Recording, RecordingColumns, Row, Table};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as Json};
use std::fmt;
use std::sync::Arc;

/// Column carrying the source recording identifier on every match
pub const RECORDING_COLUMN: &str = "recording";

/// An externally supplied detector
pub trait Probe: Send + Sync + fmt::Debug {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Matches found in one recording
    ///
    /// Matches may carry `start_time` / `end_time` offsets in seconds from
    /// the recording start.
    fn probe(&self, recording: &Recording, config: &Dict) -> Result<Vec<Row>, RowError>;
}

/// Storage type of recording identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    /// Integer identifiers
    Int,
    /// Float identifiers
    Float,
    /// String identifiers
    Str,
}

impl IdType {
    /// Tag stored in the `id_type` place
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            IdType::Int => "int",
            IdType::Float => "float",
            IdType::Str => "str",
        }
    }

    /// Parse a tag
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "int" => Some(IdType::Int),
            "float" => Some(IdType::Float),
            "str" => Some(IdType::Str),
            _ => None,
        }
    }

    /// Infer from the non-null cells of an identifier column
    ///
    /// Any string makes the column `Str`, any non-integer number `Float`.
    /// Returns `None` when the column is absent or entirely null.
    #[must_use]
    pub fn infer(table: &Table, column: &str) -> Option<Self> {
        let mut inferred = None;
        for cell in table.column(column).flatten() {
            let kind = match cell {
                Json::Null => continue,
                Json::Number(n) if n.is_i64() || n.is_u64() => IdType::Int,
                Json::Number(_) => IdType::Float,
                _ => IdType::Str,
            };
            inferred = Some(match (inferred, kind) {
                (Some(IdType::Str), _) | (_, IdType::Str) => IdType::Str,
                (Some(IdType::Float), _) | (_, IdType::Float) => IdType::Float,
                _ => IdType::Int,
            });
        }
        inferred
    }

    /// Cast an identifier to this type
    ///
    /// # Errors
    /// Fails when the identifier cannot be represented.
    pub fn cast(self, id: &Json) -> Result<Json, RowError> {
        let fail = || RowError::new(format!("cannot cast id {id} to {}", self.as_str()));
        match (self, id) {
            (_, Json::Null) => Ok(Json::Null),
            (IdType::Str, Json::String(_)) => Ok(id.clone()),
            (IdType::Str, other) => Ok(Json::String(other.to_string())),
            (IdType::Int, Json::Number(n)) if n.is_i64() || n.is_u64() => Ok(id.clone()),
            (IdType::Int, Json::Number(n)) => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| Json::from(f as i64))
                .ok_or_else(fail),
            (IdType::Int, Json::String(s)) => {
                let s = s.trim();
                s.parse::<i64>()
                    .map(Json::from)
                    .or_else(|_| s.parse::<u64>().map(Json::from))
                    .map_err(|_| fail())
            }
            (IdType::Float, Json::Number(n)) => n
                .as_f64()
                .and_then(Number::from_f64)
                .map(Json::Number)
                .ok_or_else(fail),
            (IdType::Float, Json::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Json::Number)
                .ok_or_else(fail),
            _ => Err(fail()),
        }
    }
}

/// Row function running a [`Probe`] on each recording row
///
/// Static parameters, in order: probe configuration (dict), identifier type
/// tag (scalar or null), recording time column (scalar or null).
#[derive(Debug, Clone)]
pub struct ProbeRows {
    probe: Arc<dyn Probe>,
    columns: RecordingColumns,
}

impl ProbeRows {
    /// Adapt a probe, reading recordings with `columns`
    pub fn new(probe: Arc<dyn Probe>, columns: RecordingColumns) -> Self {
        Self { probe, columns }
    }
}

impl RowFunction for ProbeRows {
    fn name(&self) -> &str {
        self.probe.name()
    }

    fn apply(&self, row: &Row, ctx: &RowContext<'_>) -> Result<Vec<Row>, RowError> {
        let config = ctx
            .param(0)
            .ok_or_else(|| RowError::new("missing probe configuration"))?
            .as_dict()?;
        let id_type = match ctx.param(1).map(|p| p.as_scalar()).transpose()? {
            Some(Json::String(tag)) => {
                Some(IdType::parse(tag).ok_or_else(|| RowError::new(format!("unknown id type '{tag}'")))?)
            }
            _ => None,
        };
        let time_col = match ctx.param(2).map(|p| p.as_scalar()).transpose()? {
            Some(Json::String(col)) => Some(col.as_str()),
            _ => None,
        };

        let recording = build_recording(row, &self.columns)?;
        let base_time = match time_col {
            Some(col) => row.get(col).map_or(Ok(None), RecordingTime::parse)?,
            None => None,
        };
        let id = match (&recording.id, id_type) {
            (Some(id), Some(id_type)) => id_type.cast(id)?,
            (Some(id), None) => id.clone(),
            (None, _) => Json::Null,
        };

        let mut matches = self.probe.probe(&recording, config)?;
        for found in &mut matches {
            found.insert(RECORDING_COLUMN.to_string(), id.clone());
            if let Some(base) = &base_time {
                add_absolute_times(found, base)?;
            }
        }
        Ok(matches)
    }
}
