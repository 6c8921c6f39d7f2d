//! Soundscape pipeline: per-recording indices, optionally time-bucketed

use super::{check_npartitions, check_recordings, config_fingerprint, mapping, NPARTITIONS, RECORDINGS, RECORDINGS_BAG};
use crate::crono::CronoHash;
use crate::error::SoundscapeError;
use crate::indices::{IndexRows, Indexer};
use canopy_pipeline::{
    ConcatBag, ConfigError, EngineConfig, PartitionTable, Pipeline, PlaceFuture, PlaceRef, PlaceSpec, RowMap,
    RunContext, ScalarCheck,
};
use canopy_table::{RecordingColumns, Table};
use serde_json::Value as Json;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

/// Index configuration mapping
pub const INDEX_CONFIG: &str = "index_config";
/// Recording time column name, or null
pub const RECORDING_TIME_COL: &str = "recording_time_col";
/// Partitioned index rows
pub const INDICES: &str = "indices";
/// Flattened index rows
pub const SOUNDSCAPE: &str = "soundscape";
/// Bucket width in seconds
pub const TIME_UNIT: &str = "time_unit";
/// Bucket modulus, or null
pub const TIME_MODULE: &str = "time_module";
/// Column the buckets are computed from
pub const TIME_COL: &str = "time_col";
/// Terminal place of the crono variant
pub const HASHED_SOUNDSCAPE: &str = "hashed_soundscape";

/// Options for [`SoundscapePipeline`]
#[derive(Debug, Clone, PartialEq)]
pub struct SoundscapeOptions {
    /// Partition count (default 10)
    pub npartitions: usize,
    /// Column holding each recording's start time
    pub recording_time_col: Option<String>,
    /// Add the time-bucketing stage
    pub crono: bool,
    /// Bucket width in seconds (default 60)
    pub time_unit: f64,
    /// Bucket modulus
    pub time_module: Option<i64>,
    /// Column the buckets are computed from (default `abs_start_time`)
    pub time_col: String,
    /// Persist the terminal table
    pub persist: bool,
    /// Root of the persist cache
    pub work_dir: PathBuf,
    /// Recording column names
    pub columns: RecordingColumns,
}

impl Default for SoundscapeOptions {
    fn default() -> Self {
        Self {
            npartitions: 10,
            recording_time_col: None,
            crono: false,
            time_unit: 60.0,
            time_module: None,
            time_col: "abs_start_time".to_string(),
            persist: false,
            work_dir: std::env::temp_dir(),
            columns: RecordingColumns::default(),
        }
    }
}

impl SoundscapeOptions {
    /// Options taking partition count, persistence and work dir from `config`
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            npartitions: config.npartitions,
            persist: config.persist,
            work_dir: config.work_dir.clone(),
            ..Self::default()
        }
    }

    /// With partition count
    #[must_use]
    pub fn with_npartitions(mut self, npartitions: usize) -> Self {
        self.npartitions = npartitions;
        self
    }

    /// With recording time column
    #[must_use]
    pub fn with_recording_time_col(mut self, column: impl Into<String>) -> Self {
        self.recording_time_col = Some(column.into());
        self
    }

    /// Enable the crono variant with the given bucketing
    #[must_use]
    pub fn with_crono(mut self, time_unit: f64, time_module: Option<i64>) -> Self {
        self.crono = true;
        self.time_unit = time_unit;
        self.time_module = time_module;
        self
    }

    /// With bucketing column
    #[must_use]
    pub fn with_time_col(mut self, column: impl Into<String>) -> Self {
        self.time_col = column.into();
        self
    }

    /// With persist flag
    #[must_use]
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// With work directory
    #[must_use]
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// With recording column names
    #[must_use]
    pub fn with_columns(mut self, columns: RecordingColumns) -> Self {
        self.columns = columns;
        self
    }

    /// Terminal place for these options
    #[must_use]
    pub fn output_place(&self) -> &'static str {
        if self.crono {
            HASHED_SOUNDSCAPE
        } else {
            SOUNDSCAPE
        }
    }

    /// Check bucketing parameters
    ///
    /// # Errors
    /// - `ConfigError` on a non-positive `time_unit` or `time_module`
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_npartitions(self.npartitions)?;
        if !self.crono {
            return Ok(());
        }
        if !(self.time_unit.is_finite() && self.time_unit > 0.0) {
            return Err(ConfigError::invalid_parameter(TIME_UNIT, "must be a positive number"));
        }
        if matches!(self.time_module, Some(m) if m <= 0) {
            return Err(ConfigError::invalid_parameter(TIME_MODULE, "must be a positive integer"));
        }
        Ok(())
    }
}

/// Builds per-recording index rows into a soundscape table
#[derive(Debug)]
pub struct SoundscapePipeline {
    pipeline: Pipeline,
    output: &'static str,
    fingerprint: String,
}

impl SoundscapePipeline {
    /// Validate options and build the graph
    ///
    /// # Errors
    /// - `ConfigError` for a non-mapping `index_config`, bad options, or
    ///   recordings without a path column; nothing is registered
    pub fn new(
        name: impl Into<String>,
        recordings: Table,
        indexer: Arc<dyn Indexer>,
        index_config: Json,
        options: SoundscapeOptions,
    ) -> Result<Self, SoundscapeError> {
        let index_config = mapping(INDEX_CONFIG, index_config)?;
        options.validate()?;
        check_recordings(&recordings, &options.columns)?;

        let fingerprint = config_fingerprint(&index_config);
        let output = options.output_place();
        let recording_time_col = options.recording_time_col.clone().map_or(Json::Null, Json::from);

        let mut pipeline = Pipeline::new(name, options.work_dir.clone());
        pipeline.register(RECORDINGS, recordings)?;
        pipeline.register(NPARTITIONS, PlaceSpec::checked(options.npartitions, ScalarCheck::AtLeast(1)))?;
        pipeline.register(INDEX_CONFIG, index_config)?;
        pipeline.register(
            RECORDING_TIME_COL,
            PlaceSpec::checked(recording_time_col, ScalarCheck::NullOrText),
        )?;
        pipeline.register(
            RECORDINGS_BAG,
            PlaceSpec::derive(PartitionTable::shared(), [RECORDINGS, NPARTITIONS]),
        )?;
        pipeline.register(
            INDICES,
            PlaceSpec::derive(
                RowMap::partitioned(INDICES, Arc::new(IndexRows::new(indexer, options.columns.clone()))).shared(),
                [RECORDINGS_BAG, INDEX_CONFIG, RECORDING_TIME_COL],
            ),
        )?;
        pipeline.register(SOUNDSCAPE, PlaceSpec::derive(ConcatBag::shared(), [INDICES]))?;

        if options.crono {
            pipeline.register(TIME_UNIT, PlaceSpec::checked(options.time_unit, ScalarCheck::Positive))?;
            pipeline.register(
                TIME_MODULE,
                PlaceSpec::checked(
                    options.time_module.map_or(Json::Null, Json::from),
                    ScalarCheck::NullOrAtLeast(1),
                ),
            )?;
            pipeline.register(TIME_COL, PlaceSpec::checked(options.time_col.clone(), ScalarCheck::Text))?;
            pipeline.register(
                HASHED_SOUNDSCAPE,
                PlaceSpec::derive(
                    RowMap::merged(HASHED_SOUNDSCAPE, Arc::new(CronoHash)).shared(),
                    [SOUNDSCAPE, TIME_UNIT, TIME_MODULE, TIME_COL],
                ),
            )?;
        }
        pipeline[output].set_persist(options.persist);

        tracing::info!(
            pipeline = pipeline.name(),
            output,
            crono = options.crono,
            config = %fingerprint,
            "built soundscape pipeline"
        );
        Ok(Self {
            pipeline,
            output,
            fingerprint,
        })
    }

    /// Name of the terminal place
    #[inline]
    #[must_use]
    pub fn output_place(&self) -> &'static str {
        self.output
    }

    /// Whether this is the crono variant
    #[inline]
    #[must_use]
    pub fn is_crono(&self) -> bool {
        self.output == HASHED_SOUNDSCAPE
    }

    /// Underlying pipeline
    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Fingerprint of the index configuration
    #[inline]
    #[must_use]
    pub fn config_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The terminal place
    ///
    /// # Errors
    /// Never fails for a built pipeline.
    pub fn output(&self) -> Result<PlaceRef<'_>, SoundscapeError> {
        Ok(self.pipeline.place(self.output)?)
    }

    /// Compute the terminal table
    ///
    /// # Errors
    /// Propagates configuration, transition and persist failures.
    pub fn compute(&self, ctx: &RunContext) -> Result<Table, SoundscapeError> {
        Ok(self.output()?.compute(ctx)?.into_table()?)
    }

    /// Submit the terminal walk
    ///
    /// # Errors
    /// Fails on a bad feed, before submitting anything.
    pub fn future(&self, ctx: &RunContext) -> Result<PlaceFuture, SoundscapeError> {
        Ok(self.output()?.future(ctx)?)
    }

    /// Read the persisted terminal table
    ///
    /// # Errors
    /// - cache miss if it was never persisted
    pub fn read(&self) -> Result<Table, SoundscapeError> {
        Ok(self.output()?.read()?.into_table()?)
    }
}

impl Deref for SoundscapePipeline {
    type Target = Pipeline;

    fn deref(&self) -> &Pipeline {
        &self.pipeline
    }
}
