//! Probe pipeline: run a detector over every recording

use super::{check_npartitions, check_recordings, config_fingerprint, mapping, NPARTITIONS, RECORDINGS, RECORDINGS_BAG};
use crate::error::SoundscapeError;
use crate::probe::{IdType, Probe, ProbeRows};
use canopy_pipeline::{
    EngineConfig, PartitionTable, Pipeline, PlaceFuture, PlaceRef, PlaceSpec, RowMap, RunContext, ScalarCheck,
};
use canopy_table::{RecordingColumns, Table, Value};
use serde_json::Value as Json;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

/// Recording time column name, or null
pub const TIME_COL: &str = "time_col";
/// Probe configuration mapping
pub const PROBE_CONFIG: &str = "probe_config";
/// Identifier type tag, or null
pub const ID_TYPE: &str = "id_type";
/// Terminal place
pub const MATCHES: &str = "matches";

/// Options for [`ProbePipeline`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOptions {
    /// Partition count (default 10)
    pub npartitions: usize,
    /// Column holding each recording's start time
    pub time_col: Option<String>,
    /// Persist the matches table
    pub persist: bool,
    /// Root of the persist cache
    pub work_dir: PathBuf,
    /// Recording column names
    pub columns: RecordingColumns,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            npartitions: 10,
            time_col: None,
            persist: false,
            work_dir: std::env::temp_dir(),
            columns: RecordingColumns::default(),
        }
    }
}

impl ProbeOptions {
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
    pub fn with_time_col(mut self, time_col: impl Into<String>) -> Self {
        self.time_col = Some(time_col.into());
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
}

/// Applies a [`Probe`] to every recording of a table
///
/// Places: `recordings` → `npartitions` → `time_col` → `probe_config` →
/// `recordings_bag` → `id_type` → `matches`.
#[derive(Debug)]
pub struct ProbePipeline {
    pipeline: Pipeline,
    fingerprint: String,
}

impl ProbePipeline {
    /// Validate options and build the graph
    ///
    /// # Errors
    /// - `ConfigError` if `probe_config` is not a mapping, `npartitions` is
    ///   zero, or the recordings lack a path column; nothing is registered
    pub fn new(
        name: impl Into<String>,
        recordings: Table,
        probe: Arc<dyn Probe>,
        probe_config: Json,
        options: ProbeOptions,
    ) -> Result<Self, SoundscapeError> {
        let probe_config = mapping(PROBE_CONFIG, probe_config)?;
        check_npartitions(options.npartitions)?;
        check_recordings(&recordings, &options.columns)?;

        let id_type = IdType::infer(&recordings, &options.columns.id)
            .map_or(Json::Null, |t| Json::from(t.as_str()));
        let time_col = options.time_col.clone().map_or(Json::Null, Json::from);
        let fingerprint = config_fingerprint(&probe_config);
        let rows = recordings.len();

        let mut pipeline = Pipeline::new(name, options.work_dir.clone());
        pipeline.register(RECORDINGS, recordings)?;
        pipeline.register(NPARTITIONS, PlaceSpec::checked(options.npartitions, ScalarCheck::AtLeast(1)))?;
        pipeline.register(TIME_COL, PlaceSpec::checked(time_col, ScalarCheck::NullOrText))?;
        pipeline.register(PROBE_CONFIG, probe_config)?;
        pipeline.register(
            RECORDINGS_BAG,
            PlaceSpec::derive(PartitionTable::shared(), [RECORDINGS, NPARTITIONS]),
        )?;
        pipeline.register(ID_TYPE, Value::Scalar(id_type))?;
        pipeline.register(
            MATCHES,
            PlaceSpec::derive(
                RowMap::merged(MATCHES, Arc::new(ProbeRows::new(probe, options.columns))).shared(),
                [RECORDINGS_BAG, PROBE_CONFIG, ID_TYPE, TIME_COL],
            ),
        )?;
        pipeline[MATCHES].set_persist(options.persist);

        tracing::info!(
            pipeline = pipeline.name(),
            recordings = rows,
            npartitions = options.npartitions,
            config = %fingerprint,
            "built probe pipeline"
        );
        Ok(Self { pipeline, fingerprint })
    }

    /// Underlying pipeline
    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Take the underlying pipeline
    #[must_use]
    pub fn into_inner(self) -> Pipeline {
        self.pipeline
    }

    /// Fingerprint of the probe configuration
    #[inline]
    #[must_use]
    pub fn config_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The `matches` place
    ///
    /// # Errors
    /// Never fails for a built pipeline.
    pub fn matches(&self) -> Result<PlaceRef<'_>, SoundscapeError> {
        Ok(self.pipeline.place(MATCHES)?)
    }

    /// Compute the matches table
    ///
    /// # Errors
    /// Propagates configuration, transition and persist failures.
    pub fn compute(&self, ctx: &RunContext) -> Result<Table, SoundscapeError> {
        Ok(self.matches()?.compute(ctx)?.into_table()?)
    }

    /// Submit the matches walk
    ///
    /// # Errors
    /// Fails on a bad feed, before submitting anything.
    pub fn future(&self, ctx: &RunContext) -> Result<PlaceFuture, SoundscapeError> {
        Ok(self.matches()?.future(ctx)?)
    }

    /// Read persisted matches
    ///
    /// # Errors
    /// - cache miss if matches were never persisted
    pub fn read(&self) -> Result<Table, SoundscapeError> {
        Ok(self.matches()?.read()?.into_table()?)
    }
}

impl Deref for ProbePipeline {
    type Target = Pipeline;

    fn deref(&self) -> &Pipeline {
        &self.pipeline
    }
}
