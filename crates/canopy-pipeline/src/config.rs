//! Engine configuration
//!
//! Loaded from TOML or YAML (chosen by file extension), every field
//! optional:
//!
//! ```toml
//! work_dir = "/data/canopy"
//! npartitions = 10
//! persist = true
//! format = "parquet"
//! show_progress = false
//! workers = 8
//! ```

use crate::context::RunContext;
use crate::error::ConfigError;
use crate::persist::{ArtifactFormat, PersistStore};
use crate::progress::TracingProgress;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root of the persist cache
    pub work_dir: PathBuf,
    /// Default partition count for concrete pipelines
    pub npartitions: usize,
    /// Whether concrete pipelines persist their terminal place
    pub persist: bool,
    /// Artifact format of the persist cache
    pub format: ArtifactFormat,
    /// Report progress through `tracing`
    pub show_progress: bool,
    /// Concurrent transitions for the tokio client
    pub workers: usize,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With work directory
    #[must_use]
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// With partition count
    #[inline]
    #[must_use]
    pub fn with_npartitions(mut self, npartitions: usize) -> Self {
        self.npartitions = npartitions;
        self
    }

    /// With persist flag
    #[inline]
    #[must_use]
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// With artifact format
    #[inline]
    #[must_use]
    pub fn with_format(mut self, format: ArtifactFormat) -> Self {
        self.format = format;
        self
    }

    /// With progress reporting
    #[inline]
    #[must_use]
    pub fn with_show_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// With worker count
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Check value ranges
    ///
    /// # Errors
    /// - `ConfigError::InvalidParameter` if `npartitions` or `workers` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.npartitions == 0 {
            return Err(ConfigError::invalid_parameter("npartitions", "must be at least 1"));
        }
        if self.workers == 0 {
            return Err(ConfigError::invalid_parameter("workers", "must be at least 1"));
        }
        Ok(())
    }

    /// Parse TOML and validate
    ///
    /// # Errors
    /// - `ConfigError::Load` on a parse failure
    /// - `ConfigError::InvalidParameter` from [`EngineConfig::validate`]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Load {
            path: PathBuf::from("<toml>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML and validate
    ///
    /// # Errors
    /// - `ConfigError::Load` on a parse failure
    /// - `ConfigError::InvalidParameter` from [`EngineConfig::validate`]
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text).map_err(|e| ConfigError::Load {
            path: PathBuf::from("<yaml>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml`, `.yaml` or `.yml` file
    ///
    /// # Errors
    /// - `ConfigError::Load` if the file is unreadable, unparsable or has
    ///   another extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let load_error = |reason: String| ConfigError::Load {
            path: path.to_path_buf(),
            reason,
        };

        let text = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            other => return Err(load_error(format!("unsupported extension {other:?}"))),
        };

        let config = parsed.map_err(|e| match e {
            ConfigError::Load { reason, .. } => load_error(reason),
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Persist cache rooted at `work_dir`
    #[must_use]
    pub fn store(&self) -> PersistStore {
        PersistStore::with_codec(&self.work_dir, self.format.codec())
    }

    /// Run context honouring `show_progress`
    #[must_use]
    pub fn context(&self) -> RunContext {
        let ctx = RunContext::new();
        if self.show_progress {
            ctx.with_progress(Arc::new(TracingProgress))
        } else {
            ctx
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("canopy"),
            npartitions: 10,
            persist: true,
            format: ArtifactFormat::default(),
            show_progress: true,
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}
