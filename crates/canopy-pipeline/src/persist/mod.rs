//! Disk-backed persist cache
//!
//! Layout:
//! ```text
//! {work_dir}/
//! └── {pipeline_name}/
//!     └── persist/
//!         ├── matches.parquet     # one artifact per persisted place
//!         └── .matches.XXXX.tmp   # in-flight write, never read
//! ```
//!
//! Artifacts are keyed by `(pipeline_name, place_name)` only. Both names must
//! be single path components (see [`check_name`]). Writes go to a
//! temporary file in the same directory and are renamed into place, so a
//! reader never observes a partial artifact. Concurrent persisting writes to
//! the same key are not arbitrated.

pub mod codec;
pub mod columnar;

pub use codec::{ArtifactCodec, CodecError, JsonCodec};
pub use columnar::ParquetCodec;

use crate::error::{ConfigError, PipelineError};
use canopy_table::Value;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory name under each pipeline holding artifacts
pub const PERSIST_DIR: &str = "persist";

/// Check that a pipeline or place name is a single path component
///
/// # Errors
/// The reason the name is rejected
pub fn check_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("must not be empty");
    }
    if name.contains("..") {
        return Err("must not contain '..'");
    }
    if name.contains(['/', '\\', '\0']) {
        return Err("must not contain path separators or NUL");
    }
    Ok(())
}

fn check_key(pipeline: &str, place: &str) -> Result<(), PipelineError> {
    for (label, name) in [("pipeline", pipeline), ("place", place)] {
        check_name(name).map_err(|reason| ConfigError::invalid_parameter(format!("{label} name '{name}'"), reason))?;
    }
    Ok(())
}

/// On-disk artifact format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    /// Columnar `.parquet` files
    #[default]
    Parquet,
    /// Plain `.json` files
    Json,
}

impl ArtifactFormat {
    /// Codec writing this format
    #[must_use]
    pub fn codec(self) -> Arc<dyn ArtifactCodec> {
        match self {
            ArtifactFormat::Parquet => Arc::new(ParquetCodec),
            ArtifactFormat::Json => Arc::new(JsonCodec),
        }
    }
}

/// Filesystem persist cache
#[derive(Debug, Clone)]
pub struct PersistStore {
    work_dir: PathBuf,
    codec: Arc<dyn ArtifactCodec>,
}

impl PersistStore {
    /// Store rooted at `work_dir` using the parquet codec
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self::with_codec(work_dir, ArtifactFormat::Parquet.codec())
    }

    /// Store rooted at `work_dir` using a custom codec
    pub fn with_codec(work_dir: impl Into<PathBuf>, codec: Arc<dyn ArtifactCodec>) -> Self {
        Self {
            work_dir: work_dir.into(),
            codec,
        }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Codec in use
    #[inline]
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn ArtifactCodec> {
        &self.codec
    }

    /// Artifact location for a place
    #[must_use]
    pub fn artifact_path(&self, pipeline: &str, place: &str) -> PathBuf {
        self.work_dir
            .join(pipeline)
            .join(PERSIST_DIR)
            .join(format!("{place}.{}", self.codec.extension()))
    }

    /// Whether an artifact exists for a place
    #[must_use]
    pub fn exists(&self, pipeline: &str, place: &str) -> bool {
        self.artifact_path(pipeline, place).is_file()
    }

    /// Write an artifact atomically, replacing any previous one
    ///
    /// # Errors
    /// - `PipelineError::Config` if either name is not a single path component
    /// - `PipelineError::Codec` if the value cannot be encoded
    /// - `PipelineError::Io` if the directory or file cannot be written
    pub fn write(&self, pipeline: &str, place: &str, value: &Value) -> Result<PathBuf, PipelineError> {
        check_key(pipeline, place)?;
        let path = self.artifact_path(pipeline, place);
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.work_dir.clone());

        fs::create_dir_all(&dir).map_err(|e| PipelineError::io_error(&dir, e))?;

        let bytes = self.codec.encode(value).map_err(|e| PipelineError::Codec {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let mut staging = tempfile::Builder::new()
            .prefix(&format!(".{place}."))
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| PipelineError::io_error(&dir, e))?;
        staging
            .write_all(&bytes)
            .and_then(|()| staging.as_file().sync_all())
            .map_err(|e| PipelineError::io_error(staging.path(), e))?;
        staging
            .persist(&path)
            .map_err(|e| PipelineError::io_error(&path, e.error))?;

        tracing::info!(pipeline, place, path = %path.display(), bytes = bytes.len(), "persisted artifact");
        Ok(path)
    }

    /// Load an artifact
    ///
    /// # Errors
    /// - `PipelineError::Config` if either name is not a single path component
    /// - `PipelineError::CacheMiss` if no artifact exists
    /// - `PipelineError::Codec` if the artifact cannot be decoded
    pub fn read(&self, pipeline: &str, place: &str) -> Result<Value, PipelineError> {
        check_key(pipeline, place)?;
        let path = self.artifact_path(pipeline, place);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::CacheMiss { path });
            }
            Err(e) => return Err(PipelineError::io_error(&path, e)),
        };

        tracing::debug!(pipeline, place, path = %path.display(), "read artifact");
        self.codec
            .decode(&bytes)
            .map_err(|e| PipelineError::Codec { path, reason: e.to_string() })
    }

    /// Delete an artifact; returns whether one existed
    pub fn remove(&self, pipeline: &str, place: &str) -> Result<bool, PipelineError> {
        check_key(pipeline, place)?;
        let path = self.artifact_path(pipeline, place);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PipelineError::io_error(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_table::{row, Table};
    use tempfile::TempDir;

    fn table() -> Value {
        Value::Table((0..3).map(|i| row([("id", i)])).collect::<Table>())
    }

    #[test]
    fn path_follows_layout() {
        let store = PersistStore::new("/work");
        assert_eq!(
            store.artifact_path("probe", "matches"),
            PathBuf::from("/work/probe/persist/matches.parquet")
        );
    }

    #[test]
    fn json_format_is_selectable() {
        let dir = TempDir::new().unwrap();
        let store = PersistStore::with_codec(dir.path(), ArtifactFormat::Json.codec());

        let path = store.write("probe", "labels", &Value::scalar("bat")).unwrap();
        assert_eq!(path, dir.path().join("probe").join(PERSIST_DIR).join("labels.json"));
        assert_eq!(store.read("probe", "labels").unwrap(), Value::scalar("bat"));
    }

    #[test]
    fn read_without_artifact_is_cache_miss() {
        let dir = TempDir::new().unwrap();
        let store = PersistStore::new(dir.path());

        let err = store.read("probe", "matches").unwrap_err();
        assert!(err.is_cache_miss());
        assert!(!store.exists("probe", "matches"));
    }

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = PersistStore::new(dir.path());

        let path = store.write("probe", "matches", &table()).unwrap();
        assert!(path.is_file());
        assert_eq!(store.read("probe", "matches").unwrap(), table());
    }

    #[test]
    fn write_replaces_and_leaves_no_staging_files() {
        let dir = TempDir::new().unwrap();
        let store = PersistStore::new(dir.path());

        store.write("probe", "matches", &Value::scalar(1)).unwrap();
        store.write("probe", "matches", &table()).unwrap();
        assert_eq!(store.read("probe", "matches").unwrap(), table());

        let entries: Vec<_> = fs::read_dir(dir.path().join("probe").join(PERSIST_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("matches.parquet")]);
    }

    #[test]
    fn corrupt_artifact_is_codec_error() {
        let dir = TempDir::new().unwrap();
        let store = PersistStore::new(dir.path());
        let path = store.artifact_path("probe", "matches");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not parquet").unwrap();

        assert!(matches!(
            store.read("probe", "matches"),
            Err(PipelineError::Codec { .. })
        ));
    }

    #[test]
    fn names_must_stay_inside_the_work_dir() {
        let dir = TempDir::new().unwrap();
        let store = PersistStore::new(dir.path().join("work"));

        for (pipeline, place) in [("../escape", "matches"), ("probe", "../../matches"), ("a/b", "x"), ("", "x")] {
            let err = store.write(pipeline, place, &table()).unwrap_err();
            assert!(err.is_config(), "{pipeline}/{place}: {err}");
            assert!(store.read(pipeline, place).unwrap_err().is_config());
            assert!(store.remove(pipeline, place).unwrap_err().is_config());
        }
        assert!(!dir.path().join("escape").exists());
        assert!(!dir.path().join("matches.parquet").exists());
        assert!(check_name("matches_v2").is_ok());
    }

    #[test]
    fn remove_reports_existence() {
        let dir = TempDir::new().unwrap();
        let store = PersistStore::new(dir.path());
        store.write("p", "x", &table()).unwrap();

        assert!(store.remove("p", "x").unwrap());
        assert!(!store.remove("p", "x").unwrap());
    }
}
