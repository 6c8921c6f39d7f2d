//! Concrete pipelines
//!
//! Each builder validates its options, then registers a fixed sequence of
//! places: source table, partition count, partitioned table, row-wise stage,
//! and optional further stages. Malformed options never reach registration.

pub mod probe;
pub mod soundscape;

pub use probe::{ProbeOptions, ProbePipeline};
pub use soundscape::{SoundscapeOptions, SoundscapePipeline};

use canopy_pipeline::ConfigError;
use canopy_table::{Dict, RecordingColumns, RecordingFrame, Table};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Source recordings
pub const RECORDINGS: &str = "recordings";
/// Partition count
pub const NPARTITIONS: &str = "npartitions";
/// Partitioned recordings
pub const RECORDINGS_BAG: &str = "recordings_bag";

/// Take a configuration that must be a mapping
pub(crate) fn mapping(name: &str, config: Json) -> Result<Dict, ConfigError> {
    match config {
        Json::Object(map) => Ok(map),
        other => Err(ConfigError::invalid_parameter(
            name,
            format!("must be a mapping, found {}", json_type(&other)),
        )),
    }
}

pub(crate) fn check_npartitions(npartitions: usize) -> Result<(), ConfigError> {
    if npartitions == 0 {
        return Err(ConfigError::invalid_parameter(NPARTITIONS, "must be at least 1"));
    }
    Ok(())
}

pub(crate) fn check_recordings(recordings: &Table, columns: &RecordingColumns) -> Result<(), ConfigError> {
    RecordingFrame::with_columns(recordings, columns.clone())
        .map(|_| ())
        .map_err(|e| ConfigError::invalid_parameter(RECORDINGS, e.to_string()))
}

/// blake3 of the canonical (key-sorted) JSON form of a configuration
///
/// Used for diagnostics; artifacts stay keyed by pipeline and place name.
#[must_use]
pub fn config_fingerprint(config: &Dict) -> String {
    let canonical = canonicalize(&Json::Object(config.clone()));
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    hex::encode(blake3::hash(&bytes).as_bytes())
}

fn canonicalize(value: &Json) -> Json {
    match value {
        Json::Object(map) => {
            let sorted: BTreeMap<&String, Json> = map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Json::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Json::Array(items) => Json::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn json_type(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "list",
        Json::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dict(value: Json) -> Dict {
        mapping("config", value).unwrap()
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let a = dict(json!({"detector": "bat", "params": {"min": 1, "max": 2}}));
        let b = dict(json!({"params": {"max": 2, "min": 1}, "detector": "bat"}));
        assert_eq!(config_fingerprint(&a), config_fingerprint(&b));
        assert_eq!(config_fingerprint(&a).len(), 64);
    }

    #[test]
    fn fingerprint_tracks_values() {
        let a = dict(json!({"threshold": 0.5}));
        let b = dict(json!({"threshold": 0.6}));
        assert_ne!(config_fingerprint(&a), config_fingerprint(&b));
    }

    #[test]
    fn non_mapping_rejected() {
        let err = mapping("probe_config", json!(["bat"])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::invalid_parameter("probe_config", "must be a mapping, found list")
        );
    }
}
