//! Time bucketing ("crono hash")
//!
//! Every row gains `crono_hash = floor(t / time_unit)`, reduced modulo
//! `time_module` when one is set (e.g. `time_unit = 3600`, `time_module = 24`
//! buckets by hour of day). `t` is read from the configured time column, as
//! epoch seconds or an RFC 3339 timestamp.

use crate::time::RecordingTime;
use canopy_pipeline::{RowContext, RowError, RowFunction};
use canopy_table::Row;
use serde_json::Value as Json;

/// Output column
pub const CRONO_HASH_COLUMN: &str = "crono_hash";

/// Row function adding the time bucket of each row
///
/// Static parameters, in order: time unit in seconds, modulus (integer or
/// null), time column name.
#[derive(Debug, Clone, Copy, Default)]
pub struct CronoHash;

impl CronoHash {
    /// Bucket of `seconds`
    #[must_use]
    pub fn bucket(seconds: f64, unit: f64, module: Option<i64>) -> i64 {
        let bucket = (seconds / unit).floor() as i64;
        match module {
            Some(m) => bucket.rem_euclid(m),
            None => bucket,
        }
    }
}

impl RowFunction for CronoHash {
    fn name(&self) -> &str {
        "crono_hash"
    }

    fn apply(&self, row: &Row, ctx: &RowContext<'_>) -> Result<Vec<Row>, RowError> {
        let unit = ctx
            .param(0)
            .map(|p| p.as_scalar())
            .transpose()?
            .and_then(Json::as_f64)
            .filter(|u| *u > 0.0)
            .ok_or_else(|| RowError::new("time unit must be a positive number"))?;
        let module = match ctx.param(1).map(|p| p.as_scalar()).transpose()? {
            None | Some(Json::Null) => None,
            Some(m) => Some(
                m.as_i64()
                    .filter(|m| *m > 0)
                    .ok_or_else(|| RowError::new(format!("time module {m} must be a positive integer")))?,
            ),
        };
        let column = match ctx.param(2).map(|p| p.as_scalar()).transpose()? {
            Some(Json::String(col)) => col.as_str(),
            _ => return Err(RowError::new("time column must be a string")),
        };

        let time = row
            .get(column)
            .map_or(Ok(None), RecordingTime::parse)?
            .ok_or_else(|| RowError::new(format!("row has no time in '{column}'")))?;

        let mut out = row.clone();
        out.insert(
            CRONO_HASH_COLUMN.to_string(),
            Json::from(Self::bucket(time.seconds(), unit, module)),
        );
        Ok(vec![out])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_pipeline::Feed;
    use canopy_table::{row, Value};
    use serde_json::json;

    fn hash(input: Row, module: Json) -> Result<Vec<Row>, RowError> {
        let feed = Feed::new();
        let params = [Value::scalar(60), Value::Scalar(module), Value::scalar("abs_start_time")];
        let ctx = RowContext {
            partition: 0,
            row: 0,
            params: &params,
            feed: &feed,
        };
        CronoHash.apply(&input, &ctx)
    }

    #[test]
    fn buckets_by_unit() {
        let out = hash(row([("abs_start_time", json!(125.0))]), Json::Null).unwrap();
        assert_eq!(out[0][CRONO_HASH_COLUMN], json!(2));
    }

    #[test]
    fn module_wraps_buckets() {
        assert_eq!(CronoHash::bucket(3600.0 * 25.0, 3600.0, Some(24)), 1);
        assert_eq!(CronoHash::bucket(-30.0, 60.0, Some(24)), 23);
        let out = hash(row([("abs_start_time", json!("1970-01-01T00:05:00Z"))]), json!(3)).unwrap();
        assert_eq!(out[0][CRONO_HASH_COLUMN], json!(2));
    }

    #[test]
    fn missing_time_is_a_row_failure() {
        assert!(hash(row([("other", json!(1))]), Json::Null).is_err());
        assert!(hash(row([("abs_start_time", json!(null))]), Json::Null).is_err());
    }
}
