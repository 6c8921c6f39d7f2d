//! Recording times
//!
//! Recording start times arrive either as epoch seconds or as RFC 3339
//! timestamps. Offsets of matches and index windows are seconds from the
//! recording start; absolute times keep the representation of the source.

use canopy_pipeline::RowError;
use chrono::{DateTime, Duration, FixedOffset};
use serde_json::{json, Value as Json};
use std::fmt;

/// A recording start time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordingTime {
    /// Seconds since the epoch
    Epoch(f64),
    /// Calendar timestamp
    Stamp(DateTime<FixedOffset>),
}

impl RecordingTime {
    /// Parse a cell; null means no time
    ///
    /// # Errors
    /// Fails on anything other than a number, an RFC 3339 string or null.
    pub fn parse(cell: &Json) -> Result<Option<Self>, RowError> {
        match cell {
            Json::Null => Ok(None),
            Json::Number(n) => n
                .as_f64()
                .map(|s| Some(RecordingTime::Epoch(s)))
                .ok_or_else(|| RowError::new(format!("time {n} is out of range"))),
            Json::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| Some(RecordingTime::Stamp(t)))
                .map_err(|e| RowError::new(format!("invalid timestamp '{s}': {e}"))),
            other => Err(RowError::new(format!("unsupported time value {other}"))),
        }
    }

    /// Seconds since the epoch
    #[must_use]
    pub fn seconds(&self) -> f64 {
        match self {
            RecordingTime::Epoch(s) => *s,
            RecordingTime::Stamp(t) => t.timestamp_millis() as f64 / 1000.0,
        }
    }

    /// Time `offset` seconds later, as a cell of the same representation
    ///
    /// # Errors
    /// Fails when the shifted time is not representable.
    pub fn offset_cell(&self, offset: f64) -> Result<Json, RowError> {
        let out_of_range = || RowError::new(format!("offset {offset}s from {self} is out of range"));
        match self {
            RecordingTime::Epoch(s) => {
                let shifted = s + offset;
                if shifted.is_finite() {
                    Ok(json!(shifted))
                } else {
                    Err(out_of_range())
                }
            }
            RecordingTime::Stamp(t) => {
                let millis = (offset * 1000.0).round();
                if !(millis.is_finite() && millis.abs() < i64::MAX as f64) {
                    return Err(out_of_range());
                }
                Duration::try_milliseconds(millis as i64)
                    .and_then(|delta| t.checked_add_signed(delta))
                    .map(|shifted| Json::String(shifted.to_rfc3339()))
                    .ok_or_else(out_of_range)
            }
        }
    }
}

impl fmt::Display for RecordingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingTime::Epoch(s) => write!(f, "{s}"),
            RecordingTime::Stamp(t) => f.write_str(&t.to_rfc3339()),
        }
    }
}

/// Add `abs_start_time` / `abs_end_time` next to numeric `start_time` / `end_time` offsets
///
/// # Errors
/// Fails when an absolute time is not representable; the row is left
/// without the failing column.
pub(crate) fn add_absolute_times(row: &mut canopy_table::Row, base: &RecordingTime) -> Result<(), RowError> {
    for (offset_col, abs_col) in [("start_time", "abs_start_time"), ("end_time", "abs_end_time")] {
        if let Some(offset) = row.get(offset_col).and_then(Json::as_f64) {
            let cell = base.offset_cell(offset)?;
            row.insert(abs_col.to_string(), cell);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_table::row;

    #[test]
    fn epoch_offsets_add_seconds() {
        let base = RecordingTime::parse(&json!(1000)).unwrap().unwrap();
        assert_eq!(base.offset_cell(2.5).unwrap(), json!(1002.5));
        assert_eq!(base.seconds(), 1000.0);
    }

    #[test]
    fn stamp_offsets_stay_timestamps() {
        let base = RecordingTime::parse(&json!("2021-03-01T10:00:00+00:00")).unwrap().unwrap();
        assert_eq!(base.offset_cell(90.0).unwrap(), json!("2021-03-01T10:01:30+00:00"));
        assert_eq!(base.seconds(), 1_614_592_800.0);
    }

    #[test]
    fn null_is_no_time_and_garbage_fails() {
        assert_eq!(RecordingTime::parse(&Json::Null).unwrap(), None);
        assert!(RecordingTime::parse(&json!("yesterday")).is_err());
        assert!(RecordingTime::parse(&json!([1])).is_err());
    }

    #[test]
    fn absolute_times_follow_offsets() {
        let mut r = row([("start_time", json!(1.0)), ("label", json!("bat"))]);
        add_absolute_times(&mut r, &RecordingTime::Epoch(10.0)).unwrap();
        assert_eq!(r["abs_start_time"], json!(11.0));
        assert!(!r.contains_key("abs_end_time"));
    }

    #[test]
    fn unrepresentable_offsets_fail() {
        let stamp = RecordingTime::parse(&json!("2021-03-01T10:00:00+00:00")).unwrap().unwrap();
        for offset in [1e15, -1e15, 1e300, f64::NAN] {
            assert!(stamp.offset_cell(offset).is_err(), "{offset}");
        }
        assert!(RecordingTime::Epoch(f64::MAX).offset_cell(f64::MAX).is_err());

        let mut r = row([("start_time", json!(1e15))]);
        let err = add_absolute_times(&mut r, &stamp).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(!r.contains_key("abs_start_time"));
    }
}
