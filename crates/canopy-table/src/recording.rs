//! Typed recording views
//!
//! A [`RecordingFrame`] wraps a recordings table and builds typed
//! [`Recording`] records from its rows. Column names are configurable through
//! [`RecordingColumns`]; only the path column is required.

use crate::error::TableError;
use crate::table::{Row, Table};
use crate::value::Dict;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Logical recording fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingField {
    /// Media location (required)
    Path,
    /// Samples per second
    Samplerate,
    /// Time expansion factor
    Timeexp,
    /// Duration in seconds
    Duration,
    /// Free-form media information
    MediaInfo,
    /// Free-form metadata mapping
    Metadata,
    /// Recording identifier
    Id,
    /// Annotation list
    Annotations,
}

/// Column names for each [`RecordingField`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingColumns {
    /// Path column
    pub path: String,
    /// Samplerate column
    pub samplerate: String,
    /// Time expansion column
    pub timeexp: String,
    /// Duration column
    pub duration: String,
    /// Media info column
    pub media_info: String,
    /// Metadata column
    pub metadata: String,
    /// Identifier column
    pub id: String,
    /// Annotations column
    pub annotations: String,
}

impl Default for RecordingColumns {
    fn default() -> Self {
        Self {
            path: "path".to_string(),
            samplerate: "samplerate".to_string(),
            timeexp: "timeexp".to_string(),
            duration: "duration".to_string(),
            media_info: "media_info".to_string(),
            metadata: "metadata".to_string(),
            id: "id".to_string(),
            annotations: "annotations".to_string(),
        }
    }
}

impl RecordingColumns {
    /// Column currently mapped to a field
    #[must_use]
    pub fn get(&self, field: RecordingField) -> &str {
        match field {
            RecordingField::Path => &self.path,
            RecordingField::Samplerate => &self.samplerate,
            RecordingField::Timeexp => &self.timeexp,
            RecordingField::Duration => &self.duration,
            RecordingField::MediaInfo => &self.media_info,
            RecordingField::Metadata => &self.metadata,
            RecordingField::Id => &self.id,
            RecordingField::Annotations => &self.annotations,
        }
    }

    /// Map a field to another column
    #[must_use]
    pub fn rename(mut self, field: RecordingField, column: impl Into<String>) -> Self {
        let column = column.into();
        match field {
            RecordingField::Path => self.path = column,
            RecordingField::Samplerate => self.samplerate = column,
            RecordingField::Timeexp => self.timeexp = column,
            RecordingField::Duration => self.duration = column,
            RecordingField::MediaInfo => self.media_info = column,
            RecordingField::Metadata => self.metadata = column,
            RecordingField::Id => self.id = column,
            RecordingField::Annotations => self.annotations = column,
        }
        self
    }
}

/// A typed recording record built from one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Media location
    pub path: String,
    /// Samples per second
    pub samplerate: Option<f64>,
    /// Time expansion factor
    pub timeexp: Option<f64>,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// Free-form media information
    pub media_info: Option<Json>,
    /// Metadata mapping (empty when absent)
    pub metadata: Dict,
    /// Identifier
    pub id: Option<Json>,
    /// Annotations (empty when absent)
    pub annotations: Vec<Json>,
}

/// Typed predicate selecting recordings by identifier
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingSelector {
    /// Select every recording
    All,
    /// Select the recording with exactly this identifier
    Id(Json),
    /// Select recordings whose identifier is one of these
    AnyOf(Vec<Json>),
}

impl RecordingSelector {
    /// Whether a recording identifier is selected
    #[must_use]
    pub fn matches(&self, id: Option<&Json>) -> bool {
        match self {
            RecordingSelector::All => true,
            RecordingSelector::Id(wanted) => id.is_some_and(|id| same_id(id, wanted)),
            RecordingSelector::AnyOf(ids) => {
                id.is_some_and(|id| ids.iter().any(|wanted| same_id(id, wanted)))
            }
        }
    }
}

/// Numeric ids compare by value so `1` and `1.0` match
fn same_id(a: &Json, b: &Json) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Adapter exposing typed recordings over a table
#[derive(Debug, Clone)]
pub struct RecordingFrame<'a> {
    table: &'a Table,
    columns: RecordingColumns,
}

impl<'a> RecordingFrame<'a> {
    /// Wrap a table using the default column names
    ///
    /// # Errors
    /// - `TableError::MissingColumn` if the path column is absent
    pub fn new(table: &'a Table) -> Result<Self, TableError> {
        Self::with_columns(table, RecordingColumns::default())
    }

    /// Wrap a table using custom column names
    pub fn with_columns(table: &'a Table, columns: RecordingColumns) -> Result<Self, TableError> {
        table.require_column(&columns.path)?;
        Ok(Self { table, columns })
    }

    /// Column mapping in use
    #[inline]
    #[must_use]
    pub fn columns(&self) -> &RecordingColumns {
        &self.columns
    }

    /// Underlying table
    #[inline]
    #[must_use]
    pub fn table(&self) -> &'a Table {
        self.table
    }

    /// Number of recordings
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether there are no recordings
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Build a typed record from a row
    pub fn build(&self, row: &Row) -> Result<Recording, TableError> {
        build_recording(row, &self.columns)
    }

    /// Recording at `index`
    pub fn get(&self, index: usize) -> Result<Recording, TableError> {
        self.build(self.table.row(index)?)
    }

    /// Iterate typed records in row order
    pub fn iter(&self) -> impl Iterator<Item = Result<Recording, TableError>> + '_ {
        self.table.iter().map(move |row| self.build(row))
    }

    /// First recording with identifier `id`
    pub fn find(&self, id: &Json) -> Result<Option<Recording>, TableError> {
        self.select(&RecordingSelector::Id(id.clone()))
            .next()
            .transpose()
    }

    /// Recordings accepted by a selector, in row order
    pub fn select<'s>(
        &'s self,
        selector: &'s RecordingSelector,
    ) -> impl Iterator<Item = Result<Recording, TableError>> + 's {
        self.table
            .iter()
            .filter(move |row| selector.matches(row.get(&self.columns.id)))
            .map(move |row| self.build(row))
    }

    /// Rows accepted by a selector as a new table
    #[must_use]
    pub fn filter(&self, selector: &RecordingSelector) -> Table {
        let mut out = Table::with_columns(self.table.columns().iter().cloned());
        for row in self.table.iter() {
            if selector.matches(row.get(&self.columns.id)) {
                out.push(row.clone());
            }
        }
        out
    }
}

/// Build a [`Recording`] from a row with the given column mapping
pub fn build_recording(row: &Row, columns: &RecordingColumns) -> Result<Recording, TableError> {
    let path = match row.get(&columns.path) {
        Some(Json::String(p)) => p.clone(),
        Some(other) => {
            return Err(TableError::invalid_field(
                &columns.path,
                format!("expected a string path, found {other}"),
            ))
        }
        None => return Err(TableError::MissingColumn(columns.path.clone())),
    };

    Ok(Recording {
        path,
        samplerate: optional_number(row, &columns.samplerate)?,
        timeexp: optional_number(row, &columns.timeexp)?,
        duration: optional_number(row, &columns.duration)?,
        media_info: present(row, &columns.media_info).cloned(),
        metadata: metadata(row, &columns.metadata)?,
        id: present(row, &columns.id).cloned(),
        annotations: match present(row, &columns.annotations) {
            Some(Json::Array(items)) => items.clone(),
            Some(other) => {
                return Err(TableError::invalid_field(
                    &columns.annotations,
                    format!("expected a list, found {other}"),
                ))
            }
            None => Vec::new(),
        },
    })
}

/// Cell value, treating JSON null as absent
fn present<'r>(row: &'r Row, column: &str) -> Option<&'r Json> {
    row.get(column).filter(|v| !v.is_null())
}

fn optional_number(row: &Row, column: &str) -> Result<Option<f64>, TableError> {
    match present(row, column) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| TableError::invalid_field(column, format!("expected a number, found {v}"))),
    }
}

/// Metadata may arrive as a mapping or as JSON-encoded text
fn metadata(row: &Row, column: &str) -> Result<Dict, TableError> {
    match present(row, column) {
        None => Ok(Dict::new()),
        Some(Json::Object(map)) => Ok(map.clone()),
        Some(Json::String(text)) => match serde_json::from_str::<Json>(text) {
            Ok(Json::Object(map)) => Ok(map),
            Ok(other) => Err(TableError::invalid_field(
                column,
                format!("metadata text decodes to {other}, not a mapping"),
            )),
            Err(e) => Err(TableError::invalid_field(column, e.to_string())),
        },
        Some(other) => Err(TableError::invalid_field(
            column,
            format!("expected a mapping, found {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::row;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn recordings() -> Table {
        Table::from_rows(vec![
            row([
                ("id", json!(1)),
                ("path", json!("a.wav")),
                ("samplerate", json!(48000)),
                ("metadata", json!("{\"site\": \"north\"}")),
            ]),
            row([
                ("id", json!(2)),
                ("path", json!("b.wav")),
                ("duration", json!(60.0)),
                ("annotations", json!([{"label": "bird"}])),
            ]),
        ])
    }

    #[test]
    fn requires_path_column() {
        let table = Table::from_rows(vec![row([("id", 1)])]);
        assert_eq!(
            RecordingFrame::new(&table).unwrap_err(),
            TableError::MissingColumn("path".to_string())
        );
    }

    #[test]
    fn builds_typed_records() {
        let table = recordings();
        let frame = RecordingFrame::new(&table).unwrap();

        let first = frame.get(0).unwrap();
        assert_eq!(first.path, "a.wav");
        assert_eq!(first.samplerate, Some(48000.0));
        assert_eq!(first.metadata.get("site"), Some(&json!("north")));
        assert!(first.annotations.is_empty());

        let second = frame.get(1).unwrap();
        assert_eq!(second.duration, Some(60.0));
        assert_eq!(second.annotations.len(), 1);
        assert!(second.metadata.is_empty());
    }

    #[test]
    fn renamed_columns() {
        let table = Table::from_rows(vec![row([("file", "x.wav"), ("rec", "r-1")])]);
        let columns = RecordingColumns::default()
            .rename(RecordingField::Path, "file")
            .rename(RecordingField::Id, "rec");
        let frame = RecordingFrame::with_columns(&table, columns).unwrap();

        let rec = frame.find(&json!("r-1")).unwrap().unwrap();
        assert_eq!(rec.path, "x.wav");
        assert_eq!(frame.columns().get(RecordingField::Path), "file");
    }

    #[test]
    fn invalid_number_is_reported() {
        let table = Table::from_rows(vec![row([("path", json!("a.wav")), ("samplerate", json!("fast"))])]);
        let frame = RecordingFrame::new(&table).unwrap();
        assert!(matches!(frame.get(0), Err(TableError::InvalidField { .. })));
    }

    #[test]
    fn selector_filters_by_id() {
        let table = recordings();
        let frame = RecordingFrame::new(&table).unwrap();

        let selector = RecordingSelector::AnyOf(vec![json!(2.0)]);
        let picked: Vec<_> = frame.select(&selector).collect::<Result<_, _>>().unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].path, "b.wav");

        assert_eq!(frame.filter(&RecordingSelector::All).len(), 2);
        assert!(frame.find(&json!(9)).unwrap().is_none());
    }
}
