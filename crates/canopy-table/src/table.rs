//! Row-oriented tables
//!
//! A [`Table`] keeps an ordered column list plus rows of named JSON cells.
//! Row order is significant and preserved by every operation here.

use crate::error::TableError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One table row: column name to cell
pub type Row = IndexMap<String, serde_json::Value>;

/// Build a row from `(column, value)` pairs
pub fn row<K, V, I>(pairs: I) -> Row
where
    K: Into<String>,
    V: Into<serde_json::Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Ordered rows with a column list in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Create an empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table with declared columns
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Create a table from rows; columns are the union of row keys
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut table = Self::new();
        for row in rows {
            table.push(row);
        }
        table
    }

    /// Append a row, registering any unseen columns
    pub fn push(&mut self, row: Row) {
        for key in row.keys() {
            if !self.columns.iter().any(|c| c == key) {
                self.columns.push(key.clone());
            }
        }
        self.rows.push(row);
    }

    /// Column names
    #[inline]
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether a column is declared
    #[inline]
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Require a column, failing with [`TableError::MissingColumn`]
    pub fn require_column(&self, name: &str) -> Result<(), TableError> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(TableError::MissingColumn(name.to_string()))
        }
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows in order
    #[inline]
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Row at `index`
    pub fn row(&self, index: usize) -> Result<&Row, TableError> {
        self.rows.get(index).ok_or(TableError::RowOutOfBounds {
            index,
            len: self.rows.len(),
        })
    }

    /// Iterate rows
    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Consume into rows
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Cells of one column, `None` where a row lacks it
    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = Option<&'a serde_json::Value>> + 'a {
        self.rows.iter().map(move |r| r.get(name))
    }

    /// Copy of a contiguous row range, keeping the column list
    pub fn slice(&self, range: Range<usize>) -> Result<Table, TableError> {
        if range.start > range.end || range.end > self.rows.len() {
            return Err(TableError::RowOutOfBounds {
                index: range.end,
                len: self.rows.len(),
            });
        }
        Ok(Self {
            columns: self.columns.clone(),
            rows: self.rows[range].to_vec(),
        })
    }

    /// Concatenate tables in order
    pub fn concat<I>(tables: I) -> Table
    where
        I: IntoIterator<Item = Table>,
    {
        let mut out = Table::new();
        for table in tables {
            for column in table.columns {
                if !out.has_column(&column) {
                    out.columns.push(column);
                }
            }
            out.rows.extend(table.rows);
        }
        out
    }
}

impl FromIterator<Row> for Table {
    fn from_iter<T: IntoIterator<Item = Row>>(iter: T) -> Self {
        Self::from_rows(iter.into_iter().collect())
    }
}

impl IntoIterator for Table {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
