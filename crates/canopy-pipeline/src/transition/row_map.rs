//! Row-wise mapping transition
//!
//! Applies a [`RowFunction`] to every row of every partition. A failing row
//! (error or panic) is recorded as a [`RowFailure`] and left out of the
//! output; the rest of the partition and the call carry on.

use super::{Output, Transition};
use crate::error::TransitionError;
use crate::feed::Feed;
use crate::place::PlaceKind;
use crate::report::RowFailure;
use canopy_table::{Bag, Row, Table, TableError, Value};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Failure of a single row
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RowError(String);

impl RowError {
    /// Create a row error
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Failure message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<TableError> for RowError {
    fn from(e: TableError) -> Self {
        Self(e.to_string())
    }
}

/// Where a row sits and which static parameters came with it
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    /// Partition index
    pub partition: usize,
    /// Row index within the partition
    pub row: usize,
    /// Upstream values after the bag, in declaration order
    pub params: &'a [Value],
    /// Overrides of the current call
    pub feed: &'a Feed,
}

impl<'a> RowContext<'a> {
    /// Static parameter at `index`
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&'a Value> {
        self.params.get(index)
    }
}

/// A per-row function producing zero or more derived rows
pub trait RowFunction: Send + Sync + fmt::Debug {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Derive rows from one input row
    fn apply(&self, row: &Row, ctx: &RowContext<'_>) -> Result<Vec<Row>, RowError>;
}

/// Map a [`RowFunction`] over a partitioned table
///
/// Inputs: `[bag, params...]`. A plain table input is treated as a single
/// partition. With `merge` the partition outputs are concatenated in
/// partition order into a table; otherwise the output stays a bag with one
/// output partition per input partition.
#[derive(Debug, Clone)]
pub struct RowMap {
    name: String,
    function: Arc<dyn RowFunction>,
    merge: bool,
}

impl RowMap {
    /// Map producing a merged table
    pub fn merged(name: impl Into<String>, function: Arc<dyn RowFunction>) -> Self {
        Self {
            name: name.into(),
            function,
            merge: true,
        }
    }

    /// Map producing a bag
    pub fn partitioned(name: impl Into<String>, function: Arc<dyn RowFunction>) -> Self {
        Self {
            name: name.into(),
            function,
            merge: false,
        }
    }

    /// Share behind `Arc`
    #[must_use]
    pub fn shared(self) -> Arc<dyn Transition> {
        Arc::new(self)
    }

    fn map_partition(
        &self,
        index: usize,
        partition: &Table,
        params: &[Value],
        feed: &Feed,
        failures: &mut Vec<RowFailure>,
    ) -> Table {
        let mut out = Table::new();
        for (row_index, row) in partition.iter().enumerate() {
            let ctx = RowContext {
                partition: index,
                row: row_index,
                params,
                feed,
            };
            let result = catch_unwind(AssertUnwindSafe(|| self.function.apply(row, &ctx)))
                .unwrap_or_else(|panic| Err(RowError::new(panic_message(panic.as_ref()))));

            match result {
                Ok(rows) => {
                    for derived in rows {
                        out.push(derived);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        function = self.function.name(),
                        partition = index,
                        row = row_index,
                        error = %e,
                        "row skipped"
                    );
                    failures.push(RowFailure {
                        partition: index,
                        row: row_index,
                        message: e.to_string(),
                    });
                }
            }
        }
        out
    }
}

impl Transition for RowMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_kind(&self) -> PlaceKind {
        if self.merge {
            PlaceKind::Table
        } else {
            PlaceKind::Bag
        }
    }

    fn execute(&self, inputs: Vec<Value>, feed: &Feed) -> Result<Output, TransitionError> {
        let mut inputs = inputs.into_iter();
        let bag = match inputs.next() {
            Some(Value::Bag(bag)) => bag,
            Some(Value::Table(table)) => Bag::new(vec![table]),
            Some(other) => {
                return Err(TransitionError::invalid_input(
                    0,
                    format!("expected a bag or table, found {}", other.kind()),
                ))
            }
            None => return Err(TransitionError::invalid_input(0, "missing input")),
        };
        let params: Vec<Value> = inputs.collect();

        let mut failures = Vec::new();
        let outputs: Vec<Table> = bag
            .partitions()
            .iter()
            .enumerate()
            .map(|(i, partition)| self.map_partition(i, partition, &params, feed, &mut failures))
            .collect();

        if !failures.is_empty() {
            tracing::warn!(
                transition = %self.name,
                skipped = failures.len(),
                "rows skipped during row-wise mapping"
            );
        }

        let value = if self.merge {
            Value::Table(Table::concat(outputs))
        } else {
            Value::Bag(Bag::new(outputs))
        };

        Ok(Output {
            value,
            row_failures: failures,
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
