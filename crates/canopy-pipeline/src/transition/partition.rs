//! Partitioning transition: table → bag

use super::{Output, Transition};
use crate::error::TransitionError;
use crate::feed::Feed;
use crate::place::PlaceKind;
use canopy_table::{Bag, Value};
use std::sync::Arc;

/// Split a table into `n` balanced, order-preserving partitions
///
/// Inputs: `[table, npartitions]`. Partition sizes differ by at most one
/// row; the first `rows % n` partitions take the extra rows. A count above
/// the row count yields trailing empty partitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionTable;

impl PartitionTable {
    /// Registry name
    pub const NAME: &'static str = "partition_table";

    /// Shared instance
    #[must_use]
    pub fn shared() -> Arc<dyn Transition> {
        Arc::new(Self)
    }
}

impl Transition for PartitionTable {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn output_kind(&self) -> PlaceKind {
        PlaceKind::Bag
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }

    fn execute(&self, inputs: Vec<Value>, _feed: &Feed) -> Result<Output, TransitionError> {
        let [table, count]: [Value; 2] = inputs
            .try_into()
            .map_err(|v: Vec<Value>| TransitionError::invalid_input(v.len(), "expected [table, npartitions]"))?;

        let table = table.into_table()?;
        let n = count
            .as_usize()
            .map_err(|e| TransitionError::invalid_input(1, e.to_string()))?;
        if n == 0 {
            return Err(TransitionError::invalid_input(1, "npartitions must be at least 1"));
        }

        let bag = Bag::partition(&table, n)?;
        tracing::debug!(
            rows = table.len(),
            npartitions = n,
            "partitioned table"
        );
        Ok(Value::Bag(bag).into())
    }
}
