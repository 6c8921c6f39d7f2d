//! Transitions
//!
//! A [`Transition`] maps the values of its upstream places (plus the call's
//! [`Feed`]) to one new value. Transitions are named, stateless and shared
//! behind `Arc`, so the same instance can be shipped to any worker.
//!
//! Built-in transitions:
//! - [`PartitionTable`]: table + partition count → bag
//! - [`RowMap`]: bag + static parameters → derived rows, per partition
//! - [`ConcatBag`]: bag → table
//! - [`FnTransition`]: wraps a plain function under a name

pub mod partition;
pub mod registry;
pub mod row_map;

pub use partition::PartitionTable;
pub use registry::TransitionRegistry;
pub use row_map::{RowContext, RowError, RowFunction, RowMap};

use crate::error::TransitionError;
use crate::feed::Feed;
use crate::place::PlaceKind;
use crate::report::RowFailure;
use canopy_table::Value;
use std::fmt;
use std::sync::Arc;

/// Result of one transition invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    /// Produced value
    pub value: Value,
    /// Rows excluded from the value
    pub row_failures: Vec<RowFailure>,
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Self {
            value,
            row_failures: Vec::new(),
        }
    }
}

/// A pure function from upstream values to one value
pub trait Transition: Send + Sync + fmt::Debug {
    /// Registry name
    fn name(&self) -> &str;

    /// Kind of the produced value
    fn output_kind(&self) -> PlaceKind;

    /// Exact number of upstream places, when fixed
    fn arity(&self) -> Option<usize> {
        None
    }

    /// Produce the output from resolved inputs
    ///
    /// Inputs arrive in the order the place declared its upstream names.
    fn execute(&self, inputs: Vec<Value>, feed: &Feed) -> Result<Output, TransitionError>;
}

/// Concatenate a bag's partitions into one table
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatBag;

impl ConcatBag {
    /// Registry name
    pub const NAME: &'static str = "concat_bag";

    /// Shared instance
    #[must_use]
    pub fn shared() -> Arc<dyn Transition> {
        Arc::new(Self)
    }
}

impl Transition for ConcatBag {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn output_kind(&self) -> PlaceKind {
        PlaceKind::Table
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }

    fn execute(&self, inputs: Vec<Value>, _feed: &Feed) -> Result<Output, TransitionError> {
        let bag = single_input(inputs)?.into_bag()?;
        Ok(Value::Table(bag.into_table()).into())
    }
}

type TransitionFn = dyn Fn(Vec<Value>, &Feed) -> Result<Value, TransitionError> + Send + Sync;

/// A named transition backed by a function
#[derive(Clone)]
pub struct FnTransition {
    name: String,
    kind: PlaceKind,
    arity: Option<usize>,
    func: Arc<TransitionFn>,
}

impl FnTransition {
    /// Wrap a function
    pub fn new<F>(name: impl Into<String>, kind: PlaceKind, func: F) -> Self
    where
        F: Fn(Vec<Value>, &Feed) -> Result<Value, TransitionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind,
            arity: None,
            func: Arc::new(func),
        }
    }

    /// Fix the number of inputs
    #[must_use]
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    /// Share behind `Arc`
    #[must_use]
    pub fn shared(self) -> Arc<dyn Transition> {
        Arc::new(self)
    }
}

impl fmt::Debug for FnTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransition")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl Transition for FnTransition {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_kind(&self) -> PlaceKind {
        self.kind
    }

    fn arity(&self) -> Option<usize> {
        self.arity
    }

    fn execute(&self, inputs: Vec<Value>, feed: &Feed) -> Result<Output, TransitionError> {
        (self.func)(inputs, feed).map(Output::from)
    }
}

fn single_input(inputs: Vec<Value>) -> Result<Value, TransitionError> {
    inputs
        .into_iter()
        .next()
        .ok_or_else(|| TransitionError::invalid_input(0, "missing input"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_table::{row, Bag, Table};

    #[test]
    fn concat_bag_restores_table() {
        let table: Table = (0..7).map(|i| row([("id", i)])).collect();
        let bag = Bag::partition(&table, 3).unwrap();

        let out = ConcatBag.execute(vec![Value::Bag(bag)], &Feed::new()).unwrap();
        assert_eq!(out.value, Value::Table(table));
        assert!(out.row_failures.is_empty());
    }

    #[test]
    fn concat_bag_rejects_table_input() {
        let err = ConcatBag
            .execute(vec![Value::Table(Table::new())], &Feed::new())
            .unwrap_err();
        assert!(matches!(err, TransitionError::Table(_)));
    }

    #[test]
    fn fn_transition_runs_function() {
        let double = FnTransition::new("double", PlaceKind::Scalar, |inputs, _| {
            let n = inputs[0].as_usize()?;
            Ok(Value::scalar(n * 2))
        })
        .with_arity(1);

        assert_eq!(double.name(), "double");
        assert_eq!(double.arity(), Some(1));
        let out = double.execute(vec![Value::scalar(21)], &Feed::new()).unwrap();
        assert_eq!(out.value, Value::scalar(42));
    }
}
