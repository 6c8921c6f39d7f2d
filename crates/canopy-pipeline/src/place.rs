//! Places: the nodes of a pipeline graph
//!
//! A place holds exactly one of:
//! - a literal value, fixed at registration
//! - a pending handle from another walk, resolved on demand
//! - a transition plus the ordered names of the upstream places it consumes
//!
//! Scalar literals may carry a [`ScalarCheck`] that both the registered value
//! and every fed override must pass.

use crate::client::PlaceFuture;
use crate::transition::Transition;
use canopy_table::{Bag, Dict, Scalar, Table, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Type tag of a place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceKind {
    /// Single literal; the only kind a feed may override
    Scalar,
    /// Mapping
    Dict,
    /// Materialized table
    Table,
    /// Partitioned table
    Bag,
    /// Pending handle of another walk
    Future,
}

impl PlaceKind {
    /// Lowercase tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PlaceKind::Scalar => "scalar",
            PlaceKind::Dict => "dict",
            PlaceKind::Table => "table",
            PlaceKind::Bag => "bag",
            PlaceKind::Future => "future",
        }
    }
}

impl From<ValueKind> for PlaceKind {
    fn from(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Scalar => PlaceKind::Scalar,
            ValueKind::Dict => PlaceKind::Dict,
            ValueKind::Table => PlaceKind::Table,
            ValueKind::Bag => PlaceKind::Bag,
        }
    }
}

impl fmt::Display for PlaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constraint on the value of a scalar place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarCheck {
    /// Integer no smaller than the bound
    AtLeast(u64),
    /// Finite number above zero
    Positive,
    /// String
    Text,
    /// Null, or an integer no smaller than the bound
    NullOrAtLeast(u64),
    /// Null, or a string
    NullOrText,
}

impl ScalarCheck {
    /// Check a value
    ///
    /// # Errors
    /// The violated constraint, phrased for an error message
    pub fn check(self, value: &Scalar) -> Result<(), String> {
        let accepted = match self {
            ScalarCheck::AtLeast(min) => value.as_u64().is_some_and(|n| n >= min),
            ScalarCheck::Positive => value.as_f64().is_some_and(|n| n.is_finite() && n > 0.0),
            ScalarCheck::Text => value.is_string(),
            ScalarCheck::NullOrAtLeast(min) => value.is_null() || value.as_u64().is_some_and(|n| n >= min),
            ScalarCheck::NullOrText => value.is_null() || value.is_string(),
        };
        if accepted {
            Ok(())
        } else {
            Err(format!("{}, found {value}", self.describe()))
        }
    }

    fn describe(self) -> String {
        match self {
            ScalarCheck::AtLeast(min) => format!("must be an integer of at least {min}"),
            ScalarCheck::Positive => "must be a positive number".to_string(),
            ScalarCheck::Text => "must be a string".to_string(),
            ScalarCheck::NullOrAtLeast(min) => format!("must be null or an integer of at least {min}"),
            ScalarCheck::NullOrText => "must be null or a string".to_string(),
        }
    }
}

/// What a place resolves from
#[derive(Debug, Clone)]
pub enum PlaceSource {
    /// Fixed value
    Literal(Arc<Value>),
    /// Value of another walk, awaited when needed
    Pending(PlaceFuture),
    /// Transition applied to upstream places
    Derived {
        /// Transition producing the value
        transition: Arc<dyn Transition>,
        /// Upstream place names, in input order
        inputs: Vec<String>,
    },
}

/// Registration request for [`Pipeline::register`](crate::Pipeline::register)
#[derive(Debug, Clone)]
pub enum PlaceSpec {
    /// Fixed value
    Literal(Value),
    /// Fixed scalar constrained for feeds
    Checked {
        /// Registered value
        value: Scalar,
        /// Constraint on registered and fed values
        check: ScalarCheck,
    },
    /// Handle of another walk
    Pending(PlaceFuture),
    /// Transition over upstream places
    Derived {
        /// Transition producing the value
        transition: Arc<dyn Transition>,
        /// Upstream place names, in input order
        inputs: Vec<String>,
    },
}

impl PlaceSpec {
    /// Scalar literal whose registered and fed values must pass `check`
    pub fn checked(value: impl Into<Scalar>, check: ScalarCheck) -> Self {
        PlaceSpec::Checked {
            value: value.into(),
            check,
        }
    }

    /// Place derived by `transition` from the named upstream places
    pub fn derive<I, S>(transition: Arc<dyn Transition>, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PlaceSpec::Derived {
            transition,
            inputs: inputs.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Value> for PlaceSpec {
    fn from(value: Value) -> Self {
        PlaceSpec::Literal(value)
    }
}

impl From<Table> for PlaceSpec {
    fn from(table: Table) -> Self {
        PlaceSpec::Literal(Value::Table(table))
    }
}

impl From<Bag> for PlaceSpec {
    fn from(bag: Bag) -> Self {
        PlaceSpec::Literal(Value::Bag(bag))
    }
}

impl From<Dict> for PlaceSpec {
    fn from(dict: Dict) -> Self {
        PlaceSpec::Literal(Value::Dict(dict))
    }
}

impl From<PlaceFuture> for PlaceSpec {
    fn from(future: PlaceFuture) -> Self {
        PlaceSpec::Pending(future)
    }
}

/// A named graph node
#[derive(Debug)]
pub struct Place {
    name: String,
    kind: PlaceKind,
    persist: AtomicBool,
    check: Option<ScalarCheck>,
    source: PlaceSource,
}

impl Place {
    pub(crate) fn new(name: String, spec: PlaceSpec) -> Self {
        let mut check = None;
        let (kind, source) = match spec {
            PlaceSpec::Literal(value) => (value.kind().into(), PlaceSource::Literal(Arc::new(value))),
            PlaceSpec::Checked { value, check: rule } => {
                check = Some(rule);
                (PlaceKind::Scalar, PlaceSource::Literal(Arc::new(Value::Scalar(value))))
            }
            PlaceSpec::Pending(future) => (PlaceKind::Future, PlaceSource::Pending(future)),
            PlaceSpec::Derived { transition, inputs } => (
                transition.output_kind(),
                PlaceSource::Derived { transition, inputs },
            ),
        };
        Self {
            name,
            kind,
            persist: AtomicBool::new(false),
            check,
            source,
        }
    }

    /// Place name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type tag
    #[inline]
    #[must_use]
    pub fn kind(&self) -> PlaceKind {
        self.kind
    }

    /// Constraint on fed values, if registered with one
    #[inline]
    #[must_use]
    pub fn check(&self) -> Option<ScalarCheck> {
        self.check
    }

    /// Source of the value
    #[inline]
    #[must_use]
    pub fn source(&self) -> &PlaceSource {
        &self.source
    }

    /// Whether computed values are written to the persist cache
    #[inline]
    #[must_use]
    pub fn persist(&self) -> bool {
        self.persist.load(Ordering::Acquire)
    }

    /// Toggle caching for this place only; upstream places are unaffected
    pub fn set_persist(&self, persist: bool) {
        self.persist.store(persist, Ordering::Release);
    }

    /// Upstream place names, empty for literals
    #[must_use]
    pub fn inputs(&self) -> &[String] {
        match &self.source {
            PlaceSource::Derived { inputs, .. } => inputs,
            _ => &[],
        }
    }

    /// Transition, if derived
    #[must_use]
    pub fn transition(&self) -> Option<&Arc<dyn Transition>> {
        match &self.source {
            PlaceSource::Derived { transition, .. } => Some(transition),
            _ => None,
        }
    }

    /// Literal value, if fixed
    #[must_use]
    pub fn literal(&self) -> Option<&Value> {
        match &self.source {
            PlaceSource::Literal(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::PartitionTable;

    #[test]
    fn kind_follows_literal() {
        let place = Place::new("n".into(), Value::scalar(4).into());
        assert_eq!(place.kind(), PlaceKind::Scalar);
        assert_eq!(place.literal(), Some(&Value::scalar(4)));
        assert!(place.inputs().is_empty());
    }

    #[test]
    fn kind_follows_transition() {
        let spec = PlaceSpec::derive(PartitionTable::shared(), ["recordings", "npartitions"]);
        let place = Place::new("bag".into(), spec);
        assert_eq!(place.kind(), PlaceKind::Bag);
        assert_eq!(place.inputs(), &["recordings".to_string(), "npartitions".to_string()]);
        assert_eq!(place.transition().map(|t| t.name()), Some(PartitionTable::NAME));
    }

    #[test]
    fn checked_literal_is_a_scalar() {
        let place = Place::new("n".into(), PlaceSpec::checked(4, ScalarCheck::AtLeast(1)));
        assert_eq!(place.kind(), PlaceKind::Scalar);
        assert_eq!(place.literal(), Some(&Value::scalar(4)));
        assert_eq!(place.check(), Some(ScalarCheck::AtLeast(1)));
    }

    #[test]
    fn checks_accept_and_reject() {
        use serde_json::json;

        assert!(ScalarCheck::AtLeast(1).check(&json!(3)).is_ok());
        assert!(ScalarCheck::AtLeast(1).check(&json!(0)).is_err());
        assert!(ScalarCheck::AtLeast(1).check(&json!(-2)).is_err());
        assert!(ScalarCheck::AtLeast(1).check(&json!(2.5)).is_err());
        assert!(ScalarCheck::AtLeast(1).check(&json!("ten")).is_err());
        assert!(ScalarCheck::Positive.check(&json!(0.5)).is_ok());
        assert!(ScalarCheck::Positive.check(&json!(0)).is_err());
        assert!(ScalarCheck::Text.check(&json!("time")).is_ok());
        assert!(ScalarCheck::Text.check(&json!(null)).is_err());
        assert!(ScalarCheck::NullOrAtLeast(1).check(&json!(null)).is_ok());
        assert!(ScalarCheck::NullOrAtLeast(1).check(&json!(0)).is_err());
        assert!(ScalarCheck::NullOrText.check(&json!(null)).is_ok());
        assert!(ScalarCheck::NullOrText.check(&json!(1)).is_err());

        let reason = ScalarCheck::AtLeast(1).check(&json!(0)).unwrap_err();
        assert_eq!(reason, "must be an integer of at least 1, found 0");
    }

    #[test]
    fn persist_toggles_in_place() {
        let place = Place::new("t".into(), Table::new().into());
        assert!(!place.persist());
        place.set_persist(true);
        assert!(place.persist());
    }
}
