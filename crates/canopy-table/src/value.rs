//! Place values
//!
//! Every place in a pipeline resolves to one [`Value`]. The variants mirror
//! the place type tags: scalar, mapping, table and partitioned table.

use crate::bag::Bag;
use crate::error::TableError;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar literal (null, bool, number or string)
pub type Scalar = serde_json::Value;

/// A string-keyed mapping, e.g. a probe configuration
pub type Dict = serde_json::Map<String, serde_json::Value>;

/// The kind of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Single literal
    Scalar,
    /// Mapping
    Dict,
    /// Materialized table
    Table,
    /// Partitioned table
    Bag,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Scalar => "scalar",
            ValueKind::Dict => "dict",
            ValueKind::Table => "table",
            ValueKind::Bag => "bag",
        };
        f.write_str(name)
    }
}

/// A materialized place value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Value {
    /// Single literal
    Scalar(Scalar),
    /// Mapping
    Dict(Dict),
    /// Materialized table
    Table(Table),
    /// Partitioned table
    Bag(Bag),
}

impl Value {
    /// Wrap a literal as a scalar value
    #[inline]
    pub fn scalar(value: impl Into<Scalar>) -> Self {
        Value::Scalar(value.into())
    }

    /// Kind of this value
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Scalar(_) => ValueKind::Scalar,
            Value::Dict(_) => ValueKind::Dict,
            Value::Table(_) => ValueKind::Table,
            Value::Bag(_) => ValueKind::Bag,
        }
    }

    /// Borrow as scalar
    pub fn as_scalar(&self) -> Result<&Scalar, TableError> {
        match self {
            Value::Scalar(s) => Ok(s),
            other => Err(other.unexpected(ValueKind::Scalar)),
        }
    }

    /// Borrow as mapping
    pub fn as_dict(&self) -> Result<&Dict, TableError> {
        match self {
            Value::Dict(d) => Ok(d),
            other => Err(other.unexpected(ValueKind::Dict)),
        }
    }

    /// Borrow as table
    pub fn as_table(&self) -> Result<&Table, TableError> {
        match self {
            Value::Table(t) => Ok(t),
            other => Err(other.unexpected(ValueKind::Table)),
        }
    }

    /// Borrow as bag
    pub fn as_bag(&self) -> Result<&Bag, TableError> {
        match self {
            Value::Bag(b) => Ok(b),
            other => Err(other.unexpected(ValueKind::Bag)),
        }
    }

    /// Take the table out of this value
    pub fn into_table(self) -> Result<Table, TableError> {
        match self {
            Value::Table(t) => Ok(t),
            other => Err(other.unexpected(ValueKind::Table)),
        }
    }

    /// Take the bag out of this value
    pub fn into_bag(self) -> Result<Bag, TableError> {
        match self {
            Value::Bag(b) => Ok(b),
            other => Err(other.unexpected(ValueKind::Bag)),
        }
    }

    /// Read a scalar as a non-negative integer
    pub fn as_usize(&self) -> Result<usize, TableError> {
        let scalar = self.as_scalar()?;
        scalar
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| TableError::invalid_field("scalar", format!("{scalar} is not a non-negative integer")))
    }

    fn unexpected(&self, expected: ValueKind) -> TableError {
        TableError::UnexpectedKind {
            expected,
            found: self.kind(),
        }
    }
}

impl From<Table> for Value {
    fn from(table: Table) -> Self {
        Value::Table(table)
    }
}

impl From<Bag> for Value {
    fn from(bag: Bag) -> Self {
        Value::Bag(bag)
    }
}

impl From<Dict> for Value {
    fn from(dict: Dict) -> Self {
        Value::Dict(dict)
    }
}

/// Whether a JSON literal is a scalar (not an array or object)
#[inline]
#[must_use]
pub fn is_scalar_literal(value: &Scalar) -> bool {
    !matches!(value, serde_json::Value::Array(_) | serde_json::Value::Object(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Value::scalar(3).kind(), ValueKind::Scalar);
        assert_eq!(Value::Dict(Dict::new()).kind(), ValueKind::Dict);
        assert_eq!(Value::Table(Table::new()).kind(), ValueKind::Table);
        assert_eq!(Value::Bag(Bag::default()).kind(), ValueKind::Bag);
    }

    #[test]
    fn wrong_kind_is_reported() {
        let err = Value::scalar("x").into_table().unwrap_err();
        assert_eq!(
            err,
            TableError::UnexpectedKind {
                expected: ValueKind::Table,
                found: ValueKind::Scalar,
            }
        );
    }

    #[test]
    fn usize_from_scalar() {
        assert_eq!(Value::scalar(10).as_usize().unwrap(), 10);
        assert!(Value::scalar(-1).as_usize().is_err());
        assert!(Value::scalar("10").as_usize().is_err());
    }

    #[test]
    fn scalar_literal_check() {
        assert!(is_scalar_literal(&json!(null)));
        assert!(is_scalar_literal(&json!("a")));
        assert!(!is_scalar_literal(&json!([1])));
        assert!(!is_scalar_literal(&json!({"a": 1})));
    }
}
