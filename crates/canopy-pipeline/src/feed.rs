//! Feed overrides
//!
//! A [`Feed`] substitutes scalar place values for one call without touching
//! the graph. Keys must name scalar places of the pipeline being driven;
//! anything else is rejected before the walk starts.

use crate::error::ConfigError;
use crate::pipeline::Pipeline;
use crate::place::PlaceKind;
use canopy_table::value::is_scalar_literal;
use canopy_table::{Scalar, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Per-call scalar overrides, keyed by place name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Feed {
    overrides: IndexMap<String, Scalar>,
}

impl Feed {
    /// Create an empty feed
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override, builder style
    #[must_use]
    pub fn with(mut self, place: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.insert(place, value);
        self
    }

    /// Add or replace an override
    pub fn insert(&mut self, place: impl Into<String>, value: impl Into<Scalar>) {
        self.overrides.insert(place.into(), value.into());
    }

    /// Override for a place, if any
    #[inline]
    #[must_use]
    pub fn get(&self, place: &str) -> Option<&Scalar> {
        self.overrides.get(place)
    }

    /// Number of overrides
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    /// Whether there are no overrides
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// Iterate overrides in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Scalar)> {
        self.overrides.iter()
    }

    /// Check every key and value against the pipeline
    ///
    /// A place registered with a [`ScalarCheck`](crate::place::ScalarCheck)
    /// accepts what the check accepts. Any other scalar literal accepts
    /// values of its own JSON type; a `null` literal accepts any scalar.
    ///
    /// # Errors
    /// - `ConfigError::UnknownFeedKey` if a key names no scalar place
    /// - `ConfigError::NonScalarOverride` if a value is a list or mapping
    /// - `ConfigError::InvalidParameter` if a value fails the place's check
    ///   or type
    pub fn validate(&self, pipeline: &Pipeline) -> Result<(), ConfigError> {
        for (name, value) in &self.overrides {
            let place = match pipeline.get(name) {
                Some(place) if place.kind() == PlaceKind::Scalar => place,
                _ => return Err(ConfigError::UnknownFeedKey(name.clone())),
            };
            if !is_scalar_literal(value) {
                return Err(ConfigError::NonScalarOverride(name.clone()));
            }

            if let Some(check) = place.check() {
                check
                    .check(value)
                    .map_err(|reason| ConfigError::invalid_parameter(name.clone(), reason))?;
            } else if let Some(Value::Scalar(registered)) = place.literal() {
                let expected = json_type(registered);
                if !registered.is_null() && expected != json_type(value) {
                    return Err(ConfigError::invalid_parameter(
                        name.clone(),
                        format!("must be a {expected}, found {value}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Override applying to a place of the given kind
    ///
    /// Non-scalar places are never overridden.
    #[must_use]
    pub fn resolve(&self, place: &str, kind: PlaceKind) -> Option<&Scalar> {
        if kind == PlaceKind::Scalar {
            self.get(place)
        } else {
            None
        }
    }
}

fn json_type(value: &Scalar) -> &'static str {
    match value {
        Scalar::Null => "null",
        Scalar::Bool(_) => "boolean",
        Scalar::Number(_) => "number",
        Scalar::String(_) => "string",
        Scalar::Array(_) => "array",
        Scalar::Object(_) => "mapping",
    }
}

impl<K, V> FromIterator<(K, V)> for Feed
where
    K: Into<String>,
    V: Into<Scalar>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut feed = Feed::new();
        for (k, v) in iter {
            feed.insert(k, v);
        }
        feed
    }
}
