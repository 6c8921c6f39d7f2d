//! Error types for the pipeline engine
//!
//! Provides error handling for:
//! - Configuration problems (bad overrides, bad parameters), raised before any work
//! - Graph shape problems (duplicate names, forward references), raised at registration
//! - Cache misses on `read`
//! - Transition failures, raised from `compute` or surfaced by a resolved future
//!
//! Per-row failures inside row-wise transitions are not errors; they are
//! recorded as [`RowFailure`](crate::report::RowFailure) values.

use canopy_table::TableError;
use std::path::PathBuf;
use std::sync::Arc;

/// Invalid configuration, detected before any computation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Feed key does not name a scalar place
    #[error("unknown feed key '{0}': no scalar place of that name")]
    UnknownFeedKey(String),

    /// Feed value is an array or mapping
    #[error("feed override for '{0}' must be a scalar literal")]
    NonScalarOverride(String),

    /// A parameter is out of range or of the wrong shape
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Human readable cause
        reason: String,
    },

    /// Transition name registered twice
    #[error("transition '{0}' already registered")]
    DuplicateTransition(String),

    /// Transition name not registered
    #[error("unknown transition '{0}'")]
    UnknownTransition(String),

    /// Literal value missing while rebuilding a described pipeline
    #[error("no literal supplied for place '{0}'")]
    MissingLiteral(String),

    /// Configuration file could not be read or parsed
    #[error("failed to load configuration from {path}: {reason}")]
    Load {
        /// File path
        path: PathBuf,
        /// Human readable cause
        reason: String,
    },
}

impl ConfigError {
    /// Create invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Invalid graph shape, detected at registration time
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Place name already registered
    #[error("place '{0}' already registered")]
    DuplicatePlace(String),

    /// Place consumes a name not yet registered
    #[error("place '{place}' references unregistered place '{missing}'")]
    UnregisteredReference {
        /// Place being registered
        place: String,
        /// Upstream name that does not exist
        missing: String,
    },

    /// Lookup of a name that does not exist
    #[error("no place named '{0}'")]
    PlaceNotFound(String),

    /// Wrong number of upstream places for a transition
    #[error("transition '{transition}' at place '{place}' expects {expected} inputs, got {actual}")]
    Arity {
        /// Place being registered
        place: String,
        /// Transition name
        transition: String,
        /// Inputs the transition takes
        expected: usize,
        /// Inputs supplied
        actual: usize,
    },

    /// Pipeline or place name unusable as a cache path component
    #[error("invalid name '{name}': {reason}")]
    InvalidName {
        /// Offending name
        name: String,
        /// Human readable cause
        reason: String,
    },

    /// Registered literal fails its own check
    #[error("literal of place '{place}' {reason}")]
    InvalidLiteral {
        /// Place being registered
        place: String,
        /// Human readable cause
        reason: String,
    },
}

/// Failure inside a transition
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransitionError {
    /// An input or output had the wrong shape
    #[error(transparent)]
    Table(#[from] TableError),

    /// An input was missing or unusable
    #[error("invalid input {index}: {reason}")]
    InvalidInput {
        /// Position of the input
        index: usize,
        /// Human readable cause
        reason: String,
    },

    /// Any other failure
    #[error("{0}")]
    Failed(String),
}

impl TransitionError {
    /// Create invalid input error
    pub fn invalid_input(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            index,
            reason: reason.into(),
        }
    }

    /// Create a generic failure
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Main engine error type
///
/// Cloneable so that every dependant of a shared task observes the same
/// failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid graph shape
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// No persisted artifact for a place
    #[error("no persisted artifact at {}", path.display())]
    CacheMiss {
        /// Expected artifact location
        path: PathBuf,
    },

    /// A transition failed
    #[error("transition failed at place '{place}': {source}")]
    Transition {
        /// Place whose transition failed
        place: String,
        /// Underlying failure
        #[source]
        source: TransitionError,
    },

    /// Filesystem failure in the persist cache
    #[error("io error at {}: {source}", path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Artifact could not be encoded or decoded
    #[error("codec error at {}: {reason}", path.display())]
    Codec {
        /// Artifact path
        path: PathBuf,
        /// Human readable cause
        reason: String,
    },

    /// Task cancelled through its handle
    #[error("task for place '{0}' was cancelled")]
    Cancelled(String),

    /// Execution client failure (worker lost, pool closed)
    #[error("execution client error: {0}")]
    Client(String),
}

impl PipelineError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Create transition error for place
    pub fn transition(place: impl Into<String>, source: TransitionError) -> Self {
        Self::Transition {
            place: place.into(),
            source,
        }
    }

    /// Configuration error
    #[inline]
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, PipelineError::Config(_))
    }

    /// Graph shape error
    #[inline]
    #[must_use]
    pub fn is_graph(&self) -> bool {
        matches!(self, PipelineError::Graph(_))
    }

    /// Missing persisted artifact
    #[inline]
    #[must_use]
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, PipelineError::CacheMiss { .. })
    }

    /// Cancelled task
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled(_))
    }

    /// Fails fast before any computation happens
    #[must_use]
    pub fn is_construction_error(&self) -> bool {
        self.is_config() || self.is_graph()
    }
}
