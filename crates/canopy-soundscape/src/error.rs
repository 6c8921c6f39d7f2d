//! Error types for concrete pipelines

use canopy_pipeline::{ConfigError, GraphError, PipelineError};
use canopy_table::TableError;

/// Failure building or driving a concrete pipeline
#[derive(Debug, Clone, thiserror::Error)]
pub enum SoundscapeError {
    /// Invalid pipeline options, detected before any place is registered
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid graph shape
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Failure while computing, reading or submitting
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A result did not have the expected shape
    #[error(transparent)]
    Table(#[from] TableError),
}

impl SoundscapeError {
    /// Configuration error, at build time or call start
    #[must_use]
    pub fn is_config(&self) -> bool {
        match self {
            SoundscapeError::Config(_) => true,
            SoundscapeError::Pipeline(e) => e.is_config(),
            _ => false,
        }
    }

    /// Missing persisted artifact
    #[must_use]
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, SoundscapeError::Pipeline(e) if e.is_cache_miss())
    }
}
