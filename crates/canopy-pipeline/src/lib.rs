//! Canopy Pipeline
//!
//! A lazy pipeline engine over named computation graphs:
//! - **Places**: literal values or deferred transition results ([`Place`])
//! - **Transitions**: pure functions of upstream values ([`Transition`])
//! - **Pipelines**: named, append-only registries of places ([`Pipeline`])
//! - **Feeds**: per-call scalar overrides ([`Feed`])
//! - **Persist cache**: atomic on-disk artifacts per place ([`PersistStore`])
//! - **Clients**: inline or tokio-backed task execution ([`ExecutionClient`])
//!
//! # Example
//!
//! ```rust
//! use canopy_pipeline::prelude::*;
//! use canopy_table::{row, Table, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pipeline = Pipeline::new("example", std::env::temp_dir());
//! pipeline.register("recordings", (0..6).map(|i| row([("id", i)])).collect::<Table>())?;
//! pipeline.register("npartitions", Value::scalar(3))?;
//! pipeline.register(
//!     "bag",
//!     PlaceSpec::derive(PartitionTable::shared(), ["recordings", "npartitions"]),
//! )?;
//!
//! let ctx = RunContext::new().with_override("npartitions", 2);
//! let bag = pipeline.place("bag")?.compute(&ctx)?.into_bag()?;
//! assert_eq!(bag.npartitions(), 2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod feed;
pub mod persist;
pub mod pipeline;
pub mod place;
pub mod progress;
pub mod report;
pub mod transition;

mod eval;

pub use client::{ExecutionClient, InlineClient, PlaceFuture, Task, TaskHandle, TaskOutcome, TokioClient, Work};
pub use config::EngineConfig;
pub use context::RunContext;
pub use error::{ConfigError, GraphError, PipelineError, TransitionError};
pub use feed::Feed;
pub use persist::{ArtifactCodec, ArtifactFormat, CodecError, JsonCodec, ParquetCodec, PersistStore};
pub use pipeline::{Pipeline, PipelineDescription, PlaceDescription, PlaceRef};
pub use place::{Place, PlaceKind, PlaceSource, PlaceSpec, ScalarCheck};
pub use progress::{ProgressEvent, ProgressLog, ProgressObserver, TracingProgress};
pub use report::{Evaluation, RowFailure, RunReport};
pub use transition::{
    ConcatBag, FnTransition, Output, PartitionTable, RowContext, RowError, RowFunction, RowMap, Transition,
    TransitionRegistry,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building and driving pipelines
    pub use crate::{
        EngineConfig, Feed, InlineClient, PartitionTable, Pipeline, PipelineError, PlaceKind, PlaceSpec, RowMap,
        RunContext, ScalarCheck, TokioClient, Transition,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
