//! Canopy Soundscape
//!
//! Concrete pipelines over recording tables:
//! - **Probe pipeline**: run a detector on every recording ([`ProbePipeline`])
//! - **Soundscape pipeline**: per-recording indices, optionally bucketed in
//!   time ([`SoundscapePipeline`])
//! - **Collaborators**: detectors ([`Probe`]) and index computations
//!   ([`Indexer`]) supplied by the caller
//!
//! # Example
//!
//! ```rust
//! use canopy_pipeline::{RowError, RunContext};
//! use canopy_soundscape::{Probe, ProbeOptions, ProbePipeline};
//! use canopy_table::{row, Dict, Recording, Row, Table};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Loud;
//!
//! impl Probe for Loud {
//!     fn name(&self) -> &str {
//!         "loud"
//!     }
//!
//!     fn probe(&self, recording: &Recording, _config: &Dict) -> Result<Vec<Row>, RowError> {
//!         Ok(vec![row([("path", json!(recording.path))])])
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let recordings: Table = (0..4).map(|i| row([("path", json!(format!("{i}.wav"))), ("id", json!(i))])).collect();
//! let options = ProbeOptions::default().with_npartitions(2).with_work_dir(std::env::temp_dir());
//! let pipeline = ProbePipeline::new("loud", recordings, Arc::new(Loud), json!({}), options)?;
//!
//! let matches = pipeline.compute(&RunContext::new())?;
//! assert_eq!(matches.len(), 4);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod crono;
pub mod error;
pub mod indices;
pub mod pipelines;
pub mod probe;
pub mod time;

pub use canopy_table::RecordingSelector;
pub use crono::{CronoHash, CRONO_HASH_COLUMN};
pub use error::SoundscapeError;
pub use indices::{IndexRows, Indexer};
pub use pipelines::{config_fingerprint, ProbeOptions, ProbePipeline, SoundscapeOptions, SoundscapePipeline};
pub use probe::{IdType, Probe, ProbeRows, RECORDING_COLUMN};
pub use time::RecordingTime;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
