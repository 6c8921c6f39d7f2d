//! Canopy Table
//!
//! The dynamic data model flowing through pipeline places:
//! - **Values**: scalars, mappings, tables and partitioned tables ([`Value`])
//! - **Tables**: ordered rows of named JSON cells ([`Table`], [`Row`])
//! - **Bags**: ordered, row-disjoint splits of a table for fan-out ([`Bag`])
//! - **Recordings**: typed views over recording tables ([`RecordingFrame`])
//!
//! # Example
//!
//! ```rust
//! use canopy_table::{row, Bag, Table};
//!
//! let table = Table::from_rows((0..5).map(|i| row([("id", i)])).collect());
//! let bag = Bag::partition(&table, 2).unwrap();
//!
//! assert_eq!(bag.partition_lengths(), vec![3, 2]);
//! assert_eq!(bag.concat(), table);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod bag;
pub mod error;
pub mod recording;
pub mod table;
pub mod value;

pub use bag::{partition_sizes, Bag};
pub use error::TableError;
pub use recording::{Recording, RecordingColumns, RecordingField, RecordingFrame, RecordingSelector};
pub use table::{row, Row, Table};
pub use value::{Dict, Scalar, Value, ValueKind};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
