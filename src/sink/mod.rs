//! Relational sinks
//!
//! The pipeline writes through the [`Sink`] trait. [`MemorySink`] is the
//! in-process implementation used by the CLI and the tests;
//! [`TableExporter`] dumps any sink's tables to JSON Lines files.

pub mod export;
pub mod memory;

pub use export::TableExporter;
pub use memory::MemorySink;

use crate::error::SinkError;
use crate::feature::SchemaTable;
use crate::query::{Predicate, Sort};
use crate::types::Row;
use std::time::Duration;

/// A relational store with one table per registered feature.
///
/// Writes are called from commit workers, so implementations must tolerate
/// concurrent calls. A write that cannot complete within `timeout` fails
/// with [`SinkError::Timeout`].
pub trait Sink: Send + Sync {
    /// Create (or reset to empty) the table described by `table`.
    fn create_table(&self, table: &SchemaTable) -> Result<(), SinkError>;

    /// Insert key-only rows for keys not yet present. Existing rows, real or
    /// placeholder, are left alone. Returns the number of rows inserted.
    fn insert_placeholder_keys(&self, table: &str, keys: &[String], timeout: Duration) -> Result<usize, SinkError>;

    /// Insert full rows, replacing any row (placeholder or not) with the same
    /// key. Returns the number of rows written.
    fn insert_rows(&self, table: &str, rows: &[Row], timeout: Duration) -> Result<usize, SinkError>;

    fn select_one(&self, table: &str, predicate: Option<&Predicate>) -> Result<Option<Row>, SinkError>;

    fn select_all(&self, table: &str, predicate: Option<&Predicate>, sort: Option<&Sort>) -> Result<Vec<Row>, SinkError>;

    fn table_names(&self) -> Vec<String>;
}
