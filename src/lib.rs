//! # aixm-melt - Aeronautical records to relational tables
//!
//! Turns hierarchical aeronautical feature records (airports, runways,
//! navaids, airspaces, ...) into normalized relational rows, driven entirely
//! by declarative mapping metadata.
//!
//! ## Modules
//!
//! - **crawl**: resolve path expressions such as `Extension/rwy[0]/length`
//! - **convert**: turn raw leaves into typed column values
//! - **feature**: feature descriptors, schema tables and the registry
//! - **ingest**: identify records, batch rows, commit in dependency order
//! - **query**: predicate and sort builder for reading rows back
//! - **sink**: relational sink trait, in-memory sink, JSON Lines export
//!
//! ## Quick Start
//!
//! ```rust
//! use aixm_melt::feature::{FeatureDescriptor, FeatureRegistry};
//! use aixm_melt::ingest::MemorySource;
//! use aixm_melt::query::Predicate;
//! use aixm_melt::sink::{MemorySink, Sink};
//! use aixm_melt::value::FieldType;
//! use aixm_melt::IngestConfig;
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut registry = FeatureRegistry::default();
//! registry.register(
//!     FeatureDescriptor::new("Airport", "AirportHeliport", "AHP")
//!         .in_group("airports")
//!         .identity("id")
//!         .attribute("designator", "designator", FieldType::Text),
//! )?;
//! registry.register(
//!     FeatureDescriptor::new("Runway", "Runway", "RWY")
//!         .child_of("Airport")
//!         .identity("id")
//!         .belongs_to("airportId", "associatedAirportHeliport", "Airport"),
//! )?;
//!
//! let source = MemorySource::new().with_group("airports", vec![
//!     json!({"AirportHeliport": {"identifier": "AHP_1", "timeSlice": [{"designator": "EYVI"}]}}),
//!     json!({"Runway": {"identifier": "RWY_1",
//!         "timeSlice": [{"associatedAirportHeliport": {"href": "urn:uuid:AHP_1"}}]}}),
//! ]);
//!
//! let sink = MemorySink::new();
//! let summary = aixm_melt::ingest(registry, sink, IngestConfig::default(), &source, |pipeline| {
//!     let runways = pipeline.registry().table("Runway").unwrap();
//!     let at_vilnius = Predicate::where_equals(runways, "airportId", "AHP_1").unwrap();
//!     assert_eq!(pipeline.sink().select_all("Runway", Some(&at_vilnius), None).unwrap().len(), 1);
//! })?;
//! assert_eq!(summary.rows_written, 2);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod convert;
pub mod crawl;
pub mod error;
pub mod feature;
pub mod ingest;
pub mod node;
pub mod query;
pub mod sink;
pub mod types;
pub mod value;

// Re-export commonly used types for convenience
pub use config::IngestConfig;
pub use convert::ConversionRegistry;
pub use error::{ConfigError, ExtractError, IngestError, QueryError, SinkError, SourceError};
pub use feature::{FeatureCatalog, FeatureDescriptor, FeatureRegistry};
pub use ingest::{Pipeline, RunSummary, SourceProvider};
pub use node::HierarchicalNode;
pub use sink::Sink;
pub use types::Row;
pub use value::{FieldType, Value};

use std::sync::Arc;

/// Main entry point: create the schema, ingest every registered source group
/// and hand the finished pipeline to `inspect` before it is dropped.
pub fn ingest<S, P, F>(
    registry: FeatureRegistry,
    sink: S,
    config: IngestConfig,
    source: &P,
    inspect: F,
) -> Result<RunSummary, IngestError>
where
    S: Sink,
    P: SourceProvider,
    F: FnOnce(&Pipeline<S>),
{
    let pipeline = Pipeline::new(Arc::new(registry), Arc::new(sink), config)?;
    pipeline.create_schema()?;
    let groups = pipeline.registry().groups().to_vec();
    let summary = pipeline.run(source, &groups)?;
    inspect(&pipeline);
    Ok(summary)
}
