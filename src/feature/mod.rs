//! Feature mapping model and schema registry

pub mod descriptor;
pub mod registry;
pub mod schema;

pub use descriptor::{FeatureCatalog, FeatureDescriptor, FeatureSource, FieldBinding, FieldKind};
pub use registry::{AttributeBinding, EntityMapping, FeatureEntry, FeatureId, FeatureRegistry, DEFAULT_ID_SUFFIX};
pub use schema::{Column, ForeignKey, Relationship, SchemaTable};
