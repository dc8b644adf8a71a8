//! Error types for registration, extraction, storage and queries
//!
//! Registration problems ([`ConfigError`]) and extraction problems
//! ([`ExtractError`]) abort a run. Sink write failures ([`SinkError`]) never
//! do: the pipeline downgrades them to warnings in its run summary.

use crate::node::NodeCategory;
use crate::value::FieldType;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A path expression that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("invalid path step `{0}`")]
    InvalidStep(String),
}

/// Mapping or schema metadata that violates a registration invariant.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("feature `{0}` is registered twice")]
    DuplicateFeature(String),

    #[error("feature `{feature}` declares column `{column}` more than once")]
    DuplicateColumn { feature: String, column: String },

    #[error("feature `{feature}` declares more than one {role} field")]
    DuplicateRole { feature: String, role: &'static str },

    #[error("feature `{feature}`: {role} field `{field}` must be text, found {found:?}")]
    NotText {
        feature: String,
        role: &'static str,
        field: String,
        found: FieldType,
    },

    #[error("feature `{0}` names neither a source group nor a parent feature")]
    Unanchored(String),

    #[error("feature `{feature}` is unreachable: parent feature `{parent}` is not registered")]
    Unreachable { feature: String, parent: String },

    #[error("feature `{feature}` declares parent field `{field}` but no parent feature")]
    ParentFieldWithoutParent { feature: String, field: String },

    #[error("feature `{feature}`: parent field `{field}` needs an identity field on parent feature `{parent}`")]
    ParentWithoutIdentity {
        feature: String,
        field: String,
        parent: String,
    },

    #[error("feature `{feature}`: field `{field}` needs a path")]
    MissingPath { feature: String, field: String },

    #[error("feature `{feature}`: field `{field}`: {source}")]
    Path {
        feature: String,
        field: String,
        source: PathError,
    },

    #[error("feature `{feature}`: invalid id pattern `{pattern}`: {source}")]
    Pattern {
        feature: String,
        pattern: String,
        source: regex::Error,
    },

    #[error("feature `{feature}`: field `{field}` uses unregistered type {ty:?}")]
    UnknownType {
        feature: String,
        field: String,
        ty: FieldType,
    },

    #[error("feature `{feature}`: field `{field}` references unregistered feature `{target}`")]
    UnknownReference {
        feature: String,
        field: String,
        target: String,
    },

    #[error("BELONGS_TO cycle among tables: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A path step asked a node for an accessor its shape does not have.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlError {
    #[error("path `{path}`: step `{step}` has no accessor on a {found:?} node")]
    NoAccessor {
        path: String,
        step: String,
        found: NodeCategory,
    },
}

/// Fatal for the current ingestion run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("feature `{feature}`: {source}")]
    Crawl { feature: String, source: CrawlError },

    #[error(
        "feature `{feature}` record `{identity}` arrived before any `{parent}` record; \
         children must follow their parent in the source group"
    )]
    MissingParent {
        feature: String,
        parent: String,
        identity: String,
    },
}

/// A single sink operation failed.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("table `{0}` does not exist")]
    UnknownTable(String),

    #[error("write to `{table}` timed out after {timeout:?}")]
    Timeout { table: String, timeout: Duration },

    #[error("`{table}.{column}` references missing `{references}` key `{key}`")]
    ForeignKey {
        table: String,
        column: String,
        references: String,
        key: String,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize a `{table}` row: {source}")]
    Serialize {
        table: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// A predicate or sort that does not fit the table it targets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("table `{table}` has no column `{column}`")]
    UnknownColumn { table: String, column: String },

    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error("LIKE needs a text pattern")]
    LikeNotText,

    #[error("LIKE pattern `{0}` is too large")]
    LikePattern(String),
}

/// Raw records could not be read from a source group.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed record in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("malformed document {}: {source}", .path.display())]
    Simd {
        path: PathBuf,
        source: simd_json::Error,
    },
}

/// Run-level failure of the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("source group `{group}`: {source}")]
    Extract { group: String, source: ExtractError },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("creating table `{table}`: {source}")]
    Schema { table: String, source: SinkError },

    #[error("failed to build commit worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
