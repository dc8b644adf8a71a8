//! Ingestion: from raw source groups to committed rows

pub mod batch;
pub mod extractor;
pub mod pipeline;
pub mod source;

pub use batch::{Batch, BatchRecord, SplitBatch, TableBatch};
pub use extractor::{ExtractionContext, Extractor, Identified};
pub use pipeline::{commit_batch, CancelFlag, CommitReport, Pipeline, RunSummary, WritePhase, WriteWarning};
pub use source::{DirectorySource, MemorySource, RecordStream, SourceProvider};
