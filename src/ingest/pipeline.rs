//! Source-group ingestion and dependency-ordered commits
//!
//! Records of one group are identified and extracted sequentially on the
//! calling thread. Every `batch_size` identified records the pending batch is
//! handed to the commit pool, so extraction and sink writes overlap. Within a
//! batch, tables are written in dependency order: placeholder keys first, then
//! full rows. Failed writes become [`WriteWarning`]s and never stop the run.

use crate::config::IngestConfig;
use crate::error::{IngestError, SinkError};
use crate::feature::FeatureRegistry;
use crate::ingest::batch::{Batch, TableBatch};
use crate::ingest::extractor::{ExtractionContext, Extractor};
use crate::ingest::source::SourceProvider;
use crate::sink::Sink;
use crossbeam::channel::{self, Sender};
use rayon::{Scope, ThreadPool, ThreadPoolBuilder};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared stop signal for an ingestion run
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Placeholders,
    Rows,
}

impl fmt::Display for WritePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePhase::Placeholders => f.write_str("placeholder keys"),
            WritePhase::Rows => f.write_str("rows"),
        }
    }
}

/// A sink write that failed and was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteWarning {
    pub table: String,
    pub phase: WritePhase,
    /// Rows lost with the failed write
    pub rows: usize,
    pub reason: String,
}

/// Outcome of committing one batch
#[derive(Debug, Default)]
pub struct CommitReport {
    pub group: String,
    pub sequence: usize,
    pub rows_written: usize,
    pub placeholders_written: usize,
    pub warnings: Vec<WriteWarning>,
}

impl CommitReport {
    fn warn(&mut self, table: &str, phase: WritePhase, rows: usize, err: SinkError) {
        warn!(
            "Failed to write {} {} to `{}` (group {}, batch {}): {}",
            rows, phase, table, self.group, self.sequence, err
        );
        self.warnings.push(WriteWarning {
            table: table.to_string(),
            phase,
            rows,
            reason: err.to_string(),
        });
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub records_read: usize,
    /// Records no registered feature matched
    pub skipped_records: usize,
    pub batches: usize,
    pub rows_written: usize,
    pub placeholders_written: usize,
    pub warnings: Vec<WriteWarning>,
    pub cancelled: bool,
}

impl RunSummary {
    fn absorb(&mut self, report: CommitReport) {
        debug!(
            "Committed batch {} of group {}: {} rows, {} placeholders, {} warnings",
            report.sequence,
            report.group,
            report.rows_written,
            report.placeholders_written,
            report.warnings.len()
        );
        self.batches += 1;
        self.rows_written += report.rows_written;
        self.placeholders_written += report.placeholders_written;
        self.warnings.extend(report.warnings);
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.records_read += other.records_read;
        self.skipped_records += other.skipped_records;
        self.batches += other.batches;
        self.rows_written += other.rows_written;
        self.placeholders_written += other.placeholders_written;
        self.warnings.extend(other.warnings);
        self.cancelled |= other.cancelled;
    }

    /// Rows lost to failed writes, per table
    pub fn warnings_by_table(&self) -> BTreeMap<&str, usize> {
        let mut out = BTreeMap::new();
        for warning in &self.warnings {
            *out.entry(warning.table.as_str()).or_insert(0) += warning.rows;
        }
        out
    }
}

/// Write one batch, table by table in `order`.
pub fn commit_batch<S: Sink + ?Sized>(sink: &S, order: &[String], batch: Batch, timeout: Duration) -> CommitReport {
    let mut report = CommitReport {
        group: batch.group().to_string(),
        sequence: batch.sequence(),
        ..Default::default()
    };
    let mut split = batch.split();

    for table in order {
        let Some(TableBatch { placeholders, rows }) = split.take(table) else {
            continue;
        };

        if !placeholders.is_empty() {
            match sink.insert_placeholder_keys(table, &placeholders, timeout) {
                Ok(written) => report.placeholders_written += written,
                Err(err) => report.warn(table, WritePhase::Placeholders, placeholders.len(), err),
            }
        }
        if !rows.is_empty() {
            match sink.insert_rows(table, &rows, timeout) {
                Ok(written) => report.rows_written += written,
                Err(err) => report.warn(table, WritePhase::Rows, rows.len(), err),
            }
        }
    }

    // Only reachable when rows name a table the registry never produced
    let leftover: Vec<String> = split.table_names().map(str::to_string).collect();
    for table in leftover {
        if let Some(lost) = split.take(&table) {
            let count = lost.rows.len() + lost.placeholders.len();
            report.warn(&table, WritePhase::Rows, count, SinkError::UnknownTable(table.clone()));
        }
    }

    report
}

fn spawn_commit<'s, S: Sink>(
    scope: &Scope<'s>,
    sink: &'s S,
    order: &'s [String],
    batch: Batch,
    timeout: Duration,
    reports: Sender<CommitReport>,
) {
    scope.spawn(move |_| {
        let report = commit_batch(sink, order, batch, timeout);
        // The receiver outlives the scope
        let _ = reports.send(report);
    });
}

pub struct Pipeline<S: Sink> {
    registry: Arc<FeatureRegistry>,
    sink: Arc<S>,
    config: IngestConfig,
    pool: ThreadPool,
    cancel: CancelFlag,
}

impl<S: Sink> Pipeline<S> {
    /// Fails if the registry's dependency order cannot be computed or the
    /// commit pool cannot be started.
    pub fn new(registry: Arc<FeatureRegistry>, sink: Arc<S>, config: IngestConfig) -> Result<Self, IngestError> {
        registry.dependency_order()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .thread_name(|i| format!("commit-{}", i))
            .build()?;

        Ok(Pipeline {
            registry,
            sink,
            config,
            pool,
            cancel: CancelFlag::new(),
        })
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// A handle that stops the run from another thread
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Create one table per registered feature, in dependency order.
    pub fn create_schema(&self) -> Result<(), IngestError> {
        for table in self.registry.dependency_order()? {
            self.sink.create_table(table).map_err(|source| IngestError::Schema {
                table: table.name.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Ingest every group in turn. Stops early when cancelled.
    pub fn run<P: SourceProvider>(&self, source: &P, groups: &[String]) -> Result<RunSummary, IngestError> {
        let mut summary = RunSummary::default();
        for group in groups {
            summary.merge(self.ingest_group(source, group)?);
            if summary.cancelled {
                break;
            }
        }

        info!(
            "Ingested {} records: {} rows, {} placeholder keys, {} skipped, {} failed writes",
            summary.records_read,
            summary.rows_written,
            summary.placeholders_written,
            summary.skipped_records,
            summary.warnings.len()
        );
        Ok(summary)
    }

    /// Ingest one source group. A missing group is a no-op.
    ///
    /// Extraction errors abort the group, but batches already handed to the
    /// commit pool still finish.
    pub fn ingest_group<P: SourceProvider>(&self, source: &P, group: &str) -> Result<RunSummary, IngestError> {
        let mut summary = RunSummary::default();
        let Some(stream) = source.open_stream(group)? else {
            debug!("Source group {} has no data", group);
            return Ok(summary);
        };
        info!("Ingesting source group {}", group);

        let order: Vec<String> = self
            .registry
            .dependency_order()?
            .into_iter()
            .map(|t| t.name.clone())
            .collect();
        let candidates = self.registry.possible_entries(group);
        let extractor = Extractor::new(&self.registry, &self.config);
        let timeout = self.config.write_timeout();
        let batch_size = self.config.batch_size.max(1);
        let sink: &S = &self.sink;
        let (tx, rx) = channel::unbounded();

        let outcome = self.pool.in_place_scope(|scope| -> Result<(), IngestError> {
            let mut ctx = ExtractionContext::new();
            let mut sequence = 0;
            let mut batch = Batch::new(group, sequence);
            let mut identified = 0;

            for record in stream {
                if self.cancel.is_cancelled() {
                    info!("Ingestion of {} cancelled; dropping pending batch", group);
                    summary.cancelled = true;
                    return Ok(());
                }
                let record = record?;
                summary.records_read += 1;

                let matched = extractor
                    .process(&record, &candidates, &mut ctx, &mut batch)
                    .map_err(|source| IngestError::Extract {
                        group: group.to_string(),
                        source,
                    })?;
                if !matched {
                    debug!("Skipping unregistered record in group {}", group);
                    summary.skipped_records += 1;
                    continue;
                }

                identified += 1;
                if identified == batch_size {
                    sequence += 1;
                    let full = std::mem::replace(&mut batch, Batch::new(group, sequence));
                    spawn_commit(scope, sink, &order, full, timeout, tx.clone());
                    identified = 0;
                }
            }

            if !batch.is_empty() {
                spawn_commit(scope, sink, &order, batch, timeout, tx.clone());
            }
            Ok(())
        });

        drop(tx);
        for report in rx.iter() {
            summary.absorb(report);
        }
        outcome?;

        info!(
            "Finished source group {}: {} rows in {} batches, {} skipped",
            group, summary.rows_written, summary.batches, summary.skipped_records
        );
        Ok(summary)
    }
}
