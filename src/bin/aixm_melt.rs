//! aixm-melt: Load aeronautical feature records into relational tables
//!
//! Usage:
//!   # Ingest every group the catalog registers, one table file per feature
//!   aixm-melt --catalog features.json --input-dir ./data --output-dir ./tables
//!
//!   # Only some groups, with a custom config and a smaller commit pool
//!   aixm-melt --catalog features.json --input-dir ./data --output-dir ./tables \
//!       --config ingest.json --groups airports,navaids --workers 2
//!
//! Log verbosity follows RUST_LOG (default: info).

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use aixm_melt::feature::{FeatureCatalog, FeatureRegistry};
use aixm_melt::ingest::{DirectorySource, Pipeline, RunSummary};
use aixm_melt::sink::{MemorySink, TableExporter};
use aixm_melt::IngestConfig;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aixm-melt")]
#[command(about = "Load aeronautical feature records into relational tables", long_about = None)]
struct Args {
    /// Feature catalog (JSON): enumerations and feature descriptors
    #[arg(long)]
    catalog: PathBuf,

    /// Directory holding one <group>.jsonl or <group>.json file per source group
    #[arg(long)]
    input_dir: PathBuf,

    /// Output directory for one .jsonl file per table
    #[arg(long, short = 'o')]
    output_dir: PathBuf,

    /// Ingest configuration (JSON); missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated source groups (default: every registered group)
    #[arg(long)]
    groups: Option<String>,

    /// Commit worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Identified records per committed batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Timeout for each sink write, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Build config
    let mut config = match &args.config {
        Some(path) => IngestConfig::from_file(path)?,
        None => IngestConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(timeout) = args.timeout_ms {
        config.write_timeout_ms = timeout;
    }

    let catalog = FeatureCatalog::from_file(&args.catalog)?;
    let registry = FeatureRegistry::from_catalog(catalog, &config)
        .with_context(|| format!("Invalid feature catalog {}", args.catalog.display()))?;
    info!("Registered {} features", registry.entries().len());

    let groups: Vec<String> = match args.groups {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => registry.groups().to_vec(),
    };

    let pipeline = Pipeline::new(Arc::new(registry), Arc::new(MemorySink::new()), config)?;
    pipeline.create_schema()?;

    let source = DirectorySource::new(&args.input_dir);
    let summary = pipeline.run(&source, &groups)?;

    let exporter = TableExporter::new(&args.output_dir)?;
    let written = exporter.export(pipeline.sink())?;
    for (table, rows) in &written {
        info!("Wrote {} rows to {}", rows, exporter.path_for(table).display());
    }

    report(&summary);
    Ok(())
}

/// Post-run summary of failed writes, counts per table
fn report(summary: &RunSummary) {
    if summary.cancelled {
        eprintln!("⚠ Ingestion was cancelled; tables are partial.");
    }
    if summary.warnings.is_empty() {
        return;
    }
    eprintln!("⚠ {} sink writes failed:", summary.warnings.len());
    for (table, rows) in summary.warnings_by_table() {
        eprintln!("  {}: {} rows not written", table, rows);
    }
}
