//! Raw record sources
//!
//! A source group is a stream of hierarchical records. Groups may be absent;
//! ingesting an absent group is a no-op.

use crate::error::SourceError;
use crate::node::HierarchicalNode;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub type RecordStream<'a, N> = Box<dyn Iterator<Item = Result<N, SourceError>> + 'a>;

pub trait SourceProvider {
    type Node: HierarchicalNode;

    /// Open the records of `group`, or `None` when the group does not exist.
    fn open_stream(&self, group: &str) -> Result<Option<RecordStream<'_, Self::Node>>, SourceError>;
}

/// Records held in memory, keyed by group
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    groups: HashMap<String, Vec<Value>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: impl Into<String>, records: Vec<Value>) -> Self {
        self.groups.insert(group.into(), records);
        self
    }
}

impl SourceProvider for MemorySource {
    type Node = Value;

    fn open_stream(&self, group: &str) -> Result<Option<RecordStream<'_, Value>>, SourceError> {
        Ok(self
            .groups
            .get(group)
            .map(|records| Box::new(records.iter().cloned().map(Ok)) as RecordStream<'_, Value>))
    }
}

/// One file per group in a directory.
///
/// `<group>.jsonl` is streamed a record at a time. Otherwise `<group>.json`
/// must hold one array of records and is parsed whole with simd-json.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectorySource { root: root.into() }
    }

    fn open_lines<'a>(path: PathBuf) -> Result<RecordStream<'a, Value>, SourceError> {
        let file = File::open(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let stream = serde_json::Deserializer::from_reader(BufReader::new(file))
            .into_iter::<Value>()
            .map(move |record| {
                record.map_err(|source| SourceError::Json {
                    path: path.clone(),
                    source,
                })
            });
        Ok(Box::new(stream))
    }

    fn open_array<'a>(path: &Path) -> Result<RecordStream<'a, Value>, SourceError> {
        let mut bytes = std::fs::read(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let records: Vec<Value> = simd_json::serde::from_slice(&mut bytes).map_err(|source| SourceError::Simd {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Box::new(records.into_iter().map(Ok)))
    }
}

impl SourceProvider for DirectorySource {
    type Node = Value;

    fn open_stream(&self, group: &str) -> Result<Option<RecordStream<'_, Value>>, SourceError> {
        let lines = self.root.join(format!("{}.jsonl", group));
        if lines.is_file() {
            return Self::open_lines(lines).map(Some);
        }
        let array = self.root.join(format!("{}.json", group));
        if array.is_file() {
            return Self::open_array(&array).map(Some);
        }
        Ok(None)
    }
}
