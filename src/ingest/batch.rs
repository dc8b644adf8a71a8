//! Batches of extracted rows and placeholder requests
//!
//! A [`Batch`] collects everything one stretch of a source group produced.
//! Before commit it is split per table into placeholder keys and full rows.

use crate::types::Row;
use std::collections::{BTreeSet, HashMap, HashSet};

/// One unit of work for the sink: a full row, or (with `row: None`) a
/// request for a placeholder key.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    pub table: String,
    pub key: Option<String>,
    pub row: Option<Row>,
}

#[derive(Debug)]
pub struct Batch {
    group: String,
    sequence: usize,
    records: Vec<BatchRecord>,
    rows: usize,
}

impl Batch {
    pub fn new(group: impl Into<String>, sequence: usize) -> Self {
        Batch {
            group: group.into(),
            sequence,
            records: Vec::new(),
            rows: 0,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn sequence(&self) -> usize {
        self.sequence
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows += 1;
        self.records.push(BatchRecord {
            table: row.table.clone(),
            key: row.key.clone(),
            row: Some(row),
        });
    }

    pub fn request_placeholder(&mut self, table: &str, key: &str) {
        self.records.push(BatchRecord {
            table: table.to_string(),
            key: Some(key.to_string()),
            row: None,
        });
    }

    pub fn records(&self) -> &[BatchRecord] {
        &self.records
    }

    /// Number of full rows
    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Partition per table into deduplicated placeholder keys and full rows.
    ///
    /// Keys that also have a full row in this batch need no placeholder.
    pub fn split(self) -> SplitBatch {
        let mut requested: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut row_keys: HashMap<String, HashSet<String>> = HashMap::new();
        let mut tables: HashMap<String, TableBatch> = HashMap::new();

        for record in self.records {
            match record.row {
                Some(row) => {
                    if let Some(key) = &row.key {
                        row_keys.entry(record.table.clone()).or_default().insert(key.clone());
                    }
                    tables.entry(record.table).or_default().rows.push(row);
                }
                None => {
                    if let Some(key) = record.key {
                        requested.entry(record.table).or_default().insert(key);
                    }
                }
            }
        }

        for (table, keys) in requested {
            let written = row_keys.get(&table);
            let placeholders: Vec<String> = keys
                .into_iter()
                .filter(|key| !written.is_some_and(|w| w.contains(key)))
                .collect();
            if !placeholders.is_empty() {
                tables.entry(table).or_default().placeholders = placeholders;
            }
        }

        SplitBatch { tables }
    }
}

/// Everything a commit writes to one table
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TableBatch {
    pub placeholders: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Default)]
pub struct SplitBatch {
    tables: HashMap<String, TableBatch>,
}

impl SplitBatch {
    pub fn placeholders(&self, table: &str) -> &[String] {
        self.tables
            .get(table)
            .map(|t| t.placeholders.as_slice())
            .unwrap_or(&[])
    }

    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables
            .get(table)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
    }

    pub fn take(&mut self, table: &str) -> Option<TableBatch> {
        self.tables.remove(table)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
