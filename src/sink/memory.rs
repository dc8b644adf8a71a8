use crate::error::{QueryError, SinkError};
use crate::feature::SchemaTable;
use crate::query::{Predicate, Sort};
use crate::sink::Sink;
use crate::types::Row;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

#[derive(Debug)]
struct TableData {
    schema: SchemaTable,
    rows: Vec<Row>,
    index: HashMap<String, usize>,
    placeholders: HashSet<String>,
}

impl TableData {
    fn new(schema: SchemaTable) -> Self {
        TableData {
            schema,
            rows: Vec::new(),
            index: HashMap::new(),
            placeholders: HashSet::new(),
        }
    }

    fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }
}

/// Thread-safe in-memory relational store.
///
/// Rows keep insertion order. A placeholder keeps its original position when
/// the real row replaces it.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: RwLock<BTreeMap<String, TableData>>,
    enforce_belongs_to: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject row writes whose BELONGS_TO value has no row in the
    /// referenced table. The whole call fails, like a database constraint.
    pub fn enforcing_belongs_to(mut self) -> Self {
        self.enforce_belongs_to = true;
        self
    }

    /// Keys inserted as placeholders that no real row has replaced yet
    pub fn unfilled_placeholders(&self, table: &str) -> Vec<String> {
        let tables = self.tables.read();
        let mut keys: Vec<String> = tables
            .get(table)
            .map(|t| t.placeholders.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, |t| t.rows.len())
    }

    fn check_belongs_to(tables: &BTreeMap<String, TableData>, data: &TableData, rows: &[Row]) -> Result<(), SinkError> {
        for column in data.schema.columns.iter().filter(|c| c.is_belongs_to()) {
            let Some(fk) = &column.foreign_key else { continue };
            for row in rows {
                let Some(key) = row.get(&column.name).as_text() else { continue };
                let present = if fk.references == data.schema.name {
                    data.contains_key(key) || rows.iter().any(|r| r.key.as_deref() == Some(key))
                } else {
                    tables.get(&fk.references).is_some_and(|t| t.contains_key(key))
                };
                if !present {
                    return Err(SinkError::ForeignKey {
                        table: data.schema.name.clone(),
                        column: column.name.clone(),
                        references: fk.references.clone(),
                        key: key.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn check_columns(schema: &SchemaTable, predicate: Option<&Predicate>, sort: Option<&Sort>) -> Result<(), SinkError> {
    if let Some(predicate) = predicate {
        if let Some(column) = predicate.columns().into_iter().find(|c| schema.column(c).is_none()) {
            return Err(QueryError::UnknownColumn {
                table: schema.name.clone(),
                column: column.to_string(),
            }
            .into());
        }
    }
    if let Some(sort) = sort {
        sort.validate(schema)?;
    }
    Ok(())
}

impl Sink for MemorySink {
    fn create_table(&self, table: &SchemaTable) -> Result<(), SinkError> {
        self.tables
            .write()
            .insert(table.name.clone(), TableData::new(table.clone()));
        Ok(())
    }

    fn insert_placeholder_keys(&self, table: &str, keys: &[String], timeout: Duration) -> Result<usize, SinkError> {
        let mut tables = self.tables.try_write_for(timeout).ok_or_else(|| SinkError::Timeout {
            table: table.to_string(),
            timeout,
        })?;
        let data = tables
            .get_mut(table)
            .ok_or_else(|| SinkError::UnknownTable(table.to_string()))?;

        let key_column = data.schema.primary_key().map(|c| c.name.clone());
        let mut inserted = 0;
        for key in keys {
            if data.contains_key(key) {
                continue;
            }
            let row = match &key_column {
                Some(column) => Row::placeholder(table, column, key.as_str()),
                None => Row::new(table).with_key(key.as_str()),
            };
            data.index.insert(key.clone(), data.rows.len());
            data.rows.push(row);
            data.placeholders.insert(key.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    fn insert_rows(&self, table: &str, rows: &[Row], timeout: Duration) -> Result<usize, SinkError> {
        let mut tables = self.tables.try_write_for(timeout).ok_or_else(|| SinkError::Timeout {
            table: table.to_string(),
            timeout,
        })?;

        {
            let data = tables
                .get(table)
                .ok_or_else(|| SinkError::UnknownTable(table.to_string()))?;
            if self.enforce_belongs_to {
                Self::check_belongs_to(&tables, data, rows)?;
            }
        }

        let data = tables
            .get_mut(table)
            .ok_or_else(|| SinkError::UnknownTable(table.to_string()))?;
        for row in rows {
            match row.key.as_ref().and_then(|k| data.index.get(k).copied()) {
                Some(position) => {
                    if let Some(key) = &row.key {
                        data.placeholders.remove(key);
                    }
                    data.rows[position] = row.clone();
                }
                None => {
                    if let Some(key) = &row.key {
                        data.index.insert(key.clone(), data.rows.len());
                    }
                    data.rows.push(row.clone());
                }
            }
        }
        Ok(rows.len())
    }

    fn select_one(&self, table: &str, predicate: Option<&Predicate>) -> Result<Option<Row>, SinkError> {
        let tables = self.tables.read();
        let data = tables
            .get(table)
            .ok_or_else(|| SinkError::UnknownTable(table.to_string()))?;
        check_columns(&data.schema, predicate, None)?;

        Ok(data
            .rows
            .iter()
            .find(|row| predicate.map_or(true, |p| p.matches(row)))
            .cloned())
    }

    fn select_all(&self, table: &str, predicate: Option<&Predicate>, sort: Option<&Sort>) -> Result<Vec<Row>, SinkError> {
        let tables = self.tables.read();
        let data = tables
            .get(table)
            .ok_or_else(|| SinkError::UnknownTable(table.to_string()))?;
        check_columns(&data.schema, predicate, sort)?;

        let mut rows: Vec<Row> = data
            .rows
            .iter()
            .filter(|row| predicate.map_or(true, |p| p.matches(row)))
            .cloned()
            .collect();
        if let Some(sort) = sort {
            sort.apply(&mut rows);
        }
        Ok(rows)
    }

    fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }
}
