use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;

static NULL: Value = Value::Null;

/// One row of a feature table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    /// The table (feature) this row belongs to
    pub table: String,

    /// Primary key value, when the feature declares an identity field
    pub key: Option<String>,

    /// Column values; undeclared or unset columns read as null
    pub values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new(table: impl Into<String>) -> Self {
        Row {
            table: table.into(),
            key: None,
            values: BTreeMap::new(),
        }
    }

    /// A key-only row standing in for an entity whose data has not arrived yet.
    pub fn placeholder(table: impl Into<String>, key_column: &str, key: impl Into<String>) -> Self {
        let key = key.into();
        let mut row = Row::new(table);
        row.values.insert(key_column.to_string(), Value::Text(key.clone()));
        row.key = Some(key);
        row
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }
}
