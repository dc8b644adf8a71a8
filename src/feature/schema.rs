use crate::value::FieldType;
use serde::{Deserialize, Serialize};

/// How a foreign key constrains insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relationship {
    /// The referenced row must exist before the referencing row is written
    BelongsTo,
    /// Plain reference; no ordering constraint
    #[default]
    Uses,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub references: String,
    pub relationship: Relationship,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub ty: FieldType,
    pub primary_key: bool,
    pub foreign_key: Option<ForeignKey>,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Column {
            name: name.into(),
            ty,
            primary_key: false,
            foreign_key: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn references(mut self, table: impl Into<String>, relationship: Relationship) -> Self {
        self.foreign_key = Some(ForeignKey {
            references: table.into(),
            relationship,
        });
        self
    }

    pub fn is_belongs_to(&self) -> bool {
        matches!(
            self.foreign_key,
            Some(ForeignKey {
                relationship: Relationship::BelongsTo,
                ..
            })
        )
    }
}

/// Physical shape of one feature's table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaTable {
    pub name: String,
    pub columns: Vec<Column>,
}

impl SchemaTable {
    pub fn new(name: impl Into<String>) -> Self {
        SchemaTable {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.foreign_key.is_some())
    }

    /// Tables that must be written before this one
    pub fn belongs_to(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.is_belongs_to())
            .filter_map(|c| c.foreign_key.as_ref())
            .map(|fk| fk.references.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_belongs_to_lists_only_ordering_edges() {
        let table = SchemaTable::new("Runway")
            .with_column(Column::new("id", FieldType::Text).primary())
            .with_column(Column::new("airportId", FieldType::Text).references("Airport", Relationship::BelongsTo))
            .with_column(Column::new("surveyorId", FieldType::Text).references("Unit", Relationship::Uses))
            .with_column(Column::new("length", FieldType::Float64));

        assert_eq!(table.primary_key().map(|c| c.name.as_str()), Some("id"));
        assert_eq!(table.foreign_keys().count(), 2);
        assert_eq!(table.belongs_to().collect::<Vec<_>>(), vec!["Airport"]);
    }

    #[test]
    fn test_relationship_wire_names() {
        assert_eq!(serde_json::to_string(&Relationship::BelongsTo).unwrap(), r#""BELONGS_TO""#);
        let rel: Relationship = serde_json::from_str(r#""USES""#).unwrap();
        assert_eq!(rel, Relationship::Uses);
    }
}
