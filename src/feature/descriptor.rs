//! Declarative feature metadata
//!
//! A [`FeatureDescriptor`] is what callers hand to
//! [`FeatureRegistry::register`](crate::feature::FeatureRegistry::register):
//! built in code with the builder methods, or deserialized from a JSON
//! [`FeatureCatalog`].

use crate::convert::EnumDescriptor;
use crate::error::ConfigError;
use crate::feature::schema::Relationship;
use crate::value::FieldType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where instances of a feature come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSource {
    /// Root feature read directly from a source group
    Group(String),
    /// Child feature, read from its parent's source group right after the parent
    Parent(String),
}

/// Role a field plays in its feature
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Primary key, taken from the record's identity
    Identity,
    /// Identity of the current parent instance
    Parent,
    #[default]
    Attribute,
    /// Id of another feature, decoded from a locator
    Reference {
        target: String,
        #[serde(default)]
        relationship: Relationship,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinding {
    pub name: String,
    /// Path into the record instance; identity and parent fields have none
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default, rename = "type")]
    pub ty: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    /// Table the feature's rows land in; unique per registry
    pub table: String,
    /// External name that identifies matching raw records
    pub name: String,
    /// Identity prefix pattern, e.g. `RWY_DIR` for ids like `RWY_DIR_0001`
    pub id_pattern: String,
    pub source: FeatureSource,
    #[serde(default)]
    pub fields: Vec<FieldBinding>,
}

impl FeatureDescriptor {
    pub fn new(table: impl Into<String>, name: impl Into<String>, id_pattern: impl Into<String>) -> Self {
        FeatureDescriptor {
            table: table.into(),
            name: name.into(),
            id_pattern: id_pattern.into(),
            source: FeatureSource::Group(String::new()),
            fields: Vec::new(),
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.source = FeatureSource::Group(group.into());
        self
    }

    pub fn child_of(mut self, parent_table: impl Into<String>) -> Self {
        self.source = FeatureSource::Parent(parent_table.into());
        self
    }

    pub fn identity(self, name: &str) -> Self {
        self.field(name, None, FieldKind::Identity, FieldType::Text)
    }

    pub fn parent(self, name: &str) -> Self {
        self.field(name, None, FieldKind::Parent, FieldType::Text)
    }

    pub fn attribute(self, name: &str, path: &str, ty: FieldType) -> Self {
        self.field(name, Some(path), FieldKind::Attribute, ty)
    }

    /// Reference that does not constrain insertion order.
    pub fn uses(self, name: &str, path: &str, target: &str) -> Self {
        let kind = FieldKind::Reference {
            target: target.to_string(),
            relationship: Relationship::Uses,
        };
        self.field(name, Some(path), kind, FieldType::Text)
    }

    /// Reference whose target must be written before this feature's rows.
    pub fn belongs_to(self, name: &str, path: &str, target: &str) -> Self {
        let kind = FieldKind::Reference {
            target: target.to_string(),
            relationship: Relationship::BelongsTo,
        };
        self.field(name, Some(path), kind, FieldType::Text)
    }

    pub fn field(mut self, name: &str, path: Option<&str>, kind: FieldKind, ty: FieldType) -> Self {
        self.fields.push(FieldBinding {
            name: name.to_string(),
            path: path.map(str::to_string),
            kind,
            ty,
        });
        self
    }
}

/// A complete set of enumerations and features, as loaded from JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureCatalog {
    #[serde(default)]
    pub enums: Vec<EnumDescriptor>,
    pub features: Vec<FeatureDescriptor>,
}

impl FeatureCatalog {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
