//! Feature and schema registry
//!
//! Turns [`FeatureDescriptor`]s into executable [`FeatureEntry`]s (entity
//! mapping + physical [`SchemaTable`]), indexes them by source group, and
//! derives the parent-first table order used for every batch commit.
//! Registration is one-time, single-threaded setup: all structural checks
//! happen here, never per record.

use crate::config::IngestConfig;
use crate::convert::{ConversionRegistry, EnumDescriptor};
use crate::crawl::PathExpression;
use crate::error::ConfigError;
use crate::feature::descriptor::{FeatureCatalog, FeatureDescriptor, FeatureSource, FieldBinding, FieldKind};
use crate::feature::schema::{Column, ForeignKey, Relationship, SchemaTable};
use crate::value::FieldType;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Numeric suffix every raw identity carries after its type prefix
pub const DEFAULT_ID_SUFFIX: &str = "_[0-9]+";

/// Position of a feature in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(usize);

impl FeatureId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A non-key field bound to a path in the record instance
#[derive(Debug, Clone)]
pub struct AttributeBinding {
    pub name: String,
    pub path: PathExpression,
    pub ty: FieldType,
    /// Set for fields decoded from a locator into another feature's id
    pub reference: Option<ForeignKey>,
}

/// How to populate one row of a feature from a raw record
#[derive(Debug, Clone, Default)]
pub struct EntityMapping {
    pub identity: Option<String>,
    pub parent: Option<String>,
    pub attributes: Vec<AttributeBinding>,
}

#[derive(Debug)]
pub struct FeatureEntry {
    id: FeatureId,
    external_name: String,
    id_pattern: Regex,
    source_group: String,
    parent: Option<FeatureId>,
    mapping: EntityMapping,
    schema: SchemaTable,
}

impl FeatureEntry {
    pub fn id(&self) -> FeatureId {
        self.id
    }

    pub fn table_name(&self) -> &str {
        &self.schema.name
    }

    pub fn external_name(&self) -> &str {
        &self.external_name
    }

    pub fn source_group(&self) -> &str {
        &self.source_group
    }

    pub fn parent(&self) -> Option<FeatureId> {
        self.parent
    }

    pub fn mapping(&self) -> &EntityMapping {
        &self.mapping
    }

    pub fn schema(&self) -> &SchemaTable {
        &self.schema
    }

    /// Anchored pattern: the declared prefix followed by the numeric suffix
    pub fn id_pattern(&self) -> &str {
        self.id_pattern.as_str()
    }

    pub fn matches_id(&self, id: &str) -> bool {
        self.id_pattern.is_match(id)
    }
}

pub struct FeatureRegistry {
    entries: Vec<FeatureEntry>,
    by_table: HashMap<String, FeatureId>,
    by_group: HashMap<String, Vec<FeatureId>>,
    groups: Vec<String>,
    converters: ConversionRegistry,
    id_suffix: String,
    order: OnceCell<Vec<FeatureId>>,
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ID_SUFFIX)
    }
}

impl FeatureRegistry {
    pub fn new(id_suffix: impl Into<String>) -> Self {
        FeatureRegistry {
            entries: Vec::new(),
            by_table: HashMap::new(),
            by_group: HashMap::new(),
            groups: Vec::new(),
            converters: ConversionRegistry::with_builtins(),
            id_suffix: id_suffix.into(),
            order: OnceCell::new(),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.id_suffix_pattern.clone())
    }

    /// Register every enumeration, then every feature, in catalog order.
    pub fn from_catalog(catalog: FeatureCatalog, config: &IngestConfig) -> Result<Self, ConfigError> {
        let mut registry = Self::from_config(config);
        for descriptor in catalog.enums {
            registry.register_enum(descriptor);
        }
        for descriptor in catalog.features {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    pub fn register_enum(&mut self, descriptor: EnumDescriptor) {
        self.converters.register_enum(descriptor);
    }

    /// Validate a descriptor and turn it into a feature entry plus its table.
    pub fn register(&mut self, desc: FeatureDescriptor) -> Result<FeatureId, ConfigError> {
        if self.by_table.contains_key(&desc.table) {
            return Err(ConfigError::DuplicateFeature(desc.table));
        }

        let (source_group, parent) = match &desc.source {
            FeatureSource::Group(group) if group.is_empty() => {
                return Err(ConfigError::Unanchored(desc.table));
            }
            FeatureSource::Group(group) => (group.clone(), None),
            FeatureSource::Parent(parent) => match self.by_table.get(parent) {
                Some(&id) => (self.entries[id.0].source_group.clone(), Some(id)),
                None => {
                    return Err(ConfigError::Unreachable {
                        feature: desc.table,
                        parent: parent.clone(),
                    })
                }
            },
        };

        let pattern = format!("^(?:{})(?:{})$", desc.id_pattern, self.id_suffix);
        let id_pattern = Regex::new(&pattern).map_err(|source| ConfigError::Pattern {
            feature: desc.table.clone(),
            pattern: desc.id_pattern.clone(),
            source,
        })?;

        let (mapping, schema) = self.build_mapping(&desc, parent.map(|id| &self.entries[id.0]))?;

        let id = FeatureId(self.entries.len());
        debug!(
            "Registered feature {} ({} columns) in group {}",
            desc.table,
            schema.columns.len(),
            source_group
        );

        self.by_table.insert(desc.table.clone(), id);
        if !self.by_group.contains_key(&source_group) {
            self.groups.push(source_group.clone());
        }
        self.by_group.entry(source_group.clone()).or_default().push(id);
        self.entries.push(FeatureEntry {
            id,
            external_name: desc.name,
            id_pattern,
            source_group,
            parent,
            mapping,
            schema,
        });
        self.order = OnceCell::new();

        Ok(id)
    }

    fn build_mapping(
        &self,
        desc: &FeatureDescriptor,
        parent: Option<&FeatureEntry>,
    ) -> Result<(EntityMapping, SchemaTable), ConfigError> {
        let feature = desc.table.as_str();
        let mut mapping = EntityMapping::default();
        let mut schema = SchemaTable::new(feature);
        let mut seen = HashSet::new();

        for field in &desc.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(ConfigError::DuplicateColumn {
                    feature: feature.to_string(),
                    column: field.name.clone(),
                });
            }

            match &field.kind {
                FieldKind::Identity => {
                    if mapping.identity.is_some() {
                        return Err(duplicate_role(feature, "identity"));
                    }
                    require_text(feature, "identity", field)?;
                    mapping.identity = Some(field.name.clone());
                    schema.columns.push(Column::new(&field.name, FieldType::Text).primary());
                }
                FieldKind::Parent => {
                    if mapping.parent.is_some() {
                        return Err(duplicate_role(feature, "parent"));
                    }
                    require_text(feature, "parent", field)?;
                    let Some(parent) = parent else {
                        return Err(ConfigError::ParentFieldWithoutParent {
                            feature: feature.to_string(),
                            field: field.name.clone(),
                        });
                    };
                    // The parent id is taken from the parent's identity column
                    if parent.mapping.identity.is_none() {
                        return Err(ConfigError::ParentWithoutIdentity {
                            feature: feature.to_string(),
                            field: field.name.clone(),
                            parent: parent.schema.name.clone(),
                        });
                    }
                    mapping.parent = Some(field.name.clone());
                    schema.columns.push(
                        Column::new(&field.name, FieldType::Text)
                            .references(parent.schema.name.as_str(), Relationship::BelongsTo),
                    );
                }
                FieldKind::Attribute => {
                    if !self.converters.supports(&field.ty) {
                        return Err(ConfigError::UnknownType {
                            feature: feature.to_string(),
                            field: field.name.clone(),
                            ty: field.ty.clone(),
                        });
                    }
                    mapping.attributes.push(AttributeBinding {
                        name: field.name.clone(),
                        path: parse_path(feature, field)?,
                        ty: field.ty.clone(),
                        reference: None,
                    });
                    schema.columns.push(Column::new(&field.name, field.ty.clone()));
                }
                FieldKind::Reference { target, relationship } => {
                    require_text(feature, "reference", field)?;
                    let foreign_key = ForeignKey {
                        references: target.clone(),
                        relationship: *relationship,
                    };
                    mapping.attributes.push(AttributeBinding {
                        name: field.name.clone(),
                        path: parse_path(feature, field)?,
                        ty: FieldType::Text,
                        reference: Some(foreign_key),
                    });
                    schema.columns.push(
                        Column::new(&field.name, FieldType::Text).references(target.as_str(), *relationship),
                    );
                }
            }
        }

        Ok((mapping, schema))
    }

    pub fn entries(&self) -> &[FeatureEntry] {
        &self.entries
    }

    pub fn entry(&self, id: FeatureId) -> &FeatureEntry {
        &self.entries[id.0]
    }

    pub fn entry_by_table(&self, table: &str) -> Option<&FeatureEntry> {
        self.by_table.get(table).map(|id| &self.entries[id.0])
    }

    pub fn table(&self, name: &str) -> Option<&SchemaTable> {
        self.entry_by_table(name).map(FeatureEntry::schema)
    }

    /// Source groups in the order their first feature was registered
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn converters(&self) -> &ConversionRegistry {
        &self.converters
    }

    /// Every feature that can appear in `group`, in registration order.
    pub fn possible_entries(&self, group: &str) -> Vec<&FeatureEntry> {
        self.by_group
            .get(group)
            .map(|ids| ids.iter().map(|id| &self.entries[id.0]).collect())
            .unwrap_or_default()
    }

    /// Tables ordered so every BELONGS_TO target precedes the tables that
    /// reference it. Computed once and cached until the next registration.
    pub fn dependency_order(&self) -> Result<Vec<&SchemaTable>, ConfigError> {
        let order = self.order.get_or_try_init(|| self.compute_order())?;
        Ok(order.iter().map(|id| &self.entries[id.0].schema).collect())
    }

    fn compute_order(&self) -> Result<Vec<FeatureId>, ConfigError> {
        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let mut targets = Vec::new();
            for attr in &entry.mapping.attributes {
                let Some(fk) = &attr.reference else { continue };
                if !self.by_table.contains_key(&fk.references) {
                    return Err(ConfigError::UnknownReference {
                        feature: entry.schema.name.clone(),
                        field: attr.name.clone(),
                        target: fk.references.clone(),
                    });
                }
            }
            for target in entry.schema.belongs_to() {
                if target == entry.schema.name {
                    continue;
                }
                let idx = self.by_table[target].0;
                if !targets.contains(&idx) {
                    targets.push(idx);
                }
            }
            deps.push(targets);
        }

        // Layer by layer, each layer in registration order
        let mut placed = vec![false; self.entries.len()];
        let mut order = Vec::with_capacity(self.entries.len());
        loop {
            let layer: Vec<usize> = (0..self.entries.len())
                .filter(|&i| !placed[i] && deps[i].iter().all(|&d| placed[d]))
                .collect();
            if layer.is_empty() {
                break;
            }
            for i in layer {
                placed[i] = true;
                order.push(FeatureId(i));
            }
        }

        if order.len() < self.entries.len() {
            let stuck = (0..self.entries.len())
                .filter(|&i| !placed[i])
                .map(|i| self.entries[i].schema.name.clone())
                .collect();
            return Err(ConfigError::Cycle(stuck));
        }

        Ok(order)
    }

    /// Drop every registered feature and enumeration.
    pub fn clear(&mut self) {
        *self = Self::new(std::mem::take(&mut self.id_suffix));
    }
}

fn duplicate_role(feature: &str, role: &'static str) -> ConfigError {
    ConfigError::DuplicateRole {
        feature: feature.to_string(),
        role,
    }
}

fn require_text(feature: &str, role: &'static str, field: &FieldBinding) -> Result<(), ConfigError> {
    if field.ty.is_text() {
        Ok(())
    } else {
        Err(ConfigError::NotText {
            feature: feature.to_string(),
            role,
            field: field.name.clone(),
            found: field.ty.clone(),
        })
    }
}

fn parse_path(feature: &str, field: &FieldBinding) -> Result<PathExpression, ConfigError> {
    let Some(text) = &field.path else {
        return Err(ConfigError::MissingPath {
            feature: feature.to_string(),
            field: field.name.clone(),
        });
    };
    text.parse().map_err(|source| ConfigError::Path {
        feature: feature.to_string(),
        field: field.name.clone(),
        source,
    })
}
