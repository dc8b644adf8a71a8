//! Record identification and row extraction
//!
//! For every raw record the [`Extractor`] finds the first registered feature
//! whose external name and id pattern match, then crawls each mapped
//! attribute out of the record's first instance and emits one row.

use crate::config::IngestConfig;
use crate::crawl::crawler::unwrap_single;
use crate::crawl::{crawl, Body, Crawler};
use crate::error::ExtractError;
use crate::feature::{FeatureEntry, FeatureId, FeatureRegistry};
use crate::ingest::Batch;
use crate::node::{HierarchicalNode, Leaf, Lookup, NodeCategory};
use crate::types::Row;
use crate::value::Value;
use std::collections::HashMap;

/// Identity of the most recent instance of each feature in one source-group pass.
///
/// Children take their parent id from here, so records must arrive
/// parent-first. Never share one context between groups.
#[derive(Debug, Default)]
pub struct ExtractionContext {
    current: HashMap<FeatureId, String>,
}

impl ExtractionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_id(&self, feature: FeatureId) -> Option<&str> {
        self.current.get(&feature).map(String::as_str)
    }

    pub fn set_current(&mut self, feature: FeatureId, identity: String) {
        self.current.insert(feature, identity);
    }

    /// Forget the current instance of `feature`. Children arriving before the
    /// next identified instance fail with a missing parent.
    pub fn clear_current(&mut self, feature: FeatureId) {
        self.current.remove(&feature);
    }
}

/// A raw record matched to a feature
#[derive(Debug)]
pub struct Identified<'a, 'r, N: ?Sized> {
    pub entry: &'r FeatureEntry,
    /// The sub-node named after the feature
    pub node: &'a N,
    pub identity: Option<String>,
}

pub struct Extractor<'r> {
    registry: &'r FeatureRegistry,
    config: &'r IngestConfig,
    crawler: Crawler<'r>,
}

impl<'r> Extractor<'r> {
    pub fn new(registry: &'r FeatureRegistry, config: &'r IngestConfig) -> Self {
        Extractor {
            registry,
            config,
            crawler: Crawler::new(registry.converters(), &config.locator_key),
        }
    }

    /// First candidate (in registration order) whose external name is present
    /// in `record` and whose id pattern accepts the record's identity.
    pub fn identify<'a, N>(&self, record: &'a N, candidates: &[&'r FeatureEntry]) -> Option<Identified<'a, 'r, N>>
    where
        N: HierarchicalNode + ?Sized,
    {
        for &entry in candidates {
            let node = match record.child(entry.external_name()) {
                Lookup::Found(node) => unwrap_single(node),
                _ => continue,
            };
            if node.is_null() {
                continue;
            }

            let identity = match node.child(&self.config.identity_key) {
                Lookup::Found(id) => match unwrap_single(id).leaf() {
                    Some(Leaf::Text(text)) => Some(text.trim()),
                    _ => None,
                },
                _ => None,
            };

            match identity {
                Some(id) if entry.matches_id(id) => {
                    return Some(Identified {
                        entry,
                        node,
                        identity: Some(id.to_string()),
                    })
                }
                None if entry.mapping().identity.is_none() => {
                    return Some(Identified {
                        entry,
                        node,
                        identity: None,
                    })
                }
                _ => continue,
            }
        }
        None
    }

    /// Populate one row for an identified record and add it to `batch`.
    pub fn extract<N>(
        &self,
        found: &Identified<'_, 'r, N>,
        ctx: &mut ExtractionContext,
        batch: &mut Batch,
    ) -> Result<(), ExtractError>
    where
        N: HierarchicalNode + ?Sized,
    {
        let entry = found.entry;
        let mapping = entry.mapping();
        // A new instance replaces the previous one even if extraction fails
        ctx.clear_current(entry.id());

        // Only the first temporal revision is read. Decoders collapse a
        // single revision into the instance itself.
        let instance = match found.node.child(&self.config.instances_key) {
            Lookup::Found(instances) if instances.category() == NodeCategory::List => match instances.element(0) {
                Lookup::Found(first) if !first.is_null() => Some(first),
                _ => None,
            },
            Lookup::Found(single) if !single.is_null() => Some(single),
            _ => None,
        };
        let extension = instance.and_then(|i| match i.child(&self.config.extension_key) {
            Lookup::Found(ext) => Some(unwrap_single(ext)),
            _ => None,
        });

        let mut row = Row::new(entry.table_name());

        if let (Some(column), Some(id)) = (&mapping.identity, &found.identity) {
            row.set(column.as_str(), id.as_str());
            row.key = Some(id.clone());
        }

        if let (Some(column), Some(parent)) = (&mapping.parent, entry.parent()) {
            let parent_table = self.registry.entry(parent).table_name();
            let Some(parent_id) = ctx.current_id(parent) else {
                return Err(ExtractError::MissingParent {
                    feature: entry.table_name().to_string(),
                    parent: parent_table.to_string(),
                    identity: found.identity.clone().unwrap_or_default(),
                });
            };
            row.set(column.as_str(), parent_id);
            batch.request_placeholder(parent_table, parent_id);
        }

        for attr in &mapping.attributes {
            let root = match attr.path.body() {
                Body::Feature => instance,
                Body::Extension => extension,
            };
            let node = crawl(root, &attr.path).map_err(|source| ExtractError::Crawl {
                feature: entry.table_name().to_string(),
                source,
            })?;

            let value = match &attr.reference {
                Some(fk) => self
                    .registry
                    .entry_by_table(&fk.references)
                    .and_then(|target| self.crawler.decode_foreign_id(node, target, batch))
                    .map(Value::Text),
                None => self.crawler.get(node, &attr.ty),
            };
            row.set(attr.name.as_str(), value.unwrap_or(Value::Null));
        }

        if let Some(id) = &found.identity {
            ctx.set_current(entry.id(), id.clone());
        }
        batch.push_row(row);
        Ok(())
    }

    /// Identify and extract one record. `Ok(false)` means no registered
    /// feature matched and the record was skipped.
    pub fn process<N>(
        &self,
        record: &N,
        candidates: &[&'r FeatureEntry],
        ctx: &mut ExtractionContext,
        batch: &mut Batch,
    ) -> Result<bool, ExtractError>
    where
        N: HierarchicalNode + ?Sized,
    {
        match self.identify(record, candidates) {
            Some(found) => {
                self.extract(&found, ctx, batch)?;
                Ok(true)
            }
            None => {
                // Skipped instances still end the previous instance of any
                // feature they name
                for entry in candidates {
                    if let Lookup::Found(_) = record.child(entry.external_name()) {
                        ctx.clear_current(entry.id());
                    }
                }
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::EnumDescriptor;
    use crate::feature::FeatureDescriptor;
    use crate::value::FieldType;
    use serde_json::json;

    fn segment_registry() -> FeatureRegistry {
        let mut registry = FeatureRegistry::default();
        registry
            .register(
                FeatureDescriptor::new("SegmentStart", "Segment", "A")
                    .in_group("routes")
                    .identity("id"),
            )
            .unwrap();
        registry
            .register(
                FeatureDescriptor::new("SegmentEnd", "Segment", "B")
                    .in_group("routes")
                    .identity("id"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_identify_disambiguates_by_id_pattern() {
        let registry = segment_registry();
        let config = IngestConfig::default();
        let extractor = Extractor::new(&registry, &config);
        let candidates = registry.possible_entries("routes");

        let record = json!({"Segment": {"identifier": "A_0001"}});
        let found = extractor.identify(&record, &candidates).unwrap();
        assert_eq!(found.entry.table_name(), "SegmentStart");

        let record = json!({"Segment": {"identifier": "B_0001"}});
        let found = extractor.identify(&record, &candidates).unwrap();
        assert_eq!(found.entry.table_name(), "SegmentEnd");

        let record = json!({"Segment": {"identifier": "C_0001"}});
        assert!(extractor.identify(&record, &candidates).is_none());

        let record = json!({"Unrelated": {"identifier": "A_0001"}});
        assert!(extractor.identify(&record, &candidates).is_none());
    }

    #[test]
    fn test_first_registered_match_wins() {
        let mut registry = FeatureRegistry::default();
        registry
            .register(FeatureDescriptor::new("Wide", "Seg", "[A-Z]+").in_group("g").identity("id"))
            .unwrap();
        registry
            .register(FeatureDescriptor::new("Narrow", "Seg", "A").in_group("g").identity("id"))
            .unwrap();
        let config = IngestConfig::default();
        let extractor = Extractor::new(&registry, &config);

        let record = json!({"Seg": {"identifier": "A_1"}});
        let found = extractor.identify(&record, &registry.possible_entries("g")).unwrap();
        assert_eq!(found.entry.table_name(), "Wide");
    }

    #[test]
    fn test_extract_fills_row_from_first_instance() {
        let mut registry = FeatureRegistry::default();
        registry.register_enum(EnumDescriptor::new("CodeAirportHeliport").member("AD", &[]).member("HP", &[]));
        registry
            .register(
                FeatureDescriptor::new("Organisation", "OrganisationAuthority", "ORG")
                    .in_group("orgs")
                    .identity("id"),
            )
            .unwrap();
        registry
            .register(
                FeatureDescriptor::new("Airport", "AirportHeliport", "AHP")
                    .in_group("airports")
                    .identity("id")
                    .attribute("designator", "designator", FieldType::Text)
                    .attribute("type", "Feature/type", FieldType::Enum("CodeAirportHeliport".into()))
                    .attribute("elevation", "fieldElevation/value", FieldType::Float64)
                    .attribute("certified", "Extension/certified", FieldType::Bool)
                    .attribute("city", "servedCity[1]/name", FieldType::Text)
                    .uses("authorityId", "responsibleOrganisation", "Organisation"),
            )
            .unwrap();
        let config = IngestConfig::default();
        let extractor = Extractor::new(&registry, &config);

        let record = json!({
            "AirportHeliport": {
                "identifier": "AHP_0000042",
                "timeSlice": [
                    {
                        "designator": "EYVI",
                        "type": "AD",
                        "fieldElevation": {"value": "646", "uom": "FT"},
                        "servedCity": [{"name": "Trakai"}, {"name": "Vilnius"}],
                        "responsibleOrganisation": {"href": "urn:uuid:ORG_0000007"},
                        "extension": {"certified": "YES"}
                    },
                    {"designator": "IGNORED"}
                ]
            }
        });

        let mut ctx = ExtractionContext::new();
        let mut batch = Batch::new("airports", 0);
        let candidates = registry.possible_entries("airports");
        assert!(extractor.process(&record, &candidates, &mut ctx, &mut batch).unwrap());

        let airport = registry.entry_by_table("Airport").unwrap();
        assert_eq!(ctx.current_id(airport.id()), Some("AHP_0000042"));

        let split = batch.split();
        assert_eq!(split.placeholders("Organisation"), ["ORG_0000007".to_string()]);
        let row = &split.rows("Airport")[0];
        assert_eq!(row.key.as_deref(), Some("AHP_0000042"));
        assert_eq!(row.get("id"), &Value::from("AHP_0000042"));
        assert_eq!(row.get("designator"), &Value::from("EYVI"));
        assert_eq!(row.get("type"), &Value::Enum("AD".into()));
        assert_eq!(row.get("elevation"), &Value::Float(646.0));
        assert_eq!(row.get("certified"), &Value::Bool(true));
        assert_eq!(row.get("city"), &Value::from("Vilnius"));
        assert_eq!(row.get("authorityId"), &Value::from("ORG_0000007"));
    }

    #[test]
    fn test_missing_instance_gives_null_attributes() {
        let mut registry = FeatureRegistry::default();
        registry
            .register(
                FeatureDescriptor::new("Thing", "Thing", "THING")
                    .in_group("g")
                    .identity("id")
                    .attribute("name", "name", FieldType::Text)
                    .attribute("vendor", "Extension/code", FieldType::Text),
            )
            .unwrap();
        let config = IngestConfig::default();
        let extractor = Extractor::new(&registry, &config);

        let record = json!({"Thing": {"identifier": "THING_1"}});
        let mut batch = Batch::new("g", 0);
        extractor
            .process(&record, &registry.possible_entries("g"), &mut ExtractionContext::new(), &mut batch)
            .unwrap();

        let split = batch.split();
        let row = &split.rows("Thing")[0];
        assert!(row.get("name").is_null());
        assert!(row.get("vendor").is_null());
    }

    #[test]
    fn test_shape_mismatch_is_an_extraction_error() {
        let mut registry = FeatureRegistry::default();
        registry
            .register(
                FeatureDescriptor::new("Thing", "Thing", "THING")
                    .in_group("g")
                    .identity("id")
                    .attribute("name", "name/value", FieldType::Text),
            )
            .unwrap();
        let config = IngestConfig::default();
        let extractor = Extractor::new(&registry, &config);

        let record = json!({"Thing": {"identifier": "THING_1", "timeSlice": {"name": "flat"}}});
        let err = extractor
            .process(
                &record,
                &registry.possible_entries("g"),
                &mut ExtractionContext::new(),
                &mut Batch::new("g", 0),
            )
            .unwrap_err();
        match err {
            ExtractError::Crawl { feature, source } => {
                assert_eq!(feature, "Thing");
                assert!(source.to_string().contains("name/value"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_child_takes_current_parent_id() {
        let mut registry = FeatureRegistry::default();
        registry
            .register(FeatureDescriptor::new("Route", "Route", "RTE").in_group("g").identity("id"))
            .unwrap();
        registry
            .register(
                FeatureDescriptor::new("Leg", "Leg", "LEG")
                    .child_of("Route")
                    .identity("id")
                    .parent("routeId"),
            )
            .unwrap();
        let config = IngestConfig::default();
        let extractor = Extractor::new(&registry, &config);
        let candidates = registry.possible_entries("g");
        let mut ctx = ExtractionContext::new();
        let mut batch = Batch::new("g", 0);

        let orphan = json!({"Leg": {"identifier": "LEG_0"}});
        assert!(matches!(
            extractor.process(&orphan, &candidates, &mut ctx, &mut batch),
            Err(ExtractError::MissingParent { .. })
        ));

        for record in [
            json!({"Route": {"identifier": "RTE_1"}}),
            json!({"Leg": {"identifier": "LEG_1"}}),
            json!({"Route": {"identifier": "RTE_2"}}),
            json!({"Leg": {"identifier": "LEG_2"}}),
        ] {
            extractor.process(&record, &candidates, &mut ctx, &mut batch).unwrap();
        }

        let split = batch.split();
        let legs = split.rows("Leg");
        assert_eq!(legs[0].get("routeId"), &Value::from("RTE_1"));
        assert_eq!(legs[1].get("routeId"), &Value::from("RTE_2"));
        assert!(split.placeholders("Route").is_empty());
    }

    #[test]
    fn test_unidentified_parent_is_not_inherited() {
        let mut registry = FeatureRegistry::default();
        registry
            .register(FeatureDescriptor::new("Route", "Route", "RTE").in_group("g").identity("id"))
            .unwrap();
        registry
            .register(
                FeatureDescriptor::new("Leg", "Leg", "LEG")
                    .child_of("Route")
                    .identity("id")
                    .parent("routeId"),
            )
            .unwrap();
        let config = IngestConfig::default();
        let extractor = Extractor::new(&registry, &config);
        let candidates = registry.possible_entries("g");
        let route = registry.entry_by_table("Route").unwrap();

        let mut ctx = ExtractionContext::new();
        let mut batch = Batch::new("g", 0);
        for record in [
            json!({"Route": {"identifier": "RTE_1"}}),
            json!({"Leg": {"identifier": "LEG_1"}}),
        ] {
            assert!(extractor.process(&record, &candidates, &mut ctx, &mut batch).unwrap());
        }
        assert_eq!(ctx.current_id(route.id()), Some("RTE_1"));

        for unidentified in [
            json!({"Route": {"name": "no identifier"}}),
            json!({"Route": {"identifier": "ORG_1"}}),
        ] {
            ctx.set_current(route.id(), "RTE_1".into());
            assert!(!extractor.process(&unidentified, &candidates, &mut ctx, &mut batch).unwrap());
            assert_eq!(ctx.current_id(route.id()), None);

            let leg = json!({"Leg": {"identifier": "LEG_2"}});
            match extractor.process(&leg, &candidates, &mut ctx, &mut batch) {
                Err(ExtractError::MissingParent { feature, parent, identity }) => {
                    assert_eq!(feature, "Leg");
                    assert_eq!(parent, "Route");
                    assert_eq!(identity, "LEG_2");
                }
                other => panic!("expected a missing parent, got {:?}", other),
            }
        }

        let split = batch.split();
        let legs = split.rows("Leg");
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].get("routeId"), &Value::from("RTE_1"));
    }
}
