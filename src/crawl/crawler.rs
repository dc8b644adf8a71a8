//! Path crawler
//!
//! Walks a [`PathExpression`] through a [`HierarchicalNode`]. Missing data
//! becomes `None` and keeps propagating; a step that asks a node for an
//! accessor its shape cannot have is reported as a [`CrawlError`].

use crate::convert::ConversionRegistry;
use crate::crawl::path::PathExpression;
use crate::error::CrawlError;
use crate::feature::FeatureEntry;
use crate::ingest::Batch;
use crate::node::{HierarchicalNode, Leaf, Lookup, NodeCategory};
use crate::value::{FieldType, Value};
use tracing::debug;

/// Resolve `path` starting at `node`. `None` in, `None` out.
pub fn crawl<'a, N>(node: Option<&'a N>, path: &PathExpression) -> Result<Option<&'a N>, CrawlError>
where
    N: HierarchicalNode + ?Sized,
{
    let Some(mut current) = node else {
        return Ok(None);
    };

    for step in path.steps() {
        if current.is_null() {
            return Ok(None);
        }

        let child = match current.child(&step.name) {
            Lookup::Found(child) => child,
            Lookup::Absent => return Ok(None),
            Lookup::NoAccessor => return Err(no_accessor(path, &step.name, current)),
        };

        current = match step.index {
            Some(index) => match child.element(index) {
                Lookup::Found(element) => element,
                Lookup::Absent => return Ok(None),
                Lookup::NoAccessor => return Err(no_accessor(path, &step.name, child)),
            },
            None => unwrap_single(child),
        };
    }

    Ok((!current.is_null()).then_some(current))
}

/// A one-element list reached without an index stands for its element.
pub(crate) fn unwrap_single<N: HierarchicalNode + ?Sized>(node: &N) -> &N {
    if node.category() == NodeCategory::List && node.list_len() == 1 {
        if let Lookup::Found(element) = node.element(0) {
            return element;
        }
    }
    node
}

fn no_accessor<N: HierarchicalNode + ?Sized>(path: &PathExpression, step: &str, node: &N) -> CrawlError {
    CrawlError::NoAccessor {
        path: path.to_string(),
        step: step.to_string(),
        found: node.category(),
    }
}

/// Id embedded in a locator: the text after the last `#`, `:` or `/`.
pub fn locator_id(locator: &str) -> Option<&str> {
    locator
        .trim()
        .rsplit(['#', ':', '/'])
        .next()
        .filter(|id| !id.is_empty())
}

/// Typed access to crawled nodes
pub struct Crawler<'r> {
    converters: &'r ConversionRegistry,
    locator_key: &'r str,
}

impl<'r> Crawler<'r> {
    pub fn new(converters: &'r ConversionRegistry, locator_key: &'r str) -> Self {
        Crawler {
            converters,
            locator_key,
        }
    }

    /// Materialize a leaf as `ty`. Null nodes and rejected categories give `None`.
    pub fn get<N: HierarchicalNode + ?Sized>(&self, node: Option<&N>, ty: &FieldType) -> Option<Value> {
        self.converters.convert_node(node?, ty)
    }

    /// Extract the id of a referenced `target` feature from a locator node.
    ///
    /// The node is either locator text or an object holding it under the
    /// configured locator key. Ids that fail the target's id pattern are
    /// dropped. Accepted ids are queued as placeholder keys for the target
    /// table so the referencing row can be written before the target's own
    /// row exists.
    pub fn decode_foreign_id<N: HierarchicalNode + ?Sized>(
        &self,
        node: Option<&N>,
        target: &FeatureEntry,
        batch: &mut Batch,
    ) -> Option<String> {
        let node = node?;
        let locator = match node.leaf() {
            Some(Leaf::Text(text)) => text,
            Some(_) => return None,
            None => match node.child(self.locator_key) {
                Lookup::Found(inner) => match unwrap_single(inner).leaf() {
                    Some(Leaf::Text(text)) => text,
                    _ => return None,
                },
                _ => return None,
            },
        };

        let id = locator_id(locator)?;
        if !target.matches_id(id) {
            debug!(
                "Dropping reference `{}`: not a valid {} id",
                locator,
                target.table_name()
            );
            return None;
        }

        batch.request_placeholder(target.table_name(), id);
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::EnumDescriptor;
    use crate::feature::{FeatureDescriptor, FeatureRegistry};
    use proptest::prelude::*;
    use serde_json::{json, Value as Json};

    fn path(text: &str) -> PathExpression {
        text.parse().unwrap()
    }

    #[test]
    fn test_crawl_nested_fields_and_indexes() {
        let node = json!({
            "designator": "EADD",
            "contact": [
                {"phone": "111"},
                {"phone": "222"}
            ],
            "geometry": [{"pos": "54.6 25.3"}]
        });

        let found = crawl(Some(&node), &path("contact[1]/phone")).unwrap();
        assert_eq!(found, Some(&json!("222")));

        // One-element list is unwrapped without an index
        let found = crawl(Some(&node), &path("geometry/pos")).unwrap();
        assert_eq!(found, Some(&json!("54.6 25.3")));
    }

    #[test]
    fn test_absent_data_propagates_as_null() {
        let node = json!({"contact": [{"phone": null}], "name": null});
        assert_eq!(crawl(Some(&node), &path("missing/deeper/still")).unwrap(), None);
        assert_eq!(crawl(Some(&node), &path("contact[4]/phone")).unwrap(), None);
        assert_eq!(crawl(Some(&node), &path("contact[0]/phone")).unwrap(), None);
        assert_eq!(crawl(Some(&node), &path("name/value")).unwrap(), None);
        assert_eq!(crawl::<Json>(None, &path("anything")).unwrap(), None);
    }

    #[test]
    fn test_missing_accessor_fails_loudly() {
        let node = json!({"name": "EADD", "list": [1, 2]});
        let err = crawl(Some(&node), &path("name/value")).unwrap_err();
        assert_eq!(
            err,
            CrawlError::NoAccessor {
                path: "name/value".into(),
                step: "value".into(),
                found: NodeCategory::Text,
            }
        );

        // A multi-element list has no named children
        assert!(crawl(Some(&node), &path("list/x")).is_err());
    }

    #[test]
    fn test_index_on_non_list_fails_loudly() {
        let node = json!({"name": "EADD", "obj": {"a": 1}});
        let err = crawl(Some(&node), &path("name[1]")).unwrap_err();
        assert_eq!(
            err,
            CrawlError::NoAccessor {
                path: "name[1]".into(),
                step: "name".into(),
                found: NodeCategory::Text,
            }
        );
        assert!(matches!(
            crawl(Some(&node), &path("name[0]")),
            Err(CrawlError::NoAccessor { .. })
        ));
        assert!(matches!(
            crawl(Some(&node), &path("obj[0]/a")),
            Err(CrawlError::NoAccessor {
                found: NodeCategory::Object,
                ..
            })
        ));
    }

    #[test]
    fn test_locator_id() {
        assert_eq!(locator_id("urn:uuid:THING_0000001"), Some("THING_0000001"));
        assert_eq!(locator_id("#THING_0000001"), Some("THING_0000001"));
        assert_eq!(locator_id("http://host/a/THING_1"), Some("THING_1"));
        assert_eq!(locator_id("THING_1"), Some("THING_1"));
        assert_eq!(locator_id("urn:uuid:"), None);
    }

    #[test]
    fn test_decode_foreign_id_queues_placeholder() {
        let mut registry = FeatureRegistry::default();
        registry
            .register(FeatureDescriptor::new("Thing", "Thing", "THING").in_group("things").identity("id"))
            .unwrap();
        let target = registry.entry_by_table("Thing").unwrap();
        let crawler = Crawler::new(registry.converters(), "href");
        let mut batch = Batch::new("things", 0);

        let node = json!({"href": "urn:uuid:THING_0000001"});
        assert_eq!(
            crawler.decode_foreign_id(Some(&node), target, &mut batch),
            Some("THING_0000001".to_string())
        );
        let node = json!("#PART_0000001");
        assert_eq!(crawler.decode_foreign_id(Some(&node), target, &mut batch), None);
        assert_eq!(crawler.decode_foreign_id::<Json>(None, target, &mut batch), None);

        let split = batch.split();
        assert_eq!(split.placeholders("Thing"), ["THING_0000001".to_string()]);
    }

    proptest! {
        #[test]
        fn prop_crawl_below_absent_step_is_null(
            names in proptest::collection::vec("[a-z]{1,6}", 1..6),
            ty in prop_oneof![
                Just(FieldType::Text),
                Just(FieldType::Bool),
                Just(FieldType::Int8),
                Just(FieldType::Int16),
                Just(FieldType::Int32),
                Just(FieldType::Int64),
                Just(FieldType::Float32),
                Just(FieldType::Float64),
                Just(FieldType::Char),
                Just(FieldType::Enum("CodeSurface".into())),
            ],
        ) {
            let node = json!({"present": {"leaf": "x"}});
            let text = format!("absent/{}", names.join("/"));
            let found = crawl(Some(&node), &path(&text)).unwrap();
            prop_assert!(found.is_none());

            let mut registry = ConversionRegistry::default();
            registry.register_enum(EnumDescriptor::new("CodeSurface").member("ASPH", &[]).member("CONC", &[]));
            prop_assert!(registry.supports(&ty));
            let crawler = Crawler::new(&registry, "href");
            prop_assert_eq!(crawler.get(found, &ty), None);
        }
    }
}
