//! Value conversion registry
//!
//! Maps a target [`FieldType`] to the converter that produces it, either from
//! a raw leaf or from its string form. A converter first checks the leaf's
//! category; a mismatch yields `None` rather than an error.

use crate::node::{HierarchicalNode, Leaf, NodeCategory};
use crate::value::{FieldType, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub trait Converter: Send + Sync {
    /// The single semantic type this converter produces
    fn target(&self) -> FieldType;

    /// Leaf categories this converter is willing to look at
    fn accepts(&self) -> &[NodeCategory];

    fn parse_text(&self, text: &str) -> Option<Value>;

    fn convert_leaf(&self, leaf: Leaf<'_>) -> Option<Value> {
        match leaf {
            Leaf::Text(s) => self.parse_text(s),
            _ => None,
        }
    }

    /// String form of a value this converter produced.
    fn render(&self, value: &Value) -> Option<String>;
}

/// Tri-state boolean: recognized yes/no tokens, anything else is null.
pub struct BoolConverter;

impl Converter for BoolConverter {
    fn target(&self) -> FieldType {
        FieldType::Bool
    }

    fn accepts(&self) -> &[NodeCategory] {
        &[NodeCategory::Bool, NodeCategory::Text]
    }

    fn parse_text(&self, text: &str) -> Option<Value> {
        match text.trim().to_ascii_uppercase().as_str() {
            "YES" | "Y" | "TRUE" | "1" => Some(Value::Bool(true)),
            "NO" | "N" | "FALSE" | "0" => Some(Value::Bool(false)),
            _ => None,
        }
    }

    fn convert_leaf(&self, leaf: Leaf<'_>) -> Option<Value> {
        match leaf {
            Leaf::Bool(b) => Some(Value::Bool(b)),
            Leaf::Text(s) => self.parse_text(s),
            _ => None,
        }
    }

    fn render(&self, value: &Value) -> Option<String> {
        match value {
            Value::Bool(true) => Some("YES".to_string()),
            Value::Bool(false) => Some("NO".to_string()),
            _ => None,
        }
    }
}

/// Signed integer of a fixed width; out-of-range values are null.
pub struct IntConverter {
    ty: FieldType,
    min: i64,
    max: i64,
}

impl IntConverter {
    pub fn new(ty: FieldType) -> Option<Self> {
        let (min, max) = match ty {
            FieldType::Int8 => (i64::from(i8::MIN), i64::from(i8::MAX)),
            FieldType::Int16 => (i64::from(i16::MIN), i64::from(i16::MAX)),
            FieldType::Int32 => (i64::from(i32::MIN), i64::from(i32::MAX)),
            FieldType::Int64 => (i64::MIN, i64::MAX),
            _ => return None,
        };
        Some(IntConverter { ty, min, max })
    }

    fn checked(&self, i: i64) -> Option<Value> {
        (self.min..=self.max).contains(&i).then_some(Value::Int(i))
    }
}

impl Converter for IntConverter {
    fn target(&self) -> FieldType {
        self.ty.clone()
    }

    fn accepts(&self) -> &[NodeCategory] {
        &[NodeCategory::Integer, NodeCategory::Text]
    }

    fn parse_text(&self, text: &str) -> Option<Value> {
        text.trim().parse::<i64>().ok().and_then(|i| self.checked(i))
    }

    fn convert_leaf(&self, leaf: Leaf<'_>) -> Option<Value> {
        match leaf {
            Leaf::Integer(i) => self.checked(i),
            Leaf::Text(s) => self.parse_text(s),
            _ => None,
        }
    }

    fn render(&self, value: &Value) -> Option<String> {
        match value {
            Value::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }
}

pub struct FloatConverter {
    single: bool,
}

impl FloatConverter {
    pub fn single() -> Self {
        FloatConverter { single: true }
    }

    pub fn double() -> Self {
        FloatConverter { single: false }
    }

    /// NaN and infinities (including f32 overflow) are not data.
    fn narrow(&self, x: f64) -> Option<Value> {
        let x = if self.single { f64::from(x as f32) } else { x };
        x.is_finite().then_some(Value::Float(x))
    }
}

impl Converter for FloatConverter {
    fn target(&self) -> FieldType {
        if self.single {
            FieldType::Float32
        } else {
            FieldType::Float64
        }
    }

    fn accepts(&self) -> &[NodeCategory] {
        &[NodeCategory::Float, NodeCategory::Integer, NodeCategory::Text]
    }

    fn parse_text(&self, text: &str) -> Option<Value> {
        text.trim().parse::<f64>().ok().and_then(|x| self.narrow(x))
    }

    fn convert_leaf(&self, leaf: Leaf<'_>) -> Option<Value> {
        match leaf {
            Leaf::Float(x) => self.narrow(x),
            Leaf::Integer(i) => self.narrow(i as f64),
            Leaf::Text(s) => self.parse_text(s),
            Leaf::Bool(_) => None,
        }
    }

    fn render(&self, value: &Value) -> Option<String> {
        match value {
            Value::Float(x) if self.single => Some((*x as f32).to_string()),
            Value::Float(x) => Some(x.to_string()),
            _ => None,
        }
    }
}

/// Exactly one character; longer or empty text is null.
pub struct CharConverter;

impl Converter for CharConverter {
    fn target(&self) -> FieldType {
        FieldType::Char
    }

    fn accepts(&self) -> &[NodeCategory] {
        &[NodeCategory::Text]
    }

    fn parse_text(&self, text: &str) -> Option<Value> {
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(Value::Char(c)),
            _ => None,
        }
    }

    fn render(&self, value: &Value) -> Option<String> {
        match value {
            Value::Char(c) => Some(c.to_string()),
            _ => None,
        }
    }
}

pub struct TextConverter;

impl Converter for TextConverter {
    fn target(&self) -> FieldType {
        FieldType::Text
    }

    fn accepts(&self) -> &[NodeCategory] {
        &[
            NodeCategory::Text,
            NodeCategory::Integer,
            NodeCategory::Float,
            NodeCategory::Bool,
        ]
    }

    fn parse_text(&self, text: &str) -> Option<Value> {
        Some(Value::Text(text.to_string()))
    }

    fn convert_leaf(&self, leaf: Leaf<'_>) -> Option<Value> {
        let text = match leaf {
            Leaf::Text(s) => s.to_string(),
            Leaf::Integer(i) => i.to_string(),
            Leaf::Float(x) => x.to_string(),
            Leaf::Bool(b) => b.to_string(),
        };
        Some(Value::Text(text))
    }

    fn render(&self, value: &Value) -> Option<String> {
        match value {
            Value::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// One member of a domain enumeration and the raw tokens that map to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// Declarative description of a domain enumeration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDescriptor {
    pub name: String,
    pub members: Vec<EnumMember>,
}

impl EnumDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        EnumDescriptor {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Add a member recognized by its own name plus any extra raw tokens.
    pub fn member(mut self, name: impl Into<String>, tokens: &[&str]) -> Self {
        self.members.push(EnumMember {
            name: name.into(),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
        });
        self
    }
}

/// Maps raw enumerated tokens to members of a registered enumeration and
/// serializes members by name.
pub struct EnumConverter {
    descriptor: EnumDescriptor,
    lookup: HashMap<String, usize>,
}

impl EnumConverter {
    pub fn new(descriptor: EnumDescriptor) -> Self {
        let mut lookup = HashMap::new();
        for (idx, member) in descriptor.members.iter().enumerate() {
            for token in &member.tokens {
                lookup.entry(token.clone()).or_insert(idx);
            }
        }
        // Member names always win over colliding tokens
        for (idx, member) in descriptor.members.iter().enumerate() {
            lookup.insert(member.name.clone(), idx);
        }
        EnumConverter { descriptor, lookup }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl Converter for EnumConverter {
    fn target(&self) -> FieldType {
        FieldType::Enum(self.descriptor.name.clone())
    }

    fn accepts(&self) -> &[NodeCategory] {
        &[NodeCategory::Text]
    }

    fn parse_text(&self, text: &str) -> Option<Value> {
        self.lookup
            .get(text.trim())
            .map(|&idx| Value::Enum(self.descriptor.members[idx].name.clone()))
    }

    fn render(&self, value: &Value) -> Option<String> {
        match value {
            Value::Enum(name) if self.lookup.contains_key(name) => Some(name.clone()),
            _ => None,
        }
    }
}

/// Registry of converters keyed by the type they produce
pub struct ConversionRegistry {
    converters: HashMap<FieldType, Box<dyn Converter>>,
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ConversionRegistry {
    pub fn empty() -> Self {
        ConversionRegistry {
            converters: HashMap::new(),
        }
    }

    /// Registry with booleans, integers of every width, floats, characters and text.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(BoolConverter);
        for ty in [
            FieldType::Int8,
            FieldType::Int16,
            FieldType::Int32,
            FieldType::Int64,
        ] {
            if let Some(converter) = IntConverter::new(ty) {
                registry.register(converter);
            }
        }
        registry.register(FloatConverter::single());
        registry.register(FloatConverter::double());
        registry.register(CharConverter);
        registry.register(TextConverter);
        registry
    }

    /// Register a converter, replacing any previous one for the same target type.
    pub fn register(&mut self, converter: impl Converter + 'static) {
        self.converters.insert(converter.target(), Box::new(converter));
    }

    pub fn register_enum(&mut self, descriptor: EnumDescriptor) {
        self.register(EnumConverter::new(descriptor));
    }

    pub fn supports(&self, ty: &FieldType) -> bool {
        self.converters.contains_key(ty)
    }

    pub fn convert(&self, leaf: Leaf<'_>, ty: &FieldType) -> Option<Value> {
        let converter = self.converters.get(ty)?;
        if !converter.accepts().contains(&leaf.category()) {
            return None;
        }
        converter.convert_leaf(leaf)
    }

    pub fn convert_node<N: HierarchicalNode + ?Sized>(&self, node: &N, ty: &FieldType) -> Option<Value> {
        self.convert(node.leaf()?, ty)
    }

    pub fn convert_from_string(&self, text: &str, ty: &FieldType) -> Option<Value> {
        self.converters.get(ty)?.parse_text(text)
    }

    pub fn convert_to_string(&self, value: &Value, ty: &FieldType) -> Option<String> {
        self.converters.get(ty)?.render(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn round_trip(registry: &ConversionRegistry, value: Value, ty: FieldType) {
        let text = registry
            .convert_to_string(&value, &ty)
            .unwrap_or_else(|| panic!("no string form for {:?}", value));
        assert_eq!(registry.convert_from_string(&text, &ty), Some(value));
    }

    #[test]
    fn test_bool_is_tri_state() {
        let registry = ConversionRegistry::default();
        assert_eq!(registry.convert_from_string("YES", &FieldType::Bool), Some(Value::Bool(true)));
        assert_eq!(registry.convert_from_string("no", &FieldType::Bool), Some(Value::Bool(false)));
        assert_eq!(registry.convert_from_string("OTHER", &FieldType::Bool), None);
        round_trip(&registry, Value::Bool(true), FieldType::Bool);
        round_trip(&registry, Value::Bool(false), FieldType::Bool);
    }

    #[test]
    fn test_integer_boundaries() {
        let registry = ConversionRegistry::default();
        round_trip(&registry, Value::Int(i64::from(i8::MIN)), FieldType::Int8);
        round_trip(&registry, Value::Int(i64::from(i16::MAX)), FieldType::Int16);
        round_trip(&registry, Value::Int(i64::MIN), FieldType::Int64);
        assert_eq!(registry.convert_from_string("128", &FieldType::Int8), None);
        assert_eq!(registry.convert_node(&json!(40_000), &FieldType::Int16), None);
    }

    #[test]
    fn test_char_rejects_multiple_characters() {
        let registry = ConversionRegistry::default();
        round_trip(&registry, Value::Char('L'), FieldType::Char);
        assert_eq!(registry.convert_from_string("LR", &FieldType::Char), None);
        assert_eq!(registry.convert_from_string("", &FieldType::Char), None);
    }

    #[test]
    fn test_category_mismatch_is_absent() {
        let registry = ConversionRegistry::default();
        assert_eq!(registry.convert_node(&json!(true), &FieldType::Int32), None);
        assert_eq!(registry.convert_node(&json!(1.5), &FieldType::Char), None);
        assert_eq!(registry.convert_node(&json!({"a": 1}), &FieldType::Text), None);
        assert_eq!(
            registry.convert_node(&json!(12), &FieldType::Float64),
            Some(Value::Float(12.0))
        );
    }

    #[test]
    fn test_non_finite_floats_are_absent() {
        let registry = ConversionRegistry::default();
        for text in ["NaN", "inf", "-infinity"] {
            assert_eq!(registry.convert_from_string(text, &FieldType::Float64), None);
            assert_eq!(registry.convert_from_string(text, &FieldType::Float32), None);
        }
        assert_eq!(registry.convert_from_string("1e40", &FieldType::Float32), None);
        assert_eq!(registry.convert_node(&json!(1e300), &FieldType::Float32), None);
        assert_eq!(
            registry.convert_from_string(" 2.5 ", &FieldType::Float32),
            Some(Value::Float(2.5))
        );
    }

    #[test]
    fn test_unregistered_type_is_absent() {
        let registry = ConversionRegistry::default();
        let ty = FieldType::Enum("CodeRunway".into());
        assert!(!registry.supports(&ty));
        assert_eq!(registry.convert_node(&json!("RWY"), &ty), None);
    }

    #[test]
    fn test_enum_maps_tokens_to_members() {
        let mut registry = ConversionRegistry::default();
        registry.register_enum(
            EnumDescriptor::new("CodeAirportHeliport")
                .member("AD", &["AERODROME"])
                .member("HP", &["HELIPORT"]),
        );
        let ty = FieldType::Enum("CodeAirportHeliport".into());

        assert_eq!(registry.convert_node(&json!("HELIPORT"), &ty), Some(Value::Enum("HP".into())));
        assert_eq!(registry.convert_node(&json!("AD"), &ty), Some(Value::Enum("AD".into())));
        assert_eq!(registry.convert_node(&json!("LS"), &ty), None);
        round_trip(&registry, Value::Enum("HP".into()), ty);
    }

    proptest! {
        #[test]
        fn prop_int32_round_trips(i in any::<i32>()) {
            let registry = ConversionRegistry::default();
            let text = registry.convert_to_string(&Value::Int(i64::from(i)), &FieldType::Int32).unwrap();
            prop_assert_eq!(registry.convert_from_string(&text, &FieldType::Int32), Some(Value::Int(i64::from(i))));
        }

        #[test]
        fn prop_float64_round_trips(x in -1.0e12f64..1.0e12f64) {
            let registry = ConversionRegistry::default();
            let text = registry.convert_to_string(&Value::Float(x), &FieldType::Float64).unwrap();
            prop_assert_eq!(registry.convert_from_string(&text, &FieldType::Float64), Some(Value::Float(x)));
        }
    }
}
