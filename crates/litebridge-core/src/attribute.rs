//! Schema attribute descriptors consumed by the converter registry.

use crate::value::ValueKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A literal configuration value attached to an attribute.
///
/// Untagged so schema files can write `"max": 10` or `"encoding": "ascii"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl OptionValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(v) => write!(f, "{v}"),
            OptionValue::Int(v) => write!(f, "{v}"),
            OptionValue::Real(v) => write!(f, "{v}"),
            OptionValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(i64::from(v))
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Real(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

/// A declared schema attribute: the entity it belongs to, its value kind,
/// and the positional and keyword options given in the declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Owning entity name
    pub entity: String,
    /// Attribute name
    pub name: String,
    /// Declared value kind
    pub kind: ValueKind,
    /// Positional arguments, e.g. the max length `50` of a text attribute
    #[serde(default)]
    pub args: Vec<OptionValue>,
    /// Keyword options, e.g. `min`, `max`, `precision`
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
}

impl Attribute {
    /// Create an attribute with no arguments or options.
    pub fn new(entity: impl Into<String>, name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            entity: entity.into(),
            name: name.into(),
            kind,
            args: Vec::new(),
            options: BTreeMap::new(),
        }
    }

    /// Append a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<OptionValue>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Qualified name used in messages, `Entity.name`.
    pub fn qualified_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_args_and_options() {
        let attr = Attribute::new("Person", "name", ValueKind::Text)
            .arg(50)
            .option("encoding", "ascii");

        assert_eq!(attr.args, vec![OptionValue::Int(50)]);
        assert_eq!(
            attr.options.get("encoding"),
            Some(&OptionValue::Text("ascii".into()))
        );
        assert_eq!(attr.qualified_name(), "Person.name");
    }

    #[test]
    fn deserializes_from_json() {
        let json = r#"{
            "entity": "Product",
            "name": "price",
            "kind": "decimal",
            "args": [5, 2],
            "options": {"min": "0.01", "max": 999.5}
        }"#;
        let attr: Attribute = serde_json::from_str(json).unwrap();

        assert_eq!(attr.kind, ValueKind::Decimal);
        assert_eq!(attr.args, vec![OptionValue::Int(5), OptionValue::Int(2)]);
        assert_eq!(attr.options["min"], OptionValue::Text("0.01".into()));
        assert_eq!(attr.options["max"], OptionValue::Real(999.5));
    }

    #[test]
    fn options_default_to_empty() {
        let attr: Attribute =
            serde_json::from_str(r#"{"entity": "A", "name": "b", "kind": "bool"}"#).unwrap();
        assert!(attr.args.is_empty());
        assert!(attr.options.is_empty());
    }
}
