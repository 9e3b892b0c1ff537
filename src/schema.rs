//! Typed view of the JSON Schema subset the grammar compiler understands.
//!
//! Keywords outside this subset are ignored on input. `serde_json` is built
//! with `preserve_order`, so `properties` iterate in declared key order and
//! the generated object grammar follows the schema author's ordering.
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{GrammarError, Result};

pub type SchemaMap = IndexMap<String, JsonSchema>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<TypeSet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<SchemaMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_items: Option<Vec<JsonSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_: Option<Vec<Value>>,
    /// `Some(Value::Null)` is a `null` constant; `None` means no `const` at all.
    #[serde(
        rename = "const",
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub const_: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<JsonSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<JsonSchema>>,

    #[serde(rename = "$defs", alias = "definitions", default, skip_serializing_if = "Option::is_none")]
    pub defs: Option<SchemaMap>,
    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub ref_: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSet {
    One(PrimitiveType),
    Many(Vec<PrimitiveType>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Number,
    Integer,
    Boolean,
    Null,
    Object,
    Array,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<JsonSchema>),
}

/// String formats with a dedicated grammar. Any other `format` is treated as
/// an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringFormat {
    Date,
    Time,
    DateTime,
}

impl StringFormat {
    pub fn parse(format: &str) -> Option<Self> {
        match format {
            "date" => Some(Self::Date),
            "time" => Some(Self::Time),
            "date-time" => Some(Self::DateTime),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "date-time",
        }
    }
}

impl TypeSet {
    pub fn types(&self) -> &[PrimitiveType] {
        match self {
            TypeSet::One(t) => std::slice::from_ref(t),
            TypeSet::Many(ts) => ts,
        }
    }
}

impl PrimitiveType {
    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Number => "number",
            PrimitiveType::Integer => "integer",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Null => "null",
            PrimitiveType::Object => "object",
            PrimitiveType::Array => "array",
        }
    }
}

impl JsonSchema {
    pub fn from_value(value: Value) -> Result<Self> {
        crate::path_de::from_value_with_path(value)
    }

    pub fn from_json_str(src: &str) -> Result<Self> {
        crate::path_de::from_str_with_path(src)
    }

    pub fn string_format(&self) -> Option<StringFormat> {
        self.format.as_deref().and_then(StringFormat::parse)
    }

    /// Is `key` a required property? Without a `required` list every declared
    /// property is required.
    pub fn is_required(&self, key: &str) -> bool {
        match &self.required {
            None => true,
            Some(required) => required.iter().any(|r| r == key),
        }
    }
}

/// Def name of a local reference, `#/$defs/<name>` or `#/definitions/<name>`.
pub fn def_name_of_ref(reference: &str) -> Result<&str> {
    reference
        .strip_prefix("#/$defs/")
        .or_else(|| reference.strip_prefix("#/definitions/"))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| GrammarError::UnresolvedReference { reference: reference.to_string() })
}

fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
