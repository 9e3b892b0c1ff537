//! Check a parsed JSON value against the schema its grammar was built from.
//!
//! The rules mirror what the generated grammar accepts: keyword precedence,
//! required-by-default properties and closed objects all match lowering, so a
//! value the grammar produced passes and a hand-written value is held to the
//! same shape.
use std::collections::HashSet;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::defs::{DefKey, DefsMap, DefsRegistry, defs_of, join_defs, join_scopes};
use crate::schema::{AdditionalProperties, JsonSchema, PrimitiveType, SchemaMap, StringFormat, def_name_of_ref};

/// The first mismatch found, with the JSON path of the offending value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (at {path})")]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

pub const ROOT_PATH: &str = "$";

static DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-(0[1-9]|1[012])-(0[1-9]|[12]\d|3[01])$").expect("valid date regex"));
static TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):[0-5]\d:[0-5]\d(\.\d{3})?(Z|[+-]([01]\d|2[0-3]):[0-5]\d)$").expect("valid time regex")
});
static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\d{4}-(0[1-9]|1[012])-(0[1-9]|[12]\d|3[01])T([01]\d|2[0-3]):[0-5]\d:[0-5]\d(\.\d{3})?(Z|[+-]([01]\d|2[0-3]):[0-5]\d)$",
    )
    .expect("valid date-time regex")
});

pub fn validate(value: &Value, schema: &JsonSchema) -> Result<(), ValidationError> {
    validate_with_defs(value, schema, None)
}

/// Like [`validate`], with `defs` visible to every `$ref` in `schema`.
pub fn validate_with_defs(value: &Value, schema: &JsonSchema, defs: Option<&SchemaMap>) -> Result<(), ValidationError> {
    let mut validator = Validator { registry: DefsRegistry::new(), active_refs: HashSet::new() };
    let external = Rc::new(defs_of(defs));
    validator.registry.register_defs(&external);
    validator.check(value, schema, &external, ROOT_PATH)
}

struct Validator<'s> {
    registry: DefsRegistry<'s>,
    /// Defs being checked against a value, keyed with the value's address.
    /// Meeting the same pair again means the def loops without descending.
    active_refs: HashSet<(DefKey, usize)>,
}

impl<'s> Validator<'s> {

    fn check(&mut self, value: &Value, schema: &'s JsonSchema, defs: &Rc<DefsMap<'s>>, path: &str) -> Result<(), ValidationError> {
        let own = defs_of(schema.defs.as_ref());
        let defs = join_defs(defs, &own);
        if !own.is_empty() {
            self.registry.register_defs(&defs);
        }

        if let Some(reference) = &schema.ref_ {
            return self.check_ref(value, reference, &defs, path);
        }

        if let Some(branches) = schema.one_of.as_ref().or(schema.any_of.as_ref()) {
            for branch in branches {
                if self.check(value, branch, &defs, path).is_ok() {
                    return Ok(());
                }
            }
            return Err(fail(path, format!("expected one of {} schemas but got {value}", branches.len())));
        }

        if let Some(expected) = &schema.const_ {
            if value == expected {
                return Ok(());
            }
            return Err(fail(path, format!("expected {expected} but got {value}")));
        }

        if let Some(members) = &schema.enum_ {
            if members.contains(value) {
                return Ok(());
            }
            let listed: Vec<String> = members.iter().map(Value::to_string).collect();
            return Err(fail(path, format!("expected one of [{}] but got {value}", listed.join(", "))));
        }

        let Some(types) = &schema.type_ else {
            return Ok(());
        };
        match types.types() {
            [ty] => self.check_typed(value, schema, *ty, &defs, path),
            many => {
                let mut first_error = None;
                for ty in many {
                    if !type_matches(value, *ty) {
                        continue;
                    }
                    match self.check_typed(value, schema, *ty, &defs, path) {
                        Ok(()) => return Ok(()),
                        Err(err) => {
                            first_error.get_or_insert(err);
                        }
                    }
                }
                Err(first_error.unwrap_or_else(|| {
                    let listed: Vec<String> = many.iter().map(|ty| format!("{:?}", ty.as_str())).collect();
                    fail(path, format!("expected one type of [{}] but got type {:?}", listed.join(", "), kind_of(value)))
                }))
            }
        }
    }

    fn check_ref(&mut self, value: &Value, reference: &str, defs: &Rc<DefsMap<'s>>, path: &str) -> Result<(), ValidationError> {
        let name = def_name_of_ref(reference).map_err(|err| fail(path, err.to_string()))?;
        let Some(def) = defs.get(name).copied() else {
            return Err(fail(path, format!("unresolved reference: {reference}")));
        };
        let key = DefKey::new(name, def);
        let declared = self.registry.enclosing_defs(&key).cloned().unwrap_or_else(|| Rc::clone(defs));
        let visible = join_scopes(defs, &declared);

        let active = (key, std::ptr::from_ref(value) as usize);
        if !self.active_refs.insert(active.clone()) {
            return Err(fail(path, format!("def {name:?} refers back to itself before matching any value")));
        }
        let outcome = self.check(value, def, &visible, path);
        self.active_refs.remove(&active);
        outcome
    }

    fn check_typed(
        &mut self,
        value: &Value,
        schema: &'s JsonSchema,
        ty: PrimitiveType,
        defs: &Rc<DefsMap<'s>>,
        path: &str,
    ) -> Result<(), ValidationError> {
        if !type_matches(value, ty) {
            return Err(fail(path, format!("expected type {:?} but got {:?}", ty.as_str(), kind_of(value))));
        }
        match (ty, value) {
            (PrimitiveType::Object, Value::Object(map)) => self.check_object(map, schema, defs, path),
            (PrimitiveType::Array, Value::Array(items)) => self.check_array(items, schema, defs, path),
            (PrimitiveType::String, Value::String(text)) => check_string(text, schema, path),
            _ => Ok(()),
        }
    }

    fn check_object(
        &mut self,
        map: &Map<String, Value>,
        schema: &'s JsonSchema,
        defs: &Rc<DefsMap<'s>>,
        path: &str,
    ) -> Result<(), ValidationError> {
        let declared = schema.properties.as_ref();
        let is_declared = |key: &str| declared.is_some_and(|p| p.contains_key(key));

        let extra: Vec<&String> = map.keys().filter(|key| !is_declared(key.as_str())).collect();
        if !extra.is_empty() {
            match &schema.additional_properties {
                None | Some(AdditionalProperties::Allowed(false)) => {
                    return Err(fail(path, format!("unexpected keys: {}", quoted_list(&extra))));
                }
                Some(AdditionalProperties::Allowed(true)) => {}
                Some(AdditionalProperties::Schema(value_schema)) => {
                    for key in &extra {
                        self.check(&map[key.as_str()], value_schema, defs, &child_key(path, key))?;
                    }
                }
            }
        }

        let missing: Vec<&String> = declared
            .into_iter()
            .flat_map(|p| p.keys())
            .filter(|key| schema.is_required(key.as_str()) && !map.contains_key(key.as_str()))
            .collect();
        if !missing.is_empty() {
            return Err(fail(path, format!("missing keys: {}", quoted_list(&missing))));
        }

        for (key, value_schema) in declared.into_iter().flatten() {
            if let Some(value) = map.get(key) {
                self.check(value, value_schema, defs, &child_key(path, key))?;
            }
        }
        Ok(())
    }

    fn check_array(
        &mut self,
        items: &[Value],
        schema: &'s JsonSchema,
        defs: &Rc<DefsMap<'s>>,
        path: &str,
    ) -> Result<(), ValidationError> {
        let prefix = schema.prefix_items.as_deref().unwrap_or_default();
        let min = schema.min_items.unwrap_or(0).max(prefix.len() as u32) as usize;
        let max = schema.max_items.map(|m| (m as usize).max(min));
        let len = items.len();

        if len < min || max.is_some_and(|max| len > max) {
            let message = match max {
                Some(max) if max == min => format!("expected exactly {min} items but got {len}"),
                Some(max) if len > max => format!("expected at most {max} items but got {len}"),
                _ => format!("expected at least {min} items but got {len}"),
            };
            return Err(fail(path, message));
        }

        for (index, value) in items.iter().enumerate() {
            let item_schema = match prefix.get(index) {
                Some(item_schema) => item_schema,
                None => match schema.items.as_deref() {
                    Some(item_schema) => item_schema,
                    None => continue,
                },
            };
            self.check(value, item_schema, defs, &format!("{path}[{index}]"))?;
        }
        Ok(())
    }
}

fn check_string(text: &str, schema: &JsonSchema, path: &str) -> Result<(), ValidationError> {
    if let Some(format) = schema.string_format() {
        let pattern = match format {
            StringFormat::Date => &DATE,
            StringFormat::Time => &TIME,
            StringFormat::DateTime => &DATE_TIME,
        };
        if pattern.is_match(text) {
            return Ok(());
        }
        return Err(fail(path, format!("expected a valid {} string but got {:?}", format.as_str(), text)));
    }

    let len = text.chars().count();
    let min = schema.min_length.unwrap_or(0) as usize;
    let max = schema.max_length.map(|m| (m as usize).max(min));
    if len < min || max.is_some_and(|max| len > max) {
        let message = match max {
            Some(max) if max == min => format!("expected exactly {min} characters but got {len}"),
            Some(max) if len > max => format!("expected at most {max} characters but got {len}"),
            _ => format!("expected at least {min} characters but got {len}"),
        };
        return Err(fail(path, message));
    }
    Ok(())
}

fn type_matches(value: &Value, ty: PrimitiveType) -> bool {
    match ty {
        PrimitiveType::String => value.is_string(),
        PrimitiveType::Number => value.is_number(),
        PrimitiveType::Integer => match value {
            Value::Number(n) => n.is_i64() || n.is_u64(),
            _ => false,
        },
        PrimitiveType::Boolean => value.is_boolean(),
        PrimitiveType::Null => value.is_null(),
        PrimitiveType::Object => value.is_object(),
        PrimitiveType::Array => value.is_array(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn quoted_list(keys: &[&String]) -> String {
    keys.iter().map(|key| format!("{key:?}")).collect::<Vec<_>>().join(", ")
}

fn child_key(path: &str, key: &str) -> String {
    if key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') && !key.is_empty() {
        format!("{path}.{key}")
    } else {
        format!("{path}[{key:?}]")
    }
}

fn fail(path: &str, message: String) -> ValidationError {
    ValidationError { path: path.to_string(), message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(v: Value) -> JsonSchema {
        JsonSchema::from_value(v).unwrap()
    }

    fn error(value: Value, s: Value) -> ValidationError {
        validate(&value, &schema(s)).unwrap_err()
    }

    #[test]
    fn primitive_type_mismatch() {
        let err = error(json!(1), json!({"type": "string"}));
        assert_eq!(err.message, r#"expected type "string" but got "number""#);
        assert_eq!(err.path, "$");
    }

    #[test]
    fn integers_reject_fractions() {
        assert!(validate(&json!(3), &schema(json!({"type": "integer"}))).is_ok());
        assert!(validate(&json!(3.5), &schema(json!({"type": "integer"}))).is_err());
        assert!(validate(&json!(3.0), &schema(json!({"type": "integer"}))).is_err());
    }

    #[test]
    fn type_lists_accept_any_listed_kind() {
        let s = schema(json!({"type": ["string", "null"]}));
        assert!(validate(&json!(null), &s).is_ok());
        assert!(validate(&json!("x"), &s).is_ok());
        let err = validate(&json!(true), &s).unwrap_err();
        assert_eq!(err.message, r#"expected one type of ["string", "null"] but got type "boolean""#);
    }

    #[test]
    fn objects_are_closed_and_required_by_default() {
        let s = json!({"type": "object", "properties": {"a": {"type": "number"}, "b": {"type": "string"}}});
        assert_eq!(error(json!({"a": 1}), s.clone()).message, r#"missing keys: "b""#);
        assert_eq!(error(json!({"a": 1, "b": "x", "c": 2}), s.clone()).message, r#"unexpected keys: "c""#);
        let nested = error(json!({"a": "1", "b": "x"}), s);
        assert_eq!(nested.path, "$.a");
    }

    #[test]
    fn optional_properties_may_be_absent() {
        let s = schema(json!({
            "type": "object",
            "properties": {"a": {"type": "number"}, "b": {"type": "string"}},
            "required": ["a"]
        }));
        assert!(validate(&json!({"a": 1}), &s).is_ok());
    }

    #[test]
    fn additional_properties_schema_applies_to_extra_keys() {
        let s = json!({"type": "object", "additionalProperties": {"type": "boolean"}});
        assert!(validate(&json!({"x": true}), &schema(s.clone())).is_ok());
        let err = error(json!({"x": 1}), s);
        assert_eq!(err.path, "$.x");
    }

    #[test]
    fn array_bounds() {
        let s = json!({"type": "array", "items": {"type": "number"}, "minItems": 1, "maxItems": 2});
        assert_eq!(error(json!([]), s.clone()).message, "expected at least 1 items but got 0");
        assert_eq!(error(json!([1, 2, 3]), s.clone()).message, "expected at most 2 items but got 3");
        assert_eq!(error(json!([1, "x"]), s).path, "$[1]");
        let exact = json!({"type": "array", "minItems": 2, "maxItems": 2});
        assert_eq!(error(json!([1]), exact).message, "expected exactly 2 items but got 1");
    }

    #[test]
    fn prefix_items_are_positional() {
        let s = schema(json!({
            "type": "array",
            "prefixItems": [{"type": "string"}, {"type": "number"}],
            "items": {"type": "boolean"}
        }));
        assert!(validate(&json!(["a", 1, true, false]), &s).is_ok());
        assert_eq!(validate(&json!(["a"]), &s).unwrap_err().message, "expected at least 2 items but got 1");
        assert_eq!(validate(&json!(["a", 1, 2]), &s).unwrap_err().path, "$[2]");
    }

    #[test]
    fn enum_and_const() {
        let e = json!({"enum": [1, "two", null]});
        assert!(validate(&json!(1), &schema(e.clone())).is_ok());
        // The grammar spells the member `1`, never `1.0`.
        assert!(validate(&json!(1.0), &schema(e.clone())).is_err());
        assert!(validate(&json!(1.0), &schema(json!({"const": 1}))).is_err());
        assert_eq!(error(json!("three"), e).message, r#"expected one of [1, "two", null] but got "three""#);
        assert_eq!(error(json!(2), json!({"const": 1})).message, "expected 1 but got 2");
    }

    #[test]
    fn one_of_takes_the_first_matching_branch() {
        let s = json!({"oneOf": [{"type": "string"}, {"type": "null"}]});
        assert!(validate(&json!(null), &schema(s.clone())).is_ok());
        assert_eq!(error(json!(1), s).message, "expected one of 2 schemas but got 1");
    }

    #[test]
    fn string_lengths_and_formats() {
        let s = json!({"type": "string", "minLength": 2, "maxLength": 3});
        assert_eq!(error(json!("a"), s.clone()).message, "expected at least 2 characters but got 1");
        assert_eq!(error(json!("abcd"), s).message, "expected at most 3 characters but got 4");

        let date = schema(json!({"type": "string", "format": "date"}));
        assert!(validate(&json!("2024-02-29"), &date).is_ok());
        assert!(validate(&json!("2024-13-01"), &date).is_err());

        let date_time = schema(json!({"type": "string", "format": "date-time"}));
        assert!(validate(&json!("2024-02-29T12:30:00.123+05:30"), &date_time).is_ok());
        assert!(validate(&json!("2024-02-29T12:30:00"), &date_time).is_err());
    }

    #[test]
    fn refs_follow_defs() {
        let s = schema(json!({
            "$defs": {"node": {
                "type": "object",
                "properties": {"next": {"anyOf": [{"$ref": "#/$defs/node"}, {"type": "null"}]}}
            }},
            "$ref": "#/$defs/node"
        }));
        assert!(validate(&json!({"next": {"next": null}}), &s).is_ok());
        let err = validate(&json!({"next": {"next": 1}}), &s).unwrap_err();
        assert_eq!(err.path, "$.next");
    }

    #[test]
    fn ref_cycles_without_structure_fail_instead_of_looping() {
        let alias_cycle = json!({
            "$defs": {"a": {"$ref": "#/$defs/b"}, "b": {"$ref": "#/$defs/a"}},
            "$ref": "#/$defs/a"
        });
        let err = error(json!(1), alias_cycle);
        assert_eq!(err.path, "$");
        assert!(err.message.contains("refers back to itself"), "{err}");

        let union_cycle = schema(json!({
            "$defs": {"a": {"anyOf": [{"$ref": "#/$defs/a"}, {"type": "null"}]}},
            "$ref": "#/$defs/a"
        }));
        assert!(validate(&json!(null), &union_cycle).is_ok());
        assert!(validate(&json!(1), &union_cycle).is_err());
    }

    #[test]
    fn same_text_defs_under_different_siblings_stay_apart() {
        let s = schema(json!({
            "type": "object",
            "properties": {
                "x": {"$defs": {"t": {"$ref": "#/$defs/u"}, "u": {"type": "string"}}, "$ref": "#/$defs/t"},
                "y": {"$defs": {"t": {"$ref": "#/$defs/u"}, "u": {"type": "number"}}, "$ref": "#/$defs/t"}
            }
        }));
        assert!(validate(&json!({"x": "a", "y": 1}), &s).is_ok());
        assert_eq!(validate(&json!({"x": "a", "y": "b"}), &s).unwrap_err().path, "$.y");
    }

    #[test]
    fn odd_keys_are_bracketed_in_paths() {
        assert_eq!(child_key("$", "a b"), r#"$["a b"]"#);
        assert_eq!(child_key("$", "ok_1"), "$.ok_1");
    }
}
