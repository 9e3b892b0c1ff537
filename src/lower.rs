//! Schema -> node arena lowering.
//!
//! Keyword precedence per fragment: `$ref`, then `oneOf`/`anyOf`, `const`,
//! `enum`, `type`. A fragment with none of these accepts any JSON value.
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::defs::{DefKey, DefsMap, DefsRegistry, defs_of, join_defs, join_scopes};
use crate::error::{GrammarError, Result};
use crate::ir::{ArrayNode, Node, NodeArena, NodeId, ObjectNode, Property, RefNode};
use crate::schema::{AdditionalProperties, JsonSchema, PrimitiveType, SchemaMap, def_name_of_ref};
use crate::scope::ScopeState;
use crate::terminals::{StringBounds, Terminal};

/// A lowered schema: its arena and the node of the document root.
#[derive(Debug)]
pub struct Lowered {
    pub arena: NodeArena,
    pub root: NodeId,
}

/// Lower `schema` into a fresh arena. `external_defs` are visible everywhere,
/// below the schema's own `$defs`.
pub fn lower_schema<'s>(
    schema: &'s JsonSchema,
    external_defs: Option<&'s SchemaMap>,
    scope: ScopeState,
) -> Result<Lowered> {
    let mut lowerer = Lowerer::new();
    let external = Rc::new(defs_of(external_defs));
    if !external.is_empty() {
        lowerer.registry.register_defs(&external);
    }
    let root = lowerer.lower(schema, scope, &external)?;
    debug!(nodes = lowerer.arena.len(), defs = lowerer.registry.len(), "lowered schema");
    Ok(Lowered { arena: lowerer.arena, root })
}

struct Lowerer<'s> {
    arena: NodeArena,
    registry: DefsRegistry<'s>,
    /// One reference node per def, shared by every `$ref` to it.
    refs: HashMap<DefKey, NodeId>,
}

impl<'s> Lowerer<'s> {
    fn new() -> Self {
        Self { arena: NodeArena::new(), registry: DefsRegistry::new(), refs: HashMap::new() }
    }

    fn lower(&mut self, schema: &'s JsonSchema, scope: ScopeState, defs: &Rc<DefsMap<'s>>) -> Result<NodeId> {
        let defs = self.enter_defs(schema, defs);

        if let Some(reference) = &schema.ref_ {
            return self.lower_ref(reference, scope, &defs);
        }

        match (&schema.one_of, &schema.any_of) {
            (Some(_), Some(_)) => {
                return Err(GrammarError::unsupported("oneOf and anyOf on the same schema"));
            }
            (Some(branches), None) | (None, Some(branches)) => {
                return self.lower_union(branches, scope, &defs);
            }
            (None, None) => {}
        }

        if let Some(value) = &schema.const_ {
            return Ok(self.arena.terminal(Terminal::for_literal(value)?));
        }
        if let Some(values) = &schema.enum_ {
            return self.lower_enum(values);
        }

        let Some(types) = &schema.type_ else {
            return Ok(self.arena.alloc(Node::AnyJson(scope)));
        };
        let mut branches = Vec::with_capacity(types.types().len());
        for ty in types.types() {
            branches.push(self.lower_typed(schema, *ty, scope, &defs)?);
        }
        match branches.len() {
            0 => Err(GrammarError::unsupported("empty type list")),
            1 => Ok(branches[0]),
            _ => Ok(self.arena.alloc(Node::Union(branches))),
        }
    }

    /// Defs visible inside `schema`: its own `$defs` over the inherited ones.
    fn enter_defs(&mut self, schema: &'s JsonSchema, defs: &Rc<DefsMap<'s>>) -> Rc<DefsMap<'s>> {
        let own = defs_of(schema.defs.as_ref());
        if own.is_empty() {
            return Rc::clone(defs);
        }
        let joined = join_defs(defs, &own);
        self.registry.register_defs(&joined);
        joined
    }

    fn lower_typed(
        &mut self,
        schema: &'s JsonSchema,
        ty: PrimitiveType,
        scope: ScopeState,
        defs: &Rc<DefsMap<'s>>,
    ) -> Result<NodeId> {
        let terminal = match ty {
            PrimitiveType::Object => return self.lower_object(schema, scope, defs),
            PrimitiveType::Array => return self.lower_array(schema, scope, defs),
            PrimitiveType::String => string_terminal(schema)?,
            PrimitiveType::Number => Terminal::Number { fractional: true },
            PrimitiveType::Integer => Terminal::Number { fractional: false },
            PrimitiveType::Boolean => Terminal::Boolean,
            PrimitiveType::Null => Terminal::Null,
        };
        Ok(self.arena.terminal(terminal))
    }

    fn lower_object(&mut self, schema: &'s JsonSchema, scope: ScopeState, defs: &Rc<DefsMap<'s>>) -> Result<NodeId> {
        let inner = scope.descend();

        for key in schema.required.iter().flatten() {
            let declared = schema.properties.as_ref().is_some_and(|p| p.contains_key(key));
            if !declared {
                return Err(GrammarError::unsupported(format!(
                    "required property {key:?} is not declared in properties"
                )));
            }
        }

        let mut properties = Vec::new();
        for (key, value) in schema.properties.iter().flatten() {
            let value_id = self.lower(value, inner, defs)?;
            properties.push(Property { key: key.clone(), value: value_id, required: schema.is_required(key) });
        }

        let additional = match &schema.additional_properties {
            None | Some(AdditionalProperties::Allowed(false)) => None,
            Some(AdditionalProperties::Allowed(true)) => Some(self.arena.alloc(Node::AnyJson(inner))),
            Some(AdditionalProperties::Schema(value)) => Some(self.lower(value, inner, defs)?),
        };

        Ok(self.arena.alloc(Node::Object(ObjectNode { properties, additional, scope })))
    }

    fn lower_array(&mut self, schema: &'s JsonSchema, scope: ScopeState, defs: &Rc<DefsMap<'s>>) -> Result<NodeId> {
        let inner = scope.descend();

        if let (Some(min), Some(max)) = (schema.min_items, schema.max_items) {
            if min > max {
                return Err(GrammarError::unsupported(format!("minItems {min} exceeds maxItems {max}")));
            }
        }

        let mut prefix_items = Vec::new();
        for item in schema.prefix_items.iter().flatten() {
            prefix_items.push(self.lower(item, inner, defs)?);
        }
        let items = match &schema.items {
            Some(item) => self.lower(item, inner, defs)?,
            None => self.arena.alloc(Node::AnyJson(inner)),
        };

        let prefix_len = prefix_items.len() as u32;
        let min_items = schema.min_items.unwrap_or(0).max(prefix_len);
        let mut max_items = schema.max_items;
        if let Some(max) = max_items {
            if max < prefix_len {
                warn!(max_items = max, prefix_items = prefix_len, "maxItems is below the prefixItems count; clamping");
                max_items = Some(prefix_len);
            }
        }

        Ok(self.arena.alloc(Node::Array(ArrayNode { prefix_items, items, min_items, max_items, scope })))
    }

    fn lower_enum(&mut self, values: &[serde_json::Value]) -> Result<NodeId> {
        if values.is_empty() {
            return Err(GrammarError::unsupported("enum without values"));
        }
        let mut members = Vec::with_capacity(values.len());
        for value in values {
            members.push(self.arena.terminal(Terminal::for_literal(value)?));
        }
        Ok(self.arena.alloc(Node::Enum(members)))
    }

    fn lower_union(&mut self, branches: &'s [JsonSchema], scope: ScopeState, defs: &Rc<DefsMap<'s>>) -> Result<NodeId> {
        let mut ids = Vec::with_capacity(branches.len());
        for branch in branches {
            ids.push(self.lower(branch, scope, defs)?);
        }
        match ids.len() {
            0 => Err(GrammarError::unsupported("oneOf/anyOf without branches")),
            1 => Ok(ids[0]),
            _ => Ok(self.arena.alloc(Node::Union(ids))),
        }
    }

    fn lower_ref(&mut self, reference: &str, scope: ScopeState, defs: &Rc<DefsMap<'s>>) -> Result<NodeId> {
        let name = def_name_of_ref(reference)?;
        let def = *defs
            .get(name)
            .ok_or_else(|| GrammarError::UnresolvedReference { reference: reference.to_string() })?;

        let key = DefKey::new(name, def);
        if let Some(&id) = self.refs.get(&key) {
            return Ok(id);
        }

        let declared = self.registry.enclosing_defs(&key).cloned().unwrap_or_else(|| Rc::clone(defs));
        let visible = join_scopes(defs, &declared);

        // Registered before the body is lowered so that recursive refs find it.
        let id = self.arena.alloc(Node::Reference(RefNode { def_name: name.to_string(), target: None }));
        self.refs.insert(key, id);

        debug!(def = name, "lowering def");
        let target = self.lower(def, scope, &visible)?;
        self.arena.set_reference_target(id, target);

        if self.refers_back(id, target) {
            return Err(GrammarError::unsupported(format!(
                "def {name:?} refers back to itself before matching any input"
            )));
        }
        Ok(id)
    }

    /// Can `target` reach `id` through references and union branches alone,
    /// that is, before any bracket or literal is matched? Such a def would
    /// be a left-recursive rule.
    fn refers_back(&self, id: NodeId, target: NodeId) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![target];
        while let Some(next) = pending.pop() {
            if next == id {
                return true;
            }
            if !seen.insert(next) {
                continue;
            }
            match self.arena.get(next) {
                Node::Reference(RefNode { target: Some(target), .. }) => pending.push(*target),
                Node::Union(branches) => pending.extend(branches.iter().copied()),
                _ => {}
            }
        }
        false
    }
}

fn string_terminal(schema: &JsonSchema) -> Result<Terminal> {
    if let Some(format) = schema.string_format() {
        return Ok(Terminal::FormatString(format));
    }
    if let Some(format) = &schema.format {
        debug!(format = %format, "no grammar for string format; using a plain string");
    }
    let bounds = StringBounds { min_length: schema.min_length.unwrap_or(0), max_length: schema.max_length };
    if let Some(max) = bounds.max_length {
        if bounds.min_length > max {
            return Err(GrammarError::unsupported(format!(
                "minLength {} exceeds maxLength {max}",
                bounds.min_length
            )));
        }
    }
    Ok(Terminal::String(bounds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lowered(v: serde_json::Value) -> (JsonSchema, Result<Lowered>) {
        let schema = JsonSchema::from_value(v).unwrap();
        let out = lower_schema(&schema, None, ScopeState::default());
        (schema, out)
    }

    fn root_node(v: serde_json::Value) -> Node {
        let (_schema, out) = lowered(v);
        let out = out.unwrap();
        out.arena.get(out.root).clone()
    }

    #[test]
    fn precedence_ref_before_type() {
        let node = root_node(json!({
            "$defs": {"a": {"type": "null"}},
            "$ref": "#/$defs/a",
            "type": "string"
        }));
        assert!(matches!(node, Node::Reference(RefNode { ref def_name, target: Some(_) }) if def_name == "a"));
    }

    #[test]
    fn const_wins_over_enum_and_type() {
        let node = root_node(json!({"const": 3, "enum": [1, 2], "type": "string"}));
        assert!(matches!(node, Node::Terminal(Terminal::NumberLiteral(_))));
    }

    #[test]
    fn missing_type_accepts_any_json() {
        assert_eq!(root_node(json!({})), Node::AnyJson(ScopeState::default()));
    }

    #[test]
    fn type_list_becomes_union() {
        match root_node(json!({"type": ["string", "null"]})) {
            Node::Union(branches) => assert_eq!(branches.len(), 2),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn object_values_descend_one_level() {
        let (_schema, out) = lowered(json!({
            "type": "object",
            "properties": {"a": {"type": "array", "items": {"type": "string"}}, "b": {"type": "string"}},
            "required": ["a"]
        }));
        let out = out.unwrap();
        let Node::Object(object) = out.arena.get(out.root) else { panic!("not an object") };
        assert_eq!(object.scope.nesting_depth, 0);
        assert!(object.properties[0].required);
        assert!(!object.properties[1].required);
        let Node::Array(array) = out.arena.get(object.properties[0].value) else { panic!("not an array") };
        assert_eq!(array.scope.nesting_depth, 1);
    }

    #[test]
    fn max_items_below_prefix_is_clamped() {
        match root_node(json!({
            "type": "array",
            "prefixItems": [{"type": "string"}, {"type": "number"}],
            "maxItems": 1
        })) {
            Node::Array(array) => {
                assert_eq!(array.min_items, 2);
                assert_eq!(array.max_items, Some(2));
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn recursive_def_shares_one_reference_node() {
        let (_schema, out) = lowered(json!({
            "$defs": {"node": {
                "type": "object",
                "properties": {"next": {"anyOf": [{"$ref": "#/$defs/node"}, {"type": "null"}]}}
            }},
            "$ref": "#/$defs/node"
        }));
        let out = out.unwrap();
        let refs = out.arena.iter().filter(|(_, node)| matches!(node, Node::Reference(_))).count();
        assert_eq!(refs, 1);
    }

    #[test]
    fn rejects_bad_schemas() {
        let cases = [
            json!({"enum": []}),
            json!({"oneOf": [{"type": "null"}], "anyOf": [{"type": "null"}]}),
            json!({"type": "array", "minItems": 3, "maxItems": 2}),
            json!({"type": "string", "minLength": 3, "maxLength": 2}),
            json!({"type": "object", "properties": {}, "required": ["x"]}),
            json!({"$defs": {"a": {"$ref": "#/$defs/a"}}, "$ref": "#/$defs/a"}),
            json!({"$defs": {"a": {"$ref": "#/$defs/b"}, "b": {"$ref": "#/$defs/a"}}, "$ref": "#/$defs/a"}),
            json!({"$defs": {"a": {"anyOf": [{"$ref": "#/$defs/a"}, {"type": "null"}]}}, "$ref": "#/$defs/a"}),
            json!({
                "$defs": {
                    "a": {"oneOf": [{"type": "string"}, {"$ref": "#/$defs/b"}]},
                    "b": {"type": ["null", "integer"], "anyOf": [{"$ref": "#/$defs/a"}, {"type": "boolean"}]}
                },
                "$ref": "#/$defs/a"
            }),
        ];
        for case in cases {
            let (_schema, out) = lowered(case.clone());
            assert!(
                matches!(out, Err(GrammarError::UnsupportedSchemaConstruct(_))),
                "accepted {case}"
            );
        }
    }

    #[test]
    fn unknown_ref_is_unresolved() {
        let (_schema, out) = lowered(json!({"$ref": "#/$defs/missing"}));
        assert!(matches!(out, Err(GrammarError::UnresolvedReference { .. })));
    }

    #[test]
    fn recursion_through_structure_is_accepted() {
        let (_schema, out) = lowered(json!({
            "$defs": {"a": {"anyOf": [
                {"type": "array", "items": {"$ref": "#/$defs/a"}},
                {"type": "null"}
            ]}},
            "$ref": "#/$defs/a"
        }));
        assert!(out.is_ok());
    }

    #[test]
    fn same_text_defs_under_different_siblings_stay_apart() {
        let (_schema, out) = lowered(json!({
            "type": "object",
            "properties": {
                "x": {"$defs": {"t": {"$ref": "#/$defs/u"}, "u": {"type": "string"}}, "$ref": "#/$defs/t"},
                "y": {"$defs": {"t": {"$ref": "#/$defs/u"}, "u": {"type": "number"}}, "$ref": "#/$defs/t"}
            }
        }));
        let out = out.unwrap();
        let Node::Object(object) = out.arena.get(out.root) else { panic!("not an object") };
        let x = object.properties[0].value;
        let y = object.properties[1].value;
        assert_ne!(x, y);

        let leaf = |mut id: NodeId| loop {
            match out.arena.get(id) {
                Node::Reference(RefNode { target: Some(target), .. }) => id = *target,
                other => break other.clone(),
            }
        };
        assert_eq!(leaf(x), Node::Terminal(Terminal::String(StringBounds::UNBOUNDED)));
        assert_eq!(leaf(y), Node::Terminal(Terminal::Number { fractional: true }));
    }

    #[test]
    fn nested_def_sees_its_declaring_siblings() {
        let (_schema, out) = lowered(json!({
            "$defs": {
                "outer": {
                    "$defs": {"inner": {"type": "boolean"}, "uses": {"$ref": "#/$defs/inner"}},
                    "$ref": "#/$defs/uses"
                }
            },
            "type": "array",
            "items": {"$ref": "#/$defs/outer"}
        }));
        assert!(out.is_ok());
    }
}
