//! Bodies of arrays, objects and free-form JSON.
//!
//! Whitespace after an opening bracket and between members indents one level
//! deeper than the container. Whitespace before the closing bracket uses the
//! container's own depth.
use crate::error::Result;
use crate::gbnf::{NO_VALUE, quote_literal, repetition, sequence};
use crate::ir::{ArrayNode, ObjectNode};
use crate::scope::ScopeState;
use crate::terminals::{ResolveTerminal, StringBounds, Terminal, string};

use super::GrammarGenerator;

/// One `"key": value` pair, already rendered.
struct Member {
    entry: String,
    required: bool,
}

pub(super) fn array_node(generator: &mut GrammarGenerator<'_>, node: &ArrayNode) -> Result<String> {
    let mut prefix = Vec::with_capacity(node.prefix_items.len());
    for id in &node.prefix_items {
        prefix.push(generator.resolve(*id)?);
    }
    let item = generator.resolve(node.items)?;
    Ok(array(generator, node.scope, &prefix, &item, node.min_items, node.max_items))
}

pub(super) fn object_node(generator: &mut GrammarGenerator<'_>, node: &ObjectNode) -> Result<String> {
    let mut members = Vec::with_capacity(node.properties.len());
    for property in &node.properties {
        let value = generator.resolve(property.value)?;
        members.push(Member { entry: entry(&string::literal(&property.key), &value), required: property.required });
    }
    let additional = match node.additional {
        Some(id) => {
            let key = generator.resolve_terminal(&Terminal::String(StringBounds::UNBOUNDED));
            let value = generator.resolve(id)?;
            Some(entry(&key, &value))
        }
        None => None,
    };
    Ok(object(generator, node.scope, &members, additional.as_deref()))
}

/// Alternation over every JSON kind. `nested` is the rule used for array
/// elements and object values.
pub(super) fn any_json(generator: &mut GrammarGenerator<'_>, scope: ScopeState, nested: &str) -> String {
    let string = generator.resolve_terminal(&Terminal::String(StringBounds::UNBOUNDED));
    let number = generator.resolve_terminal(&Terminal::Number { fractional: true });
    let boolean = generator.resolve_terminal(&Terminal::Boolean);
    let null = generator.resolve_terminal(&Terminal::Null);

    let array_body = array(generator, scope, &[], nested, 0, None);
    let array_rule = generator.intern(array_body, None);
    let member = entry(&string, nested);
    let object_body = object(generator, scope, &[], Some(&member));
    let object_rule = generator.intern(object_body, None);

    format!("( {} )", [string, number, boolean, null, array_rule, object_rule].join(" | "))
}

fn array(
    generator: &mut GrammarGenerator<'_>,
    scope: ScopeState,
    prefix: &[String],
    item: &str,
    min_items: u32,
    max_items: Option<u32>,
) -> String {
    let ws_inner = generator.resolve_terminal(&Terminal::Whitespace(scope.descend()));
    let ws_outer = generator.resolve_terminal(&Terminal::Whitespace(scope));
    let separator = sequence(&[quote_literal(","), ws_inner.clone()]);

    let elements = if prefix.is_empty() {
        repetition(item, Some(separator.as_str()), min_items, max_items)
    } else {
        let prefix_len = prefix.len() as u32;
        let rest = repetition(
            &sequence(&[separator.as_str(), item]),
            None,
            min_items.saturating_sub(prefix_len),
            max_items.map(|max| max.saturating_sub(prefix_len)),
        );
        sequence(&[prefix.join(format!(" {separator} ").as_str()), rest])
    };

    bracketed("[", "]", &ws_inner, &elements, &ws_outer)
}

fn object(generator: &mut GrammarGenerator<'_>, scope: ScopeState, members: &[Member], additional: Option<&str>) -> String {
    let ws_inner = generator.resolve_terminal(&Terminal::Whitespace(scope.descend()));
    let ws_outer = generator.resolve_terminal(&Terminal::Whitespace(scope));
    let separator = sequence(&[quote_literal(","), ws_inner.clone()]);
    let body = object_members(members, additional, &separator);
    bracketed("{", "}", &ws_inner, &body, &ws_outer)
}

fn bracketed(open: &str, close: &str, ws_inner: &str, body: &str, ws_outer: &str) -> String {
    if body.is_empty() || body == NO_VALUE {
        return sequence(&[quote_literal(open).as_str(), ws_outer, quote_literal(close).as_str()]);
    }
    sequence(&[quote_literal(open).as_str(), ws_inner, body, ws_outer, quote_literal(close).as_str()])
}

fn entry(key: &str, value: &str) -> String {
    sequence(&[key, r#"":""#, "[ ]?", value])
}

/// Members in declared order, then any additional entries. No combination of
/// present and absent optional members leaves a separator without a member
/// on both sides.
fn object_members(members: &[Member], additional: Option<&str>, separator: &str) -> String {
    let additional_tail = additional.map(|extra| format!("( {separator} {extra} )*"));

    if let Some(first) = members.iter().position(|m| m.required) {
        let mut parts = Vec::with_capacity(members.len() + 1);
        for member in &members[..first] {
            parts.push(format!("( {} {separator} )?", member.entry));
        }
        parts.push(members[first].entry.clone());
        for member in &members[first + 1..] {
            if member.required {
                parts.push(format!("{separator} {}", member.entry));
            } else {
                parts.push(format!("( {separator} {} )?", member.entry));
            }
        }
        parts.extend(additional_tail);
        return sequence(&parts);
    }

    // Every member is optional: pick the first one present, then each later
    // one may follow.
    let mut alternatives = Vec::with_capacity(members.len() + 1);
    for (i, member) in members.iter().enumerate() {
        let mut parts = vec![member.entry.clone()];
        for later in &members[i + 1..] {
            parts.push(format!("( {separator} {} )?", later.entry));
        }
        parts.extend(additional_tail.clone());
        alternatives.push(sequence(&parts));
    }
    if let (Some(extra), Some(tail)) = (additional, &additional_tail) {
        alternatives.push(format!("{extra} {tail}"));
    }
    if alternatives.is_empty() {
        return String::new();
    }
    format!("( {} )?", alternatives.join(" | "))
}
