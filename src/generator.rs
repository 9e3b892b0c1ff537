//! Turns a node arena into GBNF text.
//!
//! Rules are content-addressed: before a body gets a new name the generator
//! checks whether the exact same text was already registered, and reuses that
//! rule if so. Names are handed out in resolution order, which depends only on
//! the arena, so the same schema always yields byte-identical output.
mod composite;

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{GrammarError, Result};
use crate::gbnf::{NO_VALUE, alternation, distinct_alternatives, sequence};
use crate::ir::{Node, NodeArena, NodeId, RefNode};
use crate::scope::ScopeState;
use crate::terminals::{ResolveTerminal, Terminal, reserved};

pub const ROOT_RULE: &str = "root";

#[derive(Debug, Clone)]
enum Resolution {
    Pending,
    /// A def whose body is being resolved. Reaching it again means the def
    /// is recursive and must keep its reserved name.
    InProgress { name: String, referenced: bool },
    Done(String),
}

pub struct GrammarGenerator<'a> {
    arena: &'a NodeArena,
    /// name -> body, in the order names were assigned
    rules: IndexMap<String, String>,
    rule_by_body: HashMap<String, String>,
    resolved: Vec<Resolution>,
    taken_def_names: HashSet<String>,
    next_rule_id: usize,
    root_body: Option<String>,
}

impl<'a> GrammarGenerator<'a> {
    pub fn new(arena: &'a NodeArena) -> Self {
        Self {
            arena,
            rules: IndexMap::new(),
            rule_by_body: HashMap::new(),
            resolved: vec![Resolution::Pending; arena.len()],
            taken_def_names: HashSet::new(),
            next_rule_id: 0,
            root_body: None,
        }
    }

    /// Render `root` as the body of the root rule, registering every rule it
    /// depends on.
    pub fn emit(&mut self, root: NodeId) -> Result<()> {
        let body = self.render(root)?;
        debug!(rules = self.rules.len(), "generated grammar rules");
        self.root_body = Some(body);
        Ok(())
    }

    /// The grammar text: the root rule first, then every other rule in the
    /// order it was named. The root may be followed by up to
    /// `trailing_new_lines` newlines.
    pub fn into_string(self, trailing_new_lines: usize) -> String {
        let root_body = self.root_body.unwrap_or_else(|| NO_VALUE.to_string());
        let padding = vec![r"[\n]?"; trailing_new_lines].join(" ");
        let mut lines = Vec::with_capacity(self.rules.len() + 1);
        lines.push(format!("{ROOT_RULE} ::= {}", sequence(&[root_body, padding])));
        for (name, body) in &self.rules {
            lines.push(format!("{name} ::= {body}"));
        }
        lines.join("\n")
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// A reference to `id`: a rule name, or inline text for literals.
    pub fn resolve(&mut self, id: NodeId) -> Result<String> {
        match &mut self.resolved[id.index()] {
            Resolution::Done(name) => return Ok(name.clone()),
            Resolution::InProgress { name, referenced } => {
                *referenced = true;
                return Ok(name.clone());
            }
            Resolution::Pending => {}
        }

        let arena = self.arena;
        let resolved = match arena.get(id) {
            Node::Terminal(terminal) => self.resolve_terminal(terminal),
            Node::Reference(reference) => self.resolve_reference(id, reference)?,
            Node::AnyJson(scope) => self.resolve_any_json(*scope),
            Node::Enum(members) | Node::Union(members) => {
                let alternatives = self.resolve_all(members)?;
                let body = alternation(&alternatives);
                if distinct_alternatives(&alternatives).len() < 2 {
                    body
                } else {
                    self.intern(body, None)
                }
            }
            Node::Array(_) | Node::Object(_) => {
                let body = self.render(id)?;
                self.intern(body, None)
            }
        };
        self.resolved[id.index()] = Resolution::Done(resolved.clone());
        Ok(resolved)
    }

    /// The grammar body of `id` itself, without registering it as a rule.
    /// Nodes that have no body of their own resolve to their rule name.
    pub fn render(&mut self, id: NodeId) -> Result<String> {
        let arena = self.arena;
        match arena.get(id) {
            Node::Terminal(terminal) => Ok(terminal.grammar(self)),
            Node::Enum(members) | Node::Union(members) => {
                let alternatives = self.resolve_all(members)?;
                Ok(alternation(&alternatives))
            }
            Node::Array(array) => composite::array_node(self, array),
            Node::Object(object) => composite::object_node(self, object),
            Node::Reference(_) | Node::AnyJson(_) => self.resolve(id),
        }
    }

    fn resolve_all(&mut self, ids: &[NodeId]) -> Result<Vec<String>> {
        ids.iter().map(|id| self.resolve(*id)).collect()
    }

    /// Register `body` under `preferred` (or a fresh `ruleN`) unless an
    /// identical body is already registered. Bodies that are already a rule
    /// name, or match nothing but the empty string, are returned unchanged.
    pub fn intern(&mut self, body: String, preferred: Option<String>) -> String {
        if body == NO_VALUE || self.rules.contains_key(&body) || self.taken_def_names.contains(&body) {
            return body;
        }
        if let Some(existing) = self.rule_by_body.get(&body) {
            return existing.clone();
        }
        let name = preferred.unwrap_or_else(|| self.fresh_rule_name());
        self.rule_by_body.insert(body.clone(), name.clone());
        self.rules.insert(name.clone(), body);
        name
    }

    fn fresh_rule_name(&mut self) -> String {
        let name = format!("rule{}", self.next_rule_id);
        self.next_rule_id += 1;
        name
    }

    /// `def-<name>`, with a numeric suffix when another def already took it.
    fn def_rule_name(&mut self, def_name: &str) -> String {
        let base: String = def_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        let base = format!("def-{base}");
        let mut name = base.clone();
        let mut suffix = 2;
        while self.taken_def_names.contains(&name) || self.rules.contains_key(&name) {
            name = format!("{base}-{suffix}");
            suffix += 1;
        }
        self.taken_def_names.insert(name.clone());
        name
    }

    fn resolve_reference(&mut self, id: NodeId, reference: &RefNode) -> Result<String> {
        let target = reference.target.ok_or_else(|| GrammarError::UnresolvedReference {
            reference: reference.def_name.clone(),
        })?;
        let name = self.def_rule_name(&reference.def_name);
        self.resolved[id.index()] = Resolution::InProgress { name: name.clone(), referenced: false };

        let arena = self.arena;
        let inline_target = matches!(
            arena.get(target),
            Node::Object(_) | Node::Array(_) | Node::Enum(_) | Node::Union(_)
        );
        let body = if inline_target { self.render(target)? } else { self.resolve(target)? };

        let recursive = matches!(
            &self.resolved[id.index()],
            Resolution::InProgress { referenced: true, .. }
        );
        let resolved = if recursive {
            debug!(def = %reference.def_name, rule = %name, "recursive def");
            let body = self.alias_body(body);
            self.rule_by_body.insert(body.clone(), name.clone());
            self.rules.insert(name.clone(), body);
            name
        } else {
            self.intern(body, Some(name))
        };
        if inline_target {
            self.resolved[target.index()] = Resolution::Done(resolved.clone());
        }
        Ok(resolved)
    }

    /// Body for a rule that must keep its own name. When `body` is already
    /// registered elsewhere the rule becomes an alias of that rule instead,
    /// following earlier aliases so no two rules share a body.
    fn alias_body(&self, mut body: String) -> String {
        for _ in 0..=self.rules.len() {
            match self.rule_by_body.get(&body) {
                Some(existing) if *existing != body => body = existing.clone(),
                _ => break,
            }
        }
        body
    }

    fn resolve_any_json(&mut self, scope: ScopeState) -> String {
        let name = if scope.allow_new_lines() {
            reserved::any_json(scope.nesting_depth, scope.pad_spaces())
        } else {
            reserved::ANY_JSON_NO_NEW_LINES.to_string()
        };
        if self.rules.contains_key(&name) {
            return name;
        }
        // Values nested in free-form JSON stay on one line. The single-line
        // rule nests itself.
        let nested = if scope.allow_new_lines() {
            self.resolve_any_json(scope.without_new_lines())
        } else {
            name.clone()
        };
        let body = composite::any_json(self, scope, &nested);
        self.intern(body, Some(name))
    }
}

impl ResolveTerminal for GrammarGenerator<'_> {
    fn resolve_terminal(&mut self, terminal: &Terminal) -> String {
        let Some(name) = terminal.reserved_rule_name() else {
            return terminal.grammar(self);
        };
        if self.rules.contains_key(&name) {
            return name;
        }
        let body = terminal.grammar(self);
        self.intern(body, Some(name))
    }
}
