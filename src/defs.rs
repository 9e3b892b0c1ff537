//! `$defs` bookkeeping for one compilation.
//!
//! A def is identified by its name plus the address of its schema fragment,
//! so two defs with equal text declared next to different siblings stay
//! apart. The registry remembers which defs were visible where it was declared. A `$ref`
//! inside a nested def can therefore still reach the siblings declared next to
//! it, no matter where the reference to that def came from.
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::schema::{JsonSchema, SchemaMap};

/// Defs visible at one point of the schema, borrowed from the document.
pub type DefsMap<'s> = IndexMap<&'s str, &'s JsonSchema>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefKey {
    pub name: String,
    /// Address of the def inside the borrowed document; stable for as long
    /// as the document is borrowed.
    pub address: usize,
}

impl DefKey {
    pub fn new(name: &str, def: &JsonSchema) -> Self {
        Self { name: name.to_string(), address: std::ptr::from_ref(def) as usize }
    }
}

#[derive(Debug, Default)]
pub struct DefsRegistry<'s> {
    scopes: HashMap<DefKey, Rc<DefsMap<'s>>>,
}

impl<'s> DefsRegistry<'s> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `defs` as the enclosing set of every def it contains.
    /// The first registration of a key wins.
    pub fn register_defs(&mut self, defs: &Rc<DefsMap<'s>>) {
        for (name, def) in defs.iter() {
            self.scopes.entry(DefKey::new(name, def)).or_insert_with(|| Rc::clone(defs));
        }
    }

    pub fn enclosing_defs(&self, key: &DefKey) -> Option<&Rc<DefsMap<'s>>> {
        self.scopes.get(key)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// Borrowed view of a schema's own `$defs`.
pub fn defs_of(map: Option<&SchemaMap>) -> DefsMap<'_> {
    map.map(|m| m.iter().map(|(k, v)| (k.as_str(), v)).collect())
        .unwrap_or_default()
}

/// Merge `current` over `parent`; inner names shadow outer ones. An empty
/// `current` hands back `parent` itself rather than a copy.
pub fn join_defs<'s>(parent: &Rc<DefsMap<'s>>, current: &DefsMap<'s>) -> Rc<DefsMap<'s>> {
    if current.is_empty() {
        return Rc::clone(parent);
    }
    let mut joined = (**parent).clone();
    for (name, def) in current {
        joined.insert(name, def);
    }
    Rc::new(joined)
}

/// Defs visible inside a referenced def: the reference site's defs with the
/// def's declaring scope layered on top.
pub fn join_scopes<'s>(site: &Rc<DefsMap<'s>>, declared: &Rc<DefsMap<'s>>) -> Rc<DefsMap<'s>> {
    if Rc::ptr_eq(site, declared) {
        return Rc::clone(site);
    }
    join_defs(site, declared)
}
