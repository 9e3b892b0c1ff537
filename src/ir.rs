// Strongly-typed IR for grammar generation. No serde_json::Value here beyond
// the literal payloads held by terminals.

use crate::scope::ScopeState;
use crate::terminals::Terminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Terminal(Terminal),
    Array(ArrayNode),
    Object(ObjectNode),
    Enum(Vec<NodeId>),       // one literal terminal per member
    Union(Vec<NodeId>),      // oneOf / anyOf / type lists
    Reference(RefNode),
    AnyJson(ScopeState),     // unconstrained JSON value
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNode {
    pub prefix_items: Vec<NodeId>, // required, positional
    pub items: NodeId,             // everything after the prefix
    pub min_items: u32,            // counts the prefix too
    pub max_items: Option<u32>,
    pub scope: ScopeState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    pub properties: Vec<Property>, // declared order
    pub additional: Option<NodeId>,
    pub scope: ScopeState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: String,
    pub value: NodeId,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefNode {
    pub def_name: String,
    /// Filled in once the def body has been lowered; the body may itself
    /// point back at this node.
    pub target: Option<NodeId>,
}

/// Owns every node of one compilation. Nodes refer to each other by index, so
/// recursive defs are plain cycles of ids rather than owning pointers.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn terminal(&mut self, terminal: Terminal) -> NodeId {
        self.alloc(Node::Terminal(terminal))
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Point a reference node at its lowered def body. Only the first call
    /// for a given node has an effect.
    pub fn set_reference_target(&mut self, id: NodeId, target: NodeId) {
        if let Node::Reference(r) = &mut self.nodes[id.index()] {
            r.target.get_or_insert(target);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i as u32), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
