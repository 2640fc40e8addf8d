//! Raw template nodes and compiled render trees.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

use crate::backend::NodeRef;
use crate::error::Result;
use crate::value::{Context, Value};

// ═══════════════════════════════════════════════════════════════════════════════
// RAW TREE (parser output)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RawNode {
    Element(RawElement),
    Text { content: String },
    Comment { content: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawElement {
    pub tag_name: String,
    #[serde(default)]
    pub attributes: Vec<RawAttribute>,
    #[serde(default)]
    pub children: Vec<RawNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAttribute {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl RawAttribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn value_str(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

impl RawElement {
    /// Value of the first attribute named `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key == key)
            .map(RawAttribute::value_str)
    }
}

/// A parsed component template. Immutable once built; every compile reads it
/// and produces a brand new [`RenderTree`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    nodes: Vec<RawNode>,
}

impl Template {
    pub fn from_nodes(nodes: Vec<RawNode>) -> Self {
        Self { nodes }
    }

    /// Builds a template from a himalaya-shaped JSON array.
    pub fn from_json(json: &str) -> Result<Self> {
        let nodes: Vec<RawNode> = serde_json::from_str(json)?;
        Ok(Self { nodes })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.nodes)?)
    }

    pub fn nodes(&self) -> &[RawNode] {
        &self.nodes
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER TREE
// ═══════════════════════════════════════════════════════════════════════════════

/// Index of a node inside its [`RenderTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub enum RenderNode {
    Component(ComponentNode),
    Text(TextNode),
    Comment(CommentNode),
}

#[derive(Debug, Clone)]
pub struct ComponentNode {
    pub tag_name: String,
    pub attributes: IndexMap<String, Value>,
    pub children: Vec<NodeId>,
    pub context: Rc<Context>,
    pub from_repetition: bool,
    pub reference: Option<NodeRef>,
}

#[derive(Debug, Clone)]
pub struct TextNode {
    pub content: String,
    pub context: Rc<Context>,
    pub from_repetition: bool,
    pub reference: Option<NodeRef>,
}

#[derive(Debug, Clone)]
pub struct CommentNode {
    pub content: String,
    pub reference: Option<NodeRef>,
}

impl RenderNode {
    pub fn reference(&self) -> Option<NodeRef> {
        match self {
            RenderNode::Component(node) => node.reference,
            RenderNode::Text(node) => node.reference,
            RenderNode::Comment(node) => node.reference,
        }
    }

    /// Records the host node; later assignments are ignored.
    pub(crate) fn assign_reference(&mut self, reference: NodeRef) {
        let slot = match self {
            RenderNode::Component(node) => &mut node.reference,
            RenderNode::Text(node) => &mut node.reference,
            RenderNode::Comment(node) => &mut node.reference,
        };
        if slot.is_none() {
            *slot = Some(reference);
        }
    }

    pub fn as_component(&self) -> Option<&ComponentNode> {
        match self {
            RenderNode::Component(node) => Some(node),
            _ => None,
        }
    }
}

/// Output of one compile pass. Nodes live in an arena owned by the tree.
#[derive(Debug, Clone)]
pub struct RenderTree {
    pub(crate) nodes: Vec<RenderNode>,
    pub(crate) root: NodeId,
}

impl RenderTree {
    pub(crate) fn with_root(root: ComponentNode) -> Self {
        Self {
            nodes: vec![RenderNode::Component(root)],
            root: NodeId(0),
        }
    }

    pub(crate) fn push(&mut self, node: RenderNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_component(&self) -> Option<&ComponentNode> {
        self.node(self.root).as_component()
    }

    pub fn node(&self, id: NodeId) -> &RenderNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut RenderNode {
        &mut self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.node(id) {
            RenderNode::Component(node) => &node.children,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &RenderNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i), node))
    }
}
