//! Host rendering backend.
//!
//! The materializer only describes which structure to build; a [`HostBackend`]
//! creates the actual nodes. [`VirtualDom`] is the in-memory implementation
//! used for tests and server-side string rendering.

use lazy_static::lazy_static;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;

/// Opaque handle to a node owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(pub u64);

pub trait HostBackend {
    fn create_element(&mut self, tag: &str) -> NodeRef;
    fn create_text(&mut self, content: &str) -> NodeRef;
    fn create_comment(&mut self, content: &str) -> NodeRef;
    fn create_fragment(&mut self) -> NodeRef;
    /// Appending a fragment moves its children into `parent`.
    fn append_child(&mut self, parent: NodeRef, child: NodeRef);
    fn set_attribute(&mut self, element: NodeRef, key: &str, value: &str);
    /// Replaces every child of `host` with the children of `fragment`.
    fn replace_children(&mut self, host: NodeRef, fragment: NodeRef);
    /// Drops a node that will never be attached, along with its subtree.
    fn discard(&mut self, node: NodeRef);
}

pub type SharedBackend = Rc<RefCell<dyn HostBackend>>;

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY BACKEND
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref VOID_ELEMENTS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for tag in [
            "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta",
            "source", "track", "wbr",
        ] {
            s.insert(tag);
        }
        s
    };
}

#[derive(Debug, Clone, PartialEq)]
pub enum VirtualNodeKind {
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
    },
    Text(String),
    Comment(String),
    Fragment,
}

#[derive(Debug, Clone)]
struct VirtualNode {
    kind: VirtualNodeKind,
    children: Vec<NodeRef>,
    parent: Option<NodeRef>,
}

/// Arena of host nodes. Ids are never reused, so a handle from an earlier
/// render can never alias a node of a later one.
#[derive(Debug, Default)]
pub struct VirtualDom {
    nodes: HashMap<NodeRef, VirtualNode>,
    next_id: u64,
}

impl VirtualDom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Rc<RefCell<VirtualDom>> {
        Rc::new(RefCell::new(Self::new()))
    }

    fn insert(&mut self, kind: VirtualNodeKind) -> NodeRef {
        let id = NodeRef(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            VirtualNode {
                kind,
                children: Vec::new(),
                parent: None,
            },
        );
        id
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn kind(&self, node: NodeRef) -> Option<&VirtualNodeKind> {
        self.nodes.get(&node).map(|n| &n.kind)
    }

    pub fn children(&self, node: NodeRef) -> &[NodeRef] {
        self.nodes
            .get(&node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn attribute(&self, node: NodeRef, key: &str) -> Option<&str> {
        match self.kind(node)? {
            VirtualNodeKind::Element { attributes, .. } => {
                attributes.get(key).map(String::as_str)
            }
            _ => None,
        }
    }

    pub fn tag(&self, node: NodeRef) -> Option<&str> {
        match self.kind(node)? {
            VirtualNodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self, node: NodeRef) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeRef, out: &mut String) {
        if let Some(VirtualNodeKind::Text(text)) = self.kind(node) {
            out.push_str(text);
        }
        for child in self.children(node) {
            self.collect_text(*child, out);
        }
    }

    /// Descendant elements with the given tag, in document order.
    pub fn find_by_tag(&self, root: NodeRef, tag: &str) -> Vec<NodeRef> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeRef> = self.children(root).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if self.tag(node) == Some(tag) {
                found.push(node);
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        found
    }

    /// Serializes the children of `node` as HTML.
    pub fn inner_html(&self, node: NodeRef) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_html(*child, &mut out);
        }
        out
    }

    /// Serializes `node` itself as HTML. Fragments render their children.
    pub fn to_html(&self, node: NodeRef) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, node: NodeRef, out: &mut String) {
        let Some(kind) = self.kind(node) else {
            return;
        };
        match kind {
            VirtualNodeKind::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in attributes {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape_html(value, true));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(tag.as_str()) {
                    return;
                }
                for child in self.children(node) {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            VirtualNodeKind::Text(text) => out.push_str(&escape_html(text, false)),
            VirtualNodeKind::Comment(content) => {
                out.push_str("<!--");
                out.push_str(content);
                out.push_str("-->");
            }
            VirtualNodeKind::Fragment => {
                for child in self.children(node) {
                    self.write_html(*child, out);
                }
            }
        }
    }

    fn detach(&mut self, child: NodeRef) {
        if let Some(parent) = self.nodes.get_mut(&child).and_then(|n| n.parent.take()) {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|c| *c != child);
            }
        }
    }

    /// Drops `node` and its whole subtree from the arena.
    fn release(&mut self, node: NodeRef) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(removed) = self.nodes.remove(&current) {
                stack.extend(removed.children);
            }
        }
    }
}

impl HostBackend for VirtualDom {
    fn create_element(&mut self, tag: &str) -> NodeRef {
        self.insert(VirtualNodeKind::Element {
            tag: tag.to_string(),
            attributes: IndexMap::new(),
        })
    }

    fn create_text(&mut self, content: &str) -> NodeRef {
        self.insert(VirtualNodeKind::Text(content.to_string()))
    }

    fn create_comment(&mut self, content: &str) -> NodeRef {
        self.insert(VirtualNodeKind::Comment(content.to_string()))
    }

    fn create_fragment(&mut self) -> NodeRef {
        self.insert(VirtualNodeKind::Fragment)
    }

    fn append_child(&mut self, parent: NodeRef, child: NodeRef) {
        if !self.contains(parent) || !self.contains(child) || parent == child {
            return;
        }

        if matches!(self.kind(child), Some(VirtualNodeKind::Fragment)) {
            let moved = self
                .nodes
                .get_mut(&child)
                .map(|n| std::mem::take(&mut n.children))
                .unwrap_or_default();
            for grandchild in moved {
                if let Some(node) = self.nodes.get_mut(&grandchild) {
                    node.parent = Some(parent);
                }
                if let Some(node) = self.nodes.get_mut(&parent) {
                    node.children.push(grandchild);
                }
            }
            // an emptied fragment is never referenced by the tree again
            self.nodes.remove(&child);
            return;
        }

        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
    }

    fn set_attribute(&mut self, element: NodeRef, key: &str, value: &str) {
        if let Some(VirtualNode {
            kind: VirtualNodeKind::Element { attributes, .. },
            ..
        }) = self.nodes.get_mut(&element)
        {
            attributes.insert(key.to_string(), value.to_string());
        }
    }

    fn replace_children(&mut self, host: NodeRef, fragment: NodeRef) {
        if !self.contains(host) {
            return;
        }
        let old = self
            .nodes
            .get_mut(&host)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in old {
            self.release(child);
        }
        self.append_child(host, fragment);
    }

    fn discard(&mut self, node: NodeRef) {
        self.detach(node);
        self.release(node);
    }
}

fn escape_html(value: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
