//! Tree Materializer
//!
//! Turns a compiled [`RenderTree`] into host nodes through a [`HostBackend`].

use std::collections::VecDeque;
use tracing::debug;

use crate::backend::{HostBackend, NodeRef};
use crate::compiler::is_structural_tag;
use crate::node::{NodeId, RenderNode, RenderTree};

/// A render tree whose nodes carry their host references, plus the root
/// fragment holding the materialized children.
#[derive(Debug)]
pub struct MaterializedTree {
    pub tree: RenderTree,
    pub fragment: NodeRef,
}

/// Materializes `tree` into a fresh fragment.
///
/// The tree is consumed: references are assigned once, on this pass, and the
/// tree cannot be materialized again.
pub fn materialize(mut tree: RenderTree, backend: &mut dyn HostBackend) -> MaterializedTree {
    let fragment = backend.create_fragment();
    let root = tree.root();
    tree.node_mut(root).assign_reference(fragment);

    populate(&mut tree, root, backend);
    debug!(nodes = tree.len(), "materialized render tree");

    MaterializedTree { tree, fragment }
}

/// Breadth-first walk below `start`, whose reference is already set.
fn populate(tree: &mut RenderTree, start: NodeId, backend: &mut dyn HostBackend) {
    let mut queue = VecDeque::from([start]);

    while let Some(id) = queue.pop_front() {
        let Some(parent_ref) = tree.node(id).reference() else {
            continue;
        };

        let children = tree.children(id).to_vec();
        for child in children {
            let created = match tree.node(child) {
                RenderNode::Component(node) if is_structural_tag(&node.tag_name) => None,
                RenderNode::Component(node) => {
                    let element = backend.create_element(&node.tag_name);
                    for (key, value) in &node.attributes {
                        backend.set_attribute(element, key, &value.to_display_string());
                    }
                    queue.push_back(child);
                    Some(element)
                }
                RenderNode::Text(node) => Some(backend.create_text(&node.content)),
                RenderNode::Comment(node) => Some(backend.create_comment(&node.content)),
            };

            let reference = match created {
                Some(reference) => {
                    tree.node_mut(child).assign_reference(reference);
                    reference
                }
                None => {
                    // structural nodes render as an invisible nested fragment
                    let nested = backend.create_fragment();
                    tree.node_mut(child).assign_reference(nested);
                    populate(tree, child, backend);
                    nested
                }
            };

            backend.append_child(parent_ref, reference);
        }
    }
}
