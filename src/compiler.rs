//! Template Tree Compiler
//!
//! Expands a [`Template`] against a context into a fully resolved
//! [`RenderTree`]: text is interpolated, attributes are evaluated,
//! `quake-if` branches are kept or elided and `quake-each` bodies are cloned
//! once per item. Expansion runs breadth-first from the root with a work queue
//! of component nodes, each paired with the raw children it still has to
//! expand.
//!
//! The template is never mutated. Every call returns brand new nodes, so no
//! node or context is shared between two render passes.

use indexmap::IndexMap;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::debug;

use crate::error::{QuakeError, Result};
use crate::expression::{evaluate, interpolate};
use crate::node::{
    CommentNode, ComponentNode, NodeId, RawAttribute, RawElement, RawNode, RenderNode, RenderTree,
    Template, TextNode,
};
use crate::value::{Context, Value};

// ═══════════════════════════════════════════════════════════════════════════════
// DIRECTIVE VOCABULARY
// ═══════════════════════════════════════════════════════════════════════════════

pub const QUAKE_IF: &str = "quake-if";
pub const QUAKE_EACH: &str = "quake-each";

pub const DIRECTIVE_CONDITION: &str = "*condition";
pub const DIRECTIVE_ITEMS: &str = "*items";
pub const DIRECTIVE_KEY: &str = "*key";
pub const DIRECTIVE_AS: &str = "*as";
pub const DIRECTIVE_INDEX: &str = "*index";

/// Attribute carried by every repetition instance.
pub const QUAKE_KEY_ATTRIBUTE: &str = "quake-key";

/// Tags that expand structurally and never reach the host as elements.
pub fn is_structural_tag(tag: &str) -> bool {
    tag == QUAKE_IF || tag == QUAKE_EACH
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiles `template` under a root component node named `tag`.
///
/// Any failure aborts the whole pass; no partial tree is returned.
pub fn compile(tag: &str, template: &Template, context: Context) -> Result<RenderTree> {
    let mut tree = RenderTree::with_root(ComponentNode {
        tag_name: tag.to_string(),
        attributes: IndexMap::new(),
        children: Vec::new(),
        context: Rc::new(context),
        from_repetition: false,
        reference: None,
    });

    let mut queue: VecDeque<(NodeId, &[RawNode])> = VecDeque::new();
    queue.push_back((tree.root(), template.nodes()));

    while let Some((id, raw_children)) = queue.pop_front() {
        let (parent_context, parent_repeated) = match tree.node(id) {
            RenderNode::Component(node) => (node.context.clone(), node.from_repetition),
            _ => continue,
        };

        let mut pass = Expansion {
            tree: &mut tree,
            queue: &mut queue,
            parent_context,
            parent_repeated,
            produced: Vec::with_capacity(raw_children.len()),
        };

        for raw in raw_children {
            match raw {
                RawNode::Comment { content } => pass.push_comment(content),
                RawNode::Text { content } => pass.push_text(content)?,
                RawNode::Element(element) => pass.expand_element(element)?,
            }
        }

        let produced = pass.produced;
        if let RenderNode::Component(node) = tree.node_mut(id) {
            node.children = produced;
        }
    }

    debug!(tag, nodes = tree.len(), "compiled template");
    Ok(tree)
}

/// Expansion of the raw children of one dequeued component node.
struct Expansion<'t, 'q, 'r> {
    tree: &'t mut RenderTree,
    queue: &'q mut VecDeque<(NodeId, &'r [RawNode])>,
    parent_context: Rc<Context>,
    parent_repeated: bool,
    produced: Vec<NodeId>,
}

impl<'r> Expansion<'_, '_, 'r> {
    /// Context handed to a child. Children of repetition instances get their
    /// own copy so sibling instances never alias.
    fn inherited_context(&self) -> Rc<Context> {
        if self.parent_repeated {
            Rc::new((*self.parent_context).clone())
        } else {
            Rc::clone(&self.parent_context)
        }
    }

    fn push_comment(&mut self, content: &str) {
        let id = self.tree.push(RenderNode::Comment(CommentNode {
            content: content.to_string(),
            reference: None,
        }));
        self.produced.push(id);
    }

    fn push_text(&mut self, raw: &str) -> Result<()> {
        let context = self.inherited_context();
        let content = interpolate(raw, &context)?;
        let id = self.tree.push(RenderNode::Text(TextNode {
            content,
            context,
            from_repetition: self.parent_repeated,
            reference: None,
        }));
        self.produced.push(id);
        Ok(())
    }

    /// Appends a component node and schedules its raw children.
    fn push_component(
        &mut self,
        element: &'r RawElement,
        attributes: IndexMap<String, Value>,
        context: Rc<Context>,
        from_repetition: bool,
    ) {
        let id = self.tree.push(RenderNode::Component(ComponentNode {
            tag_name: element.tag_name.clone(),
            attributes,
            children: Vec::new(),
            context,
            from_repetition,
            reference: None,
        }));
        self.produced.push(id);
        self.queue.push_back((id, &element.children));
    }

    fn expand_element(&mut self, element: &'r RawElement) -> Result<()> {
        let context = self.inherited_context();
        let repeated = self.parent_repeated;
        let attributes = normalize_attributes(&element.attributes);

        match element.tag_name.as_str() {
            QUAKE_IF => {
                let condition = required(&attributes, &element.tag_name, DIRECTIVE_CONDITION)?;
                if evaluate_directive(condition, &context)?.is_truthy() {
                    self.push_component(element, IndexMap::new(), context, repeated);
                } else {
                    self.push_comment("");
                }
            }
            QUAKE_EACH => self.expand_each(element, &attributes, &context)?,
            _ => {
                let mut evaluated = IndexMap::with_capacity(attributes.len());
                for (key, raw) in &attributes {
                    evaluated.insert(key.clone(), evaluate_directive(raw, &context)?);
                }
                self.push_component(element, evaluated, context, repeated);
            }
        }
        Ok(())
    }

    fn expand_each(
        &mut self,
        element: &'r RawElement,
        attributes: &IndexMap<String, String>,
        context: &Context,
    ) -> Result<()> {
        let items_expr = required(attributes, &element.tag_name, DIRECTIVE_ITEMS)?;
        let key_expr = required(attributes, &element.tag_name, DIRECTIVE_KEY)?;

        let items = evaluate_directive(items_expr, context)?;
        let Some(items) = items.iter_items() else {
            return Err(QuakeError::NotIterable {
                expression: items_expr.to_string(),
                found: items.type_name(),
            });
        };

        if items.is_empty() {
            self.push_comment("");
            return Ok(());
        }

        let bind_as = attributes.get(DIRECTIVE_AS).filter(|name| !name.is_empty());
        let bind_index = attributes
            .get(DIRECTIVE_INDEX)
            .filter(|name| !name.is_empty());

        for (index, item) in items.into_iter().enumerate() {
            let mut instance_context = context.clone();
            if let Some(name) = bind_as {
                instance_context.insert(name.clone(), item);
            }
            if let Some(name) = bind_index {
                instance_context.insert(name.clone(), Value::from(index));
            }

            let key = evaluate_directive(key_expr, &instance_context)?;
            let mut instance_attributes = IndexMap::with_capacity(1);
            instance_attributes.insert(QUAKE_KEY_ATTRIBUTE.to_string(), key);

            self.push_component(element, instance_attributes, Rc::new(instance_context), true);
        }
        Ok(())
    }
}

/// Attribute list → ordered mapping. A repeated key keeps its first position
/// and its last value.
fn normalize_attributes(attributes: &[RawAttribute]) -> IndexMap<String, String> {
    let mut map = IndexMap::with_capacity(attributes.len());
    for attribute in attributes {
        map.insert(attribute.key.clone(), attribute.value_str().to_string());
    }
    map
}

fn required<'a>(
    attributes: &'a IndexMap<String, String>,
    tag: &str,
    directive: &'static str,
) -> Result<&'a str> {
    attributes
        .get(directive)
        .map(String::as_str)
        .ok_or_else(|| QuakeError::MissingDirective {
            tag: tag.to_string(),
            directive,
        })
}

fn evaluate_directive(raw: &str, context: &Context) -> Result<Value> {
    evaluate(Some(raw), context).map_err(|e| QuakeError::expression(raw, e))
}
