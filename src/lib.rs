//! # Quake
//!
//! A minimal reactive UI component framework.
//!
//! A component pairs a markup template with at most one reactive [`Scope`].
//! Every effective write to the scope recompiles the template against the
//! scope state, materializes the result through a [`HostBackend`] and replaces
//! the host element's children wholesale. There is no diffing.
//!
//! ## Pipeline
//!
//! 1. **Parse**: markup → [`Template`] (raw node tree, html5ever).
//! 2. **Compile**: template + context → [`RenderTree`]. `{{ … }}` expressions
//!    are evaluated, `quake-if` branches kept or elided, `quake-each` bodies
//!    cloned per item.
//! 3. **Materialize**: render tree → host nodes inside a fresh fragment.
//! 4. **Replace**: the fragment becomes the host's only content.
//!
//! ## Directives
//!
//! | Tag          | Directives                                   |
//! |--------------|----------------------------------------------|
//! | `quake-if`   | `*condition`                                 |
//! | `quake-each` | `*items`, `*key`, `*as` (opt), `*index` (opt)|
//!
//! Each repetition instance carries a single `quake-key` attribute.
//!
//! ## Expressions
//!
//! Expressions are parsed with oxc and interpreted over the context; nothing
//! is executed. Assignments, functions and `new` are rejected.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod app;
mod backend;
mod compiler;
mod component;
mod discovery;
mod error;
mod expression;
mod materialize;
mod node;
mod options;
mod parse;
mod scope;
mod validate;
mod value;

#[cfg(test)]
mod compiler_tests;
#[cfg(test)]
mod expression_tests;

pub use app::{AppHandle, QuakeApp, QuakeInit};
pub use backend::{HostBackend, NodeRef, SharedBackend, VirtualDom, VirtualNodeKind};
pub use compiler::{
    compile, is_structural_tag, DIRECTIVE_AS, DIRECTIVE_CONDITION, DIRECTIVE_INDEX,
    DIRECTIVE_ITEMS, DIRECTIVE_KEY, QUAKE_EACH, QUAKE_IF, QUAKE_KEY_ATTRIBUTE,
};
pub use component::{
    mount, Component, ComponentDefinition, Declarations, MountedComponent, Output, Registry,
};
pub use discovery::{discover_templates, discover_templates_with, template_tag, DiscoveredTemplate};
pub use error::*;
pub use expression::{
    evaluate, evaluate_expression, inner_expression, interpolate, is_interpolation,
    referenced_identifiers,
};
pub use materialize::{materialize, MaterializedTree};
pub use node::{
    CommentNode, ComponentNode, NodeId, RawAttribute, RawElement, RawNode, RenderNode, RenderTree,
    Template, TextNode,
};
pub use options::QuakeOptions;
pub use parse::{parse_template, ParseOptions};
pub use scope::Scope;
pub use validate::{validate_template, Diagnostic};
pub use value::{Context, Value};

/// Compiles and materializes `template` into an in-memory DOM and returns the
/// resulting HTML.
pub fn render_to_string(template: &Template, context: Context) -> Result<String> {
    let tree = compile("quake-root", template, context)?;
    let mut dom = VirtualDom::new();
    let materialized = materialize(tree, &mut dom);
    Ok(dom.to_html(materialized.fragment))
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE BINDING
// ═══════════════════════════════════════════════════════════════════════════════

/// Renders a template string against a JSON object context.
#[cfg(feature = "napi")]
#[napi]
pub fn render_template_native(template: String, context_json: String) -> napi::Result<String> {
    let to_napi = |e: QuakeError| napi::Error::from_reason(format!("[{}] {}", e.code(), e));

    let context: Context = serde_json::from_str(&context_json)
        .map_err(QuakeError::from)
        .map_err(to_napi)?;
    let template = Template::parse(&template).map_err(to_napi)?;
    render_to_string(&template, context).map_err(to_napi)
}
