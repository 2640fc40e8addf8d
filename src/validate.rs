//! Static template checks.
//!
//! Catches mistakes that would otherwise only surface when a render hits the
//! offending branch: missing directives, malformed expressions and
//! identifiers that nothing binds.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::compiler::{
    DIRECTIVE_AS, DIRECTIVE_CONDITION, DIRECTIVE_INDEX, DIRECTIVE_ITEMS, DIRECTIVE_KEY, QUAKE_EACH,
    QUAKE_IF,
};
use crate::error::{ERR_EXPRESSION, ERR_MISSING_DIRECTIVE};
use crate::expression::{inner_expression, referenced_identifiers, EXPRESSION_GLOBALS, INTERPOLATION_RE};
use crate::node::{RawElement, RawNode, Template};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
    /// Element the problem was found on, if any.
    pub tag_name: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag_name {
            Some(tag) => write!(f, "[{}] <{}>: {}", self.code, tag, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

/// Checks every node of `template`. `known` holds the identifiers the
/// component provides (scope keys, bindings and inputs).
pub fn validate_template(template: &Template, known: &HashSet<String>) -> Vec<Diagnostic> {
    let mut validator = Validator {
        known,
        bound: Vec::new(),
        diagnostics: Vec::new(),
    };
    validator.nodes(template.nodes(), None);
    validator.diagnostics
}

struct Validator<'a> {
    known: &'a HashSet<String>,
    /// Names bound by enclosing `*as` / `*index`, innermost last.
    bound: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl Validator<'_> {
    fn nodes(&mut self, nodes: &[RawNode], parent_tag: Option<&str>) {
        for node in nodes {
            match node {
                RawNode::Element(element) => self.element(element),
                RawNode::Text { content } => {
                    for m in INTERPOLATION_RE.find_iter(content) {
                        self.expression(m.as_str(), parent_tag);
                    }
                }
                RawNode::Comment { .. } => {}
            }
        }
    }

    fn element(&mut self, element: &RawElement) {
        let tag = element.tag_name.as_str();
        match tag {
            QUAKE_IF => {
                match element.attribute(DIRECTIVE_CONDITION) {
                    Some(condition) => self.expression(condition, Some(tag)),
                    None => self.missing(tag, DIRECTIVE_CONDITION),
                }
                self.nodes(&element.children, Some(tag));
            }
            QUAKE_EACH => {
                match element.attribute(DIRECTIVE_ITEMS) {
                    Some(items) => self.expression(items, Some(tag)),
                    None => self.missing(tag, DIRECTIVE_ITEMS),
                }

                let depth = self.bound.len();
                for directive in [DIRECTIVE_AS, DIRECTIVE_INDEX] {
                    if let Some(name) = element.attribute(directive).filter(|n| !n.is_empty()) {
                        self.bound.push(name.to_string());
                    }
                }

                match element.attribute(DIRECTIVE_KEY) {
                    Some(key) => self.expression(key, Some(tag)),
                    None => self.missing(tag, DIRECTIVE_KEY),
                }
                self.nodes(&element.children, Some(tag));
                self.bound.truncate(depth);
            }
            _ => {
                for attribute in &element.attributes {
                    self.expression(attribute.value_str(), Some(tag));
                }
                self.nodes(&element.children, Some(tag));
            }
        }
    }

    fn missing(&mut self, tag: &str, directive: &str) {
        self.diagnostics.push(Diagnostic {
            code: ERR_MISSING_DIRECTIVE,
            message: format!("missing required {} directive", directive),
            tag_name: Some(tag.to_string()),
        });
    }

    fn expression(&mut self, raw: &str, tag: Option<&str>) {
        let Some(code) = inner_expression(raw) else {
            return;
        };

        match referenced_identifiers(code) {
            Ok(names) => {
                for name in names {
                    if self.is_resolvable(&name) {
                        continue;
                    }
                    self.diagnostics.push(Diagnostic {
                        code: ERR_EXPRESSION,
                        message: format!("'{}' references unknown identifier '{}'", raw, name),
                        tag_name: tag.map(str::to_string),
                    });
                }
            }
            Err(e) => self.diagnostics.push(Diagnostic {
                code: ERR_EXPRESSION,
                message: format!("'{}': {}", raw, e),
                tag_name: tag.map(str::to_string),
            }),
        }
    }

    fn is_resolvable(&self, name: &str) -> bool {
        self.known.contains(name)
            || EXPRESSION_GLOBALS.contains(name)
            || self.bound.iter().any(|b| b == name)
    }
}
