//! Parse Module
//!
//! Adapter from markup to the raw node tree consumed by the compiler.
//! html5ever tokenizes the markup; the tree is built straight from the token
//! stream so elements keep their source nesting. No HTML5 tree-construction
//! rules apply: nothing is foster-parented out of tables, and no implied
//! `html`, `head`, `body` or `tbody` wrappers appear.

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::Result;
use crate::expression::INTERPOLATION_RE;
use crate::node::{RawAttribute, RawElement, RawNode, Template};

lazy_static! {
    static ref EMPTY_COMMENT_RE: Regex = Regex::new(r"<!---->").unwrap();
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"__QUAKE_EXPR_(\d+)__").unwrap();

    /// Elements that never have children.
    static ref VOID_TAGS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for tag in [
            "area", "base", "br", "col", "command", "embed", "hr", "img", "input", "keygen",
            "link", "meta", "param", "source", "track", "wbr",
        ] {
            s.insert(tag);
        }
        s
    };

    /// Elements implicitly closed by an immediately following sibling of the
    /// same name, as in `<li>a<li>b`.
    static ref SIBLING_CLOSED_TAGS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for tag in [
            "p", "dt", "dd", "li", "option", "thead", "th", "tbody", "tr", "td", "tfoot",
            "colgroup",
        ] {
            s.insert(tag);
        }
        s
    };
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParseOptions {
    /// Drop text nodes that contain only whitespace.
    pub strip_whitespace: bool,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        Self::parse_with(source, &ParseOptions::default())
    }

    pub fn parse_with(source: &str, options: &ParseOptions) -> Result<Self> {
        parse_template(source, options).map(Template::from_nodes)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSION PROTECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Swaps every `{{ … }}` for a placeholder so operators such as `<` inside an
/// expression never reach the HTML tokenizer.
fn protect_interpolations(source: &str) -> (String, Vec<String>) {
    let mut expressions = Vec::new();
    let protected = INTERPOLATION_RE
        .replace_all(source, |caps: &regex::Captures| {
            expressions.push(caps[0].to_string());
            format!("__QUAKE_EXPR_{}__", expressions.len() - 1)
        })
        .into_owned();
    (protected, expressions)
}

fn restore_interpolations(text: &str, expressions: &[String]) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| expressions.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREE BUILDING
// ═══════════════════════════════════════════════════════════════════════════════

struct TreeBuilder<'a> {
    expressions: &'a [String],
    roots: Vec<RawNode>,
    /// Elements whose end tag has not been seen yet, innermost last.
    open: Vec<RawElement>,
}

impl<'a> TreeBuilder<'a> {
    fn new(expressions: &'a [String]) -> Self {
        Self {
            expressions,
            roots: Vec::new(),
            open: Vec::new(),
        }
    }

    fn siblings(&mut self) -> &mut Vec<RawNode> {
        match self.open.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.roots,
        }
    }

    /// The tokenizer may split a run of text; adjacent pieces are merged.
    fn push_text(&mut self, text: &str) {
        let siblings = self.siblings();
        if let Some(RawNode::Text { content }) = siblings.last_mut() {
            content.push_str(text);
        } else {
            siblings.push(RawNode::Text {
                content: text.to_string(),
            });
        }
    }

    fn close_innermost(&mut self) {
        if let Some(element) = self.open.pop() {
            self.siblings().push(RawNode::Element(element));
        }
    }

    fn start_tag(&mut self, tag: Tag) -> TokenSinkResult<()> {
        let tag_name = tag.name.to_string();

        if SIBLING_CLOSED_TAGS.contains(tag_name.as_str())
            && self.open.last().is_some_and(|e| e.tag_name == tag_name)
        {
            self.close_innermost();
        }

        let attributes = tag
            .attrs
            .iter()
            .map(|attr| RawAttribute {
                key: attr.name.local.to_string(),
                value: Some(restore_interpolations(&attr.value, self.expressions)),
            })
            .collect();

        let raw_kind = match tag_name.as_str() {
            "script" => Some(RawKind::ScriptData),
            "style" => Some(RawKind::Rawtext),
            "textarea" | "title" => Some(RawKind::Rcdata),
            _ => None,
        };
        let is_void = tag.self_closing || VOID_TAGS.contains(tag_name.as_str());

        let element = RawElement {
            tag_name,
            attributes,
            children: Vec::new(),
        };

        if is_void {
            self.siblings().push(RawNode::Element(element));
            return TokenSinkResult::Continue;
        }

        self.open.push(element);
        match raw_kind {
            Some(kind) => TokenSinkResult::RawData(kind),
            None => TokenSinkResult::Continue,
        }
    }

    /// Closes the innermost open element named `name` and everything opened
    /// inside it. End tags without a matching open element are ignored.
    fn end_tag(&mut self, name: &str) {
        if let Some(depth) = self.open.iter().rposition(|e| e.tag_name == name) {
            while self.open.len() > depth {
                self.close_innermost();
            }
        }
    }

    fn finish(mut self) -> Vec<RawNode> {
        while !self.open.is_empty() {
            self.close_innermost();
        }
        self.roots
    }
}

impl TokenSink for TreeBuilder<'_> {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => return self.start_tag(tag),
                TagKind::EndTag => self.end_tag(&tag.name),
            },
            Token::CharacterTokens(text) => self.push_text(&text),
            Token::CommentToken(content) => {
                let content = restore_interpolations(&content, self.expressions);
                self.siblings().push(RawNode::Comment { content });
            }
            Token::DoctypeToken(_)
            | Token::NullCharacterToken
            | Token::EOFToken
            | Token::ParseError(_) => {}
        }
        TokenSinkResult::Continue
    }
}

/// Restores interpolations in merged text and applies whitespace options.
fn finish_text(nodes: &mut Vec<RawNode>, expressions: &[String], options: &ParseOptions) {
    for node in nodes.iter_mut() {
        match node {
            RawNode::Text { content } => {
                *content = restore_interpolations(content, expressions);
            }
            RawNode::Element(element) => finish_text(&mut element.children, expressions, options),
            RawNode::Comment { .. } => {}
        }
    }
    if options.strip_whitespace {
        nodes.retain(|node| !matches!(node, RawNode::Text { content } if content.trim().is_empty()));
    }
}

/// Parses template markup into raw nodes.
pub fn parse_template(source: &str, options: &ParseOptions) -> Result<Vec<RawNode>> {
    let cleaned = EMPTY_COMMENT_RE.replace_all(source, "");
    let (protected, expressions) = protect_interpolations(&cleaned);

    let mut input = BufferQueue::default();
    input.push_back(StrTendril::from(protected));

    let mut tokenizer = Tokenizer::new(TreeBuilder::new(&expressions), TokenizerOpts::default());
    let _ = tokenizer.feed(&mut input);
    tokenizer.end();

    let mut nodes = tokenizer.sink.finish();
    finish_text(&mut nodes, &expressions, options);
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protect_and_restore() {
        let (protected, expressions) = protect_interpolations("<b>{{ a < b }}</b>{{c}}");
        assert_eq!(protected, "<b>__QUAKE_EXPR_0__</b>__QUAKE_EXPR_1__");
        assert_eq!(expressions, vec!["{{ a < b }}", "{{c}}"]);
        assert_eq!(
            restore_interpolations("x __QUAKE_EXPR_1__ y", &expressions),
            "x {{c}} y"
        );
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        assert_eq!(
            restore_interpolations("__QUAKE_EXPR_9__", &[]),
            "__QUAKE_EXPR_9__"
        );
    }

    #[test]
    fn test_unmatched_end_tag_ignored() {
        let nodes = parse_template("<p>a</span>b</p>", &ParseOptions::default()).unwrap();
        let RawNode::Element(p) = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(
            p.children,
            vec![RawNode::Text {
                content: "ab".into()
            }]
        );
    }

    #[test]
    fn test_unclosed_elements_closed_at_end() {
        let nodes = parse_template("<ul><li>a<li>b", &ParseOptions::default()).unwrap();
        let RawNode::Element(ul) = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(ul.children.len(), 2);
    }
}
