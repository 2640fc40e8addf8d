#[cfg(test)]
mod tests {
    use crate::compiler::*;
    use crate::error::{ExpressionError, QuakeError};
    use crate::node::{
        NodeId, RawAttribute, RawElement, RawNode, RenderNode, RenderTree, Template,
    };
    use crate::value::{Context, Value};
    use std::rc::Rc;

    fn ctx(json: &str) -> Context {
        serde_json::from_str(json).unwrap()
    }

    fn compile_src(source: &str, context: Context) -> Result<RenderTree, QuakeError> {
        compile("quake-test", &Template::parse(source).unwrap(), context)
    }

    fn root_children(tree: &RenderTree) -> Vec<NodeId> {
        tree.children(tree.root()).to_vec()
    }

    fn text_of(tree: &RenderTree, id: NodeId) -> &str {
        match tree.node(id) {
            RenderNode::Text(text) => &text.content,
            other => panic!("expected text node, got {:?}", other),
        }
    }

    fn is_empty_comment(tree: &RenderTree, id: NodeId) -> bool {
        matches!(tree.node(id), RenderNode::Comment(c) if c.content.is_empty())
    }

    #[test]
    fn test_text_interpolation() {
        let tree = compile_src("<p>{{count}}</p>", ctx(r#"{"count": "x"}"#)).unwrap();
        let p = root_children(&tree)[0];
        assert_eq!(tree.node(p).as_component().unwrap().tag_name, "p");

        let children = tree.children(p);
        assert_eq!(children.len(), 1);
        assert_eq!(text_of(&tree, children[0]), "x");
    }

    #[test]
    fn test_embedded_interpolation_keeps_literal_text() {
        let tree = compile_src(
            "<span>Total: {{ a + b }} items</span>",
            ctx(r#"{"a": 1, "b": 2}"#),
        )
        .unwrap();
        let span = root_children(&tree)[0];
        assert_eq!(text_of(&tree, tree.children(span)[0]), "Total: 3 items");
    }

    #[test]
    fn test_falsy_if_becomes_single_comment() {
        let tree = compile_src(
            r#"<quake-if *condition="{{show}}">A</quake-if>"#,
            ctx(r#"{"show": false}"#),
        )
        .unwrap();
        let children = root_children(&tree);
        assert_eq!(children.len(), 1);
        assert!(is_empty_comment(&tree, children[0]));
        // the elided branch never reaches the arena
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_truthy_if_clears_attributes() {
        let tree = compile_src(
            r#"<quake-if *condition="{{show}}">A</quake-if>"#,
            ctx(r#"{"show": 1}"#),
        )
        .unwrap();
        let node = root_children(&tree)[0];
        let component = tree.node(node).as_component().unwrap();
        assert_eq!(component.tag_name, QUAKE_IF);
        assert!(component.attributes.is_empty());
        assert_eq!(text_of(&tree, tree.children(node)[0]), "A");
    }

    #[test]
    fn test_each_clones_in_order() {
        let tree = compile_src(
            r#"<quake-each *items="{{list}}" *key="{{item}}" *as="item">{{item}}</quake-each>"#,
            ctx(r#"{"list": ["a", "b"]}"#),
        )
        .unwrap();

        let instances = root_children(&tree);
        assert_eq!(instances.len(), 2);

        for (id, expected) in instances.iter().zip(["a", "b"]) {
            let instance = tree.node(*id).as_component().unwrap();
            assert_eq!(instance.tag_name, QUAKE_EACH);
            assert!(instance.from_repetition);
            assert_eq!(instance.attributes.len(), 1);
            assert_eq!(
                instance.attributes.get(QUAKE_KEY_ATTRIBUTE),
                Some(&Value::from(expected))
            );
            assert_eq!(text_of(&tree, instance.children[0]), expected);
        }
    }

    #[test]
    fn test_each_binds_index_and_nests() {
        let tree = compile_src(
            r#"<quake-each *items="{{rows}}" *key="{{i}}" *as="row" *index="i"><quake-each *items="{{row}}" *key="{{c}}" *as="c">{{i}}{{c}}</quake-each></quake-each>"#,
            ctx(r#"{"rows": ["ab", "c"]}"#),
        )
        .unwrap();

        let mut texts = Vec::new();
        for row in root_children(&tree) {
            for cell in tree.children(row) {
                texts.push(text_of(&tree, tree.children(*cell)[0]).to_string());
            }
        }
        assert_eq!(texts, vec!["0a", "0b", "1c"]);
    }

    #[test]
    fn test_repetition_contexts_never_alias() {
        let tree = compile_src(
            r#"<quake-each *items="{{list}}" *key="{{item}}" *as="item"><b>{{item}}</b></quake-each>"#,
            ctx(r#"{"list": [1, 2]}"#),
        )
        .unwrap();

        let instances = root_children(&tree);
        let first = tree.node(instances[0]).as_component().unwrap();
        let second = tree.node(instances[1]).as_component().unwrap();
        assert!(!Rc::ptr_eq(&first.context, &second.context));

        let child = tree.node(first.children[0]).as_component().unwrap();
        assert!(child.from_repetition);
        assert!(!Rc::ptr_eq(&child.context, &first.context));
        assert_eq!(child.context.get("item"), Some(&Value::from(1)));
    }

    #[test]
    fn test_empty_each_becomes_single_comment() {
        let tree = compile_src(
            r#"<quake-each *items="{{list}}" *key="{{item}}" *as="item">{{item}}</quake-each>"#,
            ctx(r#"{"list": []}"#),
        )
        .unwrap();
        let children = root_children(&tree);
        assert_eq!(children.len(), 1);
        assert!(is_empty_comment(&tree, children[0]));
    }

    #[test]
    fn test_each_over_string() {
        let tree = compile_src(
            r#"<quake-each *items="{{word}}" *key="{{ch}}" *as="ch">{{ch}}</quake-each>"#,
            ctx(r#"{"word": "hi"}"#),
        )
        .unwrap();
        assert_eq!(root_children(&tree).len(), 2);
    }

    #[test]
    fn test_non_iterable_items() {
        for value in ["5", "true", "null", r#"{"a": 1}"#] {
            let context = ctx(&format!(r#"{{"list": {}}}"#, value));
            let err = compile_src(
                r#"<quake-each *items="{{list}}" *key="{{x}}">x</quake-each>"#,
                context,
            )
            .unwrap_err();
            assert!(
                matches!(err, QuakeError::NotIterable { ref expression, .. } if expression == "{{list}}"),
                "{} should not be iterable, got {:?}",
                value,
                err
            );
        }
    }

    #[test]
    fn test_missing_directives() {
        let err = compile_src("<quake-if>A</quake-if>", Context::new()).unwrap_err();
        assert!(matches!(
            err,
            QuakeError::MissingDirective {
                directive: DIRECTIVE_CONDITION,
                ..
            }
        ));

        let err = compile_src(
            r#"<quake-each *items="{{list}}">A</quake-each>"#,
            ctx(r#"{"list": [1]}"#),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            QuakeError::MissingDirective {
                directive: DIRECTIVE_KEY,
                ..
            }
        ));

        let err = compile_src(r#"<quake-each *key="{{k}}">A</quake-each>"#, Context::new())
            .unwrap_err();
        assert!(matches!(
            err,
            QuakeError::MissingDirective {
                directive: DIRECTIVE_ITEMS,
                ..
            }
        ));
    }

    #[test]
    fn test_attributes_evaluated() {
        let tree = compile_src(
            r#"<a href="{{url}}" class="link" title="x {{url}}">go</a>"#,
            ctx(r#"{"url": "/home"}"#),
        )
        .unwrap();
        let a = tree.node(root_children(&tree)[0]).as_component().unwrap();
        assert_eq!(a.attributes.get("href"), Some(&Value::from("/home")));
        assert_eq!(a.attributes.get("class"), Some(&Value::from("link")));
        // only whole-value interpolations are evaluated in attributes
        assert_eq!(a.attributes.get("title"), Some(&Value::from("x {{url}}")));
    }

    #[test]
    fn test_duplicate_attribute_keeps_first_position_last_value() {
        let template = Template::from_nodes(vec![RawNode::Element(RawElement {
            tag_name: "div".into(),
            attributes: vec![
                RawAttribute::new("id", "first"),
                RawAttribute::new("class", "c"),
                RawAttribute::new("id", "second"),
            ],
            children: vec![],
        })]);
        let tree = compile("quake-test", &template, Context::new()).unwrap();
        let div = tree.node(root_children(&tree)[0]).as_component().unwrap();
        let keys: Vec<&str> = div.attributes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "class"]);
        assert_eq!(div.attributes.get("id"), Some(&Value::from("second")));
    }

    #[test]
    fn test_comments_pass_through() {
        let tree = compile_src("<!-- note --><p>x</p>", Context::new()).unwrap();
        let children = root_children(&tree);
        assert!(matches!(tree.node(children[0]), RenderNode::Comment(c) if c.content == " note "));
    }

    #[test]
    fn test_expression_errors_propagate() {
        let err = compile_src("<p>{{ nope }}</p>", Context::new()).unwrap_err();
        assert!(matches!(
            err,
            QuakeError::Expression {
                source: ExpressionError::UnboundIdentifier { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_template_reused_across_compiles() {
        let template = Template::parse("<p>{{n}}</p>").unwrap();
        let first = compile("quake-test", &template, ctx(r#"{"n": 1}"#)).unwrap();
        let second = compile("quake-test", &template, ctx(r#"{"n": 2}"#)).unwrap();

        let text = |tree: &RenderTree| {
            let p = tree.children(tree.root())[0];
            text_of(tree, tree.children(p)[0]).to_string()
        };
        assert_eq!(text(&first), "1");
        assert_eq!(text(&second), "2");
        assert_eq!(template, Template::parse("<p>{{n}}</p>").unwrap());
    }

    #[test]
    fn test_breadth_first_arena_order() {
        let tree = compile_src("<div><i>a</i></div><p>b</p>", Context::new()).unwrap();
        let tags: Vec<String> = tree
            .iter()
            .filter_map(|(_, node)| node.as_component().map(|c| c.tag_name.clone()))
            .collect();
        assert_eq!(tags, vec!["quake-test", "div", "p", "i"]);
    }
}
