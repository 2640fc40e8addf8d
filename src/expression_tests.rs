#[cfg(test)]
mod tests {
    use crate::error::{ExpressionError, QuakeError};
    use crate::expression::*;
    use crate::value::{Context, Value};

    fn ctx(json: &str) -> Context {
        serde_json::from_str(json).unwrap()
    }

    fn eval(code: &str, context: &Context) -> Value {
        evaluate_expression(code, context).unwrap()
    }

    #[test]
    fn test_literal_passthrough() {
        let context = Context::new();
        assert_eq!(evaluate(None, &context).unwrap(), Value::Undefined);
        assert_eq!(
            evaluate(Some("plain text"), &context).unwrap(),
            Value::from("plain text")
        );
        assert_eq!(
            evaluate(Some("a {{x}} b"), &context).unwrap(),
            Value::from("a {{x}} b")
        );
    }

    #[test]
    fn test_full_interpolation_is_evaluated() {
        let context = ctx(r#"{"count": 2, "name": "quake"}"#);
        assert_eq!(
            evaluate(Some("{{count}}"), &context).unwrap(),
            Value::from(2)
        );
        assert_eq!(
            evaluate(Some("{{ name.toUpperCase() }}"), &context).unwrap(),
            Value::from("QUAKE")
        );
    }

    #[test]
    fn test_unbound_identifier() {
        let err = evaluate(Some("{{missing}}"), &Context::new()).unwrap_err();
        assert_eq!(
            err,
            ExpressionError::UnboundIdentifier {
                name: "missing".into()
            }
        );
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        let context = ctx(r#"{"a": 7, "b": 2, "s": "3"}"#);
        assert_eq!(eval("a + b * 2", &context), Value::from(11));
        assert_eq!(eval("a % b", &context), Value::from(1));
        assert_eq!(eval("b ** 3", &context), Value::from(8));
        assert_eq!(eval("a / b", &context), Value::from(3.5));
        assert_eq!(eval("s + a", &context), Value::from("37"));
        assert_eq!(eval("s * b", &context), Value::from(6));
        assert_eq!(eval("a > b && b <= 2", &context), Value::from(true));
        assert_eq!(eval("'abc' < 'abd'", &context), Value::from(true));
        assert_eq!(eval("-a", &context), Value::from(-7));
    }

    #[test]
    fn test_equality_and_logic() {
        let context = ctx(r#"{"n": 1, "empty": "", "nothing": null}"#);
        assert_eq!(eval("n == '1'", &context), Value::from(true));
        assert_eq!(eval("n === '1'", &context), Value::from(false));
        assert_eq!(eval("nothing == undefined", &context), Value::from(true));
        assert_eq!(eval("empty || 'fallback'", &context), Value::from("fallback"));
        assert_eq!(eval("empty ?? 'fallback'", &context), Value::from(""));
        assert_eq!(eval("nothing ?? 'fallback'", &context), Value::from("fallback"));
        assert_eq!(eval("!empty", &context), Value::from(true));
        assert_eq!(eval("n ? 'yes' : 'no'", &context), Value::from("yes"));
    }

    #[test]
    fn test_short_circuit_skips_unbound() {
        let context = ctx(r#"{"flag": false}"#);
        assert_eq!(eval("flag && missing", &context), Value::from(false));
        assert_eq!(eval("flag ? missing : 1", &context), Value::from(1));
    }

    #[test]
    fn test_member_access() {
        let context = ctx(r#"{"user": {"name": "Ada", "tags": ["x", "y"]}, "list": [10, 20]}"#);
        assert_eq!(eval("user.name", &context), Value::from("Ada"));
        assert_eq!(eval("user['name']", &context), Value::from("Ada"));
        assert_eq!(eval("user.tags.length", &context), Value::from(2));
        assert_eq!(eval("list[1]", &context), Value::from(20));
        assert_eq!(eval("list[5]", &context), Value::Undefined);
        assert_eq!(eval("user.missing", &context), Value::Undefined);
        assert_eq!(eval("'hey'.length", &context), Value::from(3));
    }

    #[test]
    fn test_optional_chaining() {
        let context = ctx(r#"{"user": null}"#);
        assert_eq!(eval("user?.name", &context), Value::Undefined);
        assert_eq!(eval("user?.name.first", &context), Value::Undefined);
        assert_eq!(eval("user?.name.toUpperCase()", &context), Value::Undefined);

        let err = evaluate_expression("user.name", &context).unwrap_err();
        assert!(matches!(err, ExpressionError::Type { .. }));
    }

    #[test]
    fn test_literals() {
        let context = ctx(r#"{"name": "world", "n": 3}"#);
        assert_eq!(eval("`hello ${name}!`", &context), Value::from("hello world!"));
        assert_eq!(
            eval("[1, n, 'x']", &context),
            Value::Array(vec![Value::from(1), Value::from(3), Value::from("x")])
        );
        assert_eq!(eval("({ a: n, 'b': 2 }).a", &context), Value::from(3));
        assert_eq!(eval("null", &context), Value::Null);
        assert_eq!(eval("typeof n", &context), Value::from("number"));
        assert_eq!(eval("typeof missing", &context), Value::from("undefined"));
        assert_eq!(eval("void 0", &context), Value::Undefined);
    }

    #[test]
    fn test_builtin_methods() {
        let context = ctx(r#"{"s": "  Quake  ", "list": ["a", "b", "c"], "price": 2.5}"#);
        assert_eq!(eval("s.trim()", &context), Value::from("Quake"));
        assert_eq!(eval("s.trim().toLowerCase()", &context), Value::from("quake"));
        assert_eq!(eval("s.includes('ua')", &context), Value::from(true));
        assert_eq!(eval("list.join('-')", &context), Value::from("a-b-c"));
        assert_eq!(eval("list.indexOf('b')", &context), Value::from(1));
        assert_eq!(eval("list.includes('z')", &context), Value::from(false));
        assert_eq!(
            eval("list.slice(-2)", &context),
            Value::from(vec!["b", "c"])
        );
        assert_eq!(eval("'quake'.slice(1, 3)", &context), Value::from("ua"));
        assert_eq!(eval("price.toFixed(2)", &context), Value::from("2.50"));
        assert_eq!(eval("list.toString()", &context), Value::from("a,b,c"));
    }

    #[test]
    fn test_to_fixed_digit_range() {
        let context = ctx(r#"{"digits": 1000}"#);
        assert_eq!(eval("(1).toFixed(100)", &context).to_display_string().len(), 102);
        assert_eq!(eval("(2.7).toFixed(0.9)", &context), Value::from("3"));
        for code in ["(1).toFixed(digits)", "(1).toFixed(101)", "(1).toFixed(-1)"] {
            assert!(matches!(
                evaluate_expression(code, &context).unwrap_err(),
                ExpressionError::Type { .. }
            ));
        }
    }

    #[test]
    fn test_calling_non_method_fails() {
        let context = ctx(r#"{"s": "x", "f": 1}"#);
        assert!(matches!(
            evaluate_expression("s.nope()", &context).unwrap_err(),
            ExpressionError::Type { .. }
        ));
        assert!(matches!(
            evaluate_expression("f()", &context).unwrap_err(),
            ExpressionError::Type { .. }
        ));
    }

    #[test]
    fn test_side_effects_rejected() {
        let context = ctx(r#"{"count": 1}"#);
        for code in ["count = 2", "count++", "(() => 1)", "new Date()"] {
            let err = evaluate_expression(code, &context).unwrap_err();
            assert!(
                matches!(err, ExpressionError::Unsupported { .. }),
                "{} should be rejected, got {:?}",
                code,
                err
            );
        }
        assert_eq!(context.get("count"), Some(&Value::from(1)));
    }

    #[test]
    fn test_syntax_error() {
        let err = evaluate_expression("a +", &ctx(r#"{"a": 1}"#)).unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { .. }));
    }

    #[test]
    fn test_interpolate_segments() {
        let context = ctx(r#"{"first": "Ada", "count": 2}"#);
        assert_eq!(
            interpolate("Hi {{first}}, you have {{ count + 1 }} items", &context).unwrap(),
            "Hi Ada, you have 3 items"
        );
        assert_eq!(interpolate("no braces", &context).unwrap(), "no braces");
    }

    #[test]
    fn test_interpolate_reports_expression() {
        let err = interpolate("a {{ nope }} b", &Context::new()).unwrap_err();
        match err {
            QuakeError::Expression { expression, source } => {
                assert_eq!(expression, "{{ nope }}");
                assert_eq!(
                    source,
                    ExpressionError::UnboundIdentifier {
                        name: "nope".into()
                    }
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_referenced_identifiers() {
        let names = referenced_identifiers("user.name + other[key] + user.age").unwrap();
        assert_eq!(names, vec!["user", "other", "key"]);
        assert!(referenced_identifiers("").unwrap().is_empty());
    }

    #[test]
    fn test_inner_expression() {
        assert_eq!(inner_expression("{{ a }}"), Some(" a "));
        assert_eq!(inner_expression("x{{ a }}"), None);
        assert!(is_interpolation("{{a}}"));
        assert!(!is_interpolation("{a}"));
    }
}
