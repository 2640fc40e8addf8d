//! Expression Evaluator
//!
//! Evaluates `{{ … }}` interpolations against a [`Context`]. The inner text is
//! parsed with `oxc_parser` and interpreted by walking the resulting AST; no
//! code is generated or executed. Only a restricted, side-effect-free subset
//! of JavaScript is accepted:
//!
//! - identifiers (bound in the context, or `undefined` / `NaN` / `Infinity`)
//! - literals, template literals, array and object literals
//! - unary, arithmetic, comparison, equality, logical and conditional operators
//! - static, computed and optional member access
//! - calls of a small set of built-in string, array and number methods
//!
//! Everything else (assignments, arrow functions, `new`, …) is rejected with
//! [`ExpressionError::Unsupported`].

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BinaryOperator, CallExpression, ChainElement, ComputedMemberExpression, Expression,
    IdentifierReference, LogicalOperator, ObjectPropertyKind, PropertyKey,
    StaticMemberExpression, TemplateLiteral, UnaryExpression, UnaryOperator,
};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::{ExpressionError, QuakeError, Result};
use crate::value::{format_number, Context, Value};

lazy_static! {
    /// A whole value that is a single interpolation.
    static ref FULL_INTERPOLATION_RE: Regex = Regex::new(r"^\{\{.*\}\}$").unwrap();

    /// Interpolations embedded in surrounding text.
    pub(crate) static ref INTERPOLATION_RE: Regex = Regex::new(r"\{\{.*?\}\}").unwrap();

    /// Identifiers resolvable without a context binding.
    pub static ref EXPRESSION_GLOBALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("undefined");
        s.insert("NaN");
        s.insert("Infinity");
        s
    };
}

/// Returns true when `value` is exactly one `{{ … }}` interpolation.
pub fn is_interpolation(value: &str) -> bool {
    FULL_INTERPOLATION_RE.is_match(value)
}

/// The expression between the delimiters of a full interpolation.
pub fn inner_expression(value: &str) -> Option<&str> {
    if !is_interpolation(value) {
        return None;
    }
    value
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
}

/// Evaluates a directive or attribute value.
///
/// `None` yields `undefined`, a full interpolation is evaluated, and any other
/// string is returned unchanged as a literal.
pub fn evaluate(expr: Option<&str>, context: &Context) -> Result<Value, ExpressionError> {
    match expr {
        None => Ok(Value::Undefined),
        Some(raw) => match inner_expression(raw) {
            Some(code) => evaluate_expression(code, context),
            None => Ok(Value::String(raw.to_string())),
        },
    }
}

/// Evaluates bare expression code (no delimiters).
pub fn evaluate_expression(code: &str, context: &Context) -> Result<Value, ExpressionError> {
    if code.trim().is_empty() {
        return Ok(Value::Undefined);
    }
    let allocator = Allocator::default();
    let expr = parse_expression(&allocator, code)?;
    Evaluator { context }.eval(&expr)
}

/// Replaces every `{{ … }}` segment of `content` with its string value.
pub fn interpolate(content: &str, context: &Context) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut last_end = 0;

    for m in INTERPOLATION_RE.find_iter(content) {
        result.push_str(&content[last_end..m.start()]);
        let value = evaluate(Some(m.as_str()), context)
            .map_err(|e| QuakeError::expression(m.as_str(), e))?;
        result.push_str(&value.to_display_string());
        last_end = m.end();
    }

    result.push_str(&content[last_end..]);
    Ok(result)
}

/// Identifiers referenced by `code`, in first-seen order.
pub fn referenced_identifiers(code: &str) -> Result<Vec<String>, ExpressionError> {
    if code.trim().is_empty() {
        return Ok(Vec::new());
    }
    let allocator = Allocator::default();
    let expr = parse_expression(&allocator, code)?;

    let mut collector = IdentifierCollector { names: Vec::new() };
    collector.visit_expression(&expr);
    Ok(collector.names)
}

fn parse_expression<'a>(
    allocator: &'a Allocator,
    code: &'a str,
) -> Result<Expression<'a>, ExpressionError> {
    Parser::new(allocator, code, SourceType::default())
        .parse_expression()
        .map_err(|errors| ExpressionError::Syntax {
            message: errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        })
}

struct IdentifierCollector {
    names: Vec<String>,
}

impl<'a> Visit<'a> for IdentifierCollector {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        let name = ident.name.to_string();
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AST INTERPRETER
// ═══════════════════════════════════════════════════════════════════════════════

struct Evaluator<'c> {
    context: &'c Context,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expression<'_>) -> Result<Value, ExpressionError> {
        match expr {
            Expression::BooleanLiteral(lit) => Ok(Value::Bool(lit.value)),
            Expression::NullLiteral(_) => Ok(Value::Null),
            Expression::NumericLiteral(lit) => Ok(Value::Number(lit.value)),
            Expression::StringLiteral(lit) => Ok(Value::String(lit.value.to_string())),
            Expression::TemplateLiteral(tpl) => self.eval_template(tpl),
            Expression::Identifier(ident) => self.lookup(&ident.name.to_string()),
            Expression::ParenthesizedExpression(paren) => self.eval(&paren.expression),
            Expression::ArrayExpression(array) => {
                let mut items = Vec::with_capacity(array.elements.len());
                for element in &array.elements {
                    match element.as_expression() {
                        Some(e) => items.push(self.eval(e)?),
                        None => return Err(ExpressionError::unsupported("array spread or hole")),
                    }
                }
                Ok(Value::Array(items))
            }
            Expression::ObjectExpression(object) => {
                let mut map = indexmap::IndexMap::new();
                for property in &object.properties {
                    match property {
                        ObjectPropertyKind::ObjectProperty(prop) => {
                            let key = match &prop.key {
                                PropertyKey::StaticIdentifier(id) => id.name.to_string(),
                                PropertyKey::StringLiteral(lit) => lit.value.to_string(),
                                PropertyKey::NumericLiteral(lit) => format_number(lit.value),
                                _ if prop.computed => match prop.key.as_expression() {
                                    Some(e) => self.eval(e)?.to_display_string(),
                                    None => {
                                        return Err(ExpressionError::unsupported("object key"))
                                    }
                                },
                                _ => return Err(ExpressionError::unsupported("object key")),
                            };
                            map.insert(key, self.eval(&prop.value)?);
                        }
                        ObjectPropertyKind::SpreadProperty(_) => {
                            return Err(ExpressionError::unsupported("object spread"))
                        }
                    }
                }
                Ok(Value::Object(map))
            }
            Expression::UnaryExpression(unary) => self.eval_unary(unary),
            Expression::BinaryExpression(binary) => {
                let left = self.eval(&binary.left)?;
                let right = self.eval(&binary.right)?;
                binary_operation(binary.operator, &left, &right)
            }
            Expression::LogicalExpression(logical) => {
                let left = self.eval(&logical.left)?;
                match logical.operator {
                    LogicalOperator::And => {
                        if left.is_truthy() {
                            self.eval(&logical.right)
                        } else {
                            Ok(left)
                        }
                    }
                    LogicalOperator::Or => {
                        if left.is_truthy() {
                            Ok(left)
                        } else {
                            self.eval(&logical.right)
                        }
                    }
                    LogicalOperator::Coalesce => {
                        if left.is_nullish() {
                            self.eval(&logical.right)
                        } else {
                            Ok(left)
                        }
                    }
                }
            }
            Expression::ConditionalExpression(cond) => {
                if self.eval(&cond.test)?.is_truthy() {
                    self.eval(&cond.consequent)
                } else {
                    self.eval(&cond.alternate)
                }
            }
            Expression::StaticMemberExpression(member) => {
                Ok(self.eval_static_member(member)?.unwrap_or_default())
            }
            Expression::ComputedMemberExpression(member) => {
                Ok(self.eval_computed_member(member)?.unwrap_or_default())
            }
            Expression::CallExpression(call) => Ok(self.eval_call(call)?.unwrap_or_default()),
            Expression::ChainExpression(chain) => {
                let value = match &chain.expression {
                    ChainElement::CallExpression(call) => self.eval_call(call)?,
                    ChainElement::StaticMemberExpression(member) => {
                        self.eval_static_member(member)?
                    }
                    ChainElement::ComputedMemberExpression(member) => {
                        self.eval_computed_member(member)?
                    }
                    _ => return Err(ExpressionError::unsupported("private field access")),
                };
                Ok(value.unwrap_or_default())
            }
            other => Err(ExpressionError::unsupported(describe(other))),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, ExpressionError> {
        if let Some(value) = self.context.get(name) {
            return Ok(value.clone());
        }
        match name {
            "undefined" => Ok(Value::Undefined),
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            _ => Err(ExpressionError::UnboundIdentifier {
                name: name.to_string(),
            }),
        }
    }

    fn eval_template(&self, tpl: &TemplateLiteral<'_>) -> Result<Value, ExpressionError> {
        let mut result = String::new();
        for (i, quasi) in tpl.quasis.iter().enumerate() {
            match &quasi.value.cooked {
                Some(cooked) => result.push_str(&cooked.to_string()),
                None => result.push_str(&quasi.value.raw.to_string()),
            }
            if let Some(expr) = tpl.expressions.get(i) {
                result.push_str(&self.eval(expr)?.to_display_string());
            }
        }
        Ok(Value::String(result))
    }

    fn eval_unary(&self, unary: &UnaryExpression<'_>) -> Result<Value, ExpressionError> {
        if unary.operator == UnaryOperator::Typeof {
            // typeof tolerates unbound identifiers
            if let Expression::Identifier(ident) = &unary.argument {
                let name = ident.name.to_string();
                if self.lookup(&name).is_err() {
                    return Ok(Value::from("undefined"));
                }
            }
            let value = self.eval(&unary.argument)?;
            let name = match value {
                Value::Null | Value::Array(_) | Value::Object(_) => "object",
                other => other.type_name(),
            };
            return Ok(Value::from(name));
        }

        let value = self.eval(&unary.argument)?;
        match unary.operator {
            UnaryOperator::LogicalNot => Ok(Value::Bool(!value.is_truthy())),
            UnaryOperator::UnaryNegation => Ok(Value::Number(-value.to_number())),
            UnaryOperator::UnaryPlus => Ok(Value::Number(value.to_number())),
            UnaryOperator::Void => Ok(Value::Undefined),
            other => Err(ExpressionError::unsupported(format!(
                "unary operator {:?}",
                other
            ))),
        }
    }

    /// Member reads return `None` when an optional link short-circuits the chain.
    fn eval_link(&self, expr: &Expression<'_>) -> Result<Option<Value>, ExpressionError> {
        match expr {
            Expression::StaticMemberExpression(member) => self.eval_static_member(member),
            Expression::ComputedMemberExpression(member) => self.eval_computed_member(member),
            Expression::CallExpression(call) => self.eval_call(call),
            other => self.eval(other).map(Some),
        }
    }

    fn eval_static_member(
        &self,
        member: &StaticMemberExpression<'_>,
    ) -> Result<Option<Value>, ExpressionError> {
        let Some(object) = self.eval_link(&member.object)? else {
            return Ok(None);
        };
        if member.optional && object.is_nullish() {
            return Ok(None);
        }
        get_property(&object, &member.property.name.to_string()).map(Some)
    }

    fn eval_computed_member(
        &self,
        member: &ComputedMemberExpression<'_>,
    ) -> Result<Option<Value>, ExpressionError> {
        let Some(object) = self.eval_link(&member.object)? else {
            return Ok(None);
        };
        if member.optional && object.is_nullish() {
            return Ok(None);
        }
        let key = self.eval(&member.expression)?.to_display_string();
        get_property(&object, &key).map(Some)
    }

    fn eval_call(&self, call: &CallExpression<'_>) -> Result<Option<Value>, ExpressionError> {
        let (receiver, method) = match &call.callee {
            Expression::StaticMemberExpression(member) => {
                let Some(object) = self.eval_link(&member.object)? else {
                    return Ok(None);
                };
                if member.optional && object.is_nullish() {
                    return Ok(None);
                }
                (object, member.property.name.to_string())
            }
            Expression::ComputedMemberExpression(member) => {
                let Some(object) = self.eval_link(&member.object)? else {
                    return Ok(None);
                };
                if member.optional && object.is_nullish() {
                    return Ok(None);
                }
                let key = self.eval(&member.expression)?.to_display_string();
                (object, key)
            }
            Expression::Identifier(ident) => {
                let name = ident.name.to_string();
                self.lookup(&name)?;
                return Err(ExpressionError::type_error(format!(
                    "{} is not a function",
                    name
                )));
            }
            other => {
                self.eval(other)?;
                return Err(ExpressionError::type_error("expression is not a function"));
            }
        };

        let mut args = Vec::with_capacity(call.arguments.len());
        for argument in &call.arguments {
            match argument.as_expression() {
                Some(e) => args.push(self.eval(e)?),
                None => return Err(ExpressionError::unsupported("spread argument")),
            }
        }

        call_method(&receiver, &method, &args).map(Some)
    }
}

fn describe(expr: &Expression<'_>) -> &'static str {
    match expr {
        Expression::AssignmentExpression(_) => "assignment",
        Expression::UpdateExpression(_) => "update expression",
        Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_) => "function",
        Expression::NewExpression(_) => "new expression",
        Expression::SequenceExpression(_) => "sequence expression",
        Expression::ThisExpression(_) => "this",
        Expression::AwaitExpression(_) | Expression::YieldExpression(_) => "async expression",
        Expression::RegExpLiteral(_) => "regular expression",
        Expression::BigIntLiteral(_) => "bigint",
        _ => "expression",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATORS
// ═══════════════════════════════════════════════════════════════════════════════

fn binary_operation(
    operator: BinaryOperator,
    left: &Value,
    right: &Value,
) -> Result<Value, ExpressionError> {
    let value = match operator {
        BinaryOperator::Addition => add(left, right),
        BinaryOperator::Subtraction => Value::Number(left.to_number() - right.to_number()),
        BinaryOperator::Multiplication => Value::Number(left.to_number() * right.to_number()),
        BinaryOperator::Division => Value::Number(left.to_number() / right.to_number()),
        BinaryOperator::Remainder => Value::Number(left.to_number() % right.to_number()),
        BinaryOperator::Exponential => Value::Number(left.to_number().powf(right.to_number())),
        BinaryOperator::Equality => Value::Bool(left.loose_equals(right)),
        BinaryOperator::Inequality => Value::Bool(!left.loose_equals(right)),
        BinaryOperator::StrictEquality => Value::Bool(left.strict_equals(right)),
        BinaryOperator::StrictInequality => Value::Bool(!left.strict_equals(right)),
        BinaryOperator::LessThan => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOperator::LessEqualThan => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOperator::GreaterThan => {
            Value::Bool(compare(left, right) == Some(Ordering::Greater))
        }
        BinaryOperator::GreaterEqualThan => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        other => {
            return Err(ExpressionError::unsupported(format!(
                "binary operator {:?}",
                other
            )))
        }
    };
    Ok(value)
}

fn add(left: &Value, right: &Value) -> Value {
    let concatenates = |v: &Value| {
        matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_))
    };
    if concatenates(left) || concatenates(right) {
        Value::String(format!(
            "{}{}",
            left.to_display_string(),
            right.to_display_string()
        ))
    } else {
        Value::Number(left.to_number() + right.to_number())
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

fn get_property(object: &Value, key: &str) -> Result<Value, ExpressionError> {
    match object {
        Value::Undefined | Value::Null => Err(ExpressionError::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            object.type_name(),
            key
        ))),
        Value::Object(map) => Ok(map.get(key).cloned().unwrap_or_default()),
        Value::Array(items) => {
            if key == "length" {
                return Ok(Value::from(items.len()));
            }
            Ok(key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default())
        }
        Value::String(s) => {
            if key == "length" {
                return Ok(Value::from(s.chars().count()));
            }
            Ok(key
                .parse::<usize>()
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default())
        }
        Value::Bool(_) | Value::Number(_) => Ok(Value::Undefined),
    }
}

fn relative_index(index: Option<&Value>, len: usize, default: usize) -> usize {
    match index {
        None | Some(Value::Undefined) => default,
        Some(value) => {
            let n = value.to_number();
            if n.is_nan() {
                0
            } else if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                (n as usize).min(len)
            }
        }
    }
}

/// Largest digit count `toFixed` accepts.
const MAX_FRACTION_DIGITS: f64 = 100.0;

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or_default();

    match receiver {
        Value::Undefined | Value::Null => Err(ExpressionError::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            receiver.type_name(),
            method
        ))),
        Value::String(s) => match method {
            "toUpperCase" => Ok(Value::String(s.to_uppercase())),
            "toLowerCase" => Ok(Value::String(s.to_lowercase())),
            "trim" => Ok(Value::String(s.trim().to_string())),
            "toString" => Ok(receiver.clone()),
            "includes" => Ok(Value::Bool(s.contains(&arg(0).to_display_string()))),
            "startsWith" => Ok(Value::Bool(s.starts_with(&arg(0).to_display_string()))),
            "endsWith" => Ok(Value::Bool(s.ends_with(&arg(0).to_display_string()))),
            "indexOf" => {
                let needle = arg(0).to_display_string();
                let index = s
                    .find(&needle)
                    .map(|byte| s[..byte].chars().count() as f64)
                    .unwrap_or(-1.0);
                Ok(Value::Number(index))
            }
            "slice" => {
                let chars: Vec<char> = s.chars().collect();
                let start = relative_index(args.first(), chars.len(), 0);
                let end = relative_index(args.get(1), chars.len(), chars.len());
                let sliced = if start < end {
                    chars[start..end].iter().collect()
                } else {
                    String::new()
                };
                Ok(Value::String(sliced))
            }
            _ => Err(not_a_function(receiver, method)),
        },
        Value::Array(items) => match method {
            "join" => {
                let separator = match args.first() {
                    None | Some(Value::Undefined) => ",".to_string(),
                    Some(sep) => sep.to_display_string(),
                };
                Ok(Value::String(
                    items
                        .iter()
                        .map(|item| {
                            if item.is_nullish() {
                                String::new()
                            } else {
                                item.to_display_string()
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(&separator),
                ))
            }
            "includes" => {
                let needle = arg(0);
                Ok(Value::Bool(items.iter().any(|item| {
                    item == &needle
                        || matches!((item, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
                })))
            }
            "indexOf" => {
                let needle = arg(0);
                let index = items
                    .iter()
                    .position(|item| item.strict_equals(&needle))
                    .map(|i| i as f64)
                    .unwrap_or(-1.0);
                Ok(Value::Number(index))
            }
            "slice" => {
                let start = relative_index(args.first(), items.len(), 0);
                let end = relative_index(args.get(1), items.len(), items.len());
                let sliced = if start < end {
                    items[start..end].to_vec()
                } else {
                    Vec::new()
                };
                Ok(Value::Array(sliced))
            }
            "toString" => Ok(Value::String(receiver.to_display_string())),
            _ => Err(not_a_function(receiver, method)),
        },
        Value::Number(n) => match method {
            "toFixed" => {
                let digits = arg(0).to_number();
                let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
                if !(0.0..=MAX_FRACTION_DIGITS).contains(&digits) {
                    return Err(ExpressionError::type_error(format!(
                        "toFixed() digits argument must be between 0 and {}",
                        MAX_FRACTION_DIGITS
                    )));
                }
                if !n.is_finite() {
                    return Ok(Value::String(format_number(*n)));
                }
                Ok(Value::String(format!("{:.*}", digits as usize, n)))
            }
            "toString" => Ok(Value::String(format_number(*n))),
            _ => Err(not_a_function(receiver, method)),
        },
        Value::Bool(_) if method == "toString" => Ok(Value::String(receiver.to_display_string())),
        _ => Err(not_a_function(receiver, method)),
    }
}

fn not_a_function(receiver: &Value, method: &str) -> ExpressionError {
    ExpressionError::type_error(format!(
        "{}.{} is not a function",
        receiver.type_name(),
        method
    ))
}
