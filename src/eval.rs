//! Sandboxed evaluation of style declaration arguments.
//!
//! The argument of a `css(...)` call is parsed on its own and lowered into a
//! small owned expression tree. Only literal composition is representable:
//! objects, arrays, strings, numbers, template literals, ternaries, unary and
//! binary operators, member access, and identifier references. Calls,
//! assignments and functions (other than the top-level theme arrow) are
//! rejected while lowering, so evaluation has no side effects by
//! construction. Every evaluation step is still charged against a wall-clock
//! deadline and a step budget, and nesting depth is capped while lowering and
//! evaluating.
//!
//! Identifier references resolve to the theme parameter and, when the
//! [`EvalLevel`] allows it, to top-level `const` bindings of the same module.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrayExpressionElement, ArrowFunctionExpression, BindingPatternKind, Expression,
    ObjectPropertyKind, PropertyKey, PropertyKind, Statement,
};
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::operator::{BinaryOperator, LogicalOperator, UnaryOperator};
use serde::{Deserialize, Serialize};

use crate::style::{format_number, StyleDeclaration, StyleObject, StyleValue, ThemeFunction};
use crate::FlowError;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Nesting limit for lowering and evaluation. Both recurse per level.
const MAX_DEPTH: usize = 128;

fn too_deep() -> String {
    format!("expression nests deeper than {MAX_DEPTH} levels")
}

/// How much of the surrounding module an argument may reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EvalLevel {
    /// Literals and the theme parameter only.
    #[default]
    Literal,
    /// Also top-level `const` bindings of the module containing the call.
    ModuleConstants,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct EvalOptions {
    pub level: EvalLevel,
    /// Hard wall-clock limit for a single evaluation.
    pub timeout_ms: u64,
    /// Upper bound on evaluated nodes, including resolved constants.
    pub max_steps: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            level: EvalLevel::Literal,
            timeout_ms: 1000,
            max_steps: 100_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Lowered expression tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Undefined,
    Template { quasis: Vec<String>, exprs: Vec<Expr> },
    Array(Vec<Expr>),
    Object(Vec<Prop>),
    Ident(String),
    Member { object: Box<Expr>, property: Box<PropKey> },
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Prop {
    Entry(PropKey, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PropKey {
    Static(String),
    Computed(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum UnaryOp {
    Neg,
    Plus,
    Not,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    LooseEq,
    LooseNotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum LogicalOp {
    And,
    Or,
    Coalesce,
}

/// Parameter binding of a theme function.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Binding {
    Ident(String),
    /// `({ colors, space: s }) => ...` as `(key, local)` pairs.
    Object(Vec<(String, String)>),
}

/// Top-level constants of a module, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    bindings: IndexMap<String, Expr>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: String, expr: Expr) {
        self.bindings.insert(name, expr);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn get(&self, name: &str) -> Option<&Expr> {
        self.bindings.get(name)
    }
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Evaluate a literal style argument with default options and no scope.
pub fn evaluate(text: &str) -> Result<StyleDeclaration, FlowError> {
    evaluate_with(text, &Scope::default(), &EvalOptions::default())
}

/// Evaluate `text` as a style declaration.
///
/// A top-level arrow function yields [`StyleDeclaration::Themed`] and is not
/// evaluated until it is resolved against a theme.
pub fn evaluate_with(
    text: &str,
    scope: &Scope,
    options: &EvalOptions,
) -> Result<StyleDeclaration, FlowError> {
    let malformed = |reason: String| FlowError::MalformedDeclaration {
        text: text.to_string(),
        reason,
    };

    let allocator = Allocator::default();
    let wrapped = format!("({text}\n)");
    let ret = Parser::new(&allocator, &wrapped, expression_source_type()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let reason = ret
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unparsable expression".to_string());
        return Err(malformed(reason));
    }

    let [Statement::ExpressionStatement(statement)] = ret.program.body.as_slice() else {
        return Err(malformed("expected a single expression".to_string()));
    };
    let top = unwrap_transparent(&statement.expression);

    let captured = match options.level {
        EvalLevel::Literal => Scope::default(),
        EvalLevel::ModuleConstants => scope.clone(),
    };

    if let Expression::ArrowFunctionExpression(arrow) = top {
        let (param, body) = lower_theme_function(arrow).map_err(malformed)?;
        return Ok(StyleDeclaration::Themed(ThemeFunction {
            text: text.to_string(),
            param,
            body,
            scope: captured,
            options: options.clone(),
        }));
    }

    let expr = lower(top).map_err(malformed)?;
    let mut interpreter = Interpreter::new(&captured, options);
    let value = interpreter.eval(&expr).map_err(malformed)?;
    to_style_object(value)
        .map(StyleDeclaration::Static)
        .map_err(malformed)
}

/// Evaluate a theme function body with `theme` bound to its parameter.
pub(crate) fn apply_theme(
    function: &ThemeFunction,
    theme: &serde_json::Value,
) -> Result<StyleObject, FlowError> {
    let malformed = |reason: String| FlowError::MalformedDeclaration {
        text: function.text.clone(),
        reason,
    };

    let theme = Value::from_json(theme);
    let mut interpreter = Interpreter::new(&function.scope, &function.options);
    match &function.param {
        Binding::Ident(name) => interpreter.locals.push((name.clone(), theme)),
        Binding::Object(pairs) => {
            for (key, local) in pairs {
                let value = theme.property(key).map_err(malformed)?;
                interpreter.locals.push((local.clone(), value));
            }
        }
    }

    let value = interpreter.eval(&function.body).map_err(malformed)?;
    to_style_object(value).map_err(malformed)
}

// ---------------------------------------------------------------------------
// Lowering
// ---------------------------------------------------------------------------

pub(crate) fn expression_source_type() -> SourceType {
    SourceType::default()
        .with_module(true)
        .with_typescript(true)
        .with_jsx(true)
}

fn unwrap_transparent<'e, 'a>(mut expr: &'e Expression<'a>) -> &'e Expression<'a> {
    loop {
        expr = match expr {
            Expression::ParenthesizedExpression(e) => &e.expression,
            Expression::TSAsExpression(e) => &e.expression,
            Expression::TSSatisfiesExpression(e) => &e.expression,
            Expression::TSNonNullExpression(e) => &e.expression,
            other => return other,
        };
    }
}

fn lower_theme_function(arrow: &ArrowFunctionExpression<'_>) -> Result<(Binding, Expr), String> {
    if arrow.r#async {
        return Err("theme functions cannot be async".to_string());
    }
    if arrow.params.rest.is_some() || arrow.params.items.len() != 1 {
        return Err("theme functions take exactly one parameter".to_string());
    }

    let param = match &arrow.params.items[0].pattern.kind {
        BindingPatternKind::BindingIdentifier(id) => Binding::Ident(id.name.to_string()),
        BindingPatternKind::ObjectPattern(pattern) => {
            if pattern.rest.is_some() {
                return Err("rest elements are not supported in theme parameters".to_string());
            }
            let mut pairs = Vec::with_capacity(pattern.properties.len());
            for property in &pattern.properties {
                if property.computed {
                    return Err("computed keys are not supported in theme parameters".to_string());
                }
                let key = static_key(&property.key)
                    .ok_or_else(|| "unsupported theme parameter key".to_string())?;
                let BindingPatternKind::BindingIdentifier(local) = &property.value.kind else {
                    return Err("nested theme parameter patterns are not supported".to_string());
                };
                pairs.push((key, local.name.to_string()));
            }
            Binding::Object(pairs)
        }
        _ => return Err("unsupported theme parameter pattern".to_string()),
    };

    let body = match arrow.body.statements.as_slice() {
        [Statement::ExpressionStatement(statement)] if arrow.expression => {
            lower(&statement.expression)?
        }
        [Statement::ReturnStatement(ret)] => match &ret.argument {
            Some(argument) => lower(argument)?,
            None => return Err("theme function returns nothing".to_string()),
        },
        _ => return Err("theme function body must be a single returned object".to_string()),
    };

    Ok((param, body))
}

fn static_key(key: &PropertyKey<'_>) -> Option<String> {
    match key {
        PropertyKey::StaticIdentifier(id) => Some(id.name.to_string()),
        PropertyKey::StringLiteral(s) => Some(s.value.to_string()),
        PropertyKey::NumericLiteral(n) => Some(format_number(n.value)),
        _ => None,
    }
}

/// Lower an oxc expression into the owned evaluation grammar.
pub(crate) fn lower(expr: &Expression<'_>) -> Result<Expr, String> {
    lower_at(expr, 0)
}

fn lower_at(expr: &Expression<'_>, depth: usize) -> Result<Expr, String> {
    if depth >= MAX_DEPTH {
        return Err(too_deep());
    }
    let next = depth + 1;
    let lowered = match expr {
        Expression::StringLiteral(s) => Expr::Str(s.value.to_string()),
        Expression::NumericLiteral(n) => Expr::Num(n.value),
        Expression::BooleanLiteral(b) => Expr::Bool(b.value),
        Expression::NullLiteral(_) => Expr::Null,
        Expression::Identifier(id) => match id.name.as_str() {
            "undefined" => Expr::Undefined,
            "NaN" => Expr::Num(f64::NAN),
            "Infinity" => Expr::Num(f64::INFINITY),
            name => Expr::Ident(name.to_string()),
        },
        Expression::TemplateLiteral(template) => Expr::Template {
            quasis: template
                .quasis
                .iter()
                .map(|q| {
                    q.value
                        .cooked
                        .as_ref()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| q.value.raw.to_string())
                })
                .collect(),
            exprs: template
                .expressions
                .iter()
                .map(|e| lower_at(e, next))
                .collect::<Result<_, _>>()?,
        },
        Expression::ArrayExpression(array) => {
            let mut items = Vec::with_capacity(array.elements.len());
            for element in &array.elements {
                match element {
                    ArrayExpressionElement::SpreadElement(_) => {
                        return Err("array spread is not supported".to_string())
                    }
                    ArrayExpressionElement::Elision(_) => items.push(Expr::Undefined),
                    other => match other.as_expression() {
                        Some(e) => items.push(lower_at(e, next)?),
                        None => return Err("unsupported array element".to_string()),
                    },
                }
            }
            Expr::Array(items)
        }
        Expression::ObjectExpression(object) => {
            let mut props = Vec::with_capacity(object.properties.len());
            for property in &object.properties {
                match property {
                    ObjectPropertyKind::ObjectProperty(p) => {
                        if p.method || !matches!(p.kind, PropertyKind::Init) {
                            return Err("methods and accessors are not allowed".to_string());
                        }
                        let key = if p.computed {
                            match p.key.as_expression() {
                                Some(e) => PropKey::Computed(lower_at(e, next)?),
                                None => return Err("unsupported computed key".to_string()),
                            }
                        } else {
                            PropKey::Static(
                                static_key(&p.key)
                                    .ok_or_else(|| "unsupported property key".to_string())?,
                            )
                        };
                        props.push(Prop::Entry(key, lower_at(&p.value, next)?));
                    }
                    ObjectPropertyKind::SpreadProperty(spread) => {
                        props.push(Prop::Spread(lower_at(&spread.argument, next)?));
                    }
                }
            }
            Expr::Object(props)
        }
        Expression::ParenthesizedExpression(_)
        | Expression::TSAsExpression(_)
        | Expression::TSSatisfiesExpression(_)
        | Expression::TSNonNullExpression(_) => lower_at(unwrap_transparent(expr), depth)?,
        Expression::ConditionalExpression(c) => Expr::Conditional(
            Box::new(lower_at(&c.test, next)?),
            Box::new(lower_at(&c.consequent, next)?),
            Box::new(lower_at(&c.alternate, next)?),
        ),
        Expression::UnaryExpression(u) => {
            let op = match u.operator {
                UnaryOperator::UnaryNegation => UnaryOp::Neg,
                UnaryOperator::UnaryPlus => UnaryOp::Plus,
                UnaryOperator::LogicalNot => UnaryOp::Not,
                UnaryOperator::Typeof => UnaryOp::TypeOf,
                other => return Err(format!("operator {other:?} is not allowed")),
            };
            Expr::Unary(op, Box::new(lower_at(&u.argument, next)?))
        }
        Expression::BinaryExpression(b) => {
            let op = match b.operator {
                BinaryOperator::Addition => BinaryOp::Add,
                BinaryOperator::Subtraction => BinaryOp::Sub,
                BinaryOperator::Multiplication => BinaryOp::Mul,
                BinaryOperator::Division => BinaryOp::Div,
                BinaryOperator::Remainder => BinaryOp::Rem,
                BinaryOperator::Exponential => BinaryOp::Exp,
                BinaryOperator::Equality => BinaryOp::LooseEq,
                BinaryOperator::Inequality => BinaryOp::LooseNotEq,
                BinaryOperator::StrictEquality => BinaryOp::StrictEq,
                BinaryOperator::StrictInequality => BinaryOp::StrictNotEq,
                BinaryOperator::LessThan => BinaryOp::Lt,
                BinaryOperator::LessEqualThan => BinaryOp::Le,
                BinaryOperator::GreaterThan => BinaryOp::Gt,
                BinaryOperator::GreaterEqualThan => BinaryOp::Ge,
                other => return Err(format!("operator {other:?} is not allowed")),
            };
            Expr::Binary(
                op,
                Box::new(lower_at(&b.left, next)?),
                Box::new(lower_at(&b.right, next)?),
            )
        }
        Expression::LogicalExpression(l) => {
            let op = match l.operator {
                LogicalOperator::And => LogicalOp::And,
                LogicalOperator::Or => LogicalOp::Or,
                LogicalOperator::Coalesce => LogicalOp::Coalesce,
            };
            Expr::Logical(
                op,
                Box::new(lower_at(&l.left, next)?),
                Box::new(lower_at(&l.right, next)?),
            )
        }
        Expression::StaticMemberExpression(m) => Expr::Member {
            object: Box::new(lower_at(&m.object, next)?),
            property: Box::new(PropKey::Static(m.property.name.to_string())),
        },
        Expression::ComputedMemberExpression(m) => Expr::Member {
            object: Box::new(lower_at(&m.object, next)?),
            property: Box::new(PropKey::Computed(lower_at(&m.expression, next)?)),
        },
        Expression::CallExpression(_) | Expression::NewExpression(_) => {
            return Err("function calls are not allowed in style declarations".to_string())
        }
        Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_) => {
            return Err("functions are only allowed as the top-level theme function".to_string())
        }
        _ => return Err("unsupported expression in style declaration".to_string()),
    };
    Ok(lowered)
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    fn property(&self, key: &str) -> Result<Value, String> {
        match self {
            Value::Undefined | Value::Null => Err(format!(
                "cannot read property `{key}` of {}",
                self.to_js_string()
            )),
            Value::Object(entries) => Ok(entries
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Undefined)),
            Value::Array(items) => {
                if key == "length" {
                    return Ok(Value::Num(items.len() as f64));
                }
                Ok(key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or(Value::Undefined))
            }
            Value::Str(s) if key == "length" => Ok(Value::Num(s.chars().count() as f64)),
            _ => Ok(Value::Undefined),
        }
    }

    fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Num(n) => *n,
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Array(_) | Value::Object(_) => Value::Str(self.to_js_string()).to_number(),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
        }
    }

    fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }

    fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Num(_), Value::Str(_))
            | (Value::Str(_), Value::Num(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => self.to_number() == other.to_number(),
            _ => self.strict_eq(other),
        }
    }
}

struct Interpreter<'s> {
    scope: &'s Scope,
    level: EvalLevel,
    locals: Vec<(String, Value)>,
    constants: HashMap<String, Value>,
    resolving: Vec<String>,
    depth: usize,
    deadline: Instant,
    steps: usize,
    max_steps: usize,
}

impl<'s> Interpreter<'s> {
    fn new(scope: &'s Scope, options: &EvalOptions) -> Self {
        Self {
            scope,
            level: options.level,
            locals: Vec::new(),
            constants: HashMap::new(),
            resolving: Vec::new(),
            depth: 0,
            deadline: Instant::now() + Duration::from_millis(options.timeout_ms),
            steps: 0,
            max_steps: options.max_steps,
        }
    }

    fn tick(&mut self) -> Result<(), String> {
        self.steps += 1;
        if self.steps > self.max_steps || Instant::now() >= self.deadline {
            return Err("evaluation timed out".to_string());
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, String> {
        self.tick()?;
        if self.depth >= MAX_DEPTH {
            return Err(too_deep());
        }
        self.depth += 1;
        let value = self.eval_node(expr);
        self.depth -= 1;
        value
    }

    fn eval_node(&mut self, expr: &Expr) -> Result<Value, String> {
        let value = match expr {
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::Num(n) => Value::Num(*n),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Null => Value::Null,
            Expr::Undefined => Value::Undefined,
            Expr::Template { quasis, exprs } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(e) = exprs.get(i) {
                        out.push_str(&self.eval(e)?.to_js_string());
                    }
                }
                Value::Str(out)
            }
            Expr::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Object(props) => {
                let mut entries = Vec::with_capacity(props.len());
                for prop in props {
                    match prop {
                        Prop::Entry(key, value) => {
                            let key = self.key(key)?;
                            entries.push((key, self.eval(value)?));
                        }
                        Prop::Spread(e) => match self.eval(e)? {
                            Value::Object(spread) => entries.extend(spread),
                            v if v.is_nullish() => {}
                            _ => return Err("only objects can be spread".to_string()),
                        },
                    }
                }
                Value::Object(entries)
            }
            Expr::Ident(name) => self.lookup(name)?,
            Expr::Member { object, property } => {
                let object = self.eval(object)?;
                let key = self.key(property)?;
                object.property(&key)?
            }
            Expr::Conditional(test, consequent, alternate) => {
                if self.eval(test)?.truthy() {
                    self.eval(consequent)?
                } else {
                    self.eval(alternate)?
                }
            }
            Expr::Unary(op, argument) => {
                let argument = self.eval(argument)?;
                match op {
                    UnaryOp::Neg => Value::Num(-argument.to_number()),
                    UnaryOp::Plus => Value::Num(argument.to_number()),
                    UnaryOp::Not => Value::Bool(!argument.truthy()),
                    UnaryOp::TypeOf => Value::Str(argument.type_of().to_string()),
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Coalesce => !left.is_nullish(),
                };
                if short_circuit {
                    left
                } else {
                    self.eval(right)?
                }
            }
        };
        Ok(value)
    }

    fn key(&mut self, key: &PropKey) -> Result<String, String> {
        match key {
            PropKey::Static(s) => Ok(s.clone()),
            PropKey::Computed(e) => Ok(self.eval(e)?.to_js_string()),
        }
    }

    fn lookup(&mut self, name: &str) -> Result<Value, String> {
        if let Some((_, value)) = self.locals.iter().rev().find(|(n, _)| n == name) {
            return Ok(value.clone());
        }

        if self.level == EvalLevel::ModuleConstants {
            if let Some(value) = self.constants.get(name) {
                return Ok(value.clone());
            }
            if let Some(expr) = self.scope.get(name) {
                if self.resolving.iter().any(|n| n == name) {
                    return Err(format!("`{name}` is defined in terms of itself"));
                }
                self.resolving.push(name.to_string());
                let value = self.eval(expr);
                self.resolving.pop();
                let value = value?;
                self.constants.insert(name.to_string(), value.clone());
                return Ok(value);
            }
        }

        Err(format!("`{name}` cannot be resolved at build time"))
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let stringy = |v: &Value| matches!(v, Value::Str(_) | Value::Array(_) | Value::Object(_));
            if stringy(left) || stringy(right) {
                Value::Str(format!("{}{}", left.to_js_string(), right.to_js_string()))
            } else {
                Value::Num(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Num(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Num(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Num(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Num(left.to_number() % right.to_number()),
        BinaryOp::Exp => Value::Num(left.to_number().powf(right.to_number())),
        BinaryOp::StrictEq => Value::Bool(left.strict_eq(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_eq(right)),
        BinaryOp::LooseEq => Value::Bool(left.loose_eq(right)),
        BinaryOp::LooseNotEq => Value::Bool(!left.loose_eq(right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            let result = ordering.is_some_and(|o| match op {
                BinaryOp::Lt => o.is_lt(),
                BinaryOp::Le => o.is_le(),
                BinaryOp::Gt => o.is_gt(),
                _ => o.is_ge(),
            });
            Value::Bool(result)
        }
    }
}

fn to_style_object(value: Value) -> Result<StyleObject, String> {
    let Value::Object(entries) = value else {
        return Err(format!(
            "style declaration must be an object, got {}",
            value.type_of()
        ));
    };

    let mut object = StyleObject::new();
    for (key, value) in entries {
        let style_value = match value {
            Value::Str(s) => StyleValue::Str(s),
            Value::Num(n) => StyleValue::Num(n),
            nested @ Value::Object(_) => StyleValue::Nested(to_style_object(nested)?),
            other => {
                return Err(format!(
                    "value of `{key}` must be a string, number or nested object, got {}",
                    other.to_js_string()
                ))
            }
        };
        object.push(key, style_value);
    }
    Ok(object)
}
