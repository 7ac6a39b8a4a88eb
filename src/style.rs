//! Canonical style-object model and its serializer.
//!
//! A [`StyleObject`] keeps entries in source order. Serialization walks that
//! order, so the canonical key of a declaration is a function of its source
//! text, not of its meaning: `{ a, b }` and `{ b, a }` hash differently.

use std::fmt::Write as _;

use serde_json::Value;

use crate::eval::{self, Binding, EvalOptions, Expr, Scope};
use crate::FlowError;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A leaf value or a nested block.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleValue {
    Str(String),
    Num(f64),
    /// Nested selector, at-rule, or custom block.
    Nested(StyleObject),
}

/// Ordered property/selector tree. Keys are never deduplicated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleObject {
    entries: Vec<(String, StyleValue)>,
}

impl StyleObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: StyleValue) {
        self.entries.push((key.into(), value));
    }

    /// Builder form of [`StyleObject::push`].
    pub fn with(mut self, key: impl Into<String>, value: StyleValue) -> Self {
        self.push(key, value);
        self
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&StyleValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn entries(&self) -> &[(String, StyleValue)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A deferred declaration: the body of `(theme) => ({ ... })`.
///
/// The body is kept in lowered form together with the module constants it
/// could reference, so it can be evaluated long after the source module was
/// parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeFunction {
    /// Source text of the arrow function, for diagnostics.
    pub(crate) text: String,
    pub(crate) param: Binding,
    pub(crate) body: Expr,
    pub(crate) scope: Scope,
    pub(crate) options: EvalOptions,
}

impl ThemeFunction {
    /// Evaluate the body with `theme` bound to the parameter.
    pub fn call(&self, theme: &Value) -> Result<StyleObject, FlowError> {
        eval::apply_theme(self, theme)
    }
}

/// A style declaration as written at a call site.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleDeclaration {
    Static(StyleObject),
    Themed(ThemeFunction),
}

impl StyleDeclaration {
    /// Materialize the declaration against the configured theme.
    pub fn resolve(&self, theme: Option<&Value>) -> Result<StyleObject, FlowError> {
        match self {
            StyleDeclaration::Static(object) => Ok(object.clone()),
            StyleDeclaration::Themed(function) => {
                let theme = theme.ok_or(FlowError::MissingTheme)?;
                function.call(theme)
            }
        }
    }

    pub fn is_themed(&self) -> bool {
        matches!(self, StyleDeclaration::Themed(_))
    }
}

impl From<StyleObject> for StyleDeclaration {
    fn from(object: StyleObject) -> Self {
        StyleDeclaration::Static(object)
    }
}

/// Resolve then serialize; the canonical key of `declaration`.
pub fn canonical_key(
    declaration: &StyleDeclaration,
    theme: Option<&Value>,
) -> Result<String, FlowError> {
    Ok(serialize(&declaration.resolve(theme)?))
}

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

/// Serialize a style object into flattened CSS text.
///
/// Leaves become `property:value;` with the property hyphenated, nested
/// entries become `key{...}` with the key kept verbatim.
pub fn serialize(object: &StyleObject) -> String {
    let mut out = String::new();
    write_object(&mut out, object);
    out
}

fn write_object(out: &mut String, object: &StyleObject) {
    for (key, value) in &object.entries {
        match value {
            StyleValue::Str(s) => {
                let _ = write!(out, "{}:{};", property_name(key), s);
            }
            StyleValue::Num(n) => {
                let _ = write!(out, "{}:{};", property_name(key), format_number(*n));
            }
            StyleValue::Nested(inner) => {
                out.push_str(key);
                out.push('{');
                write_object(out, inner);
                out.push('}');
            }
        }
    }
}

/// Convert a camelCase property to its CSS form.
///
/// `backgroundColor` → `background-color`, `WebkitTransition` →
/// `-webkit-transition`, `msTransform` → `-ms-transform`. Custom properties
/// (`--brandColor`) are case-sensitive and pass through untouched.
pub fn property_name(key: &str) -> String {
    if key.starts_with("--") {
        return key.to_string();
    }

    let mut out = String::with_capacity(key.len() + 4);
    let mut chars = key.chars().peekable();

    if key.starts_with("ms") && key[2..].starts_with(|c: char| c.is_ascii_uppercase()) {
        out.push_str("-ms");
        chars.next();
        chars.next();
    }

    for c in chars {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Format a number the way JavaScript's `String(n)` does.
///
/// Magnitudes from `1e21` up and below `1e-6` use exponent form, with an
/// explicit `+` on positive exponents.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        let text = format!("{n:e}");
        match text.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => text,
        }
    } else {
        format!("{n}")
    }
}
