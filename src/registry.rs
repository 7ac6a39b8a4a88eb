//! The authoritative table of style declarations for one build root.
//!
//! The scanner writes here, the transformer reads here. Clones of a
//! [`Registry`] share the same state, so one instance handed to both sides
//! is the single source of truth. Individual operations are atomic; callers
//! still serialize scan/transform sequences per build root.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde_json::Value;

use crate::hash::hash;
use crate::style::{canonical_key, StyleDeclaration};
use crate::{FlowError, DEFAULT_CLASS_PREFIX};

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Namespace of every minted class name.
    pub prefix: String,
    /// Theme passed to theme-parameterized declarations.
    pub theme: Option<Value>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_CLASS_PREFIX.to_string(),
            theme: None,
        }
    }
}

/// A resolved, content-addressed declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleEntry {
    pub class_name: String,
    pub declaration: StyleDeclaration,
    /// Canonical key: the serialized, theme-resolved declaration.
    pub css: String,
}

#[derive(Debug, Default)]
struct RegistryState {
    styles: IndexMap<String, StyleEntry>,
    build_dependencies: IndexSet<String>,
    style_roots: IndexSet<String>,
    stale: bool,
}

/// Shared style table with provenance and staleness tracking.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    options: Arc<RegistryOptions>,
    state: Arc<RwLock<RegistryState>>,
}

impl Registry {
    pub fn new(options: RegistryOptions) -> Self {
        Self {
            options: Arc::new(options),
            state: Arc::new(RwLock::new(RegistryState::default())),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.options.prefix
    }

    pub fn theme(&self) -> Option<&Value> {
        self.options.theme.as_ref()
    }

    /// Resolve `declaration` against the theme and mint its class name.
    ///
    /// This is the only fallible step of registration (`MissingTheme`, or a
    /// theme function that evaluates to a malformed object).
    pub fn prepare(&self, declaration: StyleDeclaration) -> Result<StyleEntry, FlowError> {
        let css = canonical_key(&declaration, self.theme())?;
        Ok(StyleEntry {
            class_name: hash(self.prefix(), &css),
            declaration,
            css,
        })
    }

    /// Class name `declaration` would be registered under.
    pub fn class_name(&self, declaration: &StyleDeclaration) -> Result<String, FlowError> {
        let css = canonical_key(declaration, self.theme())?;
        Ok(hash(self.prefix(), &css))
    }

    /// Insert or overwrite an entry and record `source_file` as a build dependency.
    pub fn add_style(&self, entry: StyleEntry, source_file: &str) {
        let mut state = self.state.write();
        state.build_dependencies.insert(source_file.to_string());
        state.styles.insert(entry.class_name.clone(), entry);
    }

    /// Record `file` as a style root.
    pub fn add_root(&self, file: &str) {
        self.state.write().style_roots.insert(file.to_string());
    }

    /// Class name of `declaration` if it is registered.
    pub fn lookup(&self, declaration: &StyleDeclaration) -> Result<Option<String>, FlowError> {
        let class_name = self.class_name(declaration)?;
        Ok(self.has_class_name(&class_name).then_some(class_name))
    }

    pub fn has_class_name(&self, class_name: &str) -> bool {
        self.state.read().styles.contains_key(class_name)
    }

    /// Drop all styles, dependencies and roots, and mark the registry stale.
    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.styles.clear();
        state.build_dependencies.clear();
        state.style_roots.clear();
        state.stale = true;
    }

    /// Clear the stale flag without touching the data.
    pub fn mark_fresh(&self) {
        self.state.write().stale = false;
    }

    pub fn is_stale(&self) -> bool {
        self.state.read().stale
    }

    /// All entries in registration order.
    pub fn styles(&self) -> Vec<StyleEntry> {
        self.state.read().styles.values().cloned().collect()
    }

    pub fn style(&self, class_name: &str) -> Option<StyleEntry> {
        self.state.read().styles.get(class_name).cloned()
    }

    pub fn build_dependencies(&self) -> Vec<String> {
        self.state.read().build_dependencies.iter().cloned().collect()
    }

    pub fn style_roots(&self) -> Vec<String> {
        self.state.read().style_roots.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stylesheet text for every registered entry, one rule per line.
    pub fn generate_css(&self) -> String {
        self.state
            .read()
            .styles
            .values()
            .map(|entry| format!(".{} {{{}}}", entry.class_name, entry.css))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::evaluate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn entry(registry: &Registry, text: &str) -> StyleEntry {
        registry.prepare(evaluate(text).unwrap()).unwrap()
    }

    #[test]
    fn add_and_lookup() {
        let registry = Registry::default();
        let red = entry(&registry, r#"{ background: "red" }"#);
        let class_name = red.class_name.clone();
        registry.add_style(red, "/src/app.ts");

        let decl = evaluate(r#"{ background: "red" }"#).unwrap();
        assert_eq!(registry.lookup(&decl).unwrap(), Some(class_name));
        assert_eq!(registry.build_dependencies(), vec!["/src/app.ts"]);
    }

    #[test]
    fn lookup_missing_is_none() {
        let registry = Registry::default();
        let decl = evaluate(r#"{ color: "blue" }"#).unwrap();
        assert_eq!(registry.lookup(&decl).unwrap(), None);
    }

    #[test]
    fn identical_content_collapses() {
        let registry = Registry::default();
        registry.add_style(entry(&registry, r#"{ color: "blue" }"#), "/a.ts");
        registry.add_style(entry(&registry, r#"{ color: 'blue' }"#), "/b.ts");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.build_dependencies(), vec!["/a.ts", "/b.ts"]);
    }

    #[test]
    fn class_names_use_prefix() {
        let registry = Registry::new(RegistryOptions {
            prefix: "app".into(),
            theme: None,
        });
        let red = entry(&registry, r#"{ color: "red" }"#);
        assert!(red.class_name.starts_with("app-"));
        assert_eq!(red.css, "color:red;");
    }

    #[test]
    fn themed_declarations_need_a_theme() {
        let registry = Registry::default();
        let decl = evaluate("(t) => ({ color: t.fg })").unwrap();
        assert!(matches!(registry.prepare(decl), Err(FlowError::MissingTheme)));

        let themed = Registry::new(RegistryOptions {
            theme: Some(json!({ "fg": "red" })),
            ..Default::default()
        });
        let decl = evaluate("(t) => ({ color: t.fg })").unwrap();
        let resolved = themed.prepare(decl).unwrap();
        let literal = entry(&themed, r#"{ color: "red" }"#);
        assert_eq!(resolved.class_name, literal.class_name);
    }

    #[test]
    fn invalidate_clears_everything() {
        let registry = Registry::default();
        registry.add_style(entry(&registry, r#"{ color: "red" }"#), "/a.ts");
        registry.add_root("/index.css");
        assert!(!registry.is_stale());

        registry.invalidate();
        assert!(registry.is_stale());
        assert!(registry.styles().is_empty());
        assert!(registry.build_dependencies().is_empty());
        assert!(registry.style_roots().is_empty());

        registry.mark_fresh();
        assert!(!registry.is_stale());
    }

    #[test]
    fn clones_share_state() {
        let registry = Registry::default();
        let handle = registry.clone();
        handle.add_root("/index.css");
        assert_eq!(registry.style_roots(), vec!["/index.css"]);
    }

    #[test]
    fn generate_css_preserves_registration_order() {
        let registry = Registry::default();
        let red = entry(&registry, r#"{ background: "red" }"#);
        let blue = entry(&registry, r#"{ color: "blue" }"#);
        let expected = format!(
            ".{} {{background:red;}}\n.{} {{color:blue;}}",
            red.class_name, blue.class_name
        );
        registry.add_style(red, "/a.ts");
        registry.add_style(blue, "/a.ts");
        assert_eq!(registry.generate_css(), expected);
    }

    #[test]
    fn thread_safety() {
        use std::thread;

        let registry = Registry::default();
        let clone = registry.clone();
        let red = entry(&registry, r#"{ color: "red" }"#);

        let handle = thread::spawn(move || clone.add_style(red, "/thread.ts"));
        handle.join().unwrap();
        assert_eq!(registry.len(), 1);
    }
}
