//! Build configuration, loaded from a JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::eval::EvalOptions;
use crate::extract::ExtractOptions;
use crate::registry::RegistryOptions;
use crate::transformer::{TransformOptions, UnknownStylePolicy};
use crate::{
    FlowError, DEFAULT_CALLEE, DEFAULT_CLASS_PREFIX, DEFAULT_DIRECTIVE, DEFAULT_IMPORT_SOURCE,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct FlowConfig {
    /// Directory scanned for style calls.
    pub root: String,
    pub theme: Option<Value>,
    pub class_prefix: String,
    pub callee: String,
    pub directive: String,
    pub import_source: String,
    pub eval: EvalOptions,
    pub unknown_style: UnknownStylePolicy,
    /// Module ids containing any of these are never transformed as scripts.
    pub exclude: Vec<String>,
    pub minify: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            theme: None,
            class_prefix: DEFAULT_CLASS_PREFIX.to_string(),
            callee: DEFAULT_CALLEE.to_string(),
            directive: DEFAULT_DIRECTIVE.to_string(),
            import_source: DEFAULT_IMPORT_SOURCE.to_string(),
            eval: EvalOptions::default(),
            unknown_style: UnknownStylePolicy::default(),
            exclude: vec!["node_modules".to_string(), "/dist/".to_string()],
            minify: false,
        }
    }
}

impl FlowConfig {
    pub fn from_json_str(text: &str) -> Result<Self, FlowError> {
        let config: FlowConfig =
            serde_json::from_str(text).map_err(|e| FlowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Config(format!("failed to read '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_theme(mut self, theme: Value) -> Self {
        self.theme = Some(theme);
        self
    }

    fn validate(&self) -> Result<(), FlowError> {
        if self.class_prefix.is_empty() {
            return Err(FlowError::Config("classPrefix must not be empty".into()));
        }
        if self.callee.trim().is_empty() {
            return Err(FlowError::Config("callee must not be empty".into()));
        }
        if self.directive.trim().is_empty() || self.directive.starts_with('@') {
            return Err(FlowError::Config(
                "directive must be a bare at-rule name such as `flow-css`".into(),
            ));
        }
        if self.eval.timeout_ms == 0 {
            return Err(FlowError::Config("eval.timeoutMs must be positive".into()));
        }
        Ok(())
    }

    pub fn is_excluded(&self, id: &str) -> bool {
        self.exclude.iter().any(|pattern| id.contains(pattern.as_str()))
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            prefix: self.class_prefix.clone(),
            theme: self.theme.clone(),
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            callee: self.callee.clone(),
            import_source: self.import_source.clone(),
        }
    }

    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            extract: self.extract_options(),
            eval: self.eval.clone(),
            directive: self.directive.clone(),
            unknown_style: self.unknown_style,
            minify: self.minify,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::EvalLevel;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(FlowConfig::from_json_str("{}").unwrap(), FlowConfig::default());
    }

    #[test]
    fn camel_case_fields() {
        let config = FlowConfig::from_json_str(
            r##"{
                "root": "web",
                "classPrefix": "app",
                "unknownStyle": "leaveUnresolved",
                "eval": { "level": "moduleConstants", "timeoutMs": 50 },
                "theme": { "fg": "#111" },
                "minify": true
            }"##,
        )
        .unwrap();
        assert_eq!(config.root, "web");
        assert_eq!(config.class_prefix, "app");
        assert_eq!(config.unknown_style, UnknownStylePolicy::LeaveUnresolved);
        assert_eq!(config.eval.level, EvalLevel::ModuleConstants);
        assert_eq!(config.eval.timeout_ms, 50);
        assert_eq!(config.eval.max_steps, EvalOptions::default().max_steps);
        assert_eq!(config.theme, Some(json!({ "fg": "#111" })));
        assert!(config.transform_options().minify);
        assert_eq!(config.registry_options().prefix, "app");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = FlowConfig::from_json_str(r#"{ "prefix": "x" }"#).unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(FlowConfig::from_json_str(r#"{ "classPrefix": "" }"#).is_err());
        assert!(FlowConfig::from_json_str(r#"{ "directive": "@flow-css" }"#).is_err());
        assert!(FlowConfig::from_json_str(r#"{ "eval": { "timeoutMs": 0 } }"#).is_err());
    }

    #[test]
    fn default_excludes() {
        let config = FlowConfig::default();
        assert!(config.is_excluded("/app/node_modules/pkg/index.js"));
        assert!(config.is_excluded("/app/dist/bundle.js"));
        assert!(!config.is_excluded("/app/src/App.tsx"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow-css.json");
        std::fs::write(&path, r#"{ "callee": "style" }"#).unwrap();
        let config = FlowConfig::load(&path).unwrap();
        assert_eq!(config.callee, "style");
        assert_eq!(config.extract_options().callee, "style");

        assert!(FlowConfig::load(dir.path().join("missing.json")).is_err());
    }
}
