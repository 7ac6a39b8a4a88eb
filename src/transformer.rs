//! Rewrites script modules and style roots against the registry.
//!
//! Script side: every style call becomes a quoted class name. Stylesheet
//! side: the directive placeholder becomes the generated stylesheet. The
//! transformer never registers styles; a call whose declaration is missing
//! from the registry means the scan and the transform have drifted apart.

use std::sync::Arc;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::eval::EvalOptions;
use crate::extract::{extract, ExtractOptions};
use crate::registry::Registry;
use crate::style::StyleDeclaration;
use crate::utils::{
    apply_edits, declaration_removal_range, js_string_literal, specifier_removal_range, Edit,
};
use crate::{FlowError, DEFAULT_DIRECTIVE};

// ---------------------------------------------------------------------------
// Stylesheet oracle
// ---------------------------------------------------------------------------

/// Decides whether text is a well-formed stylesheet.
pub trait StylesheetParser: Send + Sync {
    fn validate(&self, css: &str) -> Result<(), String>;

    /// Minified form of an already validated stylesheet.
    fn minify(&self, css: &str) -> Result<String, String> {
        Ok(css.to_string())
    }
}

/// The default oracle, backed by lightningcss.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightningCss;

impl StylesheetParser for LightningCss {
    fn validate(&self, css: &str) -> Result<(), String> {
        StyleSheet::parse(css, ParserOptions::default())
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn minify(&self, css: &str) -> Result<String, String> {
        let mut stylesheet = StyleSheet::parse(css, ParserOptions::default())
            .map_err(|e| format!("CSS parse error: {e}"))?;
        stylesheet
            .minify(MinifyOptions::default())
            .map_err(|e| format!("CSS minify error: {e}"))?;
        let result = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                ..Default::default()
            })
            .map_err(|e| format!("CSS print error: {e}"))?;
        Ok(result.code)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What to do with a call whose declaration is not registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnknownStylePolicy {
    /// Fail the module with `UnknownStyleReference`.
    #[default]
    Abort,
    /// Keep the original call text.
    LeaveUnresolved,
    /// Substitute the class name the declaration would have had.
    Substitute,
}

/// Callback invoked with the declaration and file of every unknown style.
pub type UnknownStyleHook = Arc<dyn Fn(&StyleDeclaration, &str) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub extract: ExtractOptions,
    pub eval: EvalOptions,
    /// At-rule name of the placeholder, without the `@`.
    pub directive: String,
    pub unknown_style: UnknownStylePolicy,
    pub minify: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            extract: ExtractOptions::default(),
            eval: EvalOptions::default(),
            directive: DEFAULT_DIRECTIVE.to_string(),
            unknown_style: UnknownStylePolicy::default(),
            minify: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub code: String,
    /// Class names substituted, in source order.
    pub class_names: Vec<String>,
    /// Calls left in place under [`UnknownStylePolicy::LeaveUnresolved`].
    pub unresolved: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetOutput {
    pub code: String,
    /// Files whose styles went into `code`; hosts watch these.
    pub dependencies: Vec<String>,
    /// Whether the directive was found and the file recorded as a style root.
    pub is_root: bool,
}

// ---------------------------------------------------------------------------
// Transformer
// ---------------------------------------------------------------------------

pub struct Transformer {
    registry: Registry,
    options: TransformOptions,
    directive: Regex,
    parser: Arc<dyn StylesheetParser>,
    on_unknown_style: Option<UnknownStyleHook>,
}

impl Transformer {
    pub fn new(registry: Registry, options: TransformOptions) -> Result<Self, FlowError> {
        let directive = directive_regex(&options.directive)?;
        Ok(Self {
            registry,
            options,
            directive,
            parser: Arc::new(LightningCss),
            on_unknown_style: None,
        })
    }

    pub fn with_parser(mut self, parser: Arc<dyn StylesheetParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_unknown_style_hook(mut self, hook: UnknownStyleHook) -> Self {
        self.on_unknown_style = Some(hook);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Whether `code` contains the directive placeholder.
    pub fn has_directive(&self, code: &str) -> bool {
        self.directive.is_match(code)
    }

    /// Replace every style call of a script module with its class name.
    ///
    /// Returns `None` when the module has no style calls.
    pub fn transform_script(
        &self,
        code: &str,
        file: &str,
    ) -> Result<Option<ScriptOutput>, FlowError> {
        let styles = extract(code, file, &self.options.extract)?;
        if styles.calls.is_empty() {
            return Ok(None);
        }

        let mut edits = Vec::with_capacity(styles.calls.len() + styles.imports.len());
        let mut class_names = Vec::with_capacity(styles.calls.len());
        let mut unresolved = 0;

        for call in &styles.calls {
            let declaration = styles.evaluate(call, file, &self.options.eval)?;
            let entry = self
                .registry
                .prepare(declaration)
                .map_err(|err| FlowError::Extraction {
                    file: file.to_string(),
                    reason: err.to_string(),
                    source: Some(Box::new(err)),
                })?;

            if !self.registry.has_class_name(&entry.class_name) {
                warn!(
                    file,
                    class_name = %entry.class_name,
                    css = %entry.css,
                    "style not found in registry"
                );
                if let Some(hook) = &self.on_unknown_style {
                    hook(&entry.declaration, file);
                }
                match self.options.unknown_style {
                    UnknownStylePolicy::Abort => {
                        return Err(FlowError::UnknownStyleReference {
                            file: file.to_string(),
                            class_name: entry.class_name,
                            css: entry.css,
                        });
                    }
                    UnknownStylePolicy::LeaveUnresolved => {
                        unresolved += 1;
                        continue;
                    }
                    UnknownStylePolicy::Substitute => {}
                }
            }

            edits.push(Edit::replace(
                call.span.clone(),
                js_string_literal(&entry.class_name),
            ));
            class_names.push(entry.class_name);
        }

        if unresolved == 0 && styles.other_references == 0 {
            for import in &styles.imports {
                let range = if import.specifier_count == 1 {
                    declaration_removal_range(code, import.declaration.clone())
                } else {
                    specifier_removal_range(code, import.specifier.clone())
                };
                edits.push(Edit::delete(range));
            }
        }

        debug!(file, substituted = class_names.len(), unresolved, "script transformed");
        Ok(Some(ScriptOutput {
            code: apply_edits(code, edits),
            class_names,
            unresolved,
        }))
    }

    /// Expand the directive of a style root into the generated stylesheet.
    pub fn transform_stylesheet(
        &self,
        code: &str,
        file: &str,
    ) -> Result<StylesheetOutput, FlowError> {
        self.parser
            .validate(code)
            .map_err(|reason| FlowError::InvalidSource {
                file: file.to_string(),
                reason,
            })?;

        let generated = self.registry.generate_css();
        if let Err(reason) = self.parser.validate(&generated) {
            error!(file, css = %generated, %reason, "generated stylesheet is invalid");
            self.registry.invalidate();
            return Err(FlowError::InvalidGeneratedCss {
                reason,
                css: generated,
            });
        }

        let is_root = self.directive.is_match(code);
        let mut output = self
            .directive
            .replace_all(code, NoExpand(&generated))
            .into_owned();
        if is_root {
            self.registry.add_root(file);
        }

        if self.options.minify {
            output = self
                .parser
                .minify(&output)
                .map_err(|reason| FlowError::InvalidSource {
                    file: file.to_string(),
                    reason,
                })?;
        }

        debug!(file, is_root, styles = self.registry.len(), "stylesheet transformed");
        Ok(StylesheetOutput {
            code: output,
            dependencies: self.registry.build_dependencies(),
            is_root,
        })
    }
}

fn directive_regex(directive: &str) -> Result<Regex, FlowError> {
    Regex::new(&format!(r"@{}\s*(?:;|\z)", regex::escape(directive)))
        .map_err(|e| FlowError::Config(format!("invalid directive `{directive}`: {e}")))
}
