//! # Flow CSS
//!
//! Build-time extraction for co-located style declarations.
//!
//! Source modules call `css({ ... })`. The scanner evaluates every call,
//! content-addresses the resulting declaration, and records it in the
//! [`Registry`]. The transformer then rewrites each call into a quoted class
//! name and expands the `@flow-css;` directive of every style root into the
//! generated stylesheet. Nothing is left for the browser to compute.
//!
//! The registry is the only shared mutable state. Hosts create one per build
//! root and must serialize scans and transforms against it; see
//! [`plugin::FlowPlugin`] for the development-loop protocol.

pub mod config;
pub mod eval;
pub mod extract;
pub mod file_service;
pub mod hash;
pub mod plugin;
pub mod registry;
pub mod scanner;
pub mod style;
pub mod transformer;
pub mod utils;

use thiserror::Error;

pub use config::FlowConfig;
pub use eval::{evaluate, EvalLevel, EvalOptions};
pub use extract::ExtractOptions;
pub use file_service::{classify, FileKind, FileService, FileServiceStub, FsFileService};
pub use plugin::{FlowPlugin, HotUpdate, RebuildState, TransformOutput};
pub use registry::{Registry, RegistryOptions, StyleEntry};
pub use scanner::{ScanSummary, Scanner};
pub use style::{serialize, StyleDeclaration, StyleObject, StyleValue, ThemeFunction};
pub use transformer::{
    LightningCss, ScriptOutput, StylesheetOutput, StylesheetParser, TransformOptions, Transformer,
    UnknownStyleHook, UnknownStylePolicy,
};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Namespace prepended to every generated class name.
pub const DEFAULT_CLASS_PREFIX: &str = "flow";

/// Callee text identifying a style declaration call site.
pub const DEFAULT_CALLEE: &str = "css";

/// At-rule name replaced by the generated stylesheet in style roots.
pub const DEFAULT_DIRECTIVE: &str = "flow-css";

/// Module specifier the `css` entry point is imported from.
pub const DEFAULT_IMPORT_SOURCE: &str = "flow-css/core/css";

// ---------------------------------------------------------------------------
// FlowError
// ---------------------------------------------------------------------------

/// Errors surfaced by the extraction pipeline. None are retried internally.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Malformed style declaration `{text}`: {reason}")]
    MalformedDeclaration { text: String, reason: String },

    #[error("Flow CSS theme is requested but not available")]
    MissingTheme,

    #[error("Failed to extract styles from {file}: {reason}")]
    Extraction {
        file: String,
        reason: String,
        #[source]
        source: Option<Box<FlowError>>,
    },

    #[error("Invalid source {file}: {reason}")]
    InvalidSource { file: String, reason: String },

    #[error("Invalid generated CSS: {reason}")]
    InvalidGeneratedCss { reason: String, css: String },

    #[error("Style not found in {file}; the scanner must have missed `{css}` ({class_name})")]
    UnknownStyleReference {
        file: String,
        class_name: String,
        css: String,
    },

    #[error("File {path} not found")]
    FileNotFound { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl FlowError {
    /// The innermost error, following extraction wrappers.
    pub fn root_cause(&self) -> &FlowError {
        match self {
            FlowError::Extraction {
                source: Some(inner),
                ..
            } => inner.root_cause(),
            other => other,
        }
    }
}
