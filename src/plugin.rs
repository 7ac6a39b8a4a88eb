//! FlowPlugin - bundler-facing driver for one build root.
//!
//! Owns the registry, the scanner and the transformer, and implements the
//! dev-loop protocol on top of them:
//! 1. `build_start` runs a full scan before any module is transformed
//! 2. `transform` rewrites scripts and expands style roots
//! 3. `hot_update` rescans the changed file and reports which style roots
//!    the host must reload
//!
//! Hosts must not run a transform while a scan of the same plugin is in
//! flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::FlowConfig;
use crate::file_service::{classify, FileKind, FileService};
use crate::registry::Registry;
use crate::scanner::{ScanSummary, Scanner};
use crate::transformer::{
    ScriptOutput, StylesheetOutput, StylesheetParser, Transformer, UnknownStyleHook,
};
use crate::FlowError;

/// Whether generated stylesheets still match the sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildState {
    Fresh,
    /// A script with styles changed; style roots have not been regenerated yet.
    PotentiallyStale,
    /// The registry was invalidated and needs a full scan.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutput {
    Script(ScriptOutput),
    Stylesheet(StylesheetOutput),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HotUpdate {
    /// A full rescan ran because the registry was stale.
    pub rescanned: bool,
    /// Style roots the host must reload.
    pub roots: Vec<String>,
}

pub struct FlowPlugin<F> {
    config: FlowConfig,
    registry: Registry,
    scanner: Scanner<F>,
    transformer: Transformer,
    /// Style roots seen so far; survives registry invalidation.
    roots: Mutex<IndexSet<String>>,
    pending: AtomicBool,
}

impl<F: FileService> FlowPlugin<F> {
    pub fn new(config: FlowConfig, fs: F) -> Result<Self, FlowError> {
        let registry = Registry::new(config.registry_options());
        let scanner = Scanner::new(config.root.clone(), registry.clone(), fs)
            .with_extract_options(config.extract_options())
            .with_eval_options(config.eval.clone());
        let transformer = Transformer::new(registry.clone(), config.transform_options())?;
        Ok(Self {
            config,
            registry,
            scanner,
            transformer,
            roots: Mutex::new(IndexSet::new()),
            pending: AtomicBool::new(false),
        })
    }

    pub fn with_parser(mut self, parser: Arc<dyn StylesheetParser>) -> Self {
        self.transformer = self.transformer.with_parser(parser);
        self
    }

    pub fn with_unknown_style_hook(mut self, hook: UnknownStyleHook) -> Self {
        self.transformer = self.transformer.with_unknown_style_hook(hook);
        self
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scanner(&self) -> &Scanner<F> {
        &self.scanner
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    /// Full scan of the root.
    pub async fn build_start(&self) -> Result<ScanSummary, FlowError> {
        let summary = self.scanner.scan_all().await?;
        self.pending.store(false, Ordering::SeqCst);
        Ok(summary)
    }

    /// Transform one module. `None` means the host keeps the module as is.
    pub fn transform(&self, code: &str, id: &str) -> Result<Option<TransformOutput>, FlowError> {
        match classify(id) {
            FileKind::Stylesheet => {
                if !self.transformer.has_directive(code) {
                    return Ok(None);
                }
                let output = self.transformer.transform_stylesheet(code, id)?;
                if output.is_root {
                    self.roots.lock().insert(id.to_string());
                    self.pending.store(false, Ordering::SeqCst);
                }
                Ok(Some(TransformOutput::Stylesheet(output)))
            }
            FileKind::Script if !self.config.is_excluded(id) => Ok(self
                .transformer
                .transform_script(code, id)?
                .map(TransformOutput::Script)),
            _ => Ok(None),
        }
    }

    /// Rescan a changed file, or the whole root when the registry is stale.
    pub async fn hot_update(&self, file: &str) -> Result<HotUpdate, FlowError> {
        let rescanned = self.registry.is_stale();
        if rescanned {
            info!(file, "registry is stale, rescanning");
            self.scanner.scan_all().await?;
        } else if !self.scanner.scan_file(file).await? {
            debug!(file, "hot update without styles");
            return Ok(HotUpdate::default());
        }
        self.pending.store(true, Ordering::SeqCst);

        let mut roots = self.roots.lock().clone();
        roots.extend(self.registry.style_roots());
        Ok(HotUpdate {
            rescanned,
            roots: roots.into_iter().collect(),
        })
    }

    pub fn state(&self) -> RebuildState {
        if self.registry.is_stale() {
            RebuildState::Stale
        } else if self.pending.load(Ordering::SeqCst) {
            RebuildState::PotentiallyStale
        } else {
            RebuildState::Fresh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_service::FileServiceStub;
    use pretty_assertions::assert_eq;

    const APP: &str = r#"import { css } from "flow-css/core/css";
export const title = css({ color: "blue" });
"#;

    fn plugin(fs: FileServiceStub) -> FlowPlugin<FileServiceStub> {
        FlowPlugin::new(FlowConfig::default().with_root("/app"), fs).unwrap()
    }

    #[tokio::test]
    async fn build_then_transform() {
        let fs = FileServiceStub::new()
            .with_file("/app/src/App.tsx", APP)
            .with_file("/app/src/index.css", "@flow-css;");
        let plugin = plugin(fs);
        let summary = plugin.build_start().await.unwrap();
        assert_eq!(summary.styles, 1);

        let Some(TransformOutput::Script(script)) =
            plugin.transform(APP, "/app/src/App.tsx").unwrap()
        else {
            panic!("expected a script output");
        };
        assert!(!script.code.contains("css("));
        assert!(!script.code.contains("flow-css/core/css"));

        let Some(TransformOutput::Stylesheet(sheet)) =
            plugin.transform("@flow-css;", "/app/src/index.css").unwrap()
        else {
            panic!("expected a stylesheet output");
        };
        assert!(sheet.code.contains("color:blue;"));
        assert_eq!(plugin.state(), RebuildState::Fresh);
    }

    #[tokio::test]
    async fn skips_excluded_and_unrelated_modules() {
        let plugin = plugin(FileServiceStub::new());
        plugin.build_start().await.unwrap();
        assert_eq!(
            plugin
                .transform(APP, "/app/node_modules/lib/index.js")
                .unwrap(),
            None
        );
        assert_eq!(plugin.transform(APP, "/app/dist/App.js").unwrap(), None);
        assert_eq!(plugin.transform("a{}", "/app/src/plain.css").unwrap(), None);
        assert_eq!(plugin.transform("x", "/app/logo.svg").unwrap(), None);
        assert_eq!(plugin.transform("@flow-css;", "/app/a.css?inline").unwrap(), None);
    }

    #[tokio::test]
    async fn hot_update_marks_roots_for_reload() {
        let fs = FileServiceStub::new().with_file("/app/src/App.tsx", APP);
        let plugin = plugin(fs.clone());
        plugin.build_start().await.unwrap();
        plugin.transform("@flow-css;", "/app/src/index.css").unwrap();

        fs.set_file("/app/src/App.tsx", r#"css({ color: "green" })"#);
        let update = plugin.hot_update("/app/src/App.tsx").await.unwrap();
        assert_eq!(
            update,
            HotUpdate {
                rescanned: false,
                roots: vec!["/app/src/index.css".to_string()],
            }
        );
        assert_eq!(plugin.state(), RebuildState::PotentiallyStale);

        plugin.transform("@flow-css;", "/app/src/index.css").unwrap();
        assert_eq!(plugin.state(), RebuildState::Fresh);
    }

    #[tokio::test]
    async fn hot_update_without_styles_is_quiet() {
        let fs = FileServiceStub::new().with_file("/app/src/util.ts", "export const x = 1;");
        let plugin = plugin(fs);
        plugin.build_start().await.unwrap();
        let update = plugin.hot_update("/app/src/util.ts").await.unwrap();
        assert_eq!(update, HotUpdate::default());
        assert_eq!(plugin.state(), RebuildState::Fresh);
    }

    #[tokio::test]
    async fn stale_registry_triggers_full_rescan() {
        let fs = FileServiceStub::new()
            .with_file("/app/src/App.tsx", APP)
            .with_file("/app/src/Other.tsx", r#"css({ margin: 0 })"#);
        let plugin = plugin(fs);
        plugin.build_start().await.unwrap();
        plugin.transform("@flow-css;", "/app/src/index.css").unwrap();

        plugin.registry().invalidate();
        assert_eq!(plugin.state(), RebuildState::Stale);

        let update = plugin.hot_update("/app/src/App.tsx").await.unwrap();
        assert!(update.rescanned);
        assert_eq!(update.roots, vec!["/app/src/index.css"]);
        assert_eq!(plugin.registry().len(), 2);
        assert_eq!(plugin.state(), RebuildState::PotentiallyStale);
    }
}
