//! Populates the registry from source files.

use tracing::{debug, info};

use crate::eval::EvalOptions;
use crate::extract::{extract, ExtractOptions};
use crate::file_service::{classify, FileKind, FileService};
use crate::registry::Registry;
use crate::FlowError;

/// Outcome of a full scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Script files parsed.
    pub files_scanned: usize,
    /// Script files that contained at least one style call.
    pub files_with_styles: usize,
    /// Distinct styles in the registry after the scan.
    pub styles: usize,
}

pub struct Scanner<F> {
    root: String,
    registry: Registry,
    fs: F,
    extract: ExtractOptions,
    eval: EvalOptions,
}

impl<F: FileService> Scanner<F> {
    pub fn new(root: impl Into<String>, registry: Registry, fs: F) -> Self {
        Self {
            root: root.into(),
            registry,
            fs,
            extract: ExtractOptions::default(),
            eval: EvalOptions::default(),
        }
    }

    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract = options;
        self
    }

    pub fn with_eval_options(mut self, options: EvalOptions) -> Self {
        self.eval = options;
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn file_service(&self) -> &F {
        &self.fs
    }

    /// Scan every file under the root, then mark the registry fresh.
    pub async fn scan_all(&self) -> Result<ScanSummary, FlowError> {
        let files = self.fs.list_files(&self.root).await?;
        let mut summary = ScanSummary::default();

        for file in &files {
            if classify(file) != FileKind::Script {
                continue;
            }
            summary.files_scanned += 1;
            if self.scan_file(file).await? {
                summary.files_with_styles += 1;
            }
        }

        self.registry.mark_fresh();
        summary.styles = self.registry.len();
        info!(
            root = %self.root,
            files = summary.files_scanned,
            with_styles = summary.files_with_styles,
            styles = summary.styles,
            "flow-css scan complete"
        );
        Ok(summary)
    }

    /// Scan one file. Returns whether it contains style calls.
    pub async fn scan_file(&self, file: &str) -> Result<bool, FlowError> {
        if classify(file) != FileKind::Script {
            return Ok(false);
        }
        let code = self.fs.read_file(file).await?;
        self.scan_source(&code, file)
    }

    /// Register the styles of already-loaded module text.
    ///
    /// Every call is evaluated before anything is registered, so a failing
    /// call leaves the registry untouched.
    pub fn scan_source(&self, code: &str, file: &str) -> Result<bool, FlowError> {
        if classify(file) != FileKind::Script {
            return Ok(false);
        }
        let styles = extract(code, file, &self.extract)?;

        let mut entries = Vec::with_capacity(styles.calls.len());
        for call in &styles.calls {
            let declaration = styles.evaluate(call, file, &self.eval)?;
            let entry = self
                .registry
                .prepare(declaration)
                .map_err(|err| FlowError::Extraction {
                    file: file.to_string(),
                    reason: err.to_string(),
                    source: Some(Box::new(err)),
                })?;
            debug!(file, class_name = %entry.class_name, css = %entry.css, "style declaration");
            entries.push(entry);
        }

        let found = !entries.is_empty();
        for entry in entries {
            self.registry.add_style(entry, file);
        }
        debug!(file, calls = styles.calls.len(), "scanned");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::EvalLevel;
    use crate::file_service::FileServiceStub;
    use crate::registry::RegistryOptions;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scanner(fs: FileServiceStub) -> Scanner<FileServiceStub> {
        Scanner::new("/app", Registry::default(), fs)
    }

    #[tokio::test]
    async fn scans_every_script() {
        let fs = FileServiceStub::new()
            .with_file("/app/a.ts", r#"css({ background: "red" });"#)
            .with_file("/app/b.tsx", r#"css({ color: "blue" }); css({ color: "blue" });"#)
            .with_file("/app/plain.js", "export const x = 1;")
            .with_file("/app/index.css", "@flow-css;");
        let scanner = scanner(fs);

        let summary = scanner.scan_all().await.unwrap();
        assert_eq!(
            summary,
            ScanSummary {
                files_scanned: 3,
                files_with_styles: 2,
                styles: 2,
            }
        );
        assert_eq!(
            scanner.registry().build_dependencies(),
            vec!["/app/a.ts", "/app/b.tsx"]
        );
    }

    #[tokio::test]
    async fn non_scripts_are_skipped() {
        let fs = FileServiceStub::new().with_file("/app/readme.md", "css({ color: 'red' })");
        let scanner = scanner(fs);
        assert!(!scanner.scan_file("/app/readme.md").await.unwrap());
        assert!(scanner.registry().is_empty());
    }

    #[tokio::test]
    async fn one_bad_call_registers_nothing() {
        let fs = FileServiceStub::new().with_file(
            "/app/a.ts",
            r#"css({ color: "red" }); css({ color: fetchColor() });"#,
        );
        let scanner = scanner(fs);
        let err = scanner.scan_file("/app/a.ts").await.unwrap_err();
        assert!(matches!(err, FlowError::Extraction { .. }));
        assert!(matches!(err.root_cause(), FlowError::MalformedDeclaration { .. }));
        assert!(scanner.registry().is_empty());
    }

    #[tokio::test]
    async fn missing_theme_is_an_extraction_error() {
        let fs = FileServiceStub::new().with_file("/app/a.ts", "css((t) => ({ color: t.fg }));");
        let scanner = scanner(fs);
        let err = scanner.scan_file("/app/a.ts").await.unwrap_err();
        assert!(matches!(err.root_cause(), FlowError::MissingTheme));
    }

    #[tokio::test]
    async fn themed_calls_resolve_with_a_theme() {
        let registry = Registry::new(RegistryOptions {
            theme: Some(json!({ "colors": { "primary": "#333" } })),
            ..Default::default()
        });
        let fs = FileServiceStub::new()
            .with_file("/app/a.ts", "css(({ colors }) => ({ color: colors.primary }));");
        let scanner = Scanner::new("/app", registry, fs);
        assert!(scanner.scan_file("/app/a.ts").await.unwrap());
        assert_eq!(scanner.registry().styles()[0].css, "color:#333;");
    }

    #[tokio::test]
    async fn module_constants_need_opt_in() {
        let code = r#"const brand = "tomato"; css({ color: brand });"#;
        let fs = FileServiceStub::new().with_file("/app/a.ts", code);

        let literal = scanner(fs.clone());
        assert!(literal.scan_file("/app/a.ts").await.is_err());

        let folding = scanner(fs).with_eval_options(EvalOptions {
            level: EvalLevel::ModuleConstants,
            ..Default::default()
        });
        assert!(folding.scan_file("/app/a.ts").await.unwrap());
        assert_eq!(folding.registry().styles()[0].css, "color:tomato;");
    }

    #[tokio::test]
    async fn scan_all_clears_staleness() {
        let fs = FileServiceStub::new().with_file("/app/a.ts", r#"css({ color: "red" })"#);
        let scanner = scanner(fs);
        scanner.registry().invalidate();
        assert!(scanner.registry().is_stale());

        scanner.scan_all().await.unwrap();
        assert!(!scanner.registry().is_stale());
        assert_eq!(scanner.registry().len(), 1);
    }

    #[tokio::test]
    async fn rescan_is_idempotent() {
        let fs = FileServiceStub::new()
            .with_file("/app/a.ts", r#"css({ color: "red" }); css({ margin: 0 });"#);
        let scanner = scanner(fs);
        scanner.scan_all().await.unwrap();
        let first = scanner.registry().styles();
        scanner.scan_all().await.unwrap();
        assert_eq!(scanner.registry().styles(), first);
    }

    #[tokio::test]
    async fn missing_file_propagates() {
        let scanner = scanner(FileServiceStub::new());
        let err = scanner.scan_file("/app/gone.ts").await.unwrap_err();
        assert!(matches!(err, FlowError::FileNotFound { .. }));
    }
}
