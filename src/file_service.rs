//! File enumeration and reading, plus module-id classification.
//!
//! [`FsFileService`] walks a real directory tree and honors `.gitignore`.
//! [`FileServiceStub`] serves an in-memory tree for tests and embedders that
//! already hold module contents.

use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;

use ignore::WalkBuilder;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::FlowError;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Query flags that turn a stylesheet import into something else.
const NON_STYLESHEET_QUERIES: &[&str] = &[
    "url",
    "raw",
    "worker",
    "sharedworker",
    "inline",
    "transform-only",
];

/// What a module id points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Script,
    Stylesheet,
    Other,
}

/// Classify a module id, which may carry a `?query` suffix.
pub fn classify(id: &str) -> FileKind {
    if id.contains("/.vite/") {
        return FileKind::Other;
    }

    let (path, query) = match id.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (id, None),
    };

    match extension(path) {
        Some("js" | "jsx" | "ts" | "tsx") => return FileKind::Script,
        Some("css") => {}
        _ if id.contains("&lang.css") => {}
        _ => return FileKind::Other,
    }

    let excluded = query.is_some_and(|query| {
        query
            .split('&')
            .map(|pair| pair.split_once('=').map_or(pair, |(key, _)| key))
            .any(|key| NON_STYLESHEET_QUERIES.contains(&key))
    });
    if excluded {
        FileKind::Other
    } else {
        FileKind::Stylesheet
    }
}

fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.').map(|(_, ext)| ext)
}

/// Normalize a path to forward slashes.
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

// ---------------------------------------------------------------------------
// FileService
// ---------------------------------------------------------------------------

/// Source of module contents for the scanner.
pub trait FileService: Send + Sync {
    /// Read a whole file. A missing file is [`FlowError::FileNotFound`].
    fn read_file(&self, path: &str) -> impl Future<Output = Result<String, FlowError>> + Send;

    /// Every file under `root`, in a deterministic order.
    fn list_files(&self, root: &str) -> impl Future<Output = Result<Vec<String>, FlowError>> + Send;
}

/// Real filesystem access through `tokio::fs` and an `ignore` walk.
#[derive(Debug, Clone, Default)]
pub struct FsFileService;

impl FsFileService {
    pub fn new() -> Self {
        Self
    }
}

impl FileService for FsFileService {
    async fn read_file(&self, path: &str) -> Result<String, FlowError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(FlowError::FileNotFound {
                path: path.to_string(),
            }),
            Err(err) => Err(FlowError::Io(err)),
        }
    }

    async fn list_files(&self, root: &str) -> Result<Vec<String>, FlowError> {
        let root = root.to_string();
        tokio::task::spawn_blocking(move || walk(&root))
            .await
            .map_err(io::Error::other)?
    }
}

fn walk(root: &str) -> Result<Vec<String>, FlowError> {
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .require_git(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_some_and(|t| t.is_file()) {
            files.push(normalize_path(entry.path()));
        }
    }
    Ok(files)
}

/// In-memory file tree. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct FileServiceStub {
    files: Arc<RwLock<IndexMap<String, String>>>,
}

impl FileServiceStub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.set_file(path, contents);
        self
    }

    /// Create or overwrite a file.
    pub fn set_file(&self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.write().insert(path.into(), contents.into());
    }

    pub fn remove_file(&self, path: &str) -> Option<String> {
        self.files.write().shift_remove(path)
    }
}

impl FileService for FileServiceStub {
    async fn read_file(&self, path: &str) -> Result<String, FlowError> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| FlowError::FileNotFound {
                path: path.to_string(),
            })
    }

    async fn list_files(&self, root: &str) -> Result<Vec<String>, FlowError> {
        Ok(self
            .files
            .read()
            .keys()
            .filter(|path| path.starts_with(root))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_scripts() {
        assert_eq!(classify("/src/App.tsx"), FileKind::Script);
        assert_eq!(classify("/src/util.js"), FileKind::Script);
        assert_eq!(classify("/src/a.jsx?v=123"), FileKind::Script);
        assert_eq!(classify("/src/a.ts"), FileKind::Script);
        assert_eq!(classify("/src/a.mts.map"), FileKind::Other);
    }

    #[test]
    fn classifies_stylesheets() {
        assert_eq!(classify("/src/index.css"), FileKind::Stylesheet);
        assert_eq!(classify("/src/index.css?direct"), FileKind::Stylesheet);
        assert_eq!(
            classify("/src/Comp.vue?vue&type=style&index=0&lang.css"),
            FileKind::Stylesheet
        );
    }

    #[test]
    fn special_queries_are_not_stylesheets() {
        for query in ["url", "raw", "worker", "sharedworker", "inline", "transform-only"] {
            assert_eq!(classify(&format!("/src/index.css?{query}")), FileKind::Other, "{query}");
        }
        assert_eq!(classify("/src/index.css?direct&inline"), FileKind::Other);
        assert_eq!(classify("/src/index.css?rawish"), FileKind::Stylesheet);
    }

    #[test]
    fn vite_cache_is_other() {
        assert_eq!(classify("/node_modules/.vite/deps/chunk.js"), FileKind::Other);
        assert_eq!(classify("/app/.vite/style.css"), FileKind::Other);
    }

    #[test]
    fn everything_else_is_other() {
        assert_eq!(classify("/README.md"), FileKind::Other);
        assert_eq!(classify("/src/logo.svg"), FileKind::Other);
        assert_eq!(classify("Makefile"), FileKind::Other);
    }

    #[tokio::test]
    async fn stub_reads_and_lists() {
        let fs = FileServiceStub::new()
            .with_file("/app/a.ts", "a")
            .with_file("/app/b.css", "b")
            .with_file("/other/c.ts", "c");

        assert_eq!(fs.read_file("/app/a.ts").await.unwrap(), "a");
        assert_eq!(fs.list_files("/app").await.unwrap(), vec!["/app/a.ts", "/app/b.css"]);

        let err = fs.read_file("/app/missing.ts").await.unwrap_err();
        assert!(matches!(err, FlowError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn stub_clones_share_files() {
        let fs = FileServiceStub::new();
        let handle = fs.clone();
        handle.set_file("/a.ts", "x");
        assert_eq!(fs.read_file("/a.ts").await.unwrap(), "x");
        assert_eq!(fs.remove_file("/a.ts"), Some("x".to_string()));
        assert!(fs.list_files("/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fs_read_missing_file() {
        let err = FsFileService::new()
            .read_file("/definitely/not/here.ts")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::FileNotFound { .. }));
    }
}
