//! File read/write/delete collaborators.
//!
//! The coordinator never touches the filesystem directly; it goes through a
//! [`FileStore`]. A missing file is a normal outcome (`Ok(None)` from
//! [`FileStore::read`]) and is how a tool call learns that a path did not
//! exist before it was written.
//!
//! - [`LocalFileStore`]: `tokio::fs` under the project root.
//! - [`MemoryFileStore`]: in-memory map for tests and embedding.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::debug;

/// Async file access scoped to a project root.
///
/// All methods take a project-relative `path` that has already been
/// normalized. Implementations must tolerate repeated calls.
pub trait FileStore: Send + Sync {
    /// Current content of `path`, or `None` if it does not exist.
    fn read<'a>(&'a self, project: &'a Path, path: &'a str)
    -> BoxFuture<'a, Result<Option<String>, String>>;

    /// Create or replace `path` with `content`.
    fn write<'a>(
        &'a self,
        project: &'a Path,
        path: &'a str,
        content: &'a str,
    ) -> BoxFuture<'a, Result<(), String>>;

    /// Remove `path`. Removing a missing file is not an error.
    fn delete<'a>(&'a self, project: &'a Path, path: &'a str) -> BoxFuture<'a, Result<(), String>>;
}

// ── LocalFileStore ─────────────────────────────────────────────────

/// Reads and writes real files under the project directory.
///
/// Absolute paths and `..` traversal are rejected. Parent directories are
/// created on write.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }
}

/// Join a project-relative path onto the root, refusing escapes.
fn resolve(project: &Path, path: &str) -> Result<PathBuf, String> {
    if path.is_empty() {
        return Err("path must not be empty".to_string());
    }
    let relative = Path::new(path);
    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!("path traversal not allowed: '{path}'"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("path must be relative to the project: '{path}'"));
            }
        }
    }
    Ok(project.join(relative))
}

impl FileStore for LocalFileStore {
    fn read<'a>(
        &'a self,
        project: &'a Path,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, String>> {
        async move {
            let full_path = resolve(project, path)?;
            match fs::read_to_string(&full_path).await {
                Ok(content) => Ok(Some(content)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(format!("failed to read '{}': {e}", full_path.display())),
            }
        }
        .boxed()
    }

    fn write<'a>(
        &'a self,
        project: &'a Path,
        path: &'a str,
        content: &'a str,
    ) -> BoxFuture<'a, Result<(), String>> {
        async move {
            let full_path = resolve(project, path)?;
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    format!("failed to create directory '{}': {e}", parent.display())
                })?;
            }
            fs::write(&full_path, content)
                .await
                .map_err(|e| format!("failed to write '{}': {e}", full_path.display()))?;
            debug!("Wrote {} bytes to {}", content.len(), full_path.display());
            Ok(())
        }
        .boxed()
    }

    fn delete<'a>(&'a self, project: &'a Path, path: &'a str) -> BoxFuture<'a, Result<(), String>> {
        async move {
            let full_path = resolve(project, path)?;
            match fs::remove_file(&full_path).await {
                Ok(()) => {
                    debug!("Deleted {}", full_path.display());
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(format!("failed to delete '{}': {e}", full_path.display())),
            }
        }
        .boxed()
    }
}

// ── MemoryFileStore ────────────────────────────────────────────────

/// In-memory file map keyed by project-relative path.
///
/// The project root is ignored. Paths registered with
/// [`fail_on`](Self::fail_on) make every operation on them return an
/// error, which is how tests exercise I/O failures.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: Mutex<BTreeMap<String, String>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file (builder pattern).
    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), content.into());
    }

    /// Current content of a file, bypassing the async interface.
    pub fn get(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    /// Make every operation on `path` fail.
    pub fn fail_on(&self, path: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into());
    }

    fn check(&self, op: &str, path: &str) -> Result<(), String> {
        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(path)
        {
            Err(format!("failed to {op} '{path}': simulated I/O error"))
        } else {
            Ok(())
        }
    }
}

impl FileStore for MemoryFileStore {
    fn read<'a>(
        &'a self,
        _project: &'a Path,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, String>> {
        async move {
            self.check("read", path)?;
            Ok(self.get(path))
        }
        .boxed()
    }

    fn write<'a>(
        &'a self,
        _project: &'a Path,
        path: &'a str,
        content: &'a str,
    ) -> BoxFuture<'a, Result<(), String>> {
        async move {
            self.check("write", path)?;
            self.insert(path, content);
            Ok(())
        }
        .boxed()
    }

    fn delete<'a>(&'a self, _project: &'a Path, path: &'a str) -> BoxFuture<'a, Result<(), String>> {
        async move {
            self.check("delete", path)?;
            self.files
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(path);
            Ok(())
        }
        .boxed()
    }
}
