//! Sandboxed file service and the `files.*` tools built on it.
//!
//! Every relative path is resolved against a single project root. Paths that
//! would land outside the root are rejected before any I/O happens.

use super::catalog::ToolCatalog;
use super::descriptor::{SchemaBuilder, ToolDescriptor};
use super::scanner::ScannerRegistry;
use crate::errors::{CatalogResult, SandboxError, SandboxResult, ToolError, ToolResult};
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable naming the sandbox root.
pub const PROJECT_ROOT_ENV: &str = "CONDUCTOR_PROJECT_ROOT";

const DEFAULT_READ_LIMIT: usize = 2000;
const DEFAULT_SEARCH_RESULTS: usize = 100;
const MAX_SEARCH_FILE_BYTES: u64 = 1024 * 1024;

/// File access confined to one directory tree.
#[derive(Debug, Clone)]
pub struct FileService {
    root: PathBuf,
}

impl FileService {
    /// Create a service rooted at an absolute, existing directory.
    ///
    /// The root is canonicalized so symlinked roots compare correctly.
    pub fn new(root: impl Into<PathBuf>) -> SandboxResult<Self> {
        let root = root.into();
        if !root.is_absolute() {
            return Err(SandboxError::RelativeRoot(root));
        }
        if !root.is_dir() {
            return Err(SandboxError::RootNotFound(root));
        }
        let root = std::fs::canonicalize(&root).map_err(|_| SandboxError::RootNotFound(root))?;
        info!("File service rooted at {}", root.display());
        Ok(Self { root })
    }

    /// Create a service from `CONDUCTOR_PROJECT_ROOT`; missing is fatal.
    pub fn from_env() -> SandboxResult<Self> {
        match std::env::var_os(PROJECT_ROOT_ENV) {
            Some(root) if !root.is_empty() => Self::new(PathBuf::from(root)),
            _ => Err(SandboxError::MissingRoot(PROJECT_ROOT_ENV)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a caller-supplied path inside the root.
    ///
    /// `.` and `..` are folded lexically, then the deepest existing ancestor
    /// is canonicalized so a symlink cannot lead outside the root. The
    /// not-yet-existing tail is appended unchanged.
    pub fn resolve(&self, path: &str) -> SandboxResult<PathBuf> {
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };
        let lexical = normalize(&joined);

        for ancestor in lexical.ancestors() {
            match std::fs::canonicalize(ancestor) {
                Ok(real) => {
                    let tail = lexical.strip_prefix(ancestor).unwrap_or_else(|_| Path::new(""));
                    let resolved = if tail.as_os_str().is_empty() {
                        real
                    } else {
                        real.join(tail)
                    };
                    return if resolved.starts_with(&self.root) {
                        Ok(resolved)
                    } else {
                        Err(SandboxError::PathEscape(path.to_string()))
                    };
                }
                // Present on disk but not resolvable: dangling link or loop.
                Err(_) if std::fs::symlink_metadata(ancestor).is_ok() => {
                    return Err(SandboxError::Unresolvable(path.to_string()));
                }
                Err(_) => continue,
            }
        }
        Err(SandboxError::PathEscape(path.to_string()))
    }

    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    pub async fn read(&self, path: &str, offset: usize, limit: usize) -> ToolResult<Value> {
        let full = self.resolve(path)?;
        let content = tokio::fs::read_to_string(&full).await?;
        let lines: Vec<&str> = content.lines().collect();
        let start = offset.saturating_sub(1).min(lines.len());
        let end = start.saturating_add(limit).min(lines.len());

        Ok(json!({
            "path": self.relative(&full).display().to_string(),
            "content": lines[start..end].join("\n"),
            "startLine": start + 1,
            "lines": end - start,
            "totalLines": lines.len(),
        }))
    }

    pub async fn write(&self, path: &str, content: &str) -> ToolResult<Value> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(ToolError::InvalidParameter {
                name: "path".to_string(),
                reason: "cannot write to the project root".to_string(),
            });
        }
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        debug!(path = %full.display(), bytes = content.len(), "Wrote file");

        Ok(json!({
            "path": self.relative(&full).display().to_string(),
            "bytesWritten": content.len(),
        }))
    }

    pub async fn list(&self, path: &str) -> ToolResult<Value> {
        let full = self.resolve(path)?;
        let mut dir = tokio::fs::read_dir(&full).await?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();

        Ok(json!({
            "path": self.relative(&full).display().to_string(),
            "entries": entries,
        }))
    }

    pub async fn outline(&self, path: &str, scanners: &ScannerRegistry) -> ToolResult<Value> {
        let full = self.resolve(path)?;
        let content = tokio::fs::read_to_string(&full).await?;
        let language = scanners.for_path(&full).map(|s| s.language());
        let symbols = scanners.outline(&full, &content);

        Ok(json!({
            "path": self.relative(&full).display().to_string(),
            "language": language,
            "symbols": symbols,
        }))
    }

    pub async fn search(&self, query: &str, path: &str, max_results: usize) -> ToolResult<Value> {
        if query.is_empty() {
            return Err(ToolError::InvalidParameter {
                name: "query".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        let start = self.resolve(path)?;
        let needle = query.to_lowercase();
        let mut matches = Vec::new();
        let mut truncated = false;
        let mut pending = vec![start.clone()];

        'walk: while let Some(current) = pending.pop() {
            // Symlinks are never followed; their targets may leave the root.
            let meta = match tokio::fs::symlink_metadata(&current).await {
                Ok(meta) => meta,
                Err(e) if current == start => return Err(e.into()),
                Err(e) => {
                    debug!(path = %current.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if meta.file_type().is_symlink() {
                continue;
            }
            if meta.is_dir() {
                let mut dir = match tokio::fs::read_dir(&current).await {
                    Ok(dir) => dir,
                    Err(e) if current == start => return Err(e.into()),
                    Err(e) => {
                        debug!(
                            path = %current.display(),
                            error = %e,
                            "Skipping unreadable directory"
                        );
                        continue;
                    }
                };
                let mut children = Vec::new();
                while let Ok(Some(entry)) = dir.next_entry().await {
                    let name = entry.file_name();
                    if name.to_string_lossy().starts_with('.') {
                        continue;
                    }
                    children.push(entry.path());
                }
                children.sort();
                pending.extend(children.into_iter().rev());
                continue;
            }
            if meta.len() > MAX_SEARCH_FILE_BYTES {
                continue;
            }
            let Ok(content) = tokio::fs::read_to_string(&current).await else {
                continue; // binary or unreadable
            };
            for (i, line) in content.lines().enumerate() {
                if line.to_lowercase().contains(&needle) {
                    if matches.len() >= max_results {
                        truncated = true;
                        break 'walk;
                    }
                    matches.push(format!(
                        "{}:{}: {}",
                        self.relative(&current).display(),
                        i + 1,
                        line.trim()
                    ));
                }
            }
        }

        Ok(json!({
            "query": query,
            "matches": matches,
            "truncated": truncated,
        }))
    }
}

/// Lexically normalise a path, folding `.` and `..` without touching disk.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn str_arg<'a>(args: &'a Value, name: &str) -> ToolResult<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::MissingParameter(name.to_string()))
}

fn usize_arg(args: &Value, name: &str, default: usize) -> ToolResult<usize> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| ToolError::InvalidParameter {
                name: name.to_string(),
                reason: "expected a non-negative integer".to_string(),
            }),
    }
}

/// Register `files.read`, `files.write`, `files.list`, `files.outline` and
/// `files.search` against the given service.
pub fn register_file_tools(
    catalog: &mut ToolCatalog,
    service: Arc<FileService>,
) -> CatalogResult<()> {
    let scanners = Arc::new(ScannerRegistry::new());

    let svc = service.clone();
    catalog.register(ToolDescriptor::from_fn(
        "files.read",
        "Read a text file from the project. Returns up to `limit` lines starting at `offset` (1-indexed).",
        SchemaBuilder::new()
            .required("path", "string", "Path relative to the project root")
            .optional("offset", "integer", "Line number to start reading from (default 1)")
            .optional("limit", "integer", "Maximum number of lines to return (default 2000)")
            .build(),
        move |args| {
            let svc = svc.clone();
            async move {
                let path = str_arg(&args, "path")?;
                let offset = usize_arg(&args, "offset", 1)?;
                let limit = usize_arg(&args, "limit", DEFAULT_READ_LIMIT)?;
                svc.read(path, offset, limit).await
            }
        },
    ))?;

    let svc = service.clone();
    catalog.register(ToolDescriptor::from_fn(
        "files.write",
        "Write content to a project file, creating parent directories as needed. Overwrites existing files.",
        SchemaBuilder::new()
            .required("path", "string", "Path relative to the project root")
            .required("content", "string", "Full file content to write")
            .build(),
        move |args| {
            let svc = svc.clone();
            async move {
                let path = str_arg(&args, "path")?;
                let content = str_arg(&args, "content")?;
                svc.write(path, content).await
            }
        },
    ))?;

    let svc = service.clone();
    catalog.register(ToolDescriptor::from_fn(
        "files.list",
        "List the entries of a project directory. Directories are suffixed with '/'.",
        SchemaBuilder::new()
            .optional("path", "string", "Directory relative to the project root (default: root)")
            .build(),
        move |args| {
            let svc = svc.clone();
            async move {
                let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
                svc.list(path).await
            }
        },
    ))?;

    let svc = service.clone();
    let outline_scanners = scanners.clone();
    catalog.register(ToolDescriptor::from_fn(
        "files.outline",
        "Outline a source file: functions, types, imports and modules with their line numbers.",
        SchemaBuilder::new()
            .required("path", "string", "Source file relative to the project root")
            .build(),
        move |args| {
            let svc = svc.clone();
            let scanners = outline_scanners.clone();
            async move {
                let path = str_arg(&args, "path")?;
                svc.outline(path, &scanners).await
            }
        },
    ))?;

    let svc = service;
    catalog.register(ToolDescriptor::from_fn(
        "files.search",
        "Case-insensitive text search across project files. Hidden files and directories are skipped.",
        SchemaBuilder::new()
            .required("query", "string", "Text to search for")
            .optional("path", "string", "File or directory to search (default: root)")
            .optional("max_results", "integer", "Maximum number of matches (default 100)")
            .build(),
        move |args| {
            let svc = svc.clone();
            async move {
                let query = str_arg(&args, "query")?;
                let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
                let max = usize_arg(&args, "max_results", DEFAULT_SEARCH_RESULTS)?;
                svc.search(query, path, max.max(1)).await
            }
        },
    ))?;

    Ok(())
}
