// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Filesystem tool family: read, write, list, search.
//!
//! Every path goes through the [`PathGuard`] sandbox before any I/O, and
//! read/write sizes are capped. Handlers return structured JSON the agent
//! can reason over.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::domain::path_guard::{PathGuard, PathGuardError};
use crate::domain::tool::{ArgMap, ParamSpec, ParamType, ToolDescriptor, ToolError, ToolHandler};

const CONTENT_PREVIEW_CHARS: usize = 2000;
const SEARCH_MAX_DEPTH: usize = 6;

impl From<PathGuardError> for ToolError {
    fn from(err: PathGuardError) -> Self {
        ToolError::PermissionDenied(err.to_string())
    }
}

fn required_str<'a>(args: &'a ArgMap, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::Validation(format!("Missing required parameter: {}", key)))
}

/// Read a file under the sandbox, with a size cap and content preview.
pub struct ReadFileTool {
    guard: Arc<PathGuard>,
    max_bytes: u64,
}

impl ReadFileTool {
    pub fn new(guard: Arc<PathGuard>, max_bytes: u64) -> Self {
        Self { guard, max_bytes }
    }
}

#[async_trait]
impl ToolHandler for ReadFileTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("read_file", "Read the contents of a file", "files").with_param(
            "path",
            ParamSpec::required(ParamType::String, "Path to the file to read"),
        )
    }

    async fn call(&self, args: ArgMap, _cancel: CancellationToken) -> Result<Value, ToolError> {
        let path = self.guard.validate_read(required_str(&args, "path")?)?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ToolError::Handler(format!("File not found: {} ({})", path.display(), e)))?;
        if !metadata.is_file() {
            return Err(ToolError::Handler(format!(
                "Not a file: {}",
                path.display()
            )));
        }
        if metadata.len() > self.max_bytes {
            return Err(ToolError::Handler(format!(
                "File too large: {} bytes (max {})",
                metadata.len(),
                self.max_bytes
            )));
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::Handler(format!("Error reading file: {}", e)))?;

        let lines = content.lines().count();
        let chars = content.chars().count();
        let preview: String = if chars > CONTENT_PREVIEW_CHARS {
            let head: String = content.chars().take(CONTENT_PREVIEW_CHARS).collect();
            format!("{}\n… (truncated, total {} chars, {} lines)", head, chars, lines)
        } else {
            content
        };

        Ok(json!({
            "path": path.display().to_string(),
            "size": metadata.len(),
            "lines": lines,
            "content": preview,
        }))
    }
}

/// Write (or append to) a file under the sandbox.
pub struct WriteFileTool {
    guard: Arc<PathGuard>,
    max_bytes: u64,
}

impl WriteFileTool {
    pub fn new(guard: Arc<PathGuard>, max_bytes: u64) -> Self {
        Self { guard, max_bytes }
    }
}

#[async_trait]
impl ToolHandler for WriteFileTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "write_file",
            "Write content to a file (creates or overwrites)",
            "files",
        )
        .with_param(
            "path",
            ParamSpec::required(ParamType::String, "Path to the file to write"),
        )
        .with_param(
            "content",
            ParamSpec::required(ParamType::String, "Content to write"),
        )
        .with_param(
            "mode",
            ParamSpec::optional(ParamType::String, "'write' (overwrite) or 'append'"),
        )
        .confirmed()
        .mutating()
    }

    async fn call(&self, args: ArgMap, _cancel: CancellationToken) -> Result<Value, ToolError> {
        let path = self.guard.validate_write(required_str(&args, "path")?)?;
        let content = required_str(&args, "content")?;
        let mode = args
            .get("mode")
            .and_then(|v| v.as_str())
            .unwrap_or("write");

        if content.len() as u64 > self.max_bytes {
            return Err(ToolError::Handler(format!(
                "Content too large: {} bytes (max {})",
                content.len(),
                self.max_bytes
            )));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::Handler(format!("Cannot create parent dir: {}", e)))?;
        }

        match mode {
            "write" => tokio::fs::write(&path, content)
                .await
                .map_err(|e| ToolError::Handler(format!("Error writing file: {}", e)))?,
            "append" => {
                use tokio::io::AsyncWriteExt;
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await
                    .map_err(|e| ToolError::Handler(format!("Error opening file: {}", e)))?;
                file.write_all(content.as_bytes())
                    .await
                    .map_err(|e| ToolError::Handler(format!("Error appending: {}", e)))?;
            }
            other => {
                return Err(ToolError::Validation(format!(
                    "Parameter 'mode' must be 'write' or 'append', got '{}'",
                    other
                )))
            }
        }

        let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        Ok(json!({
            "path": path.display().to_string(),
            "bytes_total": size,
            "mode": mode,
        }))
    }
}

/// List the entries of a directory under the sandbox.
pub struct ListDirectoryTool {
    guard: Arc<PathGuard>,
}

impl ListDirectoryTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl ToolHandler for ListDirectoryTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "list_directory",
            "List files and directories in a path",
            "files",
        )
        .with_param(
            "path",
            ParamSpec::required(ParamType::String, "Directory to list"),
        )
        .with_param(
            "show_hidden",
            ParamSpec::optional(ParamType::Boolean, "Include entries starting with '.'"),
        )
    }

    async fn call(&self, args: ArgMap, _cancel: CancellationToken) -> Result<Value, ToolError> {
        let path = self.guard.validate_read(required_str(&args, "path")?)?;
        let show_hidden = args
            .get("show_hidden")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let mut reader = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| ToolError::Handler(format!("Cannot list {}: {}", path.display(), e)))?;

        let mut directories = Vec::new();
        let mut files = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ToolError::Handler(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !show_hidden && name.starts_with('.') {
                continue;
            }
            match entry.file_type().await {
                Ok(t) if t.is_dir() => directories.push(name),
                Ok(_) => files.push(name),
                Err(_) => files.push(name),
            }
        }
        directories.sort();
        files.sort();

        Ok(json!({
            "path": path.display().to_string(),
            "directories": directories,
            "files": files,
        }))
    }
}

/// Metadata about a single file under the sandbox.
pub struct GetFileInfoTool {
    guard: Arc<PathGuard>,
}

impl GetFileInfoTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl ToolHandler for GetFileInfoTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "get_file_info",
            "Report size, kind and modification time of a file",
            "files",
        )
        .with_param(
            "path",
            ParamSpec::required(ParamType::String, "Path to inspect"),
        )
    }

    async fn call(&self, args: ArgMap, _cancel: CancellationToken) -> Result<Value, ToolError> {
        let path = self.guard.validate_read(required_str(&args, "path")?)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ToolError::Handler(format!("Not found: {} ({})", path.display(), e)))?;

        let modified = metadata
            .modified()
            .ok()
            .map(chrono::DateTime::<chrono::Utc>::from)
            .map(|ts| ts.to_rfc3339());

        Ok(json!({
            "path": path.display().to_string(),
            "kind": if metadata.is_dir() { "directory" } else { "file" },
            "size": metadata.len(),
            "modified": modified,
        }))
    }
}

/// Recursive filename search under the sandbox.
pub struct SearchFilesTool {
    guard: Arc<PathGuard>,
}

impl SearchFilesTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl ToolHandler for SearchFilesTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "search_files",
            "Search for files by name substring and/or extension",
            "files",
        )
        .with_param(
            "query",
            ParamSpec::optional(ParamType::String, "Substring of the file name"),
        )
        .with_param(
            "extension",
            ParamSpec::optional(ParamType::String, "File extension filter, e.g. '.py'"),
        )
        .with_param(
            "path",
            ParamSpec::optional(ParamType::String, "Base directory (defaults to the sandbox root)"),
        )
        .with_param(
            "limit",
            ParamSpec::optional(ParamType::Integer, "Maximum number of matches"),
        )
    }

    async fn call(&self, args: ArgMap, cancel: CancellationToken) -> Result<Value, ToolError> {
        let base = match args.get("path").and_then(|v| v.as_str()) {
            Some(raw) => self.guard.validate_read(raw)?,
            None => self
                .guard
                .allowed_roots()
                .first()
                .cloned()
                .ok_or_else(|| ToolError::PermissionDenied("No sandbox root configured".into()))?,
        };
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_lowercase();
        let extension = args
            .get("extension")
            .and_then(|v| v.as_str())
            .map(|e| e.to_lowercase());
        let limit = args
            .get("limit")
            .and_then(|v| v.as_int())
            .map(|n| n.clamp(1, 1000) as usize)
            .unwrap_or(100);

        let matches = tokio::task::spawn_blocking(move || {
            walk(&base, &query, extension.as_deref(), limit, &cancel)
        })
        .await
        .map_err(|e| ToolError::Internal(e.to_string()))??;

        Ok(json!({
            "count": matches.len(),
            "matches": matches,
        }))
    }
}

fn walk(
    base: &PathBuf,
    query: &str,
    extension: Option<&str>,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<Vec<String>, ToolError> {
    let mut matches = Vec::new();
    let mut stack = vec![(base.clone(), 0usize)];

    while let Some((dir, depth)) = stack.pop() {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        if depth > SEARCH_MAX_DEPTH || matches.len() >= limit {
            continue;
        }
        let Ok(reader) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in reader.flatten() {
            if matches.len() >= limit {
                break;
            }
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if path.is_dir() {
                if !name.starts_with('.') {
                    stack.push((path, depth + 1));
                }
                continue;
            }
            if !query.is_empty() && !name.contains(query) {
                continue;
            }
            if let Some(ext) = extension {
                if !name.ends_with(ext) {
                    continue;
                }
            }
            matches.push(path.display().to_string());
        }
    }
    matches.sort();
    Ok(matches)
}
