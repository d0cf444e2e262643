// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Guard Domain Service
//!
//! Canonicalizes tool-supplied paths and enforces the filesystem sandbox:
//! reads and writes must land under an allow-list of base directories,
//! writes are additionally denied under a deny-list, and traversal tokens
//! are rejected outright. Validation is pure and idempotent; resolving the
//! same input twice yields the same canonical path and the same verdict.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Filesystem boundary enforcement for the file tool family

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathGuardError {
    #[error("Path traversal detected")]
    PathTraversal,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path outside allowed directories: {0}")]
    OutsideAllowed(String),

    #[error("Writes are denied under {0}")]
    DeniedRoot(String),

    #[error("Path too long: {0} bytes")]
    PathTooLong(usize),
}

/// Filesystem sandbox boundaries for the built-in file tools.
#[derive(Debug, Clone)]
pub struct PathGuard {
    allowed_roots: Vec<PathBuf>,
    denied_roots: Vec<PathBuf>,
    max_path_len: usize,
}

impl PathGuard {
    pub fn new(allowed_roots: Vec<PathBuf>, denied_roots: Vec<PathBuf>) -> Self {
        Self {
            allowed_roots,
            denied_roots,
            max_path_len: 4096,
        }
    }

    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    /// Resolve a raw path to absolute, normalized form.
    ///
    /// Relative paths are anchored at the first allowed root. `.` components
    /// are dropped; any `..` in the raw input is rejected before
    /// normalization, so the check cannot be laundered through a prefix that
    /// would re-enter an allowed root.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, PathGuardError> {
        if raw.is_empty() {
            return Err(PathGuardError::InvalidPath("empty path".into()));
        }
        if raw.len() > self.max_path_len {
            return Err(PathGuardError::PathTooLong(raw.len()));
        }
        if raw.contains('\0') {
            return Err(PathGuardError::InvalidPath("path contains null byte".into()));
        }

        let path = Path::new(raw);
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(PathGuardError::PathTraversal);
        }

        let anchored = if path.is_absolute() {
            path.to_path_buf()
        } else {
            match self.allowed_roots.first() {
                Some(root) => root.join(path),
                None => return Err(PathGuardError::OutsideAllowed(raw.to_string())),
            }
        };

        let mut normalized = PathBuf::new();
        for component in anchored.components() {
            match component {
                Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                    normalized.push(component)
                }
                Component::CurDir => {}
                Component::ParentDir => return Err(PathGuardError::PathTraversal),
            }
        }
        Ok(normalized)
    }

    /// Resolve and check a path for reading.
    pub fn validate_read(&self, raw: &str) -> Result<PathBuf, PathGuardError> {
        let resolved = self.resolve(raw)?;
        self.ensure_allowed(&resolved)?;
        Ok(resolved)
    }

    /// Resolve and check a path for writing. The deny-list applies on top
    /// of the allow-list.
    pub fn validate_write(&self, raw: &str) -> Result<PathBuf, PathGuardError> {
        let resolved = self.resolve(raw)?;
        self.ensure_allowed(&resolved)?;
        for denied in &self.denied_roots {
            if resolved.starts_with(denied) {
                return Err(PathGuardError::DeniedRoot(denied.display().to_string()));
            }
        }
        Ok(resolved)
    }

    fn ensure_allowed(&self, resolved: &Path) -> Result<(), PathGuardError> {
        let allowed = self
            .allowed_roots
            .iter()
            .any(|root| resolved.starts_with(root));
        if allowed {
            Ok(())
        } else {
            Err(PathGuardError::OutsideAllowed(
                resolved.display().to_string(),
            ))
        }
    }
}
