// src/resolver.rs

//! Maps request paths onto the served root.

use crate::error::ServeError;
use crate::paths::{has_parent_segment, is_markdown, normalize};
use std::path::{Path, PathBuf};

/// `ENOTDIR` on Linux, macOS and the BSDs: a parent component is a regular file.
// TODO: match on `io::ErrorKind::NotADirectory` once rust-version reaches 1.83.
#[cfg(unix)]
const ENOTDIR: i32 = 20;

/// What a request path resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    File {
        /// Absolute path on disk
        path: PathBuf,
        /// Canonical path relative to the root
        rel: String,
    },
    Directory { path: PathBuf, rel: String },
}

impl Target {
    pub fn rel(&self) -> &str {
        match self {
            Target::File { rel, .. } | Target::Directory { rel, .. } => rel,
        }
    }
}

/// Resolves an already percent-decoded request path against `root`.
///
/// Paths with a `..` segment are rejected before the filesystem is touched.
/// A missing path that does not end in `.md` gets a second try with `.md`
/// appended, so `/notes` serves `notes.md`.
pub fn resolve(root: &Path, request_path: &str) -> Result<Target, ServeError> {
    if has_parent_segment(request_path) {
        return Err(ServeError::ForbiddenPath(request_path.to_string()));
    }
    let rel = normalize(request_path);

    if let Some(target) = stat(root, &rel)? {
        return Ok(target);
    }
    if !rel.is_empty() && !is_markdown(&rel) {
        if let Some(target) = stat(root, &format!("{}.md", rel))? {
            return Ok(target);
        }
    }
    Err(ServeError::NotFound(request_path.to_string()))
}

fn stat(root: &Path, rel: &str) -> Result<Option<Target>, ServeError> {
    let path = if rel.is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    };
    match std::fs::metadata(&path) {
        Ok(meta) if meta.is_dir() => Ok(Some(Target::Directory {
            path,
            rel: rel.to_string(),
        })),
        Ok(_) => Ok(Some(Target::File {
            path,
            rel: rel.to_string(),
        })),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        #[cfg(unix)]
        Err(e) if e.raw_os_error() == Some(ENOTDIR) => Ok(None),
        Err(e) => Err(ServeError::Io(e)),
    }
}
