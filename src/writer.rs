//! Persisting rendered artifacts into the output tree.
//!
//! [`FileWriter::write`] is the only way rendered markup reaches disk:
//!
//! 1. Reject paths that would escape the output root.
//! 2. Normalize text: drop a UTF-8 byte-order mark, convert CRLF to LF.
//! 3. Dispatch on [`FileKind`]: `.html` goes through
//!    [`ContentRewriter::rewrite_html`], `feed.xml` through
//!    [`ContentRewriter::rewrite_feed`], anything else is written as-is.
//! 4. Create parent directories and write, unless the file already holds
//!    exactly these bytes (unchanged files keep their mtime).

use crate::ledger::digest_bytes;
use crate::paths;
use crate::rewrite::ContentRewriter;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("refusing to write outside the output tree: {0}")]
    UnsafePath(String),
}

/// How a file's content is post-processed before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Html,
    Feed,
    Other,
}

impl FileKind {
    pub fn of(rel_path: &str) -> Self {
        let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        if name.ends_with(".html") {
            Self::Html
        } else if name == paths::FEED_FILE {
            Self::Feed
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Written,
    Unchanged,
}

/// Outcome of one write, fed into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: String,
    pub digest: String,
    pub status: WriteStatus,
}

pub struct FileWriter<'a> {
    root: &'a Path,
    rewriter: &'a ContentRewriter<'a>,
}

impl<'a> FileWriter<'a> {
    pub fn new(root: &'a Path, rewriter: &'a ContentRewriter<'a>) -> Self {
        Self { root, rewriter }
    }

    pub fn root(&self) -> &Path {
        self.root
    }

    /// Write a rendered artifact at `rel_path` under the output root.
    pub fn write(&self, rel_path: &str, content: &str) -> Result<WrittenFile, WriteError> {
        if !paths::is_safe_relative(rel_path) {
            return Err(WriteError::UnsafePath(rel_path.to_string()));
        }
        let normalized = normalize_text(content);
        let final_text = match FileKind::of(rel_path) {
            FileKind::Html => self.rewriter.rewrite_html(&normalized),
            FileKind::Feed => self.rewriter.rewrite_feed(&normalized),
            FileKind::Other => normalized,
        };
        self.write_bytes(rel_path, final_text.as_bytes())
    }

    /// Write raw bytes (exported media, copied static files).
    pub fn write_bytes(&self, rel_path: &str, bytes: &[u8]) -> Result<WrittenFile, WriteError> {
        if !paths::is_safe_relative(rel_path) {
            return Err(WriteError::UnsafePath(rel_path.to_string()));
        }
        let full = self.root.join(rel_path);
        let status = write_if_changed(&full, bytes).map_err(|source| WriteError::Io {
            path: full.clone(),
            source,
        })?;
        let event = match status {
            WriteStatus::Written => "file.written",
            WriteStatus::Unchanged => "file.unchanged",
        };
        debug!(
            event,
            path = rel_path,
            bytes = bytes.len(),
            "wrote artifact"
        );
        Ok(WrittenFile {
            path: rel_path.to_string(),
            digest: digest_bytes(bytes),
            status,
        })
    }
}

/// Strip a leading BOM and convert CRLF line endings to LF.
pub fn normalize_text(content: &str) -> String {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    content.replace("\r\n", "\n")
}

/// Write `bytes` to `path` unless the file already has exactly that content.
pub fn write_if_changed(path: &Path, bytes: &[u8]) -> io::Result<WriteStatus> {
    if let Ok(existing) = std::fs::read(path)
        && existing == bytes
    {
        return Ok(WriteStatus::Unchanged);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(WriteStatus::Written)
}
