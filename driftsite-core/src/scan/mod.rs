// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Site Scanner
//!
//! Enumerates a local directory tree, applies ignore rules, and produces
//! one [`FileEntry`] per included file with its size, content hash and
//! media type computed in a single streaming pass.

pub mod ignore;
pub mod media;

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use ring::digest::{Context, SHA256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::event::Event;
use ignore::IgnoreRules;

/// Files at or under this size keep their bytes buffered after hashing so
/// the upload pass does not have to re-read them.
pub const SMALL_FILE_LIMIT: u64 = 1024 * 1024;

/// Scanner errors that abort the walk entirely. Per-file problems are
/// collected in [`ScanReport::issues`] instead.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Site root {0} does not exist or is not a directory")]
    BadRoot(PathBuf),

    #[error("Invalid ignore pattern '{pattern}': {message}")]
    BadPattern { pattern: String, message: String },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One file of a site, local or remote.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Logical path: leading `/`, forward slashes, unique within a set.
    pub path: String,
    /// Content size in bytes.
    pub size: u64,
    /// Lowercase hex SHA-256 of the raw content.
    pub hash: String,
    /// Media type string, `application/octet-stream` when unknown.
    pub media_type: String,
    /// Raw bytes, populated only when the file is about to be uploaded.
    pub content: Option<Vec<u8>>,
    /// For remote entries: the announcement event this entry came from.
    pub source_event: Option<Event>,
}

impl FileEntry {
    /// Loads the content bytes from disk if they are not already buffered.
    /// Runs after the walk, so it suspends instead of blocking the
    /// executor.
    pub async fn load_content(&mut self, root: &Path) -> Result<(), ScanError> {
        if self.content.is_some() {
            return Ok(());
        }
        let on_disk = root.join(self.path.trim_start_matches('/'));
        let bytes = tokio::fs::read(&on_disk)
            .await
            .map_err(|source| ScanError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.content = Some(bytes);
        Ok(())
    }

    /// Drops any buffered content, keeping the metadata.
    pub fn release_content(&mut self) {
        self.content = None;
    }
}

/// A per-file problem recorded during the walk.
#[derive(Debug, Clone)]
pub struct ScanIssue {
    pub path: String,
    pub message: String,
}

/// Result of walking a site root.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Included files, ordered lexicographically by path.
    pub files: Vec<FileEntry>,
    /// Ignored paths (files and pruned directories), ordered.
    pub ignored: Vec<String>,
    /// Files that could not be read; excluded from `files`.
    pub issues: Vec<ScanIssue>,
}

/// Walks `root`, applying `rules`, and hashes every included file.
///
/// I/O errors on individual files are recorded as issues and do not abort
/// the walk. Symbolic-link loops are broken by device+inode tracking.
pub fn scan_site(root: &Path, rules: &IgnoreRules) -> Result<ScanReport, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::BadRoot(root.to_path_buf()));
    }

    let mut report = ScanReport::default();
    let mut visited_dirs = HashSet::new();
    walk_dir(root, root, rules, &mut visited_dirs, &mut report);

    report.files.sort_by(|a, b| a.path.cmp(&b.path));
    report.ignored.sort();
    debug!(
        files = report.files.len(),
        ignored = report.ignored.len(),
        issues = report.issues.len(),
        "site scan complete"
    );
    Ok(report)
}

fn walk_dir(
    root: &Path,
    dir: &Path,
    rules: &IgnoreRules,
    visited: &mut HashSet<(u64, u64)>,
    report: &mut ScanReport,
) {
    if let Some(key) = dir_identity(dir) {
        if !visited.insert(key) {
            warn!(path = %dir.display(), "symlink loop detected, skipping");
            return;
        }
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            report.issues.push(ScanIssue {
                path: logical_path(root, dir),
                message: e.to_string(),
            });
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.issues.push(ScanIssue {
                    path: logical_path(root, dir),
                    message: e.to_string(),
                });
                continue;
            }
        };

        let path = entry.path();
        let relative = relative_path(root, &path);

        // fs::metadata follows symlinks so linked trees are included.
        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                report.issues.push(ScanIssue {
                    path: format!("/{relative}"),
                    message: e.to_string(),
                });
                continue;
            }
        };

        if rules.is_ignored(&relative) {
            report.ignored.push(format!("/{relative}"));
            continue;
        }

        if metadata.is_dir() {
            walk_dir(root, &path, rules, visited, report);
        } else if metadata.is_file() {
            match hash_file(&path, metadata.len()) {
                Ok((hash, size, content)) => report.files.push(FileEntry {
                    path: format!("/{relative}"),
                    size,
                    hash,
                    media_type: media::media_type_for(&path),
                    content,
                    source_event: None,
                }),
                Err(e) => report.issues.push(ScanIssue {
                    path: format!("/{relative}"),
                    message: e.to_string(),
                }),
            }
        }
    }
}

/// Hashes a file in one streaming pass, buffering the content only for
/// small files.
fn hash_file(
    path: &Path,
    expected_len: u64,
) -> Result<(String, u64, Option<Vec<u8>>), std::io::Error> {
    let mut file = File::open(path)?;
    let mut context = Context::new(&SHA256);
    let mut size = 0u64;

    let buffer_content = expected_len <= SMALL_FILE_LIMIT;
    let mut content = if buffer_content {
        Some(Vec::with_capacity(expected_len as usize))
    } else {
        None
    };

    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        context.update(&chunk[..n]);
        size += n as u64;
        if let Some(buf) = content.as_mut() {
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    // A file that grew past the limit while being read is not worth caching.
    if size > SMALL_FILE_LIMIT {
        content = None;
    }

    Ok((hex::encode(context.finish().as_ref()), size, content))
}

/// Path relative to the root, forward slashes on every platform.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.join("/")
}

fn logical_path(root: &Path, path: &Path) -> String {
    format!("/{}", relative_path(root, path))
}

#[cfg(unix)]
fn dir_identity(dir: &Path) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(dir).ok().map(|m| (m.dev(), m.ino()))
}

#[cfg(not(unix))]
fn dir_identity(_dir: &Path) -> Option<(u64, u64)> {
    None
}
