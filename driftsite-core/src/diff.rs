// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Site Differencing
//!
//! Pure comparison of the local and remote file sets, keyed by path and
//! compared on (path, hash) only. Runs in O(n + m); output sequences are
//! lexicographically ordered by path.

use std::collections::{HashMap, HashSet};

use crate::scan::FileEntry;

/// Partition of local and remote entries into work sets.
#[derive(Debug, Default)]
pub struct SiteDiff {
    /// Local files with no matching (path, hash) remotely.
    pub to_upload: Vec<FileEntry>,
    /// Local files already announced with the same hash.
    pub unchanged: Vec<FileEntry>,
    /// Remote files with no local counterpart path.
    pub to_delete: Vec<FileEntry>,
}

impl SiteDiff {
    /// True when there is nothing to upload and nothing to delete.
    pub fn is_noop(&self) -> bool {
        self.to_upload.is_empty() && self.to_delete.is_empty()
    }
}

/// Computes the diff between local and remote sets.
pub fn compute_diff(local: Vec<FileEntry>, remote: Vec<FileEntry>) -> SiteDiff {
    let remote_hashes: HashMap<&str, &str> = remote
        .iter()
        .map(|entry| (entry.path.as_str(), entry.hash.as_str()))
        .collect();
    let local_paths: HashSet<&str> = local.iter().map(|entry| entry.path.as_str()).collect();

    let mut diff = SiteDiff {
        to_delete: remote
            .iter()
            .filter(|entry| !local_paths.contains(entry.path.as_str()))
            .cloned()
            .collect(),
        ..SiteDiff::default()
    };

    for entry in local {
        match remote_hashes.get(entry.path.as_str()) {
            Some(&hash) if hash == entry.hash => diff.unchanged.push(entry),
            _ => diff.to_upload.push(entry),
        }
    }

    diff.to_upload.sort_by(|a, b| a.path.cmp(&b.path));
    diff.unchanged.sort_by(|a, b| a.path.cmp(&b.path));
    diff.to_delete.sort_by(|a, b| a.path.cmp(&b.path));
    diff
}
