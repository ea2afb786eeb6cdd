// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Message Collector
//!
//! Single sink for everything the run wants to tell the user afterwards:
//! per-relay outcomes, per-file upload failures, relay notices. Entries are
//! tagged with a category and a key (relay URL or file path); the summary
//! groups identical messages and lists the affected keys.
//!
//! This is the only cross-task mutable structure; mutation is a short
//! append behind a mutex.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// What part of the run produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Relay publish outcomes (rejections, timeouts, transport errors).
    Relay,
    /// NOTICE frames surfaced by relays.
    Notice,
    /// Blob upload failures.
    Upload,
    /// Per-file problems found while walking the tree.
    Scan,
    /// Purge-path failures (deletion events, server DELETEs).
    Purge,
}

impl Category {
    fn label(self) -> &'static str {
        match self {
            Category::Relay => "relay",
            Category::Notice => "notice",
            Category::Upload => "upload",
            Category::Scan => "scan",
            Category::Purge => "purge",
        }
    }
}

/// One collected message.
#[derive(Debug, Clone)]
pub struct CollectedMessage {
    pub category: Category,
    /// Relay URL or file path the message is about.
    pub key: String,
    pub message: String,
}

/// Append-only sink shared by all tasks of a run.
#[derive(Debug, Default)]
pub struct Collector {
    entries: Mutex<Vec<CollectedMessage>>,
}

/// How many affected keys a grouped line shows in non-verbose mode.
const GROUP_PREVIEW: usize = 3;

impl Collector {
    pub fn new() -> Self {
        Collector::default()
    }

    /// Appends one message.
    pub fn record(&self, category: Category, key: impl Into<String>, message: impl Into<String>) {
        let entry = CollectedMessage {
            category,
            key: key.into(),
            message: message.into(),
        };
        self.entries.lock().expect("collector poisoned").push(entry);
    }

    /// Snapshot of everything collected so far.
    pub fn entries(&self) -> Vec<CollectedMessage> {
        self.entries.lock().expect("collector poisoned").clone()
    }

    /// Number of entries in a category.
    pub fn count(&self, category: Category) -> usize {
        self.entries
            .lock()
            .expect("collector poisoned")
            .iter()
            .filter(|e| e.category == category)
            .count()
    }

    /// Groups entries on (category, message) and renders one line per
    /// group with the affected keys, truncated unless `verbose`.
    pub fn grouped_lines(&self, verbose: bool) -> Vec<String> {
        let entries = self.entries();
        let mut groups: BTreeMap<(Category, String), Vec<String>> = BTreeMap::new();
        for entry in entries {
            groups
                .entry((entry.category, entry.message))
                .or_default()
                .push(entry.key);
        }

        groups
            .into_iter()
            .map(|((category, message), mut keys)| {
                keys.sort();
                keys.dedup();
                let shown: Vec<&String> = if verbose {
                    keys.iter().collect()
                } else {
                    keys.iter().take(GROUP_PREVIEW).collect()
                };
                let mut line = format!(
                    "{}: {} [{}]",
                    category.label(),
                    message,
                    shown
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                if !verbose && keys.len() > GROUP_PREVIEW {
                    line.push_str(&format!(" and {} more", keys.len() - GROUP_PREVIEW));
                }
                line
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let collector = Collector::new();
        collector.record(Category::Relay, "wss://r1", "timed out");
        collector.record(Category::Upload, "/a.html", "HTTP 500");

        let entries = collector.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(collector.count(Category::Relay), 1);
        assert_eq!(collector.count(Category::Upload), 1);
    }

    #[test]
    fn test_identical_messages_group() {
        let collector = Collector::new();
        for path in ["/a", "/b", "/c", "/d"] {
            collector.record(Category::Upload, path, "HTTP 503");
        }

        let lines = collector.grouped_lines(false);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("/a, /b, /c"));
        assert!(lines[0].contains("and 1 more"));
        assert!(!lines[0].contains("/d"));
    }

    #[test]
    fn test_verbose_shows_all_keys() {
        let collector = Collector::new();
        for path in ["/a", "/b", "/c", "/d"] {
            collector.record(Category::Upload, path, "HTTP 503");
        }

        let lines = collector.grouped_lines(true);
        assert!(lines[0].contains("/d"));
        assert!(!lines[0].contains("more"));
    }

    #[test]
    fn test_different_messages_do_not_group() {
        let collector = Collector::new();
        collector.record(Category::Relay, "wss://r1", "timed out");
        collector.record(Category::Relay, "wss://r2", "connection refused");
        assert_eq!(collector.grouped_lines(false).len(), 2);
    }
}
