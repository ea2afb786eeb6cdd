// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Ignore Rules
//!
//! Newline-separated glob patterns with `#` comments and blank lines.
//! A pattern without `/` matches any basename; with `/` it matches the
//! whole path relative to the site root. `*` never crosses a slash.
//! Negation is not supported.

use std::path::Path;

use glob::{MatchOptions, Pattern};

use super::ScanError;

/// Name of the ignore file looked up in the site root.
pub const IGNORE_FILE: &str = ".driftignore";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug)]
struct Rule {
    pattern: Pattern,
    /// Patterns containing `/` match the full relative path; others match
    /// the basename of every path component.
    full_path: bool,
}

/// Compiled ignore rules.
#[derive(Default, Debug)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl IgnoreRules {
    /// Rules that ignore nothing.
    pub fn empty() -> Self {
        IgnoreRules { rules: Vec::new() }
    }

    /// Parses rules from ignore-file text.
    pub fn parse(text: &str) -> Result<Self, ScanError> {
        let mut rules = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let pattern = Pattern::new(line).map_err(|e| ScanError::BadPattern {
                pattern: line.to_string(),
                message: e.to_string(),
            })?;
            rules.push(Rule {
                pattern,
                full_path: line.contains('/'),
            });
        }
        Ok(IgnoreRules { rules })
    }

    /// Loads the ignore file from `root` if present; missing file means no
    /// rules.
    pub fn load(root: &Path) -> Result<Self, ScanError> {
        let path = root.join(IGNORE_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty()),
            Err(source) => Err(ScanError::Io {
                path: format!("/{IGNORE_FILE}"),
                source,
            }),
        }
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rules are present.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Tests a path relative to the site root (no leading slash).
    pub fn is_ignored(&self, relative: &str) -> bool {
        let basename = relative.rsplit('/').next().unwrap_or(relative);
        self.rules.iter().any(|rule| {
            if rule.full_path {
                rule.pattern.matches_with(relative, MATCH_OPTIONS)
            } else {
                rule.pattern.matches_with(basename, MATCH_OPTIONS)
            }
        })
    }
}
