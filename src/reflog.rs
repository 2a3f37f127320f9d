//! Reference log reader.
//!
//! The conversion tool writes one tab-separated row per discovered ref:
//!
//! ```text
//! kind<TAB>rev<TAB>date<TAB>commits<TAB>source<TAB>dest
//! ```
//!
//! Rows without a tab (headers, blank lines) are skipped. Entries are keyed by
//! `/source/`, the same form the ruleset uses for source paths.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Classification of a discovered ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Branch,
    Tag,
}

impl RefKind {
    /// Name of the ruleset section holding refs of this kind.
    pub fn section(self) -> &'static str {
        match self {
            RefKind::Branch => "branches",
            RefKind::Tag => "tags",
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefKind::Branch => f.write_str("branch"),
            RefKind::Tag => f.write_str("tag"),
        }
    }
}

/// One row of the reference log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// `/source/`, the reconciliation key
    #[serde(skip)]
    pub source_path: String,
    pub kind: RefKind,
    pub first_rev: i64,
    /// Passed through as written
    pub date: String,
    pub commit_count: u64,
    pub dest_path: String,
}

/// All entries of a reference log, keyed by source path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefLog {
    entries: BTreeMap<String, LogEntry>,
}

impl RefLog {
    /// Parse log text.
    ///
    /// A later row for the same source replaces an earlier one.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut entries = BTreeMap::new();
        for (idx, line) in text.lines().enumerate() {
            if !line.contains('\t') {
                continue;
            }
            let entry = parse_row(line, idx + 1)?;
            if let Some(previous) = entries.insert(entry.source_path.clone(), entry) {
                tracing::warn!(
                    source = %previous.source_path,
                    line = idx + 1,
                    "duplicate log entry replaces an earlier one"
                );
            }
        }
        tracing::debug!(entries = entries.len(), "parsed reference log");
        Ok(Self { entries })
    }

    /// Read and parse a log file.
    pub fn read(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::ReadLog {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&text)
    }

    pub fn get(&self, source_path: &str) -> Option<&LogEntry> {
        self.entries.get(source_path)
    }

    /// Classification of `source_path`, if the log knows it.
    pub fn kind_of(&self, source_path: &str) -> Option<RefKind> {
        self.get(source_path).map(|e| e.kind)
    }

    /// Entries in source-path order.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_row(line: &str, line_no: usize) -> Result<LogEntry, Error> {
    let fields: Vec<&str> = line.split('\t').collect();
    let [kind, rev, date, commits, source, dest] = fields[..] else {
        return Err(Error::InputFormat {
            line: line_no,
            message: format!("expected 6 tab-separated fields, found {}", fields.len()),
        });
    };

    let kind = match kind {
        "branch" => RefKind::Branch,
        "tag" => RefKind::Tag,
        other => {
            return Err(Error::InputFormat {
                line: line_no,
                message: format!("unknown ref kind '{other}'"),
            });
        }
    };
    let first_rev = rev.trim().parse().map_err(|_| Error::InputFormat {
        line: line_no,
        message: format!("revision '{rev}' is not an integer"),
    })?;
    let commit_count = commits.trim().parse().map_err(|_| Error::InputFormat {
        line: line_no,
        message: format!("commit count '{commits}' is not a non-negative integer"),
    })?;

    // both paths end up inside double quotes in the ruleset
    for (name, value) in [("source", source), ("dest", dest)] {
        if value.is_empty() || value.contains('"') {
            return Err(Error::InputFormat {
                line: line_no,
                message: format!("{name} '{value}' is empty or contains '\"'"),
            });
        }
    }

    Ok(LogEntry {
        source_path: format!("/{source}/"),
        kind,
        first_rev,
        date: date.to_string(),
        commit_count,
        dest_path: dest.to_string(),
    })
}

/// Errors from reading the reference log.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read reference log '{path}'")]
    ReadLog {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed reference log at line {line}: {message}")]
    InputFormat { line: usize, message: String },
}
