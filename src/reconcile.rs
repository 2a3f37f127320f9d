//! Add refs the conversion discovered but the ruleset never declared.

use std::fmt;

use crate::reflog::{LogEntry, RefKind, RefLog};
use crate::ruleset::{ConfigDocument, Error, RefRecord};
use crate::settings::Settings;

/// Rewrite `rules` so that every entry of `log` is declared.
///
/// The result is the whole ruleset re-rendered: head and tail verbatim, both
/// sections sorted by start revision.
pub fn add_missing_refs(rules: &str, log: &RefLog, settings: &Settings) -> Result<String, Error> {
    let mut doc = ConfigDocument::parse(rules, &settings.repository)?;
    let added = merge_missing(&mut doc, log);
    tracing::info!(
        added = added.len(),
        branches = doc.branches.len(),
        tags = doc.tags.len(),
        "reconciled ruleset with reference log"
    );
    Ok(doc.render())
}

/// Insert a record for each log entry `doc` does not declare yet, returning
/// the source paths that were added.
///
/// Existing records are never touched.
pub fn merge_missing(doc: &mut ConfigDocument, log: &RefLog) -> Vec<String> {
    let mut added = Vec::new();
    for entry in log.iter() {
        if doc.kind_of(&entry.source_path).is_some() {
            continue;
        }
        tracing::debug!(source = %entry.source_path, kind = %entry.kind, "adding missing ref");
        doc.section_mut(entry.kind)
            .insert(entry.source_path.clone(), record_for(entry));
        added.push(entry.source_path.clone());
    }
    added
}

fn record_for(entry: &LogEntry) -> RefRecord {
    RefRecord {
        start_rev: u64::try_from(entry.first_rev).ok(),
        end_rev: None,
        source_path: entry.source_path.clone(),
        dest_path: entry.dest_path.clone(),
    }
}

/// A disagreement between the ruleset and the reference log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    /// The log knows the ref, the ruleset does not declare it.
    Missing { source_path: String, kind: RefKind },

    /// The ruleset declares the ref in the other section.
    Misclassified {
        source_path: String,
        declared: RefKind,
        logged: RefKind,
    },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::Missing { source_path, kind } => {
                write!(f, "missing {source_path}: logged as {kind}, belongs in {}", kind.section())
            }
            Discrepancy::Misclassified {
                source_path,
                declared,
                logged,
            } => write!(
                f,
                "misclassified {source_path}: declared in {}, logged as {logged}",
                declared.section()
            ),
        }
    }
}

/// Compare `rules` with `log` without rewriting anything.
///
/// Records whose destination is the exempt one are allowed to stay in
/// `branches` even when the log calls them tags.
pub fn audit(rules: &str, log: &RefLog, settings: &Settings) -> Result<Vec<Discrepancy>, Error> {
    let doc = ConfigDocument::parse(rules, &settings.repository)?;
    let mut found = Vec::new();
    for entry in log.iter() {
        let Some(declared) = doc.kind_of(&entry.source_path) else {
            found.push(Discrepancy::Missing {
                source_path: entry.source_path.clone(),
                kind: entry.kind,
            });
            continue;
        };
        let exempt = doc
            .section(declared)
            .get(&entry.source_path)
            .is_some_and(|r| r.dest_path == settings.exempt_dest);
        if declared != entry.kind && !exempt {
            found.push(Discrepancy::Misclassified {
                source_path: entry.source_path.clone(),
                declared,
                logged: entry.kind,
            });
        }
    }
    Ok(found)
}
