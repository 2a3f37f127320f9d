//! Refmend: keep a history-migration ruleset in step with the refs the
//! conversion actually found.
//!
//! The ruleset declares, per repository, which source paths become branches
//! and which become tags. The conversion tool separately logs every ref it
//! discovered together with its classification. Refmend reconciles the two.
//!
//! # Architecture
//!
//! - **Reflog**: Read the conversion tool's tab-separated reference log
//! - **Ruleset**: Parse ref declarations and the `branches`/`tags` lists
//! - **Reconcile**: Add refs the log knows but the ruleset lacks, or audit
//! - **Tagify**: Move tag-classified entries out of `branches`, line by line
//! - **Settings**: Input paths and naming conventions, optionally from TOML
//! - **Output**: Replace an output file in one step

mod output;
mod reconcile;
mod reflog;
mod ruleset;
mod settings;
mod tagify;

pub use output::write_atomic;
pub use reconcile::{Discrepancy, add_missing_refs, audit, merge_missing};
pub use reflog::{Error as LogError, LogEntry, RefKind, RefLog};
pub use ruleset::{
    ConfigDocument, Error, RefLine, RefRecord, SECTION_SEPARATOR, Section, parse_ref_line, sorted,
};
pub use settings::{Error as SettingsError, Settings};
pub use tagify::{Action, Classifier, State, Tagified, tagify, transition};
