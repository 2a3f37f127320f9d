//! Ruleset parsing.
//!
//! A ruleset describes, per source repository, which source paths become
//! which destination refs:
//!
//! ```text
//! abstract repository common_branches
//! {
//!   branches
//!   {
//!     [  120:     ] "/branches/dev/" : "dev";
//!   }
//!   tags
//!   {
//!     [ 1050:     ] "/tags/1.0/" : "1.0";
//!   }
//! }
//! ```
//!
//! Only the `branches` and `tags` lists of one repository block are parsed
//! into records. Everything before them is kept verbatim as the head and
//! everything from the close of the last `tags` list onward as the tail.
//! Consecutive `tags` lists are read as one section.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::reflog::RefKind;

/// Opens the `tags` section when a document is rendered.
pub const SECTION_SEPARATOR: &str = "\n  }\n  tags\n  {\n";

static REF_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*\[\s*(\d*)\s*:\s*(\d*)\s*\]\s*"([^"]+)"\s*:\s*"([^"]+)"\s*;\s*(?://.*)?\s*$"#)
        .expect("valid ref line regex")
});

/// A further `tags` list directly after the closing brace of the previous one.
static EXTRA_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?sm)\A[ \t]*\}[ \t]*\r?\n\s*tags\s*\{[ \t]*\r?\n(?P<tags>.*?)(?P<tail>^\s*\}.*)\z")
        .expect("valid extra tags regex")
});

/// One `[start:end] "source" : "dest";` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefRecord {
    pub start_rev: Option<u64>,
    pub end_rev: Option<u64>,
    pub source_path: String,
    pub dest_path: String,
}

impl RefRecord {
    /// Revision the record is ordered by; an unset start sorts as zero.
    pub fn sort_key(&self) -> u64 {
        self.start_rev.unwrap_or(0)
    }
}

impl fmt::Display for RefRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "    [{:>5}:{:>5}] \"{}\" : \"{}\";",
            rev_text(self.start_rev),
            rev_text(self.end_rev),
            self.source_path,
            self.dest_path
        )
    }
}

fn rev_text(rev: Option<u64>) -> String {
    rev.map(|r| r.to_string()).unwrap_or_default()
}

/// A line inside a `branches` or `tags` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefLine {
    /// Blank or `//` comment
    Skip,
    Entry(RefRecord),
}

/// Whether a line is blank or a `//` comment.
pub fn is_passthrough(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with("//")
}

/// Parse one line of a refs list. `line_no` is only used for error reporting.
pub fn parse_ref_line(line: &str, line_no: usize) -> Result<RefLine, Error> {
    if is_passthrough(line) {
        return Ok(RefLine::Skip);
    }

    let malformed = || Error::MalformedRefLine {
        line: line_no,
        text: line.trim_end().to_string(),
    };
    let caps = REF_LINE.captures(line).ok_or_else(malformed)?;
    let rev = |idx: usize| -> Result<Option<u64>, Error> {
        match &caps[idx] {
            "" => Ok(None),
            digits => digits.parse().map(Some).map_err(|_| malformed()),
        }
    };

    Ok(RefLine::Entry(RefRecord {
        start_rev: rev(1)?,
        end_rev: rev(2)?,
        source_path: caps[3].to_string(),
        dest_path: caps[4].to_string(),
    }))
}

/// Records of one section, keyed by source path.
pub type Section = BTreeMap<String, RefRecord>;

/// Structured view of a ruleset file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    /// Text up to and including the line that opens `branches`
    pub head: String,
    pub branches: Section,
    pub tags: Section,
    /// Text from the line that closes the last `tags` list to the end
    pub tail: String,
}

impl ConfigDocument {
    /// Parse `text`, locating the `branches` and `tags` lists of `repository`.
    pub fn parse(text: &str, repository: &str) -> Result<Self, Error> {
        let structure = structure_regex(repository);
        let not_found = || Error::StructureNotFound {
            repository: repository.to_string(),
        };
        let caps = structure.captures(text).ok_or_else(not_found)?;
        let (Some(head), Some(branches_body), Some(tags_body), Some(tail)) = (
            caps.name("head"),
            caps.name("branches"),
            caps.name("tags"),
            caps.name("tail"),
        ) else {
            return Err(not_found());
        };

        let mut branches = Section::new();
        parse_section(text, branches_body.range(), RefKind::Branch, &mut branches)?;

        // consecutive `tags` lists all belong to the tags section
        let mut tags = Section::new();
        parse_section(text, tags_body.range(), RefKind::Tag, &mut tags)?;
        let mut tail_start = tail.start();
        while let Some(more) = EXTRA_TAGS.captures(&text[tail_start..]) {
            let (Some(body), Some(rest)) = (more.name("tags"), more.name("tail")) else {
                break;
            };
            let body = tail_start + body.start()..tail_start + body.end();
            parse_section(text, body, RefKind::Tag, &mut tags)?;
            tail_start += rest.start();
        }
        if let Some(source_path) = branches.keys().find(|k| tags.contains_key(*k)) {
            return Err(Error::ConflictingRef {
                source_path: source_path.clone(),
            });
        }

        Ok(Self {
            head: head.as_str().to_string(),
            branches,
            tags,
            tail: text[tail_start..].to_string(),
        })
    }

    pub fn section(&self, kind: RefKind) -> &Section {
        match kind {
            RefKind::Branch => &self.branches,
            RefKind::Tag => &self.tags,
        }
    }

    pub fn section_mut(&mut self, kind: RefKind) -> &mut Section {
        match kind {
            RefKind::Branch => &mut self.branches,
            RefKind::Tag => &mut self.tags,
        }
    }

    /// Section currently declaring `source_path`, if any.
    pub fn kind_of(&self, source_path: &str) -> Option<RefKind> {
        if self.branches.contains_key(source_path) {
            Some(RefKind::Branch)
        } else if self.tags.contains_key(source_path) {
            Some(RefKind::Tag)
        } else {
            None
        }
    }

    /// Render the document with each section sorted by start revision.
    pub fn render(&self) -> String {
        let mut out = self.head.clone();
        render_section(&mut out, &self.branches);
        out.push_str(SECTION_SEPARATOR);
        render_section(&mut out, &self.tags);
        out.push_str(&self.tail);
        out
    }
}

/// Records of `section` ordered by start revision, ties by source path.
pub fn sorted(section: &Section) -> Vec<&RefRecord> {
    let mut records: Vec<&RefRecord> = section.values().collect();
    records.sort_by_key(|r| r.sort_key());
    records
}

fn render_section(out: &mut String, section: &Section) {
    for record in sorted(section) {
        out.push_str(&record.to_string());
        out.push('\n');
    }
}

fn structure_regex(repository: &str) -> Regex {
    let name = regex::escape(repository);
    let pattern = format!(
        r#"(?sm)\A(?P<head>.*?\brepository\s+"?{name}"?\s*(?::[^{{]*)?\{{\s*branches\s*\{{[ \t]*\r?\n)(?P<branches>.*?)^\s*\}}\s*tags\s*\{{[ \t]*\r?\n(?P<tags>.*?)(?P<tail>^\s*\}}.*)\z"#
    );
    Regex::new(&pattern).expect("valid ruleset structure regex")
}

fn parse_section(
    text: &str,
    body: Range<usize>,
    kind: RefKind,
    section: &mut Section,
) -> Result<(), Error> {
    let first_line = text[..body.start].matches('\n').count() + 1;
    for (idx, line) in text[body].lines().enumerate() {
        let RefLine::Entry(record) = parse_ref_line(line, first_line + idx)? else {
            continue;
        };
        if section.contains_key(&record.source_path) {
            return Err(Error::DuplicateRef {
                section: kind.section(),
                source_path: record.source_path,
            });
        }
        section.insert(record.source_path.clone(), record);
    }
    Ok(())
}

/// Errors from parsing or rewriting a ruleset.
#[derive(Debug, Error)]
pub enum Error {
    #[error("line {line}: not a ref declaration: {text:?}")]
    MalformedRefLine { line: usize, text: String },

    #[error("no `branches {{ ... }} tags {{ ... }}` pair found in repository '{repository}'")]
    StructureNotFound { repository: String },

    #[error("line {line}: unexpected {text:?} while {state}")]
    UnexpectedStructure {
        line: usize,
        state: &'static str,
        text: String,
    },

    #[error("'{source_path}' is declared both as a branch and as a tag")]
    ConflictingRef { source_path: String },

    #[error("'{source_path}' is declared twice in {section}")]
    DuplicateRef {
        section: &'static str,
        source_path: String,
    },
}
