//! Move refs the log classifies as tags out of `branches`.
//!
//! Unlike [`add_missing_refs`](crate::add_missing_refs), this is a targeted
//! edit: the ruleset is streamed line by line and every line that is not
//! moved is written back byte for byte, comments and spacing included.
//!
//! Each `branches { ... }` list is scanned by a small state machine. Entries
//! whose source the log calls a tag are held back and emitted, right after
//! the list closes, as a new `tags { ... }` block.

use std::collections::{BTreeMap, BTreeSet};

use crate::reflog::{LogEntry, RefKind, RefLog};
use crate::ruleset::{Error, RefLine, is_passthrough, parse_ref_line};
use crate::settings::Settings;

/// Where the scan is relative to a `branches` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Outside,
    /// Saw `branches`, expecting `{`
    BranchesHeader,
    /// Inside the list, holding the lines moved so far
    Inside { moved: Vec<String> },
}

impl State {
    fn describe(&self) -> &'static str {
        match self {
            State::Outside => "outside a branches list",
            State::BranchesHeader => "expecting `{` after `branches`",
            State::Inside { .. } => "inside a branches list",
        }
    }
}

/// What to do with the line a transition consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write the line unchanged.
    Echo,
    /// Write the line unchanged; it declares `source_path`.
    Keep { source_path: String },
    /// Hold the line back; it declares `source_path`, which is a tag.
    Move { source_path: String },
    /// Write the closing line, then `moved` as a new tags block.
    Close { moved: Vec<String> },
}

/// Decides, per source path, whether a `branches` entry is really a tag.
pub struct Classifier<'a> {
    log: &'a RefLog,
    exempt_dest: &'a str,
}

impl<'a> Classifier<'a> {
    pub fn new(log: &'a RefLog, settings: &'a Settings) -> Self {
        Self {
            log,
            exempt_dest: &settings.exempt_dest,
        }
    }

    /// Refs missing from the log count as branches.
    pub fn is_tag(&self, source_path: &str, dest_path: &str) -> bool {
        dest_path != self.exempt_dest && self.log.kind_of(source_path) == Some(RefKind::Tag)
    }
}

/// Advance the scan by one line. `line_no` is 1-based and used in errors.
pub fn transition(
    state: State,
    line: &str,
    line_no: usize,
    classifier: &Classifier<'_>,
) -> Result<(State, Action), Error> {
    let trimmed = line.trim();
    match state {
        State::Outside => match branches_opener(trimmed) {
            None => Ok((State::Outside, Action::Echo)),
            Some("") => Ok((State::BranchesHeader, Action::Echo)),
            Some("{") => Ok((State::Inside { moved: Vec::new() }, Action::Echo)),
            Some(_) => Err(unexpected(&State::Outside, line, line_no)),
        },
        State::BranchesHeader if trimmed == "{" => {
            Ok((State::Inside { moved: Vec::new() }, Action::Echo))
        }
        State::BranchesHeader => Err(unexpected(&State::BranchesHeader, line, line_no)),
        State::Inside { moved } if trimmed == "}" => Ok((State::Outside, Action::Close { moved })),
        State::Inside { moved } if is_passthrough(line) => {
            Ok((State::Inside { moved }, Action::Echo))
        }
        State::Inside { mut moved } => {
            let RefLine::Entry(record) = parse_ref_line(line, line_no)? else {
                return Ok((State::Inside { moved }, Action::Echo));
            };
            if classifier.is_tag(&record.source_path, &record.dest_path) {
                moved.push(line.to_string());
                Ok((
                    State::Inside { moved },
                    Action::Move {
                        source_path: record.source_path,
                    },
                ))
            } else {
                Ok((
                    State::Inside { moved },
                    Action::Keep {
                        source_path: record.source_path,
                    },
                ))
            }
        }
    }
}

/// What follows the `branches` keyword on its line, or `None` if the line
/// does not start with the keyword.
fn branches_opener(trimmed: &str) -> Option<&str> {
    let rest = trimmed.strip_prefix("branches")?;
    if rest.is_empty() || rest.starts_with('{') || rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn unexpected(state: &State, line: &str, line_no: usize) -> Error {
    Error::UnexpectedStructure {
        line: line_no,
        state: state.describe(),
        text: line.trim_end().to_string(),
    }
}

/// Result of reclassifying a ruleset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagified {
    /// The rewritten ruleset
    pub text: String,
    /// Source paths that were moved into a tags block, in file order
    pub moved: Vec<String>,
    /// Log entries no branches list accounts for, keyed by source path
    pub unaccounted: BTreeMap<String, LogEntry>,
}

/// Reclassify every `branches` list in `rules` against `log`.
///
/// Nothing is returned unless the whole input scans cleanly.
pub fn tagify(rules: &str, log: &RefLog, settings: &Settings) -> Result<Tagified, Error> {
    let classifier = Classifier::new(log, settings);
    let mut out = String::with_capacity(rules.len() + 64);
    let mut found = BTreeSet::new();
    let mut moved_paths = Vec::new();
    let mut state = State::Outside;
    let mut line_no = 0;

    for line in rules.split_inclusive('\n') {
        line_no += 1;
        let (next, action) = transition(state, line, line_no, &classifier)?;
        state = next;
        match action {
            Action::Echo => out.push_str(line),
            Action::Keep { source_path } => {
                out.push_str(line);
                found.insert(source_path);
            }
            Action::Move { source_path } => {
                tracing::debug!(source = %source_path, line = line_no, "moving ref to tags");
                found.insert(source_path.clone());
                moved_paths.push(source_path);
            }
            Action::Close { moved } => {
                out.push_str(line);
                if !moved.is_empty() {
                    if !line.ends_with('\n') {
                        out.push('\n');
                    }
                    write_tags_block(&mut out, &moved);
                }
            }
        }
    }

    if state != State::Outside {
        return Err(Error::UnexpectedStructure {
            line: line_no,
            state: state.describe(),
            text: "end of input".to_string(),
        });
    }

    let unaccounted = unaccounted_entries(log, &found, &settings.nested_prefix);
    tracing::info!(
        moved = moved_paths.len(),
        unaccounted = unaccounted.len(),
        "reclassified branches"
    );
    Ok(Tagified {
        text: out,
        moved: moved_paths,
        unaccounted,
    })
}

fn write_tags_block(out: &mut String, moved: &[String]) {
    out.push_str("  tags\n  {\n");
    for line in moved {
        out.push_str(line);
        if !line.ends_with('\n') {
            out.push('\n');
        }
    }
    out.push_str("  }\n");
}

/// Log entries never seen in a branches list.
///
/// A key also counts as seen when `key + nested_prefix` was, which is how
/// the nested repository lays out its refs.
fn unaccounted_entries(
    log: &RefLog,
    found: &BTreeSet<String>,
    nested_prefix: &str,
) -> BTreeMap<String, LogEntry> {
    log.iter()
        .filter(|e| {
            !found.contains(&e.source_path)
                && !found.contains(&format!("{}{nested_prefix}", e.source_path))
        })
        .map(|e| (e.source_path.clone(), e.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG_LINE: &str = "    [1050:] \"/release/1.0/\" : \"boost/tags/1.0\";\n";

    fn log() -> RefLog {
        RefLog::parse(
            "tag\t1050\t2013-01-01\t3\trelease/1.0\ttags/1.0\n\
             tag\t1\t2000-01-01\t9\ttrunk\tmaster\n\
             branch\t20\t2001-01-01\t5\tbranches/dev\tdev\n",
        )
        .unwrap()
    }

    fn step(state: State, line: &str) -> Result<(State, Action), Error> {
        let log = log();
        let settings = Settings::default();
        transition(state, line, 1, &Classifier::new(&log, &settings))
    }

    #[test]
    fn branches_keyword_then_brace_enters_list() {
        let (state, action) = step(State::Outside, "  branches\n").unwrap();
        assert_eq!((state.clone(), action), (State::BranchesHeader, Action::Echo));

        let (state, action) = step(state, "  {\n").unwrap();
        assert_eq!(state, State::Inside { moved: vec![] });
        assert_eq!(action, Action::Echo);
    }

    #[test]
    fn other_lines_outside_are_echoed() {
        for line in ["repository x\n", "  tags\n", "  {\n", "  // branches\n", "\n"] {
            assert_eq!(step(State::Outside, line).unwrap(), (State::Outside, Action::Echo));
        }
    }

    #[test]
    fn brace_on_the_keyword_line_enters_list() {
        for line in ["  branches {\n", "branches{\n", "\tbranches   {  \r\n"] {
            let (state, action) = step(State::Outside, line).unwrap();
            assert_eq!(state, State::Inside { moved: vec![] }, "{line:?}");
            assert_eq!(action, Action::Echo);
        }
    }

    #[test]
    fn anything_else_after_branches_keyword_is_rejected() {
        for line in ["  branches { }\n", "  branches {  [1:] \"/a/\" : \"a\"; }\n", "branches x\n"] {
            let err = step(State::Outside, line).unwrap_err();
            assert!(matches!(err, Error::UnexpectedStructure { line: 1, .. }), "{err}");
        }
        assert_eq!(
            step(State::Outside, "  branches_old\n").unwrap(),
            (State::Outside, Action::Echo)
        );
    }

    #[test]
    fn header_must_be_followed_by_brace() {
        let err = step(State::BranchesHeader, "    [1:] \"/a/\" : \"a\";\n").unwrap_err();
        assert!(matches!(err, Error::UnexpectedStructure { line: 1, .. }), "{err}");
    }

    #[test]
    fn tag_entry_is_held_back() {
        let (state, action) = step(State::Inside { moved: vec![] }, TAG_LINE).unwrap();
        assert_eq!(
            state,
            State::Inside {
                moved: vec![TAG_LINE.to_string()]
            }
        );
        assert_eq!(
            action,
            Action::Move {
                source_path: "/release/1.0/".to_string()
            }
        );
    }

    #[test]
    fn exempt_destination_stays_a_branch() {
        let line = "    [1:] \"/trunk/\" : \"master\";\n";
        let (_, action) = step(State::Inside { moved: vec![] }, line).unwrap();
        assert_eq!(
            action,
            Action::Keep {
                source_path: "/trunk/".to_string()
            }
        );
    }

    #[test]
    fn unknown_and_branch_entries_are_kept() {
        for (line, source) in [
            ("    [20:] \"/branches/dev/\" : \"dev\";\n", "/branches/dev/"),
            ("    [30:] \"/branches/x/\" : \"x\";\n", "/branches/x/"),
        ] {
            let (_, action) = step(State::Inside { moved: vec![] }, line).unwrap();
            assert_eq!(
                action,
                Action::Keep {
                    source_path: source.to_string()
                }
            );
        }
    }

    #[test]
    fn comments_inside_are_echoed() {
        let inside = State::Inside {
            moved: vec!["x\n".to_string()],
        };
        let (state, action) = step(inside.clone(), "    // note\n").unwrap();
        assert_eq!((state, action), (inside, Action::Echo));
    }

    #[test]
    fn closing_brace_releases_moved_lines() {
        let inside = State::Inside {
            moved: vec![TAG_LINE.to_string()],
        };
        let (state, action) = step(inside, "  }\n").unwrap();
        assert_eq!(state, State::Outside);
        assert_eq!(
            action,
            Action::Close {
                moved: vec![TAG_LINE.to_string()]
            }
        );
    }

    #[test]
    fn garbage_inside_is_malformed() {
        let err = step(State::Inside { moved: vec![] }, "    nonsense\n").unwrap_err();
        assert!(matches!(err, Error::MalformedRefLine { .. }), "{err}");
    }

    #[test]
    fn moves_tag_into_new_block() {
        let rules = format!(
            "repository boost\n{{\n  branches\n  {{\n    [1:] \"/trunk/\" : \"master\";\n{TAG_LINE}  }}\n}}\n"
        );
        let result = tagify(&rules, &log(), &Settings::default()).unwrap();
        assert_eq!(
            result.text,
            format!(
                "repository boost\n{{\n  branches\n  {{\n    [1:] \"/trunk/\" : \"master\";\n  }}\n  tags\n  {{\n{TAG_LINE}  }}\n}}\n"
            )
        );
        assert_eq!(result.moved, vec!["/release/1.0/".to_string()]);
        assert_eq!(
            result.unaccounted.keys().collect::<Vec<_>>(),
            vec!["/branches/dev/"]
        );
    }

    #[test]
    fn nested_prefix_accounts_for_parent_key() {
        let rules = "branches\n{\n  [20:] \"/branches/dev/boost/\" : \"dev\";\n}\n";
        let log = RefLog::parse("branch\t20\td\t5\tbranches/dev\tdev\n").unwrap();
        let result = tagify(rules, &log, &Settings::default()).unwrap();
        assert!(result.unaccounted.is_empty());
        assert_eq!(result.text, rules);
    }

    #[test]
    fn moves_tag_out_of_single_line_opener() {
        let rules = "repository \"common_branches\" {\n  branches {\n    [1050:] \"/release/1.0/\" : \"boost/tags/1.0\";\n  }\n  tags {\n  }\n}\n";
        let result = tagify(rules, &log(), &Settings::default()).unwrap();
        assert_eq!(result.moved, vec!["/release/1.0/".to_string()]);
        assert!(!result.unaccounted.contains_key("/release/1.0/"));
        assert_eq!(
            result.text,
            "repository \"common_branches\" {\n  branches {\n  }\n  tags\n  {\n    [1050:] \"/release/1.0/\" : \"boost/tags/1.0\";\n  }\n  tags {\n  }\n}\n"
        );
    }

    #[test]
    fn unterminated_list_is_an_error() {
        let err = tagify("branches\n{\n", &log(), &Settings::default()).unwrap_err();
        assert!(matches!(err, Error::UnexpectedStructure { line: 2, .. }), "{err}");
    }
}
