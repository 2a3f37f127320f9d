use refmend::{RefLog, Settings, tagify};

const RULES: &str = include_str!("fixtures/repositories.txt");
const LOG: &str = include_str!("fixtures/branches.txt");
const MOVED: &str = "    [ 1050:     ] \"/tags/release/Boost_1_30_0/\" : \"boost-1.30.0\";\n";

fn ref_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text
        .lines()
        .filter(|l| l.trim_start().starts_with('['))
        .collect();
    lines.sort_unstable();
    lines
}

#[test]
fn moves_logged_tags_after_branches() {
    let result = tagify(RULES, &RefLog::parse(LOG).unwrap(), &Settings::default()).unwrap();

    let expected = RULES.replace(MOVED, "").replacen(
        "  }\n  tags\n  {\n",
        &format!("  }}\n  tags\n  {{\n{MOVED}  }}\n  tags\n  {{\n"),
        1,
    );
    assert_eq!(result.text, expected);
    assert_eq!(result.moved, vec!["/tags/release/Boost_1_30_0/".to_string()]);
}

#[test]
fn ref_lines_are_conserved() {
    let result = tagify(RULES, &RefLog::parse(LOG).unwrap(), &Settings::default()).unwrap();
    assert_eq!(ref_lines(RULES), ref_lines(&result.text));
}

#[test]
fn untouched_lines_pass_through_verbatim() {
    let rules = RULES.replace("    [  900:", "\t  [  900:").replace("// trunk", "//   trunk  ");
    let result = tagify(&rules, &RefLog::parse(LOG).unwrap(), &Settings::default()).unwrap();

    let kept: Vec<&str> = rules.lines().filter(|l| *l != MOVED.trim_end_matches('\n')).collect();
    let mut out = result.text.lines();
    for line in kept {
        assert!(out.any(|o| o == line), "{line:?} lost or reordered");
    }
}

#[test]
fn master_destination_is_never_moved() {
    let log = RefLog::parse("tag\t1\t2000-07-07\t9000\ttrunk\tmaster\n").unwrap();
    let result = tagify(RULES, &log, &Settings::default()).unwrap();
    assert_eq!(result.text, RULES);
    assert!(result.moved.is_empty());
    assert!(result.unaccounted.is_empty());
}

#[test]
fn exempt_destination_comes_from_settings() {
    let log = RefLog::parse("tag\t900\td\t1\tbranches/release\trelease\n").unwrap();
    let settings = Settings {
        exempt_dest: "release".to_string(),
        ..Settings::default()
    };
    let result = tagify(RULES, &log, &settings).unwrap();
    assert_eq!(result.text, RULES);
}

#[test]
fn unaccounted_refs_are_reported() {
    let result = tagify(RULES, &RefLog::parse(LOG).unwrap(), &Settings::default()).unwrap();
    assert_eq!(
        result.unaccounted.keys().map(String::as_str).collect::<Vec<_>>(),
        vec![
            "/branches/spirit/",
            "/tags/spirit_1_8/",
            "/tags/version_1_18_0/",
            "/tags/version_1_20_0/",
        ]
    );

    let report = toml::to_string_pretty(&result.unaccounted).unwrap();
    let parsed: toml::Table = report.parse().unwrap();
    let spirit = &parsed["/tags/spirit_1_8/"];
    assert_eq!(spirit["kind"].as_str(), Some("tag"));
    assert_eq!(spirit["first_rev"].as_integer(), Some(2600));
    assert_eq!(spirit["date"].as_str(), Some("2004-06-01"));
    assert_eq!(spirit["commit_count"].as_integer(), Some(1));
    assert_eq!(spirit["dest_path"].as_str(), Some("spirit-1.8"));
}

#[test]
fn worked_example_from_single_branch() {
    let rules = "abstract repository common_branches\n{\n  branches\n  {\n    [1050:] \"/release/1.0/\" : \"boost/tags/1.0\";\n  }\n}\n";
    let log = RefLog::parse("tag\t1050\t2013-01-01\t3\trelease/1.0\ttags/1.0\n").unwrap();
    let result = tagify(rules, &log, &Settings::default()).unwrap();
    assert_eq!(
        result.text,
        "abstract repository common_branches\n{\n  branches\n  {\n  }\n  tags\n  {\n    [1050:] \"/release/1.0/\" : \"boost/tags/1.0\";\n  }\n}\n"
    );
}

#[test]
fn brace_must_follow_branches_keyword() {
    let rules = "repository x\n{\n  branches\n  // where the brace should be\n  {\n  }\n}\n";
    let err = tagify(rules, &RefLog::default(), &Settings::default()).unwrap_err();
    assert!(
        matches!(err, refmend::Error::UnexpectedStructure { line: 4, .. }),
        "{err}"
    );
}

#[test]
fn malformed_entry_aborts_the_rewrite() {
    let rules = RULES.replace("\"/branches/dev/\" :", "\"/branches/dev/\"");
    let err = tagify(&rules, &RefLog::parse(LOG).unwrap(), &Settings::default()).unwrap_err();
    assert!(matches!(err, refmend::Error::MalformedRefLine { line: 11, .. }), "{err}");
}
