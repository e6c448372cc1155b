use std::{fs, path::PathBuf, time::SystemTime};

use audit_gate_core::{
    process_audit_json, render_json, Exception, ExceptionList, ProcessResult, Severity,
};
use insta::assert_snapshot;

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn process_fixture(name: &str, level: Severity, exceptions: &ExceptionList) -> ProcessResult {
    let fixture_path = fixture_dir().join(name);
    let input = fs::read_to_string(&fixture_path)
        .unwrap_or_else(|err| panic!("failed to read fixture {}: {err}", fixture_path.display()));
    process_audit_json(&input, level, exceptions, SystemTime::now())
        .unwrap_or_else(|err| panic!("processing failed for fixture {name}: {err}"))
}

#[test]
fn npm_v6_high_level_artifact() {
    let result = process_fixture("npm_v6.json", Severity::High, &ExceptionList::new());
    assert_eq!(result.unhandled_ids, vec!["1523", "1589"]);
    assert_eq!(result.below_level, 2);

    let artifact = render_json(&result.rows).unwrap();
    assert_snapshot!(artifact, @r###"
    [
      {
        "id": "1523",
        "package": "lodash",
        "title": "Prototype Pollution",
        "path": "lodash, async>lodash, eslint>lodash ...and 1 more",
        "severity": "high",
        "guide": "https://npmjs.com/advisories/1523",
        "expired": "n"
      },
      {
        "id": "1589",
        "package": "ini",
        "title": "Prototype Pollution",
        "path": "rc>ini",
        "severity": "critical",
        "guide": "https://npmjs.com/advisories/1589",
        "expired": "n"
      }
    ]
    "###);
}

#[test]
fn npm_v6_module_exception_and_unused_entries() {
    let exceptions = ExceptionList::from_lists(["1179", "4242"], ["lodash", "ini", "request"]);
    let result = process_fixture("npm_v6.json", Severity::Moderate, &exceptions);

    assert_eq!(result.unhandled_ids, vec!["1556"]);
    assert_eq!(result.excepted, 2);
    // 1179 is a low finding: filtered out before matching, so its exception is unused.
    assert_eq!(result.unused_exception_ids, vec!["1179", "4242"]);
    assert_eq!(result.unused_exception_modules, vec!["request"]);
}

#[test]
fn npm_v7_skips_transitive_references() {
    let result = process_fixture("npm_v7.json", Severity::Info, &ExceptionList::new());
    assert_eq!(result.unhandled_ids, vec!["1751", "1748"]);
    assert_eq!(result.rows[0].path, "node_modules/glob-parent");
}

#[test]
fn npm_v7_expired_exception_is_flagged() {
    let mut exceptions = ExceptionList::new();
    exceptions.push(Exception::advisory("1751").with_expiry(SystemTime::UNIX_EPOCH));
    exceptions.push(Exception::module("ws"));
    let result = process_fixture("npm_v7.json", Severity::Low, &exceptions);

    assert_eq!(result.unhandled_ids, vec!["1751"]);
    assert!(result.rows[0].expired);
    assert!(result.unused_exception_ids.is_empty());

    let artifact = render_json(&result.rows).unwrap();
    let value: serde_json::Value = serde_json::from_str(&artifact).unwrap();
    assert_eq!(value[0]["expired"], "y");
}

#[test]
fn rendering_twice_is_byte_identical() {
    let render = || {
        let result = process_fixture("npm_v6.json", Severity::Info, &ExceptionList::new());
        render_json(&result.rows).unwrap()
    };
    assert_eq!(render(), render());
}
