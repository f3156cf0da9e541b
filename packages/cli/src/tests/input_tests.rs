use crate::input::{load_cases, load_source, load_stdin, InputError};
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_source_reads_file() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "main.py", "print('hi')\n");

    assert_eq!(load_source(&path).unwrap(), "print('hi')\n");
}

#[test]
fn test_load_source_rejects_blank_file() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "main.py", "  \n\t\n");

    assert!(matches!(load_source(&path), Err(InputError::Empty { .. })));
}

#[test]
fn test_load_source_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = load_source(&dir.path().join("nope.py")).unwrap_err();

    assert!(matches!(err, InputError::Read { .. }));
    assert!(err.to_string().contains("nope.py"));
}

#[test]
fn test_load_stdin_allows_empty_file() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "stdin.txt", "");

    assert_eq!(load_stdin(&path).unwrap(), "");
}

#[test]
fn test_load_cases_accepts_output_alias() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "cases.json",
        r#"[
            {"id": 1, "input": "1 2\n", "output": "3"},
            {"id": 2, "input": "5 5\n", "expectedOutput": "10", "timeLimitMs": 2000}
        ]"#,
    );

    let cases = load_cases(&path).unwrap();
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0].expected_output.as_deref(), Some("3"));
    assert_eq!(cases[1].expected_output.as_deref(), Some("10"));
    assert_eq!(cases[1].time_limit_ms, Some(2000));
}

#[test]
fn test_load_cases_rejects_empty_list() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "cases.json", "[]");

    assert!(matches!(load_cases(&path), Err(InputError::Empty { .. })));
}

#[test]
fn test_load_cases_rejects_malformed_json() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "cases.json", r#"{"id": 1}"#);

    assert!(matches!(load_cases(&path), Err(InputError::Parse { .. })));
}

#[test]
fn test_load_cases_rejects_duplicate_ids() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "cases.json",
        r#"[{"id": 7, "output": "a"}, {"id": 7, "output": "b"}]"#,
    );

    match load_cases(&path) {
        Err(InputError::DuplicateCase { id, .. }) => assert_eq!(id, 7),
        other => panic!("expected duplicate case error, got {:?}", other),
    }
}
