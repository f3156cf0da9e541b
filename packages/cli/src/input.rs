// ABOUTME: Reads submission sources, stdin files, and test case lists from disk
// ABOUTME: Rejects empty sources and malformed or empty case files before any sandbox is started

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use timebox_sandbox::TestCase;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is empty")]
    Empty { path: PathBuf },

    #[error("Invalid test cases in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Duplicate test case id {id} in {path}")]
    DuplicateCase { path: PathBuf, id: i64 },
}

fn read(path: &Path) -> Result<String, InputError> {
    std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a source file. Whitespace-only files are rejected.
pub fn load_source(path: &Path) -> Result<String, InputError> {
    let code = read(path)?;
    if code.trim().is_empty() {
        return Err(InputError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(code)
}

/// Load stdin contents verbatim; an empty file is a valid (empty) stdin.
pub fn load_stdin(path: &Path) -> Result<String, InputError> {
    read(path)
}

/// Load a JSON array of test cases.
pub fn load_cases(path: &Path) -> Result<Vec<TestCase>, InputError> {
    let raw = read(path)?;
    let cases: Vec<TestCase> =
        serde_json::from_str(&raw).map_err(|source| InputError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if cases.is_empty() {
        return Err(InputError::Empty {
            path: path.to_path_buf(),
        });
    }

    let mut seen = HashSet::new();
    for case in &cases {
        if !seen.insert(case.id) {
            return Err(InputError::DuplicateCase {
                path: path.to_path_buf(),
                id: case.id,
            });
        }
    }

    Ok(cases)
}
