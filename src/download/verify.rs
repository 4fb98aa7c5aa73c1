// src/download/verify.rs
// =============================================================================
// Checks that a gallery directory holds an unbroken run of images 1..=N.
//
// File names are "<index>.<ext>". Names whose stem is not a number (the
// metadata record, partial downloads, anything the user dropped in) are
// ignored, and indices above N do not matter. The check only reports; it
// never repairs anything.
// =============================================================================

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub expected: usize,
    /// How many of 1..=expected are present
    pub present: usize,
    /// The indices of 1..=expected that are not, ascending
    pub missing: Vec<usize>,
}

impl VerifyReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

pub fn inspect(dir: &Path, expected_count: usize) -> Result<VerifyReport, SessionError> {
    let indices = present_indices(dir)?;
    let missing: Vec<usize> = (1..=expected_count)
        .filter(|index| !indices.contains(index))
        .collect();

    Ok(VerifyReport {
        expected: expected_count,
        present: expected_count - missing.len(),
        missing,
    })
}

/// True iff every index in 1..=expected_count has a file.
///
/// The session itself uses `inspect` for the missing indices.
#[cfg(test)]
pub fn verify(dir: &Path, expected_count: usize) -> Result<bool, SessionError> {
    Ok(inspect(dir, expected_count)?.is_complete())
}

fn present_indices(dir: &Path) -> Result<BTreeSet<usize>, SessionError> {
    let store_error = |source: std::io::Error| SessionError::Store {
        path: dir.to_path_buf(),
        source,
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(store_error(e)),
    };

    let mut indices = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(store_error)?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
            continue;
        }
        let path = entry.path();
        let index = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<usize>().ok());
        if let Some(index) = index {
            indices.insert(index);
        }
    }
    Ok(indices)
}
