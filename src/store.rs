// src/store.rs
// =============================================================================
// Local filesystem side of a session.
//
// One directory per gallery, named after the sanitized title:
//
//   <output>/<title>/galleryInfo.json   metadata record, written once
//   <output>/<title>/1.jpg ... N.png    images, named by sequence number
//
// Nothing here terminates the process; every failure is returned to the
// session, which decides whether it is fatal.
// =============================================================================

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SessionError;
use crate::gallery::GallerySummary;

// Characters not allowed in directory names on Windows or Linux
const FORBIDDEN: [char; 9] = ['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

// Turns a gallery title into a usable directory name.
//
// Example:
//   "[sfs]\24r/f4?*<q>|:" -> "[sfs]_24r_f4___q___"
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) || c.is_control() { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.').to_string();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}

// Counts the media files directly inside `dir`.
//
// Only the top level is scanned and extensions compare case-insensitively.
// A directory that does not exist yet holds zero files.
pub fn count_local_media(dir: &Path, extensions: &[String]) -> Result<usize, SessionError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(source) => return Err(store_error(dir, source)),
    };

    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|source| store_error(dir, source))?;
        // Sub-directories and anything we cannot stat are skipped
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let path = entry.path();
        // "3.jpg.part" has extension "part", so partial downloads never count
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if matches {
            count += 1;
        }
    }

    debug!(dir = %dir.display(), count, "counted local media");
    Ok(count)
}

pub fn metadata_path(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(file_name)
}

// Loads the metadata record of an earlier run, if there is one.
pub fn load_prior_metadata(dir: &Path, file_name: &str) -> Result<Option<GallerySummary>, SessionError> {
    let path = metadata_path(dir, file_name);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(store_error(&path, source)),
    };

    let summary = serde_json::from_str(&text).map_err(|e| {
        store_error(&path, std::io::Error::new(ErrorKind::InvalidData, e))
    })?;
    Ok(Some(summary))
}

// Writes the metadata record, creating the gallery directory as needed.
//
// The JSON goes to "<file>.part" first and is renamed into place, so an
// interrupted write never leaves a truncated record that every later run
// would fail to load.
pub fn persist_metadata(dir: &Path, file_name: &str, summary: &GallerySummary) -> Result<(), SessionError> {
    std::fs::create_dir_all(dir).map_err(|source| store_error(dir, source))?;

    let path = metadata_path(dir, file_name);
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| store_error(&path, std::io::Error::new(ErrorKind::InvalidData, e)))?;

    let partial = dir.join(format!("{}.part", file_name));
    std::fs::write(&partial, json).map_err(|source| store_error(&partial, source))?;
    std::fs::rename(&partial, &path).map_err(|source| store_error(&path, source))?;

    debug!(path = %path.display(), "wrote gallery metadata");
    Ok(())
}

// Reads a list file: one gallery URL per line.
// Blank lines and lines starting with '#' are skipped.
pub fn read_list_file(path: &Path) -> Result<Vec<String>, SessionError> {
    let text = std::fs::read_to_string(path).map_err(|source| store_error(path, source))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn store_error(path: &Path, source: std::io::Error) -> SessionError {
    SessionError::Store {
        path: path.to_path_buf(),
        source,
    }
}
