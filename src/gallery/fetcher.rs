// src/gallery/fetcher.rs
// =============================================================================
// Downloads one image and saves it to disk.
//
// The bytes are written to "<name>.part" first and renamed into place, so a
// file with the final name only ever exists when it is complete. An
// interrupted run therefore never leaves a half-written image that the next
// run would count as downloaded.
// =============================================================================

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::http::HttpClient;
use crate::error::FetchError;

const FALLBACK_SUFFIX: &str = ".jpg";

/// Persists one media URL at one destination path.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Returns the number of bytes written
    async fn persist_media(&self, media_url: &str, destination: &Path) -> Result<u64, FetchError>;
}

pub struct HttpMediaFetcher {
    client: HttpClient,
    referer: Option<String>,
}

impl HttpMediaFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            referer: None,
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn persist_media(&self, media_url: &str, destination: &Path) -> Result<u64, FetchError> {
        let bytes = self
            .client
            .get_bytes(media_url, self.referer.as_deref())
            .await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }

        let partial = partial_path(destination);
        tokio::fs::write(&partial, &bytes)
            .await
            .map_err(|source| io_error(&partial, source))?;
        tokio::fs::rename(&partial, destination)
            .await
            .map_err(|source| io_error(destination, source))?;

        debug!(path = %destination.display(), bytes = bytes.len(), "saved media");
        Ok(bytes.len() as u64)
    }
}

// Name of the file for the item at `sequence_index` (1-based).
//
// The suffix comes from the direct image URL so a .png stays a .png, but only
// when it is one of `extensions`: the resume count only sees those, and a
// file it cannot see would be downloaded again on every run.
//
// Examples (with the default extensions):
//   (7, "https://host/h/abc/keystamp/7.png")  -> "7.png"
//   (12, "https://host/fullimg?x=1")          -> "12.jpg"
//   (3, "https://host/h/abc/3.avif")          -> "3.jpg"
pub fn media_file_name(sequence_index: usize, media_url: &str, extensions: &[String]) -> String {
    format!("{}{}", sequence_index, media_suffix(media_url, extensions))
}

fn media_suffix(media_url: &str, extensions: &[String]) -> String {
    // Last path segment, ignoring query and fragment
    let last_segment = Url::parse(media_url)
        .ok()
        .and_then(|url| url.path_segments().and_then(|mut s| s.next_back().map(str::to_string)));

    last_segment
        .as_deref()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| FALLBACK_SUFFIX.to_string())
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name: OsString = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn io_error(path: &Path, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.to_path_buf(),
        source,
    }
}
