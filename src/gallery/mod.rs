// src/gallery/mod.rs
// =============================================================================
// Everything that talks to the remote gallery site.
//
// Submodules:
// - http: retrying HTTP client with browser headers
// - reader: reads gallery metadata, item lists and image sources from HTML
// - fetcher: downloads one image and saves it under its sequence number
//
// The download pipeline only sees the PageReader and MediaFetcher traits,
// so tests can drive a whole session without a network.
// =============================================================================

mod fetcher;
mod http;
mod reader;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use fetcher::{media_file_name, HttpMediaFetcher, MediaFetcher};
pub use http::{HttpClient, RetryPolicy};
pub use reader::{page_url, HtmlPageReader, PageReader};

/// What the gallery root page says about the gallery.
///
/// Written once to the metadata record on the first run and trusted by every
/// later run of the same gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GallerySummary {
    #[serde(rename = "gallery_url")]
    pub source_url: String,
    #[serde(rename = "gallery_title")]
    pub title: String,
    #[serde(rename = "total_image")]
    pub total_item_count: usize,
    /// Tag category (e.g. "artist", "female") to its labels, in page order
    #[serde(rename = "tag_list", default)]
    pub tags: BTreeMap<String, Vec<String>>,
}

// Whether `url` looks like a gallery root this reader understands.
//
// Example:
//   "https://e-hentai.org/g/2513829/4a0c5b1e6d/" -> true
pub fn is_gallery_url(url: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^https://e-hentai\.org/g/[a-z0-9]*/[a-z0-9]{10}/$")
                .expect("constant regex must compile")
        })
        .is_match(url)
}
