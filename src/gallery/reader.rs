// src/gallery/reader.rs
// =============================================================================
// Reads the gallery site's HTML.
//
// Three kinds of page matter:
// - the gallery root: title, image count and tag table
// - an index page (root + ?p=N): links to the individual image pages
// - an image page: the <img id="img"> holding the direct image URL
//
// Parsing is done with `scraper` and CSS selectors. The parse functions are
// plain synchronous functions over &str so they can be tested with fixtures;
// HtmlPageReader only adds the HTTP fetch in front of them.
// =============================================================================

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::http::HttpClient;
use super::GallerySummary;
use crate::error::FetchError;

/// Source of gallery structure. Implemented over HTTP+HTML in production and
/// by in-memory fakes in tests.
#[async_trait]
pub trait PageReader: Send + Sync {
    /// Reads title, item count and tags from the gallery root page
    async fn fetch_gallery_metadata(&self, gallery_url: &str) -> Result<GallerySummary, FetchError>;

    /// Lists the image-page URLs of one index page, in gallery order
    async fn fetch_item_urls(&self, page_url: &str) -> Result<Vec<String>, FetchError>;

    /// Finds the direct image URL on one image page
    async fn resolve_media_url(&self, item_page_url: &str) -> Result<String, FetchError>;
}

pub struct HtmlPageReader {
    client: HttpClient,
}

impl HtmlPageReader {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageReader for HtmlPageReader {
    async fn fetch_gallery_metadata(&self, gallery_url: &str) -> Result<GallerySummary, FetchError> {
        let html = self.client.get_text(gallery_url).await?;
        parse_gallery_metadata(&html, gallery_url)
    }

    async fn fetch_item_urls(&self, page_url: &str) -> Result<Vec<String>, FetchError> {
        let html = self.client.get_text(page_url).await?;
        Ok(parse_item_urls(&html, page_url))
    }

    async fn resolve_media_url(&self, item_page_url: &str) -> Result<String, FetchError> {
        let html = self.client.get_text(item_page_url).await?;
        parse_media_url(&html, item_page_url)
    }
}

// Builds the URL of index page `page` (0-based).
//
// Page 0 is the gallery root itself; later pages carry a `p` query parameter.
//
// Example:
//   page_url("https://e-hentai.org/g/1/abc/", 2) -> "https://e-hentai.org/g/1/abc/?p=2"
pub fn page_url(gallery_url: &str, page: usize) -> String {
    if page == 0 {
        return gallery_url.to_string();
    }

    let mut url = match Url::parse(gallery_url) {
        Ok(url) => url,
        Err(_) => return format!("{}?p={}", gallery_url, page),
    };

    // Keep any other query parameters, replace an existing `p`
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "p")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("p", &page.to_string());

    url.to_string()
}

fn selector(css: &'static str) -> Selector {
    // Only ever called with the constant selectors below
    Selector::parse(css).expect("constant CSS selector must parse")
}

fn page_count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+) pages?\b").expect("constant regex must compile"))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

pub(crate) fn parse_gallery_metadata(html: &str, gallery_url: &str) -> Result<GallerySummary, FetchError> {
    let document = Html::parse_document(html);

    let title = document
        .select(&selector("h1#gn"))
        .next()
        .map(element_text)
        .filter(|title| !title.is_empty())
        .ok_or_else(|| FetchError::Parse {
            url: gallery_url.to_string(),
            what: "gallery title",
        })?;

    // The details table has a "Length: N pages" row
    let total_item_count = document
        .select(&selector("#gdd td.gdt2"))
        .map(element_text)
        .find_map(|text| {
            page_count_pattern()
                .captures(&text)
                .and_then(|caps| caps[1].parse::<usize>().ok())
        })
        .ok_or_else(|| FetchError::Parse {
            url: gallery_url.to_string(),
            what: "page count",
        })?;

    let mut tags: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let category_selector = selector("td.tc");
    let label_selector = selector("td div");
    for row in document.select(&selector("div#taglist tr")) {
        let category = match row.select(&category_selector).next() {
            Some(cell) => element_text(cell).replace(':', ""), // "artist:" -> "artist"
            None => continue,
        };
        if category.is_empty() {
            continue;
        }
        let labels = row
            .select(&label_selector)
            .map(element_text)
            .filter(|label| !label.is_empty());
        tags.entry(category).or_default().extend(labels);
    }

    Ok(GallerySummary {
        source_url: gallery_url.to_string(),
        title,
        total_item_count,
        tags,
    })
}

// Collects the image-page links of an index page.
//
// Older markup wraps each thumbnail in div.gdtm, newer markup puts the
// anchors straight into div#gdt; `div#gdt a[href]` covers both.
pub(crate) fn parse_item_urls(html: &str, page_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    // A thumbnail can be linked twice (image and caption); keep the first
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for anchor in document.select(&selector("div#gdt a[href]")) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(absolute) = resolve(base.as_ref(), href) else {
            continue;
        };
        if seen.insert(absolute.clone()) {
            urls.push(absolute);
        }
    }
    urls
}

pub(crate) fn parse_media_url(html: &str, item_page_url: &str) -> Result<String, FetchError> {
    let document = Html::parse_document(html);
    let base = Url::parse(item_page_url).ok();

    document
        .select(&selector("img#img[src]"))
        .next()
        .and_then(|img| img.value().attr("src"))
        .and_then(|src| resolve(base.as_ref(), src))
        .ok_or_else(|| FetchError::Parse {
            url: item_page_url.to_string(),
            what: "image source",
        })
}

fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    match Url::parse(href) {
        Ok(url) => Some(url.to_string()),
        Err(_) => base.and_then(|base| base.join(href).ok()).map(|url| url.to_string()),
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why is PageReader a trait?
//    - The session only needs "give me metadata / links / an image URL"
//    - Session tests swap in an in-memory reader and never touch the network
//
// 2. Why #[async_trait]?
//    - The session stores readers as Arc<dyn PageReader>
//    - The macro boxes each async fn's future so the trait stays object safe
//
// 3. Why are the parse_* functions synchronous?
//    - scraper's Html is not Send, so it must not live across an .await
//    - Fetch first, then parse in one go; the document is dropped right after
// -----------------------------------------------------------------------------
