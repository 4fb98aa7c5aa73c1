// src/download/session.rs
// =============================================================================
// Drives one gallery from metadata to a verified directory of images.
//
// States:
//   FetchingMetadata -> Resuming -> Paging -> Verifying -> Done
//                                 \-> Done (nothing left)     any -> Failed
//
// 1. FetchingMetadata: read title, item count and tags from the root page.
// 2. Resuming: count images already on disk and plan where to pick up. The
//    first run writes the metadata record; later runs trust that record's
//    item count instead of the freshly fetched one.
// 3. Paging: one index page at a time, hand its remaining items to the
//    scheduler and wait for the whole page before moving on.
// 4. Verifying: check the directory for gaps and report them.
//
// Only metadata failures, unlistable pages, local storage errors and a
// corrupted resume state stop a session. Single items that fail are skipped
// by the scheduler and show up as gaps in the verification.
// =============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use super::resume::{self, page_count};
use super::scheduler::{FetchScheduler, ItemTask, PageReport};
use super::verify;
use crate::config::SessionConfig;
use crate::error::{FetchError, SessionError};
use crate::gallery::{media_file_name, page_url, GallerySummary, MediaFetcher, PageReader};
use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    FetchingMetadata,
    Resuming,
    Paging,
    Verifying,
    Done,
    Failed,
}

/// What one session achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub title: String,
    pub directory: PathBuf,
    /// Item count the session worked towards
    pub expected: usize,
    /// How many of 1..=expected are on disk at the end
    pub present: usize,
    /// Paging ran to the last page, or there was nothing left to fetch
    pub completed: bool,
    /// The directory holds every index 1..=expected
    pub verified: bool,
    /// Only the metadata was fetched; no images were downloaded
    pub metadata_only: bool,
}

pub struct DownloadSession {
    reader: Arc<dyn PageReader>,
    fetcher: Arc<dyn MediaFetcher>,
    scheduler: FetchScheduler,
    config: SessionConfig,
}

impl DownloadSession {
    // `config` is expected to have passed SessionConfig::validate()
    pub fn new(reader: Arc<dyn PageReader>, fetcher: Arc<dyn MediaFetcher>, config: SessionConfig) -> Self {
        let scheduler = FetchScheduler::new(config.max_parallel, config.politeness);
        Self {
            reader,
            fetcher,
            scheduler,
            config,
        }
    }

    /// Runs one gallery into `<output_dir>/<sanitized title>/`.
    #[instrument(skip(self, output_dir), fields(output = %output_dir.display()))]
    pub async fn run(
        &self,
        output_dir: &Path,
        gallery_url: &str,
        metadata_only: bool,
    ) -> Result<SessionOutcome, SessionError> {
        match self.run_states(output_dir, gallery_url, metadata_only).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                enter(SessionState::Failed);
                error!(error = %e, "session failed");
                Err(e)
            }
        }
    }

    async fn run_states(
        &self,
        output_dir: &Path,
        gallery_url: &str,
        metadata_only: bool,
    ) -> Result<SessionOutcome, SessionError> {
        enter(SessionState::FetchingMetadata);
        let fresh = self
            .reader
            .fetch_gallery_metadata(gallery_url)
            .await
            .map_err(SessionError::Metadata)?;
        info!(title = %fresh.title, total = fresh.total_item_count, "gallery metadata fetched");

        enter(SessionState::Resuming);
        // One directory per gallery, named after its title
        let directory = output_dir.join(store::sanitize_title(&fresh.title));
        let metadata_file = self.config.metadata_file_name.as_str();
        let prior = store::load_prior_metadata(&directory, metadata_file)?;
        let first_run = prior.is_none();
        let summary = self.settle_summary(prior, fresh);

        // Counts only finished images; .part files and the record are ignored
        let local = store::count_local_media(&directory, &self.config.media_extensions)?;
        let plan = resume::plan(summary.total_item_count, local, self.config.page_size)?;
        info!(
            directory = %directory.display(),
            local,
            total = summary.total_item_count,
            start_page = plan.start_page_index,
            skip = plan.skip_count_on_first_page,
            "resume plan"
        );

        if first_run {
            store::persist_metadata(&directory, metadata_file, &summary)?;
        }

        if plan.already_complete {
            info!("gallery already downloaded");
            return self.verified_outcome(summary, directory);
        }

        if metadata_only {
            info!("metadata saved, skipping images");
            return Ok(SessionOutcome {
                title: summary.title,
                directory,
                expected: summary.total_item_count,
                present: local,
                completed: false,
                verified: false,
                metadata_only: true,
            });
        }

        enter(SessionState::Paging);
        let page_size = self.config.page_size;
        let pages = page_count(summary.total_item_count, page_size);
        let mut totals = PageReport::default();
        // Strictly one page after another; run_page joins before returning
        for page in plan.start_page_index..pages {
            // Only the first page resumed can be partly on disk
            let skip = if page == plan.start_page_index {
                plan.skip_count_on_first_page
            } else {
                0
            };
            let report = self.fetch_page(gallery_url, &directory, page, skip).await?;
            totals.saved += report.saved;
            totals.failed += report.failed;
        }
        info!(saved = totals.saved, failed = totals.failed, "all pages processed");

        self.verified_outcome(summary, directory)
    }

    // Picks the summary the session works with.
    // An earlier run's record wins; a changed remote count is only reported.
    fn settle_summary(&self, prior: Option<GallerySummary>, fresh: GallerySummary) -> GallerySummary {
        match prior {
            Some(prior) => {
                if prior.total_item_count != fresh.total_item_count {
                    warn!(
                        recorded = prior.total_item_count,
                        remote = fresh.total_item_count,
                        "remote item count changed since the first run, keeping the recorded count"
                    );
                }
                info!("found an earlier download of this gallery");
                prior
            }
            None => fresh,
        }
    }

    #[instrument(skip(self, gallery_url, directory))]
    async fn fetch_page(
        &self,
        gallery_url: &str,
        directory: &Path,
        page: usize,
        skip: usize,
    ) -> Result<PageReport, SessionError> {
        let url = page_url(gallery_url, page);
        info!(url = %url, "listing page");

        let mut item_urls = self
            .reader
            .fetch_item_urls(&url)
            .await
            .map_err(|source| SessionError::PageListing { page, source })?;

        let page_size = self.config.page_size;
        if item_urls.len() > page_size {
            warn!(found = item_urls.len(), page_size, "page lists more items than a page holds, ignoring the rest");
            item_urls.truncate(page_size);
        }

        let tasks: Vec<ItemTask> = item_urls
            .into_iter()
            .enumerate()
            .skip(skip)
            .map(|(position, item_page_url)| ItemTask {
                sequence_index: page * page_size + position + 1, // 1-based, gallery-wide
                item_page_url,
            })
            .collect();

        // Each unit gets its own handles; the futures must be 'static to spawn
        let reader = Arc::clone(&self.reader);
        let fetcher = Arc::clone(&self.fetcher);
        let target = SaveTarget {
            directory: directory.to_path_buf(),
            extensions: self.config.media_extensions.clone().into(),
        };
        let report = self
            .scheduler
            .run_page(tasks, move |task| {
                save_item(Arc::clone(&reader), Arc::clone(&fetcher), target.clone(), task)
            })
            .await;

        info!(saved = report.saved, failed = report.failed, "page done");
        Ok(report)
    }

    fn verified_outcome(
        &self,
        summary: GallerySummary,
        directory: PathBuf,
    ) -> Result<SessionOutcome, SessionError> {
        enter(SessionState::Verifying);
        let report = verify::inspect(&directory, summary.total_item_count)?;
        if report.is_complete() {
            info!(count = report.present, "sequence verified");
        } else {
            warn!(
                present = report.present,
                expected = report.expected,
                missing = ?report.missing,
                "images downloaded but the sequence has gaps, re-run to retry"
            );
        }

        enter(SessionState::Done);
        Ok(SessionOutcome {
            title: summary.title,
            directory,
            expected: report.expected,
            present: report.present,
            completed: true,
            verified: report.is_complete(),
            metadata_only: false,
        })
    }
}

// Where a unit saves its image and which suffixes it may keep
#[derive(Debug, Clone)]
struct SaveTarget {
    directory: PathBuf,
    extensions: Arc<[String]>,
}

// One fetch-and-save unit: image page -> direct URL -> file named by index
async fn save_item(
    reader: Arc<dyn PageReader>,
    fetcher: Arc<dyn MediaFetcher>,
    target: SaveTarget,
    task: ItemTask,
) -> Result<PathBuf, FetchError> {
    let media_url = reader.resolve_media_url(&task.item_page_url).await?;
    let file_name = media_file_name(task.sequence_index, &media_url, &target.extensions);
    let path = target.directory.join(file_name);
    fetcher.persist_media(&media_url, &path).await?;
    Ok(path)
}

fn enter(state: SessionState) {
    info!(?state, "session state");
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why Arc<dyn PageReader> and Arc<dyn MediaFetcher>?
//    - Every spawned unit needs its own handle to both
//    - Arc::clone only bumps a reference count; nothing is copied
//
// 2. Why is save_item a free function and not a closure body?
//    - tokio::spawn needs a 'static future, so it cannot borrow `self`
//    - Passing owned Arcs and an owned SaveTarget makes that explicit
//
// 3. What stops a session?
//    - Every `?` in run_states: metadata, page listing, disk errors and a
//      corrupted resume state
//    - A single failed image does not; the scheduler counts it and moves on
// -----------------------------------------------------------------------------
