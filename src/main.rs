// src/main.rs
// =============================================================================
// Entry point of the gallery downloader.
//
// What happens here:
// 1. Parse command-line arguments and set up logging
// 2. Build and validate the session configuration
// 3. Collect the gallery URLs (one --url, or every line of --list)
// 4. Run one download session per gallery, one after another. A failed
//    gallery is recorded and the batch moves on to the next one.
// 5. Print a summary and exit (0 = all galleries ok, 1 = some gallery
//    failed, 2 = could not start at all)
// =============================================================================

mod cli;
mod config;
mod download;
mod error;
mod gallery;
mod store;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Stream};
use tracing::{debug, info};

use cli::Cli;
use download::{DownloadSession, SessionOutcome};
use error::SessionError;
use gallery::{HtmlPageReader, HttpClient, HttpMediaFetcher};

// Image hosts only serve images with a Referer from the gallery site
const IMAGE_REFERER: &str = "https://e-hentai.org/";

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".if_supports_color(Stream::Stderr, |t| t.red()), e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Returns:
//   Ok(0) = every gallery finished without a fatal error
//   Ok(1) = at least one gallery failed
//   Err   = nothing could be started (bad config, unreadable list file)
async fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(&cli);
    debug!(?cli, "arguments parsed");

    let config = cli.session_config();
    config.validate().context("invalid configuration")?;

    let urls = match (&cli.url, &cli.list) {
        (Some(url), _) => vec![url.clone()],
        (None, Some(list)) => store::read_list_file(list)
            .with_context(|| format!("could not read list file {}", list.display()))?,
        (None, None) => Vec::new(),
    };
    if urls.is_empty() {
        println!("No gallery URLs to download");
        return Ok(0);
    }

    let client = HttpClient::new(config.request_timeout, config.retry.clone())
        .context("could not build the HTTP client")?;
    let reader = Arc::new(HtmlPageReader::new(client.clone()));
    let fetcher = Arc::new(HttpMediaFetcher::new(client).with_referer(IMAGE_REFERER));
    let session = DownloadSession::new(reader, fetcher, config);

    let started = Instant::now();
    let failed = download_all(&session, &cli.output, &urls, cli.info).await;

    println!(
        "{} {} gallery(s) in {}",
        "Finished".if_supports_color(Stream::Stdout, |t| t.green()),
        urls.len(),
        format_elapsed(started.elapsed())
    );
    info!(total = urls.len(), failed, "batch finished");

    if failed > 0 {
        eprintln!(
            "{}",
            format!("{} download(s) failed", failed).if_supports_color(Stream::Stderr, |t| t.red())
        );
    }
    Ok(exit_code(failed))
}

// Runs every gallery in order and returns how many of them failed.
// A failed gallery is reported and the batch moves on to the next URL.
async fn download_all(
    session: &DownloadSession,
    output: &Path,
    urls: &[String],
    metadata_only: bool,
) -> usize {
    let mut failed = 0;
    for url in urls {
        println!("{} {}", "Downloading gallery:".if_supports_color(Stream::Stdout, |t| t.green()), url);
        match download_gallery(session, output, url, metadata_only).await {
            Ok(outcome) => print_outcome(url, &outcome),
            Err(e) => {
                failed += 1; // counted, never fatal for the batch
                eprintln!(
                    "{} {}: {}\n",
                    "Download failed:".if_supports_color(Stream::Stderr, |t| t.red()),
                    url,
                    e
                );
            }
        }
    }
    failed
}

// 0 when every gallery went through, 1 as soon as one failed
fn exit_code(failed: usize) -> i32 {
    if failed > 0 {
        1
    } else {
        0
    }
}

// Priority: RUST_LOG env var > --quiet > --verbose > default (info)
fn init_logging(cli: &Cli) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn download_gallery(
    session: &DownloadSession,
    output: &Path,
    url: &str,
    metadata_only: bool,
) -> Result<SessionOutcome, SessionError> {
    if !gallery::is_gallery_url(url) {
        return Err(SessionError::UnknownUrl(url.to_string()));
    }
    session.run(output, url, metadata_only).await
}

fn print_outcome(url: &str, outcome: &SessionOutcome) {
    println!("   Title: {}", outcome.title);
    println!("   Directory: {}", outcome.directory.display());
    if outcome.metadata_only {
        println!("   Metadata saved ({} images in gallery)\n", outcome.expected);
        return;
    }

    println!("   Verified: {}/{}", outcome.present, outcome.expected);
    if outcome.verified {
        println!(
            "{} {}\n",
            "Gallery complete:".if_supports_color(Stream::Stdout, |t| t.green()),
            url
        );
    } else {
        println!(
            "{} {} (file names are not contiguous, re-run to fetch the missing images)\n",
            "Gallery incomplete:".if_supports_color(Stream::Stdout, |t| t.yellow()),
            url
        );
    }
}

// Formats a duration as "1h 2m 3s", dropping leading zero units
fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
