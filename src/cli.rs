// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Usage:
//   gallery-downloader -u <url> [options]
//   gallery-downloader -l <file> [options]
//
// Everything that tunes a session (parallelism, page size, politeness delay,
// retries) is a flag with a default, and is turned into a SessionConfig here.
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Parser};

use crate::config::{
    DelayRange, SessionConfig, DEFAULT_MAX_PARALLEL, DEFAULT_PAGE_SIZE,
};
use crate::gallery::RetryPolicy;

// The whole CLI is one command with flags; exactly one of --url / --list
// selects the galleries to download.
#[derive(Parser, Debug)]
#[command(
    name = "gallery-downloader",
    version,
    about = "Download image galleries, resuming where the last run stopped",
    long_about = "gallery-downloader fetches every image of a paginated gallery into \
                  <output>/<title>/, named 1..N. Re-running the same gallery resumes \
                  from the files already on disk."
)]
#[command(group(ArgGroup::new("source").required(true).args(["url", "list"])))]
pub struct Cli {
    /// Gallery URL (e.g., https://e-hentai.org/g/1234567/0123456789/)
    #[arg(short, long)]
    pub url: Option<String>,

    /// File with one gallery URL per line
    #[arg(short, long, value_name = "FILE")]
    pub list: Option<PathBuf>,

    /// Output directory; each gallery gets a sub-directory named after its title
    #[arg(short, long, default_value = "images")]
    pub output: PathBuf,

    /// Only fetch and save the gallery metadata
    #[arg(short, long)]
    pub info: bool,

    /// Images downloaded at the same time
    #[arg(long, default_value_t = DEFAULT_MAX_PARALLEL)]
    pub parallel: usize,

    /// Images per index page on the remote site
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Shortest pause between two submissions, in seconds
    #[arg(long, default_value_t = 2.0)]
    pub delay_min: f64,

    /// Longest pause between two submissions, in seconds
    #[arg(long, default_value_t = 3.0)]
    pub delay_max: f64,

    /// Extra attempts for a failed request
    #[arg(long, default_value_t = 5)]
    pub retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            page_size: self.page_size,
            max_parallel: self.parallel,
            politeness: DelayRange::new(self.delay_min, self.delay_max),
            retry: RetryPolicy::with_retries(self.retries),
            request_timeout: Duration::from_secs(self.timeout),
            ..SessionConfig::default()
        }
    }

    // Default log filter when RUST_LOG is not set
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. What does ArgGroup do here?
//    - It ties --url and --list together: `required(true)` means one of them
//      must be given, and a group allows only one member by default
//    - clap prints the usage error itself, before main() sees anything
//
// 2. Why convert to SessionConfig instead of passing Cli around?
//    - The download code should not know about flags
//    - Tests can build a SessionConfig directly, with tiny delays
//
// 3. ArgAction::Count
//    - `-vvv` becomes verbose = 3; the number picks the log level
// -----------------------------------------------------------------------------
