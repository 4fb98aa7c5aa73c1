// src/config.rs
// =============================================================================
// Session configuration.
//
// Everything that used to be a process-wide constant (page size, parallelism,
// the politeness delay) lives in one value that is built once from the
// command line, validated once, and then handed to every session.
// Tests build their own SessionConfig with tiny delays and small budgets.
// =============================================================================

use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;
use crate::gallery::RetryPolicy;

/// Items per remote page, as the gallery site paginates them.
pub const DEFAULT_PAGE_SIZE: usize = 40;

/// Simultaneous fetch-and-save units.
pub const DEFAULT_MAX_PARALLEL: usize = 5;

/// Name of the metadata record written next to the images.
pub const DEFAULT_METADATA_FILE: &str = "galleryInfo.json";

pub const DEFAULT_MEDIA_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

// A closed range of seconds the scheduler pauses for after each submission
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    /// No pause at all.
    #[cfg(test)]
    pub fn none() -> Self {
        Self::new(0.0, 0.0)
    }

    // Draws a uniformly random pause from the range.
    // A degenerate range returns its single value without touching the RNG.
    pub fn sample(&self) -> Duration {
        if self.max_secs <= self.min_secs {
            return Duration::from_secs_f64(self.min_secs.max(0.0));
        }
        let secs = rand::thread_rng().gen_range(self.min_secs..=self.max_secs);
        Duration::from_secs_f64(secs)
    }

    fn is_valid(&self) -> bool {
        self.min_secs.is_finite()
            && self.max_secs.is_finite()
            && self.min_secs >= 0.0
            && self.min_secs <= self.max_secs
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self::new(2.0, 3.0)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Items per remote page
    pub page_size: usize,
    /// Upper bound on in-flight fetch-and-save units
    pub max_parallel: usize,
    /// Pause after each admitted task
    pub politeness: DelayRange,
    /// Extensions (without the dot, lower-case) counted as downloaded media
    pub media_extensions: Vec<String>,
    /// File name of the metadata record inside the gallery directory
    pub metadata_file_name: String,
    /// Retry behaviour of the HTTP layer
    pub retry: RetryPolicy,
    /// Per-request timeout; a stuck transfer can never stall a page forever
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_parallel: DEFAULT_MAX_PARALLEL,
            politeness: DelayRange::default(),
            media_extensions: DEFAULT_MEDIA_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            metadata_file_name: DEFAULT_METADATA_FILE.to_string(),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    // Checks the invariants the rest of the program relies on.
    // Called once at startup, before any session runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.max_parallel == 0 {
            return Err(ConfigError::ZeroParallelism);
        }
        if !self.politeness.is_valid() {
            return Err(ConfigError::InvalidDelay {
                min: self.politeness.min_secs,
                max: self.politeness.max_secs,
            });
        }
        if self.retry.max_attempts() == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }
}
