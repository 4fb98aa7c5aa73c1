// src/error.rs
// =============================================================================
// Error types shared by the downloader.
//
// Three families:
// - FetchError: one request or one item went wrong. Absorbed per item by the
//   scheduler, never fatal on its own.
// - SessionError: the whole gallery session has to stop.
// - ConfigError: the configuration is unusable, checked once at startup.
//
// The binary edge (main.rs) wraps these in anyhow like the rest of the CLI.
// =============================================================================

use std::path::PathBuf;

use thiserror::Error;

/// A single request or a single item failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, TLS, timeout, body read)
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    /// The server answered 2xx with nothing in it
    #[error("empty response from {url}")]
    EmptyBody { url: String },

    /// The page was fetched but the expected field was not there
    #[error("could not read {what} from {url}")]
    Parse { url: String, what: &'static str },

    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Network errors, 5xx statuses and empty bodies are transient; anything
    /// else (4xx, missing markup, disk errors) will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::EmptyBody { .. } => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Parse { .. } | FetchError::Io { .. } => false,
        }
    }
}

/// A failure that aborts one gallery session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to fetch gallery metadata: {0}")]
    Metadata(#[source] FetchError),

    #[error("failed to list items of page {page}: {source}")]
    PageListing {
        page: usize,
        #[source]
        source: FetchError,
    },

    /// More media files on disk than the gallery has items
    #[error("resume state corrupted: {local} local files but the gallery has {total} items")]
    CorruptedResume { local: usize, total: usize },

    #[error("unknown url format: {0}")]
    UnknownUrl(String),

    #[error("local storage error at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("page size must be greater than zero")]
    ZeroPageSize,

    #[error("parallelism must be greater than zero")]
    ZeroParallelism,

    #[error("invalid politeness delay range {min}..{max} seconds")]
    InvalidDelay { min: f64, max: f64 },

    #[error("retry attempts must be at least one")]
    ZeroAttempts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_retryable() {
        let err = FetchError::Status {
            url: "https://example.com".to_string(),
            status: 503,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        let err = FetchError::Status {
            url: "https://example.com".to_string(),
            status: 404,
        };
        assert!(!err.is_retryable());

        let err = FetchError::Parse {
            url: "https://example.com".to_string(),
            what: "title",
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_empty_body_is_retryable() {
        let err = FetchError::EmptyBody {
            url: "https://example.com".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_corrupted_resume_message() {
        let err = SessionError::CorruptedResume { local: 41, total: 40 };
        assert_eq!(
            err.to_string(),
            "resume state corrupted: 41 local files but the gallery has 40 items"
        );
    }
}
