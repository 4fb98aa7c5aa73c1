// src/gallery/http.rs
// =============================================================================
// The HTTP layer shared by the page reader and the media fetcher.
//
// Key functionality:
// - One reqwest Client, reused for every request (connection pooling)
// - Browser-like headers, since the gallery site rejects bare clients
// - A per-request timeout so a stuck transfer cannot stall a page forever
// - Bounded retries with linearly increasing backoff for transient failures
//   (network errors, 5xx statuses, empty bodies)
// =============================================================================

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::FetchError;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(1);

/// How often and how patiently a failed request is repeated.
///
/// After the n-th failed attempt the policy waits `n * backoff_step`
/// (1s, 2s, 3s, ... with the defaults) before trying again.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first one
    max_attempts: u32,
    backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_retries(DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_step: Duration) -> Self {
        Self {
            max_attempts,
            backoff_step,
        }
    }

    /// A policy allowing `retries` additional attempts after the first.
    pub fn with_retries(retries: u32) -> Self {
        Self::new(retries.saturating_add(1), DEFAULT_BACKOFF_STEP)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    // Runs `op` until it succeeds, fails permanently, or the attempts run out.
    // The last error is returned as-is.
    pub async fn run<T, F, Fut>(&self, url: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(url, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A retrying HTTP client.
///
/// Cheap to clone: the inner reqwest Client is reference counted.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );

        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, retry })
    }

    // Fetches a page as text, retrying transient failures
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.retry.run(url, || self.text_once(url)).await
    }

    // Fetches a binary payload, retrying transient failures.
    // Image hosts check the Referer, so the caller can pass one.
    pub async fn get_bytes(&self, url: &str, referer: Option<&str>) -> Result<Vec<u8>, FetchError> {
        self.retry.run(url, || self.bytes_once(url, referer)).await
    }

    async fn text_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self.send(url, None).await?;
        let text = response.text().await.map_err(|e| network(url, e))?;
        if text.trim().is_empty() {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            });
        }
        Ok(text)
    }

    async fn bytes_once(&self, url: &str, referer: Option<&str>) -> Result<Vec<u8>, FetchError> {
        let response = self.send(url, referer).await?;
        let bytes = response.bytes().await.map_err(|e| network(url, e))?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            });
        }
        Ok(bytes.to_vec())
    }

    async fn send(&self, url: &str, referer: Option<&str>) -> Result<reqwest::Response, FetchError> {
        let mut request = self.client.get(url);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        debug!(url, "GET");
        let response = request.send().await.map_err(|e| network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

fn network(url: &str, source: reqwest::Error) -> FetchError {
    FetchError::Network {
        url: url.to_string(),
        source,
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why does run() take a closure and not a future?
//    - A future can only be awaited once
//    - Calling the closure again builds a fresh request for every attempt
//
// 2. Which failures are retried?
//    - See FetchError::is_retryable(): network errors, 5xx and empty bodies
//    - A 404 or a page without the expected markup fails the same way every
//      time, so it is returned at once
//
// 3. Why is the timeout set on the Client?
//    - It applies to every request made through it, including the body read
//    - Without it one hung transfer would hold a scheduler slot forever
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_client(max_attempts: u32) -> HttpClient {
        HttpClient::new(
            Duration::from_secs(5),
            RetryPolicy::new(max_attempts, Duration::ZERO),
        )
        .unwrap()
    }

    #[test]
    fn test_backoff_grows_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 6);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(3), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let text = fast_client(3)
            .get_text(&format!("{}/page", server.uri()))
            .await
            .unwrap();
        assert_eq!(text, "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fast_client(5)
            .get_text(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.jpg"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = fast_client(3)
            .get_bytes(&format!("{}/img.jpg", server.uri()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_empty_body_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let bytes = fast_client(2)
            .get_bytes(&format!("{}/img.png", server.uri()), Some("https://e-hentai.org/"))
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }
}
