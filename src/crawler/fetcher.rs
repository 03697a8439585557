//! HTTP fetcher
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured user agent
//! - Waiting on the shared rate limiter before each attempt
//! - Classifying failures and retrying them per the [`RetryPolicy`]
//!
//! `fetch` never returns an error: every failure ends as
//! [`FetchResult::Failed`] carrying the last error kind and attempt count.

use crate::config::UserAgentConfig;
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::retry::{
    parse_retry_after, FetchErrorKind, FetchFailure, RetryDecision, RetryPolicy, Sleeper,
};
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

const MAX_REDIRECTS: usize = 10;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched the page
    Success {
        /// Final URL after redirects
        final_url: Url,
        /// HTTP status code
        status: u16,
        headers: HeaderMap,
        /// Decoded page body
        body: String,
        /// Attempts used, including the successful one
        attempts: u32,
    },

    /// The fetch was abandoned
    Failed {
        kind: FetchErrorKind,
        attempts: u32,
        message: String,
    },
}

impl FetchResult {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Timeout applied to each attempt
///
/// # Example
///
/// ```no_run
/// use record_trawler::config::UserAgentConfig;
/// use record_trawler::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "RecordTrawler".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(15)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

struct Page {
    final_url: Url,
    status: u16,
    headers: HeaderMap,
    body: String,
}

/// Fetches pages under the shared rate limiter and retry policy
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(
        client: Client,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            limiter,
            policy,
            sleeper,
            cancel,
        }
    }

    /// Fetches a URL, retrying transient failures
    ///
    /// Attempts run one after another. Cancellation interrupts waiting on the
    /// limiter or a backoff delay, but lets a request already on the wire
    /// finish.
    pub async fn fetch(&self, url: &Url) -> FetchResult {
        let mut attempts = 0;

        loop {
            let Some(permit) = self.limiter.acquire_or_cancel(&self.cancel).await else {
                return cancelled(attempts, "cancelled before request was issued");
            };

            attempts += 1;
            let outcome = self.attempt(url).await;
            self.limiter.release(permit);

            let failure = match outcome {
                Ok(page) => {
                    debug!("Fetched {} ({}) in {} attempt(s)", page.final_url, page.status, attempts);
                    return FetchResult::Success {
                        final_url: page.final_url,
                        status: page.status,
                        headers: page.headers,
                        body: page.body,
                        attempts,
                    };
                }
                Err(failure) => failure,
            };

            match self.policy.decide(&failure, attempts) {
                RetryDecision::Abandon => {
                    warn!("Giving up on {} after {} attempt(s): {}", url, attempts, failure);
                    return FetchResult::Failed {
                        kind: failure.kind,
                        attempts,
                        message: failure.message,
                    };
                }
                RetryDecision::RetryAfter(delay) => {
                    debug!(
                        "Attempt {} for {} failed ({}), retrying in {:?}",
                        attempts, url, failure, delay
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return cancelled(attempts, "cancelled during backoff");
                        }
                        _ = self.sleeper.sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn attempt(&self, url: &Url) -> Result<Page, FetchFailure> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_error(&e))?;

        let status = response.status();
        classify_status(status, response.headers())?;

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !is_textual(content_type) {
                return Err(FetchFailure::new(
                    FetchErrorKind::MalformedResponse,
                    format!("unexpected content type '{content_type}'"),
                ));
            }
        }

        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|e| {
            FetchFailure::new(
                FetchErrorKind::MalformedResponse,
                format!("failed to read body: {e}"),
            )
        })?;

        Ok(Page {
            final_url,
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

fn cancelled(attempts: u32, message: &str) -> FetchResult {
    FetchResult::Failed {
        kind: FetchErrorKind::Cancelled,
        attempts,
        message: message.to_string(),
    }
}

/// Maps a transport error to an error kind
fn classify_error(error: &reqwest::Error) -> FetchFailure {
    let kind = if error.is_timeout() {
        FetchErrorKind::Timeout
    } else if error.is_connect() || error.is_request() {
        FetchErrorKind::ConnectionRefused
    } else {
        // redirect loops, decode and body errors
        FetchErrorKind::MalformedResponse
    };
    FetchFailure::new(kind, error.to_string())
}

/// Maps a non-success status to an error kind
fn classify_status(status: StatusCode, headers: &HeaderMap) -> Result<(), FetchFailure> {
    let code = status.as_u16();

    if status.is_success() {
        Ok(())
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, chrono::Utc::now()));
        Err(
            FetchFailure::new(FetchErrorKind::TooManyRequests, "HTTP 429")
                .with_retry_after(retry_after),
        )
    } else if status.is_server_error() {
        Err(FetchFailure::new(
            FetchErrorKind::ServerError(code),
            format!("HTTP {code}"),
        ))
    } else if status.is_client_error() {
        Err(FetchFailure::new(
            FetchErrorKind::ClientError(code),
            format!("HTTP {code}"),
        ))
    } else {
        Err(FetchFailure::new(
            FetchErrorKind::MalformedResponse,
            format!("unexpected status HTTP {code}"),
        ))
    }
}

/// True for `text/*` and any HTML or XML media type
fn is_textual(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    lowered.starts_with("text/") || lowered.contains("html") || lowered.contains("xml")
}
