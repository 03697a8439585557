//! Retry policy for fetch attempts
//!
//! | Failure | Retried |
//! |---------|---------|
//! | Timeout | yes |
//! | Connection refused | yes |
//! | HTTP 5xx | yes |
//! | HTTP 429 | yes, honouring `Retry-After` |
//! | HTTP 4xx (other) | no |
//! | Malformed response | no |
//! | Cancelled | no |
//!
//! Backoff doubles per attempt from `base`, is scaled by a uniform jitter
//! factor in `[1 - j, 1 + j]` and capped at `max_delay`.

use crate::config::CrawlerConfig;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Classification of a failed fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    #[error("request timed out")]
    Timeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("server error (HTTP {0})")]
    ServerError(u16),

    #[error("too many requests (HTTP 429)")]
    TooManyRequests,

    #[error("client error (HTTP {0})")]
    ClientError(u16),

    #[error("malformed response")]
    MalformedResponse,

    #[error("cancelled")]
    Cancelled,
}

impl FetchErrorKind {
    /// True for failures that may succeed when retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionRefused | Self::ServerError(_) | Self::TooManyRequests
        )
    }
}

/// One failed attempt, as seen by the policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FetchErrorKind,
    /// Server supplied delay from a `Retry-After` header
    pub retry_after: Option<Duration>,
    pub message: String,
}

impl FetchFailure {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retry_after: None,
            message: message.into(),
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Abandon,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first
    pub max_attempts: u32,
    pub base: Duration,
    pub max_delay: Duration,
    /// Relative jitter, 0.0 disables it
    pub jitter: f64,
    /// Upper bound applied to `Retry-After`
    pub max_retry_after: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base: config.backoff_base(),
            max_delay: config.backoff_max_delay(),
            jitter: config.backoff_jitter,
            max_retry_after: config.max_retry_after(),
        }
    }

    /// Decides what to do after `attempts_made` attempts, the last of which
    /// failed with `failure`
    pub fn decide(&self, failure: &FetchFailure, attempts_made: u32) -> RetryDecision {
        if !failure.kind.is_transient() || attempts_made >= self.max_attempts {
            return RetryDecision::Abandon;
        }

        match (failure.kind, failure.retry_after) {
            (FetchErrorKind::TooManyRequests, Some(delay)) => {
                RetryDecision::RetryAfter(delay.min(self.max_retry_after))
            }
            _ => RetryDecision::RetryAfter(self.backoff(attempts_made)),
        }
    }

    /// Computed delay before the attempt following `attempts_made`
    pub fn backoff(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(30);
        let raw = self
            .base
            .saturating_mul(1 << exponent)
            .min(self.max_delay.saturating_mul(2));

        // negative or NaN jitter disables it
        let jitter = self.jitter.min(1.0);
        let jittered = if jitter > 0.0 {
            raw.mul_f64(1.0 + (fastrand::f64() * 2.0 - 1.0) * jitter)
        } else {
            raw
        };

        jittered.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

/// Parses a `Retry-After` header: delta-seconds or an HTTP-date
///
/// Dates in the past give a zero delay.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        date.with_timezone(&Utc)
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

/// Waits between attempts
///
/// Injected so tests can run retry sequences without real delays.
pub trait Sleeper: Send + Sync + fmt::Debug {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Returns immediately and remembers every requested delay
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        Box::pin(std::future::ready(()))
    }
}
