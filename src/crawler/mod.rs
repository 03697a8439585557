//! Crawler module for fetching and processing targets
//!
//! This module contains the core crawling logic, including:
//! - Rate limiting shared by every request in a run
//! - Retry classification and backoff
//! - HTTP fetching
//! - The target frontier and the orchestration loop

mod fetcher;
mod frontier;
mod orchestrator;
mod progress;
mod rate_limiter;
mod retry;

pub use fetcher::{build_http_client, FetchResult, Fetcher};
pub use frontier::{Admission, Frontier, Target, TargetId};
pub use orchestrator::{CrawlReport, FailedTarget, Orchestrator};
pub use progress::{progress_channel, ProgressEvent, ProgressReceiver, ProgressSender};
pub use rate_limiter::{LimiterPermit, RateLimiter};
pub use retry::{
    parse_retry_after, FetchErrorKind, FetchFailure, RecordingSleeper, RetryDecision,
    RetryPolicy, Sleeper, TokioSleeper,
};
