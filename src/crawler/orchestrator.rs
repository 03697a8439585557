//! Crawl orchestration
//!
//! The orchestrator owns the frontier and a bounded pool of target pipelines.
//! Each pipeline runs fetch, parse, validate and aggregate for one target and
//! reports back an outcome; discovered links are admitted by the loop, which
//! is the only writer of the frontier.

use crate::config::{validate_crawler_config, Config, CrawlerConfig, SeedEntry};
use crate::crawler::fetcher::{build_http_client, FetchResult, Fetcher};
use crate::crawler::frontier::{Admission, Frontier, Target, TargetId};
use crate::crawler::progress::ProgressSender;
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::retry::{FetchErrorKind, RetryPolicy, Sleeper, TokioSleeper};
use crate::dataset::{AddOutcome, Aggregator, Dataset};
use crate::extract::{parse, CompiledRuleSet, FollowLink, Provenance, RuleCatalog};
use crate::output::RunSummary;
use crate::state::TargetState;
use crate::validate::{RejectedRecord, ValidationOutcome, Validator};
use crate::url::parse_target_url;
use crate::{Result, TrawlError};
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// A target whose fetch was abandoned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTarget {
    pub target: TargetId,
    pub url: Url,
    pub kind: FetchErrorKind,
    pub attempts: u32,
    pub message: String,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub summary: RunSummary,
    /// Finalized, deduplicated records in arrival order
    pub dataset: Dataset,
    pub rejected: Vec<RejectedRecord>,
    pub failures: Vec<FailedTarget>,
}

/// What one pipeline reports back to the loop
#[derive(Debug)]
struct TargetOutcome {
    target: Target,
    state: TargetState,
    inserted: usize,
    duplicates: usize,
    warnings: usize,
    rejected: Vec<RejectedRecord>,
    failure: Option<FailedTarget>,
    links: Vec<FollowLink>,
}

impl TargetOutcome {
    fn new(target: Target, state: TargetState) -> Self {
        Self {
            target,
            state,
            inserted: 0,
            duplicates: 0,
            warnings: 0,
            rejected: Vec::new(),
            failure: None,
            links: Vec::new(),
        }
    }

    fn failed(target: Target, kind: FetchErrorKind, attempts: u32, message: String) -> Self {
        let failure = FailedTarget {
            target: target.id,
            url: target.url.clone(),
            kind,
            attempts,
            message,
        };
        Self {
            failure: Some(failure),
            ..Self::new(target, TargetState::Failed)
        }
    }
}

/// Shared, read-only state of all pipelines in a run
struct Pipeline {
    fetcher: Fetcher,
    aggregator: Arc<Aggregator>,
    progress: ProgressSender,
}

impl Pipeline {
    async fn run(self: Arc<Self>, target: Target, rule_set: Arc<CompiledRuleSet>) -> TargetOutcome {
        let mut state = TargetState::Queued;
        self.advance(&target, &mut state, TargetState::Fetching);

        let (final_url, body) = match self.fetcher.fetch(&target.url).await {
            FetchResult::Success {
                final_url, body, ..
            } => (final_url, body),
            FetchResult::Failed {
                kind,
                attempts,
                message,
            } => {
                self.advance(&target, &mut state, TargetState::Failed);
                return TargetOutcome::failed(target, kind, attempts, message);
            }
        };

        self.advance(&target, &mut state, TargetState::Parsing);
        let provenance = Provenance {
            target: target.id,
            url: final_url,
        };
        let page = parse(&body, &rule_set, &provenance);
        drop(body);

        // pages of record rule sets that yield nothing are rejected outright
        if page.records.is_empty() && !rule_set.schema().is_empty() {
            debug!("{} {} produced no records", target.id, target.url);
            self.advance(&target, &mut state, TargetState::Rejected);
            return TargetOutcome {
                links: page.links,
                ..TargetOutcome::new(target, TargetState::Rejected)
            };
        }

        self.advance(&target, &mut state, TargetState::Validating);
        let validator = Validator::new(Arc::clone(rule_set.schema()));
        let mut outcome = TargetOutcome::new(target, TargetState::Validating);
        outcome.links = page.links;

        for raw in &page.records {
            match validator.validate(raw) {
                ValidationOutcome::Accepted(record) => {
                    outcome.warnings += record.warnings.len();
                    match self.aggregator.add(record) {
                        AddOutcome::Inserted => outcome.inserted += 1,
                        AddOutcome::Duplicate => outcome.duplicates += 1,
                        AddOutcome::Frozen => {
                            warn!("Dataset already finalized; dropping record from {}", outcome.target.url)
                        }
                    }
                }
                ValidationOutcome::Rejected(rejected) => {
                    debug!(
                        "Rejected record from {}: {} violation(s)",
                        outcome.target.url,
                        rejected.violations.len()
                    );
                    outcome.rejected.push(rejected);
                }
            }
        }

        let accepted = outcome.inserted + outcome.duplicates;
        let terminal = if accepted > 0 || rule_set.schema().is_empty() {
            TargetState::Aggregated
        } else {
            TargetState::Rejected
        };
        self.advance(&outcome.target, &mut state, terminal);
        outcome.state = state;
        outcome
    }

    /// Moves `target` to `next` and reports it
    fn advance(&self, target: &Target, state: &mut TargetState, next: TargetState) {
        debug_assert!(
            state.can_transition_to(next),
            "{} cannot move from {} to {}",
            target.id,
            state,
            next
        );
        *state = next;
        self.progress.emit(target, next);
    }
}

/// Drives a crawl from seeds to a finalized dataset
///
/// # Example
///
/// ```no_run
/// use record_trawler::config::load_config;
/// use record_trawler::Orchestrator;
/// use std::path::Path;
///
/// # async fn run() -> record_trawler::Result<()> {
/// let config = load_config(Path::new("trawl.toml"))?;
/// let orchestrator = Orchestrator::new(&config)?;
/// let report = orchestrator.run(&config.seeds).await?;
/// println!("{} records", report.dataset.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Orchestrator {
    config: CrawlerConfig,
    catalog: Arc<RuleCatalog>,
    client: Client,
    aggregator: Arc<Aggregator>,
    sleeper: Arc<dyn Sleeper>,
    progress: ProgressSender,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Checks the crawler settings, compiles the rule sets and builds the
    /// HTTP client
    pub fn new(config: &Config) -> Result<Self> {
        validate_crawler_config(&config.crawler)?;
        let catalog = RuleCatalog::compile(&config.rule_sets)?;
        let client = build_http_client(&config.user_agent, config.crawler.request_timeout())?;

        Ok(Self {
            config: config.crawler.clone(),
            catalog: Arc::new(catalog),
            client,
            aggregator: Arc::new(Aggregator::new(config.dataset.dedupe_key_fields.clone())),
            sleeper: Arc::new(TokioSleeper),
            progress: ProgressSender::disabled(),
            cancel: CancellationToken::new(),
        })
    }

    /// Uses an externally owned aggregator instead of a fresh one
    pub fn with_aggregator(mut self, aggregator: Arc<Aggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_progress(mut self, progress: impl Into<ProgressSender>) -> Self {
        self.progress = progress.into();
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Token that stops the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    /// Crawls from the given seeds until the frontier is exhausted or the run
    /// is cancelled
    ///
    /// Per-target failures are part of the report. Only an invalid seed, an
    /// unknown rule set or a panicked pipeline fail the run itself.
    pub async fn run(&self, seeds: &[SeedEntry]) -> Result<CrawlReport> {
        let started = Instant::now();
        let mut run = RunState::new(&self.config);

        for seed in seeds {
            let url = parse_target_url(&seed.url)?;
            let rule_set = self.catalog.resolve(seed.rule_set.as_deref())?;
            run.admit(url, rule_set.name(), 0, None, &self.progress);
        }
        run.summary.seeds = seeds.len();
        info!(
            "Starting crawl: {} seed(s), concurrency {}",
            seeds.len(),
            self.config.concurrency
        );

        let limiter = Arc::new(RateLimiter::new(
            self.config.requests_per_second,
            self.config.burst,
            self.config.concurrency,
        ));
        let pipeline = Arc::new(Pipeline {
            fetcher: Fetcher::new(
                self.client.clone(),
                Arc::clone(&limiter),
                RetryPolicy::from_config(&self.config),
                Arc::clone(&self.sleeper),
                self.cancel.clone(),
            ),
            aggregator: Arc::clone(&self.aggregator),
            progress: self.progress.clone(),
        });

        let mut workers: JoinSet<TargetOutcome> = JoinSet::new();

        loop {
            if !self.cancel.is_cancelled() {
                while workers.len() < self.config.concurrency {
                    let Some(target) = run.frontier.pop() else {
                        break;
                    };
                    let rule_set = Arc::clone(self.catalog.get(&target.rule_set)?);
                    run.in_flight.insert(target.id, target.clone());
                    workers.spawn(Arc::clone(&pipeline).run(target, rule_set));
                }
            }

            if workers.is_empty() {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                joined = workers.join_next() => {
                    if let Some(joined) = joined {
                        run.finish(joined, !self.cancel.is_cancelled(), &self.progress)?;
                    }
                }
            }
        }

        if self.cancel.is_cancelled() {
            run.summary.cancelled = true;
            self.drain(&mut workers, &mut run).await?;
        }

        limiter.close();

        for target in std::mem::take(&mut run.in_flight).into_values() {
            self.progress.emit(&target, TargetState::Failed);
            run.record(TargetOutcome::failed(
                target,
                FetchErrorKind::Cancelled,
                0,
                "aborted at shutdown deadline".to_string(),
            ));
        }
        run.summary.unstarted = run.frontier.drain().len();
        run.summary.targets_admitted = run.frontier.admitted();
        run.summary.elapsed = started.elapsed();

        let dataset = self.aggregator.finalize();
        run.summary.dataset_records = dataset.len();
        info!(
            "Crawl finished: {} record(s), {} failed target(s), {} unstarted",
            dataset.len(),
            run.failures.len(),
            run.summary.unstarted
        );

        run.failures.sort_by_key(|f| f.target);
        Ok(CrawlReport {
            summary: run.summary,
            dataset,
            rejected: run.rejected,
            failures: run.failures,
        })
    }

    /// Lets in-flight pipelines finish until the grace deadline, then aborts
    /// the rest
    async fn drain(&self, workers: &mut JoinSet<TargetOutcome>, run: &mut RunState) -> Result<()> {
        if workers.is_empty() {
            return Ok(());
        }

        let grace = self.config.shutdown_grace();
        info!(
            "Cancellation requested; waiting up to {:?} for {} in-flight target(s)",
            grace,
            workers.len()
        );

        let deadline = tokio::time::sleep(grace);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    Some(joined) => run.finish(joined, false, &self.progress)?,
                    None => return Ok(()),
                },
                _ = &mut deadline => break,
            }
        }

        warn!("Shutdown grace expired; aborting {} target(s)", workers.len());
        workers.abort_all();
        while let Some(joined) = workers.join_next().await {
            run.finish(joined, false, &self.progress)?;
        }
        Ok(())
    }
}

/// Mutable bookkeeping of one run, owned by the orchestrator loop
struct RunState {
    frontier: Frontier,
    in_flight: HashMap<TargetId, Target>,
    summary: RunSummary,
    rejected: Vec<RejectedRecord>,
    failures: Vec<FailedTarget>,
}

impl RunState {
    fn new(config: &CrawlerConfig) -> Self {
        Self {
            frontier: Frontier::new(config.max_targets, config.max_depth),
            in_flight: HashMap::new(),
            summary: RunSummary::default(),
            rejected: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn admit(
        &mut self,
        url: Url,
        rule_set: &str,
        depth: u32,
        parent: Option<TargetId>,
        progress: &ProgressSender,
    ) {
        match self.frontier.offer(url, rule_set, depth, parent) {
            Admission::Queued(_) => {
                if let Some(target) = self.frontier.newest() {
                    progress.emit(target, TargetState::Queued);
                }
            }
            Admission::Duplicate => self.summary.links_duplicate += 1,
            Admission::DepthExceeded => self.summary.links_beyond_depth += 1,
            Admission::LimitReached => self.summary.links_over_limit += 1,
        }
    }

    /// Handles one joined pipeline
    ///
    /// Aborted pipelines are left in `in_flight` so they are reported as
    /// cancelled; a panicked one fails the run.
    fn finish(
        &mut self,
        joined: std::result::Result<TargetOutcome, JoinError>,
        admit_links: bool,
        progress: &ProgressSender,
    ) -> Result<()> {
        let mut outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => return Ok(()),
            Err(e) => return Err(TrawlError::Worker(e.to_string())),
        };

        self.in_flight.remove(&outcome.target.id);

        let links = std::mem::take(&mut outcome.links);
        self.summary.links_discovered += links.len();
        if admit_links {
            let depth = outcome.target.depth + 1;
            for link in links {
                self.admit(link.url, &link.rule_set, depth, Some(outcome.target.id), progress);
            }
        }

        self.record(outcome);
        Ok(())
    }

    fn record(&mut self, outcome: TargetOutcome) {
        self.summary.record_state(outcome.state);
        self.summary.records_inserted += outcome.inserted;
        self.summary.records_duplicate += outcome.duplicates;
        self.summary.records_rejected += outcome.rejected.len();
        self.summary.warnings += outcome.warnings;
        self.rejected.extend(outcome.rejected);

        if let Some(failure) = outcome.failure {
            self.summary.record_failure(failure.kind);
            self.failures.push(failure);
        }
    }
}
