use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for record-trawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub seeds: Vec<SeedEntry>,
    #[serde(rename = "rule-sets", default)]
    pub rule_sets: Vec<RuleSetConfig>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent target pipelines
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Sustained request rate across the whole run
    #[serde(rename = "requests-per-second", default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Token bucket capacity (requests that may be issued back to back)
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Maximum fetch attempts per target, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on computed backoff delay (milliseconds)
    #[serde(rename = "backoff-max-delay-ms", default = "default_backoff_max_delay_ms")]
    pub backoff_max_delay_ms: u64,

    /// Relative jitter applied to computed backoff, 0.0 to 1.0
    #[serde(rename = "backoff-jitter", default = "default_backoff_jitter")]
    pub backoff_jitter: f64,

    /// Upper bound on a server supplied Retry-After delay (milliseconds)
    #[serde(rename = "max-retry-after-ms", default = "default_max_retry_after_ms")]
    pub max_retry_after_ms: u64,

    /// Timeout for a single fetch attempt (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How long in-flight work may continue after cancellation (milliseconds)
    #[serde(rename = "shutdown-grace-ms", default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Maximum number of targets admitted to the work queue, seeds included
    #[serde(rename = "max-targets", default = "default_max_targets")]
    pub max_targets: usize,

    /// Maximum link depth from a seed
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,
}

impl CrawlerConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max_delay(&self) -> Duration {
        Duration::from_millis(self.backoff_max_delay_ms)
    }

    pub fn max_retry_after(&self) -> Duration {
        Duration::from_millis(self.max_retry_after_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_delay_ms: default_backoff_max_delay_ms(),
            backoff_jitter: default_backoff_jitter(),
            max_retry_after_ms: default_max_retry_after_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            max_targets: default_max_targets(),
            max_depth: default_max_depth(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}
fn default_requests_per_second() -> f64 {
    4.0
}
fn default_burst() -> u32 {
    4
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_delay_ms() -> u64 {
    30_000
}
fn default_backoff_jitter() -> f64 {
    0.2
}
fn default_max_retry_after_ms() -> u64 {
    60_000
}
fn default_request_timeout_ms() -> u64 {
    15_000
}
fn default_shutdown_grace_ms() -> u64 {
    5_000
}
fn default_max_targets() -> usize {
    1_000
}
fn default_max_depth() -> u32 {
    2
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Dataset shaping configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetConfig {
    /// Ordered field names whose values identify a unique record.
    /// Empty means every declared field takes part in the key.
    #[serde(rename = "dedupe-key-fields", default)]
    pub dedupe_key_fields: Vec<String>,
}

/// A seed URL and the rule set used to extract from it
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntry {
    pub url: String,

    /// Rule set name; the first declared rule set when omitted
    #[serde(rename = "rule-set", default)]
    pub rule_set: Option<String>,
}

/// A named group of extraction rules
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSetConfig {
    pub name: String,

    /// CSS selector whose matches each yield one record.
    /// When absent the whole page yields one record.
    #[serde(default)]
    pub scope: Option<String>,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// The closed set of selector kinds a rule may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorKindConfig {
    /// Text content of elements matching a CSS selector
    Text,
    /// Attribute value of elements matching a CSS selector
    Attribute,
    /// Element reached by a structural path such as `body/div[2]/span`
    Path,
    /// Capture group of a regular expression over the visible text
    Pattern,
}

/// Scalar type a field is coerced to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueTypeConfig {
    #[default]
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Url,
}

/// One extraction rule as written in the config file
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Output field name
    pub field: String,

    pub kind: SelectorKindConfig,

    /// CSS selector, structural path, or regex depending on `kind`
    pub selector: String,

    /// Attribute name for `attribute` rules
    #[serde(default)]
    pub attribute: Option<String>,

    /// Capture group for `pattern` rules
    #[serde(default)]
    pub group: Option<usize>,

    #[serde(rename = "type", default)]
    pub value_type: ValueTypeConfig,

    #[serde(default)]
    pub required: bool,

    /// Keep every match instead of the first one
    #[serde(default)]
    pub multiple: bool,

    /// Drop repeated matches of a `multiple` rule, keeping the first
    #[serde(default)]
    pub distinct: bool,

    /// Keep at most this many matches of a `multiple` rule
    #[serde(rename = "max-values", default)]
    pub max_values: Option<usize>,

    /// Lower bound: numeric value, or character count for text
    #[serde(default)]
    pub min: Option<f64>,

    /// Upper bound: numeric value, or character count for text
    #[serde(default)]
    pub max: Option<f64>,

    /// Regex the raw extracted text must match
    #[serde(default)]
    pub pattern: Option<String>,

    /// Values are follow-up URLs instead of record fields
    #[serde(default)]
    pub follow: bool,

    /// Rule set for follow-up targets; the current one when omitted
    #[serde(rename = "follow-rule-set", default)]
    pub follow_rule_set: Option<String>,
}
