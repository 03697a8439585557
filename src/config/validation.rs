use crate::config::types::{Config, CrawlerConfig, SeedEntry, UserAgentConfig};
use crate::extract::RuleCatalog;
use crate::ConfigError;
use url::Url;

/// Slowest accepted request rate: one request per hour
pub const MIN_REQUESTS_PER_SECOND: f64 = 1.0 / 3600.0;

/// Validates the entire configuration
///
/// Rule sets are compiled here as well so that a malformed selector fails the
/// load instead of surfacing per record later.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;

    let catalog = RuleCatalog::compile(&config.rule_sets)?;
    validate_seeds(&config.seeds, &catalog)?;
    validate_dedupe_fields(&config.dataset.dedupe_key_fields, &catalog)?;
    Ok(())
}

/// Validates crawler configuration
///
/// Also run by the orchestrator, since a `Config` may be built in code
/// without going through [`validate`].
pub fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 256 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 256, got {}",
            config.concurrency
        )));
    }

    if !config.requests_per_second.is_finite()
        || config.requests_per_second < MIN_REQUESTS_PER_SECOND
    {
        return Err(ConfigError::Validation(format!(
            "requests_per_second must be at least {} (one request per hour), got {}",
            MIN_REQUESTS_PER_SECOND, config.requests_per_second
        )));
    }

    if config.burst < 1 {
        return Err(ConfigError::Validation("burst must be >= 1".to_string()));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_attempts must be >= 1".to_string(),
        ));
    }

    if config.backoff_max_delay_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_max_delay_ms ({}) must not be below backoff_base_ms ({})",
            config.backoff_max_delay_ms, config.backoff_base_ms
        )));
    }

    if !(0.0..=1.0).contains(&config.backoff_jitter) {
        return Err(ConfigError::Validation(format!(
            "backoff_jitter must be between 0.0 and 1.0, got {}",
            config.backoff_jitter
        )));
    }

    if config.request_timeout_ms < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_ms must be >= 1".to_string(),
        ));
    }

    if config.max_targets < 1 {
        return Err(ConfigError::Validation(
            "max_targets must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)
}

/// Validates seed URLs and their rule set references
fn validate_seeds(seeds: &[SeedEntry], catalog: &RuleCatalog) -> Result<(), ConfigError> {
    for seed in seeds {
        let url = Url::parse(&seed.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed.url, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use HTTP or HTTPS",
                seed.url
            )));
        }

        if let Some(name) = &seed.rule_set {
            catalog.get(name)?;
        }
    }

    Ok(())
}

/// Every rule set that produces records must declare the dedup key fields
fn validate_dedupe_fields(fields: &[String], catalog: &RuleCatalog) -> Result<(), ConfigError> {
    for set in catalog.iter() {
        if set.schema().is_empty() {
            continue;
        }
        for field in fields {
            if set.schema().field(field).is_none() {
                return Err(ConfigError::Validation(format!(
                    "dedupe key field '{}' is not declared by rule set '{}'",
                    field,
                    set.name()
                )));
            }
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
