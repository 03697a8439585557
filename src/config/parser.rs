use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use record_trawler::config::load_config;
///
/// let config = load_config(Path::new("trawl.toml")).unwrap();
/// println!("Concurrency: {}", config.crawler.concurrency);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so that a dataset can be traced back to the exact rules
/// that produced it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID: &str = r#"
[crawler]
concurrency = 4
requests-per-second = 2.5
max-attempts = 3
max-depth = 1

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[dataset]
dedupe-key-fields = ["asn"]

[[seeds]]
url = "https://bgp.example.net/AS13335"
rule-set = "as-page"

[[rule-sets]]
name = "as-page"

[[rule-sets.rules]]
field = "asn"
kind = "text"
selector = "h1.asn"
type = "integer"
required = true

[[rule-sets.rules]]
field = "prefixes_v4"
kind = "pattern"
selector = 'Prefixes Originated \(v4\):\s*([\d,]+)'
type = "integer"

[[rule-sets.rules]]
field = "website"
kind = "attribute"
selector = "a.website"
attribute = "href"
follow = true
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.concurrency, 4);
        assert_eq!(config.crawler.requests_per_second, 2.5);
        assert_eq!(config.crawler.backoff_base_ms, 500);
        assert_eq!(config.dataset.dedupe_key_fields, vec!["asn".to_string()]);
        assert_eq!(config.seeds.len(), 1);
        assert_eq!(config.rule_sets[0].rules.len(), 3);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/trawl.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_malformed_selector_fails_at_load() {
        let content = VALID.replace("h1.asn", "h1[[asn");
        let result = parse_config(&content);
        assert!(matches!(
            result,
            Err(ConfigError::Rule(RuleError::InvalidSelector { .. }))
        ));
    }

    #[test]
    fn test_unknown_seed_rule_set_is_rejected() {
        let content = VALID.replace(r#"rule-set = "as-page""#, r#"rule-set = "missing""#);
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::Rule(RuleError::UnknownRuleSet(_)))
        ));
    }

    #[test]
    fn test_undeclared_dedupe_field_is_rejected() {
        let content = VALID.replace(r#"["asn"]"#, r#"["company"]"#);
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");
        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        assert_ne!(
            compute_config_hash(file1.path()).unwrap(),
            compute_config_hash(file2.path()).unwrap()
        );
    }
}
