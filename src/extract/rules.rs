//! Compiled extraction rules
//!
//! Selectors, structural paths and regexes are compiled once when the
//! configuration loads. A malformed one is a [`RuleError`] at that point, never
//! a per-record failure later.

use crate::config::{RuleConfig, RuleSetConfig, SelectorKindConfig};
use crate::validate::{FieldSpec, Schema, ValueType};
use crate::RuleError;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// How a rule locates its values in a document
#[derive(Debug, Clone)]
pub enum Selector {
    /// Text content of elements matching a CSS selector
    Text { css: scraper::Selector },
    /// Attribute value of elements matching a CSS selector
    Attribute {
        css: scraper::Selector,
        attribute: String,
    },
    /// Elements reached by walking child elements step by step
    Path { steps: Vec<PathStep> },
    /// Capture group of a regex over the collapsed visible text
    Pattern { regex: Regex, group: usize },
}

/// One step of a structural path: `div`, `div[2]`, `*` or `*[3]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    /// Lowercased tag name; None matches any element
    pub tag: Option<String>,
    /// 1-based position among the matching children; None keeps all of them
    pub index: Option<usize>,
}

impl PathStep {
    pub(crate) fn matches(&self, name: &str) -> bool {
        self.tag
            .as_deref()
            .map_or(true, |tag| tag.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag.as_deref().unwrap_or("*"))?;
        if let Some(index) = self.index {
            write!(f, "[{index}]")?;
        }
        Ok(())
    }
}

/// Parses a structural path such as `body/div[2]/span`
pub fn parse_path(path: &str) -> Result<Vec<PathStep>, String> {
    let mut steps = Vec::new();

    for raw in path.trim().trim_start_matches('/').split('/') {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("empty path step".to_string());
        }

        let (tag, index) = match raw.split_once('[') {
            Some((tag, rest)) => {
                let digits = rest
                    .strip_suffix(']')
                    .ok_or_else(|| format!("unclosed index in step '{raw}'"))?;
                let index: usize = digits
                    .trim()
                    .parse()
                    .map_err(|_| format!("index '{digits}' is not a number"))?;
                if index == 0 {
                    return Err(format!("indices are 1-based, got 0 in step '{raw}'"));
                }
                (tag.trim(), Some(index))
            }
            None => (raw, None),
        };

        let tag = match tag {
            "*" => None,
            t if !t.is_empty() && t.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') => {
                Some(t.to_ascii_lowercase())
            }
            t => return Err(format!("invalid tag name '{t}'")),
        };

        steps.push(PathStep { tag, index });
    }

    Ok(steps)
}

/// A compiled rule producing one record field
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pub field: String,
    pub selector: Selector,
    pub multiple: bool,
    /// Repeated matches are dropped, first occurrence kept
    pub distinct: bool,
    pub max_values: Option<usize>,
}

impl ExtractionRule {
    /// Applies `distinct` and `max_values` to the matches of a `multiple`
    /// rule; single-valued rules are left alone
    pub fn limit(&self, mut matches: Vec<String>) -> Vec<String> {
        if !self.multiple {
            return matches;
        }
        if self.distinct {
            let mut seen = HashSet::new();
            matches.retain(|m| seen.insert(m.clone()));
        }
        if let Some(max) = self.max_values {
            matches.truncate(max);
        }
        matches
    }
}

/// A compiled rule producing follow-up target URLs
#[derive(Debug, Clone)]
pub struct FollowRule {
    pub field: String,
    pub selector: Selector,
    /// Rule set applied to discovered targets
    pub rule_set: String,
}

/// A named, compiled rule set
#[derive(Debug)]
pub struct CompiledRuleSet {
    name: String,
    scope: Option<scraper::Selector>,
    rules: Vec<ExtractionRule>,
    follows: Vec<FollowRule>,
    schema: Arc<Schema>,
}

impl CompiledRuleSet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Option<&scraper::Selector> {
        self.scope.as_ref()
    }

    pub fn rules(&self) -> &[ExtractionRule] {
        &self.rules
    }

    pub fn follows(&self) -> &[FollowRule] {
        &self.follows
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn compile(config: &RuleSetConfig) -> Result<Self, RuleError> {
        let scope = config
            .scope
            .as_deref()
            .map(|css| compile_css("(scope)", css))
            .transpose()?;

        let mut seen = HashSet::new();
        let mut rules = Vec::new();
        let mut follows = Vec::new();
        let mut fields = Vec::new();

        for rule in &config.rules {
            if !seen.insert(rule.field.as_str()) {
                return Err(RuleError::DuplicateField {
                    rule_set: config.name.clone(),
                    field: rule.field.clone(),
                });
            }

            let selector = compile_selector(rule)?;

            if rule.follow {
                follows.push(FollowRule {
                    field: rule.field.clone(),
                    selector,
                    rule_set: rule
                        .follow_rule_set
                        .clone()
                        .unwrap_or_else(|| config.name.clone()),
                });
                continue;
            }

            if rule.max_values == Some(0) {
                return Err(RuleError::ZeroMaxValues {
                    field: rule.field.clone(),
                });
            }

            fields.push(compile_field_spec(rule)?);
            rules.push(ExtractionRule {
                field: rule.field.clone(),
                selector,
                multiple: rule.multiple,
                distinct: rule.distinct,
                max_values: rule.max_values,
            });
        }

        Ok(Self {
            name: config.name.clone(),
            scope,
            rules,
            follows,
            schema: Arc::new(Schema::new(fields)),
        })
    }
}

fn compile_css(field: &str, css: &str) -> Result<scraper::Selector, RuleError> {
    scraper::Selector::parse(css).map_err(|e| RuleError::InvalidSelector {
        field: field.to_string(),
        selector: css.to_string(),
        message: e.to_string(),
    })
}

fn compile_regex(field: &str, pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|source| RuleError::InvalidRegex {
        field: field.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}

fn compile_selector(rule: &RuleConfig) -> Result<Selector, RuleError> {
    let field = rule.field.as_str();

    match rule.kind {
        SelectorKindConfig::Text => Ok(Selector::Text {
            css: compile_css(field, &rule.selector)?,
        }),
        SelectorKindConfig::Attribute => {
            let attribute = rule
                .attribute
                .clone()
                .filter(|a| !a.trim().is_empty())
                .ok_or_else(|| RuleError::MissingOption {
                    field: field.to_string(),
                    option: "attribute",
                })?;
            Ok(Selector::Attribute {
                css: compile_css(field, &rule.selector)?,
                attribute,
            })
        }
        SelectorKindConfig::Path => {
            let steps = parse_path(&rule.selector).map_err(|message| RuleError::InvalidPath {
                field: field.to_string(),
                path: rule.selector.clone(),
                message,
            })?;
            Ok(Selector::Path { steps })
        }
        SelectorKindConfig::Pattern => {
            let regex = compile_regex(field, &rule.selector)?;
            // captures_len counts the implicit whole-match group
            let groups = regex.captures_len() - 1;
            let group = rule.group.unwrap_or(if groups > 0 { 1 } else { 0 });
            if group > groups {
                return Err(RuleError::InvalidGroup {
                    field: field.to_string(),
                    group,
                    groups,
                });
            }
            Ok(Selector::Pattern { regex, group })
        }
    }
}

fn compile_field_spec(rule: &RuleConfig) -> Result<FieldSpec, RuleError> {
    let mut spec = FieldSpec::new(&rule.field, ValueType::from(rule.value_type))
        .range(rule.min, rule.max);
    if rule.required {
        spec = spec.required();
    }
    if rule.multiple {
        spec = spec.multiple();
    }
    if let Some(pattern) = &rule.pattern {
        spec = spec.pattern(compile_regex(&rule.field, pattern)?);
    }
    Ok(spec)
}

/// All rule sets of a run, looked up by name
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    sets: Vec<Arc<CompiledRuleSet>>,
    by_name: HashMap<String, usize>,
}

impl RuleCatalog {
    pub fn compile(configs: &[RuleSetConfig]) -> Result<Self, RuleError> {
        if configs.is_empty() {
            return Err(RuleError::Empty);
        }

        let mut sets = Vec::with_capacity(configs.len());
        let mut by_name = HashMap::new();

        for config in configs {
            if by_name.insert(config.name.clone(), sets.len()).is_some() {
                return Err(RuleError::DuplicateRuleSet(config.name.clone()));
            }
            sets.push(Arc::new(CompiledRuleSet::compile(config)?));
        }

        let catalog = Self { sets, by_name };
        for set in &catalog.sets {
            for follow in &set.follows {
                catalog.get(&follow.rule_set)?;
            }
        }

        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Result<&Arc<CompiledRuleSet>, RuleError> {
        self.by_name
            .get(name)
            .map(|&i| &self.sets[i])
            .ok_or_else(|| RuleError::UnknownRuleSet(name.to_string()))
    }

    /// Looks up a rule set, falling back to the first declared one
    pub fn resolve(&self, name: Option<&str>) -> Result<&Arc<CompiledRuleSet>, RuleError> {
        match name {
            Some(name) => self.get(name),
            None => self.sets.first().ok_or(RuleError::Empty),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CompiledRuleSet>> {
        self.sets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValueTypeConfig;

    fn rule(field: &str, kind: SelectorKindConfig, selector: &str) -> RuleConfig {
        RuleConfig {
            field: field.to_string(),
            kind,
            selector: selector.to_string(),
            attribute: None,
            group: None,
            value_type: ValueTypeConfig::Text,
            required: false,
            multiple: false,
            distinct: false,
            max_values: None,
            min: None,
            max: None,
            pattern: None,
            follow: false,
            follow_rule_set: None,
        }
    }

    fn set(name: &str, rules: Vec<RuleConfig>) -> RuleSetConfig {
        RuleSetConfig {
            name: name.to_string(),
            scope: None,
            rules,
        }
    }

    #[test]
    fn test_parse_path() {
        let steps = parse_path("/html/body/div[2]/*[3]").unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[2].tag.as_deref(), Some("div"));
        assert_eq!(steps[2].index, Some(2));
        assert_eq!(steps[3].tag, None);
        assert_eq!(steps[3].to_string(), "*[3]");
    }

    #[test]
    fn test_parse_path_errors() {
        assert!(parse_path("body//span").is_err());
        assert!(parse_path("div[0]").is_err());
        assert!(parse_path("div[x]").is_err());
        assert!(parse_path("div[2").is_err());
        assert!(parse_path("di v").is_err());
    }

    #[test]
    fn test_compile_splits_follow_rules_from_fields() {
        let mut follow = rule("next", SelectorKindConfig::Attribute, "a.next");
        follow.attribute = Some("href".to_string());
        follow.follow = true;

        let catalog = RuleCatalog::compile(&[set(
            "listing",
            vec![rule("title", SelectorKindConfig::Text, "h2"), follow],
        )])
        .unwrap();

        let listing = catalog.get("listing").unwrap();
        assert_eq!(listing.rules().len(), 1);
        assert_eq!(listing.follows().len(), 1);
        assert_eq!(listing.follows()[0].rule_set, "listing");
        assert!(listing.schema().field("next").is_none());
        assert!(listing.schema().field("title").is_some());
    }

    #[test]
    fn test_attribute_rule_requires_attribute_name() {
        let result = RuleCatalog::compile(&[set(
            "s",
            vec![rule("link", SelectorKindConfig::Attribute, "a")],
        )]);
        assert!(matches!(
            result,
            Err(RuleError::MissingOption { option: "attribute", .. })
        ));
    }

    #[test]
    fn test_invalid_regex_and_group() {
        let result = RuleCatalog::compile(&[set(
            "s",
            vec![rule("n", SelectorKindConfig::Pattern, "AS(\\d+")],
        )]);
        assert!(matches!(result, Err(RuleError::InvalidRegex { .. })));

        let mut bad_group = rule("n", SelectorKindConfig::Pattern, "AS(\\d+)");
        bad_group.group = Some(2);
        let result = RuleCatalog::compile(&[set("s", vec![bad_group])]);
        assert!(matches!(result, Err(RuleError::InvalidGroup { groups: 1, .. })));
    }

    #[test]
    fn test_max_values_zero_is_rejected() {
        let mut emails = rule("emails", SelectorKindConfig::Text, "a.mail");
        emails.multiple = true;
        emails.max_values = Some(0);
        let result = RuleCatalog::compile(&[set("s", vec![emails])]);
        assert!(matches!(result, Err(RuleError::ZeroMaxValues { .. })));
    }

    #[test]
    fn test_limit_only_applies_to_multiple_rules() {
        let matches = || vec!["a".to_string(), "a".to_string(), "b".to_string()];
        let mut limited = ExtractionRule {
            field: "phones".to_string(),
            selector: Selector::Text {
                css: scraper::Selector::parse("p").unwrap(),
            },
            multiple: true,
            distinct: true,
            max_values: Some(1),
        };
        assert_eq!(limited.limit(matches()), vec!["a".to_string()]);

        limited.multiple = false;
        assert_eq!(limited.limit(matches()).len(), 3);
    }

    #[test]
    fn test_duplicates_and_unknown_references() {
        let dup_field = RuleCatalog::compile(&[set(
            "s",
            vec![
                rule("a", SelectorKindConfig::Text, "p"),
                rule("a", SelectorKindConfig::Text, "span"),
            ],
        )]);
        assert!(matches!(dup_field, Err(RuleError::DuplicateField { .. })));

        let dup_set = RuleCatalog::compile(&[set("s", vec![]), set("s", vec![])]);
        assert!(matches!(dup_set, Err(RuleError::DuplicateRuleSet(_))));

        let mut follow = rule("next", SelectorKindConfig::Text, "a");
        follow.follow = true;
        follow.follow_rule_set = Some("nowhere".to_string());
        let unknown = RuleCatalog::compile(&[set("s", vec![follow])]);
        assert!(matches!(unknown, Err(RuleError::UnknownRuleSet(_))));

        assert!(matches!(RuleCatalog::compile(&[]), Err(RuleError::Empty)));
    }

    #[test]
    fn test_resolve_defaults_to_first_set() {
        let catalog =
            RuleCatalog::compile(&[set("first", vec![]), set("second", vec![])]).unwrap();
        assert_eq!(catalog.resolve(None).unwrap().name(), "first");
        assert_eq!(catalog.resolve(Some("second")).unwrap().name(), "second");
    }
}
