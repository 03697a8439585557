//! HTML extraction driven by compiled rule sets
//!
//! `scraper::Html` is not `Send`, so the whole document lifetime stays inside
//! the synchronous [`parse`] call and only owned strings leave it.

use crate::extract::record::{FollowLink, ParsedPage, Provenance, RawRecord, RawValue};
use crate::extract::rules::{CompiledRuleSet, PathStep, Selector};
use crate::url::resolve_link;
use crate::validate::collapse_whitespace;
use scraper::{ElementRef, Html, Node};
use std::collections::HashSet;

/// Extracts raw records and follow-up links from an HTML payload
///
/// Rules that match nothing produce [`RawValue::Missing`]. Malformed markup is
/// recovered by the HTML5 parser, so this never fails.
///
/// # Example
///
/// ```no_run
/// use record_trawler::config::parse_config;
/// use record_trawler::extract::{parse, Provenance, RuleCatalog};
/// use record_trawler::TargetId;
/// use url::Url;
///
/// let config = parse_config(&std::fs::read_to_string("trawl.toml").unwrap()).unwrap();
/// let catalog = RuleCatalog::compile(&config.rule_sets).unwrap();
/// let provenance = Provenance {
///     target: TargetId(0),
///     url: Url::parse("https://bgp.example.net/AS13335").unwrap(),
/// };
/// let page = parse("<h1 class=asn>13335</h1>", catalog.resolve(None).unwrap(), &provenance);
/// println!("{} records", page.records.len());
/// ```
pub fn parse(payload: &str, rule_set: &CompiledRuleSet, provenance: &Provenance) -> ParsedPage {
    let document = Html::parse_document(payload);
    let root = document.root_element();

    let records = if rule_set.rules().is_empty() {
        Vec::new()
    } else {
        match rule_set.scope() {
            Some(scope) => root
                .select(scope)
                .map(|element| extract_record(element, false, rule_set, provenance))
                .collect(),
            None => vec![extract_record(root, true, rule_set, provenance)],
        }
    };

    let links = extract_links(root, rule_set, provenance);

    ParsedPage { records, links }
}

fn extract_record(
    context: ElementRef<'_>,
    is_document: bool,
    rule_set: &CompiledRuleSet,
    provenance: &Provenance,
) -> RawRecord {
    let fields = rule_set
        .rules()
        .iter()
        .map(|rule| {
            let matches = rule.limit(select_values(context, is_document, &rule.selector));
            (rule.field.clone(), RawValue::from_matches(matches, rule.multiple))
        })
        .collect();

    RawRecord {
        provenance: provenance.clone(),
        fields,
    }
}

/// Follow rules always look at the whole page, even when records are scoped
fn extract_links(
    root: ElementRef<'_>,
    rule_set: &CompiledRuleSet,
    provenance: &Provenance,
) -> Vec<FollowLink> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for follow in rule_set.follows() {
        for href in select_values(root, true, &follow.selector) {
            let Some(mut url) = resolve_link(&href, &provenance.url) else {
                continue;
            };
            url.set_fragment(None);
            if seen.insert((url.clone(), follow.rule_set.as_str())) {
                links.push(FollowLink {
                    url,
                    rule_set: follow.rule_set.clone(),
                });
            }
        }
    }

    links
}

fn select_values(context: ElementRef<'_>, is_document: bool, selector: &Selector) -> Vec<String> {
    match selector {
        Selector::Text { css } => context.select(css).map(element_text).collect(),
        Selector::Attribute { css, attribute } => context
            .select(css)
            .filter_map(|element| element.value().attr(attribute))
            .map(str::to_string)
            .collect(),
        Selector::Path { steps } => walk_path(context, is_document, steps)
            .into_iter()
            .map(element_text)
            .collect(),
        Selector::Pattern { regex, group } => {
            let text = visible_text(context);
            regex
                .captures_iter(&text)
                .filter_map(|captures| captures.get(*group))
                .map(|m| m.as_str().to_string())
                .collect()
        }
    }
}

/// Walks child elements step by step
///
/// From the document root a leading `html` step is optional, so both
/// `html/body/h1` and `body/h1` reach the same element.
fn walk_path<'a>(start: ElementRef<'a>, is_document: bool, steps: &[PathStep]) -> Vec<ElementRef<'a>> {
    let mut steps = steps;
    if is_document {
        if let Some(first) = steps.first() {
            if first.tag.as_deref() == Some("html") && first.index.map_or(true, |i| i == 1) {
                steps = &steps[1..];
            }
        }
    }

    let mut current = vec![start];
    for step in steps {
        let mut next = Vec::new();
        for parent in &current {
            let mut children = parent
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|child| step.matches(child.value().name()));
            match step.index {
                Some(index) => next.extend(children.nth(index - 1)),
                None => next.extend(children),
            }
        }
        current = next;
    }

    current
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Text nodes outside script and style, joined and collapsed
fn visible_text(element: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for node in element.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(ElementRef::wrap)
            .map_or(false, |parent| {
                matches!(parent.value().name(), "script" | "style" | "noscript")
            });
        if !hidden {
            parts.push(text);
        }
    }

    collapse_whitespace(&parts.join(" "))
}
