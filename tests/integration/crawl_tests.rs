//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use record_trawler::config::{parse_config, Config};
use record_trawler::crawler::{
    progress_channel, FetchErrorKind, Orchestrator, RecordingSleeper, TargetId,
};
use record_trawler::dataset::{AddOutcome, Aggregator};
use record_trawler::extract::Provenance;
use record_trawler::state::TargetState;
use record_trawler::validate::{ValidatedRecord, ViolationKind};
use record_trawler::{TrawlError, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AS_RULES: &str = r#"
[[rule-sets]]
name = "as-page"

[[rule-sets.rules]]
field = "asn"
kind = "text"
selector = "h1.asn"
type = "integer"
required = true

[[rule-sets.rules]]
field = "name"
kind = "text"
selector = "p.name"

[[rule-sets.rules]]
field = "peers"
kind = "attribute"
selector = "a.peer"
attribute = "href"
follow = true
"#;

/// Creates a test configuration against the mock server
fn create_test_config(crawler: &str, rules: &str, seeds: &[(String, &str)]) -> Config {
    let seeds: String = seeds
        .iter()
        .map(|(url, rule_set)| format!("[[seeds]]\nurl = \"{url}\"\nrule-set = \"{rule_set}\"\n\n"))
        .collect();

    let content = format!(
        r#"
[crawler]
requests-per-second = 1000.0
burst = 100
backoff-jitter = 0.0
{crawler}

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[dataset]
dedupe-key-fields = ["asn"]

{seeds}
{rules}
"#
    );

    parse_config(&content).expect("test config should be valid")
}

fn as_page(asn: u32, name: &str, peers: &[&str]) -> String {
    let links: String = peers
        .iter()
        .map(|p| format!(r#"<a class="peer" href="{p}">peer</a>"#))
        .collect();
    format!(
        r#"<html><head><title>AS{asn}</title></head><body>
        <h1 class="asn">{asn}</h1><p class="name">{name}</p>{links}
        </body></html>"#
    )
}

async fn mount_page(server: &MockServer, at: &str, html: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .expect(expected)
        .mount(server)
        .await;
}

fn orchestrator(config: &Config) -> Orchestrator {
    Orchestrator::new(config)
        .expect("orchestrator should build")
        .with_sleeper(Arc::new(RecordingSleeper::new()))
}

#[tokio::test]
async fn test_one_success_one_persistent_server_error() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/AS13335", as_page(13335, "Cloudflare", &[]), 1).await;
    Mock::given(method("GET"))
        .and(path("/AS174"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let config = create_test_config(
        "max-attempts = 3",
        AS_RULES,
        &[
            (format!("{base}/AS13335"), "as-page"),
            (format!("{base}/AS174"), "as-page"),
        ],
    );

    let report = orchestrator(&config).run(&config.seeds).await.unwrap();

    assert_eq!(report.dataset.len(), 1);
    assert!(report.dataset.is_frozen());
    assert_eq!(
        report.dataset.records()[0].get("asn"),
        Some(&Value::Integer(13335))
    );

    assert_eq!(report.summary.count(TargetState::Aggregated), 1);
    assert_eq!(report.summary.count(TargetState::Failed), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FetchErrorKind::ServerError(503));
    assert_eq!(report.failures[0].attempts, 3);
    assert!(report.failures[0].url.path().ends_with("/AS174"));
}

#[tokio::test]
async fn test_records_sharing_a_key_are_deduplicated() {
    let server = MockServer::start().await;
    let base = server.uri();

    let listing = r#"<html><body><table>
        <tr class="row"><td class="asn">13335</td><td class="name">Cloudflare</td></tr>
        <tr class="row"><td class="asn">13,335</td><td class="name">Cloudflare Inc</td></tr>
    </table></body></html>"#;
    mount_page(&server, "/list", listing.to_string(), 1).await;

    let rules = r#"
[[rule-sets]]
name = "listing"
scope = "tr.row"

[[rule-sets.rules]]
field = "asn"
kind = "text"
selector = "td.asn"
type = "integer"
required = true

[[rule-sets.rules]]
field = "name"
kind = "text"
selector = "td.name"
"#;
    let config = create_test_config("", rules, &[(format!("{base}/list"), "listing")]);

    let report = orchestrator(&config).run(&config.seeds).await.unwrap();

    assert_eq!(report.dataset.len(), 1);
    assert_eq!(
        report.dataset.records()[0].get("name"),
        Some(&Value::Text("Cloudflare".to_string()))
    );
    assert_eq!(report.summary.records_inserted, 1);
    assert_eq!(report.summary.records_duplicate, 1);
    assert_eq!(report.summary.count(TargetState::Aggregated), 1);
}

#[tokio::test]
async fn test_required_field_coercion_failure_rejects_record() {
    let server = MockServer::start().await;
    let base = server.uri();

    let page = r#"<html><body><h1 class="asn">AS-unknown</h1><p class="name">Mystery</p></body></html>"#;
    mount_page(&server, "/mystery", page.to_string(), 1).await;

    let config = create_test_config("", AS_RULES, &[(format!("{base}/mystery"), "as-page")]);
    let report = orchestrator(&config).run(&config.seeds).await.unwrap();

    assert!(report.dataset.is_empty());
    assert_eq!(report.summary.count(TargetState::Rejected), 1);
    assert_eq!(report.rejected.len(), 1);

    let violation = &report.rejected[0].violations[0];
    assert_eq!(violation.field, "asn");
    assert!(matches!(violation.kind, ViolationKind::Coercion { .. }));
}

#[tokio::test]
async fn test_follow_links_respect_depth_and_seen_set() {
    let server = MockServer::start().await;
    let base = server.uri();

    let index = r#"<html><body><ul>
        <li><a class="as" href="/AS174">Cogent</a></li>
        <li><a class="as" href="/AS3356">Level3</a></li>
    </ul></body></html>"#;
    mount_page(&server, "/index", index.to_string(), 1).await;
    mount_page(&server, "/AS174", as_page(174, "Cogent", &["/AS6939", "/AS3356"]), 1).await;
    mount_page(&server, "/AS3356", as_page(3356, "Level3", &["/AS174"]), 1).await;
    mount_page(&server, "/AS6939", as_page(6939, "Hurricane", &[]), 0).await;

    let rules = format!(
        r#"
{AS_RULES}

[[rule-sets]]
name = "index"

[[rule-sets.rules]]
field = "members"
kind = "attribute"
selector = "a.as"
attribute = "href"
follow = true
follow-rule-set = "as-page"
"#
    );
    let config = create_test_config("max-depth = 1", &rules, &[(format!("{base}/index"), "index")]);

    let (progress, mut events) = progress_channel();
    let report = orchestrator(&config)
        .with_progress(progress)
        .run(&config.seeds)
        .await
        .unwrap();

    let asns: Vec<_> = report
        .dataset
        .iter()
        .filter_map(|r| r.get("asn").cloned())
        .collect();
    assert_eq!(asns.len(), 2);
    assert!(asns.contains(&Value::Integer(174)));
    assert!(asns.contains(&Value::Integer(3356)));

    assert_eq!(report.summary.targets_admitted, 3);
    assert_eq!(report.summary.count(TargetState::Aggregated), 3);
    assert!(report.summary.links_beyond_depth >= 2);

    let mut terminal = 0;
    while let Ok(event) = events.try_recv() {
        if event.state.is_terminal() {
            terminal += 1;
        }
    }
    assert_eq!(terminal, 3);
}

#[tokio::test]
async fn test_target_limit_caps_admissions() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/AS1", as_page(1, "One", &["/AS2", "/AS3"]), 1).await;
    mount_page(&server, "/AS2", as_page(2, "Two", &[]), 1).await;
    mount_page(&server, "/AS3", as_page(3, "Three", &[]), 0).await;

    let config = create_test_config(
        "max-targets = 2\nmax-depth = 3\nconcurrency = 1",
        AS_RULES,
        &[(format!("{base}/AS1"), "as-page")],
    );
    let report = orchestrator(&config).run(&config.seeds).await.unwrap();

    assert_eq!(report.dataset.len(), 2);
    assert_eq!(report.summary.targets_admitted, 2);
    assert_eq!(report.summary.links_over_limit, 1);
}

#[tokio::test]
async fn test_cancellation_stops_within_grace() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/hung"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(as_page(1, "Slow", &[]), "text/html")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;
    mount_page(&server, "/AS2", as_page(2, "Never", &[]), 0).await;

    let config = create_test_config(
        "concurrency = 1\nrequest-timeout-ms = 60000\nshutdown-grace-ms = 200",
        AS_RULES,
        &[
            (format!("{base}/hung"), "as-page"),
            (format!("{base}/AS2"), "as-page"),
        ],
    );

    let orchestrator = orchestrator(&config);
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(5), orchestrator.run(&config.seeds))
        .await
        .expect("run should end shortly after the grace deadline")
        .unwrap();

    assert!(report.summary.cancelled);
    assert_eq!(report.summary.unstarted, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FetchErrorKind::Cancelled);
    assert!(report.dataset.is_empty());
    assert!(report.dataset.is_frozen());
}

#[tokio::test]
async fn test_not_found_fails_without_retry() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config("", AS_RULES, &[(format!("{base}/gone"), "as-page")]);
    let report = orchestrator(&config).run(&config.seeds).await.unwrap();

    assert_eq!(report.failures[0].kind, FetchErrorKind::ClientError(404));
    assert_eq!(report.failures[0].attempts, 1);
}

#[tokio::test]
async fn test_seed_is_fetched_at_configured_url() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/AS13335/", as_page(13335, "Cloudflare", &[]), 1).await;

    let config = create_test_config(
        "",
        AS_RULES,
        &[
            (format!("{base}/AS13335/"), "as-page"),
            // same target once normalized
            (format!("{base}/AS13335"), "as-page"),
        ],
    );
    let report = orchestrator(&config).run(&config.seeds).await.unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.dataset.len(), 1);
    assert_eq!(
        report.dataset.records()[0].provenance.url.path(),
        "/AS13335/"
    );
    assert_eq!(report.summary.targets_admitted, 1);
    assert_eq!(report.summary.links_duplicate, 1);
}

#[tokio::test]
async fn test_invalid_rate_is_rejected_before_running() {
    let server = MockServer::start().await;
    let mut config = create_test_config(
        "",
        AS_RULES,
        &[(format!("{}/AS1", server.uri()), "as-page")],
    );

    config.crawler.requests_per_second = 0.0;
    assert!(matches!(
        Orchestrator::new(&config),
        Err(TrawlError::Config(_))
    ));

    config.crawler.requests_per_second = 1000.0;
    config.crawler.backoff_jitter = -1.0;
    assert!(matches!(
        Orchestrator::new(&config),
        Err(TrawlError::Config(_))
    ));
}

#[tokio::test]
async fn test_progress_events_follow_state_machine() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/AS13335", as_page(13335, "Cloudflare", &[]), 1).await;
    mount_page(
        &server,
        "/mystery",
        r#"<html><body><h1 class="asn">unknown</h1></body></html>"#.to_string(),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/AS174"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = create_test_config(
        "",
        AS_RULES,
        &[
            (format!("{base}/AS13335"), "as-page"),
            (format!("{base}/mystery"), "as-page"),
            (format!("{base}/AS174"), "as-page"),
        ],
    );

    let (progress, mut events) = progress_channel();
    orchestrator(&config)
        .with_progress(progress)
        .run(&config.seeds)
        .await
        .unwrap();

    let mut states: HashMap<TargetId, Vec<TargetState>> = HashMap::new();
    while let Ok(event) = events.try_recv() {
        states.entry(event.target).or_default().push(event.state);
    }

    assert_eq!(states.len(), 3);
    for (target, sequence) in &states {
        assert_eq!(sequence[0], TargetState::Queued, "{target}");
        assert!(sequence.last().unwrap().is_terminal(), "{target}");
        for pair in sequence.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{target}: {} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    let mut terminal: Vec<_> = states.values().filter_map(|s| s.last().copied()).collect();
    terminal.sort_by_key(|s| s.as_str());
    assert_eq!(
        terminal,
        vec![TargetState::Aggregated, TargetState::Failed, TargetState::Rejected]
    );
}

#[tokio::test]
async fn test_injected_aggregator_is_shared() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/AS13335", as_page(13335, "Renamed", &[]), 1).await;
    mount_page(&server, "/AS174", as_page(174, "Cogent", &[]), 1).await;

    let aggregator = Arc::new(Aggregator::new(vec!["asn".to_string()]));
    let earlier = ValidatedRecord {
        provenance: Provenance {
            target: TargetId(99),
            url: url::Url::parse("https://bgp.example.net/AS13335").unwrap(),
        },
        fields: vec![
            ("asn".to_string(), Some(Value::Integer(13335))),
            ("name".to_string(), Some(Value::Text("Cloudflare".to_string()))),
        ],
        warnings: Vec::new(),
    };
    assert_eq!(aggregator.add(earlier), AddOutcome::Inserted);

    let config = create_test_config(
        "",
        AS_RULES,
        &[
            (format!("{base}/AS13335"), "as-page"),
            (format!("{base}/AS174"), "as-page"),
        ],
    );
    let orchestrator = orchestrator(&config).with_aggregator(Arc::clone(&aggregator));
    assert!(Arc::ptr_eq(orchestrator.aggregator(), &aggregator));

    let report = orchestrator.run(&config.seeds).await.unwrap();

    assert_eq!(report.dataset.len(), 2);
    assert_eq!(
        report.dataset.records()[0].get("name"),
        Some(&Value::Text("Cloudflare".to_string()))
    );
    assert_eq!(report.summary.records_duplicate, 1);
    assert!(aggregator.is_frozen());
}
