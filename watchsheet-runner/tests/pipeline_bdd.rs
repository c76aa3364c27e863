//! BDD tests for the export run
//!
//! These tests verify the end-to-end behavior of one run against the
//! fixture provider:
//! - Key reconciliation between watchlist, prices and fundamentals
//! - Terminal errors (empty watchlist, empty result, auth)
//! - Session teardown on every path
//! - Chunk failure policies
//! - Idempotence of repeated runs

use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{json, Value};
use watchsheet_core::data::{ChunkFailurePolicy, FixtureProvider};
use watchsheet_core::domain::Table;
use watchsheet_runner::{
    run_job, Config, CsvPublisher, PublishError, PublishReceipt, PublishStatus, RunError,
    SheetPublisher,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn config() -> Config {
    let mut config = Config::default();
    config.provider.username = Some("trader".into());
    config.provider.password = Some("secret".into());
    config.batch.pacing_ms = 0;
    config
}

fn fixture(value: Value) -> FixtureProvider {
    FixtureProvider::from_json_value(value).unwrap()
}

fn apple_tesla() -> FixtureProvider {
    fixture(json!({
        "watchlist": {"results": [
            {"symbol": "AAPL", "name": "Apple"},
            {"symbol": "TSLA", "name": "Tesla"},
        ]},
        "fundamentals": {"AAPL": {"market_cap": "4440000000000.00"}},
        "prices": {"AAPL": "150.00"},
    }))
}

/// Publisher that counts calls and optionally fails.
struct RecordingPublisher {
    calls: AtomicUsize,
    fail: bool,
}

impl RecordingPublisher {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SheetPublisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    fn publish(&self, table: &Table) -> Result<PublishReceipt, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PublishError::Http("HTTP 503 Service Unavailable".into()));
        }
        Ok(PublishReceipt {
            destination: "memory".into(),
            rows: table.len(),
            created: false,
        })
    }
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn bdd_scenario_join_by_symbol() {
    // GIVEN a watchlist of Apple and Tesla, fundamentals only for AAPL
    // AND a price only for AAPL
    let provider = apple_tesla();
    let publisher = RecordingPublisher::new();

    // WHEN the run executes
    let report = run_job(&provider, &provider, &[&publisher], &config()).unwrap();

    // THEN exactly one row is produced, for AAPL
    let rows = report.table.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].cells(), ["Apple", "AAPL", "$150.00", "4.44", "T"]);

    // AND the report reflects the inputs
    assert_eq!(report.watchlist_size, 2);
    assert_eq!(report.prices_found, 1);
    assert_eq!(report.rows, 1);
    assert_eq!(publisher.calls(), 1);
    assert_eq!(provider.calls().logouts, 1);
}

#[test]
fn bdd_scenario_empty_fundamentals_is_terminal() {
    // GIVEN a non-empty watchlist whose symbols have no fundamentals
    let provider = fixture(json!({
        "watchlist": [{"symbol": "AAPL"}, {"symbol": "MSFT"}],
        "fundamentals": {},
    }));
    let publisher = RecordingPublisher::new();

    // WHEN the run executes
    let err = run_job(&provider, &provider, &[&publisher], &config()).unwrap_err();

    // THEN the run fails with EmptyResult
    assert!(matches!(err, RunError::EmptyResult { symbols: 2 }));
    assert_eq!(err.exit_code(), 5);

    // AND nothing is published, but the session is still released
    assert_eq!(publisher.calls(), 0);
    assert_eq!(provider.calls().logouts, 1);
}

#[test]
fn bdd_scenario_empty_watchlist_is_terminal() {
    // GIVEN a watchlist without any usable symbol
    let provider = fixture(json!({"watchlist": {"results": [{"name": "no symbol"}]}}));

    // WHEN the run executes
    let err = run_job(&provider, &provider, &[], &config()).unwrap_err();

    // THEN it fails with EmptyWatchlist and no data request follows
    assert!(matches!(err, RunError::EmptyWatchlist { .. }));
    assert_eq!(err.exit_code(), 4);
    let calls = provider.calls();
    assert_eq!(calls.price_requests, 0);
    assert!(calls.fundamentals_chunks.is_empty());
    assert_eq!(calls.logouts, 1);
}

#[test]
fn bdd_scenario_login_failure_skips_everything() {
    // GIVEN a provider that rejects the login
    let provider = apple_tesla().failing_login();
    let publisher = RecordingPublisher::new();

    // WHEN the run executes
    let err = run_job(&provider, &provider, &[&publisher], &config()).unwrap_err();

    // THEN the run fails with Auth
    assert!(matches!(err, RunError::Auth(_)));
    assert_eq!(err.exit_code(), 3);

    // AND no fetch, publish or logout happens
    let calls = provider.calls();
    assert_eq!(calls.watchlist_requests, 0);
    assert_eq!(calls.logouts, 0);
    assert_eq!(publisher.calls(), 0);
}

#[test]
fn bdd_scenario_watchlist_request_failure_releases_session() {
    // GIVEN a provider whose watchlist request fails
    let provider = apple_tesla().failing_watchlist();

    // WHEN the run executes
    let err = run_job(&provider, &provider, &[], &config()).unwrap_err();

    // THEN the provider error is terminal and logout still happens once
    assert!(matches!(err, RunError::Provider(_)));
    assert_eq!(provider.calls().logouts, 1);
}

#[test]
fn bdd_scenario_publish_failure_is_not_fatal() {
    // GIVEN two publishers, the first of which fails
    let provider = apple_tesla();
    let broken = RecordingPublisher::failing();
    let healthy = RecordingPublisher::new();

    // WHEN the run executes
    let report = run_job(&provider, &provider, &[&broken, &healthy], &config()).unwrap();

    // THEN both publishers are tried in order and the failure is recorded
    assert_eq!((broken.calls(), healthy.calls()), (1, 1));
    assert_eq!(report.publish_failures(), 1);
    assert!(matches!(report.publish[0].status, PublishStatus::Failed { .. }));
    assert!(report.publish[1].is_success());

    // AND the session is released exactly once
    assert_eq!(provider.calls().logouts, 1);
}

#[test]
fn bdd_scenario_price_outage_degrades_to_sentinel() {
    // GIVEN a quotes endpoint that fails
    let provider = apple_tesla().failing_prices();

    // WHEN the run executes
    let report = run_job(&provider, &provider, &[], &config()).unwrap();

    // THEN rows are still produced, with N/A prices
    assert_eq!(report.prices_found, 0);
    assert_eq!(report.table.rows()[0].price, "N/A");
}

#[test]
fn bdd_scenario_chunk_failure_isolated_by_default() {
    // GIVEN four symbols in chunks of two, the first chunk failing
    let provider = fixture(json!({
        "watchlist": [{"symbol": "A"}, {"symbol": "B"}, {"symbol": "C"}, {"symbol": "D"}],
        "fundamentals": {
            "A": {"market_cap": "1"}, "B": {"market_cap": "2"},
            "C": {"market_cap": "3"}, "D": {"market_cap": "4"},
        },
    }))
    .failing_chunk(0);
    let mut config = config();
    config.batch.chunk_size = 2;

    // WHEN the run executes with the default policy
    let report = run_job(&provider, &provider, &[], &config).unwrap();

    // THEN only the second chunk contributes rows
    let symbols: Vec<&str> = report.table.rows().iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["C", "D"]);
    assert_eq!(report.chunks.len(), 2);
}

#[test]
fn bdd_scenario_chunk_failure_aborts_when_configured() {
    // GIVEN the same failing chunk under the abort policy
    let provider = fixture(json!({
        "watchlist": [{"symbol": "A"}, {"symbol": "B"}, {"symbol": "C"}],
        "fundamentals": {"A": {}, "B": {}, "C": {}},
    }))
    .failing_chunk(0);
    let mut config = config();
    config.batch.chunk_size = 2;
    config.batch.on_chunk_failure = ChunkFailurePolicy::Abort;

    // WHEN the run executes
    let err = run_job(&provider, &provider, &[], &config).unwrap_err();

    // THEN the run fails with a fetch error after the first chunk
    assert!(matches!(err, RunError::Fetch(ref e) if e.chunk == 1 && e.total == 2));
    assert_eq!(provider.calls().fundamentals_chunks.len(), 1);
    assert_eq!(provider.calls().logouts, 1);
}

#[test]
fn bdd_scenario_session_expiring_mid_run_is_auth_failure() {
    // GIVEN a provider that accepts the login, then rejects price and fundamentals requests
    let provider = apple_tesla().expiring_session();
    let publisher = RecordingPublisher::new();

    // WHEN the run executes with the default isolate policy
    let err = run_job(&provider, &provider, &[&publisher], &config()).unwrap_err();

    // THEN the run fails with Auth rather than an empty result
    assert!(matches!(err, RunError::Auth(_)));
    assert_eq!(err.exit_code(), 3);

    // AND nothing is published, and the session is still released once
    assert_eq!(publisher.calls(), 0);
    let calls = provider.calls();
    assert_eq!(calls.fundamentals_chunks.len(), 1);
    assert_eq!(calls.logouts, 1);
}

#[test]
fn bdd_scenario_repeated_runs_are_idempotent() {
    // GIVEN identical upstream data for two runs
    let first = apple_tesla();
    let second = apple_tesla();

    // WHEN both runs execute
    let a = run_job(&first, &first, &[], &config()).unwrap();
    let b = run_job(&second, &second, &[], &config()).unwrap();

    // THEN rows and fingerprints are identical
    assert_eq!(a.table, b.table);
    assert_eq!(a.fingerprint, b.fingerprint);
}

#[test]
fn bdd_scenario_csv_publish_and_report_file() {
    // GIVEN a CSV publisher in a temp directory
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("out").join("watchlist.csv");
    let report_path = dir.path().join("out").join("report.json");
    let provider = apple_tesla();
    let csv = CsvPublisher::new(&csv_path);

    // WHEN the run executes and the report is written
    let report = run_job(&provider, &provider, &[&csv], &config()).unwrap();
    report.write_json(&report_path).unwrap();

    // THEN the CSV holds the header and the single row
    let content = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(
        content.lines().collect::<Vec<_>>(),
        vec![
            "Name,Symbol,Price,Marketcap Value,Marketcap Unit",
            "Apple,AAPL,$150.00,4.44,T",
        ]
    );

    // AND the report records the publish and the fingerprint
    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(saved["publish"][0]["publisher"], "csv");
    assert_eq!(saved["publish"][0]["status"], "published");
    assert_eq!(saved["publish"][0]["rows"], 1);
    assert_eq!(saved["fingerprint"], report.fingerprint.as_str());
}
