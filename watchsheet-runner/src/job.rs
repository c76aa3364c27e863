//! One complete export run: login, pipeline, publish, logout.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use watchsheet_core::data::{ChunkOutcome, ChunkStats, MarketDataProvider, SessionProvider};
use watchsheet_core::domain::{Table, TableFingerprint};

use crate::config::Config;
use crate::pipeline::{MergePipeline, RunError};
use crate::preview::render_preview;
use crate::publish::{PublishReceipt, SheetPublisher};

/// Logs out when dropped, whatever path the run took.
struct SessionGuard<'a> {
    provider: &'a dyn SessionProvider,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        match self.provider.logout() {
            Ok(()) => info!("session closed"),
            Err(e) => warn!("logout failed: {e}"),
        }
    }
}

/// Result of one publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishStatus {
    Published(PublishReceipt),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub publisher: String,
    #[serde(flatten)]
    pub status: PublishStatus,
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, PublishStatus::Published(_))
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub watchlist: String,
    pub watchlist_size: usize,
    pub prices_found: usize,
    pub chunks: Vec<ChunkStats>,
    pub rows: usize,
    pub fingerprint: TableFingerprint,
    pub publish: Vec<PublishOutcome>,
    #[serde(skip)]
    pub table: Table,
}

impl RunReport {
    pub fn failed_chunks(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| matches!(c.outcome, ChunkOutcome::Failed { .. }))
            .count()
    }

    pub fn publish_failures(&self) -> usize {
        self.publish.iter().filter(|p| !p.is_success()).count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize run report")
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("failed to write run report to {}", path.display()))
    }
}

/// Run one export.
///
/// Configuration is validated before any request. A failed login ends the
/// run without a logout; once a session exists it is released on every exit
/// path. Publish failures are recorded in the report and never end the run.
pub fn run_job(
    session: &dyn SessionProvider,
    market_data: &dyn MarketDataProvider,
    publishers: &[&dyn SheetPublisher],
    config: &Config,
) -> Result<RunReport, RunError> {
    let started_at = Utc::now();
    config.validate()?;
    let options = config.pipeline_options()?;
    let credentials = config.credentials()?;

    session.login(&credentials).map_err(RunError::Auth)?;
    info!("logged in to {}", market_data.name());
    let _guard = SessionGuard { provider: session };

    let output = MergePipeline::new(market_data, options).run()?;
    let table = output.table;

    info!(
        "preview of first {} rows:\n{}",
        config.output.preview_rows.min(table.len()),
        render_preview(&table, config.output.preview_rows)
    );

    let mut publish = Vec::with_capacity(publishers.len());
    for publisher in publishers {
        let status = match publisher.publish(&table) {
            Ok(receipt) => {
                info!("published to {}: {}", publisher.name(), receipt.destination);
                PublishStatus::Published(receipt)
            }
            Err(e) => {
                error!("publishing to {} failed: {e}", publisher.name());
                PublishStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        publish.push(PublishOutcome {
            publisher: publisher.name().to_string(),
            status,
        });
    }

    Ok(RunReport {
        started_at,
        finished_at: Utc::now(),
        watchlist: config.watchlist.name.clone(),
        watchlist_size: output.watchlist_size,
        prices_found: output.prices_found,
        chunks: output.chunks,
        rows: table.len(),
        fingerprint: table.fingerprint(),
        publish,
        table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use watchsheet_core::data::FixtureProvider;

    fn config() -> Config {
        let mut config = Config::default();
        config.provider.username = Some("u".into());
        config.provider.password = Some("p".into());
        config.batch.pacing_ms = 0;
        config
    }

    fn provider() -> FixtureProvider {
        FixtureProvider::from_json_value(json!({
            "watchlist": [{"symbol": "AAPL", "name": "Apple"}],
            "fundamentals": {"AAPL": {"market_cap": "3000000000000"}},
            "prices": {"AAPL": "190.5"},
        }))
        .unwrap()
    }

    #[test]
    fn invalid_config_fails_before_login() {
        let provider = provider();
        let mut config = config();
        config.batch.chunk_size = 0;

        let err = run_job(&provider, &provider, &[], &config).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(provider.calls().logins, 0);
    }

    #[test]
    fn missing_credentials_fail_before_login() {
        let provider = provider();
        let err = run_job(&provider, &provider, &[], &Config::default()).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
        assert_eq!(provider.calls().logins, 0);
    }

    #[test]
    fn failed_logout_does_not_fail_the_run() {
        let provider = provider().failing_logout();
        let report = run_job(&provider, &provider, &[], &config()).unwrap();
        assert_eq!(report.rows, 1);
        assert_eq!(provider.calls().logouts, 1);
    }

    #[test]
    fn report_serializes_without_table() {
        let provider = provider();
        let report = run_job(&provider, &provider, &[], &config()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["rows"], 1);
        assert_eq!(value["prices_found"], 1);
        assert_eq!(value["chunks"][0]["outcome"]["status"], "fetched");
        assert!(value.get("table").is_none());
    }
}
