//! Chunked fundamentals download.
//!
//! Symbols are split into consecutive chunks and requested one chunk at a
//! time, with a fixed pause between requests to stay under the provider's
//! rate limit. Records are aggregated in chunk order, then in provider order
//! within a chunk; that order becomes the output row order.

use super::provider::{MarketDataProvider, ProviderError};
use super::shape::{lenient_string, ResponseShape};
use crate::domain::{FundamentalRecord, Symbol};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Symbols per fundamentals request.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Pause between consecutive fundamentals requests.
pub const DEFAULT_PACING: Duration = Duration::from_millis(500);

/// What to do when a single chunk request fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkFailurePolicy {
    /// Log the failure; the chunk contributes no records and later chunks still run.
    #[default]
    Isolate,
    /// Stop at the first failed chunk and fail the whole download.
    Abort,
}

/// A chunk request failed under [`ChunkFailurePolicy::Abort`], or the
/// session was rejected under either policy.
#[derive(Debug, Error)]
#[error("fundamentals chunk {chunk}/{total} failed: {source}")]
pub struct ChunkError {
    /// One-based chunk number.
    pub chunk: usize,
    pub total: usize,
    #[source]
    pub source: ProviderError,
}

/// How one chunk request ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkOutcome {
    Fetched { records: usize },
    /// The response was neither a list nor a `results` envelope.
    Unrecognized,
    Failed { error: String },
}

/// Per-chunk bookkeeping for the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkStats {
    /// One-based chunk number.
    pub chunk: usize,
    pub requested: usize,
    pub outcome: ChunkOutcome,
}

/// Aggregated fundamentals plus per-chunk statistics.
#[derive(Debug, Clone, Default)]
pub struct FundamentalsBatch {
    pub records: Vec<FundamentalRecord>,
    pub chunks: Vec<ChunkStats>,
}

impl FundamentalsBatch {
    pub fn failed_chunks(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| matches!(c.outcome, ChunkOutcome::Failed { .. }))
            .count()
    }
}

#[derive(Debug, Deserialize)]
struct RawFundamental {
    #[serde(default, deserialize_with = "lenient_string")]
    symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    market_cap: Option<String>,
}

impl From<RawFundamental> for FundamentalRecord {
    fn from(raw: RawFundamental) -> Self {
        FundamentalRecord {
            symbol: raw.symbol.as_deref().and_then(Symbol::parse),
            name: raw.name.filter(|n| !n.trim().is_empty()),
            market_cap: raw.market_cap,
        }
    }
}

/// Parse the records of one normalized chunk. `null` and non-object entries are skipped.
pub fn parse_fundamentals(items: Vec<Value>) -> Vec<FundamentalRecord> {
    items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value::<RawFundamental>(item).ok())
        .map(FundamentalRecord::from)
        .collect()
}

/// Sequential, paced fundamentals downloader.
pub struct FundamentalsBatcher<'a> {
    provider: &'a dyn MarketDataProvider,
    chunk_size: NonZeroUsize,
    pacing: Duration,
    on_failure: ChunkFailurePolicy,
}

impl<'a> FundamentalsBatcher<'a> {
    pub fn new(provider: &'a dyn MarketDataProvider, chunk_size: NonZeroUsize) -> Self {
        Self {
            provider,
            chunk_size,
            pacing: DEFAULT_PACING,
            on_failure: ChunkFailurePolicy::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_failure_policy(mut self, policy: ChunkFailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    /// Download fundamentals for every symbol.
    ///
    /// Fails on the first failed chunk under [`ChunkFailurePolicy::Abort`].
    /// A rejected session ends the download under either policy.
    pub fn fetch(&self, symbols: &[Symbol]) -> Result<FundamentalsBatch, ChunkError> {
        let chunks: Vec<&[Symbol]> = symbols.chunks(self.chunk_size.get()).collect();
        let total = chunks.len();
        let mut batch = FundamentalsBatch::default();

        info!(
            "fetching fundamentals for {} symbols in {total} batch(es) of up to {}",
            symbols.len(),
            self.chunk_size
        );

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                std::thread::sleep(self.pacing);
            }
            info!("processing batch {}/{total} ({} tickers)", i + 1, chunk.len());

            let outcome = match self.provider.fundamentals(chunk) {
                Ok(payload) => match ResponseShape::classify(payload).into_records() {
                    Some(items) => {
                        let records = parse_fundamentals(items);
                        debug!("batch {}/{total}: {} records", i + 1, records.len());
                        let count = records.len();
                        batch.records.extend(records);
                        ChunkOutcome::Fetched { records: count }
                    }
                    None => {
                        warn!("batch {}/{total}: unrecognized response shape, skipped", i + 1);
                        ChunkOutcome::Unrecognized
                    }
                },
                Err(source) if source.is_session_failure() => {
                    warn!("batch {}/{total}: session rejected, stopping: {source}", i + 1);
                    return Err(ChunkError {
                        chunk: i + 1,
                        total,
                        source,
                    });
                }
                Err(source) => match self.on_failure {
                    ChunkFailurePolicy::Abort => {
                        return Err(ChunkError {
                            chunk: i + 1,
                            total,
                            source,
                        });
                    }
                    ChunkFailurePolicy::Isolate => {
                        warn!("batch {}/{total} failed, continuing without it: {source}", i + 1);
                        ChunkOutcome::Failed {
                            error: source.to_string(),
                        }
                    }
                },
            };

            batch.chunks.push(ChunkStats {
                chunk: i + 1,
                requested: chunk.len(),
                outcome,
            });
        }

        info!(
            "finished fetching fundamentals: {} records, {} failed batch(es)",
            batch.records.len(),
            batch.failed_chunks()
        );
        Ok(batch)
    }
}
