//! Merge pipeline: watchlist → prices → fundamentals → output rows.

use std::num::NonZeroUsize;
use std::time::Duration;

use thiserror::Error;
use tracing::info;
use watchsheet_core::data::{
    ChunkError, ChunkFailurePolicy, ChunkStats, FundamentalsBatcher, MarketDataProvider,
    PriceFetcher, PriceMap, ProviderError, Watchlist, WatchlistError, WatchlistLoader,
    DEFAULT_CHUNK_SIZE, DEFAULT_PACING,
};
use watchsheet_core::domain::{FundamentalRecord, OutputRow, Table, NOT_AVAILABLE};
use watchsheet_core::format::format_magnitude;

use crate::config::ConfigError;

/// Terminal failures of a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("session error: {0}")]
    Auth(#[source] ProviderError),

    #[error("watchlist '{name}' is empty or returned no valid symbols")]
    EmptyWatchlist { name: String },

    #[error("fetch failed: {0}")]
    Fetch(#[source] ChunkError),

    #[error("no rows produced for {symbols} watchlist symbol(s); nothing to publish")]
    EmptyResult { symbols: usize },

    #[error("provider error: {0}")]
    Provider(#[source] ProviderError),
}

impl RunError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Config(_) => 2,
            RunError::Auth(_) => 3,
            RunError::EmptyWatchlist { .. } => 4,
            RunError::EmptyResult { .. } => 5,
            RunError::Fetch(_) | RunError::Provider(_) => 1,
        }
    }
}

impl From<ProviderError> for RunError {
    fn from(e: ProviderError) -> Self {
        if e.is_session_failure() {
            RunError::Auth(e)
        } else {
            RunError::Provider(e)
        }
    }
}

impl From<ChunkError> for RunError {
    fn from(e: ChunkError) -> Self {
        if e.source.is_session_failure() {
            RunError::Auth(e.source)
        } else {
            RunError::Fetch(e)
        }
    }
}

impl From<WatchlistError> for RunError {
    fn from(e: WatchlistError) -> Self {
        match e {
            WatchlistError::Empty { name } => RunError::EmptyWatchlist { name },
            WatchlistError::Provider(source) => source.into(),
        }
    }
}

/// Knobs for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub watchlist: String,
    pub chunk_size: NonZeroUsize,
    pub pacing: Duration,
    pub on_chunk_failure: ChunkFailurePolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            watchlist: "24 Hour Market".to_string(),
            chunk_size: NonZeroUsize::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN),
            pacing: DEFAULT_PACING,
            on_chunk_failure: ChunkFailurePolicy::default(),
        }
    }
}

/// Rows plus the statistics the run report needs.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub watchlist_size: usize,
    pub prices_found: usize,
    pub chunks: Vec<ChunkStats>,
    pub table: Table,
}

/// Join fundamentals with watchlist names and prices.
///
/// One row per fundamentals record, in record order. Watchlist symbols
/// without a fundamentals record produce no row.
pub fn merge_rows(
    records: &[FundamentalRecord],
    watchlist: &Watchlist,
    prices: &PriceMap,
) -> Vec<OutputRow> {
    records
        .iter()
        .map(|record| {
            let symbol = record.symbol.as_ref().map(|s| s.as_str());
            let name = symbol
                .and_then(|s| watchlist.display_name(s))
                .or(record.name.as_deref())
                .unwrap_or(NOT_AVAILABLE);
            let price = symbol
                .and_then(|s| prices.get(s))
                .unwrap_or(NOT_AVAILABLE);
            let (marketcap_value, unit) = format_magnitude(record.market_cap.as_deref()).into_parts();

            OutputRow {
                name: name.to_string(),
                symbol: symbol.unwrap_or(NOT_AVAILABLE).to_string(),
                price: price.to_string(),
                marketcap_value,
                marketcap_unit: unit.to_string(),
            }
        })
        .collect()
}

/// Composes the fetch stages into one row set.
pub struct MergePipeline<'a> {
    provider: &'a dyn MarketDataProvider,
    options: PipelineOptions,
}

impl<'a> MergePipeline<'a> {
    pub fn new(provider: &'a dyn MarketDataProvider, options: PipelineOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn run(&self) -> Result<PipelineOutput, RunError> {
        let watchlist = WatchlistLoader::new(self.provider).load(&self.options.watchlist)?;

        let prices = PriceFetcher::new(self.provider).fetch(watchlist.symbols());

        let batch = FundamentalsBatcher::new(self.provider, self.options.chunk_size)
            .with_pacing(self.options.pacing)
            .with_failure_policy(self.options.on_chunk_failure)
            .fetch(watchlist.symbols())?;

        let rows = merge_rows(&batch.records, &watchlist, &prices);
        if rows.is_empty() {
            return Err(RunError::EmptyResult {
                symbols: watchlist.len(),
            });
        }
        info!("merged {} rows from {} watchlist symbols", rows.len(), watchlist.len());

        Ok(PipelineOutput {
            watchlist_size: watchlist.len(),
            prices_found: prices.hits(),
            chunks: batch.chunks,
            table: Table::new(rows),
        })
    }
}
