//! watchsheet core: domain types, provider traits, fetch stages and formatting.
//!
//! This crate holds everything that talks to the market-data provider:
//! - Domain types (symbols, watchlist entries, fundamentals, output rows, table)
//! - Numeric normalization (market-cap magnitudes, prices)
//! - Provider traits with a Robinhood HTTP implementation and a JSON fixture
//! - Watchlist loading, best-effort price lookup, chunked fundamentals download

pub mod data;
pub mod domain;
pub mod format;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types handed between stages are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Table>();
        require_sync::<domain::Table>();
        require_send::<domain::FundamentalRecord>();
        require_sync::<domain::FundamentalRecord>();
        require_send::<data::PriceMap>();
        require_sync::<data::PriceMap>();
        require_send::<data::Watchlist>();
        require_sync::<data::Watchlist>();
        require_send::<data::FundamentalsBatch>();
        require_sync::<data::FundamentalsBatch>();
        require_send::<data::RobinhoodClient>();
        require_sync::<data::RobinhoodClient>();
        require_send::<data::FixtureProvider>();
        require_sync::<data::FixtureProvider>();
    }

    /// The provider traits stay object safe: the stages take `&dyn` providers.
    #[test]
    fn provider_traits_are_object_safe() {
        fn _takes_dyn(
            _market: &dyn data::MarketDataProvider,
            _session: &dyn data::SessionProvider,
        ) {
        }
    }
}
