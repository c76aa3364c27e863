//! Best-effort latest-price lookup.
//!
//! The result is total over the requested symbols: every symbol maps to a
//! formatted price or to `N/A`, whatever the provider did.

use super::provider::MarketDataProvider;
use crate::domain::{Symbol, NOT_AVAILABLE};
use crate::format::format_price;
use std::collections::HashMap;
use tracing::{info, warn};

/// Symbol → formatted price (`$187.23`) or `N/A`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceMap {
    prices: HashMap<Symbol, String>,
    hits: usize,
}

impl PriceMap {
    /// Formatted price for a symbol, if the symbol was requested.
    pub fn get(&self, symbol: &str) -> Option<&str> {
        self.prices.get(symbol).map(String::as_str)
    }

    /// Number of symbols with a parsed price.
    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.prices.keys()
    }

    fn all_unavailable(symbols: &[Symbol]) -> Self {
        symbols.iter().cloned().map(|s| (s, NOT_AVAILABLE.to_string())).collect()
    }
}

impl FromIterator<(Symbol, String)> for PriceMap {
    fn from_iter<I: IntoIterator<Item = (Symbol, String)>>(iter: I) -> Self {
        let prices: HashMap<Symbol, String> = iter.into_iter().collect();
        let hits = prices.values().filter(|p| p.as_str() != NOT_AVAILABLE).count();
        Self { prices, hits }
    }
}

/// Fetches latest prices for a symbol set in a single provider call.
pub struct PriceFetcher<'a> {
    provider: &'a dyn MarketDataProvider,
}

impl<'a> PriceFetcher<'a> {
    pub fn new(provider: &'a dyn MarketDataProvider) -> Self {
        Self { provider }
    }

    /// Never fails. A provider error degrades every symbol to `N/A`; a short
    /// or partially unparseable answer degrades only the affected symbols.
    pub fn fetch(&self, symbols: &[Symbol]) -> PriceMap {
        if symbols.is_empty() {
            return PriceMap::default();
        }

        let quotes = match self.provider.latest_prices(symbols) {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!("failed to fetch latest prices from {}: {e}", self.provider.name());
                return PriceMap::all_unavailable(symbols);
            }
        };

        if quotes.len() != symbols.len() {
            warn!(
                "provider returned {} quotes for {} symbols; unmatched symbols get {NOT_AVAILABLE}",
                quotes.len(),
                symbols.len()
            );
        }

        let map: PriceMap = symbols
            .iter()
            .enumerate()
            .map(|(i, symbol)| {
                let raw = quotes.get(i).and_then(|q| q.as_deref());
                let price = format_price(raw).unwrap_or_else(|| NOT_AVAILABLE.to_string());
                (symbol.clone(), price)
            })
            .collect();

        info!("fetched latest prices for {} of {} symbols", map.hits(), symbols.len());
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixture::{Fixture, FixtureProvider};
    use crate::data::provider::ProviderError;
    use serde_json::{json, Value};

    fn symbols(list: &[&str]) -> Vec<Symbol> {
        list.iter().map(|s| Symbol::parse(s).unwrap()).collect()
    }

    /// Answers a fixed quote list regardless of the request.
    struct CannedQuotes(Vec<Option<String>>);

    impl MarketDataProvider for CannedQuotes {
        fn name(&self) -> &str {
            "canned"
        }
        fn watchlist(&self, _name: &str) -> Result<Value, ProviderError> {
            Ok(Value::Null)
        }
        fn fundamentals(&self, _symbols: &[Symbol]) -> Result<Value, ProviderError> {
            Ok(Value::Null)
        }
        fn latest_prices(&self, _symbols: &[Symbol]) -> Result<Vec<Option<String>>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn empty_input_makes_no_call() {
        let provider = FixtureProvider::new(Fixture::default());
        let map = PriceFetcher::new(&provider).fetch(&[]);
        assert!(map.is_empty());
        assert_eq!(provider.calls().price_requests, 0);
    }

    #[test]
    fn provider_failure_maps_every_symbol_to_sentinel() {
        let provider = FixtureProvider::new(Fixture::default()).failing_prices();
        let input = symbols(&["AAPL", "TSLA", "MSFT"]);
        let map = PriceFetcher::new(&provider).fetch(&input);

        assert_eq!(map.len(), 3);
        for s in &input {
            assert_eq!(map.get(s.as_str()), Some("N/A"));
        }
        assert_eq!(map.hits(), 0);
    }

    #[test]
    fn prices_are_matched_positionally_and_formatted() {
        let provider = FixtureProvider::from_json_value(json!({
            "prices": {"AAPL": "150", "TSLA": "not-a-number"},
        }))
        .unwrap();
        let map = PriceFetcher::new(&provider).fetch(&symbols(&["AAPL", "TSLA", "MSFT"]));

        assert_eq!(map.get("AAPL"), Some("$150.00"));
        assert_eq!(map.get("TSLA"), Some("N/A"));
        assert_eq!(map.get("MSFT"), Some("N/A"));
        assert_eq!(map.hits(), 1);
    }

    #[test]
    fn short_quote_list_still_covers_every_symbol() {
        let provider = CannedQuotes(vec![Some("10.5".into())]);
        let map = PriceFetcher::new(&provider).fetch(&symbols(&["A", "B", "C"]));

        assert_eq!(map.len(), 3);
        assert_eq!(map.get("A"), Some("$10.50"));
        assert_eq!(map.get("B"), Some("N/A"));
        assert_eq!(map.get("C"), Some("N/A"));
    }

    #[test]
    fn long_quote_list_ignores_extra_entries() {
        let provider = CannedQuotes(vec![Some("1".into()), Some("2".into()), Some("3".into())]);
        let map = PriceFetcher::new(&provider).fetch(&symbols(&["A"]));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("A"), Some("$1.00"));
    }

    #[test]
    fn from_iter_counts_hits() {
        let map: PriceMap = vec![
            (Symbol::parse("A").unwrap(), "$1.00".to_string()),
            (Symbol::parse("B").unwrap(), "N/A".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(map.hits(), 1);
    }
}
