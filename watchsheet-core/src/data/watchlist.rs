//! Watchlist retrieval and symbol extraction.

use super::provider::{MarketDataProvider, ProviderError};
use super::shape::{lenient_string, normalize};
use crate::domain::{Symbol, WatchlistEntry};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("watchlist '{name}' is empty or returned no valid symbols")]
    Empty { name: String },

    #[error("failed to load watchlist: {0}")]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Deserialize)]
struct RawInstrument {
    #[serde(default, deserialize_with = "lenient_string")]
    symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
}

/// Deduplicated watchlist: symbols in first-seen order plus a name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watchlist {
    name: String,
    symbols: Vec<Symbol>,
    names: HashMap<Symbol, Option<String>>,
}

impl Watchlist {
    /// Build from entries. A repeated symbol keeps its first position but takes
    /// the name of its last occurrence.
    pub fn from_entries(
        name: &str,
        entries: impl IntoIterator<Item = WatchlistEntry>,
    ) -> Result<Self, WatchlistError> {
        let mut symbols = Vec::new();
        let mut names: HashMap<Symbol, Option<String>> = HashMap::new();

        for entry in entries {
            if !names.contains_key(&entry.symbol) {
                symbols.push(entry.symbol.clone());
            }
            names.insert(entry.symbol, entry.name);
        }

        if symbols.is_empty() {
            return Err(WatchlistError::Empty {
                name: name.to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            symbols,
            names,
        })
    }

    /// Build from a raw provider payload (list or `results` envelope).
    /// Records without a symbol are dropped.
    pub fn from_payload(name: &str, payload: Value) -> Result<Self, WatchlistError> {
        let items = normalize(payload).unwrap_or_default();
        let entries = items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value::<RawInstrument>(item).ok())
            .filter_map(|raw| {
                let symbol = Symbol::parse(raw.symbol.as_deref()?)?;
                Some(WatchlistEntry {
                    symbol,
                    name: raw.name.filter(|n| !n.trim().is_empty()),
                })
            });
        Self::from_entries(name, entries)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique symbols in first-seen order.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Display name recorded for a symbol, if any.
    pub fn display_name(&self, symbol: &str) -> Option<&str> {
        self.names.get(symbol).and_then(|n| n.as_deref())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Loads a named watchlist from the provider.
pub struct WatchlistLoader<'a> {
    provider: &'a dyn MarketDataProvider,
}

impl<'a> WatchlistLoader<'a> {
    pub fn new(provider: &'a dyn MarketDataProvider) -> Self {
        Self { provider }
    }

    pub fn load(&self, name: &str) -> Result<Watchlist, WatchlistError> {
        let payload = self.provider.watchlist(name)?;
        let watchlist = Watchlist::from_payload(name, payload)?;
        info!(
            "retrieved {} unique ticker symbols from watchlist '{name}'",
            watchlist.len()
        );
        Ok(watchlist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixture::FixtureProvider;
    use serde_json::json;

    fn loaded(watchlist: Value) -> Result<Watchlist, WatchlistError> {
        let provider = FixtureProvider::from_json_value(json!({ "watchlist": watchlist })).unwrap();
        WatchlistLoader::new(&provider).load("24 Hour Market")
    }

    #[test]
    fn envelope_and_list_are_equivalent() {
        let items = json!([{"symbol": "AAPL", "name": "Apple"}, {"symbol": "TSLA", "name": "Tesla"}]);
        let from_list = loaded(items.clone()).unwrap();
        let from_envelope = loaded(json!({ "results": items })).unwrap();
        assert_eq!(from_list, from_envelope);
        assert_eq!(from_list.symbols().len(), 2);
    }

    #[test]
    fn records_without_symbol_are_dropped() {
        let wl = loaded(json!([
            {"name": "No Symbol"},
            {"symbol": "", "name": "Blank"},
            {"symbol": null},
            "not an object",
            {"symbol": "MSFT", "name": "Microsoft"},
        ]))
        .unwrap();
        let syms: Vec<&str> = wl.symbols().iter().map(Symbol::as_str).collect();
        assert_eq!(syms, vec!["MSFT"]);
    }

    #[test]
    fn duplicates_keep_first_position_and_last_name() {
        let wl = loaded(json!([
            {"symbol": "AAPL", "name": "Apple Old"},
            {"symbol": "TSLA", "name": "Tesla"},
            {"symbol": "AAPL", "name": "Apple Inc."},
        ]))
        .unwrap();
        let syms: Vec<&str> = wl.symbols().iter().map(Symbol::as_str).collect();
        assert_eq!(syms, vec!["AAPL", "TSLA"]);
        assert_eq!(wl.display_name("AAPL"), Some("Apple Inc."));
    }

    #[test]
    fn missing_name_is_none() {
        let wl = loaded(json!([{"symbol": "GME"}])).unwrap();
        assert_eq!(wl.display_name("GME"), None);
        assert_eq!(wl.display_name("UNKNOWN"), None);
    }

    #[test]
    fn empty_or_missing_watchlist_is_an_error() {
        for payload in [json!([]), json!({"results": []}), Value::Null, json!([{"name": "x"}])] {
            match loaded(payload) {
                Err(WatchlistError::Empty { name }) => assert_eq!(name, "24 Hour Market"),
                other => panic!("expected Empty error, got {other:?}"),
            }
        }
    }

    #[test]
    fn provider_failure_is_propagated() {
        let provider = FixtureProvider::from_json_value(json!({})).unwrap().failing_watchlist();
        let result = WatchlistLoader::new(&provider).load("x");
        assert!(matches!(result, Err(WatchlistError::Provider(_))));
    }
}
