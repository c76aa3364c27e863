//! In-memory provider backed by a JSON fixture.
//!
//! Serves a canned watchlist, fundamentals and prices without network access.
//! Used for offline dry runs (`watchsheet run --fixture`) and as the test
//! double for every fetch stage: it records each request it receives and can
//! be told to fail specific calls.
//!
//! Fixture file layout:
//!
//! ```json
//! {
//!   "watchlist": {"results": [{"symbol": "AAPL", "name": "Apple"}]},
//!   "fundamentals": {"AAPL": {"market_cap": "4440000000000.00"}},
//!   "prices": {"AAPL": "150.00"},
//!   "fundamentals_shape": "envelope"
//! }
//! ```

use super::provider::{Credentials, MarketDataProvider, ProviderError, Session, SessionProvider};
use crate::domain::Symbol;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// How fundamentals chunks are wrapped in responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureShape {
    /// `{"results": [...]}`, as the live API answers.
    #[default]
    Envelope,
    /// A bare array.
    List,
}

/// Canned provider data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    /// Raw watchlist payload, served verbatim.
    #[serde(default)]
    pub watchlist: Value,
    /// Fundamentals record per symbol. Symbols without an entry answer `null`.
    #[serde(default)]
    pub fundamentals: BTreeMap<String, Value>,
    /// Raw price string per symbol.
    #[serde(default)]
    pub prices: BTreeMap<String, String>,
    #[serde(default)]
    pub fundamentals_shape: FixtureShape,
}

/// Requests received so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallLog {
    pub logins: usize,
    pub logouts: usize,
    pub watchlist_requests: usize,
    pub price_requests: usize,
    /// Symbols of each fundamentals request, in request order.
    pub fundamentals_chunks: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
struct FailurePlan {
    login: bool,
    logout: bool,
    watchlist: bool,
    prices: bool,
    session_expired: bool,
    chunks: BTreeSet<usize>,
    malformed_chunks: BTreeSet<usize>,
}

/// Provider serving a [`Fixture`].
#[derive(Debug)]
pub struct FixtureProvider {
    fixture: Fixture,
    failures: FailurePlan,
    calls: Mutex<CallLog>,
}

impl FixtureProvider {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture,
            failures: FailurePlan::default(),
            calls: Mutex::new(CallLog::default()),
        }
    }

    /// Build from an already-parsed JSON document.
    pub fn from_json_value(value: Value) -> Result<Self, ProviderError> {
        let fixture: Fixture = serde_json::from_value(value)
            .map_err(|e| ProviderError::ResponseFormat(format!("invalid fixture: {e}")))?;
        Ok(Self::new(fixture))
    }

    /// Load a fixture file.
    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::Other(format!("read fixture {}: {e}", path.display())))?;
        let fixture: Fixture = serde_json::from_str(&content).map_err(|e| {
            ProviderError::ResponseFormat(format!("parse fixture {}: {e}", path.display()))
        })?;
        Ok(Self::new(fixture))
    }

    pub fn failing_login(mut self) -> Self {
        self.failures.login = true;
        self
    }

    pub fn failing_logout(mut self) -> Self {
        self.failures.logout = true;
        self
    }

    pub fn failing_watchlist(mut self) -> Self {
        self.failures.watchlist = true;
        self
    }

    pub fn failing_prices(mut self) -> Self {
        self.failures.prices = true;
        self
    }

    /// Accept login, then reject price and fundamentals requests as unauthorized.
    pub fn expiring_session(mut self) -> Self {
        self.failures.session_expired = true;
        self
    }

    /// Make the fundamentals request with this zero-based index fail.
    pub fn failing_chunk(mut self, index: usize) -> Self {
        self.failures.chunks.insert(index);
        self
    }

    /// Make the fundamentals request with this index answer an unrecognized shape.
    pub fn malformed_chunk(mut self, index: usize) -> Self {
        self.failures.malformed_chunks.insert(index);
        self
    }

    /// Snapshot of the requests received so far.
    pub fn calls(&self) -> CallLog {
        self.log().clone()
    }

    fn log(&self) -> MutexGuard<'_, CallLog> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fundamentals_record(&self, symbol: &Symbol) -> Value {
        match self.fixture.fundamentals.get(symbol.as_str()) {
            Some(Value::Object(map)) => {
                let mut map = map.clone();
                map.entry("symbol")
                    .or_insert_with(|| Value::String(symbol.to_string()));
                Value::Object(map)
            }
            Some(other) => other.clone(),
            None => Value::Null,
        }
    }
}

impl SessionProvider for FixtureProvider {
    fn login(&self, _credentials: &Credentials) -> Result<Session, ProviderError> {
        self.log().logins += 1;
        if self.failures.login {
            return Err(ProviderError::Auth("fixture rejects login".into()));
        }
        Ok(Session {
            access_token: "fixture-token".into(),
            token_type: "Bearer".into(),
            expires_in: None,
        })
    }

    fn logout(&self) -> Result<(), ProviderError> {
        self.log().logouts += 1;
        if self.failures.logout {
            return Err(ProviderError::Network("fixture logout unreachable".into()));
        }
        Ok(())
    }
}

impl MarketDataProvider for FixtureProvider {
    fn name(&self) -> &str {
        "fixture"
    }

    fn watchlist(&self, _name: &str) -> Result<Value, ProviderError> {
        self.log().watchlist_requests += 1;
        if self.failures.watchlist {
            return Err(ProviderError::Network("fixture watchlist unreachable".into()));
        }
        Ok(self.fixture.watchlist.clone())
    }

    fn fundamentals(&self, symbols: &[Symbol]) -> Result<Value, ProviderError> {
        let index = {
            let mut log = self.log();
            log.fundamentals_chunks
                .push(symbols.iter().map(|s| s.to_string()).collect());
            log.fundamentals_chunks.len() - 1
        };

        if self.failures.session_expired {
            return Err(ProviderError::Auth("fixture session expired".into()));
        }
        if self.failures.chunks.contains(&index) {
            return Err(ProviderError::Network(format!(
                "fixture fundamentals request {index} unreachable"
            )));
        }
        if self.failures.malformed_chunks.contains(&index) {
            return Ok(json!({ "detail": "fixture malformed response" }));
        }

        let records: Vec<Value> = symbols.iter().map(|s| self.fundamentals_record(s)).collect();
        Ok(match self.fixture.fundamentals_shape {
            FixtureShape::Envelope => json!({ "results": records }),
            FixtureShape::List => Value::Array(records),
        })
    }

    fn latest_prices(&self, symbols: &[Symbol]) -> Result<Vec<Option<String>>, ProviderError> {
        self.log().price_requests += 1;
        if self.failures.session_expired {
            return Err(ProviderError::Auth("fixture session expired".into()));
        }
        if self.failures.prices {
            return Err(ProviderError::Network("fixture quotes unreachable".into()));
        }
        Ok(symbols
            .iter()
            .map(|s| self.fixture.prices.get(s.as_str()).cloned())
            .collect())
    }
}
