//! Robinhood market-data provider.
//!
//! Talks to the unofficial Robinhood REST API over blocking HTTP: OAuth2
//! password-grant login and token revocation, watchlists ("midlands" lists),
//! fundamentals and quotes. The API is undocumented and may change without
//! notice; every response is validated at the shape level before use.

use super::provider::{
    Credentials, MarketDataProvider, ProviderError, Session, SessionProvider,
};
use super::shape::{normalize, ResponseShape};
use crate::domain::Symbol;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.robinhood.com";

/// Public OAuth client id used by Robinhood's web and mobile apps.
const CLIENT_ID: &str = "c82SH0WZOsabOXGP2sxqcj34FxkvfnWRZBKlBjFS";

/// Session lifetime requested at login, in seconds.
const TOKEN_LIFETIME_SECS: u64 = 86_400;

/// Upper bound on watchlist pages followed through `next` links.
const MAX_WATCHLIST_PAGES: usize = 50;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    detail: Option<String>,
    mfa_required: Option<bool>,
}

/// Robinhood REST client.
pub struct RobinhoodClient {
    client: Client,
    base_url: Url,
    token: Mutex<Option<String>>,
}

impl RobinhoodClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ProviderError::Other(format!("invalid base URL '{base_url}': {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("watchsheet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token: Mutex::new(None),
        })
    }

    fn token_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::Other(format!("invalid endpoint '{path}': {e}")))
    }

    /// Endpoint with a comma-joined `symbols` query parameter.
    fn symbols_endpoint(&self, path: &str, symbols: &[Symbol]) -> Result<Url, ProviderError> {
        let joined = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut().append_pair("symbols", &joined);
        Ok(url)
    }

    /// Stable per-user device id, formatted like a UUID.
    fn device_token(username: &str) -> String {
        let hex = blake3::hash(username.as_bytes()).to_hex();
        let h = hex.as_str();
        format!("{}-{}-{}-{}-{}", &h[0..8], &h[8..12], &h[12..16], &h[16..20], &h[20..32])
    }

    /// Authorized GET returning the decoded JSON body.
    fn get_json(&self, url: Url) -> Result<Value, ProviderError> {
        let token = self.token_slot().clone().ok_or(ProviderError::NotLoggedIn)?;
        debug!("GET {url}");
        let resp = self
            .client
            .get(url.clone())
            .bearer_auth(token)
            .send()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Self::decode(url.path(), resp)
    }

    fn decode(endpoint: &str, resp: Response) -> Result<Value, ProviderError> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ProviderError::Auth(format!("HTTP {status} from {endpoint}")));
        }
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
            });
        }
        resp.json::<Value>()
            .map_err(|e| ProviderError::ResponseFormat(format!("{endpoint}: {e}")))
    }

    fn find_list_id(lists: Value, name: &str) -> Option<String> {
        normalize(lists)?
            .into_iter()
            .find(|list| list.get("display_name").and_then(Value::as_str) == Some(name))
            .and_then(|list| list.get("id").and_then(Value::as_str).map(str::to_string))
    }
}

/// The API omits `symbol` from fundamentals records; restore it positionally.
fn attach_symbols(payload: &mut Value, symbols: &[Symbol]) {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(map) => match map.get_mut("results") {
            Some(Value::Array(items)) => items,
            _ => return,
        },
        _ => return,
    };
    for (item, symbol) in items.iter_mut().zip(symbols) {
        if let Value::Object(record) = item {
            record
                .entry("symbol")
                .or_insert_with(|| Value::String(symbol.to_string()));
        }
    }
}

/// Extended-hours price when the quote has one, else the regular last trade.
fn quote_price(quote: &Value) -> Option<String> {
    let field = |key: &str| {
        quote
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };
    field("last_extended_hours_trade_price").or_else(|| field("last_trade_price"))
}

impl SessionProvider for RobinhoodClient {
    fn login(&self, credentials: &Credentials) -> Result<Session, ProviderError> {
        let url = self.endpoint("/oauth2/token/")?;
        let mut form: Vec<(&str, String)> = vec![
            ("client_id", CLIENT_ID.to_string()),
            ("expires_in", TOKEN_LIFETIME_SECS.to_string()),
            ("grant_type", "password".to_string()),
            ("scope", "internal".to_string()),
            ("username", credentials.username.clone()),
            ("password", credentials.password.clone()),
            ("device_token", Self::device_token(&credentials.username)),
        ];
        if let Some(code) = &credentials.mfa_code {
            form.push(("mfa_code", code.clone()));
        }

        info!("logging in to Robinhood as {}", credentials.username);
        let resp = self
            .client
            .post(url)
            .form(&form)
            .send()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let parsed: Option<TokenResponse> = serde_json::from_str(&body).ok();

        match parsed {
            Some(TokenResponse {
                access_token: Some(access_token),
                token_type,
                expires_in,
                ..
            }) if status.is_success() => {
                *self.token_slot() = Some(access_token.clone());
                Ok(Session {
                    access_token,
                    token_type: token_type.unwrap_or_else(|| "Bearer".into()),
                    expires_in,
                })
            }
            Some(TokenResponse {
                mfa_required: Some(true),
                ..
            }) => Err(ProviderError::Auth(
                "multi-factor code required (set ROBINHOOD_MFA_CODE)".into(),
            )),
            Some(TokenResponse {
                detail: Some(detail),
                ..
            }) => Err(ProviderError::Auth(format!("HTTP {status}: {detail}"))),
            _ => Err(ProviderError::Auth(format!(
                "HTTP {status}: response carried no access token"
            ))),
        }
    }

    fn logout(&self) -> Result<(), ProviderError> {
        let Some(token) = self.token_slot().take() else {
            return Ok(());
        };
        let url = self.endpoint("/oauth2/revoke_token/")?;
        let resp = self
            .client
            .post(url.clone())
            .form(&[("client_id", CLIENT_ID), ("token", token.as_str())])
            .send()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                endpoint: url.path().to_string(),
            });
        }
        info!("logged out of Robinhood session");
        Ok(())
    }
}

impl MarketDataProvider for RobinhoodClient {
    fn name(&self) -> &str {
        "robinhood"
    }

    fn watchlist(&self, name: &str) -> Result<Value, ProviderError> {
        let lists = self.get_json(self.endpoint("/midlands/lists/default/")?)?;
        let Some(list_id) = Self::find_list_id(lists, name) else {
            warn!("no watchlist named '{name}' on this account");
            return Ok(json!({ "results": [] }));
        };

        let mut first = self.endpoint("/midlands/lists/items/")?;
        first.query_pairs_mut().append_pair("list_id", &list_id);

        let mut items = Vec::new();
        let mut next = Some(first);
        let mut pages = 0;
        while let Some(page_url) = next.take() {
            pages += 1;
            if pages > MAX_WATCHLIST_PAGES {
                warn!("watchlist '{name}' exceeds {MAX_WATCHLIST_PAGES} pages; truncating");
                break;
            }
            let page = self.get_json(page_url)?;
            next = match page.get("next").and_then(Value::as_str) {
                Some(link) => Some(Url::parse(link).map_err(|e| {
                    ProviderError::ResponseFormat(format!("invalid pagination link '{link}': {e}"))
                })?),
                None => None,
            };
            match ResponseShape::classify(page).into_records() {
                Some(records) => items.extend(records),
                None => {
                    return Err(ProviderError::ResponseFormat(
                        "watchlist items page has no results".into(),
                    ))
                }
            }
        }

        Ok(json!({ "results": items }))
    }

    fn fundamentals(&self, symbols: &[Symbol]) -> Result<Value, ProviderError> {
        let mut payload = self.get_json(self.symbols_endpoint("/fundamentals/", symbols)?)?;
        attach_symbols(&mut payload, symbols);
        Ok(payload)
    }

    fn latest_prices(&self, symbols: &[Symbol]) -> Result<Vec<Option<String>>, ProviderError> {
        let payload = self.get_json(self.symbols_endpoint("/quotes/", symbols)?)?;
        let quotes = normalize(payload).ok_or_else(|| {
            ProviderError::ResponseFormat("quotes response has no results".into())
        })?;
        Ok(quotes.iter().map(quote_price).collect())
    }
}
