//! Market-data provider traits and structured error types.
//!
//! The traits abstract over the brokerage (Robinhood over HTTP, or a JSON
//! fixture) so the fetch stages can be driven by either and mocked in tests.
//! Payloads for the watchlist and fundamentals stay raw JSON at this boundary:
//! the provider may answer with a bare list or a `{"results": [...]}` envelope,
//! and each fetch stage normalizes the shape itself.

use crate::domain::Symbol;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Structured error types for provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("HTTP {status} from {endpoint}")]
    Http { status: u16, endpoint: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("no active session: log in before requesting market data")]
    NotLoggedIn,

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// The session was rejected or is missing; retrying other requests cannot help.
    pub fn is_session_failure(&self) -> bool {
        matches!(self, ProviderError::Auth(_) | ProviderError::NotLoggedIn)
    }
}

/// Login credentials for the provider.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// One-time code for accounts with two-factor authentication.
    pub mfa_code: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            mfa_code: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mfa_code", &self.mfa_code.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// An authenticated session as reported by the provider.
#[derive(Clone)]
pub struct Session {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: Option<u64>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Session lifecycle against the provider.
///
/// Implementations keep the active token internally; market-data calls made
/// through the same provider value use it.
pub trait SessionProvider: Send + Sync {
    /// Establish a session. Any failure is an authentication failure for the run.
    fn login(&self, credentials: &Credentials) -> Result<Session, ProviderError>;

    /// Revoke the active session. Logging out without a session is a no-op.
    fn logout(&self) -> Result<(), ProviderError>;
}

/// Symbol-keyed market-data queries.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Instruments of the named watchlist: a list or a `results` envelope.
    fn watchlist(&self, name: &str) -> Result<Value, ProviderError>;

    /// Fundamentals for one chunk of symbols: a list or a `results` envelope.
    fn fundamentals(&self, symbols: &[Symbol]) -> Result<Value, ProviderError>;

    /// Latest trade price per symbol, positionally matched to `symbols`.
    /// The list may be shorter than the input; `None` marks a missing quote.
    fn latest_prices(&self, symbols: &[Symbol]) -> Result<Vec<Option<String>>, ProviderError>;
}
