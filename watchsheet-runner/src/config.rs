//! Run configuration: TOML file, environment overrides, validation.
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration apart from the credentials, which normally come from the
//! environment.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use watchsheet_core::data::robinhood::DEFAULT_BASE_URL;
use watchsheet_core::data::{ChunkFailurePolicy, Credentials, DEFAULT_CHUNK_SIZE};

use crate::pipeline::PipelineOptions;
use crate::publish::sheets::{ACCESS_TOKEN_ENV, DEFAULT_API_BASE};

pub const ENV_USERNAME: &str = "ROBINHOOD_USERNAME";
pub const ENV_PASSWORD: &str = "ROBINHOOD_PASSWORD";
pub const ENV_MFA_CODE: &str = "ROBINHOOD_MFA_CODE";
pub const ENV_SHEET_URL: &str = "WATCHSHEET_SHEET_URL";
pub const ENV_SHEETS_CREDENTIALS: &str = "GOOGLE_SHEETS_CREDENTIALS_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration, one section per concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub watchlist: WatchlistConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub sheet: SheetConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[provider]`: market-data account and HTTP settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_code: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            mfa_code: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("mfa_code", &self.mfa_code.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// `[watchlist]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistConfig {
    #[serde(default = "default_watchlist_name")]
    pub name: String,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            name: default_watchlist_name(),
        }
    }
}

/// `[batch]`: fundamentals chunking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Pause between consecutive chunk requests, in milliseconds.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default)]
    pub on_chunk_failure: ChunkFailurePolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            pacing_ms: default_pacing_ms(),
            on_chunk_failure: ChunkFailurePolicy::default(),
        }
    }
}

/// `[sheet]`: Google Sheets destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetConfig {
    /// Spreadsheet URL or bare spreadsheet id. No sheet publishing when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_worksheet")]
    pub worksheet: String,
    /// OAuth `authorized_user` credentials JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,
    /// Environment variable holding a ready-made access token.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            url: None,
            worksheet: default_worksheet(),
            credentials_path: None,
            access_token_env: default_access_token_env(),
            api_base: default_api_base(),
        }
    }
}

/// `[output]`: local artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    /// Rows shown in the logged preview before publishing.
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: None,
            report_path: None,
            preview_rows: default_preview_rows(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_watchlist_name() -> String {
    "24 Hour Market".to_string()
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_pacing_ms() -> u64 {
    500
}
fn default_worksheet() -> String {
    "24 Hour Market Data".to_string()
}
fn default_access_token_env() -> String {
    ACCESS_TOKEN_ENV.to_string()
}
fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_preview_rows() -> usize {
    5
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Like [`Config::from_file`], but a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Blank values are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_USERNAME) {
            self.provider.username = Some(v);
        }
        if let Some(v) = get(ENV_PASSWORD) {
            self.provider.password = Some(v);
        }
        if let Some(v) = get(ENV_MFA_CODE) {
            self.provider.mfa_code = Some(v);
        }
        if let Some(v) = get(ENV_SHEET_URL) {
            self.sheet.url = Some(v);
        }
        if let Some(v) = get(ENV_SHEETS_CREDENTIALS) {
            self.sheet.credentials_path = Some(PathBuf::from(v));
        }
    }

    /// Check value ranges. Credentials are checked separately by
    /// [`Config::credentials`] so that fixture runs need none.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.chunk_size == 0 {
            return Err(ConfigError::Invalid("batch.chunk_size must be at least 1".into()));
        }
        if self.watchlist.name.trim().is_empty() {
            return Err(ConfigError::Invalid("watchlist.name must not be empty".into()));
        }
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::Invalid("provider.timeout_secs must be at least 1".into()));
        }
        if self.sheet.worksheet.trim().is_empty() {
            return Err(ConfigError::Invalid("sheet.worksheet must not be empty".into()));
        }
        for (field, value) in [
            ("provider.base_url", &self.provider.base_url),
            ("sheet.api_base", &self.sheet.api_base),
        ] {
            reqwest::Url::parse(value)
                .map_err(|e| ConfigError::Invalid(format!("{field} '{value}': {e}")))?;
        }
        Ok(())
    }

    /// Login credentials. Username and password are required.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let username = self.provider.username.clone().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "missing provider username (set {ENV_USERNAME} or provider.username)"
            ))
        })?;
        let password = self.provider.password.clone().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "missing provider password (set {ENV_PASSWORD} or provider.password)"
            ))
        })?;
        let mut credentials = Credentials::new(username, password);
        credentials.mfa_code = self.provider.mfa_code.clone();
        Ok(credentials)
    }

    pub fn pipeline_options(&self) -> Result<PipelineOptions, ConfigError> {
        let chunk_size = NonZeroUsize::new(self.batch.chunk_size)
            .ok_or_else(|| ConfigError::Invalid("batch.chunk_size must be at least 1".into()))?;
        Ok(PipelineOptions {
            watchlist: self.watchlist.name.clone(),
            chunk_size,
            pacing: Duration::from_millis(self.batch.pacing_ms),
            on_chunk_failure: self.batch.on_chunk_failure,
        })
    }
}
