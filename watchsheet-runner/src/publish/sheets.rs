//! Google Sheets v4 publisher.
//!
//! Publishing a table is three requests against the spreadsheet:
//! 1. list worksheet titles
//! 2. create the worksheet (`addSheet`) when missing, otherwise clear it
//! 3. write header + rows starting at `A1` with `USER_ENTERED` input
//!
//! Authorization is a bearer token. It is either handed over directly or
//! minted at the token endpoint from a credentials file:
//! - `service_account`: an RS256-signed JWT assertion (jwt-bearer grant)
//! - `authorized_user`: client id, secret and refresh token

use std::path::Path;
use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use watchsheet_core::domain::Table;

use super::{PublishError, PublishReceipt, SheetPublisher};

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Environment variable consulted for a ready-made access token.
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_SHEETS_ACCESS_TOKEN";
/// OAuth scope requested for service-account tokens.
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Extract the spreadsheet id from a sheet URL. A bare id is returned as is.
pub fn spreadsheet_id(url_or_id: &str) -> Result<String, PublishError> {
    let trimmed = url_or_id.trim();
    let is_id = |s: &str| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    };

    if is_id(trimmed) {
        return Ok(trimmed.to_string());
    }
    let id = trimmed
        .split_once("/spreadsheets/d/")
        .map(|(_, rest)| rest.split(['/', '?', '#']).next().unwrap_or_default());
    match id {
        Some(id) if is_id(id) => Ok(id.to_string()),
        _ => Err(PublishError::InvalidDestination(format!(
            "not a spreadsheet URL or id: '{url_or_id}'"
        ))),
    }
}

/// A1-notation sheet reference: quoted, embedded quotes doubled.
fn quoted_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default)]
        token_uri: Option<String>,
    },
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default)]
        private_key_id: Option<String>,
        #[serde(default)]
        token_uri: Option<String>,
    },
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// How requests to the Sheets API are authorized.
#[derive(Clone)]
pub enum SheetsAuth {
    AccessToken(String),
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_uri: String,
    },
    ServiceAccount {
        client_email: String,
        key_id: Option<String>,
        signing_key: EncodingKey,
        token_uri: String,
    },
}

impl std::fmt::Debug for SheetsAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetsAuth::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
            SheetsAuth::AuthorizedUser {
                client_id,
                token_uri,
                ..
            } => f
                .debug_struct("AuthorizedUser")
                .field("client_id", client_id)
                .field("token_uri", token_uri)
                .finish_non_exhaustive(),
            SheetsAuth::ServiceAccount {
                client_email,
                token_uri,
                ..
            } => f
                .debug_struct("ServiceAccount")
                .field("client_email", client_email)
                .field("token_uri", token_uri)
                .finish_non_exhaustive(),
        }
    }
}

impl SheetsAuth {
    /// Parse a Google credentials JSON document.
    pub fn from_credentials_json(content: &str) -> Result<Self, PublishError> {
        let file: CredentialsFile = serde_json::from_str(content)
            .map_err(|e| PublishError::Auth(format!("unrecognized credentials file: {e}")))?;
        match file {
            CredentialsFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => Ok(SheetsAuth::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri: token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            }),
            CredentialsFile::ServiceAccount {
                client_email,
                private_key,
                private_key_id,
                token_uri,
            } => {
                let signing_key = EncodingKey::from_rsa_pem(private_key.as_bytes()).map_err(|e| {
                    PublishError::Auth(format!("invalid private key for {client_email}: {e}"))
                })?;
                Ok(SheetsAuth::ServiceAccount {
                    client_email,
                    key_id: private_key_id,
                    signing_key,
                    token_uri: token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
                })
            }
        }
    }

    pub fn from_credentials_file(path: &Path) -> Result<Self, PublishError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_credentials_json(&content)
    }

    /// Resolve to a bearer token, minting one at the token endpoint if needed.
    fn access_token(&self, client: &Client) -> Result<String, PublishError> {
        match self {
            SheetsAuth::AccessToken(token) => Ok(token.clone()),
            SheetsAuth::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => {
                debug!("exchanging refresh token at {token_uri}");
                exchange_token(
                    client,
                    token_uri,
                    &[
                        ("grant_type", "refresh_token"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("refresh_token", refresh_token.as_str()),
                    ],
                )
            }
            SheetsAuth::ServiceAccount {
                client_email,
                key_id,
                signing_key,
                token_uri,
            } => {
                debug!("exchanging service account assertion for {client_email} at {token_uri}");
                let iat = chrono::Utc::now().timestamp();
                let claims = AssertionClaims {
                    iss: client_email,
                    scope: SHEETS_SCOPE,
                    aud: token_uri,
                    iat,
                    exp: iat + ASSERTION_LIFETIME_SECS,
                };
                let mut header = Header::new(Algorithm::RS256);
                header.kid = key_id.clone();
                let assertion = jsonwebtoken::encode(&header, &claims, signing_key).map_err(|e| {
                    PublishError::Auth(format!("failed to sign assertion for {client_email}: {e}"))
                })?;
                exchange_token(
                    client,
                    token_uri,
                    &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
                )
            }
        }
    }
}

/// POST a grant to the token endpoint and pull out the access token.
fn exchange_token(client: &Client, token_uri: &str, form: &[(&str, &str)]) -> Result<String, PublishError> {
    let resp = client
        .post(token_uri)
        .form(form)
        .send()
        .map_err(|e| PublishError::Http(e.to_string()))?;
    let status = resp.status();
    let body: Option<TokenResponse> = resp.json().ok();

    match body {
        Some(TokenResponse {
            access_token: Some(token),
            ..
        }) if status.is_success() => Ok(token),
        Some(TokenResponse {
            error: Some(error),
            error_description,
            ..
        }) => Err(PublishError::Auth(format!(
            "token exchange failed ({status}): {error}{}",
            error_description.map(|d| format!(": {d}")).unwrap_or_default()
        ))),
        _ => Err(PublishError::Auth(format!(
            "token exchange failed ({status}): no access token in response"
        ))),
    }
}

/// Publishes to one worksheet of a Google spreadsheet.
pub struct GoogleSheetsPublisher {
    client: Client,
    api_base: Url,
    spreadsheet_id: String,
    worksheet: String,
    auth: SheetsAuth,
}

impl GoogleSheetsPublisher {
    /// `spreadsheet` is a sheet URL or a bare spreadsheet id.
    pub fn new(spreadsheet: &str, worksheet: &str, auth: SheetsAuth) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PublishError::Http(format!("failed to build HTTP client: {e}")))?;
        let api_base = Url::parse(DEFAULT_API_BASE)
            .map_err(|e| PublishError::InvalidDestination(e.to_string()))?;

        Ok(Self {
            client,
            api_base,
            spreadsheet_id: spreadsheet_id(spreadsheet)?,
            worksheet: worksheet.to_string(),
            auth,
        })
    }

    /// Point at a different API host (tests, proxies).
    pub fn with_api_base(mut self, api_base: &str) -> Result<Self, PublishError> {
        self.api_base = Url::parse(api_base)
            .map_err(|e| PublishError::InvalidDestination(format!("api base '{api_base}': {e}")))?;
        Ok(self)
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    /// `{api_base}/v4/spreadsheets/<segments...>`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, PublishError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PublishError::InvalidDestination(format!("api base '{}' cannot hold a path", self.api_base))
            })?
            .pop_if_empty()
            .extend(["v4", "spreadsheets"])
            .extend(segments);
        Ok(url)
    }

    fn check(resp: Response, action: &str) -> Result<Response, PublishError> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PublishError::Auth(format!("{action}: HTTP {status}")));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(PublishError::InvalidDestination(format!(
                "{action}: spreadsheet not found (HTTP {status})"
            )));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(PublishError::Http(format!("{action}: HTTP {status}: {snippet}")));
        }
        Ok(resp)
    }

    fn worksheet_titles(&self, token: &str) -> Result<Vec<String>, PublishError> {
        let mut url = self.endpoint(&[&self.spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .map_err(|e| PublishError::Http(e.to_string()))?;
        let body: Value = Self::check(resp, "list worksheets")?
            .json()
            .map_err(|e| PublishError::Http(format!("list worksheets: {e}")))?;

        Ok(body
            .get("sheets")
            .and_then(Value::as_array)
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s.pointer("/properties/title").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn add_worksheet(&self, token: &str, rows: usize, cols: usize) -> Result<(), PublishError> {
        let url = self.endpoint(&[&format!("{}:batchUpdate", self.spreadsheet_id)])?;
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": self.worksheet,
                        "gridProperties": {"rowCount": rows, "columnCount": cols},
                    }
                }
            }]
        });
        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .map_err(|e| PublishError::Http(e.to_string()))?;
        Self::check(resp, "create worksheet")?;
        Ok(())
    }

    fn clear_worksheet(&self, token: &str) -> Result<(), PublishError> {
        let range = format!("{}:clear", quoted_title(&self.worksheet));
        let url = self.endpoint(&[&self.spreadsheet_id, "values", &range])?;
        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .map_err(|e| PublishError::Http(e.to_string()))?;
        Self::check(resp, "clear worksheet")?;
        Ok(())
    }

    fn write_values(&self, token: &str, values: Vec<Vec<String>>) -> Result<(), PublishError> {
        let range = format!("{}!A1", quoted_title(&self.worksheet));
        let mut url = self.endpoint(&[&self.spreadsheet_id, "values", &range])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": values,
        });
        let resp = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .map_err(|e| PublishError::Http(e.to_string()))?;
        Self::check(resp, "write values")?;
        Ok(())
    }
}

impl SheetPublisher for GoogleSheetsPublisher {
    fn name(&self) -> &str {
        "google-sheets"
    }

    fn publish(&self, table: &Table) -> Result<PublishReceipt, PublishError> {
        let token = self.auth.access_token(&self.client)?;

        let titles = self.worksheet_titles(&token)?;
        let created = !titles.iter().any(|t| t == &self.worksheet);
        if created {
            info!("creating worksheet '{}'", self.worksheet);
            self.add_worksheet(&token, table.len() + 1, table.columns().len())?;
        } else {
            debug!("clearing worksheet '{}'", self.worksheet);
            self.clear_worksheet(&token)?;
        }

        self.write_values(&token, table.values())?;
        info!(
            "published {} rows to worksheet '{}' of spreadsheet {}",
            table.len(),
            self.worksheet,
            self.spreadsheet_id
        );

        Ok(PublishReceipt {
            destination: format!("{}/{}", self.spreadsheet_id, self.worksheet),
            rows: table.len(),
            created,
        })
    }
}
