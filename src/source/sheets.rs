//! Google Sheets access.
//!
//! [`SheetSource`] is the narrow read-only view the analyzer, validator and
//! spreadsheet executor need: sheet titles and A1 ranges as rows of text.
//! [`SheetConnector`] turns a [`ConnectionConfig`] into a source, so tests can
//! inject in-memory spreadsheets.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::SourceError;
use crate::config::ConnectionConfig;
use crate::error::{CoreError, CoreResult};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Read-only view of one spreadsheet document.
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Titles of all sheets, in document order.
    async fn sheet_titles(&self) -> Result<Vec<String>, SourceError>;

    /// Cell text for an A1 range. Trailing empty cells may be absent.
    async fn values(&self, range: &str) -> Result<Vec<Vec<String>>, SourceError>;
}

/// Opens a [`SheetSource`] for a connection config.
#[async_trait]
pub trait SheetConnector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> CoreResult<Arc<dyn SheetSource>>;
}

/// Service-account credentials as downloaded from the Google console.
#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

enum SheetAuth {
    Bearer(String),
    ApiKey(String),
}

/// Connector for the Google Sheets v4 REST API.
#[derive(Clone)]
pub struct GoogleSheetsConnector {
    http: Client,
}

impl GoogleSheetsConnector {
    pub fn new(request_timeout: Duration) -> CoreResult<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CoreError::InvalidConfig(format!("http client: {}", e)))?;
        Ok(Self { http })
    }

    async fn exchange_token(&self, key: &ServiceAccountKey) -> Result<String, SourceError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SourceError::Invalid(e.to_string()))?
            .as_secs();
        let token_uri = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: READONLY_SCOPE,
            aud: token_uri,
            iat: now,
            exp: now + 3600,
        };
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| SourceError::Invalid(format!("service account key: {}", e)))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .map_err(|e| SourceError::Invalid(format!("service account key: {}", e)))?;

        let response = self
            .http
            .post(token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
            .send()
            .await?;
        let token: TokenResponse = check_status(response).await?.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl SheetConnector for GoogleSheetsConnector {
    async fn connect(&self, config: &ConnectionConfig) -> CoreResult<Arc<dyn SheetSource>> {
        let spreadsheet_id = config.require_spreadsheet_id()?.to_string();

        let auth = if !config.connection_string.trim().is_empty() {
            let key: ServiceAccountKey = serde_json::from_str(&config.connection_string)
                .map_err(|e| {
                    CoreError::InvalidConfig(format!("invalid service account credentials: {}", e))
                })?;
            let token = self
                .exchange_token(&key)
                .await
                .map_err(|e| CoreError::Connection(e.to_string()))?;
            SheetAuth::Bearer(token)
        } else if let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            SheetAuth::ApiKey(api_key.to_string())
        } else {
            return Err(CoreError::InvalidConfig(
                "service account credentials or an API key are required".into(),
            ));
        };

        Ok(Arc::new(GoogleSheetsClient {
            http: self.http.clone(),
            spreadsheet_id,
            auth,
        }))
    }
}

struct GoogleSheetsClient {
    http: Client,
    spreadsheet_id: String,
    auth: SheetAuth,
}

impl GoogleSheetsClient {
    fn url(&self, tail: &[&str]) -> Result<Url, SourceError> {
        let mut url = Url::parse(SHEETS_API).map_err(|e| SourceError::Invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Invalid("sheets API URL cannot be a base".into()))?
            .push(&self.spreadsheet_id)
            .extend(tail);
        if let SheetAuth::ApiKey(key) = &self.auth {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, SourceError> {
        debug!(path = url.path(), "sheets request");
        let mut request = self.http.get(url);
        if let SheetAuth::Bearer(token) = &self.auth {
            request = request.bearer_auth(token);
        }
        check_status(request.send().await?).await
    }
}

#[async_trait]
impl SheetSource for GoogleSheetsClient {
    async fn sheet_titles(&self) -> Result<Vec<String>, SourceError> {
        let mut url = self.url(&[])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.title");
        let metadata: SpreadsheetMetadata = self.get(url).await?.json().await?;
        Ok(metadata
            .sheets
            .into_iter()
            .map(|s| s.properties.title)
            .collect())
    }

    async fn values(&self, range: &str) -> Result<Vec<Vec<String>>, SourceError> {
        let url = self.url(&["values", range])?;
        let range: ValueRange = self.get(url).await?.json().await?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

fn cell_text(cell: Value) -> String {
    match cell {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(SourceError::Upstream {
        status: status.as_u16(),
        message,
    })
}
