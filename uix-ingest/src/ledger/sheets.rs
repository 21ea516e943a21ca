//! Google Sheets v4 backend
//!
//! Talks to the REST API directly with `reqwest`. Authentication is either a
//! pre-issued OAuth access token or a service account whose signed JWT is
//! exchanged for a token and cached until shortly before expiry.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::a1::{append_range, block_range, first_row_of_range, sheet_range};
use super::backend::{LedgerBackend, LedgerError, SheetValues};

pub const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4";
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const USER_AGENT: &str = "uix-ingest/0.1.0";

/// Refresh this long before the reported expiry
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub enum SheetsAuth {
    AccessToken(String),
    ServiceAccount {
        client_email: String,
        /// PEM; literal `\n` escapes are accepted
        private_key: String,
        token_uri: String,
    },
}

#[derive(Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct ValueRangeResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct AppendResponse {
    updates: AppendUpdates,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: String,
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
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

pub struct GoogleSheetsBackend {
    http_client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    auth: SheetsAuth,
    token: Mutex<Option<CachedToken>>,
    sheet_ids: Mutex<HashMap<String, i64>>,
}

impl GoogleSheetsBackend {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        auth: SheetsAuth,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url
                .unwrap_or_else(|| SHEETS_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            auth,
            token: Mutex::new(None),
            sheet_ids: Mutex::new(HashMap::new()),
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}",
            self.base_url,
            self.spreadsheet_id,
            urlencoding::encode(range)
        )
    }

    async fn bearer_token(&self) -> Result<String, LedgerError> {
        let (client_email, private_key, token_uri) = match &self.auth {
            SheetsAuth::AccessToken(token) => return Ok(token.clone()),
            SheetsAuth::ServiceAccount {
                client_email,
                private_key,
                token_uri,
            } => (client_email, private_key, token_uri),
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.token.clone());
            }
        }

        let now = chrono::Utc::now().timestamp();
        let claims = JwtClaims {
            iss: client_email,
            scope: SHEETS_SCOPE,
            aud: token_uri,
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(normalize_private_key(private_key).as_bytes())
            .map_err(|e| LedgerError::Auth(format!("Invalid private key: {}", e)))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| LedgerError::Auth(format!("JWT signing failed: {}", e)))?;

        tracing::debug!(client_email = %client_email, "Requesting Sheets access token");

        let response = self
            .http_client
            .post(token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Auth(format!("Token exchange failed ({}): {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Parse(e.to_string()))?;
        let lifetime = token.expires_in.unwrap_or(3600).saturating_sub(TOKEN_EXPIRY_MARGIN_SECS);

        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(token.access_token)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, LedgerError> {
        let token = self.bearer_token().await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Auth(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Numeric sheet id for a tab title (cached)
    async fn sheet_id(&self, sheet: &str) -> Result<i64, LedgerError> {
        if let Some(id) = self.sheet_ids.lock().await.get(sheet) {
            return Ok(*id);
        }

        let url = format!("{}/spreadsheets/{}", self.base_url, self.spreadsheet_id);
        let response = self
            .send(self.http_client.get(&url).query(&[("fields", "sheets.properties")]))
            .await?;
        let metadata: SpreadsheetMetadata = response
            .json()
            .await
            .map_err(|e| LedgerError::Parse(e.to_string()))?;

        let mut ids = self.sheet_ids.lock().await;
        for entry in metadata.sheets {
            ids.insert(entry.properties.title, entry.properties.sheet_id);
        }
        ids.get(sheet)
            .copied()
            .ok_or_else(|| LedgerError::SheetNotFound(sheet.to_string()))
    }
}

#[async_trait]
impl LedgerBackend for GoogleSheetsBackend {
    async fn read_sheet(&self, sheet: &str) -> Result<SheetValues, LedgerError> {
        let url = self.values_url(&sheet_range(sheet));
        tracing::debug!(sheet = %sheet, "Reading sheet");

        let response = self.send(self.http_client.get(&url)).await?;
        let body: ValueRangeResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Parse(e.to_string()))?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn update_range(
        &self,
        sheet: &str,
        start_row: usize,
        start_col: usize,
        rows: &[Vec<String>],
    ) -> Result<(), LedgerError> {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return Ok(());
        }
        let range = block_range(sheet, start_row, start_col, width, rows.len());
        tracing::debug!(range = %range, "Updating range");

        self.send(
            self.http_client
                .put(self.values_url(&range))
                .query(&[("valueInputOption", "USER_ENTERED")])
                .json(&json!({ "range": range, "majorDimension": "ROWS", "values": rows })),
        )
        .await?;
        Ok(())
    }

    async fn append_row(&self, sheet: &str, values: &[String]) -> Result<usize, LedgerError> {
        let range = append_range(sheet, values.len());
        let url = format!("{}:append", self.values_url(&range));
        tracing::debug!(range = %range, "Appending row");

        let response = self
            .send(
                self.http_client
                    .post(&url)
                    .query(&[("valueInputOption", "USER_ENTERED")])
                    .json(&json!({ "majorDimension": "ROWS", "values": [values] })),
            )
            .await?;
        let body: AppendResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Parse(e.to_string()))?;

        first_row_of_range(&body.updates.updated_range).ok_or_else(|| {
            LedgerError::Parse(format!("Unexpected updatedRange: {}", body.updates.updated_range))
        })
    }

    async fn copy_formula_range(
        &self,
        sheet: &str,
        source_row: usize,
        target_row: usize,
        start_col: usize,
        end_col: usize,
    ) -> Result<(), LedgerError> {
        let sheet_id = self.sheet_id(sheet).await?;
        let url = format!("{}/spreadsheets/{}:batchUpdate", self.base_url, self.spreadsheet_id);
        let grid = |row: usize| {
            json!({
                "sheetId": sheet_id,
                "startRowIndex": row,
                "endRowIndex": row + 1,
                "startColumnIndex": start_col,
                "endColumnIndex": end_col + 1,
            })
        };

        self.send(self.http_client.post(&url).json(&json!({
            "requests": [{
                "copyPaste": {
                    "source": grid(source_row),
                    "destination": grid(target_row),
                    "pasteType": "PASTE_FORMULA",
                }
            }]
        })))
        .await?;
        Ok(())
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn normalize_private_key(raw: &str) -> String {
    raw.replace("\\n", "\n")
}
