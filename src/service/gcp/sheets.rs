//! [`SheetService`] over the Sheets `values.get` REST endpoint.
//!
//! Takes a ready OAuth access token; obtaining one is the caller's problem.

use crate::error::{FluentError, Result};
use crate::service::SheetService;
use async_trait::async_trait;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

pub struct SheetsHttp {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl SheetsHttp {
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        let token = access_token.into();
        if token.is_empty() {
            return Err(FluentError::Credential(
                "an access token must be provided".to_string(),
            ));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            token,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[async_trait]
impl SheetService for SheetsHttp {
    async fn get_values(&self, sheet_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| FluentError::Service(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| FluentError::Service("sheets base URL cannot hold a path".to_string()))?
            .extend(["v4", "spreadsheets", sheet_id, "values", range]);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| FluentError::Service(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FluentError::NotFound(format!(
                "sheet {sheet_id} range {range} not found"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FluentError::Service(format!(
                "sheets values.get returned {status}: {body}"
            )));
        }

        let parsed: ValuesResponse = response
            .json()
            .await
            .map_err(|e| FluentError::Service(e.to_string()))?;
        Ok(parsed
            .values
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| match cell {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect())
    }
}
