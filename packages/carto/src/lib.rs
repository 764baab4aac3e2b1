#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Carto SQL API client.
//!
//! Rendered alert queries are posted to the account's SQL endpoint
//! (e.g. `https://wri-01.carto.com/api/v2/sql`) as a `q` form field, so
//! large inline polygons do not run into URL length limits. A successful
//! response carries a `rows` array; a rejected query carries an `error`
//! array of messages.

use async_trait::async_trait;
use imazon_alerts_query::{ExecutionError, Row, SpatialExecutor};
use thiserror::Error;

/// Errors from the Carto SQL API.
#[derive(Debug, Error)]
pub enum CartoError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Carto rejected the query.
    #[error("Carto error: {message}")]
    Api {
        /// Messages reported by Carto, joined.
        message: String,
    },

    /// Response JSON had no row set.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

impl From<CartoError> for ExecutionError {
    fn from(e: CartoError) -> Self {
        match e {
            CartoError::Http(e) => Self::Transport(e.to_string()),
            CartoError::Api { message } => Self::Engine(message),
            CartoError::Json(_) | CartoError::Parse { .. } => Self::Response(e.to_string()),
        }
    }
}

/// Builds the SQL endpoint URL for a Carto account.
#[must_use]
pub fn account_url(user: &str) -> String {
    format!("https://{user}.carto.com/api/v2/sql")
}

/// Executes SQL against one Carto account.
#[derive(Debug, Clone)]
pub struct CartoClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl CartoClient {
    /// A client for the SQL endpoint at `api_url`.
    #[must_use]
    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key,
        }
    }

    /// The SQL endpoint this client posts to.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Runs `sql` and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns [`CartoError`] if the request fails, the body is not JSON,
    /// or Carto reports an error.
    pub async fn query(&self, sql: &str) -> Result<Vec<Row>, CartoError> {
        let mut form = vec![("q", sql)];
        if let Some(key) = &self.api_key {
            form.push(("api_key", key.as_str()));
        }

        let resp = self.client.post(&self.api_url).form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            log::warn!("Carto SQL API returned {status}");
        }

        let body: serde_json::Value = serde_json::from_slice(&resp.bytes().await?)?;
        parse_response(body)
    }
}

#[async_trait]
impl SpatialExecutor for CartoClient {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, ExecutionError> {
        Ok(self.query(sql).await?)
    }
}

/// Extracts rows from a Carto SQL API response body.
fn parse_response(mut body: serde_json::Value) -> Result<Vec<Row>, CartoError> {
    if let Some(errors) = body.get("error").and_then(serde_json::Value::as_array) {
        let message = errors
            .iter()
            .filter_map(serde_json::Value::as_str)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(CartoError::Api { message });
    }

    let Some(serde_json::Value::Array(rows)) = body.get_mut("rows").map(serde_json::Value::take)
    else {
        return Err(CartoError::Parse {
            message: "Carto response has no rows array".to_string(),
        });
    };

    rows.into_iter()
        .map(|row| match row {
            serde_json::Value::Object(row) => Ok(row),
            other => Err(CartoError::Parse {
                message: format!("Carto row is not an object: {other}"),
            }),
        })
        .collect()
}
