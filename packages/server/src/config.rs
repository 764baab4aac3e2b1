//! Environment configuration.

use imazon_alerts_carto::account_url;
use imazon_alerts_geostore::DEFAULT_BASE_URL;

/// Carto account queried when `CARTO_USER` is unset.
pub const DEFAULT_CARTO_USER: &str = "wri-01";

/// Server settings, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind (`BIND_ADDR`).
    pub bind_addr: String,
    /// Port to bind (`PORT`).
    pub port: u16,
    /// Carto SQL endpoint (`CARTO_API_URL`, else derived from `CARTO_USER`).
    pub carto_api_url: String,
    /// Carto API key (`CARTO_API_KEY`).
    pub carto_api_key: Option<String>,
    /// Geostore host (`GEOSTORE_URL`).
    pub geostore_url: String,
}

impl ServerConfig {
    /// Reads settings from the process environment, defaulting anything
    /// unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let carto_user = var("CARTO_USER").unwrap_or_else(|| DEFAULT_CARTO_USER.to_string());

        Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: var("PORT").and_then(|p| p.parse().ok()).unwrap_or(8080),
            carto_api_url: var("CARTO_API_URL").unwrap_or_else(|| account_url(&carto_user)),
            carto_api_key: var("CARTO_API_KEY"),
            geostore_url: var("GEOSTORE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}
