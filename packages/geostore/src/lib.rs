#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geostore API client.
//!
//! The geostore maps admin codes, concession and protected-area ids, and
//! polygon hashes to stored geometry and area. Every lookup is a `GET`
//! under `{base}/v1/geostore/` returning a JSON:API document whose
//! attributes carry `geojson` and `areaHa`. A 404 means the region is
//! unknown.

use async_trait::async_trait;
use imazon_alerts_query::{RegionArea, RegionResolver, ResolveError};
use serde::Deserialize;
use thiserror::Error;

/// Default geostore host.
pub const DEFAULT_BASE_URL: &str = "https://api.resourcewatch.org";

/// Errors from the geostore API.
#[derive(Debug, Error)]
pub enum GeostoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not a geostore document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The geostore has no record of the region.
    #[error("Geostore not found: {path}")]
    NotFound {
        /// Lookup path that missed.
        path: String,
    },

    /// The configured host is not a usable base URL.
    #[error("Invalid geostore URL: {url}")]
    InvalidBaseUrl {
        /// Configured host.
        url: String,
    },

    /// The geostore answered with an unexpected status.
    #[error("Geostore returned {status} for {path}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Lookup path.
        path: String,
    },
}

impl From<GeostoreError> for ResolveError {
    fn from(e: GeostoreError) -> Self {
        match e {
            GeostoreError::NotFound { .. } => Self::NotFound,
            other => Self::Failed(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeostoreDocument {
    data: GeostoreData,
}

#[derive(Debug, Deserialize)]
struct GeostoreData {
    attributes: GeostoreAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeostoreAttributes {
    #[serde(default)]
    geojson: Option<geojson::GeoJson>,
    #[serde(default)]
    area_ha: Option<f64>,
}

/// Resolves regions against a geostore host.
#[derive(Debug, Clone)]
pub struct GeostoreClient {
    client: reqwest::Client,
    base_url: String,
}

impl GeostoreClient {
    /// A client for the geostore at `base_url` (without `/v1/geostore`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Lookup URL for `segments` under `/v1/geostore/`. Each segment is
    /// percent-encoded on its own.
    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, GeostoreError> {
        let invalid = || GeostoreError::InvalidBaseUrl {
            url: self.base_url.clone(),
        };
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(["v1", "geostore"])
            .extend(segments);
        Ok(url)
    }

    /// Fetches the geostore record at `segments`, relative to
    /// `/v1/geostore/`.
    ///
    /// # Errors
    ///
    /// Returns [`GeostoreError::NotFound`] on a 404, and other
    /// [`GeostoreError`] variants if the base URL is unusable, the request
    /// fails or the body is not a geostore document.
    pub async fn fetch(
        &self,
        segments: &[&str],
        api_key: Option<&str>,
    ) -> Result<RegionArea, GeostoreError> {
        let path = segments.join("/");
        let url = self.url(segments)?;
        log::debug!("Fetching geostore {url}");

        let mut req = self.client.get(url);
        if let Some(key) = api_key {
            req = req.header("x-api-key", key);
        }
        let resp = req.send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GeostoreError::NotFound { path });
        }
        if !status.is_success() {
            return Err(GeostoreError::Status {
                status: status.as_u16(),
                path,
            });
        }

        parse_document(&resp.bytes().await?)
    }
}

/// Extracts area and geometry from a geostore response body.
fn parse_document(body: &[u8]) -> Result<RegionArea, GeostoreError> {
    let doc: GeostoreDocument = serde_json::from_slice(body)?;
    Ok(RegionArea {
        area_ha: doc.data.attributes.area_ha,
        geojson: doc.data.attributes.geojson,
    })
}

#[async_trait]
impl RegionResolver for GeostoreClient {
    async fn by_iso(&self, iso: &str, api_key: Option<&str>) -> Result<RegionArea, ResolveError> {
        Ok(self.fetch(&["admin", iso], api_key).await?)
    }

    async fn by_iso_and_id(
        &self,
        iso: &str,
        id1: &str,
        api_key: Option<&str>,
    ) -> Result<RegionArea, ResolveError> {
        Ok(self.fetch(&["admin", iso, id1], api_key).await?)
    }

    async fn by_iso_and_ids(
        &self,
        iso: &str,
        id1: &str,
        id2: &str,
        api_key: Option<&str>,
    ) -> Result<RegionArea, ResolveError> {
        Ok(self.fetch(&["admin", iso, id1, id2], api_key).await?)
    }

    async fn by_use(
        &self,
        use_type: &str,
        id: &str,
        api_key: Option<&str>,
    ) -> Result<RegionArea, ResolveError> {
        Ok(self.fetch(&["use", use_type, id], api_key).await?)
    }

    async fn by_wdpa(&self, wdpa_id: &str, api_key: Option<&str>) -> Result<RegionArea, ResolveError> {
        Ok(self.fetch(&["wdpa", wdpa_id], api_key).await?)
    }

    async fn by_hash(&self, hash: &str, api_key: Option<&str>) -> Result<RegionArea, ResolveError> {
        Ok(self.fetch(&[hash], api_key).await?)
    }
}
