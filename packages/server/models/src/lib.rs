#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! JSON:API documents and request types for the Imazon alerts server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the engine's result types so the wire contract can evolve
//! independently.

use imazon_alerts_models::{AlertResult, AlertValue, DownloadUrls, Generation, LatestDate};
use serde::{Deserialize, Serialize};

/// Resource type of an alert aggregation.
pub const ALERTS_TYPE: &str = "imazon-alerts";

/// Resource type of a latest-date entry.
pub const LATEST_TYPE: &str = "imazon-latest";

/// Top-level JSON:API document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDocument<T> {
    /// Primary data.
    pub data: T,
}

/// One JSON:API resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResource<A> {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource identifier, when the generation reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Resource attributes.
    pub attributes: A,
}

/// Attributes of an alert aggregation resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAlertAttributes {
    /// Aggregated rows.
    pub value: Vec<AlertValue>,
    /// Export links per format.
    pub download_urls: Option<DownloadUrls>,
    /// Region area in hectares.
    pub area_ha: Option<f64>,
    /// Period the aggregation covers, as `begin,end`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
}

/// Document returned by the alert endpoints.
pub type ApiAlertDocument = ApiDocument<ApiResource<ApiAlertAttributes>>;

impl From<AlertResult> for ApiAlertDocument {
    fn from(result: AlertResult) -> Self {
        Self {
            data: ApiResource {
                resource_type: ALERTS_TYPE.to_string(),
                id: result.id,
                attributes: ApiAlertAttributes {
                    value: result.value,
                    download_urls: result.download_urls,
                    area_ha: result.area_ha,
                    period: result.period,
                },
            },
        }
    }
}

/// Attributes of a latest-date resource.
///
/// The legacy schema reports each date as `date`; the revised schema
/// reports its single maximum as `latest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiLatestAttributes {
    /// Legacy shape.
    Date {
        /// Alert date.
        date: Option<String>,
    },
    /// Revised shape.
    Latest {
        /// Most recent alert date.
        latest: Option<String>,
    },
}

/// Document returned by the latest-date endpoints.
pub type ApiLatestDocument = ApiDocument<Vec<ApiResource<ApiLatestAttributes>>>;

/// Shapes latest-date rows for `generation`.
#[must_use]
pub fn latest_document(generation: Generation, dates: Vec<LatestDate>) -> ApiLatestDocument {
    ApiDocument {
        data: dates
            .into_iter()
            .map(|LatestDate { date }| ApiResource {
                resource_type: LATEST_TYPE.to_string(),
                id: None,
                attributes: match generation {
                    Generation::V1 => ApiLatestAttributes::Date { date },
                    Generation::V2 => ApiLatestAttributes::Latest { latest: date },
                },
            })
            .collect(),
    }
}

/// One JSON:API error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// HTTP status code.
    pub status: u16,
    /// Human-readable explanation.
    pub detail: String,
}

/// JSON:API error document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorDocument {
    /// Errors, one per problem.
    pub errors: Vec<ApiError>,
}

impl ApiErrorDocument {
    /// A document with a single error.
    #[must_use]
    pub fn single(status: u16, detail: impl Into<String>) -> Self {
        Self {
            errors: vec![ApiError {
                status,
                detail: detail.into(),
            }],
        }
    }
}

/// Query parameters shared by the alert endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertQueryParams {
    /// Whether to report first and last alert dates per category.
    pub alert_query: Option<String>,
    /// Period as `YYYY-MM-DD,YYYY-MM-DD`.
    pub period: Option<String>,
    /// Geostore hash for polygon queries.
    pub geostore: Option<String>,
}

impl AlertQueryParams {
    /// `alertQuery` is on unless absent, empty, `false`, or `0`.
    #[must_use]
    pub fn alert_query(&self) -> bool {
        self.alert_query
            .as_deref()
            .map(str::trim)
            .is_some_and(|v| !matches!(v, "" | "false" | "0"))
    }
}

/// Query parameters of the latest-date endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatestQueryParams {
    /// Number of dates to return.
    pub limit: Option<String>,
}

/// Body of a polygon query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeojsonBody {
    /// A `GeoJSON` geometry, feature, or feature collection.
    pub geojson: Option<serde_json::Value>,
}
