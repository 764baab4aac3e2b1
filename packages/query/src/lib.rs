#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Query composition engine for Imazon deforestation alerts.
//!
//! A request names a region, a period, and whether alert dates are wanted.
//! The [`composer::QueryComposer`] for one [`Generation`] turns it into a
//! single aggregation query against the spatial engine, shapes the rows,
//! and, when the rows come back empty, walks that generation's fallback
//! tiers to recover the region area.
//!
//! The spatial engine and the region resolver are reached through the
//! [`SpatialExecutor`] and [`RegionResolver`] traits so the engine can be
//! driven by the Carto and geostore clients in production and by scripted
//! doubles in tests.

pub mod composer;
pub mod downloads;
pub mod params;
pub mod profile;
pub mod simplify;
pub mod store;
pub mod template;

use async_trait::async_trait;
use imazon_alerts_models::{Generation, PeriodError};
use thiserror::Error;

pub use composer::{AlertRequest, QueryComposer};
pub use store::{TemplateName, TemplateStore};
pub use template::{QueryTemplate, TemplateError};

/// One result row from the spatial engine.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Errors from the query engine.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The request names a region or period that cannot be queried.
    #[error("Invalid region: {message}")]
    InvalidRegion {
        /// What was wrong.
        message: String,
    },

    /// The region resolver does not know the region.
    #[error("Region not found: {message}")]
    RegionNotFound {
        /// Which region was looked up.
        message: String,
    },

    /// No template of this name is registered for the generation.
    #[error("No '{name}' template for {generation}")]
    UnknownTemplate {
        /// Requested template.
        name: TemplateName,
        /// Generation whose store was searched.
        generation: Generation,
    },

    /// A template failed to register or render.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// The spatial engine failed.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// The region resolver failed for a reason other than a miss.
    #[error("Resolver error: {message}")]
    Resolver {
        /// Transport or decoding failure description.
        message: String,
    },
}

impl From<PeriodError> for QueryError {
    fn from(e: PeriodError) -> Self {
        Self::InvalidRegion {
            message: e.to_string(),
        }
    }
}

/// Failure reported by a [`SpatialExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The engine could not be reached.
    #[error("transport: {0}")]
    Transport(String),
    /// The engine rejected the query.
    #[error("engine: {0}")]
    Engine(String),
    /// The engine answered with something that is not a row set.
    #[error("response: {0}")]
    Response(String),
}

/// Failure reported by a [`RegionResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The resolver has no record of the region.
    #[error("not found")]
    NotFound,
    /// The lookup itself failed.
    #[error("{0}")]
    Failed(String),
}

/// What the region resolver knows about a region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionArea {
    /// Area in hectares, if the resolver reports one.
    pub area_ha: Option<f64>,
    /// Region geometry, if the resolver returns one.
    pub geojson: Option<geojson::GeoJson>,
}

/// Runs rendered SQL against the spatial engine.
#[async_trait]
pub trait SpatialExecutor: Send + Sync {
    /// Executes `sql` and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] if the engine cannot be reached, rejects
    /// the query, or answers with an unreadable body.
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, ExecutionError>;
}

/// Looks up region geometry and area by identifier.
///
/// `api_key` is forwarded from the inbound request.
#[async_trait]
pub trait RegionResolver: Send + Sync {
    /// Country by ISO code.
    async fn by_iso(&self, iso: &str, api_key: Option<&str>) -> Result<RegionArea, ResolveError>;

    /// First-level admin unit.
    async fn by_iso_and_id(
        &self,
        iso: &str,
        id1: &str,
        api_key: Option<&str>,
    ) -> Result<RegionArea, ResolveError>;

    /// Second-level admin unit.
    async fn by_iso_and_ids(
        &self,
        iso: &str,
        id1: &str,
        id2: &str,
        api_key: Option<&str>,
    ) -> Result<RegionArea, ResolveError>;

    /// Industrial-use concession.
    async fn by_use(
        &self,
        use_type: &str,
        id: &str,
        api_key: Option<&str>,
    ) -> Result<RegionArea, ResolveError>;

    /// WDPA protected area.
    async fn by_wdpa(&self, wdpa_id: &str, api_key: Option<&str>)
    -> Result<RegionArea, ResolveError>;

    /// Stored polygon by geostore hash.
    async fn by_hash(&self, hash: &str, api_key: Option<&str>) -> Result<RegionArea, ResolveError>;
}
