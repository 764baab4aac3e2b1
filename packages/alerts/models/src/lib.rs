#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region, period, and alert result types for the Imazon alerts API.
//!
//! These types are shared by the query engine, the collaborator clients,
//! and the HTTP server. They carry no I/O.

pub mod geometry;
pub mod period;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use period::{Period, PeriodError};

/// One of the two independently versioned query/response schemas.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Generation {
    /// Legacy schema: `gadm2` simplified tables, raw category names.
    V1,
    /// Revised schema: `gadm36` tables, labelled categories in hectares.
    V2,
}

impl Generation {
    /// Output formats offered as download links by this generation.
    #[must_use]
    pub const fn download_formats(self) -> &'static [DownloadFormat] {
        match self {
            Self::V1 => &[
                DownloadFormat::Csv,
                DownloadFormat::Geojson,
                DownloadFormat::Kml,
                DownloadFormat::Shp,
                DownloadFormat::Svg,
            ],
            Self::V2 => &[
                DownloadFormat::Csv,
                DownloadFormat::Json,
                DownloadFormat::Kml,
                DownloadFormat::Shp,
                DownloadFormat::Svg,
            ],
        }
    }
}

/// Export format accepted by the Carto SQL API `format` parameter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DownloadFormat {
    /// Comma-separated values.
    Csv,
    /// `GeoJSON` feature collection.
    Geojson,
    /// Carto JSON rows.
    Json,
    /// Keyhole Markup Language.
    Kml,
    /// Zipped shapefile.
    Shp,
    /// Scalable vector graphics.
    Svg,
}

/// Download URL per export format.
pub type DownloadUrls = BTreeMap<DownloadFormat, String>;

/// Geometry of a `World` query.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldGeometry {
    /// A geostore hash, resolved to geometry and area by the region resolver.
    Geostore {
        /// Geostore identifier.
        hash: String,
    },
    /// A caller-supplied polygon, already normalized into a collection.
    Inline(geojson::FeatureCollection),
}

/// Identifies what region a request aggregates alerts over.
///
/// Construct admin variants through [`RegionSpec::national`],
/// [`RegionSpec::province`], and [`RegionSpec::district`] so the ISO code
/// is upper-cased.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionSpec {
    /// An arbitrary polygon.
    World {
        /// Where the polygon comes from.
        geometry: WorldGeometry,
    },
    /// A whole country.
    National {
        /// ISO 3166-1 alpha-3 code.
        iso: String,
    },
    /// A first-level admin unit.
    Province {
        /// ISO 3166-1 alpha-3 code.
        iso: String,
        /// First-level admin identifier.
        id1: String,
    },
    /// A second-level admin unit.
    District {
        /// ISO 3166-1 alpha-3 code.
        iso: String,
        /// First-level admin identifier.
        id1: String,
        /// Second-level admin identifier.
        id2: String,
    },
    /// An industrial-use concession (mining, oil palm, wood fiber, logging).
    Concession {
        /// Use type name as given on the wire.
        use_type: String,
        /// Concession row identifier.
        id: String,
    },
    /// A WDPA protected area.
    ProtectedArea {
        /// WDPA identifier.
        wdpa_id: String,
    },
}

impl RegionSpec {
    /// A country, with its ISO code upper-cased.
    #[must_use]
    pub fn national(iso: &str) -> Self {
        Self::National {
            iso: iso.to_uppercase(),
        }
    }

    /// A first-level admin unit, with its ISO code upper-cased.
    #[must_use]
    pub fn province(iso: &str, id1: &str) -> Self {
        Self::Province {
            iso: iso.to_uppercase(),
            id1: id1.to_string(),
        }
    }

    /// A second-level admin unit, with its ISO code upper-cased.
    #[must_use]
    pub fn district(iso: &str, id1: &str, id2: &str) -> Self {
        Self::District {
            iso: iso.to_uppercase(),
            id1: id1.to_string(),
            id2: id2.to_string(),
        }
    }

    /// The kind of region, for logging and template selection.
    #[must_use]
    pub const fn kind(&self) -> RegionKind {
        match self {
            Self::World { .. } => RegionKind::World,
            Self::National { .. } => RegionKind::National,
            Self::Province { .. } => RegionKind::Province,
            Self::District { .. } => RegionKind::District,
            Self::Concession { .. } => RegionKind::Concession,
            Self::ProtectedArea { .. } => RegionKind::ProtectedArea,
        }
    }

    /// The ISO code for admin regions.
    #[must_use]
    pub fn iso(&self) -> Option<&str> {
        match self {
            Self::National { iso } | Self::Province { iso, .. } | Self::District { iso, .. } => {
                Some(iso)
            }
            _ => None,
        }
    }
}

/// Discriminant of [`RegionSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RegionKind {
    /// Arbitrary polygon.
    World,
    /// Country.
    National,
    /// First-level admin unit.
    Province,
    /// Second-level admin unit.
    District,
    /// Industrial-use concession.
    Concession,
    /// Protected area.
    ProtectedArea,
}

/// Maps a legacy use-type alias to the Carto table holding its polygons.
///
/// Unknown names are used as the table name verbatim.
#[must_use]
pub fn concession_table(use_type: &str) -> &str {
    match use_type {
        "mining" => "gfw_mining",
        "oilpalm" => "gfw_oil_palm",
        "fiber" => "gfw_wood_fiber",
        "logging" => "gfw_logging",
        other => other,
    }
}

/// One row of an aggregation query as returned by the spatial engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationRow {
    /// Alert category emitted by the engine (`defor`, `degrad`, ...).
    #[serde(default)]
    pub data_type: Option<String>,
    /// Aggregated value (hectares, or a count for polygon queries).
    #[serde(default)]
    pub value: Option<f64>,
    /// Region area in hectares, when the template selects it.
    #[serde(default)]
    pub area_ha: Option<f64>,
    /// Earliest alert date in the group.
    #[serde(default)]
    pub min_date: Option<String>,
    /// Latest alert date in the group.
    #[serde(default)]
    pub max_date: Option<String>,
}

/// Label a revised-schema category is reported under.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlertLabel {
    /// Clear-cut deforestation.
    Deforestation,
    /// Forest degradation.
    Degraded,
}

impl AlertLabel {
    /// `"defor"` is deforestation; every other category counts as degradation.
    #[must_use]
    pub fn from_category(category: Option<&str>) -> Self {
        match category {
            Some("defor") => Self::Deforestation,
            _ => Self::Degraded,
        }
    }
}

/// Unit reported alongside revised-schema values.
pub const HECTARES: &str = "ha";

/// A legacy-schema value entry: the engine row with its raw category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAlertValue {
    /// Raw category name.
    pub data_type: Option<String>,
    /// Aggregated value.
    pub value: Option<f64>,
    /// Earliest alert date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_date: Option<String>,
    /// Latest alert date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_date: Option<String>,
}

impl From<AggregationRow> for RawAlertValue {
    fn from(row: AggregationRow) -> Self {
        Self {
            data_type: row.data_type,
            value: row.value,
            min_date: row.min_date,
            max_date: row.max_date,
        }
    }
}

/// A revised-schema value entry with a mapped label and unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabeledAlertValue {
    /// Mapped category.
    pub label: AlertLabel,
    /// Aggregated value.
    pub value: Option<f64>,
    /// Always [`HECTARES`].
    pub unit: String,
    /// Earliest alert date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_date: Option<String>,
    /// Latest alert date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_date: Option<String>,
}

impl From<AggregationRow> for LabeledAlertValue {
    fn from(row: AggregationRow) -> Self {
        Self {
            label: AlertLabel::from_category(row.data_type.as_deref()),
            value: row.value,
            unit: HECTARES.to_string(),
            min_date: row.min_date,
            max_date: row.max_date,
        }
    }
}

/// A value entry in either generation's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlertValue {
    /// Revised-schema entry.
    Labeled(LabeledAlertValue),
    /// Legacy-schema entry.
    Raw(RawAlertValue),
}

/// The composed response for one region query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertResult {
    /// Region identifier echoed back (revised schema only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Period echoed back as `begin,end` (revised schema only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    /// Aggregated rows, possibly empty.
    pub value: Vec<AlertValue>,
    /// Region area in hectares, if known.
    pub area_ha: Option<f64>,
    /// Download links, absent when none could be derived.
    pub download_urls: Option<DownloadUrls>,
}

/// One latest-date row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestDate {
    /// Alert date as reported by the engine.
    pub date: Option<String>,
}
