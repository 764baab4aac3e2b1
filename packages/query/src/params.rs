//! Derives template bindings from a region, a period, and request options.

use std::collections::BTreeMap;

use geojson::{Geometry, Value as GeometryValue};
use imazon_alerts_models::{Generation, Period, RegionSpec, WorldGeometry, concession_table, geometry};

use crate::QueryError;
use crate::simplify::{self, AdminLevel};
use crate::store::TemplateName;

pub const BEGIN_VAR: &str = "begin";
pub const END_VAR: &str = "end";
pub const SUMMARY_VAR: &str = "additionalSelect";
pub const ISO_VAR: &str = "iso";
pub const ID1_VAR: &str = "id1";
pub const ID2_VAR: &str = "id2";
pub const SIMPLIFY_VAR: &str = "simplify";
pub const USE_TABLE_VAR: &str = "useTable";
pub const PID_VAR: &str = "pid";
pub const WDPA_VAR: &str = "wdpaid";
pub const GEOJSON_VAR: &str = "geojson";
pub const LIMIT_VAR: &str = "limit";
pub const TABLE_VAR: &str = "table";
pub const LEVEL_VAR: &str = "level";
pub const GID_VAR: &str = "gid";

/// Summary columns added to aggregation queries when alert dates are
/// requested.
pub const SUMMARY_SELECT: &str = ", MIN(date) as min_date, MAX(date) as max_date ";

/// Variable bindings for one template render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterMap(BTreeMap<&'static str, String>);

impl ParameterMap {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `key` to `value`, replacing any previous binding.
    pub fn insert(&mut self, key: &'static str, value: impl Into<String>) {
        self.0.insert(key, value.into());
    }

    /// The binding for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// A copy with the summary columns removed.
    #[must_use]
    pub fn without_summary(&self) -> Self {
        let mut params = self.clone();
        params.insert(SUMMARY_VAR, "");
        params
    }
}

/// GADM identifiers for each level of an admin hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminGid {
    /// `{iso}.{id1}_1`, when a first-level id is given.
    pub adm1: Option<String>,
    /// `{iso}.{id1}.{id2}_1`, when both lower-level ids are given.
    pub adm2: Option<String>,
}

/// Builds dotted GADM identifiers from route identifiers.
#[must_use]
pub fn admin_gid(iso: &str, id1: Option<&str>, id2: Option<&str>) -> AdminGid {
    AdminGid {
        adm1: id1.map(|id1| format!("{iso}.{id1}_1")),
        adm2: id1
            .zip(id2)
            .map(|(id1, id2)| format!("{iso}.{id1}.{id2}_1")),
    }
}

/// Builds template bindings for one generation.
#[derive(Debug, Clone, Copy)]
pub struct ParameterBuilder {
    generation: Generation,
}

impl ParameterBuilder {
    /// A builder for `generation`.
    #[must_use]
    pub const fn new(generation: Generation) -> Self {
        Self { generation }
    }

    /// Bindings for the aggregation template of `region`.
    ///
    /// `World` regions must already carry inline geometry; geostore hashes
    /// are resolved by the composer first.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRegion`] if a required identifier is
    /// empty, an identifier substituted unquoted is not a plain token, or a
    /// polygon has no geometry.
    pub fn build(
        &self,
        region: &RegionSpec,
        period: &Period,
        alert_query: bool,
    ) -> Result<ParameterMap, QueryError> {
        let mut params = ParameterMap::new();
        params.insert(BEGIN_VAR, period.begin_str());
        params.insert(END_VAR, period.end_str());
        params.insert(SUMMARY_VAR, if alert_query { SUMMARY_SELECT } else { "" });

        match region {
            RegionSpec::World { geometry } => {
                params.insert(GEOJSON_VAR, geometry_json(geometry)?);
            }
            RegionSpec::National { iso } => {
                let iso = required("iso", iso)?;
                params.insert(ISO_VAR, iso);
                if self.generation == Generation::V2 {
                    params.insert(
                        SIMPLIFY_VAR,
                        simplify::threshold(iso, AdminLevel::National).to_string(),
                    );
                }
            }
            RegionSpec::Province { iso, id1 } => {
                let iso = required("iso", iso)?;
                let id1 = required("id1", id1)?;
                params.insert(ISO_VAR, iso);
                match self.generation {
                    Generation::V1 => params.insert(ID1_VAR, numeric("id1", id1)?),
                    Generation::V2 => {
                        let gid = admin_gid(iso, Some(id1), None);
                        params.insert(ID1_VAR, gid.adm1.unwrap_or_default());
                        params.insert(
                            SIMPLIFY_VAR,
                            simplify::threshold(iso, AdminLevel::Subnational).to_string(),
                        );
                    }
                }
            }
            RegionSpec::District { iso, id1, id2 } => {
                let iso = required("iso", iso)?;
                let id1 = required("id1", id1)?;
                let id2 = required("id2", id2)?;
                let gid = admin_gid(iso, Some(id1), Some(id2));
                params.insert(ISO_VAR, iso);
                params.insert(ID1_VAR, gid.adm1.unwrap_or_default());
                params.insert(ID2_VAR, gid.adm2.unwrap_or_default());
                params.insert(
                    SIMPLIFY_VAR,
                    simplify::threshold(iso, AdminLevel::Subnational).to_string(),
                );
            }
            RegionSpec::Concession { use_type, id } => {
                params.insert(USE_TABLE_VAR, self.use_table(use_type)?);
                params.insert(PID_VAR, numeric("id", id)?);
            }
            RegionSpec::ProtectedArea { wdpa_id } => {
                params.insert(WDPA_VAR, numeric("wdpaId", wdpa_id)?);
            }
        }

        Ok(params)
    }

    /// Template and bindings for the plain-area lookup of `region`.
    ///
    /// Returns `None` for polygons, which have no stored area.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRegion`] under the same conditions as
    /// [`ParameterBuilder::build`].
    pub fn area_lookup(
        &self,
        region: &RegionSpec,
    ) -> Result<Option<(TemplateName, ParameterMap)>, QueryError> {
        let mut params = ParameterMap::new();
        let name = match region {
            RegionSpec::World { .. } => return Ok(None),
            RegionSpec::National { iso } => {
                admin_area(&mut params, "gadm36_countries", "0", required("iso", iso)?);
                TemplateName::AdminArea
            }
            RegionSpec::Province { iso, id1 } => {
                let gid = admin_gid(required("iso", iso)?, Some(required("id1", id1)?), None);
                admin_area(&mut params, "gadm36_adm1", "1", &gid.adm1.unwrap_or_default());
                TemplateName::AdminArea
            }
            RegionSpec::District { iso, id1, id2 } => {
                let gid = admin_gid(
                    required("iso", iso)?,
                    Some(required("id1", id1)?),
                    Some(required("id2", id2)?),
                );
                admin_area(&mut params, "gadm36_adm2", "2", &gid.adm2.unwrap_or_default());
                TemplateName::AdminArea
            }
            RegionSpec::Concession { use_type, id } => {
                params.insert(USE_TABLE_VAR, self.use_table(use_type)?);
                params.insert(PID_VAR, numeric("id", id)?);
                TemplateName::ConcessionArea
            }
            RegionSpec::ProtectedArea { wdpa_id } => {
                params.insert(WDPA_VAR, numeric("wdpaId", wdpa_id)?);
                TemplateName::ProtectedAreaArea
            }
        };
        Ok(Some((name, params)))
    }

    /// Bindings for the latest-date template.
    #[must_use]
    pub fn latest(&self, limit: u32) -> ParameterMap {
        let mut params = ParameterMap::new();
        if self.generation == Generation::V1 {
            params.insert(LIMIT_VAR, limit.to_string());
        }
        params
    }

    /// Legacy use types go through the alias table; revised ones name the
    /// table directly.
    fn use_table<'a>(&self, use_type: &'a str) -> Result<&'a str, QueryError> {
        let use_type = required("useType", use_type)?;
        let table = match self.generation {
            Generation::V1 => concession_table(use_type),
            Generation::V2 => use_type,
        };
        if table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            Ok(table)
        } else {
            Err(QueryError::InvalidRegion {
                message: format!("'{use_type}' is not a valid use type"),
            })
        }
    }
}

fn admin_area(params: &mut ParameterMap, table: &str, level: &str, gid: &str) {
    params.insert(TABLE_VAR, table);
    params.insert(LEVEL_VAR, level);
    params.insert(GID_VAR, gid);
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, QueryError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(QueryError::InvalidRegion {
            message: format!("Missing {field}"),
        });
    }
    Ok(value)
}

/// Identifiers substituted into SQL without quotes must be plain integers.
fn numeric<'a>(field: &str, value: &'a str) -> Result<&'a str, QueryError> {
    let value = required(field, value)?;
    if value.chars().all(|c| c.is_ascii_digit()) {
        Ok(value)
    } else {
        Err(QueryError::InvalidRegion {
            message: format!("{field} must be numeric, got '{value}'"),
        })
    }
}

fn geometry_json(world: &WorldGeometry) -> Result<String, QueryError> {
    let WorldGeometry::Inline(collection) = world else {
        return Err(QueryError::InvalidRegion {
            message: "Polygon geometry has not been resolved".to_string(),
        });
    };
    let geometry = geometry::first_geometry(collection).ok_or_else(|| QueryError::InvalidRegion {
        message: "GeoJSON has no feature geometry".to_string(),
    })?;
    let json = serde_json::to_string(&bare(geometry)).map_err(|e| QueryError::InvalidRegion {
        message: format!("GeoJSON geometry cannot be serialized: {e}"),
    })?;
    Ok(json.replace('\'', "''"))
}

/// Type and coordinates only. Foreign members and bounding boxes are
/// dropped at every nesting level.
fn bare(geometry: &Geometry) -> Geometry {
    match &geometry.value {
        GeometryValue::GeometryCollection(members) => Geometry::new(
            GeometryValue::GeometryCollection(members.iter().map(bare).collect()),
        ),
        value => Geometry::new(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period() -> Period {
        Period::parse("2020-01-01,2020-06-30").unwrap()
    }

    #[test]
    fn always_binds_period_bounds() {
        let params = ParameterBuilder::new(Generation::V1)
            .build(&RegionSpec::national("BRA"), &period(), false)
            .unwrap();
        assert_eq!(params.get(BEGIN_VAR), Some("2020-01-01"));
        assert_eq!(params.get(END_VAR), Some("2020-06-30"));
        assert_eq!(params.get(SUMMARY_VAR), Some(""));
    }

    #[test]
    fn alert_query_binds_summary_columns() {
        let params = ParameterBuilder::new(Generation::V2)
            .build(&RegionSpec::national("PER"), &period(), true)
            .unwrap();
        assert_eq!(params.get(SUMMARY_VAR), Some(SUMMARY_SELECT));
        assert!(params.without_summary().get(SUMMARY_VAR) == Some(""));
    }

    #[test]
    fn admin_gid_concatenates_ancestors() {
        assert_eq!(
            admin_gid("BRA", Some("05"), Some("001")),
            AdminGid {
                adm1: Some("BRA.05_1".to_string()),
                adm2: Some("BRA.05.001_1".to_string()),
            }
        );
        let national = admin_gid("BRA", None, None);
        assert_eq!(national.adm1, None);
        assert_eq!(national.adm2, None);
    }

    #[test]
    fn v2_district_uses_gadm_ids_and_scaled_threshold() {
        let params = ParameterBuilder::new(Generation::V2)
            .build(&RegionSpec::district("bra", "05", "001"), &period(), false)
            .unwrap();
        assert_eq!(params.get(ISO_VAR), Some("BRA"));
        assert_eq!(params.get(ID1_VAR), Some("BRA.05_1"));
        assert_eq!(params.get(ID2_VAR), Some("BRA.05.001_1"));
        assert_eq!(params.get(SIMPLIFY_VAR), Some("0.0005"));
    }

    #[test]
    fn v2_national_threshold() {
        let builder = ParameterBuilder::new(Generation::V2);
        let bra = builder
            .build(&RegionSpec::national("BRA"), &period(), false)
            .unwrap();
        let per = builder
            .build(&RegionSpec::national("PER"), &period(), false)
            .unwrap();
        assert_eq!(bra.get(SIMPLIFY_VAR), Some("0.05"));
        assert_eq!(per.get(SIMPLIFY_VAR), Some("0.005"));
    }

    #[test]
    fn v1_binds_raw_ids_without_threshold() {
        let params = ParameterBuilder::new(Generation::V1)
            .build(&RegionSpec::province("BRA", "12"), &period(), false)
            .unwrap();
        assert_eq!(params.get(ID1_VAR), Some("12"));
        assert_eq!(params.get(SIMPLIFY_VAR), None);
    }

    #[test]
    fn v1_resolves_use_aliases() {
        let region = RegionSpec::Concession {
            use_type: "oilpalm".to_string(),
            id: "17".to_string(),
        };
        let v1 = ParameterBuilder::new(Generation::V1)
            .build(&region, &period(), false)
            .unwrap();
        let v2 = ParameterBuilder::new(Generation::V2)
            .build(&region, &period(), false)
            .unwrap();
        assert_eq!(v1.get(USE_TABLE_VAR), Some("gfw_oil_palm"));
        assert_eq!(v2.get(USE_TABLE_VAR), Some("oilpalm"));
        assert_eq!(v1.get(PID_VAR), Some("17"));
    }

    #[test]
    fn rejects_missing_identifiers() {
        let builder = ParameterBuilder::new(Generation::V2);
        for region in [
            RegionSpec::national(""),
            RegionSpec::province("BRA", " "),
            RegionSpec::district("BRA", "05", ""),
            RegionSpec::ProtectedArea {
                wdpa_id: String::new(),
            },
        ] {
            assert!(
                matches!(
                    builder.build(&region, &period(), false),
                    Err(QueryError::InvalidRegion { .. })
                ),
                "{region:?}"
            );
        }
    }

    #[test]
    fn rejects_unquoted_identifiers_that_are_not_plain_tokens() {
        let builder = ParameterBuilder::new(Generation::V2);
        let injected = RegionSpec::ProtectedArea {
            wdpa_id: "1 OR 1=1".to_string(),
        };
        assert!(matches!(
            builder.build(&injected, &period(), false),
            Err(QueryError::InvalidRegion { .. })
        ));
        let bad_table = RegionSpec::Concession {
            use_type: "gfw_mining; DROP".to_string(),
            id: "1".to_string(),
        };
        assert!(matches!(
            builder.build(&bad_table, &period(), false),
            Err(QueryError::InvalidRegion { .. })
        ));
    }

    #[test]
    fn polygon_binds_first_geometry() {
        let geojson = geojson::GeoJson::from_json_value(serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[-60.0, -3.0], [-59.0, -3.0], [-59.0, -2.0], [-60.0, -3.0]]]
        }))
        .unwrap();
        let region = RegionSpec::World {
            geometry: WorldGeometry::Inline(geometry::normalize(geojson)),
        };
        let params = ParameterBuilder::new(Generation::V1)
            .build(&region, &period(), false)
            .unwrap();
        let bound: serde_json::Value =
            serde_json::from_str(params.get(GEOJSON_VAR).unwrap()).unwrap();
        assert_eq!(bound["type"], "Polygon");
    }

    #[test]
    fn polygon_binding_keeps_only_type_and_coordinates() {
        let injected = "')), 4326), 0.01), 3857) g); DROP TABLE imazon_sad; --";
        let geojson = geojson::GeoJson::from_json_value(serde_json::json!({
            "type": "GeometryCollection",
            "bbox": [-60.0, -3.0, -59.0, -2.0],
            "x": injected,
            "geometries": [{
                "type": "Polygon",
                "coordinates": [[[-60.0, -3.0], [-59.0, -3.0], [-59.0, -2.0], [-60.0, -3.0]]],
                "y": injected
            }]
        }))
        .unwrap();
        let region = RegionSpec::World {
            geometry: WorldGeometry::Inline(geometry::normalize(geojson)),
        };
        let params = ParameterBuilder::new(Generation::V2)
            .build(&region, &period(), false)
            .unwrap();

        let bound: serde_json::Value =
            serde_json::from_str(params.get(GEOJSON_VAR).unwrap()).unwrap();
        assert!(bound.get("x").is_none());
        assert!(bound.get("bbox").is_none());
        assert!(bound["geometries"][0].get("y").is_none());
        assert_eq!(bound["geometries"][0]["type"], "Polygon");

        let sql = crate::store::TemplateStore::new(Generation::V2)
            .unwrap()
            .get(TemplateName::World)
            .unwrap()
            .render(&params)
            .unwrap();
        assert!(!sql.contains("DROP TABLE"));
        assert_eq!(sql.matches('\'').count() % 2, 0);
    }

    #[test]
    fn unresolved_geostore_cannot_be_bound() {
        let region = RegionSpec::World {
            geometry: WorldGeometry::Geostore {
                hash: "abc".to_string(),
            },
        };
        assert!(matches!(
            ParameterBuilder::new(Generation::V2).build(&region, &period(), false),
            Err(QueryError::InvalidRegion { .. })
        ));
    }

    #[test]
    fn area_lookups_per_region() {
        let builder = ParameterBuilder::new(Generation::V2);
        let (name, params) = builder
            .area_lookup(&RegionSpec::province("BRA", "05"))
            .unwrap()
            .unwrap();
        assert_eq!(name, TemplateName::AdminArea);
        assert_eq!(params.get(TABLE_VAR), Some("gadm36_adm1"));
        assert_eq!(params.get(LEVEL_VAR), Some("1"));
        assert_eq!(params.get(GID_VAR), Some("BRA.05_1"));

        let (name, params) = builder
            .area_lookup(&RegionSpec::national("BRA"))
            .unwrap()
            .unwrap();
        assert_eq!(name, TemplateName::AdminArea);
        assert_eq!(params.get(GID_VAR), Some("BRA"));

        let (name, _) = builder
            .area_lookup(&RegionSpec::ProtectedArea {
                wdpa_id: "555".to_string(),
            })
            .unwrap()
            .unwrap();
        assert_eq!(name, TemplateName::ProtectedAreaArea);

        let world = RegionSpec::World {
            geometry: WorldGeometry::Geostore {
                hash: "abc".to_string(),
            },
        };
        assert!(builder.area_lookup(&world).unwrap().is_none());
    }
}
