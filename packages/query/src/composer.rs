//! Turns an alert request into an [`AlertResult`].
//!
//! Each request runs as a small state machine:
//!
//! ```text
//! Resolving -> Querying -> Success
//!                       -> FallbackPlainArea -> Success
//!                                            -> FallbackResolver -> Success
//!                                                                -> NotFound
//! ```
//!
//! `Resolving` swaps a geostore hash for its geometry, consults the region
//! resolver when the generation requires it, and short-circuits regions
//! the dataset does not cover. `Querying` runs the aggregation template.
//! The two fallback stages only run for generations with tiered fallback,
//! and only when the aggregation produced no categorized rows.

use std::sync::Arc;

use imazon_alerts_models::{
    AggregationRow, AlertResult, AlertValue, DownloadUrls, LatestDate, Period, RegionSpec,
    WorldGeometry, geometry,
};
use serde_json::Value;
use strum_macros::AsRefStr;

use crate::downloads::DownloadLinks;
use crate::params::{LIMIT_VAR, ParameterBuilder, ParameterMap};
use crate::profile::GenerationProfile;
use crate::store::{TemplateName, TemplateStore};
use crate::{
    ExecutionError, QueryError, RegionArea, RegionResolver, ResolveError, Row, SpatialExecutor,
};

/// One alert aggregation request.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRequest {
    /// Region to aggregate over.
    pub region: RegionSpec,
    /// Whether to report first and last alert dates per category.
    pub alert_query: bool,
    /// Date range.
    pub period: Period,
    /// Key forwarded to the region resolver.
    pub api_key: Option<String>,
}

/// What has been learned about the region before aggregating.
#[derive(Debug)]
struct Context {
    region: RegionSpec,
    params: ParameterMap,
    area_ha: Option<f64>,
}

#[derive(Debug, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
enum Stage {
    Resolving,
    Querying(Context),
    FallbackPlainArea(Context),
    FallbackResolver(Context),
    Success(AlertResult),
    NotFound,
}

/// Composes alert results for one generation.
pub struct QueryComposer {
    profile: &'static GenerationProfile,
    store: Arc<TemplateStore>,
    builder: ParameterBuilder,
    downloads: DownloadLinks,
    executor: Arc<dyn SpatialExecutor>,
    resolver: Arc<dyn RegionResolver>,
}

impl QueryComposer {
    /// A composer for the generation of `store`, with download links
    /// pointing at `api_url`.
    #[must_use]
    pub fn new(
        store: Arc<TemplateStore>,
        api_url: impl Into<String>,
        executor: Arc<dyn SpatialExecutor>,
        resolver: Arc<dyn RegionResolver>,
    ) -> Self {
        let generation = store.generation();
        Self {
            profile: GenerationProfile::for_generation(generation),
            builder: ParameterBuilder::new(generation),
            downloads: DownloadLinks::new(api_url, Arc::clone(&store)),
            store,
            executor,
            resolver,
        }
    }

    /// Profile this composer follows.
    #[must_use]
    pub const fn profile(&self) -> &'static GenerationProfile {
        self.profile
    }

    /// Whether this generation registers template `name`.
    #[must_use]
    pub fn supports(&self, name: TemplateName) -> bool {
        self.store.get(name).is_ok()
    }

    /// Aggregates alerts for `request`.
    ///
    /// Returns `Ok(None)` when every fallback tier missed.
    ///
    /// # Errors
    ///
    /// * [`QueryError::InvalidRegion`] if an identifier cannot be bound
    /// * [`QueryError::RegionNotFound`] if the resolver does not know a
    ///   region that must be resolved before querying
    /// * [`QueryError::Execution`] if the spatial engine fails
    /// * [`QueryError::Resolver`] if the resolver fails outright
    pub async fn resolve(&self, request: &AlertRequest) -> Result<Option<AlertResult>, QueryError> {
        let mut stage = Stage::Resolving;
        loop {
            log::debug!(
                "{} {} request: {}",
                self.profile.generation,
                request.region.kind(),
                stage.as_ref()
            );
            stage = match stage {
                Stage::Resolving => self.resolving(request).await?,
                Stage::Querying(ctx) => self.querying(request, ctx).await?,
                Stage::FallbackPlainArea(ctx) => self.fallback_plain_area(request, ctx).await?,
                Stage::FallbackResolver(ctx) => self.fallback_resolver(request, ctx).await?,
                Stage::Success(result) => return Ok(Some(result)),
                Stage::NotFound => return Ok(None),
            };
        }
    }

    /// Whether the latest-date template binds a row limit.
    #[must_use]
    pub fn latest_takes_limit(&self) -> bool {
        self.store
            .get(TemplateName::LatestDate)
            .is_ok_and(|template| template.variables().any(|v| v == LIMIT_VAR))
    }

    /// Most recent alert dates, newest first.
    ///
    /// `limit` is ignored unless [`Self::latest_takes_limit`].
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRegion`] for a zero limit where one is
    /// bound and [`QueryError::Execution`] if the spatial engine fails.
    pub async fn latest(&self, limit: Option<u32>) -> Result<Vec<LatestDate>, QueryError> {
        let template = self.store.get(TemplateName::LatestDate)?;
        let limit = limit.unwrap_or(self.profile.default_latest_limit);
        if limit == 0 && self.latest_takes_limit() {
            return Err(QueryError::InvalidRegion {
                message: "limit must be positive".to_string(),
            });
        }
        let sql = template.render(&self.builder.latest(limit))?;
        let rows = self.executor.execute(&sql).await?;
        let column = self.profile.latest_column;
        Ok(rows
            .iter()
            .map(|row| LatestDate {
                date: row.get(column).and_then(Value::as_str).map(str::to_string),
            })
            .collect())
    }

    async fn resolving(&self, request: &AlertRequest) -> Result<Stage, QueryError> {
        let api_key = request.api_key.as_deref();
        let mut region = request.region.clone();
        let mut area_ha = None;

        if let RegionSpec::World {
            geometry: WorldGeometry::Geostore { hash },
        } = &request.region
        {
            let resolved = self.required_lookup(&request.region, api_key).await?;
            let geojson = resolved.geojson.ok_or_else(|| QueryError::RegionNotFound {
                message: format!("Geostore {hash} has no geometry"),
            })?;
            region = RegionSpec::World {
                geometry: WorldGeometry::Inline(geometry::normalize(geojson)),
            };
            area_ha = resolved.area_ha;
        }

        let params = self
            .builder
            .build(&region, &request.period, request.alert_query)?;

        if self.profile.resolve_regions && !matches!(request.region, RegionSpec::World { .. }) {
            area_ha = self.required_lookup(&region, api_key).await?.area_ha;
        }

        if self.profile.is_uncovered(region.kind(), region.iso()) {
            log::debug!(
                "Skipping aggregation for {} outside the alert dataset",
                region.iso().unwrap_or_default()
            );
            if !self.profile.resolve_regions {
                area_ha = match self.lookup(&region, api_key).await {
                    Ok(resolved) => resolved.area_ha,
                    Err(ResolveError::NotFound) => None,
                    Err(ResolveError::Failed(message)) => {
                        return Err(QueryError::Resolver { message });
                    }
                };
            }
            return Ok(Stage::Success(self.result(
                request,
                Vec::new(),
                area_ha,
                None,
            )));
        }

        Ok(Stage::Querying(Context {
            region,
            params,
            area_ha,
        }))
    }

    async fn querying(&self, request: &AlertRequest, ctx: Context) -> Result<Stage, QueryError> {
        let name = TemplateName::for_region(ctx.region.kind());
        let sql = self.store.get(name)?.render(&ctx.params)?;
        log::debug!("{} {name} query: {sql}", self.profile.generation);

        let rows = aggregation_rows(self.executor.execute(&sql).await?)?;

        if rows.is_empty() {
            if self.profile.tiered_fallback && !matches!(ctx.region, RegionSpec::World { .. }) {
                return Ok(Stage::FallbackPlainArea(ctx));
            }
            return Ok(Stage::Success(self.result(
                request,
                Vec::new(),
                ctx.area_ha,
                None,
            )));
        }

        let area_ha = if self.profile.area_from_rows {
            rows[0].area_ha.or(ctx.area_ha)
        } else {
            ctx.area_ha
        };
        let values = rows
            .into_iter()
            .map(|row| {
                if self.profile.label_rows {
                    AlertValue::Labeled(row.into())
                } else {
                    AlertValue::Raw(row.into())
                }
            })
            .collect();
        let download_urls = self.downloads.urls(name, &ctx.params);

        Ok(Stage::Success(self.result(
            request,
            values,
            area_ha,
            download_urls,
        )))
    }

    async fn fallback_plain_area(
        &self,
        request: &AlertRequest,
        ctx: Context,
    ) -> Result<Stage, QueryError> {
        let Some((name, params)) = self.builder.area_lookup(&ctx.region)? else {
            return Ok(Stage::FallbackResolver(ctx));
        };
        let sql = self.store.get(name)?.render(&params)?;
        log::debug!("{} {name} query: {sql}", self.profile.generation);

        let rows = self.executor.execute(&sql).await?;
        match rows.first().and_then(|row| row.get("area_ha")).and_then(Value::as_f64) {
            Some(area_ha) => Ok(Stage::Success(self.result(
                request,
                Vec::new(),
                Some(area_ha),
                None,
            ))),
            None => {
                log::warn!(
                    "No alerts or stored area for {} region, asking the resolver",
                    ctx.region.kind()
                );
                Ok(Stage::FallbackResolver(ctx))
            }
        }
    }

    async fn fallback_resolver(
        &self,
        request: &AlertRequest,
        ctx: Context,
    ) -> Result<Stage, QueryError> {
        match self.lookup(&ctx.region, request.api_key.as_deref()).await {
            Ok(resolved) => Ok(Stage::Success(self.result(
                request,
                Vec::new(),
                resolved.area_ha,
                None,
            ))),
            Err(ResolveError::NotFound) => {
                log::warn!("Resolver has no {} region either", ctx.region.kind());
                Ok(Stage::NotFound)
            }
            Err(ResolveError::Failed(message)) => Err(QueryError::Resolver { message }),
        }
    }

    async fn lookup(
        &self,
        region: &RegionSpec,
        api_key: Option<&str>,
    ) -> Result<RegionArea, ResolveError> {
        match region {
            RegionSpec::World {
                geometry: WorldGeometry::Geostore { hash },
            } => self.resolver.by_hash(hash, api_key).await,
            RegionSpec::World {
                geometry: WorldGeometry::Inline(_),
            } => Ok(RegionArea::default()),
            RegionSpec::National { iso } => self.resolver.by_iso(iso, api_key).await,
            RegionSpec::Province { iso, id1 } => {
                self.resolver.by_iso_and_id(iso, id1, api_key).await
            }
            RegionSpec::District { iso, id1, id2 } => {
                self.resolver.by_iso_and_ids(iso, id1, id2, api_key).await
            }
            RegionSpec::Concession { use_type, id } => {
                self.resolver.by_use(use_type, id, api_key).await
            }
            RegionSpec::ProtectedArea { wdpa_id } => self.resolver.by_wdpa(wdpa_id, api_key).await,
        }
    }

    /// A lookup where a miss means the request names a nonexistent region.
    async fn required_lookup(
        &self,
        region: &RegionSpec,
        api_key: Option<&str>,
    ) -> Result<RegionArea, QueryError> {
        self.lookup(region, api_key).await.map_err(|e| match e {
            ResolveError::NotFound => QueryError::RegionNotFound {
                message: describe(region),
            },
            ResolveError::Failed(message) => QueryError::Resolver { message },
        })
    }

    fn result(
        &self,
        request: &AlertRequest,
        value: Vec<AlertValue>,
        area_ha: Option<f64>,
        download_urls: Option<DownloadUrls>,
    ) -> AlertResult {
        let echoed = request.region.iso().filter(|_| self.profile.echo_request);
        AlertResult {
            id: echoed.map(str::to_string),
            period: echoed.map(|_| request.period.to_string()),
            value,
            area_ha,
            download_urls,
        }
    }
}

/// Decodes engine rows, dropping rows without a category. An outer join
/// against a region with no alerts yields a single such row.
fn aggregation_rows(rows: Vec<Row>) -> Result<Vec<AggregationRow>, QueryError> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let row: AggregationRow = serde_json::from_value(Value::Object(row))
            .map_err(|e| ExecutionError::Response(format!("Unreadable aggregation row: {e}")))?;
        if row.data_type.is_some() {
            out.push(row);
        }
    }
    Ok(out)
}

fn describe(region: &RegionSpec) -> String {
    match region {
        RegionSpec::World {
            geometry: WorldGeometry::Geostore { hash },
        } => format!("geostore {hash}"),
        RegionSpec::World { .. } => "polygon".to_string(),
        RegionSpec::National { iso } => format!("country {iso}"),
        RegionSpec::Province { iso, id1 } => format!("admin {iso}/{id1}"),
        RegionSpec::District { iso, id1, id2 } => format!("admin {iso}/{id1}/{id2}"),
        RegionSpec::Concession { use_type, id } => format!("use {use_type}/{id}"),
        RegionSpec::ProtectedArea { wdpa_id } => format!("wdpa {wdpa_id}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use imazon_alerts_models::{AlertLabel, DownloadFormat, Generation, HECTARES};
    use serde_json::json;

    use super::*;

    const API: &str = "https://wri-01.carto.com/api/v2/sql";

    /// Replays canned responses in order and records every query.
    #[derive(Default)]
    struct ScriptedExecutor {
        responses: Mutex<VecDeque<Result<Vec<Row>, ExecutionError>>>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn with(responses: Vec<Result<Vec<Row>, ExecutionError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                queries: Mutex::default(),
            })
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SpatialExecutor for ScriptedExecutor {
        async fn execute(&self, sql: &str) -> Result<Vec<Row>, ExecutionError> {
            self.queries.lock().unwrap().push(sql.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Answers lookups from a fixed table keyed by call, recording each
    /// call. Unknown keys are misses.
    #[derive(Default)]
    struct ScriptedResolver {
        known: BTreeMap<String, Result<RegionArea, ResolveError>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedResolver {
        fn with(entries: Vec<(&str, Result<RegionArea, ResolveError>)>) -> Arc<Self> {
            Arc::new(Self {
                known: entries
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), value))
                    .collect(),
                calls: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn answer(&self, key: String) -> Result<RegionArea, ResolveError> {
            let answer = self
                .known
                .get(&key)
                .cloned()
                .unwrap_or(Err(ResolveError::NotFound));
            self.calls.lock().unwrap().push(key);
            answer
        }
    }

    #[async_trait]
    impl RegionResolver for ScriptedResolver {
        async fn by_iso(&self, iso: &str, _: Option<&str>) -> Result<RegionArea, ResolveError> {
            self.answer(format!("iso:{iso}"))
        }

        async fn by_iso_and_id(
            &self,
            iso: &str,
            id1: &str,
            _: Option<&str>,
        ) -> Result<RegionArea, ResolveError> {
            self.answer(format!("iso:{iso}/{id1}"))
        }

        async fn by_iso_and_ids(
            &self,
            iso: &str,
            id1: &str,
            id2: &str,
            _: Option<&str>,
        ) -> Result<RegionArea, ResolveError> {
            self.answer(format!("iso:{iso}/{id1}/{id2}"))
        }

        async fn by_use(
            &self,
            use_type: &str,
            id: &str,
            _: Option<&str>,
        ) -> Result<RegionArea, ResolveError> {
            self.answer(format!("use:{use_type}/{id}"))
        }

        async fn by_wdpa(&self, wdpa_id: &str, _: Option<&str>) -> Result<RegionArea, ResolveError> {
            self.answer(format!("wdpa:{wdpa_id}"))
        }

        async fn by_hash(&self, hash: &str, api_key: Option<&str>) -> Result<RegionArea, ResolveError> {
            self.answer(format!("hash:{hash}:{}", api_key.unwrap_or("-")))
        }
    }

    fn rows(value: serde_json::Value) -> Vec<Row> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row.as_object().unwrap().clone())
            .collect()
    }

    fn area(area_ha: f64) -> Result<RegionArea, ResolveError> {
        Ok(RegionArea {
            area_ha: Some(area_ha),
            geojson: None,
        })
    }

    fn composer(
        generation: Generation,
        executor: &Arc<ScriptedExecutor>,
        resolver: &Arc<ScriptedResolver>,
    ) -> QueryComposer {
        QueryComposer::new(
            Arc::new(TemplateStore::new(generation).unwrap()),
            API,
            Arc::clone(executor) as Arc<dyn SpatialExecutor>,
            Arc::clone(resolver) as Arc<dyn RegionResolver>,
        )
    }

    fn request(region: RegionSpec) -> AlertRequest {
        AlertRequest {
            region,
            alert_query: false,
            period: Period::parse("2020-01-01,2020-12-31").unwrap(),
            api_key: None,
        }
    }

    #[tokio::test]
    async fn revised_district_labels_rows() {
        let executor = ScriptedExecutor::with(vec![Ok(rows(json!([
            {"data_type": "defor", "value": 120.5, "area_ha": 9876.0}
        ])))]);
        let resolver = ScriptedResolver::with(vec![]);
        let result = composer(Generation::V2, &executor, &resolver)
            .resolve(&request(RegionSpec::district("BRA", "05", "001")))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.value.len(), 1);
        let AlertValue::Labeled(value) = &result.value[0] else {
            panic!("expected labelled value, got {:?}", result.value[0]);
        };
        assert_eq!(value.label, AlertLabel::Deforestation);
        assert_eq!(value.value, Some(120.5));
        assert_eq!(value.unit, HECTARES);
        assert_eq!(result.area_ha, Some(9876.0));
        assert_eq!(result.id.as_deref(), Some("BRA"));
        assert_eq!(result.period.as_deref(), Some("2020-01-01,2020-12-31"));

        let formats: Vec<DownloadFormat> = result.download_urls.unwrap().into_keys().collect();
        assert_eq!(
            formats,
            vec![
                DownloadFormat::Csv,
                DownloadFormat::Json,
                DownloadFormat::Kml,
                DownloadFormat::Shp,
                DownloadFormat::Svg,
            ]
        );

        let queries = executor.queries();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("gid_2 = 'BRA.05.001_1'"));
        assert!(queries[0].contains("st_simplify(the_geom_webmercator, 0.0005)"));
        assert!(resolver.calls().is_empty());
    }

    #[tokio::test]
    async fn revised_national_brazil_with_rows() {
        let executor = ScriptedExecutor::with(vec![Ok(rows(json!([
            {"data_type": "defor", "value": 10.0, "area_ha": 851_000_000.0},
            {"data_type": "degrad", "value": 4.0, "area_ha": 851_000_000.0}
        ])))]);
        let resolver = ScriptedResolver::with(vec![]);
        let result = composer(Generation::V2, &executor, &resolver)
            .resolve(&request(RegionSpec::national("bra")))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.value.len(), 2);
        assert!(matches!(
            &result.value[1],
            AlertValue::Labeled(v) if v.label == AlertLabel::Degraded
        ));
        assert_eq!(result.area_ha, Some(851_000_000.0));
        assert!(result.download_urls.is_some());
    }

    #[tokio::test]
    async fn revised_national_brazil_without_rows_walks_every_tier() {
        let executor = ScriptedExecutor::with(vec![Ok(Vec::new()), Ok(Vec::new())]);
        let resolver = ScriptedResolver::with(vec![]);
        let result = composer(Generation::V2, &executor, &resolver)
            .resolve(&request(RegionSpec::national("BRA")))
            .await
            .unwrap();

        assert_eq!(result, None);
        let queries = executor.queries();
        assert_eq!(queries.len(), 2);
        assert!(queries[0].contains("imazon_sad"));
        assert!(queries[1].starts_with("SELECT area_ha FROM gadm36_countries WHERE gid_0 = 'BRA'"));
        assert_eq!(resolver.calls(), vec!["iso:BRA".to_string()]);
    }

    #[tokio::test]
    async fn uncategorized_join_row_counts_as_empty() {
        let executor = ScriptedExecutor::with(vec![
            Ok(rows(json!([{"data_type": null, "value": null, "area_ha": 12.0}]))),
            Ok(Vec::new()),
        ]);
        let resolver = ScriptedResolver::with(vec![("iso:BRA/05", area(77.0))]);
        let result = composer(Generation::V2, &executor, &resolver)
            .resolve(&request(RegionSpec::province("BRA", "05")))
            .await
            .unwrap()
            .unwrap();

        assert!(result.value.is_empty());
        assert_eq!(result.area_ha, Some(77.0));
        assert_eq!(result.download_urls, None);
        assert_eq!(executor.queries().len(), 2);
    }

    #[tokio::test]
    async fn protected_area_uses_plain_area_tier() {
        let executor = ScriptedExecutor::with(vec![
            Ok(Vec::new()),
            Ok(rows(json!([{"area_ha": 42.0}]))),
        ]);
        let resolver = ScriptedResolver::with(vec![]);
        let result = composer(Generation::V2, &executor, &resolver)
            .resolve(&request(RegionSpec::ProtectedArea {
                wdpa_id: "555".to_string(),
            }))
            .await
            .unwrap()
            .unwrap();

        assert!(result.value.is_empty());
        assert_eq!(result.area_ha, Some(42.0));
        assert_eq!(result.id, None);
        let queries = executor.queries();
        assert!(queries[1].contains("wdpaid = 555"));
        assert!(resolver.calls().is_empty());
    }

    #[tokio::test]
    async fn countries_outside_dataset_skip_aggregation() {
        for generation in [Generation::V1, Generation::V2] {
            let executor = ScriptedExecutor::with(vec![]);
            let resolver = ScriptedResolver::with(vec![("iso:PER", area(128_000_000.0))]);
            let result = composer(generation, &executor, &resolver)
                .resolve(&request(RegionSpec::national("per")))
                .await
                .unwrap()
                .unwrap();

            assert!(result.value.is_empty(), "{generation}");
            assert_eq!(result.area_ha, Some(128_000_000.0));
            assert!(executor.queries().is_empty(), "{generation}");
        }
    }

    #[tokio::test]
    async fn unknown_geostore_is_region_not_found() {
        for generation in [Generation::V1, Generation::V2] {
            let executor = ScriptedExecutor::with(vec![]);
            let resolver = ScriptedResolver::with(vec![]);
            let err = composer(generation, &executor, &resolver)
                .resolve(&request(RegionSpec::World {
                    geometry: WorldGeometry::Geostore {
                        hash: "does-not-exist".to_string(),
                    },
                }))
                .await
                .unwrap_err();

            assert!(matches!(err, QueryError::RegionNotFound { .. }), "{err}");
            assert!(executor.queries().is_empty());
        }
    }

    #[tokio::test]
    async fn geostore_geometry_is_queried_inline() {
        let geojson = geojson::GeoJson::from_json_value(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-60.0, -3.0], [-59.0, -3.0], [-59.0, -2.0], [-60.0, -3.0]]]
                }
            }]
        }))
        .unwrap();
        let executor = ScriptedExecutor::with(vec![Ok(rows(json!([
            {"data_type": "defor", "value": 3}
        ])))]);
        let resolver = ScriptedResolver::with(vec![(
            "hash:abc123:secret",
            Ok(RegionArea {
                area_ha: Some(1_100.0),
                geojson: Some(geojson),
            }),
        )]);
        let mut req = request(RegionSpec::World {
            geometry: WorldGeometry::Geostore {
                hash: "abc123".to_string(),
            },
        });
        req.api_key = Some("secret".to_string());

        let result = composer(Generation::V2, &executor, &resolver)
            .resolve(&req)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.area_ha, Some(1_100.0));
        assert_eq!(result.value.len(), 1);
        let sql = &executor.queries()[0];
        assert!(sql.contains("ST_GeomFromGeoJSON('{"));
        assert!(sql.contains(r#""type":"Polygon""#));
    }

    #[tokio::test]
    async fn legacy_rows_keep_raw_categories_and_resolver_area() {
        let executor = ScriptedExecutor::with(vec![Ok(rows(json!([
            {"data_type": "defor", "value": 8.5, "min_date": "2020-02-01", "max_date": "2020-11-30"}
        ])))]);
        let resolver = ScriptedResolver::with(vec![("iso:BRA", area(851_000_000.0))]);
        let mut req = request(RegionSpec::national("BRA"));
        req.alert_query = true;

        let result = composer(Generation::V1, &executor, &resolver)
            .resolve(&req)
            .await
            .unwrap()
            .unwrap();

        let AlertValue::Raw(value) = &result.value[0] else {
            panic!("expected raw value");
        };
        assert_eq!(value.data_type.as_deref(), Some("defor"));
        assert_eq!(value.min_date.as_deref(), Some("2020-02-01"));
        assert_eq!(result.area_ha, Some(851_000_000.0));
        assert_eq!(result.id, None);
        assert_eq!(result.period, None);
        assert!(
            result.download_urls.unwrap().contains_key(&DownloadFormat::Geojson)
        );
        assert!(executor.queries()[0].contains("MIN(date) as min_date"));
    }

    #[tokio::test]
    async fn legacy_empty_rows_return_resolver_area() {
        let executor = ScriptedExecutor::with(vec![Ok(rows(json!([
            {"data_type": null, "value": null}
        ])))]);
        let resolver = ScriptedResolver::with(vec![("use:mining/17", area(350.0))]);
        let result = composer(Generation::V1, &executor, &resolver)
            .resolve(&request(RegionSpec::Concession {
                use_type: "mining".to_string(),
                id: "17".to_string(),
            }))
            .await
            .unwrap()
            .unwrap();

        assert!(result.value.is_empty());
        assert_eq!(result.area_ha, Some(350.0));
        assert_eq!(result.download_urls, None);
        let queries = executor.queries();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("FROM gfw_mining p"));
    }

    #[tokio::test]
    async fn legacy_resolver_miss_is_region_not_found() {
        let executor = ScriptedExecutor::with(vec![]);
        let resolver = ScriptedResolver::with(vec![]);
        let err = composer(Generation::V1, &executor, &resolver)
            .resolve(&request(RegionSpec::ProtectedArea {
                wdpa_id: "1".to_string(),
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::RegionNotFound { .. }));
        assert!(executor.queries().is_empty());
    }

    #[tokio::test]
    async fn execution_errors_propagate() {
        let executor = ScriptedExecutor::with(vec![Err(ExecutionError::Engine(
            "relation \"imazon_sad\" does not exist".to_string(),
        ))]);
        let resolver = ScriptedResolver::with(vec![]);
        let err = composer(Generation::V2, &executor, &resolver)
            .resolve(&request(RegionSpec::national("BRA")))
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::Execution(ExecutionError::Engine(_))));
        assert_eq!(executor.queries().len(), 1);
    }

    #[tokio::test]
    async fn resolver_failure_in_last_tier_is_an_error() {
        let executor = ScriptedExecutor::with(vec![Ok(Vec::new()), Ok(Vec::new())]);
        let resolver = ScriptedResolver::with(vec![(
            "use:gfw_logging/3",
            Err(ResolveError::Failed("connection reset".to_string())),
        )]);
        let err = composer(Generation::V2, &executor, &resolver)
            .resolve(&request(RegionSpec::Concession {
                use_type: "gfw_logging".to_string(),
                id: "3".to_string(),
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::Resolver { .. }));
    }

    #[tokio::test]
    async fn invalid_identifiers_issue_no_calls() {
        let executor = ScriptedExecutor::with(vec![]);
        let resolver = ScriptedResolver::with(vec![]);
        let err = composer(Generation::V1, &executor, &resolver)
            .resolve(&request(RegionSpec::province("BRA", "5; DROP TABLE")))
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::InvalidRegion { .. }));
        assert!(executor.queries().is_empty());
        assert!(resolver.calls().is_empty());
    }

    #[tokio::test]
    async fn unreadable_rows_are_response_errors() {
        let executor = ScriptedExecutor::with(vec![Ok(rows(json!([
            {"data_type": "defor", "value": "lots"}
        ])))]);
        let resolver = ScriptedResolver::with(vec![]);
        let err = composer(Generation::V2, &executor, &resolver)
            .resolve(&request(RegionSpec::national("BRA")))
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::Execution(ExecutionError::Response(_))));
    }

    #[tokio::test]
    async fn legacy_latest_binds_default_limit() {
        let executor = ScriptedExecutor::with(vec![Ok(rows(json!([
            {"date": "2021-03-31T00:00:00Z"},
            {"date": "2021-02-28T00:00:00Z"}
        ])))]);
        let resolver = ScriptedResolver::with(vec![]);
        let dates = composer(Generation::V1, &executor, &resolver)
            .latest(None)
            .await
            .unwrap();

        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0].date.as_deref(), Some("2021-03-31T00:00:00Z"));
        assert!(executor.queries()[0].contains("LIMIT 3"));
    }

    #[tokio::test]
    async fn revised_latest_reads_max_date() {
        let executor =
            ScriptedExecutor::with(vec![Ok(rows(json!([{"latest": "2021-04-30T00:00:00Z"}])))]);
        let resolver = ScriptedResolver::with(vec![]);
        let composer = composer(Generation::V2, &executor, &resolver);

        let dates = composer.latest(Some(10)).await.unwrap();
        assert_eq!(dates[0].date.as_deref(), Some("2021-04-30T00:00:00Z"));
        assert!(executor.queries()[0].contains("MAX(date)"));
        assert!(!composer.latest_takes_limit());

        composer.latest(Some(0)).await.unwrap();
        assert_eq!(executor.queries().len(), 2);
    }

    #[tokio::test]
    async fn legacy_latest_rejects_zero_limit() {
        let executor = ScriptedExecutor::with(vec![]);
        let resolver = ScriptedResolver::with(vec![]);
        let composer = composer(Generation::V1, &executor, &resolver);

        assert!(composer.latest_takes_limit());
        assert!(matches!(
            composer.latest(Some(0)).await,
            Err(QueryError::InvalidRegion { .. })
        ));
        assert!(executor.queries().is_empty());
    }

    #[tokio::test]
    async fn null_stored_area_falls_through_to_resolver() {
        let executor = ScriptedExecutor::with(vec![
            Ok(Vec::new()),
            Ok(rows(json!([{"area_ha": null}]))),
        ]);
        let resolver = ScriptedResolver::with(vec![("wdpa:555", area(61.0))]);
        let result = composer(Generation::V2, &executor, &resolver)
            .resolve(&request(RegionSpec::ProtectedArea {
                wdpa_id: "555".to_string(),
            }))
            .await
            .unwrap()
            .unwrap();

        assert!(result.value.is_empty());
        assert_eq!(result.area_ha, Some(61.0));
        assert_eq!(executor.queries().len(), 2);
        assert_eq!(resolver.calls(), vec!["wdpa:555".to_string()]);
    }
}
