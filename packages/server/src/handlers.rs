//! HTTP handler functions for the alert endpoints.
//!
//! Each generation's routes are mounted under their own scope, and that
//! scope carries the generation's [`QueryComposer`] as app data.

use actix_web::{HttpRequest, HttpResponse, web};
use imazon_alerts_models::{Period, RegionSpec, WorldGeometry, geometry};
use imazon_alerts_query::{AlertRequest, QueryComposer, QueryError};
use imazon_alerts_server_models::{
    AlertQueryParams, ApiAlertDocument, GeojsonBody, LatestQueryParams, latest_document,
};

use crate::ServerError;

/// Header whose value is forwarded to the geostore.
pub const API_KEY_HEADER: &str = "x-api-key";

/// `GET /admin/{iso}`
pub async fn national(
    composer: web::Data<QueryComposer>,
    path: web::Path<String>,
    query: web::Query<AlertQueryParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ServerError> {
    let iso = path.into_inner();
    log::info!("Obtaining national data for {iso}");
    alerts(&composer, RegionSpec::national(&iso), &query, &req).await
}

/// `GET /admin/{iso}/{id1}`
pub async fn province(
    composer: web::Data<QueryComposer>,
    path: web::Path<(String, String)>,
    query: web::Query<AlertQueryParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ServerError> {
    let (iso, id1) = path.into_inner();
    log::info!("Obtaining subnational data for {iso}/{id1}");
    alerts(&composer, RegionSpec::province(&iso, &id1), &query, &req).await
}

/// `GET /admin/{iso}/{id1}/{id2}`
pub async fn district(
    composer: web::Data<QueryComposer>,
    path: web::Path<(String, String, String)>,
    query: web::Query<AlertQueryParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ServerError> {
    let (iso, id1, id2) = path.into_inner();
    log::info!("Obtaining district data for {iso}/{id1}/{id2}");
    alerts(&composer, RegionSpec::district(&iso, &id1, &id2), &query, &req).await
}

/// `GET /use/{name}/{id}`
pub async fn concession(
    composer: web::Data<QueryComposer>,
    path: web::Path<(String, String)>,
    query: web::Query<AlertQueryParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ServerError> {
    let (use_type, id) = path.into_inner();
    log::info!("Obtaining use data for {use_type}/{id}");
    alerts(&composer, RegionSpec::Concession { use_type, id }, &query, &req).await
}

/// `GET /wdpa/{id}`
pub async fn protected_area(
    composer: web::Data<QueryComposer>,
    path: web::Path<String>,
    query: web::Query<AlertQueryParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ServerError> {
    let wdpa_id = path.into_inner();
    log::info!("Obtaining wdpa data for {wdpa_id}");
    alerts(&composer, RegionSpec::ProtectedArea { wdpa_id }, &query, &req).await
}

/// `GET /?geostore={hash}`
pub async fn world_by_geostore(
    composer: web::Data<QueryComposer>,
    query: web::Query<AlertQueryParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ServerError> {
    let hash = query
        .geostore
        .clone()
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("GeoJSON param required".to_string()))?;
    log::info!("Obtaining world data with geostore {hash}");
    let region = RegionSpec::World {
        geometry: WorldGeometry::Geostore { hash },
    };
    alerts(&composer, region, &query, &req).await
}

/// `POST /` with a `{"geojson": ...}` body.
pub async fn world_by_geojson(
    composer: web::Data<QueryComposer>,
    query: web::Query<AlertQueryParams>,
    body: web::Json<GeojsonBody>,
    req: HttpRequest,
) -> Result<HttpResponse, ServerError> {
    log::info!("Obtaining world data with inline geojson");
    let value = body
        .into_inner()
        .geojson
        .ok_or_else(|| ServerError::BadRequest("GeoJSON param required".to_string()))?;
    let geojson = geojson::GeoJson::from_json_value(value)
        .map_err(|e| ServerError::BadRequest(format!("Invalid GeoJSON: {e}")))?;
    let region = RegionSpec::World {
        geometry: WorldGeometry::Inline(geometry::normalize(geojson)),
    };
    alerts(&composer, region, &query, &req).await
}

/// `GET /latest`
pub async fn latest(
    composer: web::Data<QueryComposer>,
    query: web::Query<LatestQueryParams>,
) -> Result<HttpResponse, ServerError> {
    log::info!("Obtaining latest alert dates");
    let limit = query
        .limit
        .as_deref()
        .filter(|_| composer.latest_takes_limit())
        .map(|raw| {
            raw.trim()
                .parse::<u32>()
                .map_err(|_| ServerError::BadRequest(format!("Invalid limit '{raw}'")))
        })
        .transpose()?;

    let dates = composer.latest(limit).await?;
    if dates.is_empty() {
        return Err(ServerError::NotFound("No alert dates found".to_string()));
    }
    Ok(HttpResponse::Ok().json(latest_document(composer.profile().generation, dates)))
}

async fn alerts(
    composer: &QueryComposer,
    region: RegionSpec,
    query: &AlertQueryParams,
    req: &HttpRequest,
) -> Result<HttpResponse, ServerError> {
    let generation = composer.profile().generation;
    let today = chrono::Utc::now().date_naive();
    let period = Period::parse_or_default(query.period.as_deref(), generation, today)
        .map_err(QueryError::from)?;

    let request = AlertRequest {
        region,
        alert_query: query.alert_query(),
        period,
        api_key: req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    match composer.resolve(&request).await? {
        Some(result) => Ok(HttpResponse::Ok().json(ApiAlertDocument::from(result))),
        None => Err(ServerError::NotFound(format!(
            "No alerts or area found for {}",
            request.region.kind()
        ))),
    }
}
