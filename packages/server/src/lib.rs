#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for Imazon deforestation alerts.
//!
//! Serves both schema generations side by side, under
//! `/api/v1/imazon-alerts` and `/api/v2/imazon-alerts`. Aggregations run
//! on Carto; region geometry and area come from the geostore.

pub mod config;
mod error;
mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use imazon_alerts_carto::CartoClient;
use imazon_alerts_geostore::GeostoreClient;
use imazon_alerts_models::Generation;
use imazon_alerts_query::{
    QueryComposer, QueryError, RegionResolver, SpatialExecutor, TemplateName, TemplateStore,
};

pub use config::ServerConfig;
pub use error::ServerError;

/// Builds one composer per generation over shared collaborators.
///
/// # Errors
///
/// Returns [`QueryError::Template`] if an embedded template fails to
/// register.
pub fn composers(
    api_url: &str,
    executor: &Arc<dyn SpatialExecutor>,
    resolver: &Arc<dyn RegionResolver>,
) -> Result<(QueryComposer, QueryComposer), QueryError> {
    let build = |generation| -> Result<QueryComposer, QueryError> {
        Ok(QueryComposer::new(
            Arc::new(TemplateStore::new(generation)?),
            api_url,
            Arc::clone(executor),
            Arc::clone(resolver),
        ))
    };
    Ok((build(Generation::V1)?, build(Generation::V2)?))
}

/// Mounts both generations' alert routes.
pub fn routes(
    cfg: &mut web::ServiceConfig,
    v1: &web::Data<QueryComposer>,
    v2: &web::Data<QueryComposer>,
) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        ServerError::BadRequest(format!("Invalid body: {err}")).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
        ServerError::BadRequest(format!("Invalid query: {err}")).into()
    }))
    .service(alert_scope("/api/v1/imazon-alerts", v1))
    .service(alert_scope("/api/v2/imazon-alerts", v2));
}

fn alert_scope(prefix: &str, composer: &web::Data<QueryComposer>) -> actix_web::Scope {
    let scope = web::scope(prefix)
        .app_data(composer.clone())
        .route("", web::get().to(handlers::world_by_geostore))
        .route("/", web::get().to(handlers::world_by_geostore))
        .route("", web::post().to(handlers::world_by_geojson))
        .route("/", web::post().to(handlers::world_by_geojson))
        .route("/latest", web::get().to(handlers::latest))
        .route("/admin/{iso}", web::get().to(handlers::national))
        .route("/admin/{iso}/{id1}", web::get().to(handlers::province))
        .route("/use/{name}/{id}", web::get().to(handlers::concession))
        .route("/wdpa/{id}", web::get().to(handlers::protected_area));

    if composer.supports(TemplateName::District) {
        scope.route("/admin/{iso}/{id1}/{id2}", web::get().to(handlers::district))
    } else {
        scope
    }
}

/// Starts the alerts API server.
///
/// Reads [`ServerConfig`] from the environment, builds the Carto and
/// geostore clients, and starts the Actix-Web HTTP server. The caller is
/// responsible for providing the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if a template fails to register, or
/// the HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::from_env();
    log::info!(
        "Using Carto at {} and geostore at {}",
        config.carto_api_url,
        config.geostore_url
    );

    let carto = Arc::new(CartoClient::new(
        config.carto_api_url.clone(),
        config.carto_api_key.clone(),
    ));
    let api_url = carto.api_url().to_string();
    let executor: Arc<dyn SpatialExecutor> = carto;
    let resolver: Arc<dyn RegionResolver> =
        Arc::new(GeostoreClient::new(config.geostore_url.clone()));

    let (v1, v2) = composers(&api_url, &executor, &resolver).map_err(std::io::Error::other)?;
    let v1 = web::Data::new(v1);
    let v2 = web::Data::new(v2);

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(|cfg| routes(cfg, &v1, &v2))
    })
    .bind((config.bind_addr, config.port))?
    .run()
    .await
}
