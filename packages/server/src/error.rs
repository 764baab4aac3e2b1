//! Maps request failures to JSON:API error responses.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use imazon_alerts_query::QueryError;
use imazon_alerts_server_models::ApiErrorDocument;
use thiserror::Error;

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The request is malformed.
    #[error("{0}")]
    BadRequest(String),

    /// Nothing is known about the requested region.
    #[error("{0}")]
    NotFound(String),

    /// The query engine failed.
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Query(QueryError::InvalidRegion { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) | Self::Query(QueryError::RegionNotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            Self::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {self}");
        }
        HttpResponse::build(status).json(ApiErrorDocument::single(status.as_u16(), self.to_string()))
    }
}
