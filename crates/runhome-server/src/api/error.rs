//! Error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use runhome_core::{EditorError, RoutingError, SearchError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn session_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("search session {} not found", id))
    }

    pub fn route_not_found(index: usize) -> Self {
        ApiError::NotFound(format!("route {} not found", index))
    }

    pub fn search_in_flight() -> Self {
        ApiError::Conflict("a search is still running for this session".to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::UnknownRoute(index) => ApiError::route_not_found(index),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<RoutingError> for ApiError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::RateLimited => ApiError::RateLimited(err.to_string()),
            RoutingError::TooFewPoints(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Unavailable(other.to_string()),
        }
    }
}

impl From<EditorError> for ApiError {
    fn from(err: EditorError) -> Self {
        match err {
            EditorError::CapacityExceeded { .. } => ApiError::Conflict(err.to_string()),
            EditorError::NotEditing(_) => ApiError::NotFound(err.to_string()),
            EditorError::WaypointOutOfRange { .. } | EditorError::InvalidPoint => {
                ApiError::BadRequest(err.to_string())
            }
            EditorError::Routing(routing) => routing.into(),
        }
    }
}
