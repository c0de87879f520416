//! HTTP error responses of the proxy.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::LoaderError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "BAD_GATEWAY", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
        };
        (
            self.status,
            [(axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
            Json(body),
        )
            .into_response()
    }
}

impl From<LoaderError> for ApiError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::HttpStatus { status, url } => Self::new(
                status,
                "UPSTREAM_STATUS",
                format!("origin answered {status} for {url}"),
            ),
            LoaderError::Network { source } if source.is_timeout() => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                "UPSTREAM_TIMEOUT",
                source.to_string(),
            ),
            LoaderError::Network { source } => Self::bad_gateway(source.to_string()),
            err @ (LoaderError::Parse(_) | LoaderError::Fetch(_)) => {
                Self::bad_gateway(err.to_string())
            }
            err @ (LoaderError::InvalidUrl { .. } | LoaderError::InvalidToken { .. }) => {
                Self::bad_request(err.to_string())
            }
            err @ LoaderError::InvalidState { .. } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                err.to_string(),
            ),
            err => {
                tracing::error!(error = %err, "Internal proxy error");
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<crate::error::ParseFault> for ApiError {
    fn from(fault: crate::error::ParseFault) -> Self {
        LoaderError::from(fault).into()
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;
