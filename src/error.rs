//! Error types for the observation search backend.
//!
//! Components return typed failures; only the `IntoResponse` impl below maps
//! them to HTTP status codes and bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Required query parameter missing or malformed
    #[error("{0}")]
    InvalidRequest(String),

    /// Geocoding produced no usable candidate
    #[error("Location not found: {0}")]
    LocationNotFound(String),

    /// Transport failure, timeout or non-2xx status from an external service
    #[error("{service} is unavailable")]
    UpstreamUnavailable {
        service: &'static str,
        details: String,
    },

    /// External response did not have the expected batch-level shape
    #[error("Unexpected response from {service}")]
    UpstreamSchema {
        service: &'static str,
        details: String,
    },

    /// A single record or lookup within a batch is unusable
    #[error("Unusable record: {0}")]
    PartialRecord(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn unavailable(service: &'static str, details: impl ToString) -> Self {
        Error::UpstreamUnavailable {
            service,
            details: details.to_string(),
        }
    }

    pub fn schema(service: &'static str, details: impl ToString) -> Self {
        Error::UpstreamSchema {
            service,
            details: details.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::LocationNotFound(_) => StatusCode::NOT_FOUND,
            Error::UpstreamUnavailable { .. }
            | Error::UpstreamSchema { .. }
            | Error::PartialRecord(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<&str> {
        match self {
            Error::UpstreamUnavailable { details, .. } | Error::UpstreamSchema { details, .. } => {
                Some(details)
            }
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.details() {
            Some(details) => json!({ "error": self.to_string(), "details": details }),
            None => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
