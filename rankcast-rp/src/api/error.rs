//! Error responses
//!
//! Every failure leaves the service as `{"ok": false, "kind": ..., "message": ...}`
//! with a status derived from the error kind.

use axum::{
    extract::rejection::{BytesRejection, JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{debug, error};

use rankcast_common::Error;

/// Failure returned by any handler
#[derive(Debug)]
pub enum ApiError {
    /// Engine or store failure
    Engine(Error),
    /// Request could not be extracted (malformed body, bad path, too large)
    Rejected { status: StatusCode, message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Rejected {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(e) => status_for(e),
            ApiError::Rejected { status, .. } => *status,
        }
    }
}

/// HTTP status for an engine error
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::SchemaValidation(_) | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Normalization { .. } | Error::EmptyDistribution { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Error::DistributionNotFound { .. } => StatusCode::NOT_FOUND,
        e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Engine(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body: Value = match self {
            ApiError::Engine(e) => {
                if status.is_server_error() {
                    error!(kind = e.kind(), "Request failed: {}", e);
                } else {
                    debug!(kind = e.kind(), "Request rejected: {}", e);
                }

                let mut body = json!({
                    "ok": false,
                    "kind": e.kind(),
                    "message": e.to_string(),
                });
                match &e {
                    Error::SchemaValidation(violations) => {
                        body["violations"] = json!(violations);
                    }
                    Error::Normalization { discarded } => {
                        body["discarded"] = json!(discarded);
                    }
                    _ => {}
                }
                body
            }
            ApiError::Rejected { status, message } => {
                debug!(%status, "Request rejected: {}", message);
                let kind = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "PayloadTooLarge"
                } else {
                    "InvalidInput"
                };
                json!({
                    "ok": false,
                    "kind": kind,
                    "message": message,
                })
            }
        };

        (status, Json(body)).into_response()
    }
}
