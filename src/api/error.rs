//! Mapping of gateway failures onto HTTP responses

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::Error;

/// Error returned by API handlers
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        tracing::debug!(error = %err, "malformed multipart body");
        Self(Error::InputMissing("audio"))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::debug!(error = %err, "malformed JSON body");
        Self(Error::Serialization(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, err) = match self.0 {
            Error::InputMissing(_) | Error::Serialization(_) => {
                return StatusCode::BAD_REQUEST.into_response();
            }
            Error::Provider {
                status,
                content_type,
                body,
            } => {
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                return match content_type {
                    Some(ct) => (status, [(header::CONTENT_TYPE, ct)], body).into_response(),
                    None => (status, body).into_response(),
                };
            }
            err @ Error::Http(_) => (StatusCode::BAD_GATEWAY, "upstream_unreachable", err),
            err => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err),
        };

        let message = err.to_string();
        tracing::error!(status = %status, error = %message, "request failed");

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody { code, message },
            }),
        )
            .into_response()
    }
}
