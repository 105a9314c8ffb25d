//! Per-request credential header

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Header carrying a caller-supplied provider key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Optional API key taken from the `x-api-key` header
///
/// Blank or non-UTF-8 values count as absent.
#[derive(Debug, Clone, Default)]
pub struct ApiKey(pub Option<String>);

impl<S> FromRequestParts<S> for ApiKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string);

        Ok(Self(key))
    }
}
