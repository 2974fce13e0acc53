//! HTTP mapping of gateway errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gantry_core::ProxyError;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to HTTP clients by the serving layer.
#[derive(Debug, Error)]
pub enum ServingError {
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl ServingError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad-request"),
            Self::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "payload-too-large"),
            Self::Proxy(err) => match err {
                ProxyError::RouteNotFound { .. } => (StatusCode::NOT_FOUND, "not-found"),
                ProxyError::NotImplemented(_) => (StatusCode::NOT_IMPLEMENTED, "not-implemented"),
                ProxyError::ProxyCall { .. } | ProxyError::SchemaFetch { .. } => {
                    (StatusCode::BAD_GATEWAY, "upstream")
                }
                ProxyError::UnknownProtocol { .. }
                | ProxyError::NotInitialized { .. }
                | ProxyError::RouteCollision { .. }
                | ProxyError::AlreadyBuilt { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal")
                }
            },
        }
    }
}

impl IntoResponse for ServingError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if let Self::Proxy(err) = &self {
            tracing::warn!(category = %err.category(), status = %status, error = %err, "Request failed");
        }

        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string()
            }
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ProxyError::route_not_found("GET", "/x"), StatusCode::NOT_FOUND),
            (ProxyError::grpc_not_implemented(), StatusCode::NOT_IMPLEMENTED),
            (ProxyError::proxy_call("a.b", "boom"), StatusCode::BAD_GATEWAY),
            (ProxyError::unknown_protocol("a.b"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = ServingError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }

        let response = ServingError::BadRequest("invalid JSON".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ServingError::PayloadTooLarge { limit: 16 }.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
