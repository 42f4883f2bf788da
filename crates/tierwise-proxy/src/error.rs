// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

/// Proxy error type
#[derive(Error, Debug, Diagnostic)]
pub enum ProxyError {
    /// Malformed request from the client (400)
    #[error("Bad request: {0}")]
    #[diagnostic(code(proxy::bad_request))]
    BadRequest(String),

    /// Backend unreachable, timed out or sent a broken response (502)
    #[error("Bad gateway: {0}")]
    #[diagnostic(
        code(proxy::bad_gateway),
        help("Check that the workflow server is reachable at the configured target")
    )]
    BadGateway(String),

    /// Too many requests in flight (503)
    #[error("Service overloaded, retry later")]
    #[diagnostic(
        code(proxy::overloaded),
        help("Raise --max-concurrent-requests if the backend can take more load")
    )]
    Overloaded,

    /// Method not allowed (405)
    #[error("Method not allowed: {0}")]
    #[diagnostic(code(proxy::method_not_allowed))]
    MethodNotAllowed(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    #[diagnostic(code(proxy::internal))]
    Internal(String),

    /// The backend target could not be interpreted
    #[error("Invalid backend target '{target}': {reason}")]
    #[diagnostic(
        code(proxy::invalid_target),
        help("Use an http:// or https:// URL for --target-server")
    )]
    InvalidTarget { target: String, reason: String },
}

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::Internal(_) | ProxyError::InvalidTarget { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "status": "Failure",
            "message": self.to_string(),
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// A request the proxy failed to build is an internal error. Anything else
/// went wrong talking to the backend and is a 502.
impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            ProxyError::Internal(err.to_string())
        } else {
            ProxyError::BadGateway(err.to_string())
        }
    }
}
