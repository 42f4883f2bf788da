pub mod forward;

use crate::error::ProxyError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::warn;

pub use forward::forward;

/// Entry point for every proxied request
pub async fn proxy(State(state): State<AppState>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let result = if method == Method::GET {
        Ok(redirect(&state))
    } else if method == Method::POST {
        forward(&state, req).await
    } else {
        Err(ProxyError::MethodNotAllowed(method.to_string()))
    };

    result.unwrap_or_else(|e| {
        warn!(%method, %path, status = e.status().as_u16(), "Request failed: {}", e);
        e.into_response()
    })
}

/// Browsers hitting the proxy are sent to the workflow server UI
fn redirect(state: &AppState) -> Response {
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, state.backend.base_url.clone())],
    )
        .into_response()
}
