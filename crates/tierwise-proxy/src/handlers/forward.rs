use crate::error::{ProxyError, Result};
use crate::state::AppState;
use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::Response;
use bytes::Bytes;
use tracing::{debug, warn};

/// Headers that only apply to a single connection
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Copy of `headers` without hop-by-hop headers, including any named in
/// the `Connection` header
pub fn end_to_end_headers(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(&name.as_str()) || listed.iter().any(|l| l == name.as_str()) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

/// The declared body length. Missing or malformed lengths are rejected.
pub fn content_length(headers: &HeaderMap) -> Result<usize> {
    let value = headers
        .get(header::CONTENT_LENGTH)
        .ok_or_else(|| ProxyError::BadRequest("missing Content-Length".to_string()))?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .ok_or_else(|| ProxyError::BadRequest(format!("malformed Content-Length: {:?}", value)))
}

pub fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false)
}

async fn read_body(body: Body, declared: usize) -> Result<Bytes> {
    let bytes = to_bytes(body, declared).await.map_err(|e| {
        ProxyError::BadRequest(format!("failed to read {} byte body: {}", declared, e))
    })?;

    if bytes.len() != declared {
        return Err(ProxyError::BadRequest(format!(
            "body is {} bytes, Content-Length declared {}",
            bytes.len(),
            declared
        )));
    }
    Ok(bytes)
}

/// Run a submission through the scheduler. Anything that is not a JSON
/// document is passed on as received.
async fn schedule_submission(state: &AppState, body: Bytes) -> Bytes {
    let Some(scheduler) = &state.scheduler else {
        return body;
    };

    let workflow: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!("Submission is not valid JSON, forwarding unchanged: {}", e);
            return body;
        }
    };

    let scheduled = scheduler.schedule(workflow).await;
    match serde_json::to_vec(&scheduled) {
        Ok(encoded) => Bytes::from(encoded),
        Err(e) => {
            warn!("Failed to encode scheduled workflow, forwarding unchanged: {}", e);
            body
        }
    }
}

/// Forward a POST to the backend and relay its response
pub async fn forward(state: &AppState, req: Request) -> Result<Response> {
    let (parts, body) = req.into_parts();

    let declared = content_length(&parts.headers)?;
    let mut body = read_body(body, declared).await?;

    if parts.uri.path() == state.submission_path && is_json(&parts.headers) {
        body = schedule_submission(state, body).await;
    }

    let mut headers = end_to_end_headers(&parts.headers);
    headers.remove(header::CONTENT_LENGTH);
    let host = HeaderValue::from_str(&state.backend.authority)
        .map_err(|e| ProxyError::Internal(format!("invalid backend authority: {}", e)))?;
    headers.insert(header::HOST, host);

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");
    let url = state.backend.url_for(path_and_query);
    debug!("Forwarding {} {} ({} bytes)", parts.method, url, body.len());

    let upstream = state
        .client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    relay(upstream).await
}

async fn relay(upstream: reqwest::Response) -> Result<Response> {
    let status = upstream.status();
    let headers = end_to_end_headers(upstream.headers());
    let body = upstream.bytes().await?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
