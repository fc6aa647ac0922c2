//! Conversion between API Gateway style events and axum requests/responses,
//! so invocations are served by the same router as the HTTP server.

use std::collections::BTreeMap;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Method, Request};
use axum::response::Response;
use base64::Engine;
use tokio::time::Instant;
use tracing::warn;

use seoagent_core::{Result, SeoAgentError};

use super::envelope::HttpEvent;
use super::InvocationResponse;

/// Responses larger than this are replaced with an error (Lambda caps at 6 MB).
const MAX_RESPONSE_BYTES: usize = 6 * 1024 * 1024;

/// Invocation deadline, attached to bridged requests as an extension.
#[derive(Debug, Clone, Copy)]
pub struct InvocationDeadline(pub Instant);

pub fn to_request(event: &HttpEvent, deadline: Option<Instant>) -> Result<Request<Body>> {
    let method = event
        .method()
        .ok_or_else(|| SeoAgentError::UnrecognizedEnvelope("HTTP event has no method".to_string()))?;
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|e| SeoAgentError::UnrecognizedEnvelope(format!("bad method {method}: {e}")))?;

    let uri = match event.query() {
        Some(q) => format!("{}?{}", event.path(), q),
        None => event.path().to_string(),
    };

    let mut builder = Request::builder().method(method).uri(&uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in event.headers.iter().flatten() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => {
                    headers.append(n, v);
                }
                _ => warn!(header = %name, "skipping invalid header"),
            }
        }
        if let Some(cookies) = event.cookies.as_ref().filter(|c| !c.is_empty()) {
            if let Ok(v) = HeaderValue::from_str(&cookies.join("; ")) {
                headers.insert(header::COOKIE, v);
            }
        }
    }
    if let Some(deadline) = deadline {
        builder = builder.extension(InvocationDeadline(deadline));
    }

    builder
        .body(Body::from(event.body_bytes()?))
        .map_err(|e| SeoAgentError::UnrecognizedEnvelope(format!("bad request {uri}: {e}")))
}

pub async fn to_invocation_response(response: Response) -> InvocationResponse {
    let (parts, body) = response.into_parts();

    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in parts.headers.iter() {
        let Ok(value) = value.to_str() else { continue };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|v| {
                v.push_str(", ");
                v.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    let bytes = match axum::body::to_bytes(body, MAX_RESPONSE_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "failed to read response body");
            return InvocationResponse::failure();
        }
    };

    let (body, is_base64_encoded) = match String::from_utf8(bytes.to_vec()) {
        Ok(text) => (text, false),
        Err(_) => (base64::engine::general_purpose::STANDARD.encode(&bytes), true),
    };

    InvocationResponse {
        status_code: parts.status.as_u16(),
        headers: Some(headers),
        body: Some(body),
        is_base64_encoded: Some(is_base64_encoded),
    }
}
