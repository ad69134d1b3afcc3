//! HTTP middleware and response helpers for authproxy
//!
//! This module provides:
//! - HTTP Basic credential extraction
//! - The 401 challenge and 404 responses
//! - Request logging and tracing spans

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use std::time::Instant;

use crate::error::AuthError;

/// Body of every authentication or authorization failure
pub const AUTH_FAILED_BODY: &str = "Authentication failed";

/// Extract the username and password of an HTTP Basic `Authorization` header
///
/// The password may contain `:`; only the first one separates the fields.
pub fn parse_basic_auth(headers: &HeaderMap) -> Result<(String, String), AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::NoCredentials)?;

    let (scheme, credentials) = value.split_once(' ').ok_or(AuthError::NoCredentials)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(AuthError::NoCredentials);
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(credentials.trim())
        .map_err(|_| AuthError::NoCredentials)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::NoCredentials)?;

    let mut parts = decoded.splitn(2, ':');
    match (parts.next(), parts.next()) {
        (Some(user), Some(password)) => Ok((user.to_string(), password.to_string())),
        _ => Err(AuthError::NoCredentials),
    }
}

/// 401 challenge for `realm` with a generic body
pub fn unauthorized(realm: &str) -> Response {
    let challenge = format!("Basic realm=\"{}\"", realm.replace('"', "'"));
    let mut response = (
        StatusCode::UNAUTHORIZED,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        AUTH_FAILED_BODY,
    )
        .into_response();

    match HeaderValue::from_str(&challenge) {
        Ok(value) => {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        Err(_) => {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"login\""),
            );
        }
    }
    response
}

/// Response for a Host no destination serves
pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Body::from("Not Found")).into_response()
}

/// 502 when the upstream cannot be reached
pub fn bad_gateway() -> Response {
    (StatusCode::BAD_GATEWAY, Body::from("Bad Gateway")).into_response()
}

/// Logging middleware function
///
/// Logs method, host, path, status code and response time.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        host = %host,
        path = %uri.path(),
        status = %status.as_u16(),
        duration_ms = %elapsed.as_millis(),
        "Request completed"
    );

    response
}

/// Tracing middleware function
///
/// Wraps the whole request lifecycle, forwarding included, in one span.
pub async fn tracing_middleware(request: Request, next: Next) -> Response {
    use tracing::Instrument;

    let method = request.method().clone();
    let uri = request.uri().clone();

    let span = tracing::info_span!(
        "http_request",
        http.method = %method,
        http.url = %uri,
        http.status_code = tracing::field::Empty,
    );

    async move {
        let response = next.run(request).await;
        tracing::Span::current().record("http.status_code", response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}
