//! Request entry point and upstream forwarding
//!
//! Every inbound request goes through [`proxy_handler`]: resolve the
//! destination from the Host header, authenticate the Basic credentials,
//! apply the destination's policy, then stream the request to the upstream.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Uri},
    response::Response,
};
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::config::HostConfig;

use super::middleware::{bad_gateway, not_found, parse_basic_auth, unauthorized};
use super::router::AppState;

const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_ORIGIN_HOST: &str = "x-origin-host";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that describe a single hop and are never forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Single entry point for every inbound request
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let host = request_host(&request);
    let Some(host_cfg) = state.router.host_for_request(&host) else {
        info!(host = %host, path = %request.uri().path(), "No upstream for host");
        return not_found();
    };
    let realm = host_cfg.realm(&state.config.auth_realm);

    let (username, password) = match parse_basic_auth(request.headers()) {
        Ok(credentials) => credentials,
        Err(e) => {
            info!(host = %host, reason = %e, "Authentication failed");
            return unauthorized(realm);
        }
    };

    if let Err(e) = state
        .engine
        .auth_request(&username, &password, host_cfg)
        .await
    {
        info!(host = %host, user = %username, reason = %e, "Authentication failed");
        return unauthorized(realm);
    }

    debug!(host = %host, user = %username, upstream = %host_cfg.upstream, "Forwarding request");
    forward_request(&state.client, host_cfg, &host, request).await
}

/// Host the client asked for, from the Host header or an absolute URI
fn request_host(request: &Request) -> String {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

/// Send an authorized request to `host`'s upstream and relay the response
///
/// The scheme and authority are taken from the upstream; path and query
/// are kept. Bodies are streamed in both directions.
pub async fn forward_request(
    client: &reqwest::Client,
    host: &HostConfig,
    original_host: &str,
    request: Request,
) -> Response {
    let Some(url) = upstream_url(host, request.uri()) else {
        warn!(upstream = %host.upstream, "Upstream URL is not usable");
        return bad_gateway();
    };

    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();
    let headers = upstream_headers(&parts.headers, host, original_host, remote);

    let result = client
        .request(parts.method, url.clone())
        .headers(headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await;

    let upstream = match result {
        Ok(response) => response,
        Err(e) => {
            warn!(upstream = %url, error = %e, "Upstream request failed");
            return bad_gateway();
        }
    };

    let status = upstream.status();
    let headers = strip_hop_by_hop(upstream.headers());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Upstream scheme and authority with the request's path and query
pub fn upstream_url(host: &HostConfig, uri: &Uri) -> Option<Url> {
    let mut url = host.upstream_url.clone()?;
    url.set_path(uri.path());
    url.set_query(uri.query());
    Some(url)
}

/// Headers sent upstream for a request that arrived with `inbound`
pub fn upstream_headers(
    inbound: &HeaderMap,
    host: &HostConfig,
    original_host: &str,
    remote: Option<SocketAddr>,
) -> HeaderMap {
    let mut headers = strip_hop_by_hop(inbound);

    // Without a Host header the client derives it from the upstream URL
    if !host.preserve_host {
        headers.remove(header::HOST);
    }

    if let Ok(value) = HeaderValue::from_str(original_host) {
        headers.append(HeaderName::from_static(X_FORWARDED_HOST), value);
    }
    if let Some(authority) = host.upstream_authority() {
        if let Ok(value) = HeaderValue::from_str(&authority) {
            headers.append(HeaderName::from_static(X_ORIGIN_HOST), value);
        }
    }

    if let Some(addr) = remote {
        let forwarded_for = match headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
        {
            Some(prior) => format!("{}, {}", prior, addr.ip()),
            None => addr.ip().to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(HeaderName::from_static(X_FORWARDED_FOR), value);
        }
    }

    headers
}

/// Copy of `headers` without hop-by-hop headers or those named in `Connection`
fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let lower = name.as_str();
        if HOP_BY_HOP.contains(&lower) || named.iter().any(|n| n == lower) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
