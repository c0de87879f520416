//! Player-facing endpoints.
//!
//! Everything is served from `/`, the query marker selects the endpoint:
//! `?manifest=` rewrites a playlist, `?segment=` serves a segment through the
//! delivery engine or the origin, `?passthrough=` proxies as-is.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS, CONTENT_RANGE, CONTENT_TYPE, RANGE,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::TryStreamExt;
use serde::Deserialize;
use tracing::{debug, warn};

use super::AppState;
use super::error::{ApiError, ApiResult};
use super::headers;
use crate::error::LoaderError;
use crate::model::ByteRange;
use crate::parser;
use crate::url_codec;

pub const MPEGURL_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

#[derive(Debug, Default, Deserialize)]
pub struct ProxyQuery {
    pub manifest: Option<String>,
    pub segment: Option<String>,
    pub passthrough: Option<String>,
}

pub async fn proxy_options() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, OPTIONS"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Length, Content-Range, Accept-Ranges"),
    );

    (StatusCode::NO_CONTENT, headers)
}

pub async fn proxy_get(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    method: Method,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if let Some(url) = query.manifest {
        serve_manifest(&state, &url, method, &headers).await
    } else if let Some(token) = query.segment {
        serve_segment(&state, &token, method, &headers).await
    } else if let Some(url) = query.passthrough {
        serve_passthrough(&state, &url, method, &headers).await
    } else {
        Err(ApiError::bad_request(format!(
            "expected one of `{}`, `{}` or `{}`",
            url_codec::MANIFEST_PARAM,
            url_codec::SEGMENT_PARAM,
            url_codec::PASSTHROUGH_PARAM
        )))
    }
}

fn origin_url(raw: &str) -> Result<url::Url, LoaderError> {
    let url = url::Url::parse(raw).map_err(|e| LoaderError::invalid_url(raw, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LoaderError::invalid_url(
            raw,
            format!("unsupported scheme `{other}`"),
        )),
    }
}

async fn serve_manifest(
    state: &AppState,
    url: &str,
    method: Method,
    incoming: &HeaderMap,
) -> ApiResult<Response> {
    let target = origin_url(url)?;

    let upstream = state
        .client
        .request(method.clone(), target)
        .headers(headers::upstream_request_headers(incoming))
        .timeout(state.config.request_timeout)
        .send()
        .await
        .map_err(LoaderError::from)?;

    let status = upstream.status();
    if !status.is_success() {
        warn!(url = %url, %status, "Origin refused manifest");
        return Err(LoaderError::http_status(status, url).into());
    }

    // No body to rewrite, and nothing to register.
    if method == Method::HEAD {
        return Ok((
            [
                (CONTENT_TYPE, MPEGURL_CONTENT_TYPE),
                (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            ],
            Body::empty(),
        )
            .into_response());
    }

    let raw = upstream.text().await.map_err(LoaderError::from)?;
    let rewritten = state.service.parse(url, &raw).await?;

    Ok((
        [
            (CONTENT_TYPE, MPEGURL_CONTENT_TYPE),
            (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        rewritten,
    )
        .into_response())
}

async fn serve_segment(
    state: &AppState,
    token: &str,
    method: Method,
    incoming: &HeaderMap,
) -> ApiResult<Response> {
    let (url, range) = url_codec::decode_segment_token(token).map_err(LoaderError::invalid_token)?;
    let runtime_id = url_codec::runtime_id(&url, range);

    if state.gate.get() && state.service.is_current_segment(&runtime_id).await {
        match state.bridge.request_bytes(&runtime_id).await {
            Ok(bytes) => {
                debug!(id = %runtime_id, len = bytes.len(), "Segment served by delivery engine");
                return Ok(engine_response(&url, range, bytes));
            }
            Err(fault) => {
                warn!(id = %runtime_id, error = %fault, "Delivery engine failed, fetching from origin");
            }
        }
    }

    let target = origin_url(&url)?;
    let mut forwarded = headers::upstream_request_headers(incoming);
    if let Some(range) = range {
        let value = HeaderValue::from_str(&range.to_header_value())
            .map_err(|e| ApiError::internal(e.to_string()))?;
        forwarded.insert(RANGE, value);
    }

    let upstream = state
        .client
        .request(method, target)
        .headers(forwarded)
        .send()
        .await
        .map_err(LoaderError::from)?;
    Ok(stream_response(upstream))
}

async fn serve_passthrough(
    state: &AppState,
    url: &str,
    method: Method,
    incoming: &HeaderMap,
) -> ApiResult<Response> {
    let target = origin_url(url)?;
    let rewrite = method == Method::GET;
    let upstream = state
        .client
        .request(method, target)
        .headers(headers::upstream_request_headers(incoming))
        .timeout(state.config.request_timeout)
        .send()
        .await
        .map_err(LoaderError::from)?;

    if rewrite && upstream.status().is_success() && is_playlist(url, upstream.headers()) {
        let raw = upstream.text().await.map_err(LoaderError::from)?;
        let body = parser::rewrite_passthrough_playlist(&raw, url, state.service.proxy_base());
        return Ok((
            [
                (CONTENT_TYPE, MPEGURL_CONTENT_TYPE),
                (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            ],
            body,
        )
            .into_response());
    }
    Ok(stream_response(upstream))
}

/// Whether a pass-through response is a playlist whose URIs need rewriting.
fn is_playlist(url: &str, headers: &HeaderMap) -> bool {
    let mpegurl = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("mpegurl"));
    let path = url.split(['?', '#']).next().unwrap_or(url);
    mpegurl || path.to_ascii_lowercase().ends_with(".m3u8")
}

/// Mirrors an origin response, streaming its body.
fn stream_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = headers::downstream_response_headers(upstream.headers());
    let body = Body::from_stream(upstream.bytes_stream().map_err(std::io::Error::other));

    let mut response = (status, body).into_response();
    *response.headers_mut() = headers;
    response
}

fn engine_response(url: &str, range: Option<ByteRange>, bytes: Bytes) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(segment_content_type(url)));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

    let status = match range {
        Some(range) => {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes {range}/*")) {
                headers.insert(CONTENT_RANGE, value);
            }
            StatusCode::PARTIAL_CONTENT
        }
        None => StatusCode::OK,
    };

    (status, headers, bytes).into_response()
}

fn segment_content_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("ts") => "video/mp2t",
        Some("m4s" | "mp4" | "cmfv") => "video/mp4",
        Some("m4a" | "cmfa") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("vtt") => "text/vtt",
        _ => "application/octet-stream",
    }
}
