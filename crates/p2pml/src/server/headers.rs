//! Header policy between player, proxy and origin.

use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, HeaderMap, HeaderName, HeaderValue};

/// Never forwarded in either direction. Header names are lowercase.
pub const EXCLUDED_HEADERS: [&str; 9] = [
    "host",
    "content-length",
    "connection",
    "transfer-encoding",
    "expect",
    "upgrade",
    "proxy-connection",
    "keep-alive",
    "accept-encoding",
];

pub fn is_excluded(name: &HeaderName) -> bool {
    EXCLUDED_HEADERS.contains(&name.as_str())
}

fn filtered(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_excluded(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Player request headers to send to the origin.
pub fn upstream_request_headers(incoming: &HeaderMap) -> HeaderMap {
    filtered(incoming)
}

/// Origin response headers to send to the player.
pub fn downstream_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = filtered(upstream);
    out.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn excluded_set_is_dropped_both_ways() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("127.0.0.1:8080"));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(
            HeaderName::from_static("proxy-connection"),
            HeaderValue::from_static("keep-alive"),
        );
        headers.insert(header::RANGE, HeaderValue::from_static("bytes=0-99"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("player/1.0"));

        let forwarded = upstream_request_headers(&headers);
        assert_eq!(forwarded.len(), 2);
        assert!(forwarded.contains_key(header::RANGE));
        assert!(forwarded.contains_key(header::USER_AGENT));
    }

    #[test]
    fn header_names_match_case_insensitively() {
        let name = HeaderName::from_bytes(b"Keep-Alive").unwrap();
        assert!(is_excluded(&name));
        let name = HeaderName::from_bytes(b"TRANSFER-ENCODING").unwrap();
        assert!(is_excluded(&name));
    }

    #[test]
    fn response_headers_allow_any_origin() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp2t"));
        upstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("3"));
        upstream.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://origin.example"),
        );

        let out = downstream_response_headers(&upstream);
        assert_eq!(out[header::CONTENT_TYPE], "video/mp2t");
        assert_eq!(out[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(!out.contains_key(header::CONTENT_LENGTH));
    }
}
