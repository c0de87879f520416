//! URL helpers shared by the rewriter and the proxy endpoints.
//!
//! Segment URLs handed to the player carry the origin location as a base64url
//! token of `absoluteUrl[|start-end]`, sub-manifest URLs carry the
//! percent-encoded absolute URL.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use url::Url;

use crate::error::ParseFault;
use crate::model::ByteRange;

/// Query marker of the manifest endpoint.
pub const MANIFEST_PARAM: &str = "manifest";
/// Query marker of the segment endpoint.
pub const SEGMENT_PARAM: &str = "segment";
/// Query marker of the pass-through endpoint.
pub const PASSTHROUGH_PARAM: &str = "passthrough";

const RANGE_SEPARATOR: char = '|';

/// Resolves `media_uri` against the manifest it was found in.
pub fn absolute_url(base_manifest_url: &str, media_uri: &str) -> Result<String, ParseFault> {
    if media_uri.starts_with("http://") || media_uri.starts_with("https://") {
        return Ok(media_uri.to_string());
    }

    let base = Url::parse(base_manifest_url)
        .map_err(|e| ParseFault::invalid_url(base_manifest_url, e.to_string()))?;
    base.join(media_uri)
        .map(String::from)
        .map_err(|e| ParseFault::invalid_url(media_uri, e.to_string()))
}

/// Directory part of a manifest URL, including the trailing slash.
pub fn base_path(manifest_url: &str) -> &str {
    match manifest_url.rfind('/') {
        Some(idx) => &manifest_url[..=idx],
        None => manifest_url,
    }
}

/// Where a URL may appear in playlist text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlPosition {
    /// A whole line, such as a segment or variant URI.
    Line,
    /// A whole quoted attribute value, such as `URI="..."`.
    Attribute,
    Any,
}

/// A located URL: the textual form the manifest uses and where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located<'a> {
    pub form: &'a str,
    pub start: usize,
}

impl Located<'_> {
    pub fn end(&self) -> usize {
        self.start + self.form.len()
    }
}

/// Finds which textual form of `url` the manifest uses.
///
/// Tries the absolute form first, then the form relative to the manifest's
/// base path. Only delimited occurrences count: a URL must fill a whole line
/// or a whole quoted attribute value.
pub fn find_url_in_manifest<'a>(
    manifest: &str,
    url: &'a str,
    manifest_url: &str,
) -> Result<&'a str, ParseFault> {
    locate_url(manifest, url, None, manifest_url, UrlPosition::Any).map(|l| l.form)
}

/// Locates `url` in `manifest`, trying the absolute form, the base-relative
/// form and finally `literal` (the URI exactly as the playlist wrote it).
pub fn locate_url<'a>(
    manifest: &str,
    url: &'a str,
    literal: Option<&'a str>,
    manifest_url: &str,
    position: UrlPosition,
) -> Result<Located<'a>, ParseFault> {
    let relative = url.strip_prefix(base_path(manifest_url)).unwrap_or(url);

    [Some(url), Some(relative), literal]
        .into_iter()
        .flatten()
        .find_map(|form| {
            find_delimited(manifest, form, position).map(|start| Located { form, start })
        })
        .ok_or_else(|| ParseFault::url_not_found(url, manifest_url))
}

/// Byte offset of the first occurrence of `needle` delimited as `position` requires.
pub fn find_delimited(haystack: &str, needle: &str, position: UrlPosition) -> Option<usize> {
    find_delimited_from(haystack, needle, position, 0)
}

/// Like [`find_delimited`], starting the search at byte `from` of `haystack`.
///
/// Delimiters are checked against the whole haystack, so a match right at
/// `from` still sees the byte before it.
pub fn find_delimited_from(
    haystack: &str,
    needle: &str,
    position: UrlPosition,
    mut from: usize,
) -> Option<usize> {
    if needle.is_empty() || !haystack.is_char_boundary(from) {
        return None;
    }

    let bytes = haystack.as_bytes();
    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();

        let before = start.checked_sub(1).map(|i| bytes[i]);
        let after = bytes.get(end).copied();
        let on_line = matches!(before, None | Some(b'\n'))
            && matches!(after, None | Some(b'\n' | b'\r'));
        let quoted = before == Some(b'"') && after == Some(b'"');

        let delimited = match position {
            UrlPosition::Line => on_line,
            UrlPosition::Attribute => quoted,
            UrlPosition::Any => on_line || quoted,
        };
        if delimited {
            return Some(start);
        }

        from = start + 1;
        while !haystack.is_char_boundary(from) {
            from += 1;
        }
    }
    None
}

/// Identity of a segment across parses and across the bridge protocol.
pub fn runtime_id(absolute_url: &str, byte_range: Option<ByteRange>) -> String {
    match byte_range {
        Some(range) => format!("{absolute_url}{RANGE_SEPARATOR}{range}"),
        None => absolute_url.to_string(),
    }
}

/// Token for a segment endpoint URL.
///
/// An unranged URL that would itself read as ranged (it ends in `|s-e` or
/// `|`) gets an empty trailing range so decoding stays unambiguous.
pub fn encode_segment_token(absolute_url: &str, byte_range: Option<ByteRange>) -> String {
    let mut plain = runtime_id(absolute_url, byte_range);
    if byte_range.is_none() && split_range_suffix(absolute_url).is_some() {
        plain.push(RANGE_SEPARATOR);
    }
    URL_SAFE_NO_PAD.encode(plain)
}

/// Inverse of [`encode_segment_token`]. Padded input is accepted as well.
pub fn decode_segment_token(token: &str) -> Result<(String, Option<ByteRange>), String> {
    let decoded = URL_SAFE_NO_PAD
        .decode(token.trim_end_matches('='))
        .map_err(|e| format!("not base64url: {e}"))?;
    let plain = String::from_utf8(decoded).map_err(|e| format!("not UTF-8: {e}"))?;

    Ok(match split_range_suffix(&plain) {
        Some((url, range)) => (url.to_string(), range),
        None => (plain, None),
    })
}

/// Splits `url|s-e` or `url|` into the URL and its range.
fn split_range_suffix(plain: &str) -> Option<(&str, Option<ByteRange>)> {
    let (url, suffix) = plain.rsplit_once(RANGE_SEPARATOR)?;
    if suffix.is_empty() {
        return Some((url, None));
    }
    parse_range(suffix).map(|range| (url, Some(range)))
}

fn parse_range(suffix: &str) -> Option<ByteRange> {
    let (start, end) = suffix.split_once('-')?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(start) || !digits(end) {
        return None;
    }
    Some(ByteRange::new(start.parse().ok()?, end.parse().ok()?))
}

pub fn segment_proxy_url(proxy_base: &str, absolute_url: &str, range: Option<ByteRange>) -> String {
    format!(
        "{proxy_base}/?{SEGMENT_PARAM}={}",
        encode_segment_token(absolute_url, range)
    )
}

pub fn manifest_proxy_url(proxy_base: &str, absolute_url: &str) -> String {
    format!(
        "{proxy_base}/?{MANIFEST_PARAM}={}",
        urlencoding::encode(absolute_url)
    )
}

pub fn passthrough_proxy_url(proxy_base: &str, absolute_url: &str) -> String {
    format!(
        "{proxy_base}/?{PASSTHROUGH_PARAM}={}",
        urlencoding::encode(absolute_url)
    )
}
