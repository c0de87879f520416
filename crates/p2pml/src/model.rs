//! Records shared with the delivery engine.
//!
//! Field names follow the engine's camelCase JSON schema.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Main,
    Secondary,
}

/// A logical stream (variant or rendition) known to the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    /// Absolute URL of the stream's media playlist.
    pub runtime_id: String,
    #[serde(rename = "type")]
    pub stream_type: StreamType,
    pub index: usize,
    pub master_manifest_url: Option<String>,
}

impl Stream {
    pub fn new(
        runtime_id: impl Into<String>,
        stream_type: StreamType,
        index: usize,
        master_manifest_url: Option<String>,
    ) -> Self {
        Self {
            runtime_id: runtime_id.into(),
            stream_type,
            index,
            master_manifest_url,
        }
    }
}

/// Inclusive byte range, as sent in an HTTP `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Builds the range covered by an `EXT-X-BYTERANGE` of `length` bytes at `offset`.
    pub fn from_length(offset: u64, length: u64) -> Self {
        Self {
            start: offset,
            end: offset.saturating_add(length).saturating_sub(1),
        }
    }

    pub fn len(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        (self.end - self.start).saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Value for an HTTP `Range` request header.
    pub fn to_header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub runtime_id: String,
    /// Media sequence number assigned by the playlist.
    pub external_id: i64,
    pub url: String,
    pub byte_range: Option<ByteRange>,
    pub start_time: f64,
    pub end_time: f64,
}

/// What changed for one stream during its most recent parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStreamParams {
    pub stream_runtime_id: String,
    pub add_segments: Vec<Segment>,
    pub remove_segments_ids: Vec<String>,
    pub is_live: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRequest {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_range_from_length_is_inclusive() {
        let range = ByteRange::from_length(100, 50);
        assert_eq!(range, ByteRange::new(100, 149));
        assert_eq!(range.len(), 50);
        assert_eq!(range.to_header_value(), "bytes=100-149");
    }

    #[test]
    fn byte_range_from_length_saturates_at_u64_max() {
        let range = ByteRange::from_length(u64::MAX - 10, 100);
        assert_eq!(range, ByteRange::new(u64::MAX - 10, u64::MAX - 1));
        assert_eq!(range.len(), 10);

        let whole = ByteRange::new(0, u64::MAX);
        assert_eq!(whole.len(), u64::MAX);
    }

    #[test]
    fn stream_serializes_with_engine_field_names() {
        let stream = Stream::new(
            "https://cdn.example.com/v1/index.m3u8",
            StreamType::Secondary,
            2,
            Some("https://cdn.example.com/master.m3u8".to_string()),
        );
        let json = serde_json::to_value(&stream).unwrap();
        assert_eq!(json["runtimeId"], "https://cdn.example.com/v1/index.m3u8");
        assert_eq!(json["type"], "secondary");
        assert_eq!(json["index"], 2);
        assert_eq!(json["masterManifestUrl"], "https://cdn.example.com/master.m3u8");
    }

    #[test]
    fn update_params_serialize_removal_ids() {
        let params = UpdateStreamParams {
            stream_runtime_id: "s".to_string(),
            add_segments: vec![],
            remove_segments_ids: vec!["a".to_string()],
            is_live: true,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["streamRuntimeId"], "s");
        assert_eq!(json["removeSegmentsIds"][0], "a");
        assert_eq!(json["isLive"], true);
    }
}
