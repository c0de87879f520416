//! Messages exchanged with the delivery engine over the `/engine` socket.

use serde::{Deserialize, Serialize};

use crate::model::SegmentRequest;

/// Prefix of the text message reporting a failed fetch.
pub const ERROR_PREFIX: &str = "error|";

/// Outbound commands, sent as JSON text frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineCommand {
    /// Fetch a segment. The engine answers with the url as correlation id.
    Fetch(SegmentRequest),
    /// Sent once when the engine connects.
    Init { config: serde_json::Value },
    DynamicConfig { config: serde_json::Value },
}

impl EngineCommand {
    pub fn fetch(url: impl Into<String>) -> Self {
        Self::Fetch(SegmentRequest { url: url.into() })
    }
}

/// Inbound text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineReply<'a> {
    /// The payload for this id follows as the next binary message.
    Ready(&'a str),
    /// The engine gave up on this id. No payload follows.
    Failed(&'a str),
}

impl<'a> EngineReply<'a> {
    pub fn parse(text: &'a str) -> Self {
        match text.strip_prefix(ERROR_PREFIX) {
            Some(id) => Self::Failed(id),
            None => Self::Ready(text),
        }
    }
}
