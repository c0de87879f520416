use std::time::Duration;

use reqwest::StatusCode;

/// Failure of a single manifest rewrite pass. The whole pass is aborted.
#[derive(Debug, thiserror::Error)]
pub enum ParseFault {
    #[error("URL `{url}` not found in manifest {manifest_url}")]
    UrlNotFound { url: String, manifest_url: String },

    #[error("invalid playlist: {reason}")]
    InvalidPlaylist { reason: String },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },
}

impl ParseFault {
    pub fn url_not_found(url: impl Into<String>, manifest_url: impl Into<String>) -> Self {
        Self::UrlNotFound {
            url: url.into(),
            manifest_url: manifest_url.into(),
        }
    }

    pub fn invalid_playlist(reason: impl Into<String>) -> Self {
        Self::InvalidPlaylist {
            reason: reason.into(),
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Failure of a bridge fetch. Always recoverable by fetching over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFault {
    #[error("delivery engine reported an error for `{id}`")]
    Engine { id: String },

    #[error("delivery engine did not answer `{id}` within {after:?}")]
    Timeout { id: String, after: Duration },

    #[error("no delivery engine is connected")]
    NotConnected,

    #[error("delivery engine disconnected")]
    Disconnected,

    #[error("bridge request was abandoned")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("operation `{operation}` not allowed in state {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("manifest rewrite failed: {0}")]
    Parse(#[from] ParseFault),

    #[error("bridge fetch failed: {0}")]
    Fetch(#[from] FetchFault),

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("invalid segment token: {reason}")]
    InvalidToken { reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl LoaderError {
    pub fn invalid_state(operation: &'static str, state: impl ToString) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;
