//! Loader configuration.

use std::time::Duration;

use crate::error::{LoaderError, Result};

/// Configuration of one loader instance.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Address the local proxy binds to
    pub bind_address: String,
    /// Port of the local proxy, 0 picks a free one
    pub port: u16,
    /// Core configuration handed to the delivery engine when it connects
    pub core_config_json: Option<String>,
    /// Whether segments may go through the delivery engine at start
    pub engine_enabled: bool,
    pub connect_timeout: Duration,
    /// Timeout of a whole manifest or pass-through request
    pub request_timeout: Duration,
    /// How long a segment waits for the delivery engine before falling back
    pub bridge_timeout: Duration,
    /// Ping interval on the engine socket
    pub heartbeat_interval: Duration,
    pub user_agent: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            core_config_json: None,
            engine_enabled: true,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            bridge_timeout: Duration::from_secs(20),
            heartbeat_interval: Duration::from_secs(30),
            user_agent: concat!("p2pml/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl LoaderConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `P2PML_BIND_ADDRESS` (e.g. "0.0.0.0")
    /// - `P2PML_PORT` (e.g. "8080")
    /// - `P2PML_CORE_CONFIG` (JSON object)
    /// - `P2PML_BRIDGE_TIMEOUT_SECS` (e.g. "20")
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(bind_address) = std::env::var("P2PML_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("P2PML_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }

        if let Ok(core_config) = std::env::var("P2PML_CORE_CONFIG")
            && !core_config.trim().is_empty()
        {
            config.core_config_json = Some(core_config);
        }

        if let Ok(secs) = std::env::var("P2PML_BRIDGE_TIMEOUT_SECS")
            && let Ok(parsed) = secs.parse::<u64>()
            && parsed > 0
        {
            config.bridge_timeout = Duration::from_secs(parsed);
        }

        config
    }

    /// Parses the core configuration. Absent config is an empty object.
    pub fn core_config(&self) -> Result<serde_json::Value> {
        let Some(raw) = self.core_config_json.as_deref() else {
            return Ok(serde_json::Value::Object(Default::default()));
        };

        let value: serde_json::Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(LoaderError::configuration(
                "core config must be a JSON object",
            ));
        }
        Ok(value)
    }
}
