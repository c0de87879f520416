//! Lifecycle of one proxy instance.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::bridge::{EngineBridge, EngineCommand};
use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};
use crate::http_client;
use crate::playback::PlaybackProvider;
use crate::server::{self, AppState, ProxyServer};
use crate::service::HlsParserService;
use crate::state::EngineStateGate;
use crate::url_codec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Initialized,
    Started,
    Stopped,
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

struct Running {
    server: ProxyServer,
    app: AppState,
    proxy_base: String,
}

/// Owns the proxy server, registries, engine bridge and engine state gate.
///
/// `start` may be called again after `stop`; every other operation requires
/// a started loader.
pub struct Loader {
    config: LoaderConfig,
    state: LoaderState,
    running: Option<Running>,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            state: LoaderState::Initialized,
            running: None,
        }
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Binds the proxy and starts serving.
    pub async fn start(&mut self, playback: Arc<dyn PlaybackProvider>) -> Result<()> {
        if self.state == LoaderState::Started {
            return Err(LoaderError::invalid_state("start", self.state));
        }

        let core_config = self.config.core_config()?;
        let client = http_client::build_client(&self.config)?;

        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        let proxy_base = server::proxy_base(local_addr);

        let app = AppState {
            service: Arc::new(HlsParserService::new(playback, proxy_base.clone())),
            bridge: EngineBridge::new(self.config.bridge_timeout),
            gate: Arc::new(EngineStateGate::new(self.config.engine_enabled)),
            client,
            config: Arc::new(self.config.clone()),
            core_config: Arc::new(core_config),
        };
        let server = ProxyServer::serve(listener, local_addr, app.clone());

        self.running = Some(Running {
            server,
            app,
            proxy_base,
        });
        self.state = LoaderState::Started;
        info!(addr = %local_addr, "Loader started");
        Ok(())
    }

    /// Shuts the server down and drops every registry.
    pub async fn stop(&mut self) -> Result<()> {
        self.running_for("stop")?;
        let Some(Running { server, app, .. }) = self.running.take() else {
            return Err(LoaderError::invalid_state("stop", self.state));
        };

        // Dropping the engine connection first lets the socket task end so
        // the graceful shutdown can drain.
        app.bridge.reset();
        server.shutdown().await;
        app.service.reset().await;
        app.gate.reset();

        self.state = LoaderState::Stopped;
        info!("Loader stopped");
        Ok(())
    }

    /// Local URL through which the player should load `manifest_url`.
    pub fn manifest_url(&self, manifest_url: &str) -> Result<String> {
        let running = self.running_for("manifest_url")?;
        Ok(url_codec::manifest_proxy_url(&running.proxy_base, manifest_url))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.running_for("local_addr")?.server.local_addr())
    }

    /// Sends a dynamic configuration object to the connected engine.
    pub fn apply_dynamic_config(&self, config_json: &str) -> Result<()> {
        let running = self.running_for("apply_dynamic_config")?;
        let config: serde_json::Value = serde_json::from_str(config_json)?;
        if !config.is_object() {
            return Err(LoaderError::configuration(
                "dynamic config must be a JSON object",
            ));
        }
        running
            .app
            .bridge
            .send_command(EngineCommand::DynamicConfig { config })?;
        Ok(())
    }

    /// Enables or disables peer delivery. Returns whether the state changed.
    pub fn set_engine_enabled(&self, enabled: bool) -> Result<bool> {
        Ok(self.running_for("set_engine_enabled")?.app.gate.set(enabled))
    }

    pub fn engine_enabled(&self) -> Result<bool> {
        Ok(self.running_for("engine_enabled")?.app.gate.get())
    }

    pub fn is_engine_connected(&self) -> Result<bool> {
        Ok(self.running_for("is_engine_connected")?.app.bridge.is_connected())
    }

    fn running_for(&self, operation: &'static str) -> Result<&Running> {
        match (&self.running, self.state) {
            (Some(running), LoaderState::Started) => Ok(running),
            _ => Err(LoaderError::invalid_state(operation, self.state)),
        }
    }
}
