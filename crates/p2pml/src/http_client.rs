use std::sync::OnceLock;

use tracing::debug;

use crate::config::LoaderConfig;
use crate::error::Result;

/// Installs the process-wide rustls crypto provider once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Client used for every origin request of one loader.
///
/// No overall timeout is set so long segment bodies can stream; manifest and
/// pass-through requests set their own.
pub fn build_client(config: &LoaderConfig) -> Result<reqwest::Client> {
    install_rustls_provider();

    let client = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .tcp_nodelay(true)
        .pool_max_idle_per_host(20)
        .user_agent(config.user_agent.as_str())
        .build()?;
    Ok(client)
}
