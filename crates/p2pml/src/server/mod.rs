//! Local HTTP proxy serving the player and the delivery engine.

mod engine;
mod error;
mod headers;
mod proxy;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{Span, error, info, warn};

pub use engine::{EngineStateBody, EngineStateChange};
pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use headers::EXCLUDED_HEADERS;
pub use proxy::{MPEGURL_CONTENT_TYPE, ProxyQuery};

use crate::bridge::EngineBridge;
use crate::config::LoaderConfig;
use crate::service::HlsParserService;
use crate::state::EngineStateGate;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<HlsParserService>,
    pub bridge: EngineBridge,
    pub gate: Arc<EngineStateGate>,
    /// Client for every origin request
    pub client: reqwest::Client,
    pub config: Arc<LoaderConfig>,
    /// Sent to the delivery engine when it connects
    pub core_config: Arc<serde_json::Value>,
}

/// Build the router with all middleware and routes.
pub fn build_router(state: AppState) -> Router {
    // Player routes set their own CORS headers; the engine routes may be
    // called from a browser page hosting the engine.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(proxy::proxy_get).options(proxy::proxy_options))
        .merge(engine::router().layer(cors))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    let mut make_span =
                        tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                    use tower_http::trace::MakeSpan;
                    make_span.make_span(req)
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        let on_response = tower_http::trace::DefaultOnResponse::new()
                            .level(tracing::Level::DEBUG);
                        use tower_http::trace::OnResponse;
                        on_response.on_response(res, latency, span);
                    },
                )
                .on_failure(
                    |class: tower_http::classify::ServerErrorsFailureClass,
                     latency: Duration,
                     span: &Span| {
                        let mut on_failure =
                            tower_http::trace::DefaultOnFailure::new().level(tracing::Level::ERROR);
                        use tower_http::trace::OnFailure;
                        on_failure.on_failure(class, latency, span);
                    },
                ),
        )
        .with_state(state)
}

/// Base URL the player uses to reach a proxy bound on `addr`.
pub fn proxy_base(addr: SocketAddr) -> String {
    if addr.ip().is_unspecified() {
        format!("http://127.0.0.1:{}", addr.port())
    } else {
        format!("http://{addr}")
    }
}

/// A running proxy server.
pub struct ProxyServer {
    local_addr: SocketAddr,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl ProxyServer {
    /// Starts serving `state` on an already bound listener.
    pub fn serve(listener: TcpListener, local_addr: SocketAddr, state: AppState) -> Self {
        let router = build_router(state);
        let cancel_token = CancellationToken::new();
        let shutdown = cancel_token.clone();

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown.cancelled().await;
                    info!("Proxy server shutting down...");
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "Proxy server failed");
            }
        });

        info!("Proxy server listening on {}", proxy_base(local_addr));
        Self {
            local_addr,
            cancel_token,
            task,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for open ones to drain.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task)
            .await
            .is_err()
        {
            warn!("Proxy server did not drain in time, aborting");
            self.task.abort();
        }
    }
}
