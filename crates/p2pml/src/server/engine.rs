//! Delivery-engine-facing routes.
//!
//! The engine connects to `/engine` over WebSocket and pulls stream and
//! segment metadata from the JSON endpoints next to it.

use axum::{
    Json, Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::bridge::EngineCommand;
use crate::model::{Stream, UpdateStreamParams};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuery {
    pub stream_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStateBody {
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EngineStateChange {
    pub enabled: bool,
    pub changed: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/engine", get(engine_ws))
        .route("/engine/streams", get(list_streams))
        .route("/engine/streams/update", get(stream_update))
        .route("/engine/state", get(get_state).put(put_state))
}

async fn engine_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Runs one engine connection. This task is the only writer of the socket,
/// so fetch commands leave in the order they were queued.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let bridge = state.bridge.clone();
    let (connection, mut commands) = bridge.attach();
    let (mut sender, mut receiver) = socket.split();

    let init = EngineCommand::Init {
        config: state.core_config.as_ref().clone(),
    };
    if let Err(e) = send_command(&mut sender, &init).await {
        debug!(connection, error = %e, "Failed to send init, engine disconnected");
        bridge.detach(connection);
        return;
    }

    let mut heartbeat_interval = tokio::time::interval(state.config.heartbeat_interval);
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => bridge.handle_text(text.as_str()),
                    Some(Ok(Message::Binary(data))) => bridge.handle_binary(data),
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => awaiting_pong = false,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(connection, error = %e, "Engine socket error");
                        break;
                    }
                }
            }

            command = commands.recv() => {
                let Some(command) = command else {
                    // Replaced by a newer connection, or the loader stopped.
                    break;
                };
                if let Err(e) = send_command(&mut sender, &command).await {
                    warn!(connection, error = %e, "Failed to send engine command, closing");
                    break;
                }
            }

            _ = heartbeat_interval.tick() => {
                if awaiting_pong {
                    warn!(connection, "Engine failed to respond to ping, closing");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }
        }
    }

    let _ = sender.close().await;
    bridge.detach(connection);
}

async fn send_command<S>(sender: &mut S, command: &EngineCommand) -> Result<(), axum::Error>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(command).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}

async fn list_streams(State(state): State<AppState>) -> Json<Vec<Stream>> {
    Json(state.service.streams().await)
}

async fn stream_update(
    State(state): State<AppState>,
    Query(query): Query<UpdateQuery>,
) -> ApiResult<Json<UpdateStreamParams>> {
    state
        .service
        .update_params(&query.stream_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no update for stream `{}`", query.stream_id)))
}

async fn get_state(State(state): State<AppState>) -> Json<EngineStateBody> {
    Json(EngineStateBody {
        enabled: state.gate.get(),
    })
}

async fn put_state(
    State(state): State<AppState>,
    Json(body): Json<EngineStateBody>,
) -> Json<EngineStateChange> {
    let changed = state.gate.set(body.enabled);
    Json(EngineStateChange {
        enabled: body.enabled,
        changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_support::{test_app, test_state};
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use tower::ServiceExt;

    const MEDIA: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.0,\na.ts\n#EXT-X-ENDLIST\n";

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn streams_and_updates_are_exposed() {
        let state = test_state();
        state
            .service
            .parse("https://h/v/index.m3u8", MEDIA)
            .await
            .unwrap();
        let app = test_app(state);

        let streams = json(app.clone().oneshot(get("/engine/streams")).await.unwrap()).await;
        assert_eq!(streams[0]["runtimeId"], "https://h/v/index.m3u8");
        assert_eq!(streams[0]["type"], "main");

        let uri = format!(
            "/engine/streams/update?streamId={}",
            urlencoding::encode("https://h/v/index.m3u8")
        );
        let update = json(app.oneshot(get(&uri)).await.unwrap()).await;
        assert_eq!(update["isLive"], false);
        assert_eq!(update["addSegments"][0]["runtimeId"], "https://h/v/a.ts");
        assert_eq!(update["addSegments"][0]["endTime"], 6.0);
    }

    #[tokio::test]
    async fn missing_update_is_not_found() {
        let app = test_app(test_state());
        let response = app
            .oneshot(get("/engine/streams/update?streamId=unknown"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn state_can_be_toggled() {
        let state = test_state();
        let app = test_app(state.clone());

        let put = |enabled: bool| {
            Request::builder()
                .method(Method::PUT)
                .uri("/engine/state")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(format!(r#"{{"enabled":{enabled}}}"#)))
                .unwrap()
        };

        let change = json(app.clone().oneshot(put(false)).await.unwrap()).await;
        assert_eq!(change["changed"], true);
        assert!(!state.gate.get());

        let change = json(app.clone().oneshot(put(false)).await.unwrap()).await;
        assert_eq!(change["changed"], false);

        let current = json(app.oneshot(get("/engine/state")).await.unwrap()).await;
        assert_eq!(current["enabled"], false);
    }

    #[tokio::test]
    async fn send_command_reports_a_closed_sink() {
        let (tx, mut rx) = futures::channel::mpsc::unbounded::<Message>();
        let mut sink = tx.sink_map_err(axum::Error::new);

        send_command(&mut sink, &EngineCommand::fetch("https://h/s.ts"))
            .await
            .unwrap();
        let Some(Message::Text(text)) = rx.next().await else {
            panic!("expected a text frame");
        };
        let sent: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(sent, serde_json::json!({"type": "fetch", "url": "https://h/s.ts"}));

        drop(rx);
        let err = send_command(&mut sink, &EngineCommand::fetch("https://h/s2.ts")).await;
        assert!(err.is_err());
    }
}
