//! Drives a started loader the way a player and a delivery engine would.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use p2pml_engine::http_client::install_rustls_provider;
use p2pml_engine::{Loader, LoaderConfig, StaticPlaybackProvider};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
v1/index.m3u8
";

const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:6.0,
seg0.ts
#EXTINF:6.0,
seg1.ts
#EXT-X-ENDLIST
";

const ORIGIN_BODY: &[u8] = b"origin-bytes";
const PEER_BODY: &[u8] = b"peer-bytes";

#[derive(Clone, Default)]
struct OriginHits(Arc<AtomicUsize>);

async fn origin_file(State(hits): State<OriginHits>, Path(path): Path<String>) -> Response {
    match path.as_str() {
        "master.m3u8" => MASTER.into_response(),
        "v1/index.m3u8" => MEDIA.into_response(),
        p if p.starts_with("v1/") && p.ends_with(".ts") => {
            hits.0.fetch_add(1, Ordering::SeqCst);
            ORIGIN_BODY.into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn start_origin() -> (String, OriginHits) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = OriginHits::default();
    let app = Router::new()
        .route("/{*path}", get(origin_file))
        .with_state(hits.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), hits)
}

/// Connects a fake engine that serves `PEER_BODY` for every fetch, except
/// urls ending in `seg1.ts` which it reports as failed.
async fn connect_engine(addr: std::net::SocketAddr) -> serde_json::Value {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/engine"))
        .await
        .unwrap();
    let (mut sink, mut stream) = socket.split();

    let init = match stream.next().await {
        Some(Ok(Message::Text(text))) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected init command, got {other:?}"),
    };

    tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            let Message::Text(text) = msg else { continue };
            let command: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            if command["type"] != "fetch" {
                continue;
            }
            let url = command["url"].as_str().unwrap().to_string();
            if url.ends_with("seg1.ts") {
                sink.send(Message::text(format!("error|{url}"))).await.unwrap();
            } else {
                sink.send(Message::text(url)).await.unwrap();
                sink.send(Message::binary(PEER_BODY)).await.unwrap();
            }
        }
    });

    init
}

/// Proxied urls on the non-comment lines of a rewritten playlist.
fn playlist_urls(playlist: &str) -> Vec<String> {
    playlist
        .lines()
        .filter(|line| line.starts_with("http://"))
        .map(str::to_string)
        .collect()
}

async fn get_bytes(client: &reqwest::Client, url: &str) -> (StatusCode, Vec<u8>) {
    let response = client.get(url).send().await.unwrap();
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    (status, response.bytes().await.unwrap().to_vec())
}

#[tokio::test]
async fn segments_flow_through_the_engine() {
    install_rustls_provider();
    let (origin, hits) = start_origin().await;

    let mut loader = Loader::new(LoaderConfig {
        port: 0,
        core_config_json: Some(r#"{"swarmId":"integration"}"#.to_string()),
        bridge_timeout: Duration::from_secs(5),
        ..Default::default()
    });
    loader
        .start(Arc::new(StaticPlaybackProvider::default()))
        .await
        .unwrap();
    let addr = loader.local_addr().unwrap();

    let init = connect_engine(addr).await;
    assert_eq!(init["type"], "init");
    assert_eq!(init["config"]["swarmId"], "integration");
    assert!(loader.is_engine_connected().unwrap());

    let client = reqwest::Client::new();
    let master_url = format!("{origin}/master.m3u8");
    let (status, master) = get_bytes(&client, &loader.manifest_url(&master_url).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let variants = playlist_urls(std::str::from_utf8(&master).unwrap());
    assert_eq!(variants.len(), 1);
    assert!(variants[0].contains("?manifest="));

    let (status, media) = get_bytes(&client, &variants[0]).await;
    assert_eq!(status, StatusCode::OK);
    let segments = playlist_urls(std::str::from_utf8(&media).unwrap());
    assert_eq!(segments.len(), 2);
    assert!(segments.iter().all(|s| s.contains("?segment=")));

    // Served by the engine.
    assert_eq!(get_bytes(&client, &segments[0]).await, (StatusCode::OK, PEER_BODY.to_vec()));
    assert_eq!(hits.0.load(Ordering::SeqCst), 0);

    // Engine reports a failure, the origin fills in.
    assert_eq!(get_bytes(&client, &segments[1]).await, (StatusCode::OK, ORIGIN_BODY.to_vec()));
    assert_eq!(hits.0.load(Ordering::SeqCst), 1);

    // Disabled gate bypasses the engine.
    assert!(loader.set_engine_enabled(false).unwrap());
    assert_eq!(get_bytes(&client, &segments[0]).await, (StatusCode::OK, ORIGIN_BODY.to_vec()));
    assert_eq!(hits.0.load(Ordering::SeqCst), 2);

    let streams: serde_json::Value = client
        .get(format!("http://{addr}/engine/streams"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(streams.as_array().unwrap().len(), 1);
    assert_eq!(streams[0]["runtimeId"], format!("{origin}/v1/index.m3u8"));

    loader.stop().await.unwrap();
    assert!(client.get(&segments[0]).send().await.is_err());
}
