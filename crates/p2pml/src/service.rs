//! Single owner of the parse-time registries.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::ParseFault;
use crate::model::{Stream, UpdateStreamParams};
use crate::parser;
use crate::playback::PlaybackProvider;
use crate::store::Stores;

/// Serializes manifest parses and answers registry queries.
///
/// A whole rewrite pass runs under one async lock, so catalog, ledger and
/// feed mutations of concurrent parses never interleave.
pub struct HlsParserService {
    stores: Mutex<Stores>,
    playback: Arc<dyn PlaybackProvider>,
    proxy_base: String,
}

impl HlsParserService {
    pub fn new(playback: Arc<dyn PlaybackProvider>, proxy_base: impl Into<String>) -> Self {
        Self {
            stores: Mutex::new(Stores::default()),
            playback,
            proxy_base: proxy_base.into(),
        }
    }

    /// Base URL the rewritten playlists point back at.
    pub fn proxy_base(&self) -> &str {
        &self.proxy_base
    }

    /// Rewrites a manifest fetched from `manifest_url`.
    ///
    /// A URL unknown to the catalog starts a new playback session: the
    /// registries and the playback provider are reset before parsing.
    pub async fn parse(&self, manifest_url: &str, raw: &str) -> Result<String, ParseFault> {
        let mut stores = self.stores.lock().await;

        if !stores.catalog.exists(manifest_url) {
            if !stores.catalog.is_empty() {
                info!(url = %manifest_url, "New manifest, starting a new session");
            }
            stores.clear();
            self.playback.reset().await;
        }

        parser::rewrite_manifest(
            raw,
            manifest_url,
            &mut stores,
            self.playback.as_ref(),
            &self.proxy_base,
        )
        .await
        .inspect_err(|e| error!(url = %manifest_url, error = %e, "Manifest rewrite aborted"))
    }

    /// Whether `runtime_id` was referenced by the latest media playlist parse.
    pub async fn is_current_segment(&self, runtime_id: &str) -> bool {
        self.stores.lock().await.ledger.contains_runtime_id(runtime_id)
    }

    pub async fn manifest_exists(&self, manifest_url: &str) -> bool {
        self.stores.lock().await.catalog.exists(manifest_url)
    }

    pub async fn streams(&self) -> Vec<Stream> {
        self.stores.lock().await.catalog.all().to_vec()
    }

    pub async fn update_params(&self, stream_id: &str) -> Option<UpdateStreamParams> {
        self.stores.lock().await.feed.get(stream_id).cloned()
    }

    /// Clears every registry and the playback provider's session state.
    pub async fn reset(&self) {
        self.stores.lock().await.clear();
        self.playback.reset().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use m3u8_rs::MediaPlaylist;

    use super::*;

    #[derive(Default)]
    struct CountingProvider {
        resets: AtomicUsize,
    }

    #[async_trait]
    impl PlaybackProvider for CountingProvider {
        async fn absolute_playback_position(&self, _playlist: &MediaPlaylist) -> f64 {
            30.0
        }

        async fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn media(first: &str) -> String {
        format!("#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:1\n#EXTINF:4.0,\n{first}\n")
    }

    #[tokio::test]
    async fn live_parse_anchors_at_provider_position() {
        let provider = Arc::new(CountingProvider::default());
        let service = HlsParserService::new(provider, "http://127.0.0.1:8080");

        let url = "https://h/a/index.m3u8";
        service.parse(url, &media("s1.ts")).await.unwrap();

        let update = service.update_params(url).await.unwrap();
        assert_eq!(update.add_segments[0].start_time, 30.0);
        assert_eq!(update.add_segments[0].end_time, 34.0);
        assert!(service.is_current_segment("https://h/a/s1.ts").await);
        assert!(service.manifest_exists(url).await);
        assert_eq!(service.streams().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_manifest_starts_new_session() {
        let provider = Arc::new(CountingProvider::default());
        let service = HlsParserService::new(provider.clone(), "http://127.0.0.1:8080");

        service.parse("https://h/a/index.m3u8", &media("s1.ts")).await.unwrap();
        service.parse("https://h/a/index.m3u8", &media("s1.ts")).await.unwrap();
        assert_eq!(provider.resets.load(Ordering::SeqCst), 1);

        service.parse("https://h/b/index.m3u8", &media("s1.ts")).await.unwrap();
        assert_eq!(provider.resets.load(Ordering::SeqCst), 2);
        assert!(!service.manifest_exists("https://h/a/index.m3u8").await);
        assert!(service.update_params("https://h/a/index.m3u8").await.is_none());
    }

    #[tokio::test]
    async fn garbage_is_an_invalid_playlist() {
        let service =
            HlsParserService::new(Arc::new(CountingProvider::default()), "http://127.0.0.1:8080");
        let err = service
            .parse("https://h/index.m3u8", "<html>not a playlist</html>")
            .await
            .unwrap_err();
        assert!(matches!(err, ParseFault::InvalidPlaylist { .. }));
    }

    #[tokio::test]
    async fn reset_clears_registries() {
        let provider = Arc::new(CountingProvider::default());
        let service = HlsParserService::new(provider.clone(), "http://127.0.0.1:8080");
        service.parse("https://h/a/index.m3u8", &media("s1.ts")).await.unwrap();

        service.reset().await;
        assert!(service.streams().await.is_empty());
        assert!(!service.is_current_segment("https://h/a/s1.ts").await);
        assert_eq!(provider.resets.load(Ordering::SeqCst), 2);
    }
}
