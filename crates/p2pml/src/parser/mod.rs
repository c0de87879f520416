//! HLS manifest rewriting.
//!
//! A playlist is parsed with `m3u8-rs` only to enumerate its URIs; the
//! returned text is the original text with exactly those URIs replaced by
//! local proxy URLs.

mod context;
mod document;
mod media;
mod multivariant;
mod passthrough;

use async_trait::async_trait;
use m3u8_rs::Playlist;
use tracing::debug;

pub use context::ParserContext;
pub use document::ManifestDocument;
pub use media::MediaRewriter;
pub use multivariant::MultivariantRewriter;
pub use passthrough::rewrite_passthrough_playlist;

use crate::error::ParseFault;
use crate::playback::PlaybackProvider;
use crate::store::Stores;

#[async_trait]
pub trait PlaylistRewriter: Send + Sync {
    /// Runs one pass: load, prepare, process entries, render.
    async fn rewrite(&self, raw: &str, ctx: &mut ParserContext<'_>) -> Result<String, ParseFault> {
        let mut doc = ManifestDocument::load(raw);
        self.prepare(ctx, &doc);
        self.process_entries(ctx, &mut doc).await?;
        Ok(doc.render())
    }

    fn prepare(&self, _ctx: &mut ParserContext<'_>, _doc: &ManifestDocument) {}

    async fn process_entries(
        &self,
        ctx: &mut ParserContext<'_>,
        doc: &mut ManifestDocument,
    ) -> Result<(), ParseFault>;
}

/// Parses `raw`, updates `stores` and returns the rewritten playlist text.
pub async fn rewrite_manifest(
    raw: &str,
    manifest_url: &str,
    stores: &mut Stores,
    playback: &dyn PlaybackProvider,
    proxy_base: &str,
) -> Result<String, ParseFault> {
    let playlist = m3u8_rs::parse_playlist_res(raw.as_bytes())
        .map_err(|e| ParseFault::invalid_playlist(format!("{manifest_url}: {e}")))?;

    let mut ctx = ParserContext {
        manifest_url,
        stores,
        playback,
        proxy_base,
    };

    match playlist {
        Playlist::MediaPlaylist(pl) => {
            debug!(url = %manifest_url, segments = pl.segments.len(), "Rewriting media playlist");
            MediaRewriter::new(pl).rewrite(raw, &mut ctx).await
        }
        Playlist::MasterPlaylist(pl) => {
            debug!(url = %manifest_url, variants = pl.variants.len(), "Rewriting multivariant playlist");
            MultivariantRewriter::new(pl).rewrite(raw, &mut ctx).await
        }
    }
}
