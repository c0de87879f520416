use async_trait::async_trait;
use m3u8_rs::{AlternativeMediaType, MasterPlaylist};
use tracing::debug;

use super::{ManifestDocument, ParserContext, PlaylistRewriter};
use crate::error::ParseFault;
use crate::model::{Stream, StreamType};
use crate::url_codec::{self, UrlPosition};

/// Rewrites a multivariant playlist and registers its variants and renditions.
pub struct MultivariantRewriter {
    playlist: MasterPlaylist,
}

impl MultivariantRewriter {
    pub fn new(playlist: MasterPlaylist) -> Self {
        Self { playlist }
    }
}

#[async_trait]
impl PlaylistRewriter for MultivariantRewriter {
    async fn process_entries(
        &self,
        ctx: &mut ParserContext<'_>,
        doc: &mut ManifestDocument,
    ) -> Result<(), ParseFault> {
        let manifest_url = ctx.manifest_url;
        let mut discovered = Vec::new();

        for (index, variant) in self
            .playlist
            .variants
            .iter()
            .filter(|v| !v.is_i_frame)
            .enumerate()
        {
            let absolute = url_codec::absolute_url(manifest_url, &variant.uri)?;
            let replacement = url_codec::manifest_proxy_url(ctx.proxy_base, &absolute);
            doc.replace_url(
                &absolute,
                &variant.uri,
                manifest_url,
                UrlPosition::Line,
                &replacement,
            )?;
            discovered.push(Stream::new(
                absolute,
                StreamType::Main,
                index,
                Some(manifest_url.to_string()),
            ));
        }

        // I-frame playlists are only used for trick play.
        for variant in self.playlist.variants.iter().filter(|v| v.is_i_frame) {
            let absolute = url_codec::absolute_url(manifest_url, &variant.uri)?;
            let replacement = url_codec::passthrough_proxy_url(ctx.proxy_base, &absolute);
            doc.replace_url(
                &absolute,
                &variant.uri,
                manifest_url,
                UrlPosition::Attribute,
                &replacement,
            )?;
        }

        let mut rendition_index = 0;
        for media in &self.playlist.alternatives {
            let Some(uri) = media.uri.as_deref() else {
                continue;
            };
            let absolute = url_codec::absolute_url(manifest_url, uri)?;

            match media.media_type {
                AlternativeMediaType::Audio | AlternativeMediaType::Video => {
                    let replacement = url_codec::manifest_proxy_url(ctx.proxy_base, &absolute);
                    doc.replace_url(
                        &absolute,
                        uri,
                        manifest_url,
                        UrlPosition::Attribute,
                        &replacement,
                    )?;
                    discovered.push(Stream::new(
                        absolute,
                        StreamType::Secondary,
                        rendition_index,
                        Some(manifest_url.to_string()),
                    ));
                    rendition_index += 1;
                }
                _ => {
                    let replacement = url_codec::passthrough_proxy_url(ctx.proxy_base, &absolute);
                    doc.replace_url(
                        &absolute,
                        uri,
                        manifest_url,
                        UrlPosition::Attribute,
                        &replacement,
                    )?;
                }
            }
        }

        let catalog = &mut ctx.stores.catalog;
        let mut registered = 0;
        for stream in discovered {
            if catalog.find(&stream.runtime_id).is_some() {
                continue;
            }
            debug!(stream = %stream.runtime_id, kind = ?stream.stream_type, index = stream.index, "Registered stream");
            catalog.add(stream);
            registered += 1;
        }

        debug!(url = %manifest_url, registered, "Multivariant playlist processed");
        Ok(())
    }
}
