use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use m3u8_rs::MediaPlaylist;
use tracing::debug;

use super::{ManifestDocument, ParserContext, PlaylistRewriter};
use crate::error::ParseFault;
use crate::model::{ByteRange, Segment, Stream, StreamType, UpdateStreamParams};
use crate::url_codec::{self, UrlPosition};

/// A segment whose URL has been spliced but whose bookkeeping is not yet
/// committed to the ledger.
struct SplicedSegment {
    external_id: i64,
    runtime_id: String,
    url: String,
    byte_range: Option<ByteRange>,
    duration: f64,
}

/// Rewrites a media playlist and tracks its segment timeline.
pub struct MediaRewriter {
    playlist: MediaPlaylist,
}

impl MediaRewriter {
    pub fn new(playlist: MediaPlaylist) -> Self {
        Self { playlist }
    }

    fn splice_segments(
        &self,
        ctx: &ParserContext<'_>,
        doc: &mut ManifestDocument,
    ) -> Result<Vec<SplicedSegment>, ParseFault> {
        let media_sequence = self.playlist.media_sequence as i64;
        // Next implied offset per URI for EXT-X-BYTERANGE without `@offset`.
        let mut next_offset: HashMap<String, u64> = HashMap::new();
        let mut spliced = Vec::with_capacity(self.playlist.segments.len());

        for (i, segment) in self.playlist.segments.iter().enumerate() {
            let external_id = media_sequence + i as i64;
            if segment.uri.trim().is_empty() {
                continue;
            }

            let absolute = url_codec::absolute_url(ctx.manifest_url, &segment.uri)?;
            let byte_range = segment.byte_range.as_ref().map(|range| {
                let offset = range
                    .offset
                    .or_else(|| next_offset.get(&absolute).copied())
                    .unwrap_or(0);
                ByteRange::from_length(offset, range.length)
            });
            if let Some(range) = byte_range {
                next_offset.insert(absolute.clone(), range.end.saturating_add(1));
            }

            let replacement = url_codec::segment_proxy_url(ctx.proxy_base, &absolute, byte_range);
            doc.replace_url(
                &absolute,
                &segment.uri,
                ctx.manifest_url,
                UrlPosition::Line,
                &replacement,
            )?;
            debug!(external_id, url = %absolute, "Spliced segment");

            spliced.push(SplicedSegment {
                external_id,
                runtime_id: url_codec::runtime_id(&absolute, byte_range),
                url: absolute,
                byte_range,
                duration: f64::from(segment.duration),
            });
        }

        Ok(spliced)
    }

    /// Init segments are routed through the segment endpoint but have no
    /// place on the timeline.
    fn splice_init_segments(
        &self,
        ctx: &ParserContext<'_>,
        doc: &mut ManifestDocument,
    ) -> Result<(), ParseFault> {
        let maps = self
            .playlist
            .segments
            .iter()
            .filter_map(|s| s.map.clone())
            .chain(playlist_level_map(&self.playlist));

        let mut seen = HashSet::new();
        for map in maps {
            let absolute = url_codec::absolute_url(ctx.manifest_url, &map.uri)?;
            if !seen.insert(absolute.clone()) {
                continue;
            }

            let range = map
                .byte_range
                .as_ref()
                .map(|r| ByteRange::from_length(r.offset.unwrap_or(0), r.length));
            let replacement = url_codec::segment_proxy_url(ctx.proxy_base, &absolute, range);
            doc.replace_url_everywhere(
                &absolute,
                &map.uri,
                ctx.manifest_url,
                UrlPosition::Attribute,
                &replacement,
            )?;
            debug!(url = %absolute, "Spliced init segment");
        }
        Ok(())
    }

    /// Key URIs go through the pass-through endpoint so the player never
    /// leaves the proxy origin.
    fn splice_keys(
        &self,
        ctx: &ParserContext<'_>,
        doc: &mut ManifestDocument,
    ) -> Result<(), ParseFault> {
        let mut seen = HashSet::new();
        let uris = self
            .playlist
            .segments
            .iter()
            .filter_map(|s| s.key.as_ref()?.uri.as_deref());

        for uri in uris {
            let absolute = url_codec::absolute_url(ctx.manifest_url, uri)?;
            if !absolute.starts_with("http") || !seen.insert(absolute.clone()) {
                continue;
            }

            let replacement = url_codec::passthrough_proxy_url(ctx.proxy_base, &absolute);
            doc.replace_url_everywhere(
                &absolute,
                uri,
                ctx.manifest_url,
                UrlPosition::Attribute,
                &replacement,
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl PlaylistRewriter for MediaRewriter {
    fn prepare(&self, ctx: &mut ParserContext<'_>, _doc: &ManifestDocument) {
        ctx.stores.ledger.clear_runtime_ids();
    }

    async fn process_entries(
        &self,
        ctx: &mut ParserContext<'_>,
        doc: &mut ManifestDocument,
    ) -> Result<(), ParseFault> {
        // Every splice must succeed before any bookkeeping is committed.
        let spliced = self.splice_segments(ctx, doc)?;
        self.splice_init_segments(ctx, doc)?;
        self.splice_keys(ctx, doc)?;

        let stream_id = ctx.manifest_url;
        let is_live = !self.playlist.end_list;
        let media_sequence = self.playlist.media_sequence as i64;

        let removed = ctx.stores.ledger.remove_obsolete(stream_id, media_sequence);

        let initial_start_time = if is_live {
            ctx.playback.absolute_playback_position(&self.playlist).await
        } else {
            0.0
        };

        let ledger = &mut ctx.stores.ledger;
        let mut added = Vec::new();
        for segment in spliced {
            ledger.add_runtime_id(segment.runtime_id.clone());
            if ledger.is_present(stream_id, segment.external_id) {
                continue;
            }

            let start_time = ledger
                .get(stream_id, segment.external_id - 1)
                .map_or(initial_start_time, |prev| prev.end_time);
            let record = Segment {
                runtime_id: segment.runtime_id,
                external_id: segment.external_id,
                url: segment.url,
                byte_range: segment.byte_range,
                start_time,
                end_time: start_time + segment.duration,
            };
            ledger.add_segment(stream_id, record.clone());
            added.push(record);
        }

        if ctx.stores.catalog.find(stream_id).is_none() {
            ctx.stores
                .catalog
                .add(Stream::new(stream_id, StreamType::Main, 0, None));
        }

        debug!(
            stream = %stream_id,
            added = added.len(),
            removed = removed.len(),
            is_live,
            "Media playlist processed"
        );

        ctx.stores.feed.put(
            stream_id,
            UpdateStreamParams {
                stream_runtime_id: stream_id.to_string(),
                add_segments: added,
                remove_segments_ids: removed,
                is_live,
            },
        );
        Ok(())
    }
}

/// `EXT-X-MAP` declared before the first segment is reported by m3u8-rs as an
/// unknown playlist tag rather than on the segment.
fn playlist_level_map(playlist: &MediaPlaylist) -> Option<m3u8_rs::Map> {
    let rest = playlist
        .unknown_tags
        .iter()
        .find(|t| t.tag == "X-MAP")?
        .rest
        .as_deref()?;

    let mut uri = None;
    let mut byte_range = None;
    for (key, value) in split_attributes(rest) {
        if key.eq_ignore_ascii_case("URI") {
            uri = Some(value.to_string());
        } else if key.eq_ignore_ascii_case("BYTERANGE") {
            let (length, offset) = value.split_once('@').unwrap_or((value, ""));
            if let Ok(length) = length.trim().parse::<u64>() {
                byte_range = Some(m3u8_rs::ByteRange {
                    length,
                    offset: offset.trim().parse::<u64>().ok(),
                });
            }
        }
    }

    Some(m3u8_rs::Map {
        uri: uri?,
        byte_range,
        other_attributes: HashMap::new(),
    })
}

/// Splits `KEY=VALUE` pairs on commas outside quotes, unquoting values.
fn split_attributes(rest: &str) -> Vec<(&str, &str)> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&rest[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&rest[start..]);

    parts
        .into_iter()
        .filter_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((key.trim(), value))
        })
        .collect()
}
