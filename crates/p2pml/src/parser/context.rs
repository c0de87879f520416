use crate::playback::PlaybackProvider;
use crate::store::Stores;

/// Everything a rewrite pass reads or mutates besides the playlist itself.
pub struct ParserContext<'a> {
    /// Absolute URL the playlist was fetched from.
    pub manifest_url: &'a str,
    pub stores: &'a mut Stores,
    pub playback: &'a dyn PlaybackProvider,
    /// Scheme, host and port of the local proxy, without a trailing slash.
    pub proxy_base: &'a str,
}
