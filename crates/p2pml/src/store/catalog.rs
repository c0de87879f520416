use crate::model::Stream;

/// Append-only list of streams seen in parsed manifests.
#[derive(Debug, Default)]
pub struct StreamCatalog {
    streams: Vec<Stream>,
}

impl StreamCatalog {
    pub fn add(&mut self, stream: Stream) {
        self.streams.push(stream);
    }

    pub fn find(&self, runtime_id: &str) -> Option<&Stream> {
        self.streams.iter().find(|s| s.runtime_id == runtime_id)
    }

    /// True if `manifest_url` is a known stream or the multivariant playlist of one.
    pub fn exists(&self, manifest_url: &str) -> bool {
        self.streams.iter().any(|s| {
            s.runtime_id == manifest_url || s.master_manifest_url.as_deref() == Some(manifest_url)
        })
    }

    pub fn all(&self) -> &[Stream] {
        &self.streams
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn clear(&mut self) {
        self.streams.clear();
    }
}
