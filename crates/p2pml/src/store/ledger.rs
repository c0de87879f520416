use std::collections::{BTreeMap, HashMap, HashSet};

use crate::model::Segment;

/// Per-stream segment records keyed by media sequence number, plus the set of
/// runtime ids referenced by the most recent media playlist parse.
#[derive(Debug, Default)]
pub struct SegmentLedger {
    segments: HashMap<String, BTreeMap<i64, Segment>>,
    current_runtime_ids: HashSet<String>,
}

impl SegmentLedger {
    pub fn add_segment(&mut self, stream_id: &str, segment: Segment) {
        self.segments
            .entry(stream_id.to_string())
            .or_default()
            .insert(segment.external_id, segment);
    }

    pub fn is_present(&self, stream_id: &str, external_id: i64) -> bool {
        self.segments
            .get(stream_id)
            .is_some_and(|m| m.contains_key(&external_id))
    }

    pub fn get(&self, stream_id: &str, external_id: i64) -> Option<&Segment> {
        self.segments.get(stream_id)?.get(&external_id)
    }

    /// Removes every segment of `stream_id` below `threshold` and returns their runtime ids.
    pub fn remove_obsolete(&mut self, stream_id: &str, threshold: i64) -> Vec<String> {
        let Some(map) = self.segments.get_mut(stream_id) else {
            return Vec::new();
        };

        let kept = map.split_off(&threshold);
        let removed = std::mem::replace(map, kept);
        removed.into_values().map(|s| s.runtime_id).collect()
    }

    pub fn segment_count(&self, stream_id: &str) -> usize {
        self.segments.get(stream_id).map_or(0, BTreeMap::len)
    }

    pub fn add_runtime_id(&mut self, runtime_id: impl Into<String>) {
        self.current_runtime_ids.insert(runtime_id.into());
    }

    pub fn contains_runtime_id(&self, runtime_id: &str) -> bool {
        self.current_runtime_ids.contains(runtime_id)
    }

    pub fn clear_runtime_ids(&mut self) {
        self.current_runtime_ids.clear();
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.current_runtime_ids.clear();
    }
}
