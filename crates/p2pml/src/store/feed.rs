use std::collections::HashMap;

use crate::model::UpdateStreamParams;

/// Latest per-stream update record, pulled by the delivery engine.
///
/// Records replace each other; they are snapshots, not a log.
#[derive(Debug, Default)]
pub struct UpdateFeed {
    records: HashMap<String, UpdateStreamParams>,
}

impl UpdateFeed {
    pub fn put(&mut self, stream_id: impl Into<String>, record: UpdateStreamParams) {
        self.records.insert(stream_id.into(), record);
    }

    pub fn get(&self, stream_id: &str) -> Option<&UpdateStreamParams> {
        self.records.get(stream_id)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
