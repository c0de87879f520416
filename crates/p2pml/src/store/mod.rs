//! In-memory registries mutated by manifest parses and read by the proxy
//! and the delivery engine.

mod catalog;
mod feed;
mod ledger;

pub use catalog::StreamCatalog;
pub use feed::UpdateFeed;
pub use ledger::SegmentLedger;

/// The three registries owned by one loader instance.
#[derive(Debug, Default)]
pub struct Stores {
    pub catalog: StreamCatalog,
    pub ledger: SegmentLedger,
    pub feed: UpdateFeed,
}

impl Stores {
    pub fn clear(&mut self) {
        self.catalog.clear();
        self.ledger.clear();
        self.feed.clear();
    }
}
