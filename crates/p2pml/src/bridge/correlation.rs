use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::FetchFault;

pub type FetchResult = Result<Bytes, FetchFault>;
type Waiter = oneshot::Sender<FetchResult>;

/// Pairing state between a success text and the binary message after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Handoff {
    #[default]
    Idle,
    AwaitingPayload(String),
}

/// Pending bridge requests keyed by correlation id.
///
/// Requests for the same id share one entry and are all resolved by the same
/// reply.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: HashMap<String, Vec<Waiter>>,
    handoff: Handoff,
}

impl CorrelationTable {
    /// Adds a waiter. Returns `true` if this is the first one for `id`, in
    /// which case the caller must issue the fetch command.
    pub fn register(&mut self, id: &str, waiter: Waiter) -> bool {
        match self.pending.get_mut(id) {
            Some(waiters) => {
                waiters.push(waiter);
                false
            }
            None => {
                self.pending.insert(id.to_string(), vec![waiter]);
                true
            }
        }
    }

    /// Drops waiters whose receivers are gone, and the entry once empty.
    pub fn prune(&mut self, id: &str) {
        if let Some(waiters) = self.pending.get_mut(id) {
            waiters.retain(|w| !w.is_closed());
            if waiters.is_empty() {
                self.pending.remove(id);
            }
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.pending.remove(id);
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn waiters(&self, id: &str) -> usize {
        self.pending.get(id).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn handoff(&self) -> &Handoff {
        &self.handoff
    }

    pub fn on_ready(&mut self, id: &str) {
        if let Handoff::AwaitingPayload(previous) = &self.handoff {
            warn!(previous = %previous, next = %id, "Payload never arrived, replacing pending handoff");
        }
        if !self.pending.contains_key(id) {
            debug!(id = %id, "Reply for unknown request, payload will be dropped");
        }
        self.handoff = Handoff::AwaitingPayload(id.to_string());
    }

    pub fn on_failed(&mut self, id: &str) {
        if self.handoff == Handoff::AwaitingPayload(id.to_string()) {
            self.handoff = Handoff::Idle;
        }
        match self.pending.remove(id) {
            Some(waiters) => resolve(waiters, Err(FetchFault::Engine { id: id.to_string() })),
            None => debug!(id = %id, "Error reply for unknown request"),
        }
    }

    pub fn on_payload(&mut self, payload: Bytes) {
        let Handoff::AwaitingPayload(id) = std::mem::take(&mut self.handoff) else {
            warn!(len = payload.len(), "Binary message without a pending id, dropping");
            return;
        };

        match self.pending.remove(&id) {
            Some(waiters) => {
                debug!(id = %id, len = payload.len(), waiters = waiters.len(), "Resolved bridge request");
                resolve(waiters, Ok(payload));
            }
            None => debug!(id = %id, "Payload for unknown request dropped"),
        }
    }

    /// Fails every pending request and resets the handoff.
    pub fn fail_all(&mut self, fault: FetchFault) {
        self.handoff = Handoff::Idle;
        for (_, waiters) in self.pending.drain() {
            resolve(waiters, Err(fault.clone()));
        }
    }

    /// Abandons every pending request. Their receivers observe a closed channel.
    pub fn clear(&mut self) {
        self.handoff = Handoff::Idle;
        self.pending.clear();
    }
}

fn resolve(waiters: Vec<Waiter>, result: FetchResult) {
    for waiter in waiters {
        let _ = waiter.send(result.clone());
    }
}
