//! Request/response bridge to the external delivery engine.
//!
//! A fetch is issued as a text command. The engine answers with its id as a
//! text message followed by the payload as a binary message, or with
//! `error|<id>`. The two halves of a success reply are paired purely by
//! arrival order, tracked by the [`Handoff`] marker.

mod correlation;
mod protocol;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub use correlation::{CorrelationTable, FetchResult, Handoff};
pub use protocol::{ERROR_PREFIX, EngineCommand, EngineReply};

use crate::error::FetchFault;

/// Identifies one attached engine connection.
pub type ConnectionId = u64;

#[derive(Debug)]
struct Connection {
    id: ConnectionId,
    commands: mpsc::UnboundedSender<EngineCommand>,
}

#[derive(Debug, Default)]
struct BridgeInner {
    table: CorrelationTable,
    connection: Option<Connection>,
    next_connection: ConnectionId,
}

/// Waiter of one `request_bytes` call. Dropping it, on completion, timeout or
/// cancellation of the caller, prunes the closed waiter so a later request for
/// the same id issues a fresh fetch.
struct PendingRequest<'a> {
    bridge: &'a EngineBridge,
    id: &'a str,
    reply: oneshot::Receiver<FetchResult>,
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        self.reply.close();
        self.bridge.inner.lock().table.prune(self.id);
    }
}

/// Cloneable handle to the bridge state shared by the proxy and the socket task.
#[derive(Debug, Clone)]
pub struct EngineBridge {
    inner: Arc<Mutex<BridgeInner>>,
    timeout: Duration,
}

impl EngineBridge {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BridgeInner::default())),
            timeout,
        }
    }

    /// Attaches a new engine connection and returns the receiving end of its
    /// command queue. A previously attached engine is replaced and its
    /// pending requests fail.
    pub fn attach(&self) -> (ConnectionId, mpsc::UnboundedReceiver<EngineCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();

        inner.next_connection += 1;
        let id = inner.next_connection;
        if inner.connection.replace(Connection { id, commands: tx }).is_some() {
            warn!(connection = id, "Delivery engine replaced by a new connection");
            inner.table.fail_all(FetchFault::Disconnected);
        }

        info!(connection = id, "Delivery engine attached");
        (id, rx)
    }

    /// Detaches `connection` if it is still the current one.
    pub fn detach(&self, connection: ConnectionId) {
        let mut inner = self.inner.lock();
        if inner.connection.as_ref().is_none_or(|c| c.id != connection) {
            return;
        }

        inner.connection = None;
        inner.table.fail_all(FetchFault::Disconnected);
        info!(connection, "Delivery engine detached");
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connection.is_some()
    }

    /// Queues a command for the attached engine.
    pub fn send_command(&self, command: EngineCommand) -> Result<(), FetchFault> {
        let inner = self.inner.lock();
        let connection = inner.connection.as_ref().ok_or(FetchFault::NotConnected)?;
        connection
            .commands
            .send(command)
            .map_err(|_| FetchFault::Disconnected)
    }

    /// Asks the engine for the bytes of the segment identified by `id`.
    pub async fn request_bytes(&self, id: &str) -> Result<Bytes, FetchFault> {
        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let connection = inner.connection.as_ref().ok_or(FetchFault::NotConnected)?;

            if inner.table.register(id, tx) {
                debug!(id = %id, "Issuing fetch to delivery engine");
                if connection.commands.send(EngineCommand::fetch(id)).is_err() {
                    inner.table.remove(id);
                    return Err(FetchFault::Disconnected);
                }
            }
        }

        let mut pending = PendingRequest {
            bridge: self,
            id,
            reply: rx,
        };

        match tokio::time::timeout(self.timeout, &mut pending.reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(FetchFault::Closed),
            Err(_) => {
                warn!(id = %id, after = ?self.timeout, "Delivery engine request timed out");
                Err(FetchFault::Timeout {
                    id: id.to_string(),
                    after: self.timeout,
                })
            }
        }
    }

    pub fn handle_text(&self, text: &str) {
        let mut inner = self.inner.lock();
        match EngineReply::parse(text) {
            EngineReply::Ready(id) => inner.table.on_ready(id),
            EngineReply::Failed(id) => {
                debug!(id = %id, "Delivery engine failed request");
                inner.table.on_failed(id);
            }
        }
    }

    pub fn handle_binary(&self, payload: Bytes) {
        self.inner.lock().table.on_payload(payload);
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.lock().table.len()
    }

    /// Drops the connection and abandons every pending request.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.connection = None;
        inner.table.clear();
    }
}
