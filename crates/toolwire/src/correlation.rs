//! Base transport state: pending-request correlation plus the lifecycle
//! handler slots.
//!
//! One mutex guards the pending map, the lifecycle state and the three
//! handler slots. It is held only while those are read or mutated, never
//! across an await, and handlers are always invoked after it is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{McpError, McpResult};
use crate::handler::{CloseHandler, ErrorHandler, MessageHandler};
use crate::message::{JsonRpcResponse, RequestId};

type Delivery = McpResult<JsonRpcResponse>;

/// Transport lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Started,
    Closed,
}

struct PendingEntry {
    generation: u64,
    tx: oneshot::Sender<Delivery>,
}

#[derive(Default)]
struct HandlerSlots {
    message: Option<Arc<dyn MessageHandler>>,
    error: Option<ErrorHandler>,
    close: Option<CloseHandler>,
}

struct State {
    pending: HashMap<RequestId, PendingEntry>,
    next_generation: u64,
    lifecycle: Lifecycle,
    handlers: HandlerSlots,
}

/// Per-connection correlation engine shared by every transport variant.
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct BaseTransport {
    state: Arc<Mutex<State>>,
}

impl Default for BaseTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                pending: HashMap::new(),
                next_generation: 0,
                lifecycle: Lifecycle::Created,
                handlers: HandlerSlots::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.lock().handlers.message = Some(handler);
    }

    pub fn set_error_handler(&self, handler: ErrorHandler) {
        self.lock().handlers.error = Some(handler);
    }

    pub fn set_close_handler(&self, handler: CloseHandler) {
        self.lock().handlers.close = Some(handler);
    }

    pub fn message_handler(&self) -> Option<Arc<dyn MessageHandler>> {
        self.lock().handlers.message.clone()
    }

    /// Log an error and pass it to the registered error handler, if any.
    pub fn report_error(&self, err: &McpError) {
        tracing::warn!("Transport error: {err}");
        let handler = self.lock().handlers.error.clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lock().lifecycle
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle() == Lifecycle::Closed
    }

    /// Created -> Started. Starting twice or after close is rejected.
    pub fn mark_started(&self) -> McpResult<()> {
        let mut state = self.lock();
        match state.lifecycle {
            Lifecycle::Created => {
                state.lifecycle = Lifecycle::Started;
                Ok(())
            }
            Lifecycle::Started => Err(McpError::InvalidState("transport already started".into())),
            Lifecycle::Closed => Err(McpError::Closed),
        }
    }

    /// Move to Closed, fail every outstanding call with `Closed`, and run
    /// the close handler. Returns `false` if already closed; the close
    /// handler runs only on the first call.
    pub fn mark_closed(&self) -> bool {
        let (drained, close) = {
            let mut state = self.lock();
            if state.lifecycle == Lifecycle::Closed {
                return false;
            }
            state.lifecycle = Lifecycle::Closed;
            let drained: Vec<_> = state.pending.drain().collect();
            (drained, state.handlers.close.clone())
        };

        if !drained.is_empty() {
            tracing::debug!("Abandoning {} pending request(s) on close", drained.len());
        }
        for (_, entry) in drained {
            let _ = entry.tx.send(Err(McpError::Closed));
        }
        if let Some(close) = close {
            close();
        }
        true
    }

    /// Insert a pending entry for `id`. The returned call resolves when a
    /// response with the same id is delivered.
    pub fn register_pending(&self, id: RequestId) -> McpResult<PendingCall> {
        let mut state = self.lock();
        if state.lifecycle == Lifecycle::Closed {
            return Err(McpError::Closed);
        }
        if state.pending.contains_key(&id) {
            return Err(McpError::DuplicateId(id));
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        let (tx, rx) = oneshot::channel();
        state.pending.insert(id.clone(), PendingEntry { generation, tx });

        Ok(PendingCall {
            id,
            generation,
            rx,
            base: self.clone(),
            settled: false,
        })
    }

    /// Hand a response to the call waiting on its id. At most one delivery
    /// per registration succeeds; anything else is `NotFound`, which is
    /// also reported to the error handler.
    pub fn deliver(&self, response: JsonRpcResponse) -> McpResult<()> {
        let id = response.id.clone();
        let entry = self.lock().pending.remove(&id);

        let delivered = match entry {
            Some(entry) => entry.tx.send(Ok(response)).is_ok(),
            None => false,
        };

        if delivered {
            Ok(())
        } else {
            let err = McpError::NotFound(id);
            self.report_error(&err);
            Err(err)
        }
    }

    /// Drop the pending entry for `id` and wake its waiter with `Closed`.
    pub fn abandon(&self, id: &RequestId) -> bool {
        let entry = self.lock().pending.remove(id);
        match entry {
            Some(entry) => {
                let _ = entry.tx.send(Err(McpError::Closed));
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    fn remove_if_current(&self, id: &RequestId, generation: u64) {
        let mut state = self.lock();
        if state
            .pending
            .get(id)
            .is_some_and(|entry| entry.generation == generation)
        {
            state.pending.remove(id);
        }
    }
}

/// A registered request awaiting its response.
///
/// Dropping it without waiting removes the pending entry.
pub struct PendingCall {
    id: RequestId,
    generation: u64,
    rx: oneshot::Receiver<Delivery>,
    base: BaseTransport,
    settled: bool,
}

impl PendingCall {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Wait for the response. On timeout the entry is removed, so a late
    /// delivery for the same id reports `NotFound`.
    pub async fn wait(mut self, timeout: Duration) -> McpResult<JsonRpcResponse> {
        let outcome = tokio::time::timeout(timeout, &mut self.rx).await;
        self.settled = true;

        match outcome {
            Ok(Ok(delivery)) => delivery,
            Ok(Err(_)) => Err(McpError::Closed),
            Err(_) => {
                self.base.remove_if_current(&self.id, self.generation);
                tracing::debug!("Request {} timed out after {timeout:?}", self.id);
                Err(McpError::Timeout(self.id.clone()))
            }
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if !self.settled {
            self.base.remove_if_current(&self.id, self.generation);
        }
    }
}
