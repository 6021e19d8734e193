// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single connected device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::stats::Statistics;
use super::transaction::Transactions;
use super::{Clock, CloseReason, Envelope, Request, Response};
use crate::convey::Convey;
use crate::error::DeviceError;
use crate::id::DeviceId;
use crate::wrp::WireFormat;

/// Everything needed to construct a session.
pub(crate) struct SessionOptions {
    pub(crate) id: DeviceId,
    pub(crate) convey: Convey,
    pub(crate) convey_raw: Option<String>,
    pub(crate) duplications: u64,
    pub(crate) queue_size: usize,
    pub(crate) wire_format: WireFormat,
    pub(crate) clock: Clock,
}

/// A connected device session.
///
/// State is one-way: Open at construction, Closed forever after the first
/// `request_close`. Closing cancels the shutdown token and the transaction
/// tracker atomically with the state flip, so every waiter unblocks.
pub struct Session {
    id: DeviceId,
    session_id: String,
    convey: Convey,
    convey_raw: Option<String>,
    wire_format: WireFormat,
    stats: Statistics,
    transactions: Transactions,
    queue: mpsc::Sender<Envelope>,
    shutdown: CancellationToken,
    closed: AtomicBool,
    close_reason: Mutex<Option<CloseReason>>,
    metadata: RwLock<HashMap<String, serde_json::Value>>,
    /// One-shot guard for pump teardown; see [`crate::device::pump`].
    teardown: AtomicBool,
}

impl Session {
    /// Build an open session and hand back the queue receiver for the write
    /// pump.
    pub(crate) fn new(options: SessionOptions) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        let (queue_tx, queue_rx) = mpsc::channel(options.queue_size.max(1));
        let session = Arc::new(Self {
            id: options.id,
            session_id: uuid::Uuid::new_v4().to_string(),
            convey: options.convey,
            convey_raw: options.convey_raw,
            wire_format: options.wire_format,
            stats: Statistics::new(options.duplications, options.clock),
            transactions: Transactions::new(),
            queue: queue_tx,
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
            close_reason: Mutex::new(None),
            metadata: RwLock::new(HashMap::new()),
            teardown: AtomicBool::new(false),
        });
        (session, queue_rx)
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn convey(&self) -> &Convey {
        &self.convey
    }

    pub fn convey_raw(&self) -> Option<&str> {
        self.convey_raw.as_deref()
    }

    pub fn wire_format(&self) -> WireFormat {
        self.wire_format
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    pub(crate) fn transactions(&self) -> &Transactions {
        &self.transactions
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The recorded close reason, once Closed.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.metadata.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    /// Flip Open→Closed, recording `reason`. The first caller wins; later
    /// calls are no-ops. Cancels the shutdown token and closes the transaction
    /// tracker so all pending waiters observe the closure.
    pub(crate) fn request_close(&self, reason: CloseReason) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        {
            let mut slot = self.close_reason.lock().unwrap_or_else(PoisonError::into_inner);
            let mut reason = reason;
            if reason.text.is_empty() {
                reason.text = "unknown".to_owned();
            }
            *slot = Some(reason);
        }
        self.shutdown.cancel();
        let cancelled = self.transactions.close();
        if cancelled > 0 {
            tracing::debug!(device = %self.id, cancelled, "cancelled pending transactions on close");
        }
        true
    }

    /// One-shot entry into pump teardown. True exactly once per session.
    pub(crate) fn begin_teardown(&self) -> bool {
        !self.teardown.swap(true, Ordering::SeqCst)
    }

    /// Submit a request to this device, optionally waiting for a correlated
    /// response.
    ///
    /// Transactional requests register their key before enqueueing and always
    /// cancel it on the way out, so an abandoned wait cannot leak a pending
    /// entry. Returns `Ok(None)` for fire-and-forget messages once the frame
    /// has been written.
    pub async fn send(&self, request: Request) -> Result<Option<Response>, DeviceError> {
        if self.closed() {
            return Err(DeviceError::DeviceClosed);
        }

        // The guard cancels the registration on every exit path, including
        // this future being dropped mid-await by a caller timeout.
        let (_guard, response_rx) = match request.transaction_key() {
            Some(key) => {
                let (guard, rx) = PendingTransaction::register(&self.transactions, key)?;
                (Some(guard), Some(rx))
            }
            None => (None, None),
        };

        self.send_and_wait(request, response_rx).await
    }

    async fn send_and_wait(
        &self,
        request: Request,
        response_rx: Option<oneshot::Receiver<Response>>,
    ) -> Result<Option<Response>, DeviceError> {
        let cancel = request.cancel.clone();
        let (done_tx, done_rx) = oneshot::channel();
        let envelope = Envelope { request, done: done_tx };

        // Enqueue: the permit reserves a queue slot without committing the
        // envelope, so cancellation before enqueue leaves no trace.
        tokio::select! {
            _ = cancel.cancelled() => return Err(DeviceError::RequestCancelled),
            _ = self.shutdown.cancelled() => return Err(DeviceError::DeviceClosed),
            permit = self.queue.reserve() => match permit {
                Ok(permit) => permit.send(envelope),
                Err(_) => return Err(DeviceError::DeviceClosed),
            },
        }

        // Wait for the write pump to take the frame to the wire.
        tokio::select! {
            _ = cancel.cancelled() => return Err(DeviceError::RequestCancelled),
            _ = self.shutdown.cancelled() => return Err(DeviceError::DeviceClosed),
            outcome = done_rx => match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                // Write pump dropped the envelope without signaling.
                Err(_) => return Err(DeviceError::DeviceClosed),
            },
        }

        // Fire-and-forget is complete once written.
        let Some(response_rx) = response_rx else {
            return Ok(None);
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(DeviceError::RequestCancelled),
            response = response_rx => match response {
                Ok(response) => Ok(Some(response)),
                // Channel closed with no value: cancelled or tracker shutdown.
                Err(_) => Err(DeviceError::TransactionCancelled),
            },
        }
    }

    /// JSON projection used by the list and stat endpoints.
    pub fn as_json(&self) -> serde_json::Value {
        let mut value = json!({
            "id": self.id.as_str(),
            "sessionId": self.session_id,
            "pending": self.transactions.len(),
            "statistics": self.stats.as_json(),
        });
        if !self.convey.is_empty() {
            value["convey"] = serde_json::Value::Object(self.convey.as_map().clone());
        }
        value
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("closed", &self.closed())
            .finish_non_exhaustive()
    }
}

/// A registered transaction that cancels itself when dropped.
///
/// Cancelling after a completion already consumed the key is a no-op, so the
/// guard is safe to hold across the whole wait.
struct PendingTransaction<'a> {
    transactions: &'a Transactions,
    key: String,
}

impl<'a> PendingTransaction<'a> {
    fn register(
        transactions: &'a Transactions,
        key: &str,
    ) -> Result<(Self, oneshot::Receiver<Response>), DeviceError> {
        let receiver = transactions.register(key)?;
        Ok((Self { transactions, key: key.to_owned() }, receiver))
    }
}

impl Drop for PendingTransaction<'_> {
    fn drop(&mut self) {
        self.transactions.cancel(&self.key);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
