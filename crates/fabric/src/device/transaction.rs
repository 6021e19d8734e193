// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Correlation of outbound requests with inbound responses over a half-duplex
//! frame stream.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;

use super::Response;
use crate::error::DeviceError;

struct Inner {
    pending: HashMap<String, oneshot::Sender<Response>>,
    closed: bool,
}

/// Tracks pending transactions by key. One guard covers both map mutation and
/// delivery, so a completion can never race a concurrent cancel into a lost
/// response.
pub struct Transactions {
    inner: Mutex<Inner>,
}

impl Transactions {
    pub(crate) fn new() -> Self {
        Self { inner: Mutex::new(Inner { pending: HashMap::new(), closed: false }) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a pending transaction and return its single-use response
    /// channel. The channel closes without a value when the transaction is
    /// cancelled or the tracker shuts down.
    pub(crate) fn register(&self, key: &str) -> Result<oneshot::Receiver<Response>, DeviceError> {
        if key.is_empty() {
            return Err(DeviceError::InvalidTransactionKey);
        }
        let mut inner = self.lock();
        if inner.closed {
            return Err(DeviceError::TransactionsClosed);
        }
        if inner.pending.contains_key(key) {
            return Err(DeviceError::TransactionAlreadyRegistered);
        }
        let (tx, rx) = oneshot::channel();
        inner.pending.insert(key.to_owned(), tx);
        Ok(rx)
    }

    /// Deliver a response to the waiter registered under `key` and forget the
    /// mapping.
    pub(crate) fn complete(&self, key: &str, response: Response) -> Result<(), DeviceError> {
        if key.is_empty() {
            return Err(DeviceError::InvalidTransactionKey);
        }
        let mut inner = self.lock();
        let sender = inner.pending.remove(key).ok_or(DeviceError::NoSuchTransactionKey)?;
        // A send failure means the waiter already gave up; the transaction is
        // still considered complete.
        let _ = sender.send(response);
        Ok(())
    }

    /// Drop the pending transaction under `key`, closing its channel without a
    /// value. No-op for unknown keys.
    pub(crate) fn cancel(&self, key: &str) {
        self.lock().pending.remove(key);
    }

    /// Cancel every pending transaction and reject future registrations.
    /// Idempotent. Returns how many waiters were unblocked.
    pub(crate) fn close(&self) -> usize {
        let mut inner = self.lock();
        inner.closed = true;
        let cancelled = inner.pending.len();
        inner.pending.clear();
        cancelled
    }

    /// Number of in-flight transactions.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "transaction_tests.rs"]
mod tests;
