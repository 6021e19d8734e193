// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle and traffic events fanned out to registered listeners.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;

use super::session::Session;
use crate::wrp::Message;

/// Events emitted by the manager and the per-session pumps.
///
/// Listener invocations are synchronous on the emitting task; listeners are
/// expected to hand anything slow off to their own queues.
#[derive(Debug)]
pub enum Event {
    /// A device connected. Carries the raw convey header for downstream
    /// consumers that want the undecoded form.
    Connect { device: Arc<Session>, convey_raw: Option<String> },
    /// A device disconnected. Fires exactly once per session.
    Disconnect { device: Arc<Session> },
    /// A non-transactional frame arrived from a device.
    MessageReceived { device: Arc<Session>, message: Box<Message>, contents: Bytes },
    /// A frame was written to a device.
    MessageSent { device: Arc<Session> },
    /// A frame could not be written to a device.
    MessageFailed { device: Arc<Session>, error: String },
    /// An inbound frame completed a pending transaction.
    TransactionComplete { device: Arc<Session>, transaction_key: String },
    /// A pong arrived from a device.
    Pong { device: Arc<Session>, payload: Bytes },
}

pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// A write-once listener list; dispatch takes no lock.
#[derive(Clone, Default)]
pub(crate) struct Listeners(Arc<[Listener]>);

impl Listeners {
    pub(crate) fn new(listeners: Vec<Listener>) -> Self {
        Self(listeners.into())
    }

    pub(crate) fn dispatch(&self, event: &Event) {
        for listener in self.0.iter() {
            // A panicking listener must not take down a pump.
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(event = ?event_kind(event), "device event listener panicked");
            }
        }
    }
}

fn event_kind(event: &Event) -> &'static str {
    match event {
        Event::Connect { .. } => "connect",
        Event::Disconnect { .. } => "disconnect",
        Event::MessageReceived { .. } => "message-received",
        Event::MessageSent { .. } => "message-sent",
        Event::MessageFailed { .. } => "message-failed",
        Event::TransactionComplete { .. } => "transaction-complete",
        Event::Pong { .. } => "pong",
    }
}
