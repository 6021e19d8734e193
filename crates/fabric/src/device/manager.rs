// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration of Connect/Disconnect/Route/Visit across the registry.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocket;
use metrics::counter;

use super::connection;
use super::events::{Event, Listener, Listeners};
use super::pump;
use super::registry::Registry;
use super::session::{Session, SessionOptions};
use super::{CloseReason, DeviceOptions, Request, Response};
use crate::config::SourceCheck;
use crate::convey::Convey;
use crate::error::DeviceError;
use crate::id::DeviceId;
use crate::metrics as names;

/// Connection-admission predicate consulted before the upgrade.
pub type AdmissionFilter = Arc<dyn Fn(&DeviceId, &Convey) -> bool + Send + Sync>;

/// The device manager: owns the registry and the listener fan-out.
pub struct Manager {
    registry: Registry,
    listeners: Listeners,
    filter: Option<AdmissionFilter>,
    options: DeviceOptions,
}

impl Manager {
    pub fn new(options: DeviceOptions) -> Arc<Self> {
        Self::with_listeners(options, Vec::new(), None)
    }

    pub fn with_listeners(
        options: DeviceOptions,
        listeners: Vec<Listener>,
        filter: Option<AdmissionFilter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry: Registry::new(options.max_devices),
            listeners: Listeners::new(listeners),
            filter,
            options,
        })
    }

    /// Consult the admission filter. Called by the connect handler before the
    /// upgrade so a denial costs no socket.
    pub fn admit(&self, id: &DeviceId, convey: &Convey) -> Result<(), DeviceError> {
        match &self.filter {
            Some(filter) if !filter(id, convey) => Err(DeviceError::DeviceFilteredOut),
            _ => Ok(()),
        }
    }

    /// Register an upgraded socket as a device session and start its pumps.
    ///
    /// Registration failures close the socket with the error text; the HTTP
    /// exchange has already completed with the upgrade by then.
    pub async fn connect(
        self: &Arc<Self>,
        socket: WebSocket,
        id: DeviceId,
        convey: Convey,
        convey_raw: Option<String>,
    ) -> Result<Arc<Session>, DeviceError> {
        let added = self.registry.add(&id, |duplications| {
            Session::new(SessionOptions {
                id: id.clone(),
                convey,
                convey_raw: convey_raw.clone(),
                duplications,
                queue_size: self.options.queue_size,
                wire_format: self.options.wire_format,
                clock: Arc::clone(&self.options.clock),
            })
        });

        let (session, queue) = match added {
            Ok(pair) => pair,
            Err(e) => {
                let mut socket = socket;
                let frame = axum::extract::ws::CloseFrame {
                    code: axum::extract::ws::close_code::AGAIN,
                    reason: e.to_string().into(),
                };
                let _ = socket.send(axum::extract::ws::Message::Close(Some(frame))).await;
                return Err(e);
            }
        };

        counter!(names::CONNECT_COUNT).increment(1);
        tracing::info!(device = %session.id(), session_id = %session.session_id(), "device connected");

        let (reader, writer) =
            connection::split(socket, self.options.idle_period, self.options.write_timeout);
        pump::spawn(Arc::clone(self), Arc::clone(&session), reader, writer, queue);

        self.dispatch(&Event::Connect { device: Arc::clone(&session), convey_raw });
        Ok(session)
    }

    /// Request close on the session registered under `id`. True if a session
    /// was found.
    pub fn disconnect(&self, id: &DeviceId, reason: CloseReason) -> bool {
        self.registry.remove(id, reason).is_some()
    }

    /// Close every session for which the predicate yields a reason. Returns
    /// the disconnect count.
    pub fn disconnect_if(&self, predicate: impl FnMut(&DeviceId) -> Option<CloseReason>) -> usize {
        self.registry.remove_if(predicate)
    }

    /// Close every session. Returns the disconnect count.
    pub fn disconnect_all(&self, reason: CloseReason) -> usize {
        self.registry.remove_if(|_| Some(reason.clone()))
    }

    /// Route a request to the device named by its message destination and,
    /// for transactional requests, await the correlated response.
    pub async fn route(&self, request: Request) -> Result<Option<Response>, DeviceError> {
        let destination = DeviceId::parse(&request.message.dest)?;
        let session = self.registry.get(&destination).ok_or(DeviceError::DeviceNotFound)?;
        session.send(request).await
    }

    pub fn get(&self, id: &DeviceId) -> Option<Arc<Session>> {
        self.registry.get(id)
    }

    /// Visit every session under the shared guard.
    pub fn visit(&self, visitor: impl FnMut(&Arc<Session>)) -> usize {
        self.registry.visit(visitor)
    }

    /// Visit the sessions matching a predicate. Returns the visit count.
    pub fn visit_if(
        &self,
        predicate: impl Fn(&DeviceId) -> bool,
        mut visitor: impl FnMut(&Arc<Session>),
    ) -> usize {
        let mut visited = 0;
        self.registry.visit(|session| {
            if predicate(session.id()) {
                visited += 1;
                visitor(session);
            }
        });
        visited
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.len() == 0
    }

    // -- Pump support ----------------------------------------------------------

    pub(crate) fn dispatch(&self, event: &Event) {
        self.listeners.dispatch(event);
    }

    pub(crate) fn source_check(&self) -> SourceCheck {
        self.options.source_check
    }

    pub(crate) fn ping_period(&self) -> Duration {
        self.options.ping_period
    }

    /// One-shot teardown shared by the two pumps: the first to finish removes
    /// the registration (unless a takeover already replaced it) and emits the
    /// disconnect event.
    pub(crate) fn finish_pump(&self, session: &Arc<Session>) {
        if !session.begin_teardown() {
            return;
        }
        // Sets the reason only when no earlier actor already did.
        session.request_close(CloseReason::normal());
        self.registry.remove_if_same(session);
        let reason = session.close_reason();
        tracing::info!(
            device = %session.id(),
            session_id = %session.session_id(),
            reason = reason.as_ref().map(|r| r.text.as_str()).unwrap_or("unknown"),
            "device disconnected"
        );
        self.dispatch(&Event::Disconnect { device: Arc::clone(session) });
    }
}

#[cfg(test)]
impl Manager {
    /// Register a session with no transport or pumps behind it. Test support
    /// for code that only needs registry occupancy.
    pub(crate) fn register_detached(&self, id: &DeviceId) -> Arc<Session> {
        #[allow(clippy::unwrap_used)]
        let (session, _queue) = self
            .registry
            .add(id, |duplications| {
                Session::new(SessionOptions {
                    id: id.clone(),
                    convey: Convey::default(),
                    convey_raw: None,
                    duplications,
                    queue_size: self.options.queue_size,
                    wire_format: self.options.wire_format,
                    clock: Arc::clone(&self.options.clock),
                })
            })
            .unwrap();
        session
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
