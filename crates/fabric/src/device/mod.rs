// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The device session subsystem: sessions, the registry, per-connection
//! pumps, the transaction tracker, and the manager that orchestrates them.

pub mod connection;
pub mod events;
pub mod manager;
pub mod pump;
pub mod registry;
pub mod session;
pub mod stats;
pub mod transaction;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::SourceCheck;
use crate::error::DeviceError;
use crate::id::DeviceId;
use crate::wrp::{Message, WireFormat};

pub use events::{Event, Listener};
pub use manager::Manager;
pub use session::Session;

/// Injectable time source, shared by statistics and the rehasher so tests can
/// pin the clock.
pub type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// The wall clock.
pub fn system_clock() -> Clock {
    Arc::new(SystemTime::now)
}

// -- Close reasons -------------------------------------------------------------

/// Why a session transitioned to Closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub text: String,
    pub err: Option<String>,
}

impl CloseReason {
    fn plain(text: &str) -> Self {
        Self { text: text.to_owned(), err: None }
    }

    pub fn normal() -> Self {
        Self::plain("normal")
    }

    pub fn duplicate() -> Self {
        Self::plain("duplicate")
    }

    pub fn go_away() -> Self {
        Self::plain("go-away")
    }

    pub fn internal_error(err: impl Into<String>) -> Self {
        Self { text: "internal-error".to_owned(), err: Some(err.into()) }
    }

    pub fn rehash_other_instance() -> Self {
        Self::plain("rehash-other-instance")
    }

    pub fn rehash_error(err: impl Into<String>) -> Self {
        Self { text: "rehash-error".to_owned(), err: Some(err.into()) }
    }

    pub fn service_discovery_error(err: impl Into<String>) -> Self {
        Self { text: "service-discovery-error".to_owned(), err: Some(err.into()) }
    }

    pub fn service_discovery_stopped() -> Self {
        Self::plain("service-discovery-stopped")
    }

    pub fn service_discovery_no_instances() -> Self {
        Self::plain("service-discovery-no-instances")
    }
}

// -- Requests, responses, envelopes --------------------------------------------

/// An outbound message submitted for routing to a device.
#[derive(Debug)]
pub struct Request {
    pub message: Message,
    pub format: WireFormat,
    /// Pre-encoded bytes in `format`, reused by the write pump when they match
    /// the session's wire format.
    pub contents: Option<Bytes>,
    /// Ambient per-request cancellation. Never fires unless the caller arms it.
    pub cancel: CancellationToken,
}

impl Request {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            format: WireFormat::default(),
            contents: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_contents(mut self, contents: Bytes) -> Self {
        self.contents = Some(contents);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The transaction key, when the contained message is transactional.
    pub fn transaction_key(&self) -> Option<&str> {
        self.message.transaction_key()
    }
}

/// A correlated inbound response.
#[derive(Debug, Clone)]
pub struct Response {
    /// The device the response arrived from.
    pub device: DeviceId,
    pub message: Message,
    pub format: WireFormat,
    /// The raw frame as read from the wire.
    pub contents: Bytes,
}

/// A queued request plus the channel the write pump signals on completion.
///
/// The completion side is a oneshot so the write pump can never block when
/// signaling the submitter.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) request: Request,
    pub(crate) done: oneshot::Sender<Result<(), DeviceError>>,
}

// -- Options -------------------------------------------------------------------

/// Tunables shared by the manager, sessions, and pumps.
#[derive(Clone)]
pub struct DeviceOptions {
    pub max_devices: usize,
    pub queue_size: usize,
    pub idle_period: Duration,
    pub ping_period: Duration,
    pub write_timeout: Option<Duration>,
    pub source_check: SourceCheck,
    pub wire_format: WireFormat,
    pub clock: Clock,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            max_devices: 0,
            queue_size: 100,
            idle_period: Duration::from_millis(135_000),
            ping_period: Duration::from_millis(45_000),
            write_timeout: Some(Duration::from_millis(60_000)),
            source_check: SourceCheck::Off,
            wire_format: WireFormat::Msgpack,
            clock: system_clock(),
        }
    }
}

impl From<&crate::config::FabricConfig> for DeviceOptions {
    fn from(config: &crate::config::FabricConfig) -> Self {
        Self {
            max_devices: config.max_devices,
            queue_size: config.device_message_queue_size,
            idle_period: config.idle_period(),
            ping_period: config.ping_period(),
            write_timeout: config.write_timeout(),
            source_check: config.source_check,
            ..Self::default()
        }
    }
}
