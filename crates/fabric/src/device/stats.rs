// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device traffic counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

use super::Clock;

/// Atomic per-session statistics. Individual reads never block writes.
pub struct Statistics {
    bytes_sent: AtomicU64,
    messages_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_received: AtomicU64,
    duplications: u64,
    connected_at: SystemTime,
    clock: Clock,
}

impl Statistics {
    pub(crate) fn new(duplications: u64, clock: Clock) -> Self {
        let connected_at = clock();
        Self {
            bytes_sent: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            duplications,
            connected_at,
            clock,
        }
    }

    pub(crate) fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// How many times this identifier has displaced an earlier session.
    pub fn duplications(&self) -> u64 {
        self.duplications
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    pub fn up_time(&self) -> Duration {
        (self.clock)().duration_since(self.connected_at).unwrap_or_default()
    }

    /// JSON projection used by the list and stat endpoints.
    pub fn as_json(&self) -> serde_json::Value {
        let connected_at: DateTime<Utc> = self.connected_at.into();
        json!({
            "bytesSent": self.bytes_sent(),
            "messagesSent": self.messages_sent(),
            "bytesReceived": self.bytes_received(),
            "messagesReceived": self.messages_received(),
            "duplications": self.duplications,
            "connectedAt": connected_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            "upTime": format!("{:?}", self.up_time()),
        })
    }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
