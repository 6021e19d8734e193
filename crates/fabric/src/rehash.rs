// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Translation of cluster-membership events into selective disconnections.
//!
//! Devices are sharded across peers by a consistent-hash ring over the
//! instance list. When membership changes, every session whose identifier no
//! longer hashes to this node is closed so the device reconnects to its new
//! owner.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use metrics::{counter, gauge};
use sha2::{Digest, Sha256};

use crate::device::{Clock, CloseReason, Manager};
use crate::metrics as names;

// -- Consistent-hash ring ------------------------------------------------------

/// Virtual nodes per instance. A few hundred keeps the key distribution even
/// without making ring construction noticeable.
const VNODES: usize = 211;

/// A consistent-hash accessor over a set of instances.
pub struct Ring {
    /// (point, node index), sorted by point.
    points: Vec<(u64, u32)>,
    nodes: Vec<String>,
}

impl Ring {
    pub fn new(instances: &[String]) -> Self {
        let mut nodes: Vec<String> = instances.to_vec();
        nodes.sort_unstable();
        nodes.dedup();

        let mut points = Vec::with_capacity(nodes.len() * VNODES);
        for (index, node) in nodes.iter().enumerate() {
            for vnode in 0..VNODES {
                points.push((hash64(format!("{node}|{vnode}").as_bytes()), index as u32));
            }
        }
        points.sort_unstable();
        Self { points, nodes }
    }

    /// The instance owning `key`, or `None` when the ring is empty.
    pub fn node_for(&self, key: &str) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }
        let point = hash64(key.as_bytes());
        let slot = match self.points.binary_search_by_key(&point, |(p, _)| *p) {
            Ok(found) => found,
            // Clockwise successor, wrapping at the end of the circle.
            Err(insert) if insert == self.points.len() => 0,
            Err(insert) => insert,
        };
        self.points
            .get(slot)
            .and_then(|(_, index)| self.nodes.get(*index as usize))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn hash64(data: &[u8]) -> u64 {
    let digest = Sha256::digest(data);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

// -- Membership events ---------------------------------------------------------

/// One observation from the service-discovery monitor. Events for a given
/// service must be delivered serially.
#[derive(Debug, Clone, Default)]
pub struct MembershipEvent {
    /// Monotonic per-service sequence assigned by the monitor.
    pub event_count: u64,
    pub service: String,
    pub instances: Vec<String>,
    pub error: Option<String>,
    /// The monitor will send nothing further for this service.
    pub stopped: bool,
}

/// Predicate deciding whether an instance name refers to this node.
pub type IsRegistered = Arc<dyn Fn(&str) -> bool + Send + Sync>;

// -- Rehasher ------------------------------------------------------------------

/// Consumes membership events and issues selective disconnections.
pub struct Rehasher {
    manager: Arc<Manager>,
    /// Services whose events drive rehashing; others are ignored.
    services: HashSet<String>,
    is_registered: IsRegistered,
    /// Services whose initial snapshot has been consumed.
    seen: HashSet<String>,
    clock: Clock,
}

impl Rehasher {
    pub fn new(
        manager: Arc<Manager>,
        services: impl IntoIterator<Item = String>,
        is_registered: IsRegistered,
        clock: Clock,
    ) -> Self {
        Self {
            manager,
            services: services.into_iter().collect(),
            is_registered,
            seen: HashSet::new(),
            clock,
        }
    }

    /// Apply one membership event.
    pub fn on_event(&mut self, event: MembershipEvent) {
        // The first event per service is discovery's initial snapshot;
        // devices already here are owned correctly.
        if self.seen.insert(event.service.clone()) {
            tracing::debug!(service = %event.service, "initial membership snapshot");
            return;
        }

        if let Some(err) = &event.error {
            self.disconnect_all(CloseReason::service_discovery_error(err.clone()));
            return;
        }
        if event.stopped {
            self.disconnect_all(CloseReason::service_discovery_stopped());
            return;
        }
        if !self.services.contains(&event.service) {
            tracing::debug!(service = %event.service, "membership event for unwatched service");
            return;
        }
        if event.instances.is_empty() {
            self.disconnect_all(CloseReason::service_discovery_no_instances());
            return;
        }

        self.rehash(&event);
    }

    fn disconnect_all(&self, reason: CloseReason) {
        let count = self.manager.disconnect_all(reason.clone());
        counter!(names::REHASH_DISCONNECT_ALL_COUNTER, "reason" => reason.text.clone())
            .increment(1);
        tracing::warn!(reason = %reason.text, count, "disconnected all devices");
    }

    fn rehash(&self, event: &MembershipEvent) {
        let started = (self.clock)();
        let ring = Ring::new(&event.instances);
        let kept = AtomicUsize::new(0);

        let disconnected = self.manager.disconnect_if(|id| match ring.node_for(id.as_str()) {
            Some(node) if (self.is_registered)(node) => {
                kept.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(_) => Some(CloseReason::rehash_other_instance()),
            None => Some(CloseReason::rehash_error("empty hash ring")),
        });

        let finished = (self.clock)();
        let duration_ms =
            finished.duration_since(started).unwrap_or_default().as_millis() as f64;
        let timestamp =
            finished.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as f64;

        gauge!(names::REHASH_KEEP_DEVICE).set(kept.load(Ordering::Relaxed) as f64);
        gauge!(names::REHASH_DISCONNECT_DEVICE).set(disconnected as f64);
        gauge!(names::REHASH_TIMESTAMP).set(timestamp);
        gauge!(names::REHASH_DURATION_MS).set(duration_ms);

        tracing::info!(
            service = %event.service,
            event_count = event.event_count,
            kept = kept.load(Ordering::Relaxed),
            disconnected,
            "rehash complete"
        );
    }
}

#[cfg(test)]
#[path = "rehash_tests.rs"]
mod tests;
