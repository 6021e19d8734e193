// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The in-memory device registry: identifier → session, with a hard capacity
//! limit and the duplicate-takeover policy.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use metrics::{counter, gauge};

use super::session::Session;
use super::CloseReason;
use crate::error::DeviceError;
use crate::id::DeviceId;
use crate::metrics as names;

/// Concurrent map of connected devices. A single read/write guard: mutations
/// take exclusive access, visitors share.
pub(crate) struct Registry {
    devices: RwLock<HashMap<DeviceId, Arc<Session>>>,
    /// 0 means unbounded.
    limit: usize,
}

impl Registry {
    pub(crate) fn new(limit: usize) -> Self {
        gauge!(names::DEVICE_COUNT).set(0.0);
        Self { devices: RwLock::new(HashMap::new()), limit }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<DeviceId, Arc<Session>>> {
        self.devices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<DeviceId, Arc<Session>>> {
        self.devices.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a new session under `id`, applying duplicate takeover.
    ///
    /// The capacity decision happens before the factory runs; the factory
    /// receives the duplication count the new session inherits. A displaced
    /// session has its close requested with reason `duplicate` while the write
    /// lock is still held, so no frame can race into it under its old
    /// registration.
    pub(crate) fn add<T>(
        &self,
        id: &DeviceId,
        factory: impl FnOnce(u64) -> (Arc<Session>, T),
    ) -> Result<(Arc<Session>, T), DeviceError> {
        let mut devices = self.write();

        let existing = devices.get(id).cloned();
        if existing.is_none() && self.limit > 0 && devices.len() >= self.limit {
            counter!(names::DEVICE_LIMIT_REACHED_COUNT).increment(1);
            return Err(DeviceError::DeviceLimitReached);
        }

        let duplications = existing
            .as_ref()
            .map(|old| old.statistics().duplications() + 1)
            .unwrap_or_default();
        let (session, extra) = factory(duplications);
        devices.insert(id.clone(), Arc::clone(&session));

        if let Some(old) = existing {
            old.request_close(CloseReason::duplicate());
            counter!(names::DUPLICATE_COUNT).increment(1);
            counter!(names::DISCONNECT_COUNT).increment(1);
        }
        gauge!(names::DEVICE_COUNT).set(devices.len() as f64);
        Ok((session, extra))
    }

    pub(crate) fn get(&self, id: &DeviceId) -> Option<Arc<Session>> {
        self.read().get(id).cloned()
    }

    /// Remove and request close. Returns the removed session.
    pub(crate) fn remove(&self, id: &DeviceId, reason: CloseReason) -> Option<Arc<Session>> {
        let mut devices = self.write();
        let removed = devices.remove(id);
        if let Some(session) = &removed {
            session.request_close(reason);
            counter!(names::DISCONNECT_COUNT).increment(1);
            gauge!(names::DEVICE_COUNT).set(devices.len() as f64);
        }
        removed
    }

    /// Remove `session` only while it is still the registered entry for its
    /// identifier. Pump teardown uses this so a session displaced by takeover
    /// cannot evict its replacement.
    pub(crate) fn remove_if_same(&self, session: &Arc<Session>) -> bool {
        let mut devices = self.write();
        match devices.get(session.id()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                devices.remove(session.id());
                counter!(names::DISCONNECT_COUNT).increment(1);
                gauge!(names::DEVICE_COUNT).set(devices.len() as f64);
                true
            }
            _ => false,
        }
    }

    /// Remove every session for which the predicate yields a close reason.
    /// Returns the number of disconnects.
    pub(crate) fn remove_if(
        &self,
        mut predicate: impl FnMut(&DeviceId) -> Option<CloseReason>,
    ) -> usize {
        let mut devices = self.write();
        let matched: Vec<(DeviceId, CloseReason)> = devices
            .keys()
            .filter_map(|id| predicate(id).map(|reason| (id.clone(), reason)))
            .collect();
        let mut removed = 0;
        for (id, reason) in matched {
            if let Some(session) = devices.remove(&id) {
                session.request_close(reason);
                removed += 1;
            }
        }
        if removed > 0 {
            counter!(names::DISCONNECT_COUNT).increment(removed as u64);
            gauge!(names::DEVICE_COUNT).set(devices.len() as f64);
        }
        removed
    }

    /// Shared-access iteration. Returns the number of sessions visited.
    pub(crate) fn visit(&self, mut visitor: impl FnMut(&Arc<Session>)) -> usize {
        let devices = self.read();
        for session in devices.values() {
            visitor(session);
        }
        devices.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
