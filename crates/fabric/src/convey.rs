// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The convey blob: an opaque JSON object a device presents at connect time,
//! transported as a single base64-encoded HTTP header and preserved verbatim
//! for the lifetime of the session.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DeviceError;

/// A decoded convey header. Never interpreted by the device subsystem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Convey(serde_json::Map<String, Value>);

impl Convey {
    /// Decode a raw header value: base64(JSON object).
    ///
    /// Integer values are rewritten as strings so that large device-supplied
    /// numbers survive re-serialization without precision loss.
    pub fn decode(header: &str) -> Result<Self, DeviceError> {
        let raw = STANDARD
            .decode(header.trim())
            .map_err(|_| DeviceError::InvalidConveyHeader)?;
        let mut value: Value =
            serde_json::from_slice(&raw).map_err(|_| DeviceError::InvalidConveyHeader)?;
        stringify_integers(&mut value);
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(DeviceError::InvalidConveyHeader),
        }
    }

    /// Encode back to the header representation: base64(JSON object).
    pub fn encode(&self) -> Result<String, DeviceError> {
        let json = serde_json::to_vec(&self.0).map_err(|e| DeviceError::Encode(e.to_string()))?;
        Ok(STANDARD.encode(json))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_map(&self) -> &serde_json::Map<String, Value> {
        &self.0
    }
}

impl From<serde_json::Map<String, Value>> for Convey {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Recursively rewrite integer JSON numbers as strings.
fn stringify_integers(value: &mut Value) {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            *value = Value::String(n.to_string());
        }
        Value::Array(items) => {
            for item in items {
                stringify_integers(item);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                stringify_integers(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "convey_tests.rs"]
mod tests;
