// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical device identifiers of the form `<scheme>:<opaque>`.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::DeviceError;

/// Accepted identifier shape. The trailing `/service[/...]` segments are
/// matched so they can be discarded for registry lookup.
static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // fixed pattern, compiles
    Regex::new(r"^(?i)(mac|uuid|dns|serial):([^/]+)(/[^/]+)*$").unwrap()
});

/// Delimiters stripped from a `mac:` opaque part during canonicalization.
const MAC_DELIMITERS: &[char] = &[':', '-', '.', ','];

/// A canonicalized device identifier.
///
/// Cheap to clone; equality and hashing operate on the canonical text, so a
/// `DeviceId` parsed from `MAC:11-22-33-44-55-66/service` compares equal to
/// one parsed from `mac:112233445566`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    /// Parse and canonicalize a raw device name.
    ///
    /// The scheme is lowercased. For `mac` the opaque part must reduce to
    /// exactly 12 hex digits after delimiter stripping; other schemes pass
    /// through unchanged. Trailing `/service` segments are dropped.
    pub fn parse(raw: &str) -> Result<Self, DeviceError> {
        let captures = ID_PATTERN.captures(raw).ok_or(DeviceError::InvalidDeviceName)?;
        let scheme = captures
            .get(1)
            .ok_or(DeviceError::InvalidDeviceName)?
            .as_str()
            .to_ascii_lowercase();
        let opaque = captures.get(2).ok_or(DeviceError::InvalidDeviceName)?.as_str();

        let canonical = if scheme == "mac" {
            format!("mac:{}", canonicalize_mac(opaque)?)
        } else {
            format!("{scheme}:{opaque}")
        };
        Ok(Self(canonical.into()))
    }

    /// Format the low 48 bits of an integer as a `mac:` identifier.
    pub fn from_mac_int(value: u64) -> Self {
        Self(format!("mac:{:012x}", value & 0x0000_ffff_ffff_ffff).into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce a raw MAC opaque part to 12 lowercase hex digits.
fn canonicalize_mac(opaque: &str) -> Result<String, DeviceError> {
    let mut digits = String::with_capacity(12);
    for ch in opaque.chars() {
        if ch.is_ascii_hexdigit() {
            digits.push(ch.to_ascii_lowercase());
        } else if !MAC_DELIMITERS.contains(&ch) {
            return Err(DeviceError::InvalidDeviceName);
        }
    }
    if digits.len() != 12 {
        return Err(DeviceError::InvalidDeviceName);
    }
    Ok(digits)
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
