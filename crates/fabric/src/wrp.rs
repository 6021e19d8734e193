// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WRP message envelope and wire codecs.
//!
//! Messages travel as framed binary msgpack by default, with named fields so
//! peers in other languages agree on the layout; JSON is supported for HTTP
//! clients that prefer it. A message is *transactional* when its type admits
//! a request/response exchange and it carries a non-empty transaction key.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

// -- Message types -------------------------------------------------------------

/// WRP message type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum MessageType {
    Auth,
    SimpleRequestResponse,
    SimpleEvent,
    Create,
    Retrieve,
    Update,
    Delete,
    ServiceRegistration,
    ServiceAlive,
    Unknown,
}

impl MessageType {
    /// Whether this type participates in request/response correlation.
    pub fn supports_transaction(self) -> bool {
        matches!(
            self,
            Self::SimpleRequestResponse | Self::Create | Self::Retrieve | Self::Update | Self::Delete
        )
    }
}

impl From<MessageType> for i64 {
    fn from(t: MessageType) -> i64 {
        match t {
            MessageType::Auth => 2,
            MessageType::SimpleRequestResponse => 3,
            MessageType::SimpleEvent => 4,
            MessageType::Create => 5,
            MessageType::Retrieve => 6,
            MessageType::Update => 7,
            MessageType::Delete => 8,
            MessageType::ServiceRegistration => 9,
            MessageType::ServiceAlive => 10,
            MessageType::Unknown => 11,
        }
    }
}

impl TryFrom<i64> for MessageType {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            2 => Ok(Self::Auth),
            3 => Ok(Self::SimpleRequestResponse),
            4 => Ok(Self::SimpleEvent),
            5 => Ok(Self::Create),
            6 => Ok(Self::Retrieve),
            7 => Ok(Self::Update),
            8 => Ok(Self::Delete),
            9 => Ok(Self::ServiceRegistration),
            10 => Ok(Self::ServiceAlive),
            11 => Ok(Self::Unknown),
            other => Err(format!("invalid WRP message type code {other}")),
        }
    }
}

// -- Message envelope ----------------------------------------------------------

/// A WRP message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub msg_type: MessageType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dest: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transaction_uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub accept: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Bytes::is_empty")]
    pub payload: Bytes,
}

impl Message {
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            source: String::new(),
            dest: String::new(),
            transaction_uuid: String::new(),
            content_type: String::new(),
            accept: String::new(),
            status: None,
            headers: Vec::new(),
            metadata: BTreeMap::new(),
            payload: Bytes::new(),
        }
    }

    /// Whether this message is one half of a correlated transaction.
    pub fn is_transaction_part(&self) -> bool {
        self.msg_type.supports_transaction() && !self.transaction_uuid.is_empty()
    }

    /// The transaction key, when the message is transactional.
    pub fn transaction_key(&self) -> Option<&str> {
        self.is_transaction_part().then_some(self.transaction_uuid.as_str())
    }

    /// Build the response shell for this message: source and destination are
    /// swapped and the transaction key is preserved.
    pub fn response_shell(&self) -> Self {
        let mut response = Self::new(self.msg_type);
        response.source = self.dest.clone();
        response.dest = self.source.clone();
        response.transaction_uuid = self.transaction_uuid.clone();
        response
    }
}

// -- Wire formats --------------------------------------------------------------

/// Supported WRP wire encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Msgpack,
    Json,
}

impl WireFormat {
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Msgpack => "application/msgpack",
            Self::Json => "application/json",
        }
    }

    /// Negotiate a format from a Content-Type or Accept header value.
    pub fn from_content_type(value: &str) -> Option<Self> {
        let media = value.split(';').next().unwrap_or(value).trim();
        match media {
            "application/msgpack" | "application/x-msgpack" => Some(Self::Msgpack),
            "application/json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn encode(self, message: &Message) -> Result<Bytes, DeviceError> {
        match self {
            Self::Msgpack => rmp_serde::to_vec_named(message)
                .map(Bytes::from)
                .map_err(|e| DeviceError::Encode(e.to_string())),
            Self::Json => serde_json::to_vec(message)
                .map(Bytes::from)
                .map_err(|e| DeviceError::Encode(e.to_string())),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<Message, DeviceError> {
        match self {
            Self::Msgpack => {
                rmp_serde::from_slice(bytes).map_err(|e| DeviceError::Decode(e.to_string()))
            }
            Self::Json => {
                serde_json::from_slice(bytes).map_err(|e| DeviceError::Decode(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
#[path = "wrp_tests.rs"]
mod tests;
