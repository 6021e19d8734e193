// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors produced by the device subsystem and mapped onto the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device-name header was absent on connect.
    MissingDeviceName,
    /// The device name failed canonicalization.
    InvalidDeviceName,
    /// The convey header was not base64(JSON object).
    InvalidConveyHeader,
    /// No live session for the identifier.
    DeviceNotFound,
    /// The target session has transitioned to Closed.
    DeviceClosed,
    /// The registry is at its configured capacity.
    DeviceLimitReached,
    /// The connection-admission filter denied the device.
    DeviceFilteredOut,
    /// A transaction key was empty.
    InvalidTransactionKey,
    /// A completion arrived for a key with no pending transaction.
    NoSuchTransactionKey,
    /// An outbound transaction key is already pending.
    TransactionAlreadyRegistered,
    /// The response channel closed without delivering a response.
    TransactionCancelled,
    /// The tracker was closed before the transaction could be registered.
    TransactionsClosed,
    /// The caller's cancellation fired before the operation finished.
    RequestCancelled,
    /// An inbound body or frame could not be deserialized.
    Decode(String),
    /// A response message could not be serialized.
    Encode(String),
}

impl DeviceError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::MissingDeviceName
            | Self::InvalidDeviceName
            | Self::InvalidConveyHeader
            | Self::InvalidTransactionKey
            | Self::NoSuchTransactionKey
            | Self::TransactionAlreadyRegistered
            | Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::DeviceNotFound | Self::DeviceClosed => StatusCode::NOT_FOUND,
            Self::DeviceLimitReached => StatusCode::SERVICE_UNAVAILABLE,
            Self::DeviceFilteredOut => StatusCode::FORBIDDEN,
            Self::TransactionCancelled | Self::RequestCancelled => StatusCode::GATEWAY_TIMEOUT,
            Self::TransactionsClosed | Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingDeviceName => "MISSING_DEVICE_NAME",
            Self::InvalidDeviceName => "INVALID_DEVICE_NAME",
            Self::InvalidConveyHeader => "INVALID_CONVEY_HEADER",
            Self::DeviceNotFound => "DEVICE_NOT_FOUND",
            Self::DeviceClosed => "DEVICE_CLOSED",
            Self::DeviceLimitReached => "DEVICE_LIMIT_REACHED",
            Self::DeviceFilteredOut => "DEVICE_FILTERED_OUT",
            Self::InvalidTransactionKey => "INVALID_TRANSACTION_KEY",
            Self::NoSuchTransactionKey => "NO_SUCH_TRANSACTION_KEY",
            Self::TransactionAlreadyRegistered => "TRANSACTION_ALREADY_REGISTERED",
            Self::TransactionCancelled => "TRANSACTION_CANCELLED",
            Self::TransactionsClosed => "TRANSACTIONS_CLOSED",
            Self::RequestCancelled => "REQUEST_CANCELLED",
            Self::Decode(_) => "DECODE_ERROR",
            Self::Encode(_) => "ENCODE_ERROR",
        }
    }

    pub fn to_http_response(&self) -> (StatusCode, Json<ErrorResponse>) {
        let body = ErrorResponse {
            error: ErrorBody { code: self.as_str().to_owned(), message: self.to_string() },
        };
        (self.http_status(), Json(body))
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDeviceName => f.write_str("missing device name header"),
            Self::InvalidDeviceName => f.write_str("invalid device name"),
            Self::InvalidConveyHeader => f.write_str("invalid convey header"),
            Self::DeviceNotFound => f.write_str("device not found"),
            Self::DeviceClosed => f.write_str("device closed"),
            Self::DeviceLimitReached => f.write_str("device limit reached"),
            Self::DeviceFilteredOut => f.write_str("device rejected by admission filter"),
            Self::InvalidTransactionKey => f.write_str("transaction key must not be empty"),
            Self::NoSuchTransactionKey => f.write_str("no such transaction key"),
            Self::TransactionAlreadyRegistered => f.write_str("transaction key already registered"),
            Self::TransactionCancelled => f.write_str("transaction cancelled"),
            Self::TransactionsClosed => f.write_str("transaction tracker closed"),
            Self::RequestCancelled => f.write_str("request cancelled"),
            Self::Decode(detail) => write!(f, "decode error: {detail}"),
            Self::Encode(detail) => write!(f, "encode error: {detail}"),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
