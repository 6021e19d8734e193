// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metric families emitted by the device subsystem.

use metrics::{describe_counter, describe_gauge};

pub const DEVICE_COUNT: &str = "device_count";
pub const DEVICE_LIMIT_REACHED_COUNT: &str = "device_limit_reached_count";
pub const DUPLICATE_COUNT: &str = "duplicate_count";
pub const CONNECT_COUNT: &str = "connect_count";
pub const DISCONNECT_COUNT: &str = "disconnect_count";
pub const PING_COUNT: &str = "ping_count";
pub const PONG_COUNT: &str = "pong_count";
pub const REQUEST_RESPONSE_COUNT: &str = "request_response_count";
pub const SOURCE_CHECK: &str = "wrp_source_check";
pub const REHASH_KEEP_DEVICE: &str = "rehash_keep_device";
pub const REHASH_DISCONNECT_DEVICE: &str = "rehash_disconnect_device";
pub const REHASH_DISCONNECT_ALL_COUNTER: &str = "rehash_disconnect_all_counter";
pub const REHASH_TIMESTAMP: &str = "rehash_timestamp";
pub const REHASH_DURATION_MS: &str = "rehash_duration_ms";

/// Register descriptions with the installed recorder.
pub fn describe() {
    describe_gauge!(DEVICE_COUNT, "number of devices currently registered");
    describe_counter!(DEVICE_LIMIT_REACHED_COUNT, "connects rejected at registry capacity");
    describe_counter!(DUPLICATE_COUNT, "sessions displaced by duplicate takeover");
    describe_counter!(CONNECT_COUNT, "successful device connects");
    describe_counter!(DISCONNECT_COUNT, "device disconnects");
    describe_counter!(PING_COUNT, "pings sent to devices");
    describe_counter!(PONG_COUNT, "pongs received from devices");
    describe_counter!(REQUEST_RESPONSE_COUNT, "completed request/response transactions");
    describe_counter!(SOURCE_CHECK, "source-validation outcomes on inbound frames");
    describe_gauge!(REHASH_KEEP_DEVICE, "devices kept by the most recent rehash");
    describe_gauge!(REHASH_DISCONNECT_DEVICE, "devices disconnected by the most recent rehash");
    describe_counter!(REHASH_DISCONNECT_ALL_COUNTER, "full disconnects triggered by membership events");
    describe_gauge!(REHASH_TIMESTAMP, "unix timestamp of the most recent rehash");
    describe_gauge!(REHASH_DURATION_MS, "duration of the most recent rehash in milliseconds");
}
