// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the fabric HTTP API.

use std::sync::Arc;

use axum::http::StatusCode;
use tokio_util::sync::CancellationToken;

use fabric::config::{FabricConfig, SourceCheck};
use fabric::device::{DeviceOptions, Manager};
use fabric::state::FabricState;
use fabric::transport::build_router;
use fabric::wrp::{Message, MessageType, WireFormat};

/// Default test configuration: fast timeouts, uncached lists.
fn test_config() -> FabricConfig {
    FabricConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        device_name_header: "X-Webpa-Device-Name".to_owned(),
        convey_header: "X-Webpa-Convey".to_owned(),
        max_devices: 0,
        device_message_queue_size: 16,
        idle_period_ms: 60_000,
        ping_period_ms: 20_000,
        write_timeout_ms: 1_000,
        handshake_timeout_ms: 2_000,
        route_timeout_ms: 500,
        list_refresh_ms: 0,
        subprotocols: "wrp".to_owned(),
        max_message_size: 1 << 20,
        write_buffer_size: 4096,
        source_check: SourceCheck::Off,
    }
}

fn test_server() -> axum_test::TestServer {
    let config = test_config();
    let manager = Manager::new(DeviceOptions::from(&config));
    let state = Arc::new(FabricState::new(config, manager, CancellationToken::new(), None));
    axum_test::TestServer::new(build_router(state)).expect("create test server")
}

// -- Health -------------------------------------------------------------------

#[tokio::test]
async fn health_reports_device_count() {
    let server = test_server();
    let resp = server.get("/api/v1/health").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["device_count"], 0);
}

// -- Device list --------------------------------------------------------------

#[tokio::test]
async fn list_devices_empty() {
    let server = test_server();
    let resp = server.get("/api/v1/devices").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["devices"], serde_json::json!([]));
}

// -- Stat ---------------------------------------------------------------------

#[tokio::test]
async fn stat_unknown_device_returns_404() {
    let server = test_server();
    let resp = server.get("/api/v1/devices/mac:112233445566/stat").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "DEVICE_NOT_FOUND");
}

#[tokio::test]
async fn stat_invalid_device_name_returns_400() {
    let server = test_server();
    let resp = server.get("/api/v1/devices/mac:badbadbad/stat").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "INVALID_DEVICE_NAME");
}

// -- Send ---------------------------------------------------------------------

#[tokio::test]
async fn send_to_unknown_device_returns_404() {
    let server = test_server();
    let mut message = Message::new(MessageType::SimpleEvent);
    message.dest = "mac:112233445566".to_owned();
    let body = WireFormat::Msgpack.encode(&message).expect("encode");

    let resp = server
        .post("/api/v1/device/send")
        .content_type("application/msgpack")
        .bytes(body.to_vec().into())
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn send_malformed_body_returns_400() {
    let server = test_server();
    let resp = server
        .post("/api/v1/device/send")
        .content_type("application/msgpack")
        .bytes(vec![0xc1, 0xff, 0x00].into())
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "DECODE_ERROR");
}

#[tokio::test]
async fn send_unsupported_content_type_returns_400() {
    let server = test_server();
    let resp = server
        .post("/api/v1/device/send")
        .content_type("text/plain")
        .bytes(b"hello".to_vec().into())
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn send_accepts_json_wrp() {
    let server = test_server();
    let mut message = Message::new(MessageType::SimpleEvent);
    message.dest = "mac:112233445566".to_owned();
    let body = WireFormat::Json.encode(&message).expect("encode");

    // Valid body, but no such device: the decode path succeeded.
    let resp = server
        .post("/api/v1/device/send")
        .content_type("application/json")
        .bytes(body.to_vec().into())
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
}

// -- Connect ------------------------------------------------------------------

#[tokio::test]
async fn connect_without_device_name_returns_400() {
    let server = test_server();
    let resp = server.get("/api/v1/device").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn connect_with_invalid_device_name_returns_400() {
    let server = test_server();
    let resp = server
        .get("/api/v1/device")
        .add_header("X-Webpa-Device-Name", "mac:nothexdigits!")
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn connect_with_invalid_convey_returns_400() {
    let server = test_server();
    let resp = server
        .get("/api/v1/device")
        .add_header("X-Webpa-Device-Name", "mac:112233445566")
        .add_header("X-Webpa-Convey", "!!!not-base64!!!")
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

// -- Metrics ------------------------------------------------------------------

#[tokio::test]
async fn metrics_endpoint_without_recorder_is_404() {
    let server = test_server();
    let resp = server.get("/metrics").await;
    resp.assert_status(StatusCode::NOT_FOUND);
}
