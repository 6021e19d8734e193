// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios against a real fabric server: a WebSocket device on
//! one side, HTTP clients on the other.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use fabric::device::{system_clock, CloseReason};
use fabric::id::DeviceId;
use fabric::rehash::{MembershipEvent, Rehasher};
use fabric::wrp::{Message, MessageType, WireFormat};
use fabric_specs::{await_close, next_wrp, send_wrp, Harness};

/// Poll until `check` passes or the deadline expires.
async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let started = tokio::time::Instant::now();
    while started.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

fn wrp_request(dest: &str, transaction: &str, payload: &'static [u8]) -> Message {
    let mut message = Message::new(MessageType::SimpleRequestResponse);
    message.source = "dns:caller.example.com".to_owned();
    message.dest = dest.to_owned();
    message.transaction_uuid = transaction.to_owned();
    message.payload = Bytes::from_static(payload);
    message
}

// -- Scenario 1: happy request/response ---------------------------------------

#[tokio::test]
async fn happy_request_response() {
    let harness = Harness::start(|_| {}).await.expect("start");
    let mut device = harness.connect_device("mac:112233445566").await.expect("connect");

    // The device side: answer the first request with the canonical reply.
    let responder = tokio::spawn(async move {
        let request = next_wrp(&mut device).await.expect("request frame");
        assert_eq!(request.payload.as_ref(), b"Billy Corgan, Smashing Pumpkins");
        assert_eq!(request.transaction_uuid, "T1");

        let mut reply = request.response_shell();
        reply.payload = Bytes::from_static(b"Homer Simpson, Smiling Politely");
        send_wrp(&mut device, &reply).await.expect("send reply");
        device
    });

    assert!(wait_until(Duration::from_secs(2), || harness.manager.len() == 1).await);

    let body = WireFormat::Msgpack
        .encode(&wrp_request("mac:112233445566", "T1", b"Billy Corgan, Smashing Pumpkins"))
        .expect("encode");
    let response = reqwest::Client::new()
        .post(harness.http_url("/api/v1/device/send"))
        .header("Content-Type", "application/msgpack")
        .body(body.to_vec())
        .send()
        .await
        .expect("send");

    assert_eq!(response.status(), 200);
    let encoded = response.bytes().await.expect("body");
    let reply = WireFormat::Msgpack.decode(&encoded).expect("decode");
    assert_eq!(reply.payload.as_ref(), b"Homer Simpson, Smiling Politely");
    assert_eq!(reply.transaction_uuid, "T1");

    let _device = responder.await.expect("responder");
}

// -- Scenario 2: duplicate takeover -------------------------------------------

#[tokio::test]
async fn duplicate_takeover() {
    let harness = Harness::start(|_| {}).await.expect("start");

    let mut first = harness.connect_device("mac:aabbccddeeff").await.expect("first");
    assert!(wait_until(Duration::from_secs(2), || harness.manager.len() == 1).await);

    let _second = harness.connect_device("mac:aabbccddeeff").await.expect("second");

    // The displaced session is told why.
    let reason = tokio::time::timeout(Duration::from_secs(2), await_close(&mut first))
        .await
        .expect("close frame within bound");
    assert_eq!(reason.as_deref(), Some("duplicate"));

    // Registry size is unchanged and the survivor inherits the count.
    let id = DeviceId::parse("mac:aabbccddeeff").expect("id");
    assert!(
        wait_until(Duration::from_secs(2), || {
            harness
                .manager
                .get(&id)
                .is_some_and(|session| session.statistics().duplications() == 1)
        })
        .await
    );
    assert_eq!(harness.manager.len(), 1);

    let stat: serde_json::Value = reqwest::Client::new()
        .get(harness.http_url("/api/v1/devices/mac:aabbccddeeff/stat"))
        .send()
        .await
        .expect("stat")
        .json()
        .await
        .expect("json");
    assert_eq!(stat["statistics"]["duplications"], 1);
}

// -- Scenario 3: idle disconnection -------------------------------------------

#[tokio::test]
async fn idle_device_is_disconnected() {
    let harness = Harness::start(|config| {
        config.idle_period_ms = 400;
        config.ping_period_ms = 150;
    })
    .await
    .expect("start");

    // Connect and then go silent: never reading means pings are never answered.
    let mut device = harness.connect_device("mac:112233445566").await.expect("connect");
    assert!(wait_until(Duration::from_secs(2), || harness.manager.len() == 1).await);

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(
        wait_until(Duration::from_secs(2), || harness.manager.len() == 0).await,
        "idle deadline should evict the silent device"
    );

    // The device observes the closure once it finally reads.
    let _ = tokio::time::timeout(Duration::from_secs(2), await_close(&mut device)).await;
}

// -- Scenario 4: rehash --------------------------------------------------------

#[tokio::test]
async fn rehash_to_peer_disconnects_all() {
    let harness = Harness::start(|_| {}).await.expect("start");

    let mut devices = Vec::new();
    for value in 1..=3u64 {
        let name = DeviceId::from_mac_int(value);
        devices.push(harness.connect_device(name.as_str()).await.expect("connect"));
    }
    assert!(wait_until(Duration::from_secs(2), || harness.manager.len() == 3).await);

    let mut rehasher = Rehasher::new(
        Arc::clone(&harness.manager),
        ["fabric".to_owned()],
        Arc::new(|node: &str| node == "self"),
        system_clock(),
    );

    // Initial snapshot, then membership moves wholly to a peer.
    rehasher.on_event(MembershipEvent {
        event_count: 1,
        service: "fabric".to_owned(),
        instances: vec!["self".to_owned()],
        ..Default::default()
    });
    rehasher.on_event(MembershipEvent {
        event_count: 2,
        service: "fabric".to_owned(),
        instances: vec!["peer".to_owned()],
        ..Default::default()
    });

    assert_eq!(harness.manager.len(), 0);
    for device in &mut devices {
        let reason = tokio::time::timeout(Duration::from_secs(2), await_close(device))
            .await
            .expect("close frame within bound");
        assert_eq!(reason.as_deref(), Some("rehash-other-instance"));
    }
}

// -- Scenario 5: capacity ------------------------------------------------------

#[tokio::test]
async fn device_limit_rejects_new_identifier() {
    let harness = Harness::start(|config| config.max_devices = 1).await.expect("start");

    let _resident = harness.connect_device("mac:112233445566").await.expect("first");
    assert!(wait_until(Duration::from_secs(2), || harness.manager.len() == 1).await);

    // The upgrade itself succeeds; the registry then refuses the session.
    let mut rejected = harness.connect_device("mac:aabbccddeeff").await.expect("upgrade");
    let reason = tokio::time::timeout(Duration::from_secs(2), await_close(&mut rejected))
        .await
        .expect("close frame within bound");
    assert_eq!(reason.as_deref(), Some("device limit reached"));

    assert_eq!(harness.manager.len(), 1);
}

// -- Scenario 6: transaction cancelled on close --------------------------------

#[tokio::test]
async fn transaction_cancelled_when_device_disconnects() {
    let harness = Harness::start(|_| {}).await.expect("start");
    let mut device = harness.connect_device("mac:112233445566").await.expect("connect");
    assert!(wait_until(Duration::from_secs(2), || harness.manager.len() == 1).await);

    // Route a transactional request the device will never answer.
    let url = harness.http_url("/api/v1/device/send");
    let body = WireFormat::Msgpack
        .encode(&wrp_request("mac:112233445566", "T2", b"anyone home?"))
        .expect("encode");
    let pending = tokio::spawn(async move {
        reqwest::Client::new()
            .post(url)
            .header("Content-Type", "application/msgpack")
            .body(body.to_vec())
            .send()
            .await
    });

    // The device swallows the request, then the session is torn down.
    let _ = next_wrp(&mut device).await.expect("request frame");
    let id = DeviceId::parse("mac:112233445566").expect("id");
    assert!(harness.manager.disconnect(&id, CloseReason::normal()));

    let response = tokio::time::timeout(Duration::from_secs(3), pending)
        .await
        .expect("bounded")
        .expect("join")
        .expect("response");
    // TransactionCancelled maps to 504; a close racing the enqueue maps to 404.
    assert!(
        response.status() == 504 || response.status() == 404,
        "unexpected status {}",
        response.status()
    );
}

// -- Extra: convey is preserved and listed -------------------------------------

#[tokio::test]
async fn convey_survives_to_the_list_endpoint() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let harness = Harness::start(|_| {}).await.expect("start");

    let url = format!("ws://{}/api/v1/device", harness.addr);
    let mut request =
        tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(url)
            .expect("request");
    request.headers_mut().insert(
        "X-Webpa-Device-Name",
        http::HeaderValue::from_static("mac:112233445566"),
    );
    let convey = STANDARD.encode(br#"{"hw-model":"XG5","boot-time":1122334455}"#);
    request
        .headers_mut()
        .insert("X-Webpa-Convey", http::HeaderValue::from_str(&convey).expect("header"));
    let (_socket, _) = tokio_tungstenite::connect_async(request).await.expect("connect");

    assert!(wait_until(Duration::from_secs(2), || harness.manager.len() == 1).await);

    let listed: serde_json::Value = reqwest::Client::new()
        .get(harness.http_url("/api/v1/devices"))
        .send()
        .await
        .expect("list")
        .json()
        .await
        .expect("json");
    let devices = listed["devices"].as_array().expect("devices");
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["id"], "mac:112233445566");
    assert_eq!(devices[0]["convey"]["hw-model"], "XG5");
    // Integers decode as strings.
    assert_eq!(devices[0]["convey"]["boot-time"], "1122334455");
}
