// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the end-to-end fabric specs: starts a real server on an
//! ephemeral port and speaks WRP to it over WebSocket and HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use fabric::config::{FabricConfig, SourceCheck};
use fabric::device::{DeviceOptions, Manager};
use fabric::state::FabricState;
use fabric::transport::build_router;
use fabric::wrp::{Message, WireFormat};

pub type DeviceSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A running fabric server bound to an ephemeral port.
pub struct Harness {
    pub addr: SocketAddr,
    pub manager: Arc<Manager>,
    pub state: Arc<FabricState>,
    shutdown: CancellationToken,
}

impl Harness {
    /// Start a server with the given configuration tweaks applied on top of
    /// fast test defaults.
    pub async fn start(tweak: impl FnOnce(&mut FabricConfig)) -> anyhow::Result<Self> {
        let mut config = test_config();
        tweak(&mut config);

        let manager = Manager::new(DeviceOptions::from(&config));
        let shutdown = CancellationToken::new();
        let state = Arc::new(FabricState::new(
            config,
            Arc::clone(&manager),
            shutdown.clone(),
            None,
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let router = build_router(Arc::clone(&state));
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(server_shutdown.cancelled_owned())
                .await;
        });

        Ok(Self { addr, manager, state, shutdown })
    }

    /// Open a device WebSocket with the given raw device-name header.
    pub async fn connect_device(&self, device_name: &str) -> anyhow::Result<DeviceSocket> {
        let url = format!("ws://{}/api/v1/device", self.addr);
        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert("X-Webpa-Device-Name", http::HeaderValue::from_str(device_name)?);
        let (socket, _response) = tokio_tungstenite::connect_async(request).await?;
        Ok(socket)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn test_config() -> FabricConfig {
    FabricConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        device_name_header: "X-Webpa-Device-Name".to_owned(),
        convey_header: "X-Webpa-Convey".to_owned(),
        max_devices: 0,
        device_message_queue_size: 16,
        idle_period_ms: 30_000,
        ping_period_ms: 10_000,
        write_timeout_ms: 2_000,
        handshake_timeout_ms: 5_000,
        route_timeout_ms: 5_000,
        list_refresh_ms: 0,
        subprotocols: "wrp".to_owned(),
        max_message_size: 1 << 20,
        write_buffer_size: 4096,
        source_check: SourceCheck::Off,
    }
}

/// Read frames until the next binary one, decoding it as device-format WRP.
/// Control frames are skipped the way a real device stack would.
pub async fn next_wrp(socket: &mut DeviceSocket) -> anyhow::Result<Message> {
    loop {
        let frame = socket
            .next()
            .await
            .ok_or_else(|| anyhow::anyhow!("socket closed while awaiting WRP frame"))??;
        match frame {
            WsMessage::Binary(bytes) => return Ok(WireFormat::Msgpack.decode(&bytes)?),
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Text(_) => continue,
            WsMessage::Close(frame) => {
                anyhow::bail!("socket closed: {frame:?}")
            }
            WsMessage::Frame(_) => continue,
        }
    }
}

/// Send a WRP message from the device side in the device wire format.
pub async fn send_wrp(socket: &mut DeviceSocket, message: &Message) -> anyhow::Result<()> {
    let bytes = WireFormat::Msgpack.encode(message)?;
    socket.send(WsMessage::Binary(bytes)).await?;
    Ok(())
}

/// Wait until the close frame (or stream end) arrives, returning the reason
/// text if one was carried.
pub async fn await_close(socket: &mut DeviceSocket) -> Option<String> {
    while let Some(frame) = socket.next().await {
        match frame {
            Ok(WsMessage::Close(Some(close))) => return Some(close.reason.to_string()),
            Ok(WsMessage::Close(None)) => return None,
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
    None
}
