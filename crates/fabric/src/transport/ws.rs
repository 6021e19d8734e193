// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device connect: WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use crate::convey::Convey;
use crate::error::DeviceError;
use crate::id::DeviceId;
use crate::state::FabricState;

/// `GET /api/v1/device` — upgrade an end-device connection.
///
/// Identity and admission are settled before the upgrade so rejections cost a
/// plain 4xx; registry capacity is only knowable post-upgrade and closes the
/// fresh socket instead.
pub async fn connect_handler(
    State(state): State<Arc<FabricState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let (id, convey, convey_raw) = match identify(&state, &headers) {
        Ok(identity) => identity,
        Err(e) => return e.http_status().into_response(),
    };

    if let Err(e) = state.manager.admit(&id, &convey) {
        tracing::info!(device = %id, "connect denied by admission filter");
        return e.http_status().into_response();
    }

    let ws = ws
        .protocols(state.config.subprotocol_list())
        .max_message_size(state.config.max_message_size)
        .write_buffer_size(state.config.write_buffer_size);

    ws.on_upgrade(move |socket| async move {
        // The remaining handshake budget bounds session establishment; the
        // wire-level negotiation itself already completed with the 101.
        let connected = tokio::time::timeout(
            state.config.handshake_timeout(),
            state.manager.connect(socket, id.clone(), convey, convey_raw),
        )
        .await;
        match connected {
            Err(_) => tracing::warn!(device = %id, "session establishment timed out"),
            Ok(Err(e)) => tracing::warn!(device = %id, err = %e, "post-upgrade registration failed"),
            Ok(Ok(_)) => {}
        }
    })
}

/// Extract and validate the device identity headers.
fn identify(
    state: &FabricState,
    headers: &HeaderMap,
) -> Result<(DeviceId, Convey, Option<String>), DeviceError> {
    let name = headers
        .get(state.config.device_name_header.as_str())
        .and_then(|v| v.to_str().ok())
        .ok_or(DeviceError::MissingDeviceName)?;
    let id = DeviceId::parse(name)?;

    let convey_raw = headers
        .get(state.config.convey_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let convey = match &convey_raw {
        Some(raw) => Convey::decode(raw)?,
        None => Convey::default(),
    };

    Ok((id, convey, convey_raw))
}
