// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the fabric server.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::Json;
use serde::Serialize;

use crate::device::Request;
use crate::error::DeviceError;
use crate::id::DeviceId;
use crate::state::FabricState;
use crate::wrp::WireFormat;

// -- Response types ------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub device_count: usize,
}

// -- Handlers ------------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<FabricState>>) -> impl IntoResponse {
    Json(HealthResponse { status: "running".to_owned(), device_count: s.manager.len() })
}

/// `POST /api/v1/device/send` — route a WRP message to a connected device.
///
/// The body is WRP in the Content-Type's format; Accept selects the response
/// encoding. Transactional messages block until the correlated response
/// arrives or the route timeout expires.
pub async fn send(
    State(s): State<Arc<FabricState>>,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    let Some(format) = negotiated_format(&headers, header::CONTENT_TYPE) else {
        return DeviceError::Decode("unsupported content type".to_owned())
            .to_http_response()
            .into_response();
    };
    let accept = negotiated_format(&headers, header::ACCEPT).unwrap_or(format);

    let message = match format.decode(&body) {
        Ok(message) => message,
        Err(e) => return e.to_http_response().into_response(),
    };

    let request = Request::new(message).with_format(format).with_contents(body);

    let routed = tokio::time::timeout(s.config.route_timeout(), s.manager.route(request)).await;
    match routed {
        Err(_) => DeviceError::RequestCancelled.to_http_response().into_response(),
        Ok(Err(e)) => e.to_http_response().into_response(),
        Ok(Ok(None)) => StatusCode::ACCEPTED.into_response(),
        Ok(Ok(Some(response))) => match accept.encode(&response.message) {
            Ok(encoded) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, accept.content_type())],
                encoded,
            )
                .into_response(),
            Err(e) => e.to_http_response().into_response(),
        },
    }
}

/// `GET /api/v1/devices` — the cached device-list document.
pub async fn list(State(s): State<Arc<FabricState>>) -> HttpResponse {
    let refresh = s.config.list_refresh();
    let mut cache = s.list_cache.lock().await;

    let stale = match cache.built_at {
        None => true,
        Some(built_at) => built_at.elapsed() >= refresh,
    };
    if stale {
        let mut devices = Vec::with_capacity(s.manager.len());
        s.manager.visit(|session| devices.push(session.as_json()));
        cache.body = serde_json::json!({ "devices": devices }).to_string();
        cache.built_at = Some(Instant::now());
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        cache.body.clone(),
    )
        .into_response()
}

/// `GET /api/v1/devices/{id}/stat` — statistics for one device.
pub async fn stat(State(s): State<Arc<FabricState>>, Path(id): Path<String>) -> HttpResponse {
    let id = match DeviceId::parse(&id) {
        Ok(id) => id,
        Err(e) => return e.to_http_response().into_response(),
    };
    match s.manager.get(&id) {
        Some(session) => Json(session.as_json()).into_response(),
        None => DeviceError::DeviceNotFound.to_http_response().into_response(),
    }
}

/// `GET /metrics` — Prometheus exposition.
pub async fn metrics(State(s): State<Arc<FabricState>>) -> HttpResponse {
    match &s.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Resolve a WRP wire format from a negotiation header. A missing header
/// falls back to msgpack; a present but unsupported one yields `None`.
fn negotiated_format(headers: &HeaderMap, name: header::HeaderName) -> Option<WireFormat> {
    match headers.get(name).and_then(|v| v.to_str().ok()) {
        None => Some(WireFormat::default()),
        Some(value) => WireFormat::from_content_type(value),
    }
}
