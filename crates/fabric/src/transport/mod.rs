// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the fabric server.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::FabricState;

/// Build the axum `Router` with all fabric routes.
pub fn build_router(state: Arc<FabricState>) -> Router {
    Router::new()
        // Health
        .route("/api/v1/health", get(http::health))
        // Device connect (WebSocket upgrade)
        .route("/api/v1/device", get(ws::connect_handler))
        // Message routing
        .route("/api/v1/device/send", post(http::send))
        // Device inventory
        .route("/api/v1/devices", get(http::list))
        .route("/api/v1/devices/{id}/stat", get(http::stat))
        // Prometheus exposition
        .route("/metrics", get(http::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
