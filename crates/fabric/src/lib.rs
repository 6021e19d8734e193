// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fabric: serverside of a device-messaging fabric. Accepts long-lived
//! WebSocket connections from fleets of end-devices and routes framed WRP
//! messages between HTTP clients and connected devices.

pub mod config;
pub mod convey;
pub mod device;
pub mod error;
pub mod id;
pub mod metrics;
pub mod rehash;
pub mod state;
pub mod transport;
pub mod wrp;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::FabricConfig;
use crate::device::{CloseReason, DeviceOptions, Event, Listener, Manager};
use crate::state::FabricState;
use crate::transport::build_router;

/// Default event listener: surfaces session traffic at trace level and
/// failures at debug.
fn trace_listener() -> Listener {
    Arc::new(|event: &Event| match event {
        Event::MessageFailed { device, error } => {
            tracing::debug!(device = %device.id(), error, "message delivery failed");
        }
        Event::TransactionComplete { device, transaction_key } => {
            tracing::trace!(device = %device.id(), transaction_key, "transaction complete");
        }
        _ => {}
    })
}

/// Run the fabric server until shutdown.
pub async fn run(config: FabricConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| tracing::warn!(err = %e, "metrics recorder not installed"))
        .ok();
    crate::metrics::describe();

    let manager =
        Manager::with_listeners(DeviceOptions::from(&config), vec![trace_listener()], None);
    let state = Arc::new(FabricState::new(
        config,
        Arc::clone(&manager),
        shutdown.clone(),
        prometheus,
    ));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("fabric listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    let drained = manager.disconnect_all(CloseReason::go_away());
    tracing::info!(drained, "fabric shut down");
    Ok(())
}
