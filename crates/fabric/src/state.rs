// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::FabricConfig;
use crate::device::Manager;

/// Shared server state.
pub struct FabricState {
    pub config: FabricConfig,
    pub manager: Arc<Manager>,
    pub shutdown: CancellationToken,
    /// Cached device-list document; rebuilt at most once per `list_refresh`.
    pub list_cache: Mutex<ListCache>,
    pub prometheus: Option<PrometheusHandle>,
}

impl FabricState {
    pub fn new(
        config: FabricConfig,
        manager: Arc<Manager>,
        shutdown: CancellationToken,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config,
            manager,
            shutdown,
            list_cache: Mutex::new(ListCache::default()),
            prometheus,
        }
    }
}

/// The cached `{"devices":[...]}` document and when it was built.
#[derive(Default)]
pub struct ListCache {
    pub built_at: Option<Instant>,
    pub body: String,
}
