// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// How inbound frame sources are checked against the session identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SourceCheck {
    /// No validation.
    #[default]
    Off,
    /// Mismatches are counted but the frame is still delivered.
    Lenient,
    /// Mismatches are counted and the frame is dropped.
    Strict,
}

/// Configuration for the fabric server.
#[derive(Debug, Clone, clap::Args)]
pub struct FabricConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "FABRIC_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 6200, env = "FABRIC_PORT")]
    pub port: u16,

    /// Header carrying the raw device name on connect.
    #[arg(long, default_value = "X-Webpa-Device-Name", env = "FABRIC_DEVICE_NAME_HEADER")]
    pub device_name_header: String,

    /// Header carrying the optional base64(JSON) convey blob on connect.
    #[arg(long, default_value = "X-Webpa-Convey", env = "FABRIC_CONVEY_HEADER")]
    pub convey_header: String,

    /// Maximum number of simultaneously connected devices. 0 means unbounded.
    #[arg(long, default_value_t = 0, env = "FABRIC_MAX_DEVICES")]
    pub max_devices: usize,

    /// Capacity of each device's outbound message queue.
    #[arg(long, default_value_t = 100, env = "FABRIC_DEVICE_MESSAGE_QUEUE_SIZE")]
    pub device_message_queue_size: usize,

    /// Read-idle deadline in milliseconds. A device producing no frames and no
    /// pongs within this period is disconnected.
    #[arg(long, default_value_t = 135_000, env = "FABRIC_IDLE_PERIOD_MS")]
    pub idle_period_ms: u64,

    /// Ping interval in milliseconds. Must be shorter than the idle period.
    #[arg(long, default_value_t = 45_000, env = "FABRIC_PING_PERIOD_MS")]
    pub ping_period_ms: u64,

    /// Write deadline in milliseconds. 0 disables the write deadline.
    #[arg(long, default_value_t = 60_000, env = "FABRIC_WRITE_TIMEOUT_MS")]
    pub write_timeout_ms: u64,

    /// Budget for completing a device's upgrade negotiation and session
    /// establishment, in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "FABRIC_HANDSHAKE_TIMEOUT_MS")]
    pub handshake_timeout_ms: u64,

    /// Upper bound on a routed request, including the wait for a correlated
    /// response, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "FABRIC_ROUTE_TIMEOUT_MS")]
    pub route_timeout_ms: u64,

    /// Minimum interval between rebuilds of the cached device list, in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "FABRIC_LIST_REFRESH_MS")]
    pub list_refresh_ms: u64,

    /// Comma-separated WebSocket subprotocols offered during the upgrade.
    #[arg(long, default_value = "wrp", env = "FABRIC_SUBPROTOCOLS")]
    pub subprotocols: String,

    /// Maximum inbound WebSocket message size in bytes.
    #[arg(long, default_value_t = 1_048_576, env = "FABRIC_MAX_MESSAGE_SIZE")]
    pub max_message_size: usize,

    /// WebSocket write buffer size in bytes.
    #[arg(long, default_value_t = 4096, env = "FABRIC_WRITE_BUFFER_SIZE")]
    pub write_buffer_size: usize,

    /// Source-validation policy for inbound frames.
    #[arg(long, value_enum, default_value = "off", env = "FABRIC_SOURCE_CHECK")]
    pub source_check: SourceCheck,
}

impl FabricConfig {
    pub fn idle_period(&self) -> Duration {
        Duration::from_millis(self.idle_period_ms.max(1))
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms.max(1))
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms.max(1))
    }

    pub fn route_timeout(&self) -> Duration {
        Duration::from_millis(self.route_timeout_ms.max(1))
    }

    pub fn list_refresh(&self) -> Duration {
        Duration::from_millis(self.list_refresh_ms)
    }

    pub fn subprotocol_list(&self) -> Vec<String> {
        self.subprotocols
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }
}
