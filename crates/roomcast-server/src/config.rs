//! Server configuration.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - TOML configuration file (`ROOMCAST_CONFIG`, `roomcast.toml`,
//!   `/etc/roomcast/roomcast.toml`, `~/.config/roomcast/roomcast.toml`)
//! - Environment variables (`ROOMCAST_PORT`, `ROOMCAST_LIMITS__MAX_ROOMS`, ...)

use anyhow::{Context, Result};
use roomcast_core::{Backpressure, HubConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Broadcast delivery configuration.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Content store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of live rooms.
    #[serde(default = "default_max_rooms")]
    pub max_rooms: usize,

    /// Maximum peers per room.
    #[serde(default = "default_max_peers_per_room")]
    pub max_peers_per_room: usize,

    /// Maximum message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Messages buffered per peer.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// How broadcast treats a peer whose queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Discard the peer's oldest queued message.
    #[default]
    DropOldest,
    /// Disconnect the peer.
    Disconnect,
    /// Wait up to `block_deadline_ms`, then drop the message for that peer.
    Block,
}

/// Broadcast delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Backpressure policy.
    #[serde(default)]
    pub policy: DeliveryPolicy,

    /// Deadline for the `block` policy in milliseconds.
    #[serde(default = "default_block_deadline")]
    pub block_deadline_ms: u64,
}

/// Content store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process map; contents are lost on restart.
    #[default]
    Memory,
    /// RocksDB database at `path`.
    Rocksdb,
}

/// Content store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which backend to use.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database directory for the rocksdb backend. `~` is expanded.
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Fsync every content write.
    #[serde(default)]
    pub sync_writes: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_rooms() -> usize {
    10_000
}

fn default_max_peers_per_room() -> usize {
    1024
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_queue_capacity() -> usize {
    256
}

fn default_block_deadline() -> u64 {
    1_000
}

fn default_store_path() -> String {
    "data/roomcast.db".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            delivery: DeliveryConfig::default(),
            store: StoreConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_rooms: default_max_rooms(),
            max_peers_per_room: default_max_peers_per_room(),
            max_message_size: default_max_message_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            policy: DeliveryPolicy::default(),
            block_deadline_ms: default_block_deadline(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
            sync_writes: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, overlaid with
    /// `ROOMCAST_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// environment override has the wrong type.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::find_file().as_deref())
    }

    /// Load configuration from `path`, if given, overlaid with `ROOMCAST_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is missing or cannot be parsed, or an
    /// environment override has the wrong type.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .add_source(
                config::Environment::with_prefix("ROOMCAST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Locate the config file to use, if any.
    fn find_file() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("ROOMCAST_CONFIG") {
            return Some(PathBuf::from(shellexpand::tilde(&path).as_ref()));
        }

        let config_paths = [
            "roomcast.toml",
            "/etc/roomcast/roomcast.toml",
            "~/.config/roomcast/roomcast.toml",
        ];

        config_paths
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }

    /// Get the rocksdb database directory with `~` expanded.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.store.path).as_ref())
    }

    /// Build the hub configuration.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        let backpressure = match self.delivery.policy {
            DeliveryPolicy::DropOldest => Backpressure::DropOldest,
            DeliveryPolicy::Disconnect => Backpressure::Disconnect,
            DeliveryPolicy::Block => Backpressure::Block {
                deadline: Duration::from_millis(self.delivery.block_deadline_ms),
            },
        };

        HubConfig {
            max_rooms: self.limits.max_rooms,
            max_peers_per_room: self.limits.max_peers_per_room,
            queue_capacity: self.limits.queue_capacity,
            max_message_size: self.limits.max_message_size,
            backpressure,
        }
    }
}
