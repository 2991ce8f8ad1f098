//! Configuration loading and types for votequorum.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, node identity, peer discovery, replication,
//! snapshot persistence, and the client.

use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Identity of this node.
    #[serde(default)]
    pub node: NodeConfig,

    /// Service registry settings.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Replication / quorum settings.
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Durable snapshot settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Client session settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Node identity.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier, e.g. `server1`.
    #[serde(default = "default_node_id")]
    pub id: String,

    /// URL peers and clients use to reach this node.  Derived from the
    /// bind address when empty.
    #[serde(default)]
    pub advertise_url: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            advertise_url: String::new(),
        }
    }
}

/// Service registry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Backend type: `fixed` or `http`.
    #[serde(default = "default_registry_backend")]
    pub backend: String,

    /// Base URL of the registry process (`http` backend).
    #[serde(default = "default_registry_url")]
    pub url: String,

    /// Interval between registration refreshes, in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Node id -> endpoint map (`fixed` backend).
    #[serde(default)]
    pub peers: BTreeMap<String, String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: default_registry_backend(),
            url: default_registry_url(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            peers: BTreeMap::new(),
        }
    }
}

/// What the majority is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuorumBasis {
    /// Every peer the directory resolved and the coordinator contacted,
    /// whether or not it answered.
    #[default]
    Contacted,
    /// Only peers that answered (ack or reject).
    Responsive,
}

/// Replication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationConfig {
    /// Per-peer timeout for replicate and fetch-state calls, in milliseconds.
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,

    /// Majority denominator.
    #[serde(default)]
    pub quorum_basis: QuorumBasis,
}

impl ReplicationConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            peer_timeout_ms: default_peer_timeout_ms(),
            quorum_basis: QuorumBasis::default(),
        }
    }
}

/// Snapshot persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Backend type: `json`, `sqlite`, `memory`, or `none`.
    #[serde(default = "default_persistence_backend")]
    pub backend: String,

    /// Snapshot file path.  `{node_id}` is replaced with the node id.
    #[serde(default = "default_snapshot_path")]
    pub path: String,
}

impl PersistenceConfig {
    /// Path with the `{node_id}` placeholder expanded.
    pub fn path_for(&self, node_id: &str) -> String {
        self.path.replace("{node_id}", node_id)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: default_persistence_backend(),
            path: default_snapshot_path(),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Known node endpoints, tried in order.
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9101
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_node_id() -> String {
    "server1".to_string()
}

fn default_registry_backend() -> String {
    "http".to_string()
}

fn default_registry_url() -> String {
    "http://127.0.0.1:9090".to_string()
}

fn default_heartbeat_interval() -> u64 {
    5
}

fn default_peer_timeout_ms() -> u64 {
    3000
}

fn default_persistence_backend() -> String {
    "json".to_string()
}

fn default_snapshot_path() -> String {
    "./data/votes_{node_id}.json".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}
