//! Configuration for a ledger node

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node identifier (names the snapshot and wallet files)
    pub node_id: String,

    /// Data directory for snapshots and keys
    pub data_dir: PathBuf,

    /// Snapshot storage configuration
    pub storage: StorageConfig,

    /// Peer communication configuration
    pub peers: PeerConfig,

    /// Actor configuration
    pub actor: ActorConfig,

    /// Background sync configuration
    pub sync: SyncConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: "5000".to_string(),
            data_dir: PathBuf::from("./data/chain"),
            storage: StorageConfig::default(),
            peers: PeerConfig::default(),
            actor: ActorConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

/// Snapshot backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON document per node
    Json,
    /// RocksDB column families (feature `rocksdb`)
    RocksDb,
}

impl StorageBackend {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(StorageBackend::Json),
            "rocksdb" => Some(StorageBackend::RocksDb),
            _ => None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend to use
    pub backend: StorageBackend,

    /// RocksDB tuning (ignored by the JSON backend)
    pub rocksdb: RocksDBConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Json,
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 16,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Peer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Per-request timeout (milliseconds)
    pub request_timeout_ms: u64,

    /// Peers added on startup (`host:port`)
    pub nodes: Vec<String>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 3_000,
            nodes: Vec::new(),
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox size
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

/// Background sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Resolve against peers periodically
    pub enabled: bool,

    /// Interval between resolve sweeps (milliseconds)
    pub resolve_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resolve_interval_ms: 30_000,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse TOML text
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from `CHAIN_*` variables looked up through `var`
    pub fn apply_env<F>(&mut self, var: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(node_id) = var("CHAIN_NODE_ID") {
            self.node_id = node_id;
        }

        if let Some(data_dir) = var("CHAIN_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }

        if let Some(backend) = var("CHAIN_STORAGE_BACKEND") {
            self.storage.backend = StorageBackend::parse(&backend).ok_or_else(|| {
                crate::Error::Config(format!("Unknown storage backend: {}", backend))
            })?;
        }

        if let Some(peers) = var("CHAIN_PEERS") {
            self.peers.nodes = peers
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(timeout) = var("CHAIN_PEER_TIMEOUT_MS") {
            self.peers.request_timeout_ms = timeout.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid CHAIN_PEER_TIMEOUT_MS: {}", e))
            })?;
        }

        Ok(())
    }
}
