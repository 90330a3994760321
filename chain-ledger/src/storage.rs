//! Snapshot persistence
//!
//! The engine persists `{chain, open_transactions, peer_nodes}` as one
//! [`Snapshot`]. Two backends implement [`SnapshotStore`]:
//!
//! - [`JsonFileStore`] - `blockchain-{node_id}.json` in the data directory,
//!   written to a temp file and renamed into place
//! - `RocksDbStore` (feature `rocksdb`) - column families:
//!   - `blocks` - committed blocks (key: big-endian index)
//!   - `pool` - open transactions (single key)
//!   - `peers` - peer addresses (single key)
//!
//! Transactions and blocks serialize with the same field order used for
//! hashing, so a save/load round trip reproduces identical hashes.

use crate::config::StorageBackend;
use crate::types::{Block, Transaction};
use crate::{Config, Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Persistable ledger state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Committed blocks, genesis first
    pub chain: Vec<Block>,

    /// Open transaction pool, in admission order
    pub open_transactions: Vec<Transaction>,

    /// Known peer addresses
    pub peer_nodes: BTreeSet<String>,
}

/// Load/save contract for ledger snapshots
pub trait SnapshotStore: Send + Sync {
    /// Load the last saved snapshot, `None` if nothing was saved yet
    fn load(&self) -> Result<Option<Snapshot>>;

    /// Replace the stored snapshot
    fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Open the backend selected in `config`
pub fn open_store(config: &Config) -> Result<Arc<dyn SnapshotStore>> {
    match config.storage.backend {
        StorageBackend::Json => Ok(Arc::new(JsonFileStore::open(config)?)),
        #[cfg(feature = "rocksdb")]
        StorageBackend::RocksDb => Ok(Arc::new(rocks::RocksDbStore::open(config)?)),
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::RocksDb => Err(Error::Config(
            "rocksdb backend requested but chain-ledger was built without the `rocksdb` feature"
                .to_string(),
        )),
    }
}

/// Snapshot stored as a single JSON document
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (or prepare) the snapshot file for the configured node
    pub fn open(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let path = config
            .data_dir
            .join(format!("blockchain-{}.json", config.node_id));

        tracing::info!(path = %path.display(), "Using JSON snapshot store");
        Ok(Self::at(path))
    }

    /// Store at an explicit file path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Snapshot file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<Option<Snapshot>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_slice(&content)?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let _guard = self.write_lock.lock();

        let tmp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_vec(snapshot)?;
        std::fs::write(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            blocks = snapshot.chain.len(),
            "Snapshot saved"
        );
        Ok(())
    }
}

#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbStore;

#[cfg(feature = "rocksdb")]
mod rocks {
    use super::{Snapshot, SnapshotStore};
    use crate::types::{Block, Transaction};
    use crate::{Config, Error, Result};
    use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
    use std::collections::BTreeSet;

    /// Column family names
    const CF_BLOCKS: &str = "blocks";
    const CF_POOL: &str = "pool";
    const CF_PEERS: &str = "peers";

    const KEY_OPEN_TRANSACTIONS: &[u8] = b"open_transactions";
    const KEY_PEER_NODES: &[u8] = b"peer_nodes";

    /// Snapshot store backed by RocksDB
    pub struct RocksDbStore {
        db: DB,
    }

    impl std::fmt::Debug for RocksDbStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RocksDbStore")
                .field("path", &self.db.path())
                .finish()
        }
    }

    impl RocksDbStore {
        /// Open or create database
        pub fn open(config: &Config) -> Result<Self> {
            let path = config.data_dir.join(format!("rocksdb-{}", config.node_id));
            std::fs::create_dir_all(&path)?;

            let tuning = &config.storage.rocksdb;
            let mut db_opts = Options::default();
            db_opts.create_if_missing(true);
            db_opts.create_missing_column_families(true);
            db_opts.set_write_buffer_size(tuning.write_buffer_size_mb * 1024 * 1024);
            db_opts.set_max_write_buffer_number(tuning.max_write_buffer_number);
            db_opts.set_max_background_jobs(tuning.max_background_jobs);
            if tuning.enable_statistics {
                db_opts.enable_statistics();
            }

            let cf_descriptors = vec![
                ColumnFamilyDescriptor::new(CF_BLOCKS, Self::cf_options_blocks()),
                ColumnFamilyDescriptor::new(CF_POOL, Options::default()),
                ColumnFamilyDescriptor::new(CF_PEERS, Options::default()),
            ];

            let db = DB::open_cf_descriptors(&db_opts, &path, cf_descriptors)?;
            tracing::info!(path = %path.display(), "Opened RocksDB snapshot store");

            Ok(Self { db })
        }

        fn cf_options_blocks() -> Options {
            let mut opts = Options::default();
            opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
            opts
        }

        fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
            self.db
                .cf_handle(name)
                .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
        }
    }

    impl SnapshotStore for RocksDbStore {
        fn load(&self) -> Result<Option<Snapshot>> {
            let cf_blocks = self.cf_handle(CF_BLOCKS)?;

            let mut chain = Vec::new();
            for item in self.db.iterator_cf(cf_blocks, IteratorMode::Start) {
                let (_, value) = item?;
                let block: Block = bincode::deserialize(&value)?;
                chain.push(block);
            }

            if chain.is_empty() {
                return Ok(None);
            }

            let open_transactions: Vec<Transaction> =
                match self.db.get_cf(self.cf_handle(CF_POOL)?, KEY_OPEN_TRANSACTIONS)? {
                    Some(value) => bincode::deserialize(&value)?,
                    None => Vec::new(),
                };

            let peer_nodes: BTreeSet<String> =
                match self.db.get_cf(self.cf_handle(CF_PEERS)?, KEY_PEER_NODES)? {
                    Some(value) => bincode::deserialize(&value)?,
                    None => BTreeSet::new(),
                };

            Ok(Some(Snapshot {
                chain,
                open_transactions,
                peer_nodes,
            }))
        }

        fn save(&self, snapshot: &Snapshot) -> Result<()> {
            let cf_blocks = self.cf_handle(CF_BLOCKS)?;
            let mut batch = WriteBatch::default();

            // Replaced chains may be shorter than the stored one
            batch.delete_range_cf(cf_blocks, 0u64.to_be_bytes(), u64::MAX.to_be_bytes());
            for block in &snapshot.chain {
                batch.put_cf(cf_blocks, block.index.to_be_bytes(), bincode::serialize(block)?);
            }

            batch.put_cf(
                self.cf_handle(CF_POOL)?,
                KEY_OPEN_TRANSACTIONS,
                bincode::serialize(&snapshot.open_transactions)?,
            );
            batch.put_cf(
                self.cf_handle(CF_PEERS)?,
                KEY_PEER_NODES,
                bincode::serialize(&snapshot.peer_nodes)?,
            );

            // Atomic commit
            self.db.write(batch)?;

            tracing::debug!(blocks = snapshot.chain.len(), "Snapshot saved to RocksDB");
            Ok(())
        }
    }

}
