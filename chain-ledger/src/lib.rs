//! Chain Ledger
//!
//! Minimal proof-of-work ledger replicated across peers.
//!
//! # Architecture
//!
//! - **Hash-linked blocks**: each block commits to the SHA-256 of its predecessor
//! - **Proof of work**: a nonce whose digest starts with the difficulty prefix
//! - **Single Writer**: one actor per node owns the chain, pool and peer set
//! - **Longest valid chain**: nodes converge by adopting the longest chain that verifies
//!
//! # Invariants
//!
//! - Every non-genesis block links to the hash of the block before it
//! - Every non-genesis block carries a proof valid over its non-reward transactions
//! - No participant spends more than the committed balance minus pending spends
//! - Operations commit fully or leave the ledger untouched

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod blockchain;
pub mod canonical;
pub mod config;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod node;
pub mod storage;
pub mod transport;
pub mod types;
pub mod verification;
pub mod wallet;

// Re-exports
pub use actor::{spawn_ledger_actor, LedgerHandle};
pub use blockchain::{BlockReceipt, Blockchain, MiningJob};
pub use config::Config;
pub use error::{Error, Result};
pub use node::Node;
pub use storage::{JsonFileStore, Snapshot, SnapshotStore};
pub use transport::{HttpPeerTransport, PeerReply, PeerTransport};
pub use types::{Block, Identity, Transaction, TxSignature, MINING_REWARD, MINING_SENDER};
pub use wallet::Wallet;
