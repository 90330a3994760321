//! Error types for the ledger
//!
//! Validation failures (bad signature, insufficient funds, bad proof, hash
//! mismatch) are not errors: the engine reports them as boolean rejections.
//! The variants below cover what the caller has to react to.

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Snapshot store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Binary serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation needs an identity but no wallet is configured
    #[error("No identity configured for node {0}")]
    MissingIdentity(String),

    /// Mining refused until conflicts with peers are resolved
    #[error("Conflicts with peers must be resolved before mining")]
    ConflictPending,

    /// An open transaction failed signature re-verification
    #[error("Mining aborted: {0}")]
    MiningAborted(String),

    /// Mining was cancelled because the chain tip moved
    #[error("Mining cancelled: chain tip changed")]
    MiningCancelled,

    /// Key material could not be decoded
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Peer did not answer
    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable {
        /// Peer address
        peer: String,
        /// Transport failure
        reason: String,
    },

    /// Peer answered with an unusable payload
    #[error("Peer {peer} sent an invalid response: {reason}")]
    PeerResponse {
        /// Peer address
        peer: String,
        /// Decode failure
        reason: String,
    },

    /// HTTP client error outside a peer call (client construction)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures that mean "skip this peer"
    pub fn is_peer_failure(&self) -> bool {
        matches!(
            self,
            Error::PeerUnreachable { .. } | Error::PeerResponse { .. }
        )
    }
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
