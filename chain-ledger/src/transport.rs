//! Peer transport
//!
//! Nodes talk to each other over three calls:
//!
//! - `GET  /chain` - full chain of the peer
//! - `POST /broadcast-transaction` - flat transaction JSON
//! - `POST /broadcast-block` - `{"block": ...}`
//!
//! Peers are addressed as `host:port`. Every call has its own timeout and a
//! failing peer is reported as an error for that peer only.

use crate::blockchain::BlockReceipt;
use crate::config::PeerConfig;
use crate::types::{Block, Transaction};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Status a peer answered a broadcast with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerReply {
    /// HTTP status code
    pub status: u16,
}

impl PeerReply {
    /// Create from a status code
    pub fn new(status: u16) -> Self {
        Self { status }
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The peer considers our chain stale
    pub fn is_conflict(&self) -> bool {
        self.status == StatusCode::CONFLICT.as_u16()
    }

    /// Answer for a broadcast block, by how the receiving ledger routed it
    ///
    /// `Behind` is a success for the sender: the receiver resolves on its side.
    pub fn for_receipt(receipt: BlockReceipt) -> Self {
        let status = match receipt {
            BlockReceipt::Accepted => StatusCode::CREATED,
            BlockReceipt::Behind => StatusCode::OK,
            BlockReceipt::Rejected | BlockReceipt::Stale => StatusCode::CONFLICT,
        };
        Self::new(status.as_u16())
    }

    /// Answer for a broadcast transaction
    pub fn for_admission(accepted: bool) -> Self {
        let status = if accepted {
            StatusCode::CREATED
        } else {
            StatusCode::BAD_REQUEST
        };
        Self::new(status.as_u16())
    }
}

/// Peer transport trait
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Fetch the peer's full chain
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>>;

    /// Forward a transaction to the peer
    async fn post_transaction(&self, peer: &str, transaction: &Transaction) -> Result<PeerReply>;

    /// Forward a block to the peer
    async fn post_block(&self, peer: &str, block: &Block) -> Result<PeerReply>;
}

/// HTTP/JSON transport
#[derive(Debug, Clone)]
pub struct HttpPeerTransport {
    client: Client,
}

impl HttpPeerTransport {
    /// Create new transport with the configured per-request timeout
    pub fn new(config: &PeerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client })
    }

    fn url(peer: &str, path: &str) -> String {
        if peer.starts_with("http://") || peer.starts_with("https://") {
            format!("{}{}", peer.trim_end_matches('/'), path)
        } else {
            format!("http://{}{}", peer, path)
        }
    }

    fn unreachable(peer: &str, err: reqwest::Error) -> Error {
        warn!(peer, "Peer unreachable: {}", err);
        Error::PeerUnreachable {
            peer: peer.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>> {
        let response = self
            .client
            .get(Self::url(peer, "/chain"))
            .send()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::PeerResponse {
                peer: peer.to_string(),
                reason: format!("status {}", status.as_u16()),
            });
        }

        let chain: Vec<Block> = response.json().await.map_err(|e| Error::PeerResponse {
            peer: peer.to_string(),
            reason: e.to_string(),
        })?;

        debug!(peer, height = chain.len(), "Fetched peer chain");
        Ok(chain)
    }

    async fn post_transaction(&self, peer: &str, transaction: &Transaction) -> Result<PeerReply> {
        let response = self
            .client
            .post(Self::url(peer, "/broadcast-transaction"))
            .json(transaction)
            .send()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;

        let reply = PeerReply::new(response.status().as_u16());
        debug!(peer, status = reply.status, "Transaction broadcast");
        Ok(reply)
    }

    async fn post_block(&self, peer: &str, block: &Block) -> Result<PeerReply> {
        let response = self
            .client
            .post(Self::url(peer, "/broadcast-block"))
            .json(&json!({ "block": block }))
            .send()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;

        let reply = PeerReply::new(response.status().as_u16());
        debug!(peer, index = block.index, status = reply.status, "Block broadcast");
        Ok(reply)
    }
}
