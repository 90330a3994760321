//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One task owns the [`Blockchain`] and applies every mutation in order
//! - Each mutation is followed by a snapshot save
//! - Proof-of-work runs on a blocking thread, outside the actor, so reads and
//!   peer blocks are served while a node mines
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Node / transport layer (many callers)        │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │   mine_block: PrepareMining → spawn_blocking(solve)   │
//! │               → CommitMined                           │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   Blockchain  ──►  SnapshotStore::save()              │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! A peer block or chain replacement accepted while a proof search is running
//! cancels that search; a proof found for a stale tip is refused at commit.

use crate::blockchain::{BlockReceipt, Blockchain, MiningJob};
use crate::metrics::Metrics;
use crate::storage::{Snapshot, SnapshotStore};
use crate::types::{Block, Identity, Transaction};
use crate::{Error, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Admit a transaction to the open pool
    AddTransaction {
        transaction: Transaction,
        response: oneshot::Sender<bool>,
    },

    /// Capture a mining job (refused while conflicts are pending)
    PrepareMining {
        response: oneshot::Sender<Result<MiningJob>>,
    },

    /// Commit a solved mining job
    CommitMined {
        job: MiningJob,
        proof: u64,
        response: oneshot::Sender<Result<Block>>,
    },

    /// Offer a block received from a peer
    ReceiveBlock {
        block: Block,
        response: oneshot::Sender<BlockReceipt>,
    },

    /// Resolve against chains fetched from peers
    Resolve {
        peer_chains: Vec<Vec<Block>>,
        response: oneshot::Sender<bool>,
    },

    /// Get a copy of the chain
    GetChain {
        response: oneshot::Sender<Vec<Block>>,
    },

    /// Get a copy of the open pool
    GetOpenTransactions {
        response: oneshot::Sender<Vec<Transaction>>,
    },

    /// Balance of this node's identity
    GetBalance {
        response: oneshot::Sender<Option<Decimal>>,
    },

    /// Balance of any participant
    GetBalanceOf {
        identity: Identity,
        response: oneshot::Sender<Decimal>,
    },

    /// Add a peer address
    AddPeer {
        node: String,
        response: oneshot::Sender<bool>,
    },

    /// Remove a peer address
    RemovePeer {
        node: String,
        response: oneshot::Sender<bool>,
    },

    /// List peer addresses
    GetPeers {
        response: oneshot::Sender<Vec<String>>,
    },

    /// Read the resolve-conflicts flag
    GetResolveConflicts {
        response: oneshot::Sender<bool>,
    },

    /// Set the resolve-conflicts flag
    SetResolveConflicts {
        value: bool,
        response: oneshot::Sender<()>,
    },

    /// Get the persistable state
    GetSnapshot {
        response: oneshot::Sender<Snapshot>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the ledger state
pub struct LedgerActor {
    /// Ledger engine
    blockchain: Blockchain,

    /// Snapshot backend
    store: Arc<dyn SnapshotStore>,

    /// Metrics collector
    metrics: Metrics,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl std::fmt::Debug for LedgerActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerActor")
            .field("node_id", &self.blockchain.node_id())
            .field("height", &self.blockchain.len())
            .finish()
    }
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        blockchain: Blockchain,
        store: Arc<dyn SnapshotStore>,
        metrics: Metrics,
        mailbox: mpsc::Receiver<LedgerMessage>,
    ) -> Self {
        Self {
            blockchain,
            store,
            metrics,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        self.observe();

        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                break;
            }
            self.handle_message(msg);
        }

        // Mailbox closed or shutdown requested
        self.persist();
        tracing::info!(node_id = %self.blockchain.node_id(), "Ledger actor stopped");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::AddTransaction {
                transaction,
                response,
            } => {
                let accepted = self.blockchain.add_transaction(
                    transaction.sender,
                    transaction.recipient,
                    transaction.signature,
                    transaction.amount,
                );
                self.metrics.record_transaction(accepted);
                if accepted {
                    self.persist();
                }
                let _ = response.send(accepted);
            }

            LedgerMessage::PrepareMining { response } => {
                let result = if self.blockchain.resolve_conflicts() {
                    Err(Error::ConflictPending)
                } else {
                    self.blockchain.prepare_mining()
                };
                let _ = response.send(result);
            }

            LedgerMessage::CommitMined {
                job,
                proof,
                response,
            } => {
                let result = self.blockchain.commit_mined(job, proof);
                match &result {
                    Ok(_) => {
                        self.metrics.record_block("mined", "accepted");
                        self.persist();
                    }
                    Err(Error::MiningCancelled) => self.metrics.record_block("mined", "cancelled"),
                    Err(_) => self.metrics.record_block("mined", "aborted"),
                }
                let _ = response.send(result);
            }

            LedgerMessage::ReceiveBlock { block, response } => {
                let receipt = self.blockchain.receive_block(block);
                match receipt {
                    BlockReceipt::Accepted => {
                        self.metrics.record_block("peer", "accepted");
                        self.persist();
                    }
                    BlockReceipt::Rejected => self.metrics.record_block("peer", "rejected"),
                    BlockReceipt::Behind => self.metrics.record_block("peer", "behind"),
                    BlockReceipt::Stale => self.metrics.record_block("peer", "stale"),
                }
                let _ = response.send(receipt);
            }

            LedgerMessage::Resolve {
                peer_chains,
                response,
            } => {
                let replaced = self.blockchain.resolve(peer_chains);
                if replaced {
                    self.metrics.chain_replacements.inc();
                    self.persist();
                }
                let _ = response.send(replaced);
            }

            LedgerMessage::GetChain { response } => {
                let _ = response.send(self.blockchain.get_chain());
            }

            LedgerMessage::GetOpenTransactions { response } => {
                let _ = response.send(self.blockchain.get_open_transactions());
            }

            LedgerMessage::GetBalance { response } => {
                let _ = response.send(self.blockchain.balance());
            }

            LedgerMessage::GetBalanceOf { identity, response } => {
                let _ = response.send(self.blockchain.compute_balance(&identity));
            }

            LedgerMessage::AddPeer { node, response } => {
                let added = self.blockchain.add_peer_node(node);
                if added {
                    self.persist();
                }
                let _ = response.send(added);
            }

            LedgerMessage::RemovePeer { node, response } => {
                let removed = self.blockchain.remove_peer_node(&node);
                if removed {
                    self.persist();
                }
                let _ = response.send(removed);
            }

            LedgerMessage::GetPeers { response } => {
                let _ = response.send(self.blockchain.get_peer_nodes());
            }

            LedgerMessage::GetResolveConflicts { response } => {
                let _ = response.send(self.blockchain.resolve_conflicts());
            }

            LedgerMessage::SetResolveConflicts { value, response } => {
                self.blockchain.set_resolve_conflicts(value);
                let _ = response.send(());
            }

            LedgerMessage::GetSnapshot { response } => {
                let _ = response.send(self.blockchain.snapshot());
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    /// Save a snapshot; in-memory state stays authoritative if this fails
    fn persist(&self) {
        if let Err(e) = self.store.save(&self.blockchain.snapshot()) {
            tracing::error!(node_id = %self.blockchain.node_id(), "Saving snapshot failed: {}", e);
        }
        self.observe();
    }

    fn observe(&self) {
        self.metrics.observe_state(
            self.blockchain.len(),
            self.blockchain.get_open_transactions().len(),
        );
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl std::fmt::Debug for LedgerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerHandle")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Admit a transaction; false if it failed validation
    pub async fn add_transaction(&self, transaction: Transaction) -> Result<bool> {
        self.request(|response| LedgerMessage::AddTransaction {
            transaction,
            response,
        })
        .await
    }

    /// Mine the open pool into a new block
    ///
    /// The proof search runs on the blocking pool. Fails with
    /// [`Error::MiningCancelled`] if a peer block or chain replacement lands
    /// first.
    pub async fn mine_block(&self) -> Result<Block> {
        let job = self
            .request(|response| LedgerMessage::PrepareMining { response })
            .await??;

        tracing::debug!(index = job.index(), transactions = job.transactions().len(), "Proof search started");
        let (job, proof) = tokio::task::spawn_blocking(move || {
            let proof = job.solve();
            (job, proof)
        })
        .await
        .map_err(|e| Error::Concurrency(format!("Mining task failed: {}", e)))?;

        let proof = proof.ok_or(Error::MiningCancelled)?;

        self.request(|response| LedgerMessage::CommitMined {
            job,
            proof,
            response,
        })
        .await?
    }

    /// Offer a block received from a peer
    pub async fn receive_block(&self, block: Block) -> Result<BlockReceipt> {
        self.request(|response| LedgerMessage::ReceiveBlock { block, response })
            .await
    }

    /// Resolve against peer chains; true if the local chain was replaced
    pub async fn resolve(&self, peer_chains: Vec<Vec<Block>>) -> Result<bool> {
        self.request(|response| LedgerMessage::Resolve {
            peer_chains,
            response,
        })
        .await
    }

    /// Copy of the chain
    pub async fn get_chain(&self) -> Result<Vec<Block>> {
        self.request(|response| LedgerMessage::GetChain { response })
            .await
    }

    /// Copy of the open pool
    pub async fn get_open_transactions(&self) -> Result<Vec<Transaction>> {
        self.request(|response| LedgerMessage::GetOpenTransactions { response })
            .await
    }

    /// Balance of this node's identity
    pub async fn balance(&self) -> Result<Option<Decimal>> {
        self.request(|response| LedgerMessage::GetBalance { response })
            .await
    }

    /// Balance of any participant
    pub async fn balance_of(&self, identity: Identity) -> Result<Decimal> {
        self.request(|response| LedgerMessage::GetBalanceOf { identity, response })
            .await
    }

    /// Add a peer address
    pub async fn add_peer_node(&self, node: impl Into<String>) -> Result<bool> {
        let node = node.into();
        self.request(|response| LedgerMessage::AddPeer { node, response })
            .await
    }

    /// Remove a peer address
    pub async fn remove_peer_node(&self, node: impl Into<String>) -> Result<bool> {
        let node = node.into();
        self.request(|response| LedgerMessage::RemovePeer { node, response })
            .await
    }

    /// Known peer addresses
    pub async fn get_peer_nodes(&self) -> Result<Vec<String>> {
        self.request(|response| LedgerMessage::GetPeers { response })
            .await
    }

    /// True if mining should wait for a resolve
    pub async fn resolve_conflicts(&self) -> Result<bool> {
        self.request(|response| LedgerMessage::GetResolveConflicts { response })
            .await
    }

    /// Set the resolve-conflicts flag
    pub async fn set_resolve_conflicts(&self, value: bool) -> Result<()> {
        self.request(|response| LedgerMessage::SetResolveConflicts { value, response })
            .await
    }

    /// Persistable state
    pub async fn snapshot(&self) -> Result<Snapshot> {
        self.request(|response| LedgerMessage::GetSnapshot { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    blockchain: Blockchain,
    store: Arc<dyn SnapshotStore>,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = LedgerActor::new(blockchain, store, metrics, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
