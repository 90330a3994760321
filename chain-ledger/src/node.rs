//! Node orchestration
//!
//! A [`Node`] ties one ledger actor to its wallet, snapshot store, peer
//! transport and metrics. Local operations go to the actor first and are then
//! propagated to every known peer on a best-effort basis: each peer call runs
//! in its own task and a failing peer is logged and skipped.

use crate::actor::{spawn_ledger_actor, LedgerHandle};
use crate::blockchain::{BlockReceipt, Blockchain};
use crate::metrics::Metrics;
use crate::storage::{open_store, SnapshotStore};
use crate::transport::PeerTransport;
use crate::types::{Block, Identity, Transaction};
use crate::wallet::Wallet;
use crate::{Config, Error, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// A running ledger node
pub struct Node {
    config: Config,
    wallet: Option<Wallet>,
    ledger: LedgerHandle,
    transport: Arc<dyn PeerTransport>,
    metrics: Metrics,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.config.node_id)
            .field("identity", &self.identity())
            .finish()
    }
}

impl Node {
    /// Open the configured store and start the node
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(
        config: Config,
        wallet: Option<Wallet>,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<Self> {
        let store = open_store(&config)?;
        Self::with_store(config, wallet, store, transport)
    }

    /// Start the node on an explicit store
    pub fn with_store(
        config: Config,
        wallet: Option<Wallet>,
        store: Arc<dyn SnapshotStore>,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<Self> {
        let identity = wallet.as_ref().map(Wallet::identity);
        let mut blockchain = Self::hydrate(&config, identity, store.as_ref());

        for peer in &config.peers.nodes {
            blockchain.add_peer_node(peer.clone());
        }

        let metrics = Metrics::new().map_err(|e| Error::Other(format!("Metrics init failed: {}", e)))?;
        let ledger = spawn_ledger_actor(
            blockchain,
            store,
            metrics.clone(),
            config.actor.mailbox_capacity,
        );

        info!(
            node_id = %config.node_id,
            identity = ?wallet.as_ref().map(Wallet::identity),
            "Node started"
        );

        Ok(Self {
            config,
            wallet,
            ledger,
            transport,
            metrics,
        })
    }

    // A missing or unreadable snapshot starts a fresh chain
    fn hydrate(config: &Config, identity: Option<Identity>, store: &dyn SnapshotStore) -> Blockchain {
        let snapshot = match store.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(node_id = %config.node_id, "Loading snapshot failed, starting fresh: {}", e);
                None
            }
        };

        match snapshot {
            Some(snapshot) => {
                match Blockchain::from_snapshot(identity.clone(), config.node_id.clone(), snapshot) {
                    Ok(blockchain) => {
                        info!(node_id = %config.node_id, height = blockchain.len(), "Snapshot restored");
                        blockchain
                    }
                    Err(e) => {
                        warn!(node_id = %config.node_id, "Snapshot rejected, starting fresh: {}", e);
                        Blockchain::new(identity, config.node_id.clone())
                    }
                }
            }
            None => Blockchain::new(identity, config.node_id.clone()),
        }
    }

    /// Node configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// This node's identity, if a wallet is loaded
    pub fn identity(&self) -> Option<Identity> {
        self.wallet.as_ref().map(Wallet::identity)
    }

    /// Handle to the ledger actor
    pub fn ledger(&self) -> &LedgerHandle {
        &self.ledger
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    // Transactions

    /// Sign a transfer from this node's wallet, admit it and broadcast it
    ///
    /// Returns `None` if the ledger rejected the transaction.
    pub async fn submit_transaction(
        &self,
        recipient: Identity,
        amount: Decimal,
    ) -> Result<Option<Transaction>> {
        let wallet = self
            .wallet
            .as_ref()
            .ok_or_else(|| Error::MissingIdentity(self.config.node_id.clone()))?;

        let transaction = wallet.sign_transaction(recipient, amount);
        if !self.ledger.add_transaction(transaction.clone()).await? {
            return Ok(None);
        }

        self.broadcast_transaction(&transaction).await?;
        Ok(Some(transaction))
    }

    /// Admit a transaction forwarded by a peer (not rebroadcast)
    pub async fn receive_transaction(&self, transaction: Transaction) -> Result<bool> {
        self.ledger.add_transaction(transaction).await
    }

    async fn broadcast_transaction(&self, transaction: &Transaction) -> Result<()> {
        let mut tasks = JoinSet::new();
        for peer in self.ledger.get_peer_nodes().await? {
            let transport = Arc::clone(&self.transport);
            let transaction = transaction.clone();
            tasks.spawn(async move {
                let result = transport.post_transaction(&peer, &transaction).await;
                (peer, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((peer, Ok(reply))) if !reply.is_success() => {
                    warn!(peer = %peer, status = reply.status, "Peer refused transaction");
                }
                Ok((_, Ok(_))) => {}
                Ok((peer, Err(e))) => {
                    self.metrics.peer_failures.inc();
                    warn!(peer = %peer, "Transaction broadcast failed: {}", e);
                }
                Err(e) => warn!("Broadcast task failed: {}", e),
            }
        }
        Ok(())
    }

    // Blocks

    /// Mine the open pool and broadcast the new block
    ///
    /// A peer answering `409 Conflict` flags the local chain for resolving.
    pub async fn mine(&self) -> Result<Block> {
        let block = {
            let _timer = self.metrics.mining_duration.start_timer();
            self.ledger.mine_block().await?
        };

        let mut conflict = false;
        let mut tasks = JoinSet::new();
        for peer in self.ledger.get_peer_nodes().await? {
            let transport = Arc::clone(&self.transport);
            let block = block.clone();
            tasks.spawn(async move {
                let result = transport.post_block(&peer, &block).await;
                (peer, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((peer, Ok(reply))) if reply.is_conflict() => {
                    warn!(peer = %peer, index = block.index, "Peer rejected block, conflicts need resolving");
                    conflict = true;
                }
                Ok((_, Ok(_))) => {}
                Ok((peer, Err(e))) => {
                    self.metrics.peer_failures.inc();
                    warn!(peer = %peer, "Block broadcast failed: {}", e);
                }
                Err(e) => warn!("Broadcast task failed: {}", e),
            }
        }

        if conflict {
            self.ledger.set_resolve_conflicts(true).await?;
        }
        Ok(block)
    }

    /// Offer a block forwarded by a peer
    pub async fn receive_block(&self, block: Block) -> Result<BlockReceipt> {
        self.ledger.receive_block(block).await
    }

    /// Fetch every peer chain and adopt the longest valid one
    ///
    /// Returns true if the local chain was replaced. Unreachable peers are
    /// skipped.
    pub async fn resolve(&self) -> Result<bool> {
        let mut tasks = JoinSet::new();
        for peer in self.ledger.get_peer_nodes().await? {
            let transport = Arc::clone(&self.transport);
            tasks.spawn(async move {
                let result = transport.fetch_chain(&peer).await;
                (peer, result)
            });
        }

        let mut peer_chains = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(chain))) => peer_chains.push(chain),
                Ok((peer, Err(e))) => {
                    self.metrics.peer_failures.inc();
                    warn!(peer = %peer, "Skipping peer during resolve: {}", e);
                }
                Err(e) => warn!("Resolve task failed: {}", e),
            }
        }

        let replaced = self.ledger.resolve(peer_chains).await?;
        if replaced {
            info!(node_id = %self.config.node_id, "Chain replaced by a longer peer chain");
        }
        Ok(replaced)
    }

    // Peers

    /// Add a peer address
    pub async fn add_peer(&self, node: impl Into<String>) -> Result<bool> {
        self.ledger.add_peer_node(node).await
    }

    /// Remove a peer address
    pub async fn remove_peer(&self, node: impl Into<String>) -> Result<bool> {
        self.ledger.remove_peer_node(node).await
    }

    /// Known peer addresses
    pub async fn peers(&self) -> Result<Vec<String>> {
        self.ledger.get_peer_nodes().await
    }

    // Queries

    /// Balance of this node's identity, `None` without a wallet
    pub async fn balance(&self) -> Result<Option<Decimal>> {
        self.ledger.balance().await
    }

    /// Balance of any participant
    pub async fn balance_of(&self, identity: Identity) -> Result<Decimal> {
        self.ledger.balance_of(identity).await
    }

    /// Copy of the chain
    pub async fn chain(&self) -> Result<Vec<Block>> {
        self.ledger.get_chain().await
    }

    /// Copy of the open pool
    pub async fn open_transactions(&self) -> Result<Vec<Transaction>> {
        self.ledger.get_open_transactions().await
    }

    /// Stop the ledger actor (it saves a final snapshot)
    pub async fn shutdown(&self) -> Result<()> {
        self.ledger.shutdown().await
    }
}
