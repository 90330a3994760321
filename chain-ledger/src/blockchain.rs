//! Ledger engine: chain, open transaction pool and peer set
//!
//! [`Blockchain`] owns all mutable ledger state. Every operation either
//! commits fully or leaves the state untouched. The engine is not
//! synchronized; concurrent callers go through the actor in
//! [`crate::actor`].
//!
//! Mining is split into three steps so the expensive search can run off the
//! owning task:
//!
//! ```text
//! prepare_mining()  ->  MiningJob::solve()  ->  commit_mined()
//!   (snapshot pool,       (brute force,          (re-verify, reject if
//!    tip hash)             cancellable)           the tip moved)
//! ```

use crate::canonical::hash_block;
use crate::storage::Snapshot;
use crate::types::{Block, Identity, Transaction, TxSignature};
use crate::verification::{valid_proof, verify_chain, verify_transaction, verify_transactions};
use crate::{Error, Result};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of offering a block received from a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReceipt {
    /// Block extended the local chain
    Accepted,
    /// Block was the next index but failed proof or linkage checks
    Rejected,
    /// Block is ahead of the local tip; local chain needs resolving
    Behind,
    /// Block is at or below the local tip; the sender is behind
    Stale,
}

/// Snapshot of everything needed to search for a proof
#[derive(Debug, Clone)]
pub struct MiningJob {
    transactions: Vec<Transaction>,
    last_hash: String,
    index: u64,
    miner: Identity,
    cancel: Arc<AtomicBool>,
}

impl MiningJob {
    /// Index the mined block will take
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Hash of the tip this job builds on
    pub fn last_hash(&self) -> &str {
        &self.last_hash
    }

    /// Open transactions covered by the proof
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// True once the engine has abandoned this job
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Search nonces from 0 upward; `None` if cancelled first
    pub fn solve(&self) -> Option<u64> {
        search_proof(&self.transactions, &self.last_hash, &self.cancel)
    }
}

/// Linear proof-of-work search, checking `cancel` before each candidate
pub fn search_proof(transactions: &[Transaction], last_hash: &str, cancel: &AtomicBool) -> Option<u64> {
    let mut proof = 0u64;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        if valid_proof(transactions, last_hash, proof) {
            return Some(proof);
        }
        proof = proof.checked_add(1)?;
    }
}

/// Ledger state of one node
#[derive(Debug)]
pub struct Blockchain {
    chain: Vec<Block>,
    open_transactions: Vec<Transaction>,
    peer_nodes: BTreeSet<String>,
    identity: Option<Identity>,
    node_id: String,
    resolve_conflicts: bool,
    mining_cancel: Arc<AtomicBool>,
}

impl Blockchain {
    /// Fresh ledger holding only the genesis block
    pub fn new(identity: Option<Identity>, node_id: impl Into<String>) -> Self {
        Self {
            chain: vec![Block::genesis()],
            open_transactions: Vec::new(),
            peer_nodes: BTreeSet::new(),
            identity,
            node_id: node_id.into(),
            resolve_conflicts: false,
            mining_cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ledger hydrated from a persisted snapshot
    pub fn from_snapshot(
        identity: Option<Identity>,
        node_id: impl Into<String>,
        snapshot: Snapshot,
    ) -> Result<Self> {
        let mut blockchain = Self::new(identity, node_id);
        blockchain.restore(snapshot)?;
        Ok(blockchain)
    }

    /// Replace chain, pool and peers wholesale
    ///
    /// The snapshot chain must pass the same checks as a peer chain.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<()> {
        if !verify_chain(&snapshot.chain) {
            return Err(Error::Storage(
                "snapshot chain does not verify from genesis".to_string(),
            ));
        }

        self.chain = snapshot.chain;
        self.open_transactions = snapshot.open_transactions;
        self.peer_nodes = snapshot.peer_nodes;
        self.cancel_mining();

        tracing::info!(
            node_id = %self.node_id,
            height = self.chain.len(),
            open_transactions = self.open_transactions.len(),
            peers = self.peer_nodes.len(),
            "Ledger restored from snapshot"
        );
        Ok(())
    }

    /// Current state in persistable form
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            chain: self.chain.clone(),
            open_transactions: self.open_transactions.clone(),
            peer_nodes: self.peer_nodes.clone(),
        }
    }

    /// Copy of the chain
    pub fn get_chain(&self) -> Vec<Block> {
        self.chain.clone()
    }

    /// Copy of the open transaction pool
    pub fn get_open_transactions(&self) -> Vec<Transaction> {
        self.open_transactions.clone()
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Always false: the chain holds at least genesis
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Last committed block
    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("chain always holds the genesis block")
    }

    /// Hash of the last committed block
    pub fn last_hash(&self) -> String {
        hash_block(self.last_block())
    }

    /// Identity this node mines for
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Node identifier
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// True when a peer block showed the local chain may be stale
    pub fn resolve_conflicts(&self) -> bool {
        self.resolve_conflicts
    }

    /// Flag (or clear) the need to resolve against peers
    pub fn set_resolve_conflicts(&mut self, value: bool) {
        self.resolve_conflicts = value;
    }

    // Balances

    /// Balance of `participant`
    ///
    /// Credits count only committed blocks; debits count committed blocks and
    /// the open pool, so pending spends cannot be spent twice.
    pub fn compute_balance(&self, participant: &Identity) -> Decimal {
        let committed = self.chain.iter().flat_map(|block| block.transactions.iter());

        let mut received = Decimal::ZERO;
        let mut sent = Decimal::ZERO;
        for tx in committed {
            if &tx.recipient == participant {
                received += tx.amount;
            }
            if &tx.sender == participant {
                sent += tx.amount;
            }
        }

        sent += self
            .open_transactions
            .iter()
            .filter(|tx| &tx.sender == participant)
            .map(|tx| tx.amount)
            .sum::<Decimal>();

        received - sent
    }

    /// Balance of this node's identity, `None` without one
    pub fn balance(&self) -> Option<Decimal> {
        self.identity.as_ref().map(|id| self.compute_balance(id))
    }

    // Transactions

    /// Admit a signed transaction to the open pool
    ///
    /// Returns false (and changes nothing) on a bad signature, insufficient
    /// funds, a negative amount or a reward-sender transaction.
    pub fn add_transaction(
        &mut self,
        sender: Identity,
        recipient: Identity,
        signature: TxSignature,
        amount: Decimal,
    ) -> bool {
        if sender.is_mining() {
            tracing::warn!(%recipient, "Rejected reward transaction submitted outside mining");
            return false;
        }
        if amount < Decimal::ZERO {
            tracing::warn!(%sender, %amount, "Rejected transaction with negative amount");
            return false;
        }

        let tx = Transaction::new(sender, recipient, signature, amount);
        if !verify_transaction(&tx, |id| self.compute_balance(id), true) {
            tracing::warn!(
                sender = %tx.sender,
                amount = %tx.amount,
                "Rejected transaction: bad signature or insufficient funds"
            );
            return false;
        }

        tracing::debug!(sender = %tx.sender, recipient = %tx.recipient, amount = %tx.amount, "Transaction admitted");
        self.open_transactions.push(tx);
        true
    }

    // Mining

    /// Brute-force a proof for the current pool on top of the current tip
    ///
    /// `None` only if a competing block cancels the search.
    pub fn proof_of_work(&self) -> Option<u64> {
        search_proof(&self.open_transactions, &self.last_hash(), &self.mining_cancel)
    }

    /// Capture the pool and tip for an off-thread proof search
    pub fn prepare_mining(&self) -> Result<MiningJob> {
        let miner = self
            .identity
            .clone()
            .ok_or_else(|| Error::MissingIdentity(self.node_id.clone()))?;

        Ok(MiningJob {
            transactions: self.open_transactions.clone(),
            last_hash: self.last_hash(),
            index: self.chain.len() as u64,
            miner,
            cancel: Arc::clone(&self.mining_cancel),
        })
    }

    /// Turn a solved job into a block on the chain
    ///
    /// Fails with [`Error::MiningCancelled`] if the tip moved since the job was
    /// prepared, and with [`Error::MiningAborted`] if any covered transaction no
    /// longer verifies. Nothing is changed on failure.
    pub fn commit_mined(&mut self, job: MiningJob, proof: u64) -> Result<Block> {
        if job.is_cancelled()
            || job.last_hash != self.last_hash()
            || !self.open_transactions.starts_with(&job.transactions)
        {
            return Err(Error::MiningCancelled);
        }

        if !verify_transactions(&job.transactions, |id| self.compute_balance(id)) {
            tracing::warn!(index = job.index, "Open transaction failed signature check, mining aborted");
            return Err(Error::MiningAborted(
                "open transaction failed signature verification".to_string(),
            ));
        }

        if !valid_proof(&job.transactions, &job.last_hash, proof) {
            return Err(Error::MiningAborted(format!("proof {} does not solve the puzzle", proof)));
        }

        let covered = job.transactions.len();
        let mut transactions = job.transactions;
        transactions.push(Transaction::reward(job.miner));

        let block = Block::new(
            job.index,
            job.last_hash,
            transactions,
            proof,
            chrono::Utc::now().timestamp(),
        );

        self.open_transactions.drain(..covered);
        self.chain.push(block.clone());

        tracing::info!(
            index = block.index,
            proof = block.proof,
            transactions = block.transactions.len(),
            "Block mined"
        );
        Ok(block)
    }

    /// Mine the open pool into a new block
    pub fn mine_block(&mut self) -> Result<Block> {
        let job = self.prepare_mining()?;
        let proof = job.solve().ok_or(Error::MiningCancelled)?;
        self.commit_mined(job, proof)
    }

    fn cancel_mining(&mut self) {
        self.mining_cancel.store(true, Ordering::Relaxed);
        self.mining_cancel = Arc::new(AtomicBool::new(false));
    }

    // Blocks from peers

    /// Route a block received from a peer by its index
    ///
    /// Blocks are routed against the local chain length, which equals the
    /// index the next block must carry.
    pub fn receive_block(&mut self, block: Block) -> BlockReceipt {
        let next_index = self.chain.len() as u64;

        if block.index == next_index {
            if self.append_block(block) {
                BlockReceipt::Accepted
            } else {
                BlockReceipt::Rejected
            }
        } else if block.index > next_index {
            tracing::info!(
                incoming = block.index,
                expected = next_index,
                "Peer block ahead of local chain, conflicts need resolving"
            );
            self.resolve_conflicts = true;
            BlockReceipt::Behind
        } else {
            tracing::debug!(incoming = block.index, expected = next_index, "Stale peer block");
            BlockReceipt::Stale
        }
    }

    /// Append a peer block if it links to the tip and carries a valid proof
    pub fn add_block(&mut self, block: Block) -> bool {
        self.receive_block(block) == BlockReceipt::Accepted
    }

    fn append_block(&mut self, block: Block) -> bool {
        let proof_is_valid = valid_proof(block.proof_transactions(), &block.previous_hash, block.proof);
        let hashes_match = block.previous_hash == self.last_hash();

        if !proof_is_valid || !hashes_match {
            tracing::warn!(
                index = block.index,
                proof_is_valid,
                hashes_match,
                "Rejected peer block"
            );
            return false;
        }

        // One pool entry per committed transaction; duplicates beyond the
        // first stay in the pool.
        for committed in &block.transactions {
            if let Some(pos) = self.open_transactions.iter().position(|open| open == committed) {
                self.open_transactions.remove(pos);
            }
        }

        tracing::info!(index = block.index, "Peer block appended");
        self.chain.push(block);
        self.cancel_mining();
        true
    }

    // Conflict resolution

    /// Adopt the longest valid chain among the local chain and `peer_chains`
    ///
    /// Returns true if the local chain was replaced; the open pool is then
    /// discarded. Clears the `resolve_conflicts` flag either way.
    pub fn resolve(&mut self, peer_chains: Vec<Vec<Block>>) -> bool {
        let mut winner: Option<Vec<Block>> = None;
        let mut winner_len = self.chain.len();

        for peer_chain in peer_chains {
            if peer_chain.len() > winner_len && verify_chain(&peer_chain) {
                winner_len = peer_chain.len();
                winner = Some(peer_chain);
            }
        }

        self.resolve_conflicts = false;

        match winner {
            Some(chain) => {
                tracing::info!(
                    old_height = self.chain.len(),
                    new_height = chain.len(),
                    dropped_transactions = self.open_transactions.len(),
                    "Local chain replaced"
                );
                self.chain = chain;
                self.open_transactions.clear();
                self.cancel_mining();
                true
            }
            None => {
                tracing::debug!(height = self.chain.len(), "Local chain kept");
                false
            }
        }
    }

    // Peers

    /// Add a peer address; true if it was not known yet
    pub fn add_peer_node(&mut self, node: impl Into<String>) -> bool {
        self.peer_nodes.insert(node.into())
    }

    /// Remove a peer address; true if it was known
    pub fn remove_peer_node(&mut self, node: &str) -> bool {
        self.peer_nodes.remove(node)
    }

    /// All known peer addresses
    pub fn get_peer_nodes(&self) -> Vec<String> {
        self.peer_nodes.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MINING_REWARD;
    use crate::wallet::Wallet;

    fn engine_with_wallet() -> (Blockchain, Wallet) {
        let wallet = Wallet::create("5000");
        (Blockchain::new(Some(wallet.identity()), "5000"), wallet)
    }

    fn submit(chain: &mut Blockchain, tx: Transaction) -> bool {
        chain.add_transaction(tx.sender, tx.recipient, tx.signature, tx.amount)
    }

    /// Reward-only block with a valid proof on top of `prev`, at any index
    fn reward_block_on(prev: &Block, index: u64, miner: &str) -> Block {
        let last_hash = hash_block(prev);
        let proof = (0..).find(|p| valid_proof(&[], &last_hash, *p)).unwrap();
        Block::new(
            index,
            last_hash,
            vec![Transaction::reward(Identity::new(miner))],
            proof,
            1,
        )
    }

    #[test]
    fn test_new_chain_holds_genesis() {
        let chain = Blockchain::new(None, "5000");
        assert_eq!(chain.get_chain(), vec![Block::genesis()]);
        assert!(chain.get_open_transactions().is_empty());
        assert!(chain.get_peer_nodes().is_empty());
        assert!(!chain.resolve_conflicts());
    }

    #[test]
    fn test_mine_first_block() {
        let (mut chain, wallet) = engine_with_wallet();

        let block = chain.mine_block().unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(block.index, 1);
        assert_eq!(block.transactions.len(), 1);
        assert!(block.transactions[0].is_reward());
        assert_eq!(block.previous_hash, hash_block(&Block::genesis()));
        assert_eq!(chain.compute_balance(&wallet.identity()), MINING_REWARD);
        assert_eq!(chain.balance(), Some(MINING_REWARD));
        assert!(verify_chain(&chain.get_chain()));
    }

    #[test]
    fn test_mine_without_identity() {
        let mut chain = Blockchain::new(None, "5000");
        assert!(matches!(chain.mine_block(), Err(Error::MissingIdentity(_))));
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.balance(), None);
    }

    #[test]
    fn test_pending_spends_count_against_balance() {
        let (mut chain, wallet) = engine_with_wallet();
        chain.mine_block().unwrap();
        let bob = Identity::new("bob");

        assert!(submit(&mut chain, wallet.sign_transaction(bob.clone(), Decimal::new(5, 0))));
        assert!(submit(&mut chain, wallet.sign_transaction(bob.clone(), Decimal::new(3, 0))));
        assert_eq!(chain.balance(), Some(Decimal::new(2, 0)));
        // Pool credits are not counted yet
        assert_eq!(chain.compute_balance(&bob), Decimal::ZERO);

        // Overspend against pending debits
        assert!(!submit(&mut chain, wallet.sign_transaction(bob.clone(), Decimal::new(3, 0))));

        let block = chain.mine_block().unwrap();
        assert_eq!(block.transactions.len(), 3);
        assert!(chain.get_open_transactions().is_empty());
        assert_eq!(chain.balance(), Some(Decimal::new(12, 0)));
        assert_eq!(chain.compute_balance(&bob), Decimal::new(8, 0));
        assert!(verify_chain(&chain.get_chain()));
    }

    #[test]
    fn test_rejects_double_spend() {
        let (mut chain, wallet) = engine_with_wallet();
        let tx = wallet.sign_transaction(Identity::new("bob"), Decimal::ONE);
        assert!(!submit(&mut chain, tx));
        assert!(chain.get_open_transactions().is_empty());
    }

    #[test]
    fn test_rejects_forged_signature() {
        let (mut chain, wallet) = engine_with_wallet();
        chain.mine_block().unwrap();

        let mut tx = wallet.sign_transaction(Identity::new("bob"), Decimal::ONE);
        tx.recipient = Identity::new("mallory");
        assert!(!submit(&mut chain, tx));
    }

    #[test]
    fn test_rejects_reward_and_negative_submissions() {
        let (mut chain, wallet) = engine_with_wallet();
        chain.mine_block().unwrap();

        let reward = Transaction::reward(Identity::new("mallory"));
        assert!(!submit(&mut chain, reward));

        let negative = wallet.sign_transaction(Identity::new("bob"), Decimal::new(-1, 0));
        assert!(!submit(&mut chain, negative));
        assert!(chain.get_open_transactions().is_empty());
    }

    #[test]
    fn test_mining_aborts_on_tampered_pool() {
        let (mut chain, wallet) = engine_with_wallet();
        chain.mine_block().unwrap();
        assert!(submit(&mut chain, wallet.sign_transaction(Identity::new("bob"), Decimal::ONE)));

        chain.open_transactions[0].amount = Decimal::new(9, 0);
        let before = chain.get_chain();

        assert!(matches!(chain.mine_block(), Err(Error::MiningAborted(_))));
        assert_eq!(chain.get_chain(), before);
        assert_eq!(chain.get_open_transactions().len(), 1);
    }

    #[test]
    fn test_proof_of_work_matches_mined_block() {
        let (mut chain, _wallet) = engine_with_wallet();
        let proof = chain.proof_of_work().unwrap();
        let block = chain.mine_block().unwrap();
        assert_eq!(block.proof, proof);
    }

    #[test]
    fn test_commit_rejects_stale_job() {
        let (mut miner_a, _) = engine_with_wallet();
        let (mut miner_b, _) = engine_with_wallet();

        let job = miner_a.prepare_mining().unwrap();
        let proof = job.solve().unwrap();

        // A competing block lands first
        let competing = miner_b.mine_block().unwrap();
        assert!(miner_a.add_block(competing));
        assert!(job.is_cancelled());
        assert_eq!(job.solve(), None);

        assert!(matches!(miner_a.commit_mined(job, proof), Err(Error::MiningCancelled)));
        assert_eq!(miner_a.len(), 2);
    }

    #[test]
    fn test_commit_keeps_transactions_added_during_search() {
        let (mut chain, wallet) = engine_with_wallet();
        chain.mine_block().unwrap();
        let bob = Identity::new("bob");

        assert!(submit(&mut chain, wallet.sign_transaction(bob.clone(), Decimal::ONE)));
        let job = chain.prepare_mining().unwrap();
        let proof = job.solve().unwrap();
        assert!(submit(&mut chain, wallet.sign_transaction(bob.clone(), Decimal::TWO)));

        let block = chain.commit_mined(job, proof).unwrap();
        assert_eq!(block.transactions.len(), 2);
        let pool = chain.get_open_transactions();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].amount, Decimal::TWO);
    }

    #[test]
    fn test_add_block_from_peer() {
        let (mut a, wallet_a) = engine_with_wallet();
        let mut b = Blockchain::new(None, "5001");

        a.mine_block().unwrap();
        let tx = wallet_a.sign_transaction(Identity::new("bob"), Decimal::new(4, 0));
        assert!(submit(&mut a, tx.clone()));

        let b1 = a.get_chain()[1].clone();
        assert!(b.add_block(b1));

        // B sees the transaction as a pending broadcast before the block
        assert!(submit(&mut b, tx.clone()));
        assert_eq!(b.get_open_transactions().len(), 1);

        let b2 = a.mine_block().unwrap();
        assert!(b.add_block(b2));
        assert!(b.get_open_transactions().is_empty());
        assert_eq!(b.get_chain(), a.get_chain());
    }

    #[test]
    fn test_add_block_wrong_previous_hash() {
        let (mut a, _) = engine_with_wallet();
        let (mut b, _) = engine_with_wallet();
        a.mine_block().unwrap();
        b.mine_block().unwrap();

        let foreign = a.mine_block().unwrap();
        let before = b.get_chain();

        assert_eq!(b.receive_block(foreign.clone()), BlockReceipt::Rejected);
        assert!(!b.add_block(foreign));
        assert_eq!(b.get_chain(), before);
        assert!(!b.resolve_conflicts());
    }

    #[test]
    fn test_add_block_bad_proof() {
        let (mut a, _) = engine_with_wallet();
        let mut b = Blockchain::new(None, "5001");
        let mut block = a.mine_block().unwrap();

        let last_hash = block.previous_hash.clone();
        block.proof = (block.proof + 1..)
            .find(|p| !valid_proof(&[], &last_hash, *p))
            .unwrap();
        assert!(!b.add_block(block));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_receive_block_routing() {
        let (mut a, _) = engine_with_wallet();
        let mut b = Blockchain::new(None, "5001");
        a.mine_block().unwrap();
        a.mine_block().unwrap();
        let chain = a.get_chain();

        assert_eq!(b.receive_block(chain[2].clone()), BlockReceipt::Behind);
        assert!(b.resolve_conflicts());
        assert_eq!(b.len(), 1);

        assert_eq!(b.receive_block(chain[1].clone()), BlockReceipt::Accepted);
        assert_eq!(b.receive_block(chain[1].clone()), BlockReceipt::Stale);
        assert_eq!(b.receive_block(chain[0].clone()), BlockReceipt::Stale);
    }

    #[test]
    fn test_add_block_removes_first_match_only() {
        let (mut a, wallet) = engine_with_wallet();
        a.mine_block().unwrap();
        let tx = wallet.sign_transaction(Identity::new("bob"), Decimal::ONE);
        assert!(submit(&mut a, tx.clone()));

        let mut b = Blockchain::new(None, "5001");
        assert!(b.add_block(a.get_chain()[1].clone()));
        b.open_transactions.push(tx.clone());
        b.open_transactions.push(tx.clone());

        let block = a.mine_block().unwrap();
        assert!(b.add_block(block));
        assert_eq!(b.get_open_transactions(), vec![tx]);
    }

    #[test]
    fn test_resolve_adopts_longer_valid_chain() {
        let (mut a, _) = engine_with_wallet();
        let (mut b, wallet_b) = engine_with_wallet();
        a.mine_block().unwrap();
        a.mine_block().unwrap();
        b.mine_block().unwrap();
        assert!(submit(&mut b, wallet_b.sign_transaction(Identity::new("bob"), Decimal::ONE)));
        b.set_resolve_conflicts(true);

        assert!(b.resolve(vec![a.get_chain()]));
        assert_eq!(b.get_chain(), a.get_chain());
        assert!(b.get_open_transactions().is_empty());
        assert!(!b.resolve_conflicts());

        // Idempotent
        assert!(!b.resolve(vec![a.get_chain()]));
    }

    #[test]
    fn test_resolve_ignores_invalid_and_equal_chains() {
        let (mut a, _) = engine_with_wallet();
        let (mut b, _) = engine_with_wallet();
        a.mine_block().unwrap();
        a.mine_block().unwrap();
        b.mine_block().unwrap();
        b.mine_block().unwrap();

        let mut forged = a.get_chain();
        forged.push(Block::new(3, "bogus", vec![], 0, 0));

        let before = b.get_chain();
        assert!(!b.resolve(vec![a.get_chain(), forged]));
        assert_eq!(b.get_chain(), before);
    }

    #[test]
    fn test_resolve_rejects_misplaced_index() {
        let mut local = Blockchain::new(None, "5000");
        let genesis = Block::genesis();
        let far = reward_block_on(&genesis, u64::MAX, "attacker");

        assert!(!local.resolve(vec![vec![genesis, far.clone()]]));
        assert_eq!(local.len(), 1);

        // Routing never overflows, whatever index a peer sends
        assert_eq!(local.receive_block(far), BlockReceipt::Behind);
        let next = reward_block_on(local.last_block(), 1, "miner");
        assert_eq!(local.receive_block(next), BlockReceipt::Accepted);
        assert_eq!(local.len(), 2);
    }

    #[test]
    fn test_resolve_rejects_forged_genesis() {
        let mut local = Blockchain::new(None, "5000");

        let mut genesis = Block::genesis();
        genesis.transactions.push(Transaction::new(
            Identity::mining(),
            Identity::new("attacker"),
            TxSignature::empty(),
            Decimal::from(1_000_000),
        ));
        let b1 = reward_block_on(&genesis, 1, "attacker");

        assert!(!local.resolve(vec![vec![genesis, b1]]));
        assert_eq!(local.get_chain(), vec![Block::genesis()]);
        assert_eq!(local.compute_balance(&Identity::new("attacker")), Decimal::ZERO);
    }

    #[test]
    fn test_restore_rejects_unverifiable_chain() {
        let genesis = Block::genesis();
        let snapshot = Snapshot {
            chain: vec![genesis.clone(), reward_block_on(&genesis, 7, "attacker")],
            ..Snapshot::default()
        };
        assert!(Blockchain::from_snapshot(None, "5000", snapshot).is_err());
    }

    #[test]
    fn test_peer_block_clears_pool_entry_across_amount_scale() {
        let (mut a, wallet) = engine_with_wallet();
        a.mine_block().unwrap();

        let mut b = Blockchain::new(None, "5001");
        assert!(b.add_block(a.get_chain()[1].clone()));

        // Same transfer: `5` on the miner, `5.0` in the receiver's pool
        let whole = wallet.sign_transaction(Identity::new("bob"), Decimal::new(5, 0));
        let mut scaled = whole.clone();
        scaled.amount = Decimal::new(50, 1);
        assert!(submit(&mut a, whole));
        assert!(submit(&mut b, scaled));

        let block = a.mine_block().unwrap();
        assert!(b.add_block(block));
        assert!(b.get_open_transactions().is_empty());
        assert_eq!(b.compute_balance(&wallet.identity()), Decimal::from(15));
    }

    #[test]
    fn test_resolve_picks_longest() {
        let (mut a, _) = engine_with_wallet();
        let (mut c, _) = engine_with_wallet();
        a.mine_block().unwrap();
        for _ in 0..3 {
            c.mine_block().unwrap();
        }
        let mut b = Blockchain::new(None, "5002");

        assert!(b.resolve(vec![a.get_chain(), c.get_chain()]));
        assert_eq!(b.get_chain(), c.get_chain());
    }

    #[test]
    fn test_peer_nodes_idempotent() {
        let mut chain = Blockchain::new(None, "5000");
        assert!(chain.add_peer_node("localhost:5001"));
        assert!(!chain.add_peer_node("localhost:5001"));
        assert_eq!(chain.get_peer_nodes(), vec!["localhost:5001".to_string()]);

        assert!(chain.remove_peer_node("localhost:5001"));
        assert!(!chain.remove_peer_node("localhost:5001"));
        assert!(chain.get_peer_nodes().is_empty());
    }

    #[test]
    fn test_snapshot_restore() {
        let (mut chain, wallet) = engine_with_wallet();
        chain.mine_block().unwrap();
        assert!(submit(&mut chain, wallet.sign_transaction(Identity::new("bob"), Decimal::ONE)));
        chain.add_peer_node("localhost:5001");

        let snapshot = chain.snapshot();
        let restored = Blockchain::from_snapshot(Some(wallet.identity()), "5000", snapshot.clone()).unwrap();
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.last_hash(), chain.last_hash());
        assert_eq!(restored.balance(), chain.balance());

        let empty = Snapshot::default();
        assert!(Blockchain::from_snapshot(None, "5000", empty).is_err());
    }
}
