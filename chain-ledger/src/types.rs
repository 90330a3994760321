//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (field order is part of the format)
//! - Exact arithmetic (Decimal for amounts)
//! - Value semantics (blocks and transactions are never mutated once built)

use crate::canonical;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sender used for the reward transaction appended by the miner
pub const MINING_SENDER: &str = "MINING";

/// Amount paid to the miner of a block
pub const MINING_REWARD: Decimal = Decimal::TEN;

/// Proof stored in the genesis block
pub const GENESIS_PROOF: u64 = 100;

/// Participant identity: hex-encoded Ed25519 public key
///
/// The identity doubles as the key that verifies the participant's
/// signatures. The reserved value `MINING` is not a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create new identity
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Reward sender
    pub fn mining() -> Self {
        Self(MINING_SENDER.to_string())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the reserved reward sender
    pub fn is_mining(&self) -> bool {
        self.0 == MINING_SENDER
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hex-encoded Ed25519 signature (empty for reward transactions)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxSignature(String);

impl TxSignature {
    /// Wrap an already hex-encoded signature
    pub fn new(hex_sig: impl Into<String>) -> Self {
        Self(hex_sig.into())
    }

    /// Create from raw signature bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Empty signature carried by reward transactions
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode to raw bytes, `None` if not a 64-byte hex string
    pub fn to_bytes(&self) -> Option<[u8; 64]> {
        let raw = hex::decode(&self.0).ok()?;
        raw.try_into().ok()
    }

    /// True if no signature is present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Value transfer between two identities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender (public key, or `MINING` for rewards)
    pub sender: Identity,

    /// Recipient
    pub recipient: Identity,

    /// Amount transferred (exact decimal, non-negative)
    pub amount: Decimal,

    /// Sender's signature over the canonical payload
    pub signature: TxSignature,
}

impl Transaction {
    /// Create new transaction
    pub fn new(
        sender: Identity,
        recipient: Identity,
        signature: TxSignature,
        amount: Decimal,
    ) -> Self {
        Self {
            sender,
            recipient,
            amount,
            signature,
        }
    }

    /// Reward transaction paying `MINING_REWARD` to the miner
    pub fn reward(miner: Identity) -> Self {
        Self::new(Identity::mining(), miner, TxSignature::empty(), MINING_REWARD)
    }

    /// True if this is a mining reward
    pub fn is_reward(&self) -> bool {
        self.sender.is_mining()
    }

    /// Canonical bytes for signing (`{sender, recipient, amount}`)
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical::transaction_bytes(self)
    }
}

/// Hash-linked unit of committed transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain (0 = genesis)
    pub index: u64,

    /// Hex SHA-256 of the previous block, empty for genesis
    pub previous_hash: String,

    /// Committed transactions; the last one is the mining reward
    pub transactions: Vec<Transaction>,

    /// Proof-of-work nonce
    pub proof: u64,

    /// Creation time (seconds since Unix epoch)
    pub timestamp: i64,
}

impl Block {
    /// Create new block
    pub fn new(
        index: u64,
        previous_hash: impl Into<String>,
        transactions: Vec<Transaction>,
        proof: u64,
        timestamp: i64,
    ) -> Self {
        Self {
            index,
            previous_hash: previous_hash.into(),
            transactions,
            proof,
            timestamp,
        }
    }

    /// The fixed first block of every chain
    pub fn genesis() -> Self {
        Self::new(0, "", Vec::new(), GENESIS_PROOF, 0)
    }

    /// Canonical hash of this block
    pub fn hash(&self) -> String {
        canonical::hash_block(self)
    }

    /// Transactions covered by the proof of work
    ///
    /// The trailing slot holds the reward, which is appended after the proof
    /// is found, so it is never part of the proof payload.
    pub fn proof_transactions(&self) -> &[Transaction] {
        match self.transactions.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    /// Reward transaction, if the block carries one in the trailing slot
    pub fn reward(&self) -> Option<&Transaction> {
        self.transactions.last().filter(|tx| tx.is_reward())
    }
}
