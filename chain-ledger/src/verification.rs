//! Chain, transaction and proof-of-work validation
//!
//! Every check is a pure function over the state passed in. Failures are
//! reported as `false`, never as errors.

use crate::canonical::{hash_block, proof_digest};
use crate::crypto::verify_signature;
use crate::types::{Block, Identity, Transaction};
use rust_decimal::Decimal;

/// Leading hex characters a proof digest must start with
pub const POW_DIFFICULTY_PREFIX: &str = "00";

/// Check whether `proof` solves the puzzle for `transactions` on top of `last_hash`
pub fn valid_proof(transactions: &[Transaction], last_hash: &str, proof: u64) -> bool {
    proof_digest(transactions, last_hash, proof).starts_with(POW_DIFFICULTY_PREFIX)
}

/// Check a transaction's signature and, optionally, the sender's funds
///
/// `balance_of` is only consulted when `check_funds` is set. Reward
/// transactions carry no signature and are exempt from both checks.
pub fn verify_transaction<F>(tx: &Transaction, balance_of: F, check_funds: bool) -> bool
where
    F: Fn(&Identity) -> Decimal,
{
    if tx.is_reward() {
        return true;
    }

    if check_funds && balance_of(&tx.sender) < tx.amount {
        return false;
    }

    verify_signature(&tx.sender, &tx.canonical_bytes(), &tx.signature)
}

/// Re-check signatures of already admitted transactions (funds not re-checked)
pub fn verify_transactions<F>(transactions: &[Transaction], balance_of: F) -> bool
where
    F: Fn(&Identity) -> Decimal,
{
    transactions
        .iter()
        .all(|tx| verify_transaction(tx, &balance_of, false))
}

/// Check a full chain: fixed genesis, then index, linkage and proof of work
/// for every later block
///
/// Stops at the first broken block. An empty chain is invalid.
pub fn verify_chain(chain: &[Block]) -> bool {
    match chain.first() {
        Some(first) if *first == Block::genesis() => {}
        _ => {
            tracing::debug!("Chain does not start with the genesis block");
            return false;
        }
    }

    for (position, (prev, block)) in chain.iter().zip(chain.iter().skip(1)).enumerate() {
        if block.index != position as u64 + 1 {
            tracing::debug!(index = block.index, position = position + 1, "Block index out of place");
            return false;
        }
        if block.previous_hash != hash_block(prev) {
            tracing::debug!(index = block.index, "Previous hash mismatch");
            return false;
        }
        if !valid_proof(block.proof_transactions(), &block.previous_hash, block.proof) {
            tracing::debug!(index = block.index, "Proof of work is invalid");
            return false;
        }
    }
    true
}
