//! Canonical serialization for hashing and signing
//!
//! One encoding is shared by block hashing, transaction signing and the
//! proof-of-work payload:
//! - Transactions render as `{"sender", "recipient", "amount"}` in that order,
//!   signature excluded, amount normalized (`5.0` and `5` encode the same)
//! - Blocks render their fields in sorted key order
//! - Digests are lowercase hex SHA-256

use crate::types::{Block, Transaction};
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Serialize)]
struct CanonicalTransaction<'a> {
    sender: &'a str,
    recipient: &'a str,
    amount: Decimal,
}

impl<'a> From<&'a Transaction> for CanonicalTransaction<'a> {
    fn from(tx: &'a Transaction) -> Self {
        Self {
            sender: tx.sender.as_str(),
            recipient: tx.recipient.as_str(),
            amount: tx.amount.normalize(),
        }
    }
}

// Field order is alphabetical and must stay that way.
#[derive(Serialize)]
struct CanonicalBlock<'a> {
    index: u64,
    previous_hash: &'a str,
    proof: u64,
    timestamp: i64,
    transactions: Vec<CanonicalTransaction<'a>>,
}

fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("canonical encoding of strings and decimals cannot fail")
}

/// Canonical bytes of one transaction (the signing payload)
pub fn transaction_bytes(tx: &Transaction) -> Vec<u8> {
    encode(&CanonicalTransaction::from(tx))
}

/// Canonical bytes of an ordered list of transactions
pub fn transactions_bytes(transactions: &[Transaction]) -> Vec<u8> {
    let canonical: Vec<CanonicalTransaction<'_>> =
        transactions.iter().map(CanonicalTransaction::from).collect();
    encode(&canonical)
}

/// Canonical bytes of a block
pub fn block_bytes(block: &Block) -> Vec<u8> {
    encode(&CanonicalBlock {
        index: block.index,
        previous_hash: &block.previous_hash,
        proof: block.proof,
        timestamp: block.timestamp,
        transactions: block
            .transactions
            .iter()
            .map(CanonicalTransaction::from)
            .collect(),
    })
}

/// Hex SHA-256 of arbitrary bytes
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash a block
pub fn hash_block(block: &Block) -> String {
    sha256_hex(&block_bytes(block))
}

/// Digest tested by the proof-of-work predicate
///
/// Hashes `canonical(transactions) || last_hash || proof` (decimal proof).
pub fn proof_digest(transactions: &[Transaction], last_hash: &str, proof: u64) -> String {
    let mut payload = transactions_bytes(transactions);
    payload.extend_from_slice(last_hash.as_bytes());
    payload.extend_from_slice(proof.to_string().as_bytes());
    sha256_hex(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Identity, TxSignature};

    fn tx(amount: Decimal, signature: &str) -> Transaction {
        Transaction::new(
            Identity::new("alice"),
            Identity::new("bob"),
            TxSignature::new(signature),
            amount,
        )
    }

    #[test]
    fn test_transaction_field_order() {
        let bytes = transaction_bytes(&tx(Decimal::new(25, 1), "ff"));
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"sender":"alice","recipient":"bob","amount":"2.5"}"#
        );
    }

    #[test]
    fn test_signature_not_in_payload() {
        let a = transaction_bytes(&tx(Decimal::ONE, "aa"));
        let b = transaction_bytes(&tx(Decimal::ONE, "bb"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_amount_normalized() {
        let a = transaction_bytes(&tx(Decimal::new(500, 2), ""));
        let b = transaction_bytes(&tx(Decimal::new(5, 0), ""));
        assert_eq!(a, b);
    }

    #[test]
    fn test_block_keys_sorted() {
        let block = Block::new(3, "abc", vec![], 42, 1_700_000_000);
        let text = String::from_utf8(block_bytes(&block)).unwrap();
        assert_eq!(
            text,
            r#"{"index":3,"previous_hash":"abc","proof":42,"timestamp":1700000000,"transactions":[]}"#
        );
    }

    #[test]
    fn test_hash_block_deterministic_and_sensitive() {
        let block = Block::new(1, "abc", vec![tx(Decimal::ONE, "aa")], 42, 10);
        assert_eq!(hash_block(&block), hash_block(&block.clone()));
        assert_eq!(hash_block(&block).len(), 64);

        let mut changed = block.clone();
        changed.proof = 43;
        assert_ne!(hash_block(&block), hash_block(&changed));

        let mut changed = block.clone();
        changed.transactions[0].amount = Decimal::TWO;
        assert_ne!(hash_block(&block), hash_block(&changed));
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_proof_digest_depends_on_every_input() {
        let txs = vec![tx(Decimal::ONE, "")];
        let base = proof_digest(&txs, "hash", 1);
        assert_eq!(base, proof_digest(&txs, "hash", 1));
        assert_ne!(base, proof_digest(&txs, "hash", 2));
        assert_ne!(base, proof_digest(&txs, "other", 1));
        assert_ne!(base, proof_digest(&[], "hash", 1));
    }
}
