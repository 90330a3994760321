//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Mined chains verify and stay hash-linked
//! - Proof checks are deterministic
//! - Balances never go negative (no double spend)
//! - Snapshots round trip without changing hashes
//! - Resolving twice against the same peers is a no-op

use chain_ledger::{
    canonical::hash_block,
    crypto::KeyPair,
    storage::{JsonFileStore, SnapshotStore},
    types::Transaction,
    verification::{valid_proof, verify_chain},
    Block, Blockchain, Identity, Wallet, MINING_REWARD,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for generating amounts (non-negative, two decimal places)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (0u64..2_000u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

/// Strategy for generating recipient identities
fn recipient_strategy() -> impl Strategy<Value = Identity> {
    "[a-z]{3,12}".prop_map(Identity::new)
}

fn wallet(seed: u8) -> Wallet {
    Wallet::from_keypair(format!("node-{}", seed), KeyPair::from_seed(&[seed; 32]))
}

/// Mine `blocks` blocks, submitting `spends` (recipient, amount) before each one
fn build_chain(miner: &Wallet, blocks: usize, spends: &[(Identity, Decimal)]) -> Blockchain {
    let mut blockchain = Blockchain::new(Some(miner.identity()), miner.node_id());
    let mut spends = spends.iter().cycle();

    for _ in 0..blocks {
        if let Some((recipient, amount)) = spends.next() {
            let tx = miner.sign_transaction(recipient.clone(), *amount);
            blockchain.add_transaction(tx.sender, tx.recipient, tx.signature, tx.amount);
        }
        blockchain.mine_block().unwrap();
    }
    blockchain
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: valid_proof depends only on its inputs
    #[test]
    fn prop_valid_proof_deterministic(
        recipient in recipient_strategy(),
        amount in amount_strategy(),
        last_hash in "[0-9a-f]{64}",
        proof in 0u64..10_000,
    ) {
        let miner = wallet(1);
        let txs = vec![miner.sign_transaction(recipient, amount)];

        prop_assert_eq!(
            valid_proof(&txs, &last_hash, proof),
            valid_proof(&txs.clone(), &last_hash.clone(), proof)
        );
    }

    /// Property: every mined chain verifies and is hash-linked
    #[test]
    fn prop_mined_chain_verifies(
        blocks in 1usize..5,
        spends in prop::collection::vec((recipient_strategy(), amount_strategy()), 1..4),
    ) {
        let miner = wallet(2);
        let blockchain = build_chain(&miner, blocks, &spends);
        let chain = blockchain.get_chain();

        prop_assert_eq!(chain.len(), blocks + 1);
        prop_assert!(verify_chain(&chain));

        for pair in chain.windows(2) {
            prop_assert_eq!(&pair[1].previous_hash, &hash_block(&pair[0]));
            prop_assert_eq!(pair[1].index, pair[0].index + 1);
            prop_assert!(pair[1].reward().is_some());
        }
    }

    /// Property: admitted spends never exceed the balance
    #[test]
    fn prop_no_double_spend(
        amounts in prop::collection::vec(amount_strategy(), 1..20),
    ) {
        let miner = wallet(3);
        let mut blockchain = build_chain(&miner, 1, &[]);
        let start = blockchain.balance().unwrap();
        prop_assert_eq!(start, MINING_REWARD);

        let mut admitted = Decimal::ZERO;
        for amount in amounts {
            let before = blockchain.balance().unwrap();
            let tx = miner.sign_transaction(Identity::new("bob"), amount);
            let accepted = blockchain.add_transaction(tx.sender, tx.recipient, tx.signature, tx.amount);

            prop_assert_eq!(accepted, before >= amount);
            if accepted {
                admitted += amount;
            }
            prop_assert!(blockchain.balance().unwrap() >= Decimal::ZERO);
        }

        prop_assert_eq!(blockchain.balance().unwrap(), start - admitted);
    }

    /// Property: a snapshot round trip reproduces chain, pool and hashes
    #[test]
    fn prop_snapshot_round_trip(
        blocks in 0usize..4,
        pending in prop::collection::vec((recipient_strategy(), amount_strategy()), 0..3),
        peers in prop::collection::btree_set("localhost:[0-9]{4}", 0..3),
    ) {
        let miner = wallet(4);
        let mut blockchain = build_chain(&miner, blocks, &[]);
        for (recipient, amount) in pending {
            let tx = miner.sign_transaction(recipient, amount);
            blockchain.add_transaction(tx.sender, tx.recipient, tx.signature, tx.amount);
        }
        for peer in peers {
            blockchain.add_peer_node(peer);
        }

        let temp_dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::at(temp_dir.path().join("blockchain-prop.json"));
        store.save(&blockchain.snapshot()).unwrap();
        let loaded = store.load().unwrap().unwrap();

        prop_assert_eq!(&loaded, &blockchain.snapshot());
        let restored = Blockchain::from_snapshot(Some(miner.identity()), "prop", loaded).unwrap();
        prop_assert_eq!(restored.last_hash(), blockchain.last_hash());
        prop_assert_eq!(restored.balance(), blockchain.balance());
    }

    /// Property: resolve is idempotent
    #[test]
    fn prop_resolve_idempotent(
        local_blocks in 0usize..3,
        peer_blocks in prop::collection::vec(0usize..5, 0..3),
    ) {
        let mut local = build_chain(&wallet(5), local_blocks, &[]);
        let peer_chains: Vec<Vec<Block>> = peer_blocks
            .iter()
            .enumerate()
            .map(|(i, blocks)| build_chain(&wallet(10 + i as u8), *blocks, &[]).get_chain())
            .collect();

        let longest_peer = peer_blocks.iter().copied().max().unwrap_or(0);
        let replaced = local.resolve(peer_chains.clone());
        prop_assert_eq!(replaced, longest_peer > local_blocks);

        let after_first = local.get_chain();
        prop_assert!(!local.resolve(peer_chains));
        prop_assert_eq!(local.get_chain(), after_first);
        prop_assert!(!local.resolve_conflicts());
    }

    /// Property: equal amounts at different scales hash identically
    #[test]
    fn prop_hash_ignores_amount_scale(units in 0i64..1_000) {
        let tx = |amount: Decimal| {
            Transaction::new(Identity::new("alice"), Identity::new("bob"), Default::default(), amount)
        };
        let short = Block::new(1, "ab", vec![tx(Decimal::new(units, 0))], 7, 1_700_000_000);
        let long = Block::new(1, "ab", vec![tx(Decimal::new(units * 100, 2))], 7, 1_700_000_000);

        prop_assert_eq!(hash_block(&short), hash_block(&long));
    }
}
