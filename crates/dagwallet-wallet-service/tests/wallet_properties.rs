//! Property-based tests for block ingestion

mod common;

use common::*;
use dagwallet_core::test_helpers::{block, funding_tx, pay_to};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Property: applying a chain twice, in any replay order, changes nothing
    /// and the cursor ends on the highest block
    #[test]
    fn prop_block_replay_is_idempotent(
        amounts in prop::collection::vec(prop::option::of(1_000i64..1_000_000), 1..8),
        replay_seed in any::<u64>(),
    ) {
        let (_dir, wallet) = new_wallet();
        let address = receive_address(&wallet);
        let blocks: Vec<_> = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| {
                let height = i as i32 + 1;
                let txs = amount
                    .map(|a| vec![funding_tx(height as u8, vec![pay_to(&address, a)])])
                    .unwrap_or_default();
                block(height, txs)
            })
            .collect();

        for b in &blocks {
            wallet.process_block(b).unwrap();
        }
        let before = wallet.balance(&address, 1).unwrap();

        let mut order: Vec<usize> = (0..blocks.len()).collect();
        order.rotate_left(replay_seed as usize % blocks.len());
        for i in order {
            wallet.process_block(&blocks[i]).unwrap();
        }

        prop_assert_eq!(wallet.balance(&address, 1).unwrap(), before.clone());
        prop_assert_eq!(wallet.synced_to().unwrap().height, blocks.len() as i32);
        let expected: i64 = amounts.iter().flatten().sum();
        prop_assert_eq!(meer(&before).total.atoms(), expected);
        prop_assert_eq!(meer(&before).unspent.atoms(), expected);
    }
}
