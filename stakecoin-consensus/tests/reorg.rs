//! Fork choice and atomic reorganization.

mod common;

use std::sync::{Arc, Mutex};

use common::Harness;

use stakecoin_chain::block::{Block, BlockStakeOutputIndexes, Height};
use stakecoin_chain::Currency;
use stakecoin_consensus::testutil::{next_block, restake_transaction, TestKey};
use stakecoin_consensus::{
    CancelToken, ConsensusChange, ConsensusSetSubscriber, CONSENSUS_CHANGE_BEGINNING,
};

#[derive(Default)]
struct RecordingSubscriber {
    /// `(reverted, applied)` block counts per observed change.
    changes: Mutex<Vec<(usize, usize)>>,
}

impl RecordingSubscriber {
    fn record(&self) -> Vec<(usize, usize)> {
        self.changes.lock().unwrap().clone()
    }
}

impl ConsensusSetSubscriber for RecordingSubscriber {
    fn process_consensus_change(&self, change: &ConsensusChange) {
        self.changes.lock().unwrap().push((
            change.reverted_blocks.len(),
            change.applied_blocks.len(),
        ));
    }
}

/// Builds a child of `parent` staking `staked` through `stake_key`, paying
/// the block out to `payout`. A non-empty `tag` lands in the restake
/// transaction's arbitrary data, so fork transactions get distinct ids.
/// Returns the block and the new staked output.
fn fork_block(
    parent: &Block,
    staked: stakecoin_chain::BlockStakeOutputId,
    staked_indexes: BlockStakeOutputIndexes,
    stake_key: &TestKey,
    payout: &TestKey,
    tag: &[u8],
) -> (Block, stakecoin_chain::BlockStakeOutputId) {
    let mut restake = restake_transaction(staked, Currency::from(3000), stake_key);
    if !tag.is_empty() {
        restake.arbitrary_data = tag.to_vec();
        let message = restake.signature_hash(0);
        restake.blockstake_inputs[0].fulfillment = stake_key.fulfill(message);
    }
    let next_staked = restake.blockstake_output_id(0);
    let block = next_block(parent, staked_indexes, vec![restake], payout.unlock_hash());
    (block, next_staked)
}

#[test]
fn heavier_fork_triggers_a_single_reorganization() {
    let mut harness = Harness::new();

    // The main chain: G - A - B - C.
    let block_a = harness.mine(Vec::new());
    let staked_after_a = harness.staked;
    let indexes_after_a = harness.staked_indexes;
    let block_b = harness.mine(Vec::new());
    let block_c = harness.mine(Vec::new());
    assert_eq!(harness.set.height().unwrap(), Height(3));

    let subscriber = Arc::new(RecordingSubscriber::default());
    harness
        .set
        .subscribe(
            subscriber.clone(),
            CONSENSUS_CHANGE_BEGINNING,
            &CancelToken::new(),
        )
        .unwrap();
    let replayed = subscriber.record().len();
    assert_eq!(replayed, 4, "genesis plus three blocks were replayed");

    // A competing fork from A, distinguished by its payout target.
    let fork_payout = TestKey::from_seed([77; 32]);
    let (block_b2, staked_b2) = fork_block(
        &block_a,
        staked_after_a,
        indexes_after_a,
        &harness.stake_key,
        &fork_payout,
        b"",
    );
    let (block_c2, staked_c2) = fork_block(
        &block_b2,
        staked_b2,
        BlockStakeOutputIndexes {
            block_height: Height(2),
            transaction_index: 0,
            output_index: 0,
        },
        &harness.stake_key,
        &fork_payout,
        b"",
    );
    let (block_d2, _) = fork_block(
        &block_c2,
        staked_c2,
        BlockStakeOutputIndexes {
            block_height: Height(3),
            transaction_index: 0,
            output_index: 0,
        },
        &harness.stake_key,
        &fork_payout,
        b"",
    );

    // B' and C' are stored but do not outweigh the tip.
    harness.set.accept_block(block_b2.clone()).unwrap();
    assert_eq!(harness.set.current_block().unwrap(), block_c);
    harness.set.accept_block(block_c2.clone()).unwrap();
    assert_eq!(harness.set.current_block().unwrap(), block_c);

    // D' outweighs the tip: revert C and B, apply B', C', D' atomically.
    harness.set.accept_block(block_d2.clone()).unwrap();
    assert_eq!(harness.set.height().unwrap(), Height(4));
    assert_eq!(harness.set.current_block().unwrap(), block_d2);
    assert_eq!(
        harness.set.block_at_height(Height(2)).unwrap(),
        Some(block_b2.clone())
    );
    assert_eq!(
        harness.set.block_at_height(Height(3)).unwrap(),
        Some(block_c2.clone())
    );
    assert!(!harness.set.in_current_path(&block_b.id()).unwrap());
    assert!(!harness.set.in_current_path(&block_c.id()).unwrap());
    assert!(harness.set.in_current_path(&block_b2.id()).unwrap());

    // The subscriber observed the reorganization as one consensus change.
    let record = subscriber.record();
    assert_eq!(record.len(), replayed + 1);
    let (reverted, applied) = &record[record.len() - 1];
    assert_eq!(*reverted, 2, "B and C were reverted");
    assert_eq!(*applied, 3, "B', C' and D' were applied");

    // An independent node fed only the winning chain converges on the same
    // tip, so the reorganized state matches a replay from genesis.
    let fresh = stakecoin_consensus::testutil::open_devnet_set();
    fresh.accept_block(block_a).unwrap();
    fresh.accept_block(block_b2).unwrap();
    fresh.accept_block(block_c2).unwrap();
    fresh.accept_block(block_d2).unwrap();
    assert_eq!(
        fresh.current_block().unwrap(),
        harness.set.current_block().unwrap()
    );
    assert_eq!(
        fresh
            .blockstake_output(&harness.set.current_block().unwrap().transactions[0]
                .blockstake_output_id(0))
            .unwrap()
            .is_some(),
        true
    );
}

#[test]
fn reverted_transactions_leave_the_short_id_map() {
    let mut harness = Harness::new();
    let block_a = harness.mine(Vec::new());
    let staked_after_a = harness.staked;
    let indexes_after_a = harness.staked_indexes;
    let block_b = harness.mine(Vec::new());
    let tx_b = block_b.transactions[0].clone();
    assert!(harness.set.transaction_at_id(&tx_b.id()).unwrap().is_some());

    // A two-block fork from A outweighs the single block B.
    let fork_payout = TestKey::from_seed([78; 32]);
    let (block_b2, staked_b2) = fork_block(
        &block_a,
        staked_after_a,
        indexes_after_a,
        &harness.stake_key,
        &fork_payout,
        b"fork b",
    );
    let (block_c2, _) = fork_block(
        &block_b2,
        staked_b2,
        BlockStakeOutputIndexes {
            block_height: Height(2),
            transaction_index: 0,
            output_index: 0,
        },
        &harness.stake_key,
        &fork_payout,
        b"fork c",
    );
    harness.set.accept_block(block_b2.clone()).unwrap();
    harness.set.accept_block(block_c2).unwrap();
    assert_eq!(harness.set.height().unwrap(), Height(3));

    // B's restake spent the same staked output as B', so its transaction
    // is gone from the current chain; B''s mapping replaced it.
    let tx_b2 = block_b2.transactions[0].clone();
    assert!(harness.set.transaction_at_id(&tx_b2.id()).unwrap().is_some());
    assert!(harness.set.transaction_at_id(&tx_b.id()).unwrap().is_none());
}
