//! The plugin host: registration, initial catch-up, cancellation, and
//! ongoing dispatch.

mod common;

use std::sync::Arc;

use common::Harness;

use stakecoin_consensus::plugins::{ConsensusSetPlugin, PluginMetadata};
use stakecoin_consensus::types::{ConsensusBlock, ConsensusTransaction};
use stakecoin_consensus::{CancelToken, PluginError};
use stakecoin_state::store::{get_object, put_object};
use stakecoin_state::{BucketRef, BucketView, WriteTx};

/// Counts applied and reverted blocks in its bucket.
struct CountingPlugin;

const APPLIED_KEY: &[u8] = b"applied";
const REVERTED_KEY: &[u8] = b"reverted";

fn bump(tx: &mut WriteTx<'_>, bucket: &BucketRef, key: &[u8]) -> Result<(), PluginError> {
    let count: u64 = get_object(tx, bucket, key)?.unwrap_or(0);
    put_object(tx, bucket, key, &(count + 1))?;
    Ok(())
}

impl ConsensusSetPlugin for CountingPlugin {
    fn init_plugin(
        &self,
        _metadata: Option<&PluginMetadata>,
        bucket: &BucketRef,
        tx: &mut WriteTx<'_>,
    ) -> Result<String, PluginError> {
        if get_object::<u64, _>(tx, bucket, APPLIED_KEY)?.is_none() {
            put_object(tx, bucket, APPLIED_KEY, &0u64)?;
            put_object(tx, bucket, REVERTED_KEY, &0u64)?;
        }
        Ok("1.0.0".to_string())
    }

    fn apply_block(
        &self,
        _block: &ConsensusBlock,
        bucket: &BucketRef,
        tx: &mut WriteTx<'_>,
    ) -> Result<(), PluginError> {
        bump(tx, bucket, APPLIED_KEY)
    }

    fn revert_block(
        &self,
        _block: &ConsensusBlock,
        bucket: &BucketRef,
        tx: &mut WriteTx<'_>,
    ) -> Result<(), PluginError> {
        bump(tx, bucket, REVERTED_KEY)
    }

    fn apply_transaction(
        &self,
        _transaction: &ConsensusTransaction,
        _bucket: &BucketRef,
        _tx: &mut WriteTx<'_>,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    fn revert_transaction(
        &self,
        _transaction: &ConsensusTransaction,
        _bucket: &BucketRef,
        _tx: &mut WriteTx<'_>,
    ) -> Result<(), PluginError> {
        Ok(())
    }
}

fn applied_count(harness: &Harness) -> u64 {
    harness
        .set
        .plugin_view("counter", |tx, bucket| {
            Ok(get_object::<u64, _>(tx, bucket, APPLIED_KEY)?.unwrap_or(0))
        })
        .unwrap()
}

#[test]
fn catch_up_replays_the_whole_chain() {
    let mut harness = Harness::new();
    for _ in 0..5 {
        harness.mine(Vec::new());
    }

    harness
        .set
        .register_plugin("counter", Arc::new(CountingPlugin), &CancelToken::new())
        .unwrap();
    // Genesis plus five blocks.
    assert_eq!(applied_count(&harness), 6);

    // Ongoing dispatch continues from there.
    harness.mine(Vec::new());
    assert_eq!(applied_count(&harness), 7);
}

#[test]
fn cancelled_catch_up_commits_nothing() {
    let mut harness = Harness::new();
    for _ in 0..3 {
        harness.mine(Vec::new());
    }

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = harness
        .set
        .register_plugin("counter", Arc::new(CountingPlugin), &cancel)
        .unwrap_err();
    assert!(matches!(err, PluginError::Cancelled));
    // Neither the bucket nor the metadata advanced.
    assert_eq!(applied_count(&harness), 0);

    // A later registration starts clean and succeeds.
    harness
        .set
        .register_plugin("counter", Arc::new(CountingPlugin), &CancelToken::new())
        .unwrap();
    assert_eq!(applied_count(&harness), 4);
}

#[test]
fn registration_guards_names() {
    let harness = Harness::new();
    let cancel = CancelToken::new();
    assert!(matches!(
        harness
            .set
            .register_plugin("", Arc::new(CountingPlugin), &cancel),
        Err(PluginError::PluginNameEmpty)
    ));
    assert!(matches!(
        harness
            .set
            .register_plugin("Metadata", Arc::new(CountingPlugin), &cancel),
        Err(PluginError::PluginNameReserved)
    ));
    harness
        .set
        .register_plugin("counter", Arc::new(CountingPlugin), &cancel)
        .unwrap();
    assert!(matches!(
        harness
            .set
            .register_plugin("counter", Arc::new(CountingPlugin), &cancel),
        Err(PluginError::PluginExists)
    ));
}

#[test]
fn plugins_observe_reorganizations() {
    let mut harness = Harness::new();
    let block_a = harness.mine(Vec::new());
    let staked_after_a = harness.staked;
    let indexes_after_a = harness.staked_indexes;
    harness.mine(Vec::new());

    harness
        .set
        .register_plugin("counter", Arc::new(CountingPlugin), &CancelToken::new())
        .unwrap();
    let before = applied_count(&harness);

    // A two-block fork from A displaces the tip block.
    let fork_restake = stakecoin_consensus::testutil::restake_transaction(
        staked_after_a,
        stakecoin_chain::Currency::from(3000),
        &harness.stake_key,
    );
    let fork_payout = stakecoin_consensus::testutil::TestKey::from_seed([55; 32]);
    let block_b2 = stakecoin_consensus::testutil::next_block(
        &block_a,
        indexes_after_a,
        vec![fork_restake.clone()],
        fork_payout.unlock_hash(),
    );
    let staked_b2 = fork_restake.blockstake_output_id(0);
    let restake_c2 = stakecoin_consensus::testutil::restake_transaction(
        staked_b2,
        stakecoin_chain::Currency::from(3000),
        &harness.stake_key,
    );
    let block_c2 = stakecoin_consensus::testutil::next_block(
        &block_b2,
        stakecoin_chain::block::BlockStakeOutputIndexes {
            block_height: stakecoin_chain::block::Height(2),
            transaction_index: 0,
            output_index: 0,
        },
        vec![restake_c2],
        fork_payout.unlock_hash(),
    );
    harness.set.accept_block(block_b2).unwrap();
    harness.set.accept_block(block_c2).unwrap();

    let reverted = harness
        .set
        .plugin_view("counter", |tx, bucket| {
            Ok(get_object::<u64, _>(tx, bucket, REVERTED_KEY)?.unwrap_or(0))
        })
        .unwrap();
    assert_eq!(reverted, 1, "the displaced tip block was reverted");
    assert_eq!(applied_count(&harness), before + 2);
}
