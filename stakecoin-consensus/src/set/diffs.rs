//! Diff generation and the forward/backward application of blocks.
//!
//! A block applied for the first time has its diffs *generated*: each
//! transaction is validated against the in-transaction ledger state and its
//! effects committed immediately, so later transactions in the same block
//! see earlier ones. A block applied again after a revert has its recorded
//! diffs *replayed* without re-validation. Reverting always replays the
//! recorded diffs backward.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use stakecoin_chain::block::Height;
use stakecoin_chain::conditions::Condition;
use stakecoin_chain::outputs::CoinOutput;
use stakecoin_chain::parameters::ChainConstants;
use stakecoin_chain::transaction::{Transaction, TransactionShortId};
use stakecoin_chain::{BlockStakeOutputId, Timestamp};
use stakecoin_state::diffs::{
    BlockStakeOutputDiff, CoinOutputDiff, DelayedCoinOutputDiff, DiffDirection, TransactionIdDiff,
};
use stakecoin_state::store::put_object;
use stakecoin_state::{ledger, BucketView, ProcessedBlock, StoreError, WriteTx};

use crate::error::{AcceptError, BlockError, PluginError, TransactionError};
use crate::plugins::ConsensusSetPlugin;
use crate::transaction::TransactionRegistry;
use crate::types::{
    ConsensusBlock, ConsensusChange, ConsensusChangeId, ConsensusTransaction, TransactionContext,
};

pub(crate) type PluginMap = BTreeMap<String, Arc<dyn ConsensusSetPlugin>>;

/// Loads the outputs a transaction spends from the current (in-transaction)
/// ledger state.
pub(crate) fn prepare_consensus_transaction<V: BucketView + ?Sized>(
    view: &V,
    transaction: &Transaction,
    block_height: Height,
    block_timestamp: Timestamp,
    sequence_index: usize,
) -> Result<ConsensusTransaction, TransactionError> {
    let mut spent_coin_outputs = std::collections::HashMap::new();
    for input in &transaction.coin_inputs {
        let output = ledger::coin_output(view, &input.parent_id)?
            .ok_or(TransactionError::MissingCoinOutput)?;
        spent_coin_outputs.insert(input.parent_id, output);
    }
    let mut spent_blockstake_outputs = std::collections::HashMap::new();
    for input in &transaction.blockstake_inputs {
        let output = ledger::blockstake_output(view, &input.parent_id)?
            .ok_or(TransactionError::MissingBlockStakeOutput)?;
        spent_blockstake_outputs.insert(input.parent_id, output);
    }
    Ok(ConsensusTransaction {
        transaction: transaction.clone(),
        block_height,
        block_timestamp,
        sequence_index: sequence_index as u16,
        spent_coin_outputs,
        spent_blockstake_outputs,
    })
}

pub(crate) fn consensus_block_from(pb: &ProcessedBlock) -> ConsensusBlock {
    ConsensusBlock {
        block: pb.block.clone(),
        height: pb.height,
        spent_coin_outputs: pb.spent_coin_outputs(),
        spent_blockstake_outputs: pb.spent_blockstake_outputs(),
    }
}

/// Aggregates the observable delta of a committed reorganization.
///
/// The diff vectors are ordered so that committing every diff in the apply
/// direction moves the ledger from the pre-change to the post-change state:
/// reverted blocks contribute their diffs inverted and in reverse order
/// first, applied blocks follow in generation order.
pub(crate) fn consensus_change_from(
    id: ConsensusChangeId,
    reverted: &[ProcessedBlock],
    applied: &[ProcessedBlock],
) -> ConsensusChange {
    let mut change = ConsensusChange {
        id,
        ..ConsensusChange::default()
    };
    for pb in reverted {
        change.reverted_blocks.push(pb.block.clone());
        for diff in pb.coin_output_diffs.iter().rev() {
            let mut diff = diff.clone();
            diff.direction = diff.direction.inverse();
            change.coin_output_diffs.push(diff);
        }
        for diff in pb.blockstake_output_diffs.iter().rev() {
            let mut diff = diff.clone();
            diff.direction = diff.direction.inverse();
            change.blockstake_output_diffs.push(diff);
        }
        for diff in pb.delayed_coin_output_diffs.iter().rev() {
            let mut diff = diff.clone();
            diff.direction = diff.direction.inverse();
            change.delayed_coin_output_diffs.push(diff);
        }
        for diff in pb.transaction_id_diffs.iter().rev() {
            let mut diff = diff.clone();
            diff.direction = diff.direction.inverse();
            change.transaction_id_diffs.push(diff);
        }
    }
    for pb in applied {
        change.applied_blocks.push(pb.block.clone());
        change
            .coin_output_diffs
            .extend(pb.coin_output_diffs.iter().cloned());
        change
            .blockstake_output_diffs
            .extend(pb.blockstake_output_diffs.iter().cloned());
        change
            .delayed_coin_output_diffs
            .extend(pb.delayed_coin_output_diffs.iter().cloned());
        change
            .transaction_id_diffs
            .extend(pb.transaction_id_diffs.iter().cloned());
    }
    change
}

fn block_path_commit(tx: &mut WriteTx<'_>, pb: &ProcessedBlock) -> Result<(), StoreError> {
    put_object(
        tx,
        &ledger::BLOCK_PATH,
        &pb.height.big_endian_bytes(),
        &pb.block.id(),
    )?;
    ledger::set_block_height(tx, pb.height)
}

fn verify_or_record_checksum(
    tx: &mut WriteTx<'_>,
    pb: &mut ProcessedBlock,
) -> Result<(), AcceptError> {
    let checksum = ledger::consensus_checksum(tx)?;
    match pb.consensus_checksum {
        Some(expected) if expected != checksum => {
            ledger::set_inconsistent(tx)?;
            Err(AcceptError::Store(StoreError::Corrupt(
                "ledger checksum diverged from the recorded one",
            )))
        }
        _ => {
            pb.consensus_checksum = Some(checksum);
            Ok(())
        }
    }
}

fn plugin_apply_transaction(
    tx: &mut WriteTx<'_>,
    plugins: &PluginMap,
    ct: &ConsensusTransaction,
) -> Result<(), PluginError> {
    for (name, plugin) in plugins {
        plugin.apply_transaction(ct, &ledger::plugin_bucket(name), tx)?;
    }
    Ok(())
}

/// Validates and applies a block seen for the first time, generating and
/// recording its diff set as it goes.
pub(crate) fn generate_and_apply_diffs(
    tx: &mut WriteTx<'_>,
    constants: &ChainConstants,
    registry: &TransactionRegistry,
    plugins: &PluginMap,
    pb: &mut ProcessedBlock,
    staked: &BlockStakeOutputId,
) -> Result<(), AcceptError> {
    let block_creating_index =
        crate::block::stake::block_creating_transaction_index(&pb.block, staked);

    for index in 0..pb.block.transactions.len() {
        let transaction = pb.block.transactions[index].clone();
        let wrap = |source: TransactionError| {
            AcceptError::Block(BlockError::Transaction { index, source })
        };
        let ct = prepare_consensus_transaction(
            tx,
            &transaction,
            pb.height,
            pb.block.timestamp,
            index,
        )
        .map_err(wrap)?;
        let ctx = TransactionContext {
            block_height: pb.height,
            block_timestamp: pb.block.timestamp,
            block_creating: block_creating_index == Some(index),
        };
        registry
            .validate_transaction(&ct, &ctx, constants, tx)
            .map_err(wrap)?;

        for input in &transaction.coin_inputs {
            let parent = ct.spent_coin_outputs[&input.parent_id].clone();
            let diff = CoinOutputDiff {
                direction: DiffDirection::Revert,
                id: input.parent_id,
                coin_output: parent,
            };
            ledger::commit_coin_output_diff(tx, &diff, DiffDirection::Apply)?;
            pb.coin_output_diffs.push(diff);
        }
        for (index, output) in transaction.coin_outputs.iter().enumerate() {
            let diff = CoinOutputDiff {
                direction: DiffDirection::Apply,
                id: transaction.coin_output_id(index as u64),
                coin_output: output.clone(),
            };
            ledger::commit_coin_output_diff(tx, &diff, DiffDirection::Apply)?;
            pb.coin_output_diffs.push(diff);
        }
        for input in &transaction.blockstake_inputs {
            let parent = ct.spent_blockstake_outputs[&input.parent_id].clone();
            let diff = BlockStakeOutputDiff {
                direction: DiffDirection::Revert,
                id: input.parent_id,
                blockstake_output: parent,
            };
            ledger::commit_blockstake_output_diff(tx, &diff, DiffDirection::Apply)?;
            pb.blockstake_output_diffs.push(diff);
        }
        for (index, output) in transaction.blockstake_outputs.iter().enumerate() {
            let diff = BlockStakeOutputDiff {
                direction: DiffDirection::Apply,
                id: transaction.blockstake_output_id(index as u64),
                blockstake_output: output.clone(),
            };
            ledger::commit_blockstake_output_diff(tx, &diff, DiffDirection::Apply)?;
            pb.blockstake_output_diffs.push(diff);
        }
        let id_diff = TransactionIdDiff {
            direction: DiffDirection::Apply,
            id: transaction.id(),
            short_id: TransactionShortId::new(pb.height, index as u16),
        };
        ledger::commit_transaction_id_diff(tx, &id_diff, DiffDirection::Apply)?;
        pb.transaction_id_diffs.push(id_diff);

        plugin_apply_transaction(tx, plugins, &ct)?;
    }

    // Miner payouts become delayed coin outputs maturing after the chain's
    // delay.
    let maturity_height = pb.height + constants.maturity_delay;
    let payout_diffs: Vec<DelayedCoinOutputDiff> = pb
        .block
        .miner_payouts
        .iter()
        .enumerate()
        .map(|(index, payout)| DelayedCoinOutputDiff {
            direction: DiffDirection::Apply,
            id: pb.block.miner_payout_id(index as u64),
            coin_output: CoinOutput {
                value: payout.value,
                condition: Condition::unlock_hash_condition(payout.unlock_hash),
            },
            maturity_height,
        })
        .collect();
    for diff in payout_diffs {
        ledger::commit_delayed_coin_output_diff(tx, &diff, DiffDirection::Apply)?;
        pb.delayed_coin_output_diffs.push(diff);
    }

    // Outputs delayed until this height mature now, after the block's own
    // transactions: an output maturing at height `h` is spendable from
    // `h + 1`.
    for (id, output) in ledger::delayed_outputs_at(tx, pb.height)? {
        let delayed = DelayedCoinOutputDiff {
            direction: DiffDirection::Revert,
            id,
            coin_output: output.clone(),
            maturity_height: pb.height,
        };
        ledger::commit_delayed_coin_output_diff(tx, &delayed, DiffDirection::Apply)?;
        pb.delayed_coin_output_diffs.push(delayed);
        let matured = CoinOutputDiff {
            direction: DiffDirection::Apply,
            id,
            coin_output: output,
        };
        ledger::commit_coin_output_diff(tx, &matured, DiffDirection::Apply)?;
        pb.coin_output_diffs.push(matured);
    }

    pb.diffs_generated = true;
    block_path_commit(tx, pb)?;
    metrics::counter!("state.committed.block.count", 1);
    metrics::gauge!("state.committed.block.height", pb.height.0 as _);

    let cb = consensus_block_from(pb);
    for (name, plugin) in plugins {
        plugin.apply_block(&cb, &ledger::plugin_bucket(name), tx)?;
    }

    verify_or_record_checksum(tx, pb)?;
    ledger::put_processed_block(tx, pb)?;
    debug!(height = %pb.height, id = %pb.block.id(), "applied block (generated diffs)");
    Ok(())
}

/// Re-applies a block whose diffs were generated by an earlier apply.
pub(crate) fn replay_apply(
    tx: &mut WriteTx<'_>,
    plugins: &PluginMap,
    pb: &mut ProcessedBlock,
) -> Result<(), AcceptError> {
    ledger::commit_diff_set(tx, pb, DiffDirection::Apply)?;
    let cb = consensus_block_from(pb);
    for index in 0..cb.block.transactions.len() {
        let ct = cb
            .consensus_transaction(index)
            .expect("index is within the block");
        plugin_apply_transaction(tx, plugins, &ct)?;
    }
    for (name, plugin) in plugins {
        plugin.apply_block(&cb, &ledger::plugin_bucket(name), tx)?;
    }
    verify_or_record_checksum(tx, pb)?;
    ledger::put_processed_block(tx, pb)?;
    debug!(height = %pb.height, id = %pb.block.id(), "applied block (replayed diffs)");
    Ok(())
}

/// Disconnects an applied block: its ledger diffs are replayed backward
/// first, so plugin hooks observe the post-revert ledger, mirroring the
/// apply direction where the ledger moves before the plugins do. The
/// processed block keeps its diffs for a later re-apply.
pub(crate) fn revert_block(
    tx: &mut WriteTx<'_>,
    plugins: &PluginMap,
    pb: &ProcessedBlock,
) -> Result<(), AcceptError> {
    ledger::commit_diff_set(tx, pb, DiffDirection::Revert)?;
    let cb = consensus_block_from(pb);
    for (name, plugin) in plugins {
        plugin.revert_block(&cb, &ledger::plugin_bucket(name), tx)?;
    }
    for index in (0..cb.block.transactions.len()).rev() {
        let ct = cb
            .consensus_transaction(index)
            .expect("index is within the block");
        for (name, plugin) in plugins {
            plugin.revert_transaction(&ct, &ledger::plugin_bucket(name), tx)?;
        }
    }
    debug!(height = %pb.height, id = %pb.block.id(), "reverted block");
    Ok(())
}

/// Applies the genesis block into a fresh store and records the first
/// consensus change. Genesis is exempt from validation: its allocation
/// transaction has no inputs.
pub(crate) fn apply_genesis_block(
    tx: &mut WriteTx<'_>,
    constants: &ChainConstants,
) -> Result<ConsensusChangeId, AcceptError> {
    let genesis = stakecoin_chain::parameters::genesis::genesis_block(constants);
    let mut pb = ProcessedBlock {
        block: genesis,
        height: Height(0),
        depth: constants.root_target.difficulty(),
        child_target: constants.root_target,
        diffs_generated: false,
        coin_output_diffs: Vec::new(),
        blockstake_output_diffs: Vec::new(),
        delayed_coin_output_diffs: Vec::new(),
        transaction_id_diffs: Vec::new(),
        consensus_checksum: None,
    };
    for index in 0..pb.block.transactions.len() {
        let transaction = pb.block.transactions[index].clone();
        for (output_index, output) in transaction.coin_outputs.iter().enumerate() {
            let diff = CoinOutputDiff {
                direction: DiffDirection::Apply,
                id: transaction.coin_output_id(output_index as u64),
                coin_output: output.clone(),
            };
            ledger::commit_coin_output_diff(tx, &diff, DiffDirection::Apply)?;
            pb.coin_output_diffs.push(diff);
        }
        for (output_index, output) in transaction.blockstake_outputs.iter().enumerate() {
            let diff = BlockStakeOutputDiff {
                direction: DiffDirection::Apply,
                id: transaction.blockstake_output_id(output_index as u64),
                blockstake_output: output.clone(),
            };
            ledger::commit_blockstake_output_diff(tx, &diff, DiffDirection::Apply)?;
            pb.blockstake_output_diffs.push(diff);
        }
        let id_diff = TransactionIdDiff {
            direction: DiffDirection::Apply,
            id: transaction.id(),
            short_id: TransactionShortId::new(Height(0), index as u16),
        };
        ledger::commit_transaction_id_diff(tx, &id_diff, DiffDirection::Apply)?;
        pb.transaction_id_diffs.push(id_diff);
    }
    pb.diffs_generated = true;
    block_path_commit(tx, &pb)?;
    verify_or_record_checksum(tx, &mut pb)?;
    ledger::put_processed_block(tx, &pb)?;
    let id = super::changelog::append_change(tx, Vec::new(), vec![pb.block.id()])?;
    debug!(id = %pb.block.id(), "initialized chain from genesis");
    Ok(id)
}
