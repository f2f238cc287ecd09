//! Block acceptance: validation, fork choice, and the atomic
//! revert-then-apply reorganization.

use rand::Rng;
use tracing::{info, warn};

use stakecoin_chain::block::{Block, Height};
use stakecoin_chain::Timestamp;
use stakecoin_state::diffs::DiffDirection;
use stakecoin_state::{ledger, ProcessedBlock, StoreError};

use super::diffs;
use super::fork;
use super::{changelog, State};
use crate::block::{check, stake};
use crate::error::{AcceptError, BlockError};
use crate::types::ConsensusChange;

/// How many blocks with future timestamps are buffered for retry.
const FUTURE_BUFFER_LIMIT: usize = 1024;

/// One in this many applies re-runs a full revert-apply round-trip and
/// compares checksums.
const SAMPLED_ROUNDTRIP_DENOMINATOR: u32 = 1000;

/// Validates a candidate against everything knowable from its parent and
/// its own ancestry, without touching UTXO state. Returns the staked output
/// id for the later block-creating-transaction detection.
fn validate_block_local(
    state: &State,
    block: &Block,
    parent: &ProcessedBlock,
    height: Height,
) -> Result<stakecoin_chain::BlockStakeOutputId, AcceptError> {
    check::block_size_is_valid(block, &state.constants)?;

    let minimum = state
        .store
        .view::<_, AcceptError, _>(|tx| {
            Ok(check::minimum_valid_child_timestamp(
                tx,
                &state.header_cache,
                &state.constants,
                &block.parent_id,
            )?)
        })?
        .ok_or(AcceptError::UnknownParent)?;
    check::timestamp_is_past_median(block.timestamp, minimum)?;

    let custom_payouts = state
        .registry
        .custom_miner_payout_sum(&block.transactions)
        .map_err(|source| BlockError::Transaction { index: 0, source })?;
    check::miner_payouts_are_valid(block, &state.constants, &custom_payouts)?;

    let staked = state.store.view::<_, AcceptError, _>(|tx| {
        let (staked_id, staked_output, _created_at) = stake::resolve_pobs_output(
            tx,
            &state.header_cache,
            &block.parent_id,
            parent.height,
            &block.pobs_output,
        )?;
        stake::blockstake_is_respent(block, &staked_id)?;
        stake::blockstake_age_is_met(
            &block.pobs_output,
            parent.block.timestamp,
            block.timestamp,
            &state.constants,
        )?;
        let modifier = stake::stake_modifier(
            tx,
            &state.header_cache,
            &state.constants,
            height,
            &block.parent_id,
        )?;
        stake::block_is_solved(
            &modifier,
            &block.pobs_output,
            block.timestamp,
            &staked_output.value,
            &parent.child_target,
        )?;
        Ok(staked_id)
    })?;
    Ok(staked)
}

/// The outcome of accepting one block.
pub(crate) enum Accepted {
    /// The chain moved; the change has already been committed.
    ChainMoved(ConsensusChange),
    /// The block is valid and stored, but its fork is not heavy enough.
    InTree,
}

pub(crate) fn accept_block(
    state: &mut State,
    block: Block,
    now: Timestamp,
) -> Result<Accepted, AcceptError> {
    let id = block.id();
    if state.dos_blocks.contains(&id) {
        return Err(AcceptError::DosBlock);
    }
    let known = state
        .store
        .view::<_, StoreError, _>(|tx| Ok(ledger::processed_block(tx, &id)?.is_some()))?;
    if known {
        return Err(AcceptError::BlockKnown);
    }

    match check::timestamp_is_not_in_future(block.timestamp, now, &state.constants) {
        Err(BlockError::ExtremeFutureTimestamp) => {
            // Memoized so repeats are rejected without re-validation.
            state.dos_blocks.insert(id);
            return Err(BlockError::ExtremeFutureTimestamp.into());
        }
        Err(BlockError::FutureTimestamp) => {
            if state.future_blocks.len() < FUTURE_BUFFER_LIMIT {
                state.future_blocks.push(block);
            }
            return Err(BlockError::FutureTimestamp.into());
        }
        _ => {}
    }

    let parent = state
        .store
        .view::<_, StoreError, _>(|tx| ledger::processed_block(tx, &block.parent_id))?
        .ok_or(AcceptError::UnknownParent)?;
    let height = parent.height.next();

    let staked = match validate_block_local(state, &block, &parent, height) {
        Ok(staked) => staked,
        Err(err) => {
            state.dos_blocks.insert(id);
            return Err(err);
        }
    };

    let child_target = state.store.view::<_, AcceptError, _>(|tx| {
        stake::new_child_target(
            tx,
            &state.header_cache,
            &state.constants,
            height,
            &parent,
            block.timestamp,
        )
        .map_err(AcceptError::from)
    })?;

    state
        .header_cache
        .insert(id, block.parent_id, block.timestamp);
    let pb = ProcessedBlock {
        block,
        height,
        depth: parent.depth.saturating_add(&parent.child_target.difficulty()),
        child_target,
        diffs_generated: false,
        coin_output_diffs: Vec::new(),
        blockstake_output_diffs: Vec::new(),
        delayed_coin_output_diffs: Vec::new(),
        transaction_id_diffs: Vec::new(),
        consensus_checksum: None,
    };

    // Fork choice: extending the tip always wins; a competing fork must be
    // heavier than the tip by the surpass margin.
    let (tip_id, tip_pb) = current_tip(state)?;
    let extends_tip = pb.block.parent_id == tip_id;
    if !extends_tip {
        let margin = tip_pb.child_target.difficulty().surpass_margin();
        if pb.depth <= tip_pb.depth.saturating_add(&margin) {
            state
                .store
                .update::<_, StoreError, _>(|tx| ledger::put_processed_block(tx, &pb))?;
            info!(id = %pb.block.id(), height = %pb.height, "stored non-extending block");
            return Ok(Accepted::InTree);
        }
    }

    match commit_chain_move(state, pb, staked) {
        Ok(change) => Ok(Accepted::ChainMoved(change)),
        Err((err, offender)) => {
            // The failure may come from an older fork block being fully
            // validated for the first time; memoize the one that failed.
            state.dos_blocks.insert(offender);
            Err(err)
        }
    }
}

fn current_tip(state: &State) -> Result<(stakecoin_chain::BlockId, ProcessedBlock), AcceptError> {
    state.store.view::<_, AcceptError, _>(|tx| {
        let height =
            ledger::block_height(tx)?.ok_or(StoreError::Corrupt("store has no tip height"))?;
        let id = ledger::block_path_id(tx, height)?
            .ok_or(StoreError::Corrupt("tip height has no path entry"))?;
        let pb = ledger::processed_block(tx, &id)?
            .ok_or(StoreError::Corrupt("tip block is not in the block map"))?;
        Ok((id, pb))
    })
}

/// Moves the tip to `pb` inside a single store transaction: revert to the
/// common parent, forward-apply the fork chain, append the change log
/// entry, and advance every plugin's metadata. Either the whole move
/// commits or nothing observable changes.
///
/// On failure, the error comes back paired with the id of the block that
/// caused it: a reorganization forward-applies older fork blocks that were
/// only ever validated block-locally, and one of *those* failing must ban
/// that block, not the candidate that triggered the move.
fn commit_chain_move(
    state: &mut State,
    pb: ProcessedBlock,
    staked: stakecoin_chain::BlockStakeOutputId,
) -> Result<ConsensusChange, (AcceptError, stakecoin_chain::BlockId)> {
    let constants = &state.constants;
    let registry = &state.registry;
    let plugins = &state.plugins;
    let header_cache = &state.header_cache;
    let sample: u32 = rand::thread_rng().gen_range(0, SAMPLED_ROUNDTRIP_DENOMINATOR);

    // Failures outside the forward-apply loop are attributed to the
    // candidate itself.
    let mut offender = pb.block.id();
    let result = state.store.update::<_, AcceptError, _>(|tx| {
        ledger::put_processed_block(tx, &pb)?;
        let fork_chain = fork::backtrack_to_current_path(tx, &pb)?;
        let common_height = fork_chain
            .first()
            .expect("the new block is never on the path yet")
            .height
            .checked_sub(1)
            .ok_or(StoreError::Corrupt("fork chain reaches below genesis"))?;

        let reverted = fork::revert_to_height(tx, plugins, common_height)?;

        let mut applied = Vec::with_capacity(fork_chain.len());
        for mut fb in fork_chain {
            let fb_id = fb.block.id();
            let outcome = if fb.diffs_generated {
                diffs::replay_apply(tx, plugins, &mut fb)
            } else {
                // Fork blocks other than the new one were only ever
                // validated block-locally; resolve their staked output now.
                let fb_staked = if fb_id == pb.block.id() {
                    staked
                } else {
                    let (fb_staked, _, _) = stake::resolve_pobs_output(
                        tx,
                        header_cache,
                        &fb.block.parent_id,
                        fb.height
                            .checked_sub(1)
                            .ok_or(StoreError::Corrupt("fork block at genesis height"))?,
                        &fb.block.pobs_output,
                    )?;
                    fb_staked
                };
                diffs::generate_and_apply_diffs(tx, constants, registry, plugins, &mut fb, &fb_staked)
            };
            if let Err(err) = outcome {
                offender = fb_id;
                return Err(err);
            }
            applied.push(fb);
        }

        // The sampled consistency check: revert and re-apply the new tip
        // inside the same transaction and require identical checksums.
        if sample == 0 {
            if let Some(tip) = applied.last_mut() {
                let before = ledger::consensus_checksum(tx)?;
                ledger::commit_diff_set(tx, tip, DiffDirection::Revert)?;
                ledger::commit_diff_set(tx, tip, DiffDirection::Apply)?;
                let after = ledger::consensus_checksum(tx)?;
                if before != after {
                    ledger::set_inconsistent(tx)?;
                    return Err(AcceptError::Store(StoreError::Corrupt(
                        "revert-apply round-trip diverged",
                    )));
                }
            }
        }

        let change_id = changelog::append_change(
            tx,
            reverted.iter().map(|pb| pb.block.id()).collect(),
            applied.iter().map(|pb| pb.block.id()).collect(),
        )?;
        for (name, _) in plugins.iter() {
            if let Some(mut metadata) = crate::plugins::load_plugin_metadata(tx, name)? {
                metadata.last_change_id = change_id;
                crate::plugins::store_plugin_metadata(tx, name, &metadata)?;
            }
        }

        Ok(diffs::consensus_change_from(change_id, &reverted, &applied))
    });
    let change = match result {
        Ok(change) => change,
        Err(err) => return Err((err, offender)),
    };

    if !change.reverted_blocks.is_empty() {
        warn!(
            reverted = change.reverted_blocks.len(),
            applied = change.applied_blocks.len(),
            "chain reorganization"
        );
        metrics::counter!("consensus.reorg.count", 1);
    }
    Ok(change)
}
