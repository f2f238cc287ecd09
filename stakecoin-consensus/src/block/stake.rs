//! The proof-of-blockstake validity rules: the stake modifier, the
//! stake-weighted target check, the respend rule, and the child-target
//! adjustment.
//!
//! Everything here walks the *candidate block's own ancestry*: a candidate
//! may extend an inactive fork, so the active block path can never be
//! consulted while judging it.

use primitive_types::U256;
use sha2::{Digest, Sha256};

use stakecoin_chain::block::{Block, BlockStakeOutputIndexes, Height};
use stakecoin_chain::outputs::BlockStakeOutput;
use stakecoin_chain::parameters::ChainConstants;
use stakecoin_chain::blake2b;
use stakecoin_chain::{
    BlockId, BlockStakeOutputId, CanonicalSerialize, Currency, Target, Timestamp,
};
use stakecoin_state::{ledger, BucketView, ProcessedBlock};

use super::check::header_info;
use crate::cache::HeaderCache;
use crate::error::BlockError;

/// The number of bits (and ancestor block ids) a stake modifier draws from.
pub const STAKE_MODIFIER_BITS: usize = 256;

fn bit_of(bytes: &[u8; 32], index: usize) -> bool {
    (bytes[index / 8] >> (index % 8)) & 1 == 1
}

/// A synthetic block id standing in for heights below genesis.
fn genesis_filler(height: i64) -> [u8; 32] {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&Sha256::digest(format!("genesis{}", height).as_bytes()));
    digest
}

/// The 256-bit stake modifier for a candidate block at `candidate_height`
/// whose parent is `parent_id`.
///
/// Bit `i` equals bit `i` of the block id at height
/// `candidate_height - stake_modifier_delay - i` along the candidate's own
/// ancestry; heights below genesis substitute a hash of their (negative)
/// height.
pub fn stake_modifier<V: BucketView + ?Sized>(
    view: &V,
    cache: &HeaderCache,
    constants: &ChainConstants,
    candidate_height: Height,
    parent_id: &BlockId,
) -> Result<[u8; 32], BlockError> {
    let delay = constants.stake_modifier_delay as i64;
    let top = candidate_height.0 as i64 - delay;
    let bottom = top - (STAKE_MODIFIER_BITS as i64 - 1);

    // Walk the ancestry once, recording the ids inside the window.
    let mut ids_by_height = std::collections::HashMap::new();
    if top >= 0 {
        let mut cursor = *parent_id;
        let mut cursor_height = candidate_height.0 as i64 - 1;
        while cursor_height >= 0 && cursor_height >= bottom {
            if cursor_height <= top {
                ids_by_height.insert(cursor_height, cursor.0);
            }
            match header_info(view, cache, &cursor)? {
                Some((parent, _)) => cursor = parent,
                None => return Err(BlockError::UnknownBlockStakeOutput),
            }
            cursor_height -= 1;
        }
    }

    let mut modifier = [0u8; 32];
    for i in 0..STAKE_MODIFIER_BITS {
        let height = top - i as i64;
        let source = if height < 0 {
            genesis_filler(height)
        } else {
            match ids_by_height.get(&height) {
                Some(id) => *id,
                None => return Err(BlockError::UnknownBlockStakeOutput),
            }
        };
        if bit_of(&source, i) {
            modifier[i / 8] |= 1 << (i % 8);
        }
    }
    Ok(modifier)
}

/// Returns `Ok(())` if the stake-weighted hash of the candidate beats the
/// parent's child target:
/// `blake2b(modifier ‖ pobs reference ‖ timestamp) / stake_value < target`.
pub fn block_is_solved(
    modifier: &[u8; 32],
    pobs_output: &BlockStakeOutputIndexes,
    timestamp: Timestamp,
    stake_value: &Currency,
    child_target: &Target,
) -> Result<(), BlockError> {
    if stake_value.is_zero() {
        return Err(BlockError::BlockUnsolved);
    }
    let mut writer = blake2b::Writer::default();
    {
        use std::io::Write;
        writer
            .write_all(modifier)
            .expect("Blake2b writer is infallible");
    }
    pobs_output
        .canonical_serialize(&mut writer)
        .expect("Blake2b writer is infallible");
    timestamp
        .canonical_serialize(&mut writer)
        .expect("Blake2b writer is infallible");
    let hash = U256::from_big_endian(&writer.finish());
    let weighted = hash / stake_value.as_u256();
    if weighted < child_target.as_u256() {
        Ok(())
    } else {
        Err(BlockError::BlockUnsolved)
    }
}

/// Resolves the candidate's staked blockstake output along the candidate's
/// own ancestry, returning its id, the output, and the timestamp of the
/// block that created it.
pub fn resolve_pobs_output<V: BucketView + ?Sized>(
    view: &V,
    cache: &HeaderCache,
    parent_id: &BlockId,
    parent_height: Height,
    indexes: &BlockStakeOutputIndexes,
) -> Result<(BlockStakeOutputId, BlockStakeOutput, Timestamp), BlockError> {
    if indexes.block_height > parent_height {
        return Err(BlockError::UnknownBlockStakeOutput);
    }
    let mut cursor = *parent_id;
    let mut cursor_height = parent_height;
    while cursor_height > indexes.block_height {
        match header_info(view, cache, &cursor)? {
            Some((parent, _)) => cursor = parent,
            None => return Err(BlockError::UnknownBlockStakeOutput),
        }
        cursor_height = match cursor_height.checked_sub(1) {
            Some(height) => height,
            None => return Err(BlockError::UnknownBlockStakeOutput),
        };
    }
    let pb = ledger::processed_block(view, &cursor)?
        .ok_or(BlockError::UnknownBlockStakeOutput)?;
    let transaction = pb
        .block
        .transactions
        .get(indexes.transaction_index as usize)
        .ok_or(BlockError::UnknownBlockStakeOutput)?;
    let output = transaction
        .blockstake_outputs
        .get(indexes.output_index as usize)
        .ok_or(BlockError::UnknownBlockStakeOutput)?
        .clone();
    let id = transaction.blockstake_output_id(indexes.output_index);
    Ok((id, output, pb.block.timestamp))
}

/// Returns `Ok(())` if exactly one blockstake input across the block's
/// transactions respends the staked output.
pub fn blockstake_is_respent(block: &Block, staked: &BlockStakeOutputId) -> Result<(), BlockError> {
    let spends = block
        .transactions
        .iter()
        .flat_map(|tx| tx.blockstake_inputs.iter())
        .filter(|input| input.parent_id == *staked)
        .count();
    if spends == 1 {
        Ok(())
    } else {
        Err(BlockError::BlockStakeNotRespent)
    }
}

/// Returns `Ok(())` if the staked output has aged enough. Outputs at index
/// `(0, 0)` of their block (the respend chain of a block creator) are
/// exempt.
pub fn blockstake_age_is_met(
    indexes: &BlockStakeOutputIndexes,
    parent_timestamp: Timestamp,
    block_timestamp: Timestamp,
    constants: &ChainConstants,
) -> Result<(), BlockError> {
    if indexes.transaction_index == 0 && indexes.output_index == 0 {
        return Ok(());
    }
    if parent_timestamp + constants.blockstake_aging_secs <= block_timestamp {
        Ok(())
    } else {
        Err(BlockError::BlockStakeAgeNotMet)
    }
}

/// Finds the transaction in `block` that creates the block: exactly one
/// blockstake input (spending the staked output) and one blockstake output,
/// no coin movement. Returns its index, if present.
pub fn block_creating_transaction_index(
    block: &Block,
    staked: &BlockStakeOutputId,
) -> Option<usize> {
    block.transactions.iter().position(|tx| {
        tx.blockstake_inputs.len() == 1
            && tx.blockstake_outputs.len() == 1
            && tx.coin_inputs.is_empty()
            && tx.coin_outputs.is_empty()
            && tx.blockstake_inputs[0].parent_id == *staked
    })
}

/// The child target of a block at `height` whose parent is `parent`.
///
/// Adjusted every `target_window / 2` blocks: the parent target is scaled
/// by the ratio of observed to expected time over the trailing window,
/// clamped to the chain's adjustment bounds.
pub fn new_child_target<V: BucketView + ?Sized>(
    view: &V,
    cache: &HeaderCache,
    constants: &ChainConstants,
    height: Height,
    parent: &ProcessedBlock,
    block_timestamp: Timestamp,
) -> Result<Target, BlockError> {
    let half_window = (constants.target_window / 2).max(1);
    if height.0 % half_window != 0 {
        return Ok(parent.child_target);
    }
    let window = constants.target_window.min(height.0);
    if window == 0 {
        return Ok(parent.child_target);
    }

    // The ancestor `window` blocks behind the candidate.
    let mut cursor = parent.block.id();
    for _ in 0..window - 1 {
        match header_info(view, cache, &cursor)? {
            Some((parent_id, _)) => cursor = parent_id,
            None => return Ok(parent.child_target),
        }
    }
    let ancestor_timestamp = match header_info(view, cache, &cursor)? {
        Some((_, timestamp)) => timestamp,
        None => return Ok(parent.child_target),
    };

    let time_passed = block_timestamp.0.saturating_sub(ancestor_timestamp.0).max(1);
    let expected = constants.block_frequency_secs * window;

    let (up_num, up_den) = constants.max_adjustment_up;
    let (down_num, down_den) = constants.max_adjustment_down;
    let (num, den) = if time_passed * up_den > expected * up_num {
        (up_num, up_den)
    } else if time_passed * down_den < expected * down_num {
        (down_num, down_den)
    } else {
        (time_passed, expected)
    };
    Ok(parent.child_target.mul_ratio(num, den))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakecoin_chain::parameters::Network;

    #[test]
    fn genesis_filler_is_deterministic_per_height() {
        assert_eq!(genesis_filler(-1), genesis_filler(-1));
        assert_ne!(genesis_filler(-1), genesis_filler(-2));
    }

    #[test]
    fn solved_under_max_target_with_stake() {
        let constants = Network::Devnet.constants();
        let modifier = [0u8; 32];
        let indexes = BlockStakeOutputIndexes::default();
        assert!(block_is_solved(
            &modifier,
            &indexes,
            Timestamp(1_600_000_000),
            &Currency::from(3000),
            &constants.root_target,
        )
        .is_ok());
    }

    #[test]
    fn zero_stake_never_solves() {
        assert!(matches!(
            block_is_solved(
                &[0u8; 32],
                &BlockStakeOutputIndexes::default(),
                Timestamp(1_600_000_000),
                &Currency::zero(),
                &Target::MAX,
            ),
            Err(BlockError::BlockUnsolved)
        ));
    }

    #[test]
    fn aging_exempts_the_zero_index() {
        let constants = Network::Devnet.constants();
        let at_origin = BlockStakeOutputIndexes::default();
        assert!(blockstake_age_is_met(
            &at_origin,
            Timestamp(1000),
            Timestamp(1000),
            &constants
        )
        .is_ok());
        let elsewhere = BlockStakeOutputIndexes {
            block_height: Height(0),
            transaction_index: 0,
            output_index: 1,
        };
        assert!(matches!(
            blockstake_age_is_met(&elsewhere, Timestamp(1000), Timestamp(1000), &constants),
            Err(BlockError::BlockStakeAgeNotMet)
        ));
        assert!(blockstake_age_is_met(
            &elsewhere,
            Timestamp(1000),
            Timestamp(1000 + constants.blockstake_aging_secs),
            &constants
        )
        .is_ok());
    }
}
