//! Fork traversal and reorganization.

use tracing::info;

use stakecoin_state::{ledger, BucketView, ProcessedBlock, StoreError, WriteTx};

use super::diffs::{self, PluginMap};
use crate::error::AcceptError;

/// Walks ancestrally from `pb` until the current block path is reached,
/// returning the off-path chain in ancestor-first order (ending with `pb`
/// itself). An empty prefix means `pb`'s parent is the current tip.
///
/// The returned blocks are the ones a reorganization must forward-apply;
/// the common parent is the block at `chain[0].height - 1` on the current
/// path.
pub(crate) fn backtrack_to_current_path<V: BucketView + ?Sized>(
    view: &V,
    pb: &ProcessedBlock,
) -> Result<Vec<ProcessedBlock>, AcceptError> {
    let mut chain = vec![pb.clone()];
    loop {
        let current = chain.last().expect("chain starts non-empty");
        if ledger::block_path_id(view, current.height)? == Some(current.block.id()) {
            // Reached the path; this block is already applied.
            chain.pop();
            break;
        }
        if current.height.0 == 0 {
            break;
        }
        match ledger::processed_block(view, &current.block.parent_id)? {
            Some(parent) => {
                let on_path =
                    ledger::block_path_id(view, parent.height)? == Some(parent.block.id());
                chain.push(parent);
                if on_path {
                    // The parent is the common parent; drop it from the
                    // forward-apply list.
                    chain.pop();
                    break;
                }
            }
            None => {
                return Err(AcceptError::Store(StoreError::Corrupt(
                    "fork block has no stored parent",
                )))
            }
        }
    }
    chain.reverse();
    Ok(chain)
}

/// Reverts every block from the current tip down to (not including)
/// `common_height`, returning the reverted blocks, former tip first.
pub(crate) fn revert_to_height(
    tx: &mut WriteTx<'_>,
    plugins: &PluginMap,
    common_height: stakecoin_chain::block::Height,
) -> Result<Vec<ProcessedBlock>, AcceptError> {
    let mut reverted = Vec::new();
    loop {
        let tip_height = ledger::block_height(tx)?
            .ok_or(StoreError::Corrupt("store has no tip height"))?;
        if tip_height <= common_height {
            break;
        }
        let tip_id = ledger::block_path_id(tx, tip_height)?
            .ok_or(StoreError::Corrupt("tip height has no path entry"))?;
        let pb = ledger::processed_block(tx, &tip_id)?
            .ok_or(StoreError::Corrupt("tip block is not in the block map"))?;
        diffs::revert_block(tx, plugins, &pb)?;
        reverted.push(pb);
    }
    if !reverted.is_empty() {
        info!(
            count = reverted.len(),
            to_height = %common_height,
            "reverted blocks for reorganization"
        );
        metrics::counter!("consensus.reorg.reverted.blocks", reverted.len() as u64);
    }
    Ok(reverted)
}
