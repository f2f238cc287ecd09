//! The persisted form of a block.

use canonical_serde_derive::{CanonDeserialize, CanonSerialize};

use std::collections::HashMap;

use stakecoin_chain::block::{Block, Height};
use stakecoin_chain::outputs::{BlockStakeOutput, CoinOutput};
use stakecoin_chain::{
    BlockStakeOutputId, CanonicalDeserialize, CanonicalSerialize, CoinOutputId, Difficulty,
    SerializationError, Target,
};

use crate::diffs::{
    BlockStakeOutputDiff, CoinOutputDiff, DelayedCoinOutputDiff, DiffDirection, TransactionIdDiff,
};

/// A block together with everything the consensus set derived from it: its
/// position, its child target, and the diffs applying it produces.
///
/// Processed blocks are persisted in the block map and never exposed through
/// the public interface. An entry is created on first sight, mutated only to
/// record generated diffs and the consensus checksum, and never deleted;
/// blocks of abandoned forks keep their entries so a later reorganization
/// can replay them.
#[derive(Clone, Debug, Eq, PartialEq, CanonSerialize, CanonDeserialize)]
pub struct ProcessedBlock {
    pub block: Block,
    pub height: Height,
    /// Cumulative difficulty from genesis through this block.
    pub depth: Difficulty,
    /// The target any child of this block must meet.
    pub child_target: Target,
    /// Whether the diff vectors below have been generated yet. Diffs exist
    /// only for blocks that have been applied at least once.
    pub diffs_generated: bool,
    pub coin_output_diffs: Vec<CoinOutputDiff>,
    pub blockstake_output_diffs: Vec<BlockStakeOutputDiff>,
    pub delayed_coin_output_diffs: Vec<DelayedCoinOutputDiff>,
    pub transaction_id_diffs: Vec<TransactionIdDiff>,
    /// The ledger checksum after this block was applied, once computed.
    pub consensus_checksum: Option<[u8; 32]>,
}

impl ProcessedBlock {
    /// The coin outputs this block's transactions consumed, keyed by id.
    /// Populated only once diffs are generated.
    pub fn spent_coin_outputs(&self) -> HashMap<CoinOutputId, CoinOutput> {
        self.coin_output_diffs
            .iter()
            .filter(|diff| diff.direction == DiffDirection::Revert)
            .map(|diff| (diff.id, diff.coin_output.clone()))
            .collect()
    }

    /// The blockstake outputs this block's transactions consumed.
    pub fn spent_blockstake_outputs(&self) -> HashMap<BlockStakeOutputId, BlockStakeOutput> {
        self.blockstake_output_diffs
            .iter()
            .filter(|diff| diff.direction == DiffDirection::Revert)
            .map(|diff| (diff.id, diff.blockstake_output.clone()))
            .collect()
    }

    /// Forget generated diffs, as if the block had only ever been seen.
    /// Used when a forward apply fails mid-reorganization.
    pub fn clear_diffs(&mut self) {
        self.diffs_generated = false;
        self.coin_output_diffs.clear();
        self.blockstake_output_diffs.clear();
        self.delayed_coin_output_diffs.clear();
        self.transaction_id_diffs.clear();
        self.consensus_checksum = None;
    }
}
