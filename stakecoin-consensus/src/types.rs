//! Types shared across the consensus surface: consensus changes, the
//! subscriber interface, and the prepared block and transaction forms passed
//! to validators and plugins.

use std::collections::HashMap;
use std::{fmt, io, str::FromStr};

use stakecoin_chain::block::{Block, Height};
use stakecoin_chain::outputs::{BlockStakeOutput, CoinOutput};
use stakecoin_chain::transaction::Transaction;
use stakecoin_chain::{
    BlockStakeOutputId, CanonicalDeserialize, CanonicalSerialize, CoinOutputId,
    SerializationError, Timestamp,
};
use stakecoin_state::diffs::{
    BlockStakeOutputDiff, CoinOutputDiff, DelayedCoinOutputDiff, TransactionIdDiff,
};

/// Identifies one committed consensus change in the persistent change log.
///
/// The zero id is the sentinel [`CONSENSUS_CHANGE_BEGINNING`]: subscribing at
/// it replays every change from genesis.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ConsensusChangeId(pub [u8; 32]);

/// Subscribe from the start of the chain.
pub const CONSENSUS_CHANGE_BEGINNING: ConsensusChangeId = ConsensusChangeId([0u8; 32]);

impl ConsensusChangeId {
    pub fn is_beginning(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ConsensusChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for ConsensusChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConsensusChangeId")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl FromStr for ConsensusChangeId {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes[..])
            .map_err(|_| SerializationError::Parse("hex decoding error"))?;
        Ok(ConsensusChangeId(bytes))
    }
}

impl CanonicalSerialize for ConsensusChangeId {
    fn canonical_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_all(&self.0)
    }
}

impl CanonicalDeserialize for ConsensusChangeId {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(ConsensusChangeId(<[u8; 32]>::canonical_deserialize(
            &mut reader,
        )?))
    }
}

/// The delta between two consensus states.
///
/// The diff vectors are ordered so that committing every diff in the apply
/// direction transforms the pre-change ledger into the post-change ledger:
/// first the reverted blocks' diffs, inverted and in reverse block order,
/// then the applied blocks' diffs as generated.
#[derive(Clone, Debug, Default)]
pub struct ConsensusChange {
    pub id: ConsensusChangeId,
    /// Blocks disconnected from the chain, former tip first.
    pub reverted_blocks: Vec<Block>,
    /// Blocks connected to the chain, in chain order.
    pub applied_blocks: Vec<Block>,
    pub coin_output_diffs: Vec<CoinOutputDiff>,
    pub blockstake_output_diffs: Vec<BlockStakeOutputDiff>,
    pub delayed_coin_output_diffs: Vec<DelayedCoinOutputDiff>,
    pub transaction_id_diffs: Vec<TransactionIdDiff>,
}

impl Default for ConsensusChangeId {
    fn default() -> Self {
        CONSENSUS_CHANGE_BEGINNING
    }
}

/// Receives consensus changes, in the exact order the consensus set commits
/// them.
pub trait ConsensusSetSubscriber: Send + Sync {
    fn process_consensus_change(&self, change: &ConsensusChange);
}

/// A block enriched with the outputs its transactions consumed, so plugins
/// and catch-up replay never have to query reverted ledger state.
#[derive(Clone, Debug)]
pub struct ConsensusBlock {
    pub block: Block,
    pub height: Height,
    pub spent_coin_outputs: HashMap<CoinOutputId, CoinOutput>,
    pub spent_blockstake_outputs: HashMap<BlockStakeOutputId, BlockStakeOutput>,
}

impl ConsensusBlock {
    /// The prepared form of the transaction at `index`.
    pub fn consensus_transaction(&self, index: usize) -> Option<ConsensusTransaction> {
        let transaction = self.block.transactions.get(index)?.clone();
        Some(ConsensusTransaction {
            spent_coin_outputs: transaction
                .coin_inputs
                .iter()
                .filter_map(|input| {
                    self.spent_coin_outputs
                        .get(&input.parent_id)
                        .map(|output| (input.parent_id, output.clone()))
                })
                .collect(),
            spent_blockstake_outputs: transaction
                .blockstake_inputs
                .iter()
                .filter_map(|input| {
                    self.spent_blockstake_outputs
                        .get(&input.parent_id)
                        .map(|output| (input.parent_id, output.clone()))
                })
                .collect(),
            transaction,
            block_height: self.height,
            block_timestamp: self.block.timestamp,
            sequence_index: index as u16,
        })
    }
}

/// A transaction prepared for validation: the outputs its inputs spend are
/// pre-loaded, so validators stay pure functions over this value.
#[derive(Clone, Debug)]
pub struct ConsensusTransaction {
    pub transaction: Transaction,
    pub block_height: Height,
    pub block_timestamp: Timestamp,
    /// The transaction's index inside its block.
    pub sequence_index: u16,
    pub spent_coin_outputs: HashMap<CoinOutputId, CoinOutput>,
    pub spent_blockstake_outputs: HashMap<BlockStakeOutputId, BlockStakeOutput>,
}

/// Block-level facts a transaction is validated under.
#[derive(Copy, Clone, Debug)]
pub struct TransactionContext {
    pub block_height: Height,
    pub block_timestamp: Timestamp,
    /// Whether this transaction is the block-creating transaction of its
    /// block; such a transaction is exempt from the miner-fee minimum.
    pub block_creating: bool,
}
