//! The consensus error taxonomy.
//!
//! Transaction-level errors abort only the containing transaction set;
//! block-level errors abort only the containing block, rolling its store
//! transaction back. `StoreError::Corrupt` is fatal: the caller marks the
//! store inconsistent and halts.

use thiserror::Error;

use stakecoin_chain::conditions::FulfillError;
use stakecoin_state::StoreError;

/// A block failed validation or could not be connected to the chain.
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("block timestamp is not past the median of its ancestors")]
    EarlyTimestamp,
    #[error("block timestamp is too far in the future; held for retry")]
    FutureTimestamp,
    #[error("block timestamp is in the extreme future")]
    ExtremeFutureTimestamp,
    #[error("block exceeds the size limit")]
    LargeBlock,
    #[error("miner payouts do not equal the allowed payout sum")]
    BadMinerPayouts,
    #[error("stake-weighted header hash does not meet the child target")]
    BlockUnsolved,
    #[error("referenced blockstake output has not aged enough")]
    BlockStakeAgeNotMet,
    #[error("staked blockstake output is not respent by exactly one blockstake input")]
    BlockStakeNotRespent,
    #[error("the staked blockstake output reference does not resolve")]
    UnknownBlockStakeOutput,
    #[error("invalid transaction at index {index}: {source}")]
    Transaction {
        index: usize,
        #[source]
        source: TransactionError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A transaction failed validation.
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("transaction does not fit in a block")]
    DoesNotFit,
    #[error("arbitrary data exceeds the limit")]
    ArbitraryDataTooLarge,
    #[error("zero-valued output")]
    ZeroOutput,
    #[error("zero parent id on an input")]
    ZeroParentId,
    #[error("miner fee is below the chain minimum")]
    TooSmallMinerFee,
    #[error("coin input does not resolve to an unspent coin output")]
    MissingCoinOutput,
    #[error("blockstake input does not resolve to an unspent blockstake output")]
    MissingBlockStakeOutput,
    #[error("coin inputs and outputs are unbalanced")]
    UnbalancedOutputs,
    #[error("an output is spent more than once")]
    DoubleSpend,
    #[error("condition was not fulfilled: {0}")]
    ConditionNotFulfilled(#[from] FulfillError),
    #[error("an address participating in the transfer is not authorized")]
    UnauthorizedAddress,
    #[error("non-standard condition")]
    NonStandardCondition,
    #[error("non-standard fulfillment")]
    NonStandardFulfillment,
    #[error("no controller registered for transaction version {0}")]
    UnknownVersion(u8),
    #[error("invalid extension data: {0}")]
    InvalidExtension(&'static str),
    #[error("arithmetic overflow while summing values")]
    Overflow,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Plugin registration and catch-up failures.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("a plugin with this name is already registered")]
    PluginExists,
    #[error("the plugin name is reserved")]
    PluginNameReserved,
    #[error("the plugin name is empty")]
    PluginNameEmpty,
    #[error("plugin metadata is missing from the store")]
    MissingPluginMetadata,
    #[error("plugin metadata exists for a plugin with no storage")]
    PluginGhostMetadata,
    #[error("unknown consensus change id")]
    InvalidConsensusChangeID,
    #[error("a controller for transaction version {0} is already registered")]
    ControllerExists(u8),
    #[error("plugin failure: {0}")]
    Failure(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The outcome surface of `AcceptBlock` and the other consensus-set entry
/// points.
#[derive(Error, Debug)]
pub enum AcceptError {
    #[error("block is already known")]
    BlockKnown,
    #[error("block was previously rejected")]
    DosBlock,
    #[error("block has an unknown parent")]
    UnknownParent,
    #[error("invalid block: {0}")]
    Block(#[from] BlockError),
    #[error("invalid transaction: {0}")]
    Transaction(#[from] TransactionError),
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),
    #[error("transaction set conflicts with the current consensus state")]
    ConsensusConflict,
    #[error("unknown consensus change id")]
    InvalidConsensusChangeID,
    #[error("operation cancelled")]
    Cancelled,
    #[error("consensus set is shutting down")]
    Shutdown,
    #[error(transparent)]
    Store(#[from] StoreError),
}
