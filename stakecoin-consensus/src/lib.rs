//! The stakecoin consensus core: block acceptance and fork choice over the
//! UTXO ledger, the version-dispatched transaction validation pipeline, the
//! proof-of-blockstake validity rules, and the plugin host.

pub mod block;
pub mod error;
pub mod gateway;
pub mod plugins;
pub mod testutil;
pub mod transaction;
pub mod types;

mod cache;
mod set;
mod threadgroup;

pub use error::{AcceptError, BlockError, PluginError, TransactionError};
pub use set::ConsensusSet;
pub use threadgroup::{CancelToken, ThreadGroup};
pub use transaction::{
    StandardTransferController, TransactionController, TransactionRegistry, TransactionValidator,
};
pub use types::{
    ConsensusBlock, ConsensusChange, ConsensusChangeId, ConsensusSetSubscriber,
    ConsensusTransaction, TransactionContext, CONSENSUS_CHANGE_BEGINNING,
};
