//! Durable state for the stakecoin consensus set: a transactional bucket
//! store over [`sled`], the UTXO ledger buckets, and the per-block diff
//! model that moves the ledger forward and backward across forks.

#[macro_use]
extern crate serde;

mod config;
mod error;

pub mod diffs;
pub mod ledger;
pub mod processed;
pub mod store;

pub use config::Config;
pub use error::StoreError;

pub use diffs::{
    BlockStakeOutputDiff, CoinOutputDiff, DelayedCoinOutputDiff, DiffDirection, TransactionIdDiff,
};
pub use processed::ProcessedBlock;
pub use store::{BucketRef, BucketStore, BucketView, Cursor, ReadTx, WriteTx};
