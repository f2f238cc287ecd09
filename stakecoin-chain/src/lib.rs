//! Blockchain data structures, the canonical codec, and chain parameters
//! shared by every other stakecoin crate.
#![allow(clippy::unit_arg)]

#[macro_use]
extern crate serde;

mod cached;
mod fmt;
mod ids;
mod serialization;

pub mod block;
pub mod conditions;
pub mod currency;
pub mod merkle;
pub mod outputs;
pub mod parameters;
pub mod specifier;
pub mod target;
pub mod timestamp;
pub mod transaction;

pub use cached::Cached;
pub use currency::Currency;
pub use fmt::DisplayToDebug;
pub use ids::{BlockId, BlockStakeOutputId, CoinOutputId, SigHash, TransactionId};
pub use serialization::{
    blake2b, hex_serde, CanonicalDeserialize, CanonicalDeserializeInto, CanonicalSerialize,
    SerializationError,
};
pub use specifier::Specifier;
pub use target::{Difficulty, Target};
pub use timestamp::Timestamp;
