//! Coin and blockstake outputs, and the inputs that spend them.
//!
//! The two output kinds share a shape but live in distinct namespaces: a
//! coin output id can never collide with a blockstake output id, because the
//! ids are derived under different specifiers.

use canonical_serde_derive::{CanonDeserialize, CanonSerialize};

use crate::conditions::{Condition, Fulfillment};
use crate::serialization::{CanonicalDeserialize, CanonicalSerialize, SerializationError};
use crate::{BlockStakeOutputId, CoinOutputId, Currency};

/// An unspent amount of coins, locked by a condition.
///
/// The coins you "own" are the subset of unspent coin outputs whose
/// conditions you can fulfill; an output is indivisible and can only be
/// consumed in its entirety, with change returned through a new output.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, CanonSerialize, CanonDeserialize)]
pub struct CoinOutput {
    /// The amount of coins. Zero-valued outputs are rejected by validation.
    pub value: Currency,
    /// The condition under which this output can be spent.
    pub condition: Condition,
}

/// An unspent amount of blockstakes; the scarce resource that backs block
/// creation. Same shape as [`CoinOutput`], distinct namespace.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, CanonSerialize, CanonDeserialize)]
pub struct BlockStakeOutput {
    pub value: Currency,
    pub condition: Condition,
}

/// A reference to an unspent coin output, plus the proof allowing it to be
/// spent.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, CanonSerialize, CanonDeserialize)]
pub struct CoinInput {
    /// The id of the unspent coin output being consumed.
    pub parent_id: CoinOutputId,
    /// The fulfillment of the parent output's condition.
    pub fulfillment: Fulfillment,
}

/// The blockstake analogue of [`CoinInput`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, CanonSerialize, CanonDeserialize)]
pub struct BlockStakeInput {
    pub parent_id: BlockStakeOutputId,
    pub fulfillment: Fulfillment,
}
