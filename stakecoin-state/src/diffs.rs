//! Per-block ledger diffs.
//!
//! Applying a block produces a set of diffs; reverting it replays the same
//! set with the opposite commit direction. A diff's own direction records
//! what applying the block does: `Apply` diffs add an entry to their bucket,
//! `Revert` diffs remove one (a spent output). Committing a diff set in the
//! `Revert` direction inverts both, which is what makes
//! `revert(apply(diffs))` the identity on the ledger.

use canonical_serde_derive::{CanonDeserialize, CanonSerialize};

use stakecoin_chain::block::Height;
use stakecoin_chain::outputs::{BlockStakeOutput, CoinOutput};
use stakecoin_chain::transaction::TransactionShortId;
use stakecoin_chain::{
    BlockStakeOutputId, CanonicalDeserialize, CanonicalSerialize, CoinOutputId,
    SerializationError, TransactionId,
};

/// The direction a diff set is committed in.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, CanonSerialize, CanonDeserialize,
)]
pub enum DiffDirection {
    Apply,
    Revert,
}

impl DiffDirection {
    pub fn inverse(self) -> DiffDirection {
        match self {
            DiffDirection::Apply => DiffDirection::Revert,
            DiffDirection::Revert => DiffDirection::Apply,
        }
    }
}

/// The creation (`Apply`) or consumption (`Revert`) of a coin output.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, CanonSerialize, CanonDeserialize)]
pub struct CoinOutputDiff {
    pub direction: DiffDirection,
    pub id: CoinOutputId,
    /// The full output, so a revert can restore what a spend removed.
    pub coin_output: CoinOutput,
}

/// The blockstake analogue of [`CoinOutputDiff`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, CanonSerialize, CanonDeserialize)]
pub struct BlockStakeOutputDiff {
    pub direction: DiffDirection,
    pub id: BlockStakeOutputId,
    pub blockstake_output: BlockStakeOutput,
}

/// The scheduling (`Apply`) or maturation (`Revert`) of a delayed coin
/// output in the bucket of its maturity height.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, CanonSerialize, CanonDeserialize)]
pub struct DelayedCoinOutputDiff {
    pub direction: DiffDirection,
    pub id: CoinOutputId,
    pub coin_output: CoinOutput,
    pub maturity_height: Height,
}

/// The registration of a transaction's compact reference in the current
/// chain.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, CanonSerialize, CanonDeserialize)]
pub struct TransactionIdDiff {
    pub direction: DiffDirection,
    pub id: TransactionId,
    pub short_id: TransactionShortId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakecoin_chain::conditions::Condition;
    use stakecoin_chain::{CanonicalDeserializeInto, Currency};

    #[test]
    fn direction_inverts() {
        assert_eq!(DiffDirection::Apply.inverse(), DiffDirection::Revert);
        assert_eq!(DiffDirection::Revert.inverse(), DiffDirection::Apply);
    }

    #[test]
    fn direction_encodes_as_its_variant_tag() {
        assert_eq!(
            DiffDirection::Apply.canonical_serialize_to_vec().unwrap(),
            vec![0]
        );
        assert_eq!(
            DiffDirection::Revert.canonical_serialize_to_vec().unwrap(),
            vec![1]
        );
        // An unknown tag is a parse error, not a fallback.
        assert!([9u8]
            .as_ref()
            .canonical_deserialize_into::<DiffDirection>()
            .is_err());
    }

    #[test]
    fn diff_binary_roundtrip() {
        let diff = CoinOutputDiff {
            direction: DiffDirection::Revert,
            id: CoinOutputId([3; 32]),
            coin_output: CoinOutput {
                value: Currency::from(77),
                condition: Condition::Nil,
            },
        };
        let bytes = diff.canonical_serialize_to_vec().unwrap();
        let decoded: CoinOutputDiff = bytes.as_slice().canonical_deserialize_into().unwrap();
        assert_eq!(decoded, diff);
    }
}
