//! Block headers.

use canonical_serde_derive::{CanonDeserialize, CanonSerialize};

use super::BlockStakeOutputIndexes;
use crate::serialization::{
    blake2b, CanonicalDeserialize, CanonicalSerialize, SerializationError,
};
use crate::{BlockId, Timestamp};

/// A block header, containing metadata about a block.
///
/// Blocks are chained together via the backwards reference (parent id)
/// present in the header; the Merkle root binds the header to the block's
/// miner payouts and transactions, so the header hash identifies the entire
/// block contents.
#[derive(Copy, Clone, Debug, Eq, PartialEq, CanonSerialize, CanonDeserialize)]
pub struct Header {
    /// The id of the parent block.
    pub parent_id: BlockId,
    /// The unspent blockstake output the block stakes on.
    pub pobs_output: BlockStakeOutputIndexes,
    /// The block timestamp in Unix seconds.
    pub timestamp: Timestamp,
    /// The root of the Merkle tree over the block's miner payouts and
    /// transaction ids.
    pub merkle_root: [u8; 32],
}

impl Header {
    /// Compute the id of the block this header belongs to.
    pub fn id(&self) -> BlockId {
        BlockId(blake2b::hash_object(self))
    }
}
