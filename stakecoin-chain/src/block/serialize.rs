//! Canonical serialization of blocks.

use std::io;

use super::{Block, BlockStakeOutputIndexes};
use crate::cached::Cached;
use crate::serialization::{CanonicalDeserialize, CanonicalSerialize, SerializationError};
use crate::Timestamp;

/// Hard cap on the size of a single block, to protect decoders against DOS
/// payloads. The per-network block size limit is enforced separately by the
/// block validator and is at most this large.
pub const MAX_BLOCK_BYTES: u64 = 2_000_000;

impl CanonicalSerialize for Block {
    fn canonical_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.parent_id.canonical_serialize(&mut target)?;
        self.timestamp.canonical_serialize(&mut target)?;
        self.pobs_output.canonical_serialize(&mut target)?;
        self.miner_payouts.canonical_serialize(&mut target)?;
        self.transactions.canonical_serialize(&mut target)
    }
}

/// Deserializes a block, calculating and caching its id.
impl CanonicalDeserialize for Block {
    fn canonical_deserialize<R: io::Read>(src: R) -> Result<Self, SerializationError> {
        let mut src = src.take(MAX_BLOCK_BYTES);
        let parent_id = crate::BlockId::canonical_deserialize(&mut src)?;
        let timestamp = Timestamp::canonical_deserialize(&mut src)?;
        let pobs_output = BlockStakeOutputIndexes::canonical_deserialize(&mut src)?;
        let miner_payouts = Vec::canonical_deserialize(&mut src)?;
        let transactions = Vec::canonical_deserialize(&mut src)?;
        let mut block = Block {
            parent_id,
            timestamp,
            pobs_output,
            miner_payouts,
            transactions,
            id: Cached::new(),
        };
        // Calculate and cache the id.
        block.cache_id();
        Ok(block)
    }
}
