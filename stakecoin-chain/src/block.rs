//! Blocks and block-related structures (heights, headers, payouts).
#![allow(clippy::unit_arg)]

mod header;
mod height;
mod serialize;

pub use header::Header;
pub use height::Height;
pub use serialize::MAX_BLOCK_BYTES;

use std::fmt;

use canonical_serde_derive::{CanonDeserialize, CanonSerialize};

use crate::cached::Cached;
use crate::conditions::UnlockHash;
use crate::fmt::DisplayToDebug;
use crate::merkle::MerkleTree;
use crate::serialization::{
    blake2b, CanonicalDeserialize, CanonicalSerialize, SerializationError,
};
use crate::transaction::Transaction;
use crate::{BlockId, CoinOutputId, Currency, Specifier, Timestamp};

/// Namespace tag for the delayed coin outputs created by miner payouts.
pub const SPECIFIER_MINER_PAYOUT: Specifier = Specifier::new(*b"miner payout\0\0\0\0");

/// The in-chain coordinates of the unspent blockstake output a block stakes
/// on: the height of the block that created it, the index of the creating
/// transaction in that block, and the output's index in that transaction.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    CanonSerialize,
    CanonDeserialize,
)]
pub struct BlockStakeOutputIndexes {
    pub block_height: Height,
    pub transaction_index: u64,
    pub output_index: u64,
}

/// A payout created by a block: the block creator fee and collected miner
/// fees, paid to an address. Payouts mature into spendable coin outputs only
/// after the chain's maturity delay.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, CanonSerialize, CanonDeserialize)]
pub struct MinerPayout {
    pub value: Currency,
    pub unlock_hash: UnlockHash,
}

/// A stakecoin block, containing the proof-of-blockstake reference, miner
/// payouts, and a list of transactions.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// The id of the parent block, linking this block into a chain back to
    /// the genesis block.
    pub parent_id: BlockId,
    /// The creation time claimed by the block creator.
    pub timestamp: Timestamp,
    /// The unspent blockstake output this block stakes on.
    pub pobs_output: BlockStakeOutputIndexes,
    /// The payouts collected by the block creator.
    pub miner_payouts: Vec<MinerPayout>,
    /// The block transactions.
    pub transactions: Vec<Transaction>,
    /// For efficiency, we cache the id of this block after computing it the
    /// first time. This field is not part of the consensus serialization.
    #[serde(skip)]
    id: Cached<BlockId>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("id", &DisplayToDebug(self.id()))
            .field("parent", &DisplayToDebug(self.parent_id))
            .field("timestamp", &DisplayToDebug(self.timestamp))
            .finish()
    }
}

impl Block {
    pub fn new(
        parent_id: BlockId,
        timestamp: Timestamp,
        pobs_output: BlockStakeOutputIndexes,
        miner_payouts: Vec<MinerPayout>,
        transactions: Vec<Transaction>,
    ) -> Block {
        Block {
            parent_id,
            timestamp,
            pobs_output,
            miner_payouts,
            transactions,
            id: Cached::new(),
        }
    }

    /// The header binding this block's contents.
    pub fn header(&self) -> Header {
        Header {
            parent_id: self.parent_id,
            pobs_output: self.pobs_output,
            timestamp: self.timestamp,
            merkle_root: self.merkle_root(),
        }
    }

    /// Compute the id of this block: the hash of its header.
    pub fn id(&self) -> BlockId {
        if let Some(id) = self.id.value() {
            return id;
        }
        self.header().id()
    }

    pub(crate) fn cache_id(&mut self) {
        let id = self.id();
        self.id = Cached::from(id);
    }

    /// The root over the miner payouts followed by the transaction ids, in
    /// declaration order.
    pub fn merkle_root(&self) -> [u8; 32] {
        let mut tree = MerkleTree::new();
        for payout in &self.miner_payouts {
            let bytes = payout
                .canonical_serialize_to_vec()
                .expect("serializing to a vec is infallible");
            tree.push(&bytes);
        }
        for transaction in &self.transactions {
            tree.push(transaction.id().as_bytes());
        }
        tree.root()
    }

    /// The id of the delayed coin output created by the miner payout at
    /// `index`.
    pub fn miner_payout_id(&self, index: u64) -> CoinOutputId {
        use std::io::Write;

        let mut writer = blake2b::Writer::default();
        writer
            .write_all(SPECIFIER_MINER_PAYOUT.as_bytes())
            .expect("Blake2b writer is infallible");
        self.id()
            .canonical_serialize(&mut writer)
            .expect("Blake2b writer is infallible");
        index
            .canonical_serialize(&mut writer)
            .expect("Blake2b writer is infallible");
        CoinOutputId(writer.finish())
    }

    /// The sum of the miner fees of every transaction in the block.
    pub fn total_miner_fees(&self) -> Option<Currency> {
        let mut total = Currency::zero();
        for transaction in &self.transactions {
            total = total.checked_add(&transaction.total_miner_fees()?)?;
        }
        Some(total)
    }

    /// Returns the serialized length (in bytes) of this block.
    pub fn binary_size(&self) -> usize {
        self.canonical_serialize_to_vec()
            .expect("serializing to a vec is infallible")
            .len()
    }
}

#[cfg(test)]
mod tests;
