//! The UTXO ledger: bucket layout, typed accessors, and the diff commit
//! protocol.
//!
//! All mutation of these buckets happens inside a single store `update` per
//! block, driven by the consensus set. This module provides the pieces: it
//! never decides *when* to commit a diff set, only *how*.

use canonical_serde_derive::{CanonDeserialize, CanonSerialize};
use lazy_static::lazy_static;
use tracing::trace;

use stakecoin_chain::block::Height;
use stakecoin_chain::merkle::MerkleTree;
use stakecoin_chain::outputs::{BlockStakeOutput, CoinOutput};
use stakecoin_chain::transaction::TransactionShortId;
use stakecoin_chain::{
    BlockId, BlockStakeOutputId, CanonicalDeserialize, CanonicalSerialize, CoinOutputId,
    SerializationError, TransactionId,
};

use crate::diffs::{
    BlockStakeOutputDiff, CoinOutputDiff, DelayedCoinOutputDiff, DiffDirection, TransactionIdDiff,
};
use crate::processed::ProcessedBlock;
use crate::store::{get_object, put_object, BucketRef, BucketStore, BucketView, WriteTx};
use crate::StoreError;

lazy_static! {
    /// Single entry: the current tip height.
    pub static ref BLOCK_HEIGHT: BucketRef = BucketRef::new(b"BlockHeight");
    /// `block id -> encoded ProcessedBlock`, for every block ever seen.
    pub static ref BLOCK_MAP: BucketRef = BucketRef::new(b"BlockMap");
    /// `big-endian height -> block id`, for the current chain only.
    pub static ref BLOCK_PATH: BucketRef = BucketRef::new(b"BlockPath");
    /// `coin output id -> CoinOutput`, the unspent coin outputs.
    pub static ref COIN_OUTPUTS: BucketRef = BucketRef::new(b"CoinOutputs");
    /// `blockstake output id -> BlockStakeOutput`, the unspent blockstakes.
    pub static ref BLOCKSTAKE_OUTPUTS: BucketRef = BucketRef::new(b"BlockStakeOutputs");
    /// `transaction id -> short id`, for transactions in the current chain.
    pub static ref TRANSACTION_ID_MAP: BucketRef = BucketRef::new(b"TransactionIDMap");
    /// Single entry: set when an unrecoverable inconsistency was detected.
    pub static ref CONSISTENCY: BucketRef = BucketRef::new(b"Consistency");
    /// Root of all plugin-owned buckets; the core never writes below it,
    /// except for the reserved metadata bucket.
    pub static ref PLUGINS: BucketRef = BucketRef::new(b"Plugins");
    /// `plugin name -> metadata`, reserved; not a plugin bucket.
    pub static ref PLUGINS_METADATA: BucketRef = PLUGINS.child(b"Metadata");
    /// `big-endian sequence -> change log entry`, see the consensus crate.
    pub static ref CHANGE_LOG: BucketRef = BucketRef::new(b"ChangeLog");
    /// `change id -> big-endian sequence`, the change log's reverse index.
    pub static ref CHANGE_LOG_INDEX: BucketRef = BucketRef::new(b"ChangeLogIndex");
    /// Single entry: the store identification record.
    pub static ref STORE_META: BucketRef = BucketRef::new(b"StoreMeta");
}

const DELAYED_BUCKET_PREFIX: &[u8] = b"dco_";

/// The bucket of delayed coin outputs maturing at `height`, keyed by coin
/// output id.
pub fn delayed_coin_outputs_bucket(height: Height) -> BucketRef {
    let mut name = Vec::with_capacity(DELAYED_BUCKET_PREFIX.len() + 8);
    name.extend_from_slice(DELAYED_BUCKET_PREFIX);
    name.extend_from_slice(&height.big_endian_bytes());
    BucketRef::new(&name)
}

/// A pseudo-bucket spanning every delayed bucket in ascending height order;
/// keys are `big-endian maturity height ++ coin output id`.
fn delayed_bucket_family() -> BucketRef {
    let mut prefix = Vec::with_capacity(1 + DELAYED_BUCKET_PREFIX.len());
    prefix.push((DELAYED_BUCKET_PREFIX.len() + 8) as u8);
    prefix.extend_from_slice(DELAYED_BUCKET_PREFIX);
    BucketRef::from_raw_prefix(prefix)
}

pub const STORE_HEADER: &str = "stakecoin consensus store";
pub const STORE_VERSION: &str = "1.0.0";

/// The identification record of a consensus store.
#[derive(Clone, Debug, Eq, PartialEq, CanonSerialize, CanonDeserialize)]
pub struct StoreMetadata {
    pub header: String,
    pub version: String,
}

/// Writes the identification record into a fresh store, or verifies it in an
/// existing one. A node refuses to start on a mismatched store rather than
/// guess at a migration.
pub fn check_store_metadata(store: &BucketStore) -> Result<(), StoreError> {
    store.update(|tx| {
        match get_object::<StoreMetadata, _>(tx, &STORE_META, b"meta")? {
            None => put_object(
                tx,
                &STORE_META,
                b"meta",
                &StoreMetadata {
                    header: STORE_HEADER.to_string(),
                    version: STORE_VERSION.to_string(),
                },
            ),
            Some(meta) => {
                if meta.header != STORE_HEADER || meta.version != STORE_VERSION {
                    return Err(StoreError::VersionMismatch {
                        found: format!("{} {}", meta.header, meta.version),
                        expected: format!("{} {}", STORE_HEADER, STORE_VERSION),
                    });
                }
                Ok(())
            }
        }
    })
}

pub fn block_height<V: BucketView + ?Sized>(view: &V) -> Result<Option<Height>, StoreError> {
    get_object(view, &BLOCK_HEIGHT, b"height")
}

pub fn set_block_height(tx: &mut WriteTx<'_>, height: Height) -> Result<(), StoreError> {
    put_object(tx, &BLOCK_HEIGHT, b"height", &height)
}

pub fn block_path_id<V: BucketView + ?Sized>(
    view: &V,
    height: Height,
) -> Result<Option<BlockId>, StoreError> {
    get_object(view, &BLOCK_PATH, &height.big_endian_bytes())
}

pub fn processed_block<V: BucketView + ?Sized>(
    view: &V,
    id: &BlockId,
) -> Result<Option<ProcessedBlock>, StoreError> {
    get_object(view, &BLOCK_MAP, id.as_bytes())
}

pub fn put_processed_block(tx: &mut WriteTx<'_>, pb: &ProcessedBlock) -> Result<(), StoreError> {
    put_object(tx, &BLOCK_MAP, pb.block.id().as_bytes(), pb)
}

pub fn coin_output<V: BucketView + ?Sized>(
    view: &V,
    id: &CoinOutputId,
) -> Result<Option<CoinOutput>, StoreError> {
    get_object(view, &COIN_OUTPUTS, id.as_bytes())
}

pub fn blockstake_output<V: BucketView + ?Sized>(
    view: &V,
    id: &BlockStakeOutputId,
) -> Result<Option<BlockStakeOutput>, StoreError> {
    get_object(view, &BLOCKSTAKE_OUTPUTS, id.as_bytes())
}

pub fn transaction_short_id<V: BucketView + ?Sized>(
    view: &V,
    id: &TransactionId,
) -> Result<Option<TransactionShortId>, StoreError> {
    get_object(view, &TRANSACTION_ID_MAP, id.as_bytes())
}

/// Every delayed coin output maturing at `height`, in id order.
pub fn delayed_outputs_at<V: BucketView + ?Sized>(
    view: &V,
    height: Height,
) -> Result<Vec<(CoinOutputId, CoinOutput)>, StoreError> {
    let bucket = delayed_coin_outputs_bucket(height);
    let mut cursor = view.cursor(&bucket)?;
    let mut outputs = Vec::with_capacity(cursor.len());
    while let Some((key, value)) = cursor.next() {
        let id = CoinOutputId::canonical_deserialize(key)?;
        let output = CoinOutput::canonical_deserialize(value)?;
        outputs.push((id, output));
    }
    Ok(outputs)
}

pub fn is_inconsistent<V: BucketView + ?Sized>(view: &V) -> Result<bool, StoreError> {
    Ok(get_object::<bool, _>(view, &CONSISTENCY, b"inconsistent")?.unwrap_or(false))
}

/// Marks the store as damaged. Fatal: the node logs and halts after this.
pub fn set_inconsistent(tx: &mut WriteTx<'_>) -> Result<(), StoreError> {
    put_object(tx, &CONSISTENCY, b"inconsistent", &true)
}

fn commit_entry<T: CanonicalSerialize>(
    tx: &mut WriteTx<'_>,
    bucket: &BucketRef,
    key: &[u8],
    value: &T,
    add: bool,
    exists: bool,
) -> Result<(), StoreError> {
    if add {
        if exists {
            return Err(StoreError::Corrupt("diff adds an entry that already exists"));
        }
        put_object(tx, bucket, key, value)
    } else {
        if !exists {
            return Err(StoreError::Corrupt("diff removes an entry that does not exist"));
        }
        tx.delete(bucket, key);
        Ok(())
    }
}

pub fn commit_coin_output_diff(
    tx: &mut WriteTx<'_>,
    diff: &CoinOutputDiff,
    dir: DiffDirection,
) -> Result<(), StoreError> {
    let add = diff.direction == dir;
    let exists = tx.get_raw(&COIN_OUTPUTS, diff.id.as_bytes())?.is_some();
    commit_entry(
        tx,
        &COIN_OUTPUTS,
        diff.id.as_bytes(),
        &diff.coin_output,
        add,
        exists,
    )
}

pub fn commit_blockstake_output_diff(
    tx: &mut WriteTx<'_>,
    diff: &BlockStakeOutputDiff,
    dir: DiffDirection,
) -> Result<(), StoreError> {
    let add = diff.direction == dir;
    let exists = tx
        .get_raw(&BLOCKSTAKE_OUTPUTS, diff.id.as_bytes())?
        .is_some();
    commit_entry(
        tx,
        &BLOCKSTAKE_OUTPUTS,
        diff.id.as_bytes(),
        &diff.blockstake_output,
        add,
        exists,
    )
}

pub fn commit_delayed_coin_output_diff(
    tx: &mut WriteTx<'_>,
    diff: &DelayedCoinOutputDiff,
    dir: DiffDirection,
) -> Result<(), StoreError> {
    let bucket = delayed_coin_outputs_bucket(diff.maturity_height);
    let add = diff.direction == dir;
    let exists = tx.get_raw(&bucket, diff.id.as_bytes())?.is_some();
    commit_entry(tx, &bucket, diff.id.as_bytes(), &diff.coin_output, add, exists)
}

pub fn commit_transaction_id_diff(
    tx: &mut WriteTx<'_>,
    diff: &TransactionIdDiff,
    dir: DiffDirection,
) -> Result<(), StoreError> {
    let add = diff.direction == dir;
    let exists = tx
        .get_raw(&TRANSACTION_ID_MAP, diff.id.as_bytes())?
        .is_some();
    commit_entry(
        tx,
        &TRANSACTION_ID_MAP,
        diff.id.as_bytes(),
        &diff.short_id,
        add,
        exists,
    )
}

/// Commits a processed block's entire diff set in the given direction, and
/// moves the block path and tip height along with it.
///
/// Applying walks the diff vectors forward; reverting walks them backward,
/// so every intermediate state a revert passes through is one the apply
/// passed through in reverse.
pub fn commit_diff_set(
    tx: &mut WriteTx<'_>,
    pb: &ProcessedBlock,
    dir: DiffDirection,
) -> Result<(), StoreError> {
    if !pb.diffs_generated {
        return Err(StoreError::Corrupt(
            "committing a diff set that was never generated",
        ));
    }
    match dir {
        DiffDirection::Apply => {
            for diff in &pb.coin_output_diffs {
                commit_coin_output_diff(tx, diff, dir)?;
            }
            for diff in &pb.blockstake_output_diffs {
                commit_blockstake_output_diff(tx, diff, dir)?;
            }
            for diff in &pb.delayed_coin_output_diffs {
                commit_delayed_coin_output_diff(tx, diff, dir)?;
            }
            for diff in &pb.transaction_id_diffs {
                commit_transaction_id_diff(tx, diff, dir)?;
            }
            put_object(
                tx,
                &BLOCK_PATH,
                &pb.height.big_endian_bytes(),
                &pb.block.id(),
            )?;
            set_block_height(tx, pb.height)?;
            metrics::counter!("state.committed.block.count", 1);
            metrics::gauge!("state.committed.block.height", pb.height.0 as _);
        }
        DiffDirection::Revert => {
            for diff in pb.coin_output_diffs.iter().rev() {
                commit_coin_output_diff(tx, diff, dir)?;
            }
            for diff in pb.blockstake_output_diffs.iter().rev() {
                commit_blockstake_output_diff(tx, diff, dir)?;
            }
            for diff in pb.delayed_coin_output_diffs.iter().rev() {
                commit_delayed_coin_output_diff(tx, diff, dir)?;
            }
            for diff in pb.transaction_id_diffs.iter().rev() {
                commit_transaction_id_diff(tx, diff, dir)?;
            }
            let prev_height = pb
                .height
                .checked_sub(1)
                .ok_or(StoreError::Corrupt("cannot revert the genesis block"))?;
            tx.delete(&BLOCK_PATH, &pb.height.big_endian_bytes());
            set_block_height(tx, prev_height)?;
            metrics::counter!("state.reverted.block.count", 1);
        }
    }
    trace!(height = %pb.height, ?dir, "committed diff set");
    Ok(())
}

/// The ledger checksum: the Merkle root over the interleaved `(key, value)`
/// sequences of the block path, the unspent coin and blockstake outputs, and
/// every delayed bucket, each drawn in ascending byte order.
pub fn consensus_checksum<V: BucketView + ?Sized>(view: &V) -> Result<[u8; 32], StoreError> {
    let mut tree = MerkleTree::new();
    for bucket in &[&*BLOCK_PATH, &*COIN_OUTPUTS, &*BLOCKSTAKE_OUTPUTS] {
        let mut cursor = view.cursor(bucket)?;
        while let Some((key, value)) = cursor.next() {
            tree.push(key);
            tree.push(value);
        }
    }
    let mut cursor = view.cursor(&delayed_bucket_family())?;
    while let Some((key, value)) = cursor.next() {
        tree.push(key);
        tree.push(value);
    }
    Ok(tree.root())
}

/// The storage bucket owned by a registered plugin.
pub fn plugin_bucket(name: &str) -> BucketRef {
    PLUGINS.child(name.as_bytes())
}
