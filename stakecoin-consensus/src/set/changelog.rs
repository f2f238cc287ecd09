//! The persistent consensus change log.
//!
//! Every committed consensus change appends one entry under an
//! ever-increasing big-endian sequence number; a reverse index maps change
//! ids back to sequence numbers. Subscribers and plugin catch-up replay the
//! log from any recorded id, or from the beginning sentinel.

use canonical_serde_derive::{CanonDeserialize, CanonSerialize};

use stakecoin_chain::blake2b;
use stakecoin_chain::{BlockId, CanonicalDeserialize, CanonicalSerialize, SerializationError};
use stakecoin_state::store::put_object;
use stakecoin_state::{ledger, BucketView, StoreError, WriteTx};

use crate::types::{ConsensusChangeId, CONSENSUS_CHANGE_BEGINNING};

/// One committed consensus change, by block id.
#[derive(Clone, Debug, Eq, PartialEq, CanonSerialize, CanonDeserialize)]
pub(crate) struct ChangeLogEntry {
    pub id: ConsensusChangeId,
    /// Reverted blocks, former tip first.
    pub reverted_block_ids: Vec<BlockId>,
    /// Applied blocks, in chain order.
    pub applied_block_ids: Vec<BlockId>,
}

fn change_id(sequence: u64, reverted: &[BlockId], applied: &[BlockId]) -> ConsensusChangeId {
    let mut writer = blake2b::Writer::default();
    sequence
        .canonical_serialize(&mut writer)
        .expect("Blake2b writer is infallible");
    reverted
        .to_vec()
        .canonical_serialize(&mut writer)
        .expect("Blake2b writer is infallible");
    applied
        .to_vec()
        .canonical_serialize(&mut writer)
        .expect("Blake2b writer is infallible");
    ConsensusChangeId(writer.finish())
}

fn next_sequence<V: BucketView + ?Sized>(view: &V) -> Result<u64, StoreError> {
    let mut cursor = view.cursor(&ledger::CHANGE_LOG)?;
    match cursor.last() {
        Some((key, _)) => {
            let mut bytes = [0u8; 8];
            if key.len() != 8 {
                return Err(StoreError::Corrupt("malformed change log key"));
            }
            bytes.copy_from_slice(key);
            Ok(u64::from_be_bytes(bytes) + 1)
        }
        None => Ok(0),
    }
}

/// Appends a change to the log, returning its id.
pub(crate) fn append_change(
    tx: &mut WriteTx<'_>,
    reverted_block_ids: Vec<BlockId>,
    applied_block_ids: Vec<BlockId>,
) -> Result<ConsensusChangeId, StoreError> {
    let sequence = next_sequence(tx)?;
    let id = change_id(sequence, &reverted_block_ids, &applied_block_ids);
    let entry = ChangeLogEntry {
        id,
        reverted_block_ids,
        applied_block_ids,
    };
    put_object(tx, &ledger::CHANGE_LOG, &sequence.to_be_bytes(), &entry)?;
    tx.put(
        &ledger::CHANGE_LOG_INDEX,
        id.as_bytes(),
        sequence.to_be_bytes().to_vec(),
    );
    Ok(id)
}

/// The id of the most recent change, or the beginning sentinel for an empty
/// log.
pub(crate) fn latest_change_id<V: BucketView + ?Sized>(
    view: &V,
) -> Result<ConsensusChangeId, StoreError> {
    let mut cursor = view.cursor(&ledger::CHANGE_LOG)?;
    match cursor.last() {
        Some((_, value)) => Ok(ChangeLogEntry::canonical_deserialize(value)?.id),
        None => Ok(CONSENSUS_CHANGE_BEGINNING),
    }
}

/// All entries after `start`, oldest first. `start` may be the beginning
/// sentinel (yielding the entire log); returns `None` for an id the log
/// does not contain.
pub(crate) fn entries_after<V: BucketView + ?Sized>(
    view: &V,
    start: &ConsensusChangeId,
) -> Result<Option<Vec<ChangeLogEntry>>, StoreError> {
    let first_sequence = if start.is_beginning() {
        0
    } else {
        match view.get_raw(&ledger::CHANGE_LOG_INDEX, start.as_bytes())? {
            Some(bytes) => {
                let mut key = [0u8; 8];
                if bytes.len() != 8 {
                    return Err(StoreError::Corrupt("malformed change log index"));
                }
                key.copy_from_slice(&bytes);
                u64::from_be_bytes(key) + 1
            }
            None => return Ok(None),
        }
    };
    let mut entries = Vec::new();
    let mut cursor = view.cursor(&ledger::CHANGE_LOG)?;
    let mut next = cursor.seek(&first_sequence.to_be_bytes());
    while let Some((_, value)) = next {
        entries.push(ChangeLogEntry::canonical_deserialize(value)?);
        next = cursor.next();
    }
    Ok(Some(entries))
}

/// Whether `id` names a recorded change (or the beginning sentinel).
pub(crate) fn is_known_change<V: BucketView + ?Sized>(
    view: &V,
    id: &ConsensusChangeId,
) -> Result<bool, StoreError> {
    if id.is_beginning() {
        return Ok(true);
    }
    Ok(view.get_raw(&ledger::CHANGE_LOG_INDEX, id.as_bytes())?.is_some())
}
