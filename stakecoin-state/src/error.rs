use std::io;

use thiserror::Error;

use stakecoin_chain::SerializationError;

/// An error raised by the bucket store or the ledger layered on top of it.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The storage engine failed; the surrounding transaction is rolled
    /// back.
    #[error("storage engine error: {0}")]
    Sled(#[from] sled::Error),

    /// A stored object failed to decode. Stored bytes are written by this
    /// crate, so this always indicates corruption or a version skew.
    #[error("stored object is malformed: {0}")]
    Serialization(#[from] SerializationError),

    /// An internal invariant of the ledger does not hold.
    #[error("the consensus store is inconsistent: {0}")]
    Corrupt(&'static str),

    /// The store was created by an incompatible release.
    #[error("store version mismatch: found {found:?}, expected {expected:?}")]
    VersionMismatch { found: String, expected: String },
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> StoreError {
        StoreError::Serialization(SerializationError::Io(err))
    }
}
