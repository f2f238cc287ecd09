//! Canonical serialization of transactions.

use std::io;

use super::{Transaction, TransactionVersion};
use crate::cached::Cached;
use crate::serialization::{CanonicalDeserialize, CanonicalSerialize, SerializationError};

/// Hard cap on the size of a single transaction, to protect decoders against
/// DOS payloads. The per-network block size limit is enforced separately and
/// is the binding bound in practice.
pub const MAX_TRANSACTION_BYTES: u64 = 1_000_000;

impl CanonicalSerialize for Transaction {
    fn canonical_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.version.canonical_serialize(&mut target)?;
        self.coin_inputs.canonical_serialize(&mut target)?;
        self.coin_outputs.canonical_serialize(&mut target)?;
        self.blockstake_inputs.canonical_serialize(&mut target)?;
        self.blockstake_outputs.canonical_serialize(&mut target)?;
        self.miner_fees.canonical_serialize(&mut target)?;
        self.arbitrary_data.canonical_serialize(&mut target)?;
        self.extension.canonical_serialize(&mut target)
    }
}

/// Deserializes a transaction, calculating and caching its id.
impl CanonicalDeserialize for Transaction {
    fn canonical_deserialize<R: io::Read>(src: R) -> Result<Self, SerializationError> {
        let mut src = src.take(MAX_TRANSACTION_BYTES);
        let version = TransactionVersion::canonical_deserialize(&mut src)?;
        let coin_inputs = Vec::canonical_deserialize(&mut src)?;
        let coin_outputs = Vec::canonical_deserialize(&mut src)?;
        let blockstake_inputs = Vec::canonical_deserialize(&mut src)?;
        let blockstake_outputs = Vec::canonical_deserialize(&mut src)?;
        let miner_fees = Vec::canonical_deserialize(&mut src)?;
        let arbitrary_data = Vec::canonical_deserialize(&mut src)?;
        let extension = Option::canonical_deserialize(&mut src)?;
        let mut tx = Transaction {
            version,
            coin_inputs,
            coin_outputs,
            blockstake_inputs,
            blockstake_outputs,
            miner_fees,
            arbitrary_data,
            extension,
            id: Cached::new(),
        };
        // Calculate and cache the id.
        tx.cache_id();
        Ok(tx)
    }
}
