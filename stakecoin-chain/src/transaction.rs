//! Transactions and transaction-related structures.
//!
//! A transaction moves coins and blockstakes between outputs. Its `version`
//! byte selects a transaction controller in the consensus layer; everything a
//! non-standard version needs beyond the shared fields travels in the opaque
//! `extension` blob, which only that controller interprets.

mod serialize;
mod short_id;

pub use serialize::MAX_TRANSACTION_BYTES;
pub use short_id::TransactionShortId;

use std::{fmt, io};

use crate::cached::Cached;
use crate::outputs::{BlockStakeInput, BlockStakeOutput, CoinInput, CoinOutput};
use crate::serialization::{
    blake2b, CanonicalDeserialize, CanonicalSerialize, SerializationError,
};
use crate::{BlockStakeOutputId, CoinOutputId, Currency, SigHash, Specifier, TransactionId};

/// Namespace tag for transaction identifiers.
pub const SPECIFIER_TRANSACTION: Specifier = Specifier::new(*b"transaction\0\0\0\0\0");
/// Namespace tag for signature inputs of the standard transfer version.
pub const SPECIFIER_SIGN_INPUT: Specifier = Specifier::new(*b"sign transaction");
/// Namespace tag for coin output identifiers.
pub const SPECIFIER_COIN_OUTPUT: Specifier = Specifier::new(*b"coin output\0\0\0\0\0");
/// Namespace tag for blockstake output identifiers.
pub const SPECIFIER_BLOCKSTAKE_OUTPUT: Specifier = Specifier::new(*b"blstake output\0\0");

/// The version byte dispatching a transaction to its controller.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TransactionVersion(pub u8);

impl TransactionVersion {
    /// The legacy version; disabled by default.
    pub const ZERO: TransactionVersion = TransactionVersion(0);
    /// The standard coin and blockstake transfer.
    pub const STANDARD: TransactionVersion = TransactionVersion(1);
}

impl fmt::Display for TransactionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl CanonicalSerialize for TransactionVersion {
    fn canonical_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        self.0.canonical_serialize(target)
    }
}

impl CanonicalDeserialize for TransactionVersion {
    fn canonical_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(TransactionVersion(u8::canonical_deserialize(reader)?))
    }
}

/// A stakecoin transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: TransactionVersion,
    pub coin_inputs: Vec<CoinInput>,
    pub coin_outputs: Vec<CoinOutput>,
    pub blockstake_inputs: Vec<BlockStakeInput>,
    pub blockstake_outputs: Vec<BlockStakeOutput>,
    pub miner_fees: Vec<Currency>,
    /// Free-form data, bounded by the chain's arbitrary-data limit.
    #[serde(with = "crate::serialization::hex_serde")]
    pub arbitrary_data: Vec<u8>,
    /// Version-specific payload, interpreted by the controller registered
    /// for `version`. `None` for the standard transfer.
    #[serde(with = "crate::serialization::hex_serde::opt")]
    pub extension: Option<Vec<u8>>,
    /// For efficiency, we cache the id of this transaction after computing
    /// it the first time. This field is not part of the consensus
    /// serialization.
    #[serde(skip)]
    pub id: Cached<TransactionId>,
}

impl Default for Transaction {
    fn default() -> Transaction {
        Transaction {
            version: TransactionVersion::STANDARD,
            coin_inputs: Vec::new(),
            coin_outputs: Vec::new(),
            blockstake_inputs: Vec::new(),
            blockstake_outputs: Vec::new(),
            miner_fees: Vec::new(),
            arbitrary_data: Vec::new(),
            extension: None,
            id: Cached::new(),
        }
    }
}

impl Transaction {
    /// Get the id of this transaction: the hash of the transaction
    /// namespace specifier plus the canonical encoding.
    pub fn id(&self) -> TransactionId {
        if let Some(id) = self.id.value() {
            return id;
        }
        TransactionId(blake2b::hash_object_with_specifier(
            &SPECIFIER_TRANSACTION,
            self,
        ))
    }

    pub(crate) fn cache_id(&mut self) {
        let id = self.id();
        self.id = Cached::from(id);
    }

    /// The id of this transaction's coin output at `index`.
    pub fn coin_output_id(&self, index: u64) -> CoinOutputId {
        CoinOutputId(self.derive_output_id(&SPECIFIER_COIN_OUTPUT, index))
    }

    /// The id of this transaction's blockstake output at `index`.
    pub fn blockstake_output_id(&self, index: u64) -> BlockStakeOutputId {
        BlockStakeOutputId(self.derive_output_id(&SPECIFIER_BLOCKSTAKE_OUTPUT, index))
    }

    fn derive_output_id(&self, specifier: &Specifier, index: u64) -> [u8; 32] {
        use std::io::Write;

        let mut writer = blake2b::Writer::default();
        writer
            .write_all(specifier.as_bytes())
            .expect("Blake2b writer is infallible");
        self.canonical_serialize(&mut writer)
            .expect("Blake2b writer is infallible");
        index
            .canonical_serialize(&mut writer)
            .expect("Blake2b writer is infallible");
        writer.finish()
    }

    /// The message signed by the fulfillment of the input at `input_index`,
    /// for the standard transfer layout: every field that identifies the
    /// transfer, but none of the fulfillments themselves.
    ///
    /// Non-standard versions define their own signature hashes through their
    /// controllers.
    pub fn signature_hash(&self, input_index: u64) -> SigHash {
        use std::io::Write;

        let mut writer = blake2b::Writer::default();
        (|| -> Result<(), io::Error> {
            writer.write_all(SPECIFIER_SIGN_INPUT.as_bytes())?;
            self.version.canonical_serialize(&mut writer)?;
            input_index.canonical_serialize(&mut writer)?;
            (self.coin_inputs.len() as u64).canonical_serialize(&mut writer)?;
            for input in &self.coin_inputs {
                input.parent_id.canonical_serialize(&mut writer)?;
            }
            self.coin_outputs.canonical_serialize(&mut writer)?;
            (self.blockstake_inputs.len() as u64).canonical_serialize(&mut writer)?;
            for input in &self.blockstake_inputs {
                input.parent_id.canonical_serialize(&mut writer)?;
            }
            self.blockstake_outputs.canonical_serialize(&mut writer)?;
            self.miner_fees.canonical_serialize(&mut writer)?;
            self.arbitrary_data.canonical_serialize(&mut writer)?;
            self.extension.canonical_serialize(&mut writer)?;
            Ok(())
        })()
        .expect("Blake2b writer is infallible");
        SigHash(writer.finish())
    }

    /// Returns the serialized length (in bytes) of this transaction.
    pub fn binary_size(&self) -> usize {
        self.canonical_serialize_to_vec()
            .expect("serializing to a vec is infallible")
            .len()
    }

    /// The sum of this transaction's miner fees.
    pub fn total_miner_fees(&self) -> Option<Currency> {
        Currency::sum(self.miner_fees.iter())
    }
}
