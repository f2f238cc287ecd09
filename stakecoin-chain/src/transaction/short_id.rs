//! Compact transaction references.

use std::{fmt, io};

use crate::block::Height;
use crate::serialization::{CanonicalDeserialize, CanonicalSerialize, SerializationError};

/// A compact `(block height, index-in-block)` reference to a transaction in
/// the current chain, packed into 64 bits: the height in the upper 48 bits,
/// the intra-block index in the lower 16.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TransactionShortId(pub u64);

impl TransactionShortId {
    pub fn new(height: Height, transaction_index: u16) -> TransactionShortId {
        debug_assert!(height.0 < 1 << 48, "block height exceeds short-id range");
        TransactionShortId((height.0 << 16) | u64::from(transaction_index))
    }

    pub fn block_height(&self) -> Height {
        Height(self.0 >> 16)
    }

    pub fn transaction_index(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl fmt::Display for TransactionShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.block_height(), self.transaction_index())
    }
}

impl CanonicalSerialize for TransactionShortId {
    fn canonical_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        self.0.canonical_serialize(target)
    }
}

impl CanonicalDeserialize for TransactionShortId {
    fn canonical_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(TransactionShortId(u64::canonical_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_and_unpacks() {
        let short = TransactionShortId::new(Height(123_456), 42);
        assert_eq!(short.block_height(), Height(123_456));
        assert_eq!(short.transaction_index(), 42);
    }

    #[test]
    fn orders_by_height_then_index() {
        let a = TransactionShortId::new(Height(5), 9);
        let b = TransactionShortId::new(Height(6), 0);
        assert!(a < b);
    }
}
