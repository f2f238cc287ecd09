//! Block heights.

use std::{fmt, io, ops};

use crate::serialization::{CanonicalDeserialize, CanonicalSerialize, SerializationError};

/// The distance of a block from the genesis block, which sits at height 0.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Height(pub u64);

impl Height {
    pub fn next(self) -> Height {
        Height(self.0 + 1)
    }

    pub fn checked_sub(self, blocks: u64) -> Option<Height> {
        self.0.checked_sub(blocks).map(Height)
    }

    /// The 8-byte big-endian key form, so cursor order over height-keyed
    /// buckets equals numeric order.
    pub fn big_endian_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_big_endian_bytes(bytes: [u8; 8]) -> Height {
        Height(u64::from_be_bytes(bytes))
    }
}

impl ops::Add<u64> for Height {
    type Output = Height;

    fn add(self, blocks: u64) -> Height {
        Height(self.0 + blocks)
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl CanonicalSerialize for Height {
    fn canonical_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        self.0.canonical_serialize(target)
    }
}

impl CanonicalDeserialize for Height {
    fn canonical_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Height(u64::canonical_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_keys_sort_numerically() {
        let low = Height(255).big_endian_bytes();
        let high = Height(256).big_endian_bytes();
        assert!(low < high);
        assert_eq!(Height::from_big_endian_bytes(high), Height(256));
    }
}
