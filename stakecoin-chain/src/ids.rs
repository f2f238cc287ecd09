//! Content-hash identifiers.
//!
//! Every identifier on the chain is a 32-byte Blake2b-256 content hash:
//! blocks are identified by their header hash, transactions by the hash of
//! their specifier plus canonical encoding, and outputs by the hash of the
//! creating transaction plus the output's index and namespace.

use std::{fmt, io, str::FromStr};

use crate::serialization::{blake2b, CanonicalDeserialize, CanonicalSerialize, SerializationError};

macro_rules! content_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[cfg_attr(
            any(test, feature = "proptest-impl"),
            derive(proptest_derive::Arbitrary)
        )]
        pub struct $name(pub [u8; blake2b::HASH_SIZE]);

        impl $name {
            /// The all-zero identifier, used as a sentinel (the genesis
            /// parent, unset references).
            pub const fn zero() -> $name {
                $name([0u8; blake2b::HASH_SIZE])
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn as_bytes(&self) -> &[u8; blake2b::HASH_SIZE] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name))
                    .field(&hex::encode(&self.0))
                    .finish()
            }
        }

        impl FromStr for $name {
            type Err = SerializationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = [0; blake2b::HASH_SIZE];
                if hex::decode_to_slice(s, &mut bytes[..]).is_err() {
                    Err(SerializationError::Parse("hex decoding error"))
                } else {
                    Ok($name(bytes))
                }
            }
        }

        impl CanonicalSerialize for $name {
            fn canonical_serialize<W: io::Write>(
                &self,
                mut target: W,
            ) -> Result<(), io::Error> {
                target.write_all(&self.0)
            }
        }

        impl CanonicalDeserialize for $name {
            fn canonical_deserialize<R: io::Read>(
                mut reader: R,
            ) -> Result<Self, SerializationError> {
                Ok($name(<[u8; blake2b::HASH_SIZE]>::canonical_deserialize(
                    &mut reader,
                )?))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

content_id! {
    /// A hash of a block header, used to identify blocks and link them into
    /// a chain. The header binds the Merkle root of the block's payouts and
    /// transactions, so the identifier covers the entire block contents.
    BlockId
}

content_id! {
    /// A hash of a transaction's specifier plus canonical encoding.
    TransactionId
}

content_id! {
    /// The identifier of a coin output: the hash of the creating
    /// transaction's identifying data, the coin-output namespace specifier,
    /// and the output's index.
    CoinOutputId
}

content_id! {
    /// The identifier of a blockstake output; same derivation as
    /// [`CoinOutputId`] under a distinct namespace specifier.
    BlockStakeOutputId
}

content_id! {
    /// The 32-byte message a fulfillment's signatures are verified against.
    SigHash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::CanonicalDeserializeInto;

    #[test]
    fn id_hex_roundtrip() {
        let id = BlockId(blake2b::hash_bytes(b"hello"));
        let parsed: BlockId = id.to_string().parse().expect("hex id parses");
        assert_eq!(id, parsed);
    }

    #[test]
    fn id_binary_roundtrip() {
        let id = TransactionId(blake2b::hash_bytes(b"tx"));
        let bytes = id.canonical_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), 32);
        let decoded: TransactionId = bytes.as_slice().canonical_deserialize_into().unwrap();
        assert_eq!(id, decoded);
    }

    #[test]
    fn zero_is_zero() {
        assert!(CoinOutputId::zero().is_zero());
        assert!(!CoinOutputId(blake2b::hash_bytes(b"x")).is_zero());
    }
}
