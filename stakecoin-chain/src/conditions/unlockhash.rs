//! Unlock hashes: the address form of a condition.

use std::{fmt, io, str::FromStr};

use crate::serialization::{
    blake2b, CanonicalDeserialize, CanonicalSerialize, SerializationError,
};

/// The number of checksum bytes appended to the string form of an address.
const CHECKSUM_LENGTH: usize = 6;

/// The kind of condition an unlock hash stands for.
///
/// The tag values are part of the address format and must never change.
/// Tag `2` is reserved for a retired condition kind.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum UnlockType {
    /// The nil address; anyone can fulfill it.
    Nil,
    /// A single Ed25519 public key.
    PublicKey,
    /// A multi-signature address over a set of public-key addresses.
    MultiSig,
}

impl UnlockType {
    pub fn as_u8(self) -> u8 {
        match self {
            UnlockType::Nil => 0,
            UnlockType::PublicKey => 1,
            UnlockType::MultiSig => 3,
        }
    }

    pub fn from_u8(tag: u8) -> Result<UnlockType, SerializationError> {
        match tag {
            0 => Ok(UnlockType::Nil),
            1 => Ok(UnlockType::PublicKey),
            3 => Ok(UnlockType::MultiSig),
            _ => Err(SerializationError::Parse("unknown unlock type")),
        }
    }
}

/// A 1-byte type tag plus the 32-byte hash of the condition it stands for.
///
/// The string form is `<2 hex tag><64 hex hash><12 hex checksum>`, where the
/// checksum is the first six bytes of the Blake2b-256 hash of tag plus hash.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct UnlockHash {
    pub unlock_type: UnlockType,
    pub hash: [u8; 32],
}

impl UnlockHash {
    pub fn new(unlock_type: UnlockType, hash: [u8; 32]) -> UnlockHash {
        UnlockHash { unlock_type, hash }
    }

    /// The nil address.
    pub fn nil() -> UnlockHash {
        UnlockHash {
            unlock_type: UnlockType::Nil,
            hash: [0u8; 32],
        }
    }

    fn checksum(&self) -> [u8; CHECKSUM_LENGTH] {
        let mut data = [0u8; 33];
        data[0] = self.unlock_type.as_u8();
        data[1..].copy_from_slice(&self.hash);
        let digest = blake2b::hash_bytes(&data);
        let mut checksum = [0u8; CHECKSUM_LENGTH];
        checksum.copy_from_slice(&digest[..CHECKSUM_LENGTH]);
        checksum
    }
}

impl fmt::Display for UnlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}{}{}",
            self.unlock_type.as_u8(),
            hex::encode(&self.hash),
            hex::encode(&self.checksum())
        )
    }
}

impl fmt::Debug for UnlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UnlockHash").field(&self.to_string()).finish()
    }
}

impl FromStr for UnlockHash {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 2 * (1 + 32 + CHECKSUM_LENGTH) {
            return Err(SerializationError::Parse("invalid address length"));
        }
        let mut bytes = [0u8; 1 + 32 + CHECKSUM_LENGTH];
        hex::decode_to_slice(s, &mut bytes[..])
            .map_err(|_| SerializationError::Parse("invalid address hex"))?;
        let unlock_type = UnlockType::from_u8(bytes[0])?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[1..33]);
        let parsed = UnlockHash { unlock_type, hash };
        if parsed.checksum()[..] != bytes[33..] {
            return Err(SerializationError::Parse("invalid address checksum"));
        }
        Ok(parsed)
    }
}

impl CanonicalSerialize for UnlockHash {
    fn canonical_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.unlock_type.as_u8().canonical_serialize(&mut target)?;
        target.write_all(&self.hash)
    }
}

impl CanonicalDeserialize for UnlockHash {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let unlock_type = UnlockType::from_u8(u8::canonical_deserialize(&mut reader)?)?;
        let hash = <[u8; 32]>::canonical_deserialize(&mut reader)?;
        Ok(UnlockHash { unlock_type, hash })
    }
}

impl serde::Serialize for UnlockHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for UnlockHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_roundtrip() {
        let uh = UnlockHash::new(UnlockType::PublicKey, blake2b::hash_bytes(b"key"));
        let s = uh.to_string();
        assert_eq!(s.len(), 78);
        assert_eq!(s.parse::<UnlockHash>().unwrap(), uh);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let uh = UnlockHash::new(UnlockType::PublicKey, blake2b::hash_bytes(b"key"));
        let mut s = uh.to_string().into_bytes();
        let last = s.len() - 1;
        s[last] = if s[last] == b'0' { b'1' } else { b'0' };
        assert!(String::from_utf8(s).unwrap().parse::<UnlockHash>().is_err());
    }

    #[test]
    fn nil_address_is_all_zeroes() {
        assert_eq!(UnlockHash::nil().hash, [0u8; 32]);
        assert_eq!(UnlockHash::nil().unlock_type, UnlockType::Nil);
    }
}
