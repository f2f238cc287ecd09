//! Wire and JSON codecs for conditions and fulfillments.
//!
//! The canonical binary form of either sum type is a 1-byte variant tag
//! followed by a length-prefixed payload, so the payload of an unknown
//! variant can be measured (and rejected) without being understood. The JSON
//! mirror is `{"type": <tag>, "data": {...}}`.

use std::{fmt, io, str::FromStr};

use super::{
    Condition, Fulfillment, MultiSignatureCondition, MultiSignatureFulfillment, PublicKey,
    PublicKeySignaturePair, Signature, SignatureAlgorithm, SingleSignatureFulfillment,
    TimeLockCondition, UnlockHashCondition,
};
use crate::conditions::UnlockHash;
use crate::serialization::{CanonicalDeserialize, CanonicalSerialize, SerializationError};

/// Sanity cap on a single condition or fulfillment payload.
const MAX_PAYLOAD_BYTES: u64 = 1 << 20;

fn write_tagged<W: io::Write>(tag: u8, payload: &[u8], mut target: W) -> Result<(), io::Error> {
    tag.canonical_serialize(&mut target)?;
    (payload.len() as u64).canonical_serialize(&mut target)?;
    target.write_all(payload)
}

fn read_payload<R: io::Read>(mut reader: R) -> Result<(u8, Vec<u8>), SerializationError> {
    let tag = u8::canonical_deserialize(&mut reader)?;
    let len = u64::canonical_deserialize(&mut reader)?;
    if len > MAX_PAYLOAD_BYTES {
        return Err(SerializationError::Parse("condition payload is too large"));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok((tag, payload))
}

fn from_payload<T: CanonicalDeserialize>(payload: &[u8]) -> Result<T, SerializationError> {
    let mut slice = payload;
    let value = T::canonical_deserialize(&mut slice)?;
    if !slice.is_empty() {
        return Err(SerializationError::Parse(
            "condition payload has trailing bytes",
        ));
    }
    Ok(value)
}

impl CanonicalSerialize for Condition {
    fn canonical_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        let payload = match self {
            Condition::Nil => Vec::new(),
            Condition::UnlockHash(c) => c.target.canonical_serialize_to_vec()?,
            Condition::TimeLock(c) => {
                let mut payload = c.lock.canonical_serialize_to_vec()?;
                c.condition.canonical_serialize(&mut payload)?;
                payload
            }
            Condition::MultiSignature(c) => {
                let mut payload = c.unlock_hashes.canonical_serialize_to_vec()?;
                c.minimum_signature_count.canonical_serialize(&mut payload)?;
                payload
            }
        };
        write_tagged(self.condition_type(), &payload, target)
    }
}

impl CanonicalDeserialize for Condition {
    fn canonical_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let (tag, payload) = read_payload(reader)?;
        match tag {
            0 => {
                if !payload.is_empty() {
                    return Err(SerializationError::Parse("nil condition carries a payload"));
                }
                Ok(Condition::Nil)
            }
            1 => Ok(Condition::UnlockHash(UnlockHashCondition {
                target: from_payload(&payload)?,
            })),
            3 => {
                let mut slice = payload.as_slice();
                let lock = u64::canonical_deserialize(&mut slice)?;
                let condition = Condition::canonical_deserialize(&mut slice)?;
                if !slice.is_empty() {
                    return Err(SerializationError::Parse(
                        "condition payload has trailing bytes",
                    ));
                }
                Ok(Condition::TimeLock(TimeLockCondition {
                    lock,
                    condition: Box::new(condition),
                }))
            }
            4 => {
                let mut slice = payload.as_slice();
                let unlock_hashes = Vec::<UnlockHash>::canonical_deserialize(&mut slice)?;
                let minimum_signature_count = u64::canonical_deserialize(&mut slice)?;
                if !slice.is_empty() {
                    return Err(SerializationError::Parse(
                        "condition payload has trailing bytes",
                    ));
                }
                Ok(Condition::MultiSignature(MultiSignatureCondition {
                    unlock_hashes,
                    minimum_signature_count,
                }))
            }
            _ => Err(SerializationError::Parse("unknown condition type")),
        }
    }
}

impl CanonicalSerialize for Fulfillment {
    fn canonical_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        let payload = match self {
            Fulfillment::SingleSignature(f) => {
                let mut payload = f.public_key.canonical_serialize_to_vec()?;
                f.signature.canonical_serialize(&mut payload)?;
                payload
            }
            Fulfillment::MultiSignature(f) => f.pairs.canonical_serialize_to_vec()?,
        };
        write_tagged(self.fulfillment_type(), &payload, target)
    }
}

impl CanonicalDeserialize for Fulfillment {
    fn canonical_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let (tag, payload) = read_payload(reader)?;
        match tag {
            1 => {
                let mut slice = payload.as_slice();
                let public_key = PublicKey::canonical_deserialize(&mut slice)?;
                let signature = Signature::canonical_deserialize(&mut slice)?;
                if !slice.is_empty() {
                    return Err(SerializationError::Parse(
                        "fulfillment payload has trailing bytes",
                    ));
                }
                Ok(Fulfillment::SingleSignature(SingleSignatureFulfillment {
                    public_key,
                    signature,
                }))
            }
            3 => Ok(Fulfillment::MultiSignature(MultiSignatureFulfillment {
                pairs: from_payload(&payload)?,
            })),
            _ => Err(SerializationError::Parse("unknown fulfillment type")),
        }
    }
}

impl CanonicalSerialize for PublicKey {
    fn canonical_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        let tag: u8 = match self.algorithm {
            SignatureAlgorithm::Ed25519 => 1,
        };
        tag.canonical_serialize(&mut target)?;
        target.write_all(&self.key)
    }
}

impl CanonicalDeserialize for PublicKey {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let algorithm = match u8::canonical_deserialize(&mut reader)? {
            1 => SignatureAlgorithm::Ed25519,
            _ => return Err(SerializationError::Parse("unknown signature algorithm")),
        };
        let key = <[u8; 32]>::canonical_deserialize(&mut reader)?;
        Ok(PublicKey { algorithm, key })
    }
}

impl CanonicalSerialize for Signature {
    fn canonical_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_all(&self.0)
    }
}

impl CanonicalDeserialize for Signature {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Signature(<[u8; 64]>::canonical_deserialize(&mut reader)?))
    }
}

impl CanonicalSerialize for PublicKeySignaturePair {
    fn canonical_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.public_key.canonical_serialize(&mut target)?;
        self.signature.canonical_serialize(&mut target)
    }
}

impl CanonicalDeserialize for PublicKeySignaturePair {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(PublicKeySignaturePair {
            public_key: PublicKey::canonical_deserialize(&mut reader)?,
            signature: Signature::canonical_deserialize(&mut reader)?,
        })
    }
}

impl SignatureAlgorithm {
    fn name(self) -> &'static str {
        match self {
            SignatureAlgorithm::Ed25519 => "ed25519",
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), hex::encode(&self.key))
    }
}

impl FromStr for PublicKey {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, ':');
        let algorithm = match parts.next() {
            Some("ed25519") => SignatureAlgorithm::Ed25519,
            _ => return Err(SerializationError::Parse("unknown signature algorithm")),
        };
        let hex_key = parts
            .next()
            .ok_or(SerializationError::Parse("missing public key data"))?;
        let mut key = [0u8; 32];
        hex::decode_to_slice(hex_key, &mut key[..])
            .map_err(|_| SerializationError::Parse("invalid public key hex"))?;
        Ok(PublicKey { algorithm, key })
    }
}

impl serde::Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..]))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signature")
            .field(&hex::encode(&self.0[..]))
            .finish()
    }
}

impl FromStr for Signature {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(s, &mut bytes[..])
            .map_err(|_| SerializationError::Parse("invalid signature hex"))?;
        Ok(Signature(bytes))
    }
}

impl serde::Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The adjacently tagged JSON shape shared by both sum types.
#[derive(Serialize, Deserialize)]
struct Tagged {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    data: serde_json::Value,
}

impl serde::Serialize for Condition {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error;

        let data = match self {
            Condition::Nil => serde_json::Value::Null,
            Condition::UnlockHash(c) => serde_json::to_value(c).map_err(S::Error::custom)?,
            Condition::TimeLock(c) => serde_json::to_value(c).map_err(S::Error::custom)?,
            Condition::MultiSignature(c) => serde_json::to_value(c).map_err(S::Error::custom)?,
        };
        serde::Serialize::serialize(
            &Tagged {
                kind: self.condition_type(),
                data,
            },
            serializer,
        )
    }
}

impl<'de> serde::Deserialize<'de> for Condition {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let tagged = <Tagged as serde::Deserialize>::deserialize(deserializer)?;
        match tagged.kind {
            0 => Ok(Condition::Nil),
            1 => serde_json::from_value(tagged.data)
                .map(Condition::UnlockHash)
                .map_err(D::Error::custom),
            3 => serde_json::from_value(tagged.data)
                .map(Condition::TimeLock)
                .map_err(D::Error::custom),
            4 => serde_json::from_value(tagged.data)
                .map(Condition::MultiSignature)
                .map_err(D::Error::custom),
            _ => Err(D::Error::custom("unknown condition type")),
        }
    }
}

impl serde::Serialize for Fulfillment {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error;

        let data = match self {
            Fulfillment::SingleSignature(f) => serde_json::to_value(f).map_err(S::Error::custom)?,
            Fulfillment::MultiSignature(f) => serde_json::to_value(f).map_err(S::Error::custom)?,
        };
        serde::Serialize::serialize(
            &Tagged {
                kind: self.fulfillment_type(),
                data,
            },
            serializer,
        )
    }
}

impl<'de> serde::Deserialize<'de> for Fulfillment {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let tagged = <Tagged as serde::Deserialize>::deserialize(deserializer)?;
        match tagged.kind {
            1 => serde_json::from_value(tagged.data)
                .map(Fulfillment::SingleSignature)
                .map_err(D::Error::custom),
            3 => serde_json::from_value(tagged.data)
                .map(Fulfillment::MultiSignature)
                .map_err(D::Error::custom),
            _ => Err(D::Error::custom("unknown fulfillment type")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::CanonicalDeserializeInto;

    fn sample_condition() -> Condition {
        Condition::TimeLock(TimeLockCondition {
            lock: 4242,
            condition: Box::new(Condition::MultiSignature(MultiSignatureCondition {
                unlock_hashes: vec![
                    PublicKey::ed25519([1; 32]).unlock_hash(),
                    PublicKey::ed25519([2; 32]).unlock_hash(),
                ],
                minimum_signature_count: 2,
            })),
        })
    }

    #[test]
    fn condition_binary_roundtrip() {
        for condition in &[
            Condition::Nil,
            Condition::unlock_hash_condition(PublicKey::ed25519([7; 32]).unlock_hash()),
            sample_condition(),
        ] {
            let bytes = condition.canonical_serialize_to_vec().unwrap();
            let decoded: Condition = bytes.as_slice().canonical_deserialize_into().unwrap();
            assert_eq!(&decoded, condition);
        }
    }

    #[test]
    fn condition_json_roundtrip() {
        let condition = sample_condition();
        let json = serde_json::to_string(&condition).unwrap();
        let decoded: Condition = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, condition);
        // And the JSON mirror agrees with the binary form.
        assert_eq!(
            decoded.canonical_serialize_to_vec().unwrap(),
            condition.canonical_serialize_to_vec().unwrap()
        );
    }

    #[test]
    fn fulfillment_binary_roundtrip() {
        let fulfillment = Fulfillment::single_signature(
            PublicKey::ed25519([3; 32]),
            Signature([9; 64]),
        );
        let bytes = fulfillment.canonical_serialize_to_vec().unwrap();
        let decoded: Fulfillment = bytes.as_slice().canonical_deserialize_into().unwrap();
        assert_eq!(decoded, fulfillment);
    }

    #[test]
    fn unknown_tags_are_rejected() {
        // Tag 9 with an empty payload.
        let mut bytes = vec![9u8];
        bytes.extend_from_slice(&[0u8; 8]);
        assert!(bytes
            .as_slice()
            .canonical_deserialize_into::<Condition>()
            .is_err());
        assert!(bytes
            .as_slice()
            .canonical_deserialize_into::<Fulfillment>()
            .is_err());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&u64::max_value().to_le_bytes());
        assert!(bytes
            .as_slice()
            .canonical_deserialize_into::<Condition>()
            .is_err());
    }
}
