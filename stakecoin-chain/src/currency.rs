//! The chain's currency: an arbitrary-precision, non-negative integer.
//!
//! All arithmetic is checked. Coin and blockstake values never underflow;
//! a failed subtraction is a validation error at the call site, not a panic.

use std::{fmt, io, str::FromStr};

use primitive_types::U256;

use crate::serialization::{CanonicalDeserialize, CanonicalSerialize, SerializationError};

/// A non-negative amount of coins or blockstakes.
///
/// The canonical encoding is the minimal big-endian byte string of the value,
/// length-prefixed; the JSON mirror is a decimal string.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Currency(U256);

impl Currency {
    pub fn zero() -> Currency {
        Currency(U256::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checked addition; `None` on overflow of the backing 256-bit integer.
    pub fn checked_add(&self, other: &Currency) -> Option<Currency> {
        self.0.checked_add(other.0).map(Currency)
    }

    /// Checked subtraction; `None` when the result would underflow.
    pub fn checked_sub(&self, other: &Currency) -> Option<Currency> {
        self.0.checked_sub(other.0).map(Currency)
    }

    /// Checked multiplication by a 64-bit scalar.
    pub fn checked_mul_scalar(&self, scalar: u64) -> Option<Currency> {
        self.0.checked_mul(U256::from(scalar)).map(Currency)
    }

    /// Sums an iterator of values; `None` on overflow.
    pub fn sum<'a>(values: impl IntoIterator<Item = &'a Currency>) -> Option<Currency> {
        let mut total = Currency::zero();
        for value in values {
            total = total.checked_add(value)?;
        }
        Some(total)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn from_u256(value: U256) -> Currency {
        Currency(value)
    }
}

impl From<u64> for Currency {
    fn from(value: u64) -> Currency {
        Currency(U256::from(value))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Currency {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_dec_str(s)
            .map(Currency)
            .map_err(|_| SerializationError::Parse("invalid decimal currency value"))
    }
}

impl CanonicalSerialize for Currency {
    fn canonical_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        let byte_len = (self.0.bits() + 7) / 8;
        let mut buf = [0u8; 32];
        self.0.to_big_endian(&mut buf);
        (byte_len as u64).canonical_serialize(&mut target)?;
        target.write_all(&buf[32 - byte_len..])
    }
}

impl CanonicalDeserialize for Currency {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let len = u64::canonical_deserialize(&mut reader)? as usize;
        if len > 32 {
            return Err(SerializationError::Parse("currency value is too large"));
        }
        let mut buf = [0u8; 32];
        reader.read_exact(&mut buf[32 - len..])?;
        if len > 0 && buf[32 - len] == 0 {
            // The encoding contributes to content hashes, so it must be unique.
            return Err(SerializationError::Parse(
                "currency encoding is not minimal",
            ));
        }
        Ok(Currency(U256::from_big_endian(&buf)))
    }
}

impl serde::Serialize for Currency {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Currency {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::CanonicalDeserializeInto;

    fn roundtrip(value: Currency) -> Currency {
        value
            .canonical_serialize_to_vec()
            .unwrap()
            .as_slice()
            .canonical_deserialize_into()
            .unwrap()
    }

    #[test]
    fn encoding_is_minimal() {
        assert_eq!(
            Currency::zero().canonical_serialize_to_vec().unwrap(),
            vec![0; 8]
        );
        let one = Currency::from(1);
        let mut expected = vec![0u8; 8];
        expected[0] = 1;
        expected.push(1);
        assert_eq!(one.canonical_serialize_to_vec().unwrap(), expected);
    }

    #[test]
    fn binary_roundtrip() {
        for value in &[0u64, 1, 255, 256, 1_000_000_007, u64::max_value()] {
            let c = Currency::from(*value);
            assert_eq!(roundtrip(c), c);
        }
    }

    #[test]
    fn non_minimal_encoding_is_rejected() {
        // 0x00 0x01 with length 2: the value 1 padded with a leading zero.
        let mut bytes = 2u64.canonical_serialize_to_vec().unwrap();
        bytes.extend_from_slice(&[0x00, 0x01]);
        assert!(bytes
            .as_slice()
            .canonical_deserialize_into::<Currency>()
            .is_err());
    }

    #[test]
    fn checked_sub_does_not_underflow() {
        let ten = Currency::from(10);
        let three = Currency::from(3);
        assert_eq!(ten.checked_sub(&three), Some(Currency::from(7)));
        assert_eq!(three.checked_sub(&ten), None);
    }

    #[test]
    fn decimal_string_roundtrip() {
        let c = Currency::from(123_456_789);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "\"123456789\"");
        let back: Currency = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
