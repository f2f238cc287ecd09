//! Proof-of-Blockstake difficulty targets and cumulative depth.
//!
//! A [`Target`] is a 256-bit big-endian upper bound: a block solves the
//! chain when its stake-weighted hash is strictly below the child target of
//! its parent. A [`Difficulty`] is the expected work a target represents,
//! `2^256 / (target + 1)`; fork choice accumulates difficulties into depths
//! and compares them.

use std::{fmt, io};

use primitive_types::U256;

use crate::serialization::{CanonicalDeserialize, CanonicalSerialize, SerializationError};

/// A 256-bit big-endian difficulty bound.
///
/// Byte-wise ordering equals numeric ordering, so the derived `Ord` compares
/// targets as the integers they encode.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Target(pub [u8; 32]);

impl Target {
    /// The easiest possible target; every stake-weighted hash is below it.
    pub const MAX: Target = Target([0xff; 32]);

    pub fn as_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    pub fn from_u256(value: U256) -> Target {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        Target(bytes)
    }

    /// The expected number of attempts to find a hash below this target.
    pub fn difficulty(&self) -> Difficulty {
        let value = self.as_u256();
        Difficulty(U256::max_value() / value.saturating_add(U256::one()))
    }

    /// Multiplies the target by `numerator / denominator`, saturating at the
    /// maximum target. Used by the child-target adjustment, whose ratio is
    /// clamped well away from the overflow range before this is called.
    pub fn mul_ratio(&self, numerator: u64, denominator: u64) -> Target {
        assert!(denominator != 0, "target adjustment denominator is zero");
        let value = self.as_u256();
        let num = U256::from(numerator);
        let den = U256::from(denominator);
        // (v / d) * n + ((v % d) * n) / d avoids overflowing the
        // intermediate product for any clamped adjustment ratio.
        let scaled = match (value / den).checked_mul(num) {
            Some(whole) => whole.checked_add((value % den) * num / den),
            None => None,
        };
        match scaled {
            Some(scaled) => Target::from_u256(scaled),
            None => Target::MAX,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Target").field(&hex::encode(&self.0)).finish()
    }
}

impl CanonicalSerialize for Target {
    fn canonical_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_all(&self.0)
    }
}

impl CanonicalDeserialize for Target {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Target(<[u8; 32]>::canonical_deserialize(&mut reader)?))
    }
}

impl serde::Serialize for Target {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Target {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&s, &mut bytes[..]).map_err(serde::de::Error::custom)?;
        Ok(Target(bytes))
    }
}

/// Cumulative expected work; the depth of a block is the sum of the
/// difficulties of the targets along its chain.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Difficulty(pub U256);

impl Difficulty {
    pub fn zero() -> Difficulty {
        Difficulty(U256::zero())
    }

    /// Depth accumulation saturates instead of wrapping; a saturated depth
    /// still orders correctly against every real chain.
    pub fn saturating_add(&self, other: &Difficulty) -> Difficulty {
        match self.0.checked_add(other.0) {
            Some(sum) => Difficulty(sum),
            None => Difficulty(U256::max_value()),
        }
    }

    /// The surpass margin derived from this difficulty: one fifth, so a fork
    /// must out-weigh the tip by 20% of its child target's difficulty before
    /// a reorganization is triggered.
    pub fn surpass_margin(&self) -> Difficulty {
        Difficulty(self.0 / U256::from(5u64))
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl CanonicalSerialize for Difficulty {
    fn canonical_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        target.write_all(&bytes)
    }
}

impl CanonicalDeserialize for Difficulty {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let bytes = <[u8; 32]>::canonical_deserialize(&mut reader)?;
        Ok(Difficulty(U256::from_big_endian(&bytes)))
    }
}

impl serde::Serialize for Difficulty {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Difficulty {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        U256::from_dec_str(&s)
            .map(Difficulty)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_order_is_numeric_order() {
        let easy = Target::MAX;
        let hard = Target::from_u256(U256::from(1u64) << 200);
        assert!(hard < easy);
        assert!(hard.difficulty() > easy.difficulty());
    }

    #[test]
    fn mul_ratio_identity() {
        let target = Target::from_u256(U256::from(123_456_789u64) << 100);
        assert_eq!(target.mul_ratio(10, 10), target);
    }

    #[test]
    fn mul_ratio_scales() {
        let target = Target::from_u256(U256::from(1000u64));
        assert_eq!(target.mul_ratio(25, 10), Target::from_u256(U256::from(2500u64)));
        assert_eq!(target.mul_ratio(10, 25), Target::from_u256(U256::from(400u64)));
    }

    #[test]
    fn difficulty_accumulates() {
        let d = Target::MAX.difficulty();
        let depth = d.saturating_add(&d);
        assert!(depth >= d);
    }
}
