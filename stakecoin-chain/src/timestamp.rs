//! Consensus timestamps: seconds since the Unix epoch.

use std::{fmt, io, ops};

use chrono::Utc;

use crate::serialization::{CanonicalDeserialize, CanonicalSerialize, SerializationError};

/// A block or lock timestamp in Unix seconds (UTC).
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The node's local clock. Non-deterministic; only the future-threshold
    /// acceptance rules may consult it.
    pub fn now() -> Timestamp {
        Timestamp(Utc::now().timestamp() as u64)
    }

    pub fn saturating_sub(&self, seconds: u64) -> Timestamp {
        Timestamp(self.0.saturating_sub(seconds))
    }
}

impl ops::Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, seconds: u64) -> Timestamp {
        Timestamp(self.0 + seconds)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl CanonicalSerialize for Timestamp {
    fn canonical_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        self.0.canonical_serialize(target)
    }
}

impl CanonicalDeserialize for Timestamp {
    fn canonical_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Timestamp(u64::canonical_deserialize(reader)?))
    }
}
