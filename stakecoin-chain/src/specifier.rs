//! 16-byte ASCII specifiers.
//!
//! A specifier is a fixed-width, human-readable domain tag mixed into every
//! hash so that values of different kinds can never collide: transaction
//! identifiers, signature inputs, and output-id derivations each carry their
//! own.

use std::{fmt, io};

use crate::serialization::{CanonicalDeserialize, CanonicalSerialize, SerializationError};

pub const SPECIFIER_LENGTH: usize = 16;

/// A fixed 16-byte ASCII tag, NUL-padded on the right.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Specifier(pub [u8; SPECIFIER_LENGTH]);

impl Specifier {
    pub const fn new(bytes: [u8; SPECIFIER_LENGTH]) -> Specifier {
        Specifier(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SPECIFIER_LENGTH] {
        &self.0
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self
            .0
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(SPECIFIER_LENGTH);
        f.write_str(&String::from_utf8_lossy(&self.0[..end]))
    }
}

impl fmt::Debug for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Specifier").field(&self.to_string()).finish()
    }
}

impl CanonicalSerialize for Specifier {
    fn canonical_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_all(&self.0)
    }
}

impl CanonicalDeserialize for Specifier {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Specifier(<[u8; SPECIFIER_LENGTH]>::canonical_deserialize(
            &mut reader,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_stops_at_padding() {
        let spec = Specifier::new(*b"transaction\0\0\0\0\0");
        assert_eq!(spec.to_string(), "transaction");
    }
}
