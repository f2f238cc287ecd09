//! Blake2b-256, the content hash every chain identifier is derived from.

use std::io;

use super::CanonicalSerialize;
use crate::specifier::Specifier;

/// The byte length of every content hash on the chain.
pub const HASH_SIZE: usize = 32;

/// An `io::Write` sink that feeds a Blake2b-256 state, so objects can be
/// hashed directly from their canonical serialization without an
/// intermediate buffer.
pub struct Writer {
    state: blake2b_simd::State,
}

impl Default for Writer {
    fn default() -> Self {
        Writer {
            state: blake2b_simd::Params::new().hash_length(HASH_SIZE).to_state(),
        }
    }
}

impl Writer {
    /// Consume the writer, returning the hash of all bytes written so far.
    pub fn finish(self) -> [u8; HASH_SIZE] {
        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(self.state.finalize().as_bytes());
        hash
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hash a raw byte string.
pub fn hash_bytes(data: &[u8]) -> [u8; HASH_SIZE] {
    let mut hash = [0u8; HASH_SIZE];
    hash.copy_from_slice(
        blake2b_simd::Params::new()
            .hash_length(HASH_SIZE)
            .hash(data)
            .as_bytes(),
    );
    hash
}

/// Hash the canonical serialization of an object.
pub fn hash_object<T: CanonicalSerialize>(object: &T) -> [u8; HASH_SIZE] {
    let mut writer = Writer::default();
    object
        .canonical_serialize(&mut writer)
        .expect("Blake2b writer is infallible");
    writer.finish()
}

/// Hash a 16-byte specifier followed by the canonical serialization of an
/// object. This is the shape of every transaction identifier and signature
/// input on the chain.
pub fn hash_object_with_specifier<T: CanonicalSerialize>(
    specifier: &Specifier,
    object: &T,
) -> [u8; HASH_SIZE] {
    use std::io::Write;

    let mut writer = Writer::default();
    writer
        .write_all(specifier.as_bytes())
        .expect("Blake2b writer is infallible");
    object
        .canonical_serialize(&mut writer)
        .expect("Blake2b writer is infallible");
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_matches_oneshot_hash() {
        use std::io::Write;

        let mut writer = Writer::default();
        writer.write_all(b"stake").unwrap();
        writer.write_all(b"coin").unwrap();
        assert_eq!(writer.finish(), hash_bytes(b"stakecoin"));
    }

    #[test]
    fn hash_is_256_bits() {
        assert_eq!(hash_bytes(b"").len(), 32);
    }
}
