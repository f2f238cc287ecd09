//! Consensus-critical serialization.
//!
//! This module contains the `CanonicalSerialize` and `CanonicalDeserialize`
//! traits: analogs of the Serde `Serialize` and `Deserialize` traits, but for
//! the canonical binary encoding every hash and signature in the chain is
//! computed over. The encoding is deterministic by construction: fixed-width
//! little-endian integers, a `u64` length prefix for variable sequences, and
//! field order equal to declaration order.
//!
//! JSON forms of the same types exist purely as an API mirror and are
//! implemented with Serde; they must round-trip through the binary encoding.

mod deserialize;
mod error;

pub mod blake2b;
pub mod hex_serde;

pub use deserialize::{CanonicalDeserialize, CanonicalDeserializeInto};
pub use error::SerializationError;

use byteorder::{LittleEndian, WriteBytesExt};

pub trait CanonicalSerialize {
    fn canonical_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error>;

    fn canonical_serialize_to_vec(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut data = Vec::new();
        self.canonical_serialize(&mut data)?;
        Ok(data)
    }
}

impl CanonicalSerialize for bool {
    fn canonical_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self as u8])
    }
}

impl CanonicalSerialize for u8 {
    fn canonical_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self])
    }
}

impl CanonicalSerialize for u16 {
    fn canonical_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u16::<LittleEndian>(*self)
    }
}

impl CanonicalSerialize for u32 {
    fn canonical_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u32::<LittleEndian>(*self)
    }
}

impl CanonicalSerialize for u64 {
    fn canonical_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u64::<LittleEndian>(*self)
    }
}

impl CanonicalSerialize for i64 {
    fn canonical_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i64::<LittleEndian>(*self)
    }
}

macro_rules! impl_serializable_byte_array {
    ($size:expr) => {
        impl CanonicalSerialize for [u8; $size] {
            fn canonical_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
            where
                W: std::io::Write,
            {
                target.write_all(self)
            }
        }
    };
}

impl_serializable_byte_array!(8);
impl_serializable_byte_array!(16);
impl_serializable_byte_array!(32);
impl_serializable_byte_array!(64);

impl<T> CanonicalSerialize for Vec<T>
where
    T: CanonicalSerialize,
{
    fn canonical_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        (self.len() as u64).canonical_serialize(&mut target)?;
        for item in self.iter() {
            item.canonical_serialize(&mut target)?
        }
        Ok(())
    }
}

impl CanonicalSerialize for String {
    fn canonical_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        (self.len() as u64).canonical_serialize(&mut target)?;
        target.write_all(self.as_bytes())
    }
}

/// `None` is a zero byte, `Some` a one byte followed by the value.
impl<T: CanonicalSerialize> CanonicalSerialize for Option<T> {
    fn canonical_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        match self {
            Some(contents) => {
                1u8.canonical_serialize(&mut target)?;
                contents.canonical_serialize(&mut target)
            }
            None => 0u8.canonical_serialize(&mut target),
        }
    }
}
