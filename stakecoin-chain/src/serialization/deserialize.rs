use byteorder::{LittleEndian, ReadBytesExt};
use std::io;
use std::io::Read;

use super::SerializationError;

type Result<R> = std::result::Result<R, SerializationError>;

pub trait CanonicalDeserialize {
    fn canonical_deserialize<R: io::Read>(reader: R) -> Result<Self>
    where
        Self: Sized;
}

/// Helper for deserializing more succinctly via type inference
pub trait CanonicalDeserializeInto {
    /// Deserialize based on type inference
    fn canonical_deserialize_into<T>(self) -> Result<T>
    where
        T: CanonicalDeserialize;
}

impl<R: io::Read> CanonicalDeserializeInto for R {
    fn canonical_deserialize_into<T>(self) -> Result<T>
    where
        T: CanonicalDeserialize,
    {
        T::canonical_deserialize(self)
    }
}

impl CanonicalDeserialize for bool {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<bool> {
        let value = reader.read_u8()?;
        match value {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SerializationError::Parse("invalid bool")),
        }
    }
}

impl CanonicalDeserialize for u8 {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<u8> {
        Ok(reader.read_u8()?)
    }
}

impl CanonicalDeserialize for u16 {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<u16> {
        Ok(reader.read_u16::<LittleEndian>()?)
    }
}

impl CanonicalDeserialize for u32 {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<u32> {
        Ok(reader.read_u32::<LittleEndian>()?)
    }
}

impl CanonicalDeserialize for u64 {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<u64> {
        Ok(reader.read_u64::<LittleEndian>()?)
    }
}

impl CanonicalDeserialize for i64 {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<i64> {
        Ok(reader.read_i64::<LittleEndian>()?)
    }
}

impl<T> CanonicalDeserialize for Vec<T>
where
    T: CanonicalDeserialize,
{
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<Vec<T>> {
        let len = u64::canonical_deserialize(&mut reader)? as usize;
        // Limit preallocation since blind preallocation is a DOS vulnerability;
        // the overall size caps are enforced by the containing block or
        // transaction decoder through `Read::take`.
        let blind_alloc_limit = 1024;
        let mut result: Vec<T> = Vec::with_capacity(std::cmp::min(len, blind_alloc_limit));
        for _ in 0..len {
            result.push(T::canonical_deserialize(&mut reader)?);
        }
        Ok(result)
    }
}

impl CanonicalDeserialize for String {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<String> {
        let len = u64::canonical_deserialize(&mut reader)? as usize;
        let blind_alloc_limit = 1024;
        let mut buf = Vec::with_capacity(std::cmp::min(len, blind_alloc_limit));
        let read = reader.take(len as u64).read_to_end(&mut buf)?;
        if read != len {
            return Err(SerializationError::Parse("string is truncated"));
        }
        String::from_utf8(buf).map_err(|_| SerializationError::Parse("invalid utf-8"))
    }
}

impl<T: Sized + CanonicalDeserialize> CanonicalDeserialize for Option<T> {
    fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<Option<T>> {
        match reader.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::canonical_deserialize(reader)?)),
            _ => Err(SerializationError::Parse("invalid option tag")),
        }
    }
}

macro_rules! impl_deserializable_byte_array {
    ($size:expr) => {
        impl CanonicalDeserialize for [u8; $size] {
            fn canonical_deserialize<R: io::Read>(mut reader: R) -> Result<[u8; $size]> {
                let mut result = [0u8; $size];
                reader.read_exact(&mut result)?;
                Ok(result)
            }
        }
    };
}

impl_deserializable_byte_array!(8);
impl_deserializable_byte_array!(16);
impl_deserializable_byte_array!(32);
impl_deserializable_byte_array!(64);
