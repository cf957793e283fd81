use crate::artifacts::index::error::Result;
use bytes::Bytes;
use std::io::Read;

/// A record with a fixed on-disk encoding
pub trait Packable {
    fn serialize(&self) -> Result<Bytes>;
}

/// The reading half of [`Packable`]
///
/// Implementations consume exactly the bytes of one record and report a
/// short read as `IndexError::TruncatedRecord`.
pub trait Unpackable {
    fn deserialize(reader: &mut impl Read) -> Result<Self>
    where
        Self: Sized;
}
