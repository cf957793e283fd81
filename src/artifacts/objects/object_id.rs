//! Git object identifier (SHA-1 hash)
//!
//! Object IDs are kept as the 20 raw bytes found on disk. They are only
//! hex-encoded for display, e.g. `"abc123...def"` (40 characters).

use crate::artifacts::index::codec;
use crate::artifacts::index::error::{IndexError, Result};
use crate::artifacts::objects::{OBJECT_ID_BYTES, OBJECT_ID_LENGTH};
use std::io;

/// Git object identifier (SHA-1 hash)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_BYTES]);

impl ObjectId {
    pub const ZERO: ObjectId = ObjectId([0; OBJECT_ID_BYTES]);

    pub fn from_bytes(bytes: [u8; OBJECT_ID_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parse and validate an object ID from its 40-character hex form
    pub fn try_parse(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref();
        if id.len() != OBJECT_ID_LENGTH {
            return Err(IndexError::format(format!(
                "invalid object ID length: {}",
                id.len()
            )));
        }

        let mut bytes = [0u8; OBJECT_ID_BYTES];
        hex::decode_to_slice(id, &mut bytes)
            .map_err(|_| IndexError::format(format!("invalid object ID characters: {id}")))?;

        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_BYTES] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; OBJECT_ID_BYTES]
    }

    /// Write the object ID in binary format (20 bytes)
    pub fn write_h40_to<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.0)?;
        Ok(())
    }

    /// Read an object ID from binary format (20 bytes)
    pub fn read_h40_from<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self> {
        Ok(Self(codec::read_fixed::<OBJECT_ID_BYTES, R>(
            reader,
            "object id",
        )?))
    }

    /// First 7 characters of the hash (standard Git abbreviation)
    pub fn to_short_oid(&self) -> String {
        let mut hex = self.to_string();
        hex.truncate(7);
        hex
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
