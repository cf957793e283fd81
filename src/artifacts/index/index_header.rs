use crate::artifacts::index::codec;
use crate::artifacts::index::crc::{CRC_SIZE, Crc, CrcReader};
use crate::artifacts::index::error::{IndexError, Result};
use crate::artifacts::index::{
    LEGACY_HEADER_SIZE, LEGACY_VERSIONS, OFFSET_SIZE, SIGNATURE, V5_HEADER_SIZE, V5_VERSION,
};
use crate::artifacts::objects::object::{Packable, Unpackable};
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use std::io::{Read, Write};

fn check_signature(signature: &[u8; 4]) -> Result<()> {
    if signature != SIGNATURE {
        return Err(IndexError::format(format!(
            "bad signature {:?}",
            String::from_utf8_lossy(signature)
        )));
    }
    Ok(())
}

/// Header of a version 2 or 3 index
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct LegacyHeader {
    pub version: u32,
    pub entries_count: u32,
}

impl Packable for LegacyHeader {
    fn serialize(&self) -> Result<Bytes> {
        // pack!(SIGNATURE, self.version, self.entries_count => "a4N2")
        let mut bytes = Vec::new();
        bytes.write_all(SIGNATURE)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.version)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.entries_count)?;

        Ok(Bytes::from(bytes))
    }
}

impl Unpackable for LegacyHeader {
    fn deserialize(reader: &mut impl Read) -> Result<Self> {
        let bytes = codec::read_fixed::<LEGACY_HEADER_SIZE, _>(reader, "index header")?;

        check_signature(&[bytes[0], bytes[1], bytes[2], bytes[3]])?;
        let version = byteorder::NetworkEndian::read_u32(&bytes[4..8]);
        if !LEGACY_VERSIONS.contains(&version) {
            return Err(IndexError::format(format!(
                "unsupported index version {version}"
            )));
        }
        let entries_count = byteorder::NetworkEndian::read_u32(&bytes[8..12]);

        Ok(LegacyHeader {
            version,
            entries_count,
        })
    }
}

/// Header of a version 5 index
///
/// `file_offset` is absolute; it points at the first file record, right
/// after the file-offset table.
#[derive(Debug, Clone, Default, PartialEq, Eq, new)]
pub struct V5Header {
    pub directories: u32,
    pub files: u32,
    pub file_offset: u32,
    pub extension_offsets: Vec<u32>,
}

impl V5Header {
    /// On-disk size including extension offsets and the trailing CRC
    pub fn size(&self) -> usize {
        Self::size_for(self.extension_offsets.len())
    }

    pub fn size_for(extensions: usize) -> usize {
        V5_HEADER_SIZE + extensions * OFFSET_SIZE + CRC_SIZE
    }
}

impl Packable for V5Header {
    fn serialize(&self) -> Result<Bytes> {
        let mut bytes = Vec::with_capacity(self.size());
        bytes.write_all(SIGNATURE)?;
        bytes.write_u32::<byteorder::NetworkEndian>(V5_VERSION)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.directories)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.files)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.file_offset)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.extension_offsets.len() as u32)?;
        for offset in &self.extension_offsets {
            bytes.write_u32::<byteorder::NetworkEndian>(*offset)?;
        }

        let mut crc = Crc::new();
        crc.add(&bytes);
        crc.write_to(&mut bytes)?;

        Ok(Bytes::from(bytes))
    }
}

impl Unpackable for V5Header {
    /// Signature and version are checked before the CRC, the CRC before any
    /// count is handed out.
    fn deserialize(reader: &mut impl Read) -> Result<Self> {
        let mut reader = CrcReader::new(reader);

        let signature = codec::read_fixed::<4, _>(&mut reader, "index header")?;
        check_signature(&signature)?;
        let version = codec::read_u32(&mut reader, "index header")?;
        if version != V5_VERSION {
            return Err(IndexError::format(format!(
                "unsupported index version {version}"
            )));
        }

        let directories = codec::read_u32(&mut reader, "index header")?;
        let files = codec::read_u32(&mut reader, "index header")?;
        let file_offset = codec::read_u32(&mut reader, "index header")?;
        let extensions = codec::read_u32(&mut reader, "index header")?;

        let mut extension_offsets = Vec::new();
        for _ in 0..extensions {
            extension_offsets.push(codec::read_u32(&mut reader, "extension offsets")?);
        }

        if !reader.verify()? {
            return Err(IndexError::integrity("header"));
        }

        Ok(V5Header {
            directories,
            files,
            file_offset,
            extension_offsets,
        })
    }
}
