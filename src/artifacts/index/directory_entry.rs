use crate::artifacts::index::crc::{CRC_SIZE, Crc, CrcReader};
use crate::artifacts::index::error::{IndexError, Result};
use crate::artifacts::index::{DIRECTORY_DATA_SIZE, codec};
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use std::io::{Read, Write};

/// Directory record of a v5 index
///
/// `file_offset` is relative to the file block, `conflict_offset` is absolute
/// and zero when the directory has no conflict records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Directory path without trailing slash, `""` for the root
    pub path: String,
    pub file_offset: u32,
    pub conflict_offset: u32,
    pub nconflicts: u32,
    pub nsubtrees: u32,
    pub nfiles: u32,
    /// Cache-tree entry count, `-1` without valid cache-tree data
    pub nentries: i32,
    /// Cache-tree id, only for valid cache-tree data
    pub oid: Option<ObjectId>,
    pub flags: u16,
}

impl DirectoryEntry {
    pub fn new(path: impl Into<String>) -> Self {
        DirectoryEntry {
            path: path.into(),
            nentries: -1,
            ..Default::default()
        }
    }

    /// Name as stored on disk: `""` for the root, `path + "/"` otherwise
    pub fn name(&self) -> String {
        disk_name(&self.path)
    }

    /// Bytes following the nul-terminated name
    pub fn data_size() -> usize {
        DIRECTORY_DATA_SIZE + CRC_SIZE
    }

    /// The fixed data and crc, i.e. the record without its name
    pub fn serialize_data(&self) -> Result<Bytes> {
        let record = self.serialize()?;
        Ok(record.slice(record.len() - Self::data_size()..))
    }
}

/// On-disk directory name for a path
pub fn disk_name(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{path}/")
    }
}

impl Packable for DirectoryEntry {
    fn serialize(&self) -> Result<Bytes> {
        let name = self.name();
        let mut bytes = Vec::with_capacity(name.len() + 1 + Self::data_size());
        bytes.write_all(name.as_bytes())?;
        bytes.push(0);
        bytes.write_u32::<byteorder::NetworkEndian>(self.file_offset)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.conflict_offset)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.nconflicts)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.nsubtrees)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.nfiles)?;
        bytes.write_i32::<byteorder::NetworkEndian>(self.nentries)?;
        self.oid.unwrap_or(ObjectId::ZERO).write_h40_to(&mut bytes)?;
        bytes.write_u16::<byteorder::NetworkEndian>(self.flags)?;

        let mut crc = Crc::new();
        crc.add(&bytes);
        crc.write_to(&mut bytes)?;

        Ok(Bytes::from(bytes))
    }
}

impl Unpackable for DirectoryEntry {
    fn deserialize(reader: &mut impl Read) -> Result<Self> {
        let mut reader = CrcReader::new(reader);

        let name = codec::read_name_bytes(&mut reader, "directory record")?;
        let data = codec::read_fixed::<DIRECTORY_DATA_SIZE, _>(&mut reader, "directory record")?;
        if !reader.verify()? {
            return Err(IndexError::integrity(format!(
                "directory {:?}",
                String::from_utf8_lossy(&name)
            )));
        }

        let name = codec::into_name(name, "directory record")?;
        let path = match name.strip_suffix('/') {
            Some(path) if !path.is_empty() => path.to_string(),
            None if name.is_empty() => String::new(),
            _ => {
                return Err(IndexError::format(format!(
                    "bad directory name {name:?}"
                )));
            }
        };

        let oid = ObjectId::read_h40_from(&mut &data[24..44])?;
        Ok(DirectoryEntry {
            path,
            file_offset: byteorder::NetworkEndian::read_u32(&data[0..4]),
            conflict_offset: byteorder::NetworkEndian::read_u32(&data[4..8]),
            nconflicts: byteorder::NetworkEndian::read_u32(&data[8..12]),
            nsubtrees: byteorder::NetworkEndian::read_u32(&data[12..16]),
            nfiles: byteorder::NetworkEndian::read_u32(&data[16..20]),
            nentries: byteorder::NetworkEndian::read_i32(&data[20..24]),
            oid: (!oid.is_zero()).then_some(oid),
            flags: byteorder::NetworkEndian::read_u16(&data[44..46]),
        })
    }
}
