//! File records of a v5 index
//!
//! A record stores only the basename; the directory is implied by where the
//! record sits in the file block. Its crc starts with the record's own offset
//! (relative to the file block), so a record copied to another position no
//! longer verifies.

use crate::artifacts::index::crc::{CRC_SIZE, Crc, CrcReader};
use crate::artifacts::index::entry_flags::FileFlags;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::error::{IndexError, Result};
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::index::{FILE_DATA_SIZE, codec};
use crate::artifacts::objects::OBJECT_ID_BYTES;
use crate::artifacts::objects::object_id::ObjectId;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use std::io::{Read, Write};

/// Fast-changed check over the stat fields that have no slot of their own
pub fn stat_crc(metadata: &EntryMetadata) -> u32 {
    let mut crc = Crc::new();
    for value in [
        metadata.ctime,
        metadata.ctime_nsec,
        metadata.ino,
        metadata.size,
        metadata.dev,
        metadata.uid,
        metadata.gid,
    ] {
        crc.add(&value.to_be_bytes());
    }
    crc.value()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Full path; only the basename is stored on disk
    pub path: String,
    pub flags: FileFlags,
    pub mode: EntryMode,
    pub mtime: u32,
    pub mtime_nsec: u32,
    pub stat_crc: u32,
    pub oid: ObjectId,
}

impl FileEntry {
    pub fn basename(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map_or(self.path.as_str(), |(_, basename)| basename)
    }

    pub fn dirname(&self) -> &str {
        self.path.rsplit_once('/').map_or("", |(dirname, _)| dirname)
    }

    pub fn stage(&self) -> u8 {
        self.flags.stage()
    }

    pub fn on_disk_size(&self) -> usize {
        self.basename().len() + 1 + FILE_DATA_SIZE + CRC_SIZE
    }

    /// Encode the record that will sit at `offset` within the file block
    pub fn serialize_at(&self, offset: u32) -> Result<Bytes> {
        let mut bytes = Vec::with_capacity(self.on_disk_size());
        bytes.write_all(self.basename().as_bytes())?;
        bytes.push(0);
        bytes.write_u16::<byteorder::NetworkEndian>(self.flags.bits())?;
        bytes.write_u16::<byteorder::NetworkEndian>(self.mode.as_u16())?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.mtime)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.mtime_nsec)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.stat_crc)?;
        self.oid.write_h40_to(&mut bytes)?;

        let mut crc = Crc::new();
        crc.add(&offset.to_be_bytes());
        crc.add(&bytes);
        crc.write_to(&mut bytes)?;

        Ok(Bytes::from(bytes))
    }

    /// Decode the record found at `offset` within the file block
    ///
    /// `dirname` is the directory the reader is currently walking.
    pub fn read_at(reader: &mut impl Read, dirname: &str, offset: u32) -> Result<Self> {
        let mut crc = Crc::new();
        crc.add(&offset.to_be_bytes());
        let mut reader = CrcReader::with_crc(reader, crc);

        let name = codec::read_name_bytes(&mut reader, "file record")?;
        let data = codec::read_fixed::<FILE_DATA_SIZE, _>(&mut reader, "file record")?;
        if !reader.verify()? {
            return Err(IndexError::integrity(format!(
                "file {dirname}{}{} at offset {offset}",
                if dirname.is_empty() { "" } else { "/" },
                String::from_utf8_lossy(&name)
            )));
        }

        let name = codec::into_name(name, "file record")?;
        if name.is_empty() || name.contains('/') {
            return Err(IndexError::format(format!("bad file name {name:?}")));
        }
        let path = if dirname.is_empty() {
            name
        } else {
            format!("{dirname}/{name}")
        };

        let mode = byteorder::NetworkEndian::read_u16(&data[2..4]) as u32;
        let mut oid = [0u8; OBJECT_ID_BYTES];
        oid.copy_from_slice(&data[16..36]);

        Ok(FileEntry {
            path,
            flags: FileFlags::from_bits_retain(byteorder::NetworkEndian::read_u16(&data[0..2])),
            mode: EntryMode::try_from(mode)?,
            mtime: byteorder::NetworkEndian::read_u32(&data[4..8]),
            mtime_nsec: byteorder::NetworkEndian::read_u32(&data[8..12]),
            stat_crc: byteorder::NetworkEndian::read_u32(&data[12..16]),
            oid: ObjectId::from_bytes(oid),
        })
    }
}

impl From<&IndexEntry> for FileEntry {
    fn from(entry: &IndexEntry) -> Self {
        FileEntry {
            path: entry.name.clone(),
            flags: entry.file_flags(),
            mode: entry.metadata.mode,
            mtime: entry.metadata.mtime,
            mtime_nsec: entry.metadata.mtime_nsec,
            stat_crc: stat_crc(&entry.metadata),
            oid: entry.oid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::crc::crc_of;
    use crate::artifacts::index::entry_flags::EntryFlags;
    use crate::artifacts::index::entry_mode::FileMode;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn legacy(name: &str) -> IndexEntry {
        IndexEntry::new(
            name.to_string(),
            ObjectId::from_bytes([0x11; 20]),
            EntryMetadata {
                ctime: 1,
                ctime_nsec: 2,
                mtime: 3,
                mtime_nsec: 4,
                dev: 5,
                ino: 6,
                mode: EntryMode::File(FileMode::Executable),
                uid: 7,
                gid: 8,
                size: 9,
            },
            EntryFlags::for_entry(name.len(), 0),
            None,
        )
    }

    #[test]
    fn stat_crc_covers_ctime_ino_size_dev_uid_gid() {
        let expected: Vec<u8> = [1u32, 2, 6, 9, 5, 7, 8]
            .iter()
            .flat_map(|value| value.to_be_bytes())
            .collect();

        assert_eq!(stat_crc(&legacy("a").metadata), crc_of(&expected));
    }

    #[test]
    fn record_stores_basename_only() {
        let file = FileEntry::from(&legacy("docs/readme.txt"));
        let bytes = file.serialize_at(0).unwrap();

        assert_eq!(bytes.len(), "readme.txt".len() + 1 + 36 + 4);
        assert_eq!(&bytes[..11], b"readme.txt\0");
        assert_eq!(&bytes[13..15], &(0o100755u16).to_be_bytes());
    }

    #[test]
    fn reads_back_under_its_directory() {
        let file = FileEntry::from(&legacy("docs/readme.txt"));
        let bytes = file.serialize_at(48).unwrap();

        let read = FileEntry::read_at(&mut bytes.as_ref(), "docs", 48).unwrap();
        assert_eq!(read, file);
        assert_eq!(read.dirname(), "docs");
    }

    #[test]
    fn crc_covers_the_record_offset() {
        let bytes = FileEntry::from(&legacy("x")).serialize_at(48).unwrap();

        let err = FileEntry::read_at(&mut bytes.as_ref(), "", 52).unwrap_err();
        assert!(err.is_integrity());
    }

    proptest! {
        #[test]
        fn any_flipped_byte_is_detected(position in 0usize..(7 + 1 + 36), bit in 0u8..8) {
            let bytes = FileEntry::from(&legacy("main.rs")).serialize_at(0).unwrap();
            let mut damaged = bytes.to_vec();
            damaged[position] ^= 1 << bit;
            damaged.extend_from_slice(&[0x5a; 64]);

            let err = FileEntry::read_at(&mut damaged.as_slice(), "src", 0).unwrap_err();
            prop_assert!(err.is_integrity(), "{}", err);
        }
    }
}
