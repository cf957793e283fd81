//! Legacy index entry representation
//!
//! Each entry in a version 2/3 index represents one tracked path at one merge
//! stage with:
//! - File path (full, `/`-separated)
//! - Content hash (object ID)
//! - File metadata (mode, size, timestamps)
//! - Flags (stage, name length, assume-valid, extended flags)
//!
//! ## Entry Format
//!
//! Entries are stored in a binary format with 8-byte alignment. The fixed
//! prefix is 62 bytes, or 64 when a version 3 entry carries extended flags.
//! An entry occupies `(prefix + name_length + 8) & !7` bytes, which always
//! leaves room for at least one nul terminator.

use crate::artifacts::index::codec;
use crate::artifacts::index::entry_flags::{EntryFlags, ExtendedFlags, FileFlags};
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::error::Result;
use crate::artifacts::objects::OBJECT_ID_BYTES;
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use std::io::{Read, Write};

/// Block size for entry alignment (8 bytes)
pub const ENTRY_BLOCK: usize = 8;

/// Stat data, object id and first flags word
pub const ENTRY_PREFIX_SIZE: usize = 62;

/// Prefix of an entry that also carries the extended flags word
pub const EXTENDED_ENTRY_PREFIX_SIZE: usize = 64;

/// Size of the ten stat words at the start of an entry
const STAT_SIZE: usize = 40;

/// Index entry representing a tracked file at one merge stage
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct IndexEntry {
    /// File path relative to repository root
    pub name: String,
    /// SHA-1 hash of file content
    pub oid: ObjectId,
    /// File metadata (mode, size, timestamps)
    pub metadata: EntryMetadata,
    pub flags: EntryFlags,
    /// Present only for version 3 entries with `EntryFlags::EXTENDED`
    pub extended_flags: Option<ExtendedFlags>,
}

impl IndexEntry {
    pub fn stage(&self) -> u8 {
        self.flags.stage()
    }

    pub fn basename(&self) -> &str {
        self.name
            .rsplit_once('/')
            .map_or(self.name.as_str(), |(_, basename)| basename)
    }

    /// Directory containing the entry, `""` for the repository root
    pub fn dirname(&self) -> &str {
        self.name.rsplit_once('/').map_or("", |(dirname, _)| dirname)
    }

    /// Every proper ancestor directory, outermost first, root excluded
    pub fn parent_dirs(&self) -> Vec<&str> {
        self.name
            .match_indices('/')
            .map(|(position, _)| &self.name[..position])
            .collect()
    }

    /// Flags word of the v5 file record for this entry
    pub fn file_flags(&self) -> FileFlags {
        FileFlags::from_legacy(self.flags, self.extended_flags)
    }

    /// Bytes this entry occupies in a legacy index, padding included
    pub fn on_disk_size(&self) -> usize {
        let prefix = if self.extended_flags.is_some() {
            EXTENDED_ENTRY_PREFIX_SIZE
        } else {
            ENTRY_PREFIX_SIZE
        };
        (prefix + self.name.len() + ENTRY_BLOCK) & !(ENTRY_BLOCK - 1)
    }
}

/// File metadata stored in index entries
///
/// Every field is stored as a 32-bit word on disk, so wider stat values are
/// already truncated by whoever wrote the index.
///
/// ## Timestamps
///
/// - `ctime`: File status change time (inode modification)
/// - `mtime`: File content modification time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Change time (seconds since Unix epoch)
    pub ctime: u32,
    /// Change time nanoseconds
    pub ctime_nsec: u32,
    /// Modification time (seconds since Unix epoch)
    pub mtime: u32,
    /// Modification time nanoseconds
    pub mtime_nsec: u32,
    /// Device ID
    pub dev: u32,
    /// Inode number
    pub ino: u32,
    /// File mode (permissions and type)
    pub mode: EntryMode,
    /// User ID of owner
    pub uid: u32,
    /// Group ID of owner
    pub gid: u32,
    /// File size in bytes
    pub size: u32,
}

impl Packable for IndexEntry {
    fn serialize(&self) -> Result<Bytes> {
        let mut entry_bytes = Vec::with_capacity(self.on_disk_size());
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime_nsec)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mtime)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mtime_nsec)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.dev)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ino)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mode.as_u32())?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.uid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.gid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.size)?;
        self.oid.write_h40_to(&mut entry_bytes)?;

        let mut flags = self.flags;
        flags.set(EntryFlags::EXTENDED, self.extended_flags.is_some());
        entry_bytes.write_u16::<byteorder::NetworkEndian>(flags.bits())?;
        if let Some(extended_flags) = self.extended_flags {
            entry_bytes.write_u16::<byteorder::NetworkEndian>(extended_flags.bits())?;
        }
        entry_bytes.write_all(self.name.as_bytes())?;

        // Ensure the entry bytes are padded to ENTRY_BLOCK size with null bytes
        entry_bytes.resize(self.on_disk_size(), 0);

        Ok(Bytes::from(entry_bytes))
    }
}

impl Unpackable for IndexEntry {
    /// Reads one entry including its padding
    ///
    /// The extended flags word is read whenever the entry says it is there;
    /// whether that is allowed for the file's version is up to the caller.
    fn deserialize(reader: &mut impl Read) -> Result<Self> {
        let stat = codec::read_fixed::<STAT_SIZE, _>(reader, "index entry stat data")?;
        let word = |index: usize| byteorder::NetworkEndian::read_u32(&stat[index * 4..index * 4 + 4]);

        let metadata = EntryMetadata {
            ctime: word(0),
            ctime_nsec: word(1),
            mtime: word(2),
            mtime_nsec: word(3),
            dev: word(4),
            ino: word(5),
            mode: EntryMode::try_from(word(6))?,
            uid: word(7),
            gid: word(8),
            size: word(9),
        };
        let oid = ObjectId::read_h40_from(reader)?;

        let flags = codec::read_fixed::<2, _>(reader, "index entry flags")?;
        let flags = EntryFlags::from_bits_retain(byteorder::NetworkEndian::read_u16(&flags));
        let extended_flags = if flags.contains(EntryFlags::EXTENDED) {
            let extended = codec::read_fixed::<2, _>(reader, "index entry extended flags")?;
            Some(ExtendedFlags::from_bits_retain(
                byteorder::NetworkEndian::read_u16(&extended),
            ))
        } else {
            None
        };

        let name = codec::read_name(reader, "index entry name")?;
        let entry = IndexEntry {
            name,
            oid,
            metadata,
            flags,
            extended_flags,
        };

        // The terminator was consumed with the name, the rest is padding
        let consumed = STAT_SIZE + OBJECT_ID_BYTES + 2 + entry.extended_flags.map_or(0, |_| 2);
        let padding = entry.on_disk_size() - consumed - entry.name.len() - 1;
        codec::skip(reader, padding, "index entry padding")?;

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::FileMode;
    use crate::artifacts::index::error::IndexError;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use sha1::Digest;

    #[fixture]
    fn oid() -> ObjectId {
        let mut hasher = sha1::Sha1::new();
        hasher.update("test data");
        ObjectId::try_parse(format!("{:x}", hasher.finalize())).unwrap()
    }

    fn entry(name: &str, oid: ObjectId, stage: u8) -> IndexEntry {
        IndexEntry::new(
            name.to_string(),
            oid,
            EntryMetadata {
                mtime: 1_700_000_000,
                mode: EntryMode::File(FileMode::Regular),
                size: 12,
                ..Default::default()
            },
            EntryFlags::for_entry(name.len(), stage),
            None,
        )
    }

    #[rstest]
    fn test_entry_parent_dirs(oid: ObjectId) {
        let entry = entry("a/b/c", oid, 0);

        assert_eq!(entry.parent_dirs(), vec!["a", "a/b"]);
        assert_eq!(entry.dirname(), "a/b");
    }

    #[rstest]
    fn test_entry_parent_dirs_root(oid: ObjectId) {
        let entry = entry("a", oid, 0);

        assert_eq!(entry.parent_dirs(), Vec::<&str>::new());
        assert_eq!(entry.dirname(), "");
    }

    #[rstest]
    fn test_entry_basename(oid: ObjectId) {
        assert_eq!(entry("a/b/c", oid, 0).basename(), "c");
        assert_eq!(entry("top", oid, 0).basename(), "top");
    }

    #[rstest]
    #[case("a", 64)]
    #[case("abcdefghijklmnopq", 80)]
    #[case("docs/readme.txt", 80)]
    #[case("ab", 72)]
    fn entries_are_padded_to_eight_bytes(oid: ObjectId, #[case] name: &str, #[case] size: usize) {
        let entry = entry(name, oid, 0);
        let bytes = entry.serialize().unwrap();

        assert_eq!(bytes.len(), size);
        assert_eq!(entry.on_disk_size(), size);
        assert_eq!(bytes[ENTRY_PREFIX_SIZE + name.len()], 0);
    }

    #[rstest]
    fn deserialize_consumes_padding(oid: ObjectId) {
        let first = entry("docs/readme.txt", oid, 0);
        let second = entry("src/main.c", oid, 2);
        let mut data = first.serialize().unwrap().to_vec();
        data.extend_from_slice(&second.serialize().unwrap());
        let mut reader = data.as_slice();

        assert_eq!(IndexEntry::deserialize(&mut reader).unwrap(), first);
        let read = IndexEntry::deserialize(&mut reader).unwrap();
        assert_eq!(read, second);
        assert_eq!(read.stage(), 2);
        assert!(reader.is_empty());
    }

    #[rstest]
    fn extended_flags_widen_the_prefix(oid: ObjectId) {
        let mut extended = entry("a", oid, 0);
        extended.extended_flags = Some(ExtendedFlags::SKIP_WORKTREE);
        extended.flags |= EntryFlags::EXTENDED;
        let bytes = extended.serialize().unwrap();

        assert_eq!(bytes.len(), 72);
        let read = IndexEntry::deserialize(&mut bytes.as_ref()).unwrap();
        assert_eq!(read.extended_flags, Some(ExtendedFlags::SKIP_WORKTREE));
        assert!(read.file_flags().contains(FileFlags::SKIP_WORKTREE));
    }

    #[rstest]
    fn truncated_entry_reports_record(oid: ObjectId) {
        let bytes = entry("a", oid, 0).serialize().unwrap();

        let err = IndexEntry::deserialize(&mut &bytes[..30]).unwrap_err();
        assert!(matches!(err, IndexError::TruncatedRecord { .. }));
    }
}
