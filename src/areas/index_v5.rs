//! Version 5 index reader
//!
//! Files are stored grouped by directory, but callers want them in plain
//! path order the way a legacy index lists them. [`IndexV5::parse`] walks the
//! directory table recursively and interleaves a directory's files with its
//! subdirectories by comparing each pending file path against the on-disk
//! name (`path + "/"`) of the next directory.
//!
//! Every offset that the tables claim is recomputed from where records are
//! actually found, so a damaged table is reported even when all records
//! still verify.

use crate::areas::legacy_index::LegacyIndex;
use crate::areas::v5_writer;
use crate::artifacts::index::cache_tree::{CacheTree, CacheTreeEntry};
use crate::artifacts::index::codec;
use crate::artifacts::index::conflict::ConflictEntry;
use crate::artifacts::index::crc::crc_of;
use crate::artifacts::index::directory_entry::{DirectoryEntry, disk_name};
use crate::artifacts::index::error::{IndexError, Result};
use crate::artifacts::index::file_entry::FileEntry;
use crate::artifacts::index::index_header::{LegacyHeader, V5Header};
use crate::artifacts::index::{OFFSET_SIZE, V5_HEADER_SIZE};
use crate::artifacts::objects::object::Unpackable;
use byteorder::ByteOrder;
use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::ops::DerefMut;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexV5 {
    header: V5Header,
    /// In on-disk order, which is a pre-order walk of the tree
    directories: Vec<DirectoryEntry>,
    /// In path order
    files: Vec<FileEntry>,
    /// Grouped by directory, in directory order
    conflicts: Vec<ConflictEntry>,
}

impl IndexV5 {
    /// Read and verify the index at `path` under a shared lock
    pub fn load(path: &Path) -> Result<Self> {
        let mut index_file = std::fs::OpenOptions::new().read(true).open(path)?;
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;

        let mut data = Vec::new();
        lock.deref_mut().read_to_end(&mut data)?;
        drop(lock);

        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let minimum = V5Header::size_for(0);
        if data.len() < minimum {
            return Err(IndexError::TruncatedFile {
                size: data.len() as u64,
                minimum: minimum as u64,
            });
        }

        let mut cursor = Cursor::new(data);
        let header = read_header(&mut cursor)?;
        let ndir = header.directories as usize;
        let nfile = header.files as usize;

        // Directory block
        let dir_table = read_offsets(&mut cursor, ndir + 1, "directory offsets")?;
        let dir_block = cursor.position();
        let mut directories = Vec::with_capacity(ndir);
        for (dirnr, expected) in dir_table[..ndir].iter().enumerate() {
            let position = cursor.position() - dir_block;
            check_offset(position, *expected, "directory offset table")?;
            let directory = DirectoryEntry::deserialize(&mut cursor);
            directories.push(damaged_if_truncated(
                directory,
                dir_block + dir_table[dirnr + 1] as u64,
                data,
                || format!("directory record at offset {position}"),
            )?);
        }
        check_offset(cursor.position() - dir_block, dir_table[ndir], "directory offset table")?;

        match directories.first() {
            Some(root) if root.path.is_empty() => {}
            Some(first) => {
                return Err(IndexError::format(format!(
                    "first directory is {:?}, not the root",
                    first.path
                )));
            }
            None => return Err(IndexError::format("index has no root directory")),
        }

        // File block
        let file_table = read_offsets(&mut cursor, nfile + 1, "file offsets")?;
        if cursor.position() != header.file_offset as u64 {
            return Err(IndexError::format(format!(
                "file block starts at {}, header says {}",
                cursor.position(),
                header.file_offset
            )));
        }

        let mut walk = FileWalk {
            cursor: &mut cursor,
            file_block: header.file_offset as u64,
            directories: &directories,
            table: &file_table,
            read: 0,
            files: Vec::with_capacity(nfile),
        };
        let mut next = 0;
        while next < directories.len() {
            next = walk.directory(next)?;
        }
        let files = walk.files;
        if files.len() != nfile {
            return Err(IndexError::format(format!(
                "header announces {nfile} files, directories hold {}",
                files.len()
            )));
        }
        check_offset(
            cursor.position() - header.file_offset as u64,
            file_table[nfile],
            "file offset table",
        )?;

        // Conflict block
        let mut conflicts = Vec::new();
        for directory in directories.iter().filter(|directory| directory.nconflicts > 0) {
            cursor.set_position(directory.conflict_offset as u64);
            for _ in 0..directory.nconflicts {
                conflicts.push(ConflictEntry::deserialize(&mut cursor)?);
            }
        }

        debug!(
            directories = directories.len(),
            files = files.len(),
            conflicts = conflicts.len(),
            "parsed v5 index"
        );
        Ok(IndexV5 {
            header,
            directories,
            files,
            conflicts,
        })
    }

    pub fn header(&self) -> &V5Header {
        &self.header
    }

    pub fn directories(&self) -> &[DirectoryEntry] {
        &self.directories
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn conflicts(&self) -> &[ConflictEntry] {
        &self.conflicts
    }

    /// Cache-tree rebuilt from the directory records
    pub fn cache_tree(&self) -> CacheTree {
        CacheTree::new(
            self.directories
                .iter()
                .map(|directory| {
                    CacheTreeEntry::new(
                        directory.path.clone(),
                        directory.nentries,
                        directory.nsubtrees,
                        directory.oid.filter(|_| directory.nentries >= 0),
                    )
                })
                .collect(),
        )
    }

    /// Describe every way this index differs from what converting `legacy`
    /// should produce; empty when they agree
    pub fn verify_against(&self, legacy: &LegacyIndex) -> Result<Vec<String>> {
        let mut mismatches = Vec::new();

        // the walk yields files in path order whatever order the legacy file used
        let mut expected_files: Vec<FileEntry> =
            legacy.primary_entries().map(FileEntry::from).collect();
        expected_files.sort_by(|a, b| a.path.cmp(&b.path));
        if expected_files.len() != self.files.len() {
            mismatches.push(format!(
                "{} files, expected {}",
                self.files.len(),
                expected_files.len()
            ));
        }
        for (actual, expected) in self.files.iter().zip(&expected_files) {
            if actual != expected {
                mismatches.push(format!(
                    "file {:?} differs from {:?}",
                    actual.path, expected.path
                ));
            }
        }

        let tree = v5_writer::directory_tree(legacy)?;
        if tree.len() != self.directories.len() {
            mismatches.push(format!(
                "{} directories, expected {}",
                self.directories.len(),
                tree.len()
            ));
        }
        for (actual, expected) in self.directories.iter().zip(tree.iter()) {
            let same = actual.path == expected.path
                && actual.nsubtrees == expected.nsubtrees
                && actual.nfiles == expected.nfiles
                && actual.nentries == expected.nentries
                && actual.oid == expected.oid;
            if !same {
                mismatches.push(format!(
                    "directory {:?} differs from {:?}",
                    actual.path, expected.path
                ));
            }
        }

        let expected_conflicts: Vec<ConflictEntry> = v5_writer::conflict_records(legacy, &tree)
            .into_values()
            .flatten()
            .collect();
        if expected_conflicts != self.conflicts {
            mismatches.push(format!(
                "{} conflict records do not match the {} expected",
                self.conflicts.len(),
                expected_conflicts.len()
            ));
        }

        Ok(mismatches)
    }
}

/// Header, reporting damage as such when the header crc does not hold
fn read_header(cursor: &mut Cursor<&[u8]>) -> Result<V5Header> {
    let data = *cursor.get_ref();
    match V5Header::deserialize(cursor) {
        Err(err) if !err.is_integrity() && !is_legacy(data) && !header_crc_matches(data) => {
            debug!(%err, "header failed to parse and does not verify");
            Err(IndexError::integrity("header"))
        }
        result => result,
    }
}

fn is_legacy(data: &[u8]) -> bool {
    LegacyHeader::deserialize(&mut &data[..]).is_ok()
}

fn header_crc_matches(data: &[u8]) -> bool {
    let stored = byteorder::NetworkEndian::read_u32(&data[V5_HEADER_SIZE..V5_HEADER_SIZE + 4]);
    crc_of(&data[..V5_HEADER_SIZE]) == stored
}

fn read_offsets(
    cursor: &mut Cursor<&[u8]>,
    count: usize,
    record: &'static str,
) -> Result<Vec<u32>> {
    let available = (cursor.get_ref().len() as u64).saturating_sub(cursor.position());
    let needed = count as u64 * OFFSET_SIZE as u64;
    if needed > available {
        return Err(IndexError::TruncatedRecord {
            record,
            needed: (needed - available) as usize,
        });
    }

    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        offsets.push(codec::read_u32(cursor, record)?);
    }
    Ok(offsets)
}

/// A record that runs past the end of the data although the offset tables
/// say it ends before then has lost its framing to damage
fn damaged_if_truncated<T>(
    result: Result<T>,
    record_end: u64,
    data: &[u8],
    subject: impl FnOnce() -> String,
) -> Result<T> {
    match result {
        Err(IndexError::TruncatedRecord { .. }) if record_end <= data.len() as u64 => {
            Err(IndexError::integrity(subject()))
        }
        result => result,
    }
}

fn check_offset(actual: u64, expected: u32, table: &'static str) -> Result<()> {
    if actual != expected as u64 {
        return Err(IndexError::integrity(format!(
            "{table}: entry says {expected}, record is at {actual}"
        )));
    }
    Ok(())
}

struct FileWalk<'w, 'd> {
    cursor: &'w mut Cursor<&'d [u8]>,
    file_block: u64,
    directories: &'w [DirectoryEntry],
    /// File offsets, end sentinel included
    table: &'w [u32],
    /// Records read so far, in on-disk order
    read: usize,
    files: Vec<FileEntry>,
}

impl FileWalk<'_, '_> {
    /// Emit the files of directory `dirnr` and of every subdirectory that
    /// sorts before one of them; returns the next directory to visit
    fn directory(&mut self, dirnr: usize) -> Result<usize> {
        let directories = self.directories;
        let directory = &directories[dirnr];
        let position = self.cursor.position() - self.file_block;
        if position != directory.file_offset as u64 {
            return Err(IndexError::format(format!(
                "files of {:?} start at {position}, record says {}",
                directory.path, directory.file_offset
            )));
        }

        let capacity = (directory.nfiles as usize).min(self.table.len());
        let mut pending = VecDeque::with_capacity(capacity);
        for _ in 0..directory.nfiles {
            pending.push_back(self.file(&directory.path)?);
        }

        let mut next = dirnr + 1;
        while let Some(front) = pending.front() {
            let descend = directories
                .get(next)
                .is_some_and(|subdirectory| front.path > disk_name(&subdirectory.path));
            if descend {
                next = self.directory(next)?;
            } else if let Some(file) = pending.pop_front() {
                self.files.push(file);
            }
        }

        Ok(next)
    }

    fn file(&mut self, dirname: &str) -> Result<FileEntry> {
        let Some(&expected) = self.table[..self.table.len() - 1].get(self.read) else {
            return Err(IndexError::format(format!(
                "directory {dirname:?} holds more files than the header announces"
            )));
        };

        let position = self.cursor.position() - self.file_block;
        let offset = u32::try_from(position)
            .map_err(|_| IndexError::format(format!("file record at {position} is out of range")))?;
        let file = FileEntry::read_at(&mut *self.cursor, dirname, offset);
        let file = damaged_if_truncated(
            file,
            self.file_block + self.table[self.read + 1] as u64,
            self.cursor.get_ref(),
            || format!("file record at offset {offset}"),
        )?;
        check_offset(position, expected, "file offset table")?;
        self.read += 1;

        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::v5_writer::write_v5;
    use crate::artifacts::index::cache_tree::CacheTree;
    use crate::artifacts::index::conflict::{ConflictKind, ResolveUndo};
    use crate::artifacts::index::entry_flags::EntryFlags;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
    use crate::artifacts::objects::object_id::ObjectId;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn entry(name: &str, stage: u8) -> IndexEntry {
        IndexEntry::new(
            name.to_string(),
            ObjectId::from_bytes([name.len() as u8 * 3 + stage; 20]),
            EntryMetadata {
                mtime: 1_700_000_000 + name.len() as u32,
                mode: EntryMode::File(FileMode::Regular),
                size: 10,
                ..Default::default()
            },
            EntryFlags::for_entry(name.len(), stage),
            None,
        )
    }

    fn legacy(entries: Vec<IndexEntry>) -> LegacyIndex {
        LegacyIndex::new(2, entries, CacheTree::default(), Vec::new()).unwrap()
    }

    fn convert(index: &LegacyIndex) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        write_v5(index, &mut cursor).unwrap();
        cursor.into_inner()
    }

    fn paths(index: &IndexV5) -> Vec<&str> {
        index.files().iter().map(|file| file.path.as_str()).collect()
    }

    #[test]
    fn readme_and_main_round_trip() {
        let index = legacy(vec![entry("docs/readme.txt", 0), entry("src/main.c", 0)]);
        let v5 = IndexV5::parse(&convert(&index)).unwrap();

        let directories: Vec<&str> = v5
            .directories()
            .iter()
            .map(|directory| directory.path.as_str())
            .collect();
        assert_eq!(directories, vec!["", "docs", "src"]);
        assert_eq!(paths(&v5), vec!["docs/readme.txt", "src/main.c"]);
        assert!(v5.verify_against(&index).unwrap().is_empty());
    }

    #[rstest]
    #[case(vec!["a-b", "a/x", "a0"])]
    #[case(vec!["a/b/c/file"])]
    #[case(vec!["x", "y/a", "y/b/c", "y/b/d/e", "y/ba", "z"])]
    #[case(vec!["a.txt", "a/b", "a/b.txt/c", "ab/c"])]
    fn files_come_back_in_path_order(#[case] names: Vec<&str>) {
        let index = legacy(names.iter().map(|name| entry(name, 0)).collect());
        let v5 = IndexV5::parse(&convert(&index)).unwrap();

        assert_eq!(paths(&v5), names);
        assert!(v5.verify_against(&index).unwrap().is_empty());
    }

    #[test]
    fn conflicts_are_read_per_directory() {
        let index = LegacyIndex::new(
            2,
            vec![
                entry("lib/x.rs", 1),
                entry("lib/x.rs", 2),
                entry("lib/x.rs", 3),
                entry("main.rs", 0),
            ],
            CacheTree::default(),
            vec![ResolveUndo::new(
                "lib/old/y.rs".to_string(),
                [Some((EntryMode::File(FileMode::Regular), ObjectId::ZERO)), None, None],
            )],
        )
        .unwrap();
        let v5 = IndexV5::parse(&convert(&index)).unwrap();

        assert_eq!(paths(&v5), vec!["lib/x.rs", "main.rs"]);
        assert_eq!(v5.files()[0].stage(), 1);
        let kinds: Vec<(&str, ConflictKind, usize)> = v5
            .conflicts()
            .iter()
            .map(|conflict| (conflict.path.as_str(), conflict.kind, conflict.parts.len()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("lib/x.rs", ConflictKind::Unmerged, 3),
                ("lib/old/y.rs", ConflictKind::ResolveUndo, 1),
            ]
        );
        assert_eq!(v5.directories()[1].nconflicts, 2);
        assert!(v5.verify_against(&index).unwrap().is_empty());
    }

    #[test]
    fn every_flipped_byte_is_an_integrity_error() {
        let index = legacy(vec![
            entry("docs/readme.txt", 0),
            entry("src/main.c", 0),
            entry("src/util/x.h", 0),
        ]);
        let data = convert(&index);

        for position in 0..data.len() {
            let mut damaged = data.clone();
            damaged[position] ^= 0x10;

            let err = IndexV5::parse(&damaged).unwrap_err();
            assert!(err.is_integrity(), "byte {position}: {err}");
        }
    }

    #[test]
    fn damaged_offset_table_names_the_table() {
        let index = legacy(vec![entry("a", 0), entry("b", 0)]);
        let mut data = convert(&index);
        // second entry of the file offset table
        let file_block = byteorder::NetworkEndian::read_u32(&data[16..20]) as usize;
        data[file_block - 2 * OFFSET_SIZE + 3] ^= 0x01;

        match IndexV5::parse(&data) {
            Err(IndexError::Integrity { subject }) => assert!(subject.contains("file offset table")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn legacy_file_is_a_format_error() {
        let index = legacy(vec![entry("a", 0)]);
        let mut data = Vec::new();
        index.write_to(&mut data).unwrap();

        assert!(matches!(IndexV5::parse(&data), Err(IndexError::Format { .. })));
    }

    #[test]
    fn short_file_is_truncated() {
        assert!(matches!(
            IndexV5::parse(b"DIRC\0\0\0\x05"),
            Err(IndexError::TruncatedFile { size: 8, minimum: 28 })
        ));
    }

    #[test]
    fn cache_tree_is_rebuilt_from_directories() {
        let index = LegacyIndex::new(
            2,
            vec![entry("a/b", 0), entry("c", 0)],
            CacheTree::new(vec![
                CacheTreeEntry::new(String::new(), 2, 1, Some(ObjectId::from_bytes([4; 20]))),
                CacheTreeEntry::new("a".to_string(), -1, 0, None),
            ]),
            Vec::new(),
        )
        .unwrap();
        let v5 = IndexV5::parse(&convert(&index)).unwrap();

        assert_eq!(v5.cache_tree(), index.cache_tree().clone());
    }

    #[test]
    fn entries_out_of_path_order_still_verify() {
        let written = legacy(vec![entry("b", 0), entry("a/x", 0), entry("a.txt", 0)]);
        let v5 = IndexV5::parse(&convert(&written)).unwrap();

        assert_eq!(paths(&v5), vec!["a.txt", "a/x", "b"]);
        assert_eq!(v5.verify_against(&written).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn verification_reports_differences() {
        let written = legacy(vec![entry("a", 0), entry("b", 0)]);
        let v5 = IndexV5::parse(&convert(&written)).unwrap();

        let other = legacy(vec![entry("a", 0), entry("c/d", 0)]);
        let mismatches = v5.verify_against(&other).unwrap();
        assert!(!mismatches.is_empty());
        assert!(mismatches.iter().any(|mismatch| mismatch.contains("directories")));
    }
}
