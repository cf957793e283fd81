//! Legacy (version 2/3) index
//!
//! The legacy index is a flat, path-sorted list of entries followed by
//! optional extensions and a SHA-1 over everything before it.
//!
//! ## Classification
//!
//! Entries are split by merge stage:
//! - stage 0 entries form the primary list
//! - stage 1 entries are kept in the primary list *and* grouped into a
//!   conflict record, so resolved paths stay visible
//! - stage 2 and 3 entries only appear in conflict records
//!
//! Conflict records are keyed by the directory that contains the path. Every
//! directory implied by any entry path is collected along the way.

use crate::artifacts::index::cache_tree::CacheTree;
use crate::artifacts::index::checksum::{self, Checksum};
use crate::artifacts::index::conflict::{ConflictEntry, ResolveUndo};
use crate::artifacts::index::entry_flags::EntryFlags;
use crate::artifacts::index::error::{IndexError, Result};
use crate::artifacts::index::index_entry::{ENTRY_PREFIX_SIZE, IndexEntry};
use crate::artifacts::index::index_header::LegacyHeader;
use crate::artifacts::index::{CHECKSUM_SIZE, LEGACY_HEADER_SIZE};
use crate::artifacts::objects::object::{Packable, Unpackable};
use byteorder::{ByteOrder, WriteBytesExt};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::ops::DerefMut;
use std::path::Path;
use tracing::{debug, warn};

/// Tag and size preceding every extension payload
const EXTENSION_HEADER_SIZE: usize = 8;

const TREE_EXTENSION: &[u8; 4] = b"TREE";
const REUC_EXTENSION: &[u8; 4] = b"REUC";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyIndex {
    header: LegacyHeader,
    /// All entries, in file order
    entries: Vec<IndexEntry>,
    /// Unmerged records by containing directory, each directory's records by path
    conflicts: BTreeMap<String, Vec<ConflictEntry>>,
    /// Every directory implied by an entry path, the root included
    paths: BTreeSet<String>,
    cache_tree: CacheTree,
    resolve_undo: Vec<ResolveUndo>,
}

impl LegacyIndex {
    /// Classify entries and collect directories
    pub fn new(
        version: u32,
        entries: Vec<IndexEntry>,
        cache_tree: CacheTree,
        resolve_undo: Vec<ResolveUndo>,
    ) -> Result<Self> {
        let mut paths = BTreeSet::from([String::new()]);
        let mut unmerged: BTreeMap<&str, Vec<&IndexEntry>> = BTreeMap::new();

        for entry in &entries {
            paths.extend(entry.parent_dirs().into_iter().map(String::from));
            if entry.stage() > 0 {
                unmerged.entry(entry.name.as_str()).or_default().push(entry);
            }
        }

        let mut conflicts: BTreeMap<String, Vec<ConflictEntry>> = BTreeMap::new();
        for stages in unmerged.into_values() {
            let conflict = ConflictEntry::unmerged(stages)?;
            conflicts
                .entry(conflict.dirname().to_string())
                .or_default()
                .push(conflict);
        }

        let header = LegacyHeader::new(version, entries.len() as u32);
        Ok(LegacyIndex {
            header,
            entries,
            conflicts,
            paths,
            cache_tree,
            resolve_undo,
        })
    }

    /// Read and verify the index at `path` under a shared lock
    pub fn load(path: &Path) -> Result<Self> {
        let mut index_file = std::fs::OpenOptions::new().read(true).open(path)?;
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;

        let mut data = Vec::new();
        lock.deref_mut().read_to_end(&mut data)?;
        drop(lock);

        let index = Self::parse(&data)?;
        debug!(
            path = %path.display(),
            version = index.header.version,
            entries = index.entries.len(),
            "loaded legacy index"
        );
        Ok(index)
    }

    /// Parse a complete legacy index held in memory
    ///
    /// When parsing fails and the trailing digest does not match either, the
    /// damage is reported as an integrity failure rather than as whatever
    /// the damaged bytes happened to look like.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let minimum = LEGACY_HEADER_SIZE + CHECKSUM_SIZE;
        if data.len() < minimum {
            return Err(IndexError::TruncatedFile {
                size: data.len() as u64,
                minimum: minimum as u64,
            });
        }

        match Self::parse_unverified(data) {
            Err(err) if !err.is_integrity() && !checksum::digest_matches(data) => {
                debug!(%err, "parse failed on a file with a bad digest");
                Err(IndexError::integrity("whole file SHA-1"))
            }
            result => result,
        }
    }

    fn parse_unverified(data: &[u8]) -> Result<Self> {
        let mut reader = Checksum::new(data);

        let header_bytes = reader.read(LEGACY_HEADER_SIZE)?;
        let header = LegacyHeader::deserialize(&mut header_bytes.as_ref())?;

        // the count is not trusted until the digest is
        let capacity = (header.entries_count as usize).min(data.len() / ENTRY_PREFIX_SIZE);
        let mut entries = Vec::with_capacity(capacity);
        for _ in 0..header.entries_count {
            let entry = IndexEntry::deserialize(&mut reader)?;
            if header.version < 3 && entry.flags.contains(EntryFlags::EXTENDED) {
                return Err(IndexError::format(format!(
                    "entry {:?} uses extended flags in a version {} index",
                    entry.name, header.version
                )));
            }
            entries.push(entry);
        }
        debug!(entries = entries.len(), "parsed legacy entries");

        let mut cache_tree = CacheTree::default();
        let mut resolve_undo = Vec::new();
        loop {
            let remaining = data.len() - reader.consumed() as usize;
            if remaining < CHECKSUM_SIZE {
                return Err(IndexError::TruncatedRecord {
                    record: "checksum",
                    needed: CHECKSUM_SIZE - remaining,
                });
            }
            if remaining == CHECKSUM_SIZE {
                break;
            }

            let extension = reader.read(EXTENSION_HEADER_SIZE)?;
            let tag = &extension[..4];
            let size = byteorder::NetworkEndian::read_u32(&extension[4..]) as usize;
            let available = remaining - EXTENSION_HEADER_SIZE;
            if size + CHECKSUM_SIZE > available {
                return Err(IndexError::TruncatedRecord {
                    record: "index extension",
                    needed: size + CHECKSUM_SIZE - available,
                });
            }
            let payload = reader.read(size)?;

            match tag {
                tag if tag == TREE_EXTENSION => cache_tree = CacheTree::parse(&payload)?,
                tag if tag == REUC_EXTENSION => resolve_undo = ResolveUndo::parse_all(&payload)?,
                tag if tag[0].is_ascii_uppercase() => {
                    warn!(
                        extension = %String::from_utf8_lossy(tag),
                        size,
                        "skipping unsupported optional extension"
                    );
                }
                tag => {
                    return Err(IndexError::format(format!(
                        "unsupported required extension {:?}",
                        String::from_utf8_lossy(tag)
                    )));
                }
            }
        }

        reader.verify()?;

        Self::new(header.version, entries, cache_tree, resolve_undo)
    }

    /// Write the index in legacy format, extensions and digest included
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = Checksum::new(writer);
        writer.write(&self.header.serialize()?)?;
        for entry in &self.entries {
            writer.write(&entry.serialize()?)?;
        }

        if !self.cache_tree.is_empty() {
            write_extension(&mut writer, TREE_EXTENSION, &self.cache_tree.serialize()?)?;
        }
        if !self.resolve_undo.is_empty() {
            let payload = ResolveUndo::serialize_all(&self.resolve_undo)?;
            write_extension(&mut writer, REUC_EXTENSION, &payload)?;
        }

        writer.write_checksum()
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    pub fn header(&self) -> &LegacyHeader {
        &self.header
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Stage 0 and stage 1 entries, in file order
    pub fn primary_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter().filter(|entry| entry.stage() <= 1)
    }

    pub fn conflicts(&self) -> &BTreeMap<String, Vec<ConflictEntry>> {
        &self.conflicts
    }

    pub fn paths(&self) -> &BTreeSet<String> {
        &self.paths
    }

    pub fn cache_tree(&self) -> &CacheTree {
        &self.cache_tree
    }

    pub fn resolve_undo(&self) -> &[ResolveUndo] {
        &self.resolve_undo
    }
}

fn write_extension<W: Write>(writer: &mut Checksum<W>, tag: &[u8; 4], payload: &[u8]) -> Result<()> {
    let mut header = Vec::with_capacity(EXTENSION_HEADER_SIZE);
    header.write_all(tag)?;
    header.write_u32::<byteorder::NetworkEndian>(payload.len() as u32)?;

    writer.write(&header)?;
    writer.write(payload)
}
