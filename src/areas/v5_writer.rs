//! Version 5 index writer
//!
//! Offsets in the header, both offset tables and every directory record
//! point forward, so the writer lays the file out in one pass with zeroed
//! placeholders and patches them once the blocks they describe are written.

use crate::areas::legacy_index::LegacyIndex;
use crate::artifacts::index::conflict::ConflictEntry;
use crate::artifacts::index::dir_tree::DirectoryTree;
use crate::artifacts::index::directory_entry::{DirectoryEntry, disk_name};
use crate::artifacts::index::error::{IndexError, Result};
use crate::artifacts::index::file_entry::FileEntry;
use crate::artifacts::index::index_header::V5Header;
use crate::artifacts::index::OFFSET_SIZE;
use crate::artifacts::index::reservation::{PatchWriter, Reservation};
use crate::artifacts::objects::object::Packable;
use byteorder::WriteBytesExt;
use std::collections::BTreeMap;
use std::io::{Seek, Write};
use tracing::{debug, info};

/// What ended up in a written v5 index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub directories: usize,
    pub files: usize,
    pub conflicts: usize,
    pub bytes: u64,
}

fn to_offset(position: u64, what: &str) -> Result<u32> {
    u32::try_from(position)
        .map_err(|_| IndexError::logic(format!("{what} at {position} does not fit 32 bits")))
}

fn offset_table(offsets: &[u32]) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(offsets.len() * OFFSET_SIZE);
    for offset in offsets {
        bytes.write_u32::<byteorder::NetworkEndian>(*offset)?;
    }
    Ok(bytes)
}

/// Directory table with cache-tree data applied, from a legacy index
pub fn directory_tree(index: &LegacyIndex) -> Result<DirectoryTree> {
    let mut tree = DirectoryTree::build(
        index.paths().iter().map(String::as_str),
        index.primary_entries().map(|entry| entry.dirname()),
    );
    tree.apply_cache_tree(index.cache_tree())?;

    Ok(tree)
}

/// Conflict records by directory: unmerged paths first, then resolve-undo
/// data, each attached to the closest directory that exists in `tree`
pub fn conflict_records(
    index: &LegacyIndex,
    tree: &DirectoryTree,
) -> BTreeMap<String, Vec<ConflictEntry>> {
    let mut records: BTreeMap<String, Vec<ConflictEntry>> = index
        .conflicts()
        .iter()
        .map(|(dirname, conflicts)| (dirname.clone(), conflicts.clone()))
        .collect();

    for undo in index.resolve_undo() {
        let dirname = tree.nearest_existing(undo.dirname());
        if dirname != undo.dirname() {
            debug!(path = %undo.path, %dirname, "resolve-undo record moved to ancestor");
        }
        records
            .entry(dirname.to_string())
            .or_default()
            .push(ConflictEntry::from(undo));
    }

    records
}

/// Write `index` in version 5 format to `writer`
pub fn write_v5<W: Write + Seek>(index: &LegacyIndex, writer: W) -> Result<WriteSummary> {
    let mut tree = directory_tree(index)?;

    let mut files: Vec<FileEntry> = index.primary_entries().map(FileEntry::from).collect();
    files.sort_by(|a, b| {
        (disk_name(a.dirname()), a.basename()).cmp(&(disk_name(b.dirname()), b.basename()))
    });
    let conflicts = conflict_records(index, &tree);

    let ndir = tree.len();
    let nfile = files.len();
    debug!(directories = ndir, files = nfile, "laying out v5 index");

    let mut writer = PatchWriter::new(writer)?;
    let start = writer.position();
    let header = writer.reserve(V5Header::size_for(0), "header")?;

    // Directory block
    let dir_table = writer.reserve((ndir + 1) * OFFSET_SIZE, "directory offsets")?;
    let dir_block = writer.position();
    let mut dir_offsets = Vec::with_capacity(ndir + 1);
    let mut dir_records: Vec<Reservation> = Vec::with_capacity(ndir);
    for directory in tree.iter() {
        let mut name = directory.name().into_bytes();
        name.push(0);
        let offset = writer.write(&name)?;
        dir_offsets.push(to_offset(offset - dir_block, "directory record")?);
        dir_records.push(writer.reserve(DirectoryEntry::data_size(), "directory record")?);
    }
    dir_offsets.push(to_offset(writer.position() - dir_block, "directory block end")?);

    // File block
    let file_table = writer.reserve((nfile + 1) * OFFSET_SIZE, "file offsets")?;
    let file_block = writer.position();
    let mut file_offsets = Vec::with_capacity(nfile + 1);
    let mut remaining = files.iter().peekable();
    for directory in tree.iter_mut() {
        directory.file_offset = to_offset(writer.position() - file_block, "file offset")?;

        let mut written = 0;
        while let Some(file) = remaining.next_if(|file| file.dirname() == directory.path) {
            let offset = to_offset(writer.position() - file_block, "file record")?;
            writer.write(&file.serialize_at(offset)?)?;
            file_offsets.push(offset);
            written += 1;
        }
        if written != directory.nfiles {
            return Err(IndexError::logic(format!(
                "directory {:?} expects {} files, wrote {written}",
                directory.path, directory.nfiles
            )));
        }
    }
    if let Some(file) = remaining.next() {
        return Err(IndexError::logic(format!(
            "file {:?} has no directory record",
            file.path
        )));
    }
    file_offsets.push(to_offset(writer.position() - file_block, "file block end")?);

    // Conflict block
    let mut nconflicts = 0;
    for (dirname, records) in &conflicts {
        let Some(directory) = tree.get_mut(dirname) else {
            return Err(IndexError::logic(format!(
                "conflicts for unknown directory {dirname:?}"
            )));
        };
        directory.conflict_offset = to_offset(writer.position() - start, "conflict block")?;
        directory.nconflicts = records.len() as u32;
        for record in records {
            writer.write(&record.serialize()?)?;
        }
        nconflicts += records.len();
    }

    let v5_header = V5Header::new(
        ndir as u32,
        nfile as u32,
        to_offset(file_block - start, "file block")?,
        Vec::new(),
    );
    writer.commit(header, &v5_header.serialize()?)?;
    writer.commit(dir_table, &offset_table(&dir_offsets)?)?;
    writer.commit(file_table, &offset_table(&file_offsets)?)?;
    for (directory, reservation) in tree.iter().zip(dir_records) {
        writer.commit(reservation, &directory.serialize_data()?)?;
    }

    let bytes = writer.position() - start;
    writer.finish()?;

    let summary = WriteSummary {
        directories: ndir,
        files: nfile,
        conflicts: nconflicts,
        bytes,
    };
    info!(
        directories = summary.directories,
        files = summary.files,
        conflicts = summary.conflicts,
        bytes = summary.bytes,
        "wrote v5 index"
    );
    Ok(summary)
}
