//! Conflict and resolve-undo records
//!
//! Legacy indexes keep unmerged paths as stage 1-3 entries and keep the
//! three-way data of resolved paths in the `REUC` extension. Version 5 stores
//! both kinds in one conflict block, one record per path:
//!
//! ```text
//! <full path> NUL <u32 part count> (<u16 flags> <u16 mode> <20-byte id>)* <u32 crc>
//! ```

use crate::artifacts::index::codec;
use crate::artifacts::index::CONFLICT_PART_SIZE;
use crate::artifacts::index::crc::{CRC_SIZE, Crc, CrcReader};
use crate::artifacts::index::entry_flags::ConflictFlags;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::error::{IndexError, Result};
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::OBJECT_ID_BYTES;
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use std::io::{Read, Write};

/// Number of merge stages a conflict can populate
pub const STAGES: usize = 3;

fn dirname_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dirname, _)| dirname)
}

/// One resolved path of the `REUC` extension
///
/// Slot `i` holds stage `i + 1`; an empty slot had mode 0 on disk.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ResolveUndo {
    pub path: String,
    pub stages: [Option<(EntryMode, ObjectId)>; STAGES],
}

impl ResolveUndo {
    pub fn dirname(&self) -> &str {
        dirname_of(&self.path)
    }

    /// Decode the payload of a `REUC` extension
    pub fn parse_all(mut data: &[u8]) -> Result<Vec<Self>> {
        let mut records = Vec::new();

        while !data.is_empty() {
            let path = codec::read_name(&mut data, "resolve-undo entry")?;

            let mut modes = [0u32; STAGES];
            for mode in modes.iter_mut() {
                let text = codec::read_until(&mut data, 0, "resolve-undo entry")?;
                *mode = u32::try_from(codec::parse_ascii_number(&text, 8, "resolve-undo entry")?)
                    .map_err(|_| IndexError::format("negative resolve-undo mode"))?;
            }

            let mut stages = [None; STAGES];
            for (slot, mode) in stages.iter_mut().zip(modes) {
                if mode != 0 {
                    let mode = EntryMode::try_from(mode)?;
                    *slot = Some((mode, ObjectId::read_h40_from(&mut data)?));
                }
            }

            if stages.iter().all(Option::is_none) {
                return Err(IndexError::format(format!(
                    "resolve-undo entry {path:?} has no stages"
                )));
            }
            records.push(ResolveUndo { path, stages });
        }

        Ok(records)
    }

    /// Encode records as a `REUC` payload, without the extension header
    pub fn serialize_all(records: &[Self]) -> Result<Bytes> {
        let mut bytes = Vec::new();

        for record in records {
            bytes.write_all(record.path.as_bytes())?;
            bytes.push(0);
            for stage in &record.stages {
                let mode = stage.map_or(0, |(mode, _)| mode.as_u32());
                write!(bytes, "{mode:o}")?;
                bytes.push(0);
            }
            for (_, oid) in record.stages.iter().flatten() {
                oid.write_h40_to(&mut bytes)?;
            }
        }

        Ok(Bytes::from(bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct ConflictPart {
    pub stage: u8,
    pub mode: EntryMode,
    pub oid: ObjectId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// Stage 1-3 entries still present in the index
    Unmerged,
    /// Already resolved, kept from the `REUC` extension
    ResolveUndo,
}

/// A v5 conflict record
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ConflictEntry {
    /// Full path of the conflicted file
    pub path: String,
    pub kind: ConflictKind,
    /// Lowest stage first
    pub parts: Vec<ConflictPart>,
}

impl ConflictEntry {
    /// Group the stage 1-3 entries of one path
    pub fn unmerged<'e>(entries: impl IntoIterator<Item = &'e IndexEntry>) -> Result<Self> {
        let mut entries = entries.into_iter().peekable();
        let path = entries
            .peek()
            .map(|entry| entry.name.clone())
            .ok_or_else(|| IndexError::logic("unmerged conflict without entries"))?;

        let mut parts = Vec::new();
        for entry in entries {
            if entry.name != path || entry.stage() == 0 {
                return Err(IndexError::logic(format!(
                    "entry {:?} at stage {} grouped under conflict {path:?}",
                    entry.name,
                    entry.stage()
                )));
            }
            parts.push(ConflictPart::new(entry.stage(), entry.metadata.mode, entry.oid));
        }
        parts.sort_by_key(|part| part.stage);

        Ok(ConflictEntry::new(path, ConflictKind::Unmerged, parts))
    }

    pub fn dirname(&self) -> &str {
        dirname_of(&self.path)
    }

    /// Bytes the record occupies on disk, crc included
    pub fn on_disk_size(&self) -> usize {
        self.path.len() + 1 + 4 + self.parts.len() * CONFLICT_PART_SIZE + CRC_SIZE
    }
}

impl From<&ResolveUndo> for ConflictEntry {
    fn from(record: &ResolveUndo) -> Self {
        let parts = record
            .stages
            .iter()
            .zip(1u8..)
            .filter_map(|(stage, number)| {
                stage.map(|(mode, oid)| ConflictPart::new(number, mode, oid))
            })
            .collect();

        ConflictEntry::new(record.path.clone(), ConflictKind::ResolveUndo, parts)
    }
}

impl Packable for ConflictEntry {
    fn serialize(&self) -> Result<Bytes> {
        let mut bytes = Vec::with_capacity(self.on_disk_size());
        bytes.write_all(self.path.as_bytes())?;
        bytes.push(0);
        bytes.write_u32::<byteorder::NetworkEndian>(self.parts.len() as u32)?;

        let conflicted = self.kind == ConflictKind::Unmerged;
        for part in &self.parts {
            let flags = ConflictFlags::for_stage(part.stage, conflicted);
            bytes.write_u16::<byteorder::NetworkEndian>(flags.bits())?;
            bytes.write_u16::<byteorder::NetworkEndian>(part.mode.as_u16())?;
            part.oid.write_h40_to(&mut bytes)?;
        }

        let mut crc = Crc::new();
        crc.add(&bytes);
        crc.write_to(&mut bytes)?;

        Ok(Bytes::from(bytes))
    }
}

impl Unpackable for ConflictEntry {
    fn deserialize(reader: &mut impl Read) -> Result<Self> {
        let mut reader = CrcReader::new(reader);

        let path = codec::read_name_bytes(&mut reader, "conflict record")?;
        let nparts = codec::read_u32(&mut reader, "conflict record")?;
        if nparts == 0 || nparts as usize > STAGES {
            // never written, the count itself is damaged
            return Err(IndexError::integrity(format!(
                "conflict record {}",
                String::from_utf8_lossy(&path)
            )));
        }

        let mut kind = ConflictKind::ResolveUndo;
        let mut parts = Vec::with_capacity(nparts as usize);
        for _ in 0..nparts {
            let part = codec::read_fixed::<CONFLICT_PART_SIZE, _>(&mut reader, "conflict part")?;
            let flags =
                ConflictFlags::from_bits_retain(byteorder::NetworkEndian::read_u16(&part[0..2]));
            if flags.contains(ConflictFlags::CONFLICTED) {
                kind = ConflictKind::Unmerged;
            }
            let mode = byteorder::NetworkEndian::read_u16(&part[2..4]) as u32;
            let mut oid = [0u8; OBJECT_ID_BYTES];
            oid.copy_from_slice(&part[4..]);

            parts.push((flags.stage(), mode, ObjectId::from_bytes(oid)));
        }

        if !reader.verify()? {
            return Err(IndexError::integrity(format!(
                "conflict record {}",
                String::from_utf8_lossy(&path)
            )));
        }
        let path = codec::into_name(path, "conflict record")?;

        let parts = parts
            .into_iter()
            .map(|(stage, mode, oid)| {
                Ok(ConflictPart::new(stage, EntryMode::try_from(mode)?, oid))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ConflictEntry { path, kind, parts })
    }
}
