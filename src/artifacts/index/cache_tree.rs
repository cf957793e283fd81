//! Cache-tree (`TREE` extension) data
//!
//! ## Format
//!
//! Entries are stored depth-first, each as:
//!
//! ```text
//! <component name> NUL <entry count> SP <subtree count> LF [<20-byte tree id>]
//! ```
//!
//! The counts are ASCII decimal; an entry count of `-1` marks an invalidated
//! tree, which carries no id. Only the last path component is stored, full
//! paths are rebuilt while walking.

use crate::artifacts::index::codec;
use crate::artifacts::index::error::{IndexError, Result};
use crate::artifacts::objects::object::Packable;
use crate::artifacts::objects::object_id::ObjectId;
use bytes::Bytes;
use derive_new::new;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct CacheTreeEntry {
    /// Full directory path without trailing slash, `""` for the root
    pub path: String,
    /// Index entries covered, `-1` when invalidated
    pub entry_count: i32,
    pub subtrees: u32,
    /// Tree id, only known for valid entries
    pub oid: Option<ObjectId>,
}

impl CacheTreeEntry {
    pub fn is_valid(&self) -> bool {
        self.entry_count >= 0
    }

    fn component(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map_or(self.path.as_str(), |(_, name)| name)
    }
}

/// All cache-tree entries in depth-first order
#[derive(Debug, Clone, Default, PartialEq, Eq, new)]
pub struct CacheTree {
    entries: Vec<CacheTreeEntry>,
}

impl CacheTree {
    pub fn entries(&self) -> &[CacheTreeEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&CacheTreeEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }

    /// Decode the payload of a `TREE` extension
    pub fn parse(mut data: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        // (full path, subtrees still to come)
        let mut stack: Vec<(String, u32)> = Vec::new();

        while !data.is_empty() {
            let name = codec::read_name(&mut data, "cache-tree entry")?;
            let entry_count = codec::read_until(&mut data, b' ', "cache-tree entry")?;
            let entry_count = codec::parse_ascii_number(&entry_count, 10, "cache-tree entry")?;
            let subtrees = codec::read_until(&mut data, b'\n', "cache-tree entry")?;
            let subtrees = codec::parse_ascii_number(&subtrees, 10, "cache-tree entry")?;

            let entry_count = i32::try_from(entry_count)
                .ok()
                .filter(|count| *count >= -1)
                .ok_or_else(|| {
                    IndexError::format(format!("bad cache-tree entry count {entry_count}"))
                })?;
            let subtrees = u32::try_from(subtrees).map_err(|_| {
                IndexError::format(format!("bad cache-tree subtree count {subtrees}"))
            })?;
            let oid = if entry_count >= 0 {
                Some(ObjectId::read_h40_from(&mut data)?)
            } else {
                None
            };

            let path = if entries.is_empty() {
                if !name.is_empty() {
                    return Err(IndexError::format(format!(
                        "cache-tree root has a name: {name:?}"
                    )));
                }
                String::new()
            } else {
                while stack.last().is_some_and(|(_, remaining)| *remaining == 0) {
                    stack.pop();
                }
                let Some((parent, remaining)) = stack.last_mut() else {
                    return Err(IndexError::format(
                        "cache-tree has more entries than its subtree counts allow",
                    ));
                };
                *remaining -= 1;

                if parent.is_empty() {
                    name
                } else {
                    format!("{parent}/{name}")
                }
            };

            stack.push((path.clone(), subtrees));
            entries.push(CacheTreeEntry::new(path, entry_count, subtrees, oid));
        }

        Ok(CacheTree { entries })
    }
}

impl Packable for CacheTree {
    /// Encode as a `TREE` payload, without the extension header
    fn serialize(&self) -> Result<Bytes> {
        let mut bytes = Vec::new();

        for entry in &self.entries {
            bytes.write_all(entry.component().as_bytes())?;
            bytes.push(0);
            writeln!(bytes, "{} {}", entry.entry_count, entry.subtrees)?;
            if let Some(oid) = entry.oid.filter(|_| entry.is_valid()) {
                oid.write_h40_to(&mut bytes)?;
            }
        }

        Ok(Bytes::from(bytes))
    }
}
