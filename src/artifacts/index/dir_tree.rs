//! Directory table of a v5 index
//!
//! Directories are keyed by their on-disk name (`""` for the root,
//! `path + "/"` otherwise), so iterating the map yields them in the order the
//! directory block needs. Subtree counts are maintained only here, at the
//! moment a directory is first inserted under its parent.

use crate::artifacts::index::cache_tree::CacheTree;
use crate::artifacts::index::directory_entry::{DirectoryEntry, disk_name};
use crate::artifacts::index::error::{IndexError, Result};
use std::collections::BTreeMap;
use tracing::debug;

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTree {
    directories: BTreeMap<String, DirectoryEntry>,
}

impl Default for DirectoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryTree {
    /// A tree holding only the root directory
    pub fn new() -> Self {
        let mut directories = BTreeMap::new();
        directories.insert(String::new(), DirectoryEntry::new(""));
        DirectoryTree { directories }
    }

    /// Build the table from every directory that holds an entry and the
    /// directory of each primary (stage 0 and 1) entry
    pub fn build<'p>(
        paths: impl IntoIterator<Item = &'p str>,
        primary_dirnames: impl IntoIterator<Item = &'p str>,
    ) -> Self {
        let mut tree = DirectoryTree::new();
        for path in paths {
            tree.insert(path);
        }
        for dirname in primary_dirnames {
            tree.add_file(dirname);
        }
        tree
    }

    /// Insert `path` and any missing ancestor; true if `path` was new
    pub fn insert(&mut self, path: &str) -> bool {
        let key = disk_name(path);
        if self.directories.contains_key(&key) {
            return false;
        }

        let parent = parent_of(path);
        self.insert(parent);
        if let Some(parent) = self.directories.get_mut(&disk_name(parent)) {
            parent.nsubtrees += 1;
        }
        self.directories.insert(key, DirectoryEntry::new(path));
        true
    }

    /// Count one file directly inside `dirname`
    pub fn add_file(&mut self, dirname: &str) {
        self.insert(dirname);
        if let Some(directory) = self.directories.get_mut(&disk_name(dirname)) {
            directory.nfiles += 1;
        }
    }

    pub fn get(&self, path: &str) -> Option<&DirectoryEntry> {
        self.directories.get(&disk_name(path))
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut DirectoryEntry> {
        self.directories.get_mut(&disk_name(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.directories.contains_key(&disk_name(path))
    }

    pub fn len(&self) -> usize {
        self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    /// Directories in on-disk order
    pub fn iter(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.directories.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DirectoryEntry> {
        self.directories.values_mut()
    }

    /// Closest directory in the table that contains `path`, the root at worst
    pub fn nearest_existing<'a>(&self, mut path: &'a str) -> &'a str {
        while !path.is_empty() && !self.contains(path) {
            path = parent_of(path);
        }
        path
    }

    /// Copy entry counts and tree ids from the cache-tree
    ///
    /// Invalidated entries carry nothing but their `-1` count. A valid entry
    /// must describe a directory of the table with the same subtree count.
    pub fn apply_cache_tree(&mut self, cache_tree: &CacheTree) -> Result<()> {
        for entry in cache_tree.entries() {
            let Some(directory) = self.get_mut(&entry.path) else {
                if entry.is_valid() {
                    return Err(IndexError::logic(format!(
                        "cache-tree describes unknown directory {:?}",
                        entry.path
                    )));
                }
                debug!(path = %entry.path, "skipping invalidated cache-tree entry");
                continue;
            };

            if !entry.is_valid() {
                directory.nentries = -1;
                directory.oid = None;
                continue;
            }
            if entry.subtrees != directory.nsubtrees {
                return Err(IndexError::logic(format!(
                    "directory {:?} has {} subtrees, cache-tree says {}",
                    entry.path, directory.nsubtrees, entry.subtrees
                )));
            }
            directory.nentries = entry.entry_count;
            directory.oid = entry.oid;
        }

        Ok(())
    }
}
