use assert_fs::TempDir;
use assert_fs::prelude::*;
use fake::Fake;
use fake::faker::lorem::en::Word;
use indexv5::areas::legacy_index::LegacyIndex;
use indexv5::artifacts::index::cache_tree::{CacheTree, CacheTreeEntry};
use indexv5::artifacts::index::conflict::ResolveUndo;
use indexv5::artifacts::index::entry_flags::EntryFlags;
use indexv5::artifacts::index::entry_mode::{EntryMode, FileMode};
use indexv5::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use indexv5::artifacts::objects::object_id::ObjectId;
use rstest::fixture;
use sha1::{Digest, Sha1};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Id derived from the path, so every entry gets a distinct one
pub fn oid_of(path: &str, stage: u8) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(path.as_bytes());
    hasher.update([stage]);
    ObjectId::try_parse(format!("{:x}", hasher.finalize())).expect("valid object id")
}

pub fn entry(path: &str, stage: u8) -> IndexEntry {
    IndexEntry::new(
        path.to_string(),
        oid_of(path, stage),
        EntryMetadata {
            ctime: 1_700_000_000,
            ctime_nsec: 0,
            mtime: 1_700_000_000 + path.len() as u32,
            mtime_nsec: 500,
            dev: 2049,
            ino: 4242 + path.len() as u32,
            mode: EntryMode::File(FileMode::Regular),
            uid: 1000,
            gid: 1000,
            size: 64,
        },
        EntryFlags::for_entry(path.len(), stage),
        None,
    )
}

pub fn legacy_index(paths: &[&str]) -> LegacyIndex {
    let entries = paths.iter().map(|path| entry(path, 0)).collect();
    LegacyIndex::new(2, entries, CacheTree::default(), Vec::new()).expect("valid index")
}

/// `docs/readme.txt` and `src/main.c`
#[fixture]
pub fn readme_and_main() -> LegacyIndex {
    legacy_index(&["docs/readme.txt", "src/main.c"])
}

/// An unmerged path, a resolve-undo record and cache-tree data
#[fixture]
pub fn conflicted_index() -> LegacyIndex {
    let entries = vec![
        entry("Makefile", 0),
        entry("lib/parse.c", 1),
        entry("lib/parse.c", 2),
        entry("lib/parse.c", 3),
        entry("lib/scan.c", 0),
    ];
    let cache_tree = CacheTree::new(vec![
        CacheTreeEntry::new(String::new(), -1, 1, None),
        CacheTreeEntry::new("lib".to_string(), -1, 0, None),
    ]);
    let resolve_undo = vec![ResolveUndo::new(
        "lib/old/lexer.c".to_string(),
        [
            Some((EntryMode::File(FileMode::Regular), oid_of("lexer", 1))),
            Some((EntryMode::File(FileMode::Regular), oid_of("lexer", 2))),
            None,
        ],
    )];

    LegacyIndex::new(2, entries, cache_tree, resolve_undo).expect("valid index")
}

/// Distinct random paths, in index order, with no path that is also a directory
pub fn random_paths(count: usize) -> Vec<String> {
    let mut paths = BTreeSet::new();
    while paths.len() < count {
        let depth = (0..3).fake::<usize>();
        let mut components: Vec<String> = (0..=depth).map(|_| Word().fake::<String>()).collect();
        if let Some(file) = components.last_mut() {
            file.push_str(".txt");
        }
        paths.insert(components.join("/"));
    }

    // directory components never end in ".txt", so no file shadows a directory
    paths.into_iter().collect()
}

pub fn legacy_bytes(index: &LegacyIndex) -> Vec<u8> {
    let mut data = Vec::new();
    index.write_to(&mut data).expect("in-memory write");
    data
}

/// Write `index` as `<dir>/.git/index` and return the metadata directory
pub fn git_dir_with(dir: &TempDir, index: &LegacyIndex) -> PathBuf {
    let git_dir = dir.child(".git");
    git_dir.create_dir_all().expect("create .git");
    git_dir
        .child("index")
        .write_binary(&legacy_bytes(index))
        .expect("write index");
    git_dir.path().to_path_buf()
}
