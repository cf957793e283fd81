use common::fixture::{conflicted_index, entry, legacy_bytes, legacy_index, random_paths};
use indexv5::areas::index_v5::IndexV5;
use indexv5::areas::legacy_index::LegacyIndex;
use indexv5::areas::v5_writer::write_v5;
use indexv5::artifacts::index::cache_tree::CacheTree;
use indexv5::artifacts::index::conflict::ConflictKind;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use std::collections::BTreeSet;
use std::io::Cursor;

mod common;

fn convert(index: &LegacyIndex) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    write_v5(index, &mut cursor).expect("conversion");
    cursor.into_inner()
}

/// Sorted, distinct paths where no file is also a directory
fn file_paths() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-d.-]{1,3}(/[a-d.-]{1,3}){0,3}", 1..40).prop_map(|paths| {
        let directories: BTreeSet<String> = paths
            .iter()
            .flat_map(|path| {
                path.match_indices('/')
                    .map(|(end, _)| path[..end].to_string())
                    .collect::<Vec<_>>()
            })
            .collect();
        paths
            .into_iter()
            .filter(|path| !directories.contains(path))
            .collect()
    })
}

proptest! {
    #[test]
    fn conversion_round_trips_primary_entries(paths in file_paths()) {
        let names: Vec<&str> = paths.iter().map(String::as_str).collect();
        let index = legacy_index(&names);
        let v5 = IndexV5::parse(&convert(&index)).expect("written index reads back");

        let read: Vec<(&str, u32, u32)> = v5
            .files()
            .iter()
            .map(|file| (file.path.as_str(), file.mode.as_u32(), file.mtime))
            .collect();
        let expected: Vec<(&str, u32, u32)> = index
            .entries()
            .iter()
            .map(|entry| (entry.name.as_str(), entry.metadata.mode.as_u32(), entry.metadata.mtime))
            .collect();
        prop_assert_eq!(read, expected);
        prop_assert!(v5.verify_against(&index).expect("comparison").is_empty());
    }

    #[test]
    fn every_ancestor_directory_is_listed_once(paths in file_paths()) {
        let names: Vec<&str> = paths.iter().map(String::as_str).collect();
        let v5 = IndexV5::parse(&convert(&legacy_index(&names))).expect("written index reads back");

        let listed: Vec<String> = v5
            .directories()
            .iter()
            .map(|directory| directory.path.clone())
            .collect();
        let mut expected: BTreeSet<String> = BTreeSet::from([String::new()]);
        for path in &paths {
            for (end, _) in path.match_indices('/') {
                expected.insert(path[..end].to_string());
            }
        }
        let mut sorted = listed.clone();
        sorted.sort_by_key(|path| if path.is_empty() { String::new() } else { format!("{path}/") });

        prop_assert_eq!(&listed, &sorted);
        prop_assert_eq!(listed.into_iter().collect::<BTreeSet<_>>(), expected);
    }

    #[test]
    fn flipped_record_bytes_are_integrity_errors(
        paths in file_paths(),
        pick in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let names: Vec<&str> = paths.iter().map(String::as_str).collect();
        let mut data = convert(&legacy_index(&names));
        // everything after the header: tables, directory and file records
        let position = 28 + pick.index(data.len() - 28);
        data[position] ^= 1 << bit;

        let err = IndexV5::parse(&data).expect_err("damage goes unnoticed");
        prop_assert!(err.is_integrity(), "byte {}: {}", position, err);
    }

    #[test]
    fn flipped_legacy_bytes_are_integrity_errors(
        paths in file_paths(),
        pick in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let names: Vec<&str> = paths.iter().map(String::as_str).collect();
        let mut data = legacy_bytes(&legacy_index(&names));
        let position = pick.index(data.len());
        data[position] ^= 1 << bit;

        let err = LegacyIndex::parse(&data).expect_err("damage goes unnoticed");
        prop_assert!(err.is_integrity(), "byte {}: {}", position, err);
    }
}

#[rstest]
fn stages_are_grouped_under_one_conflict(conflicted_index: LegacyIndex) {
    let v5 = IndexV5::parse(&convert(&conflicted_index)).expect("written index reads back");

    let primary: Vec<(&str, u8)> = v5
        .files()
        .iter()
        .map(|file| (file.path.as_str(), file.stage()))
        .collect();
    assert_eq!(
        primary,
        vec![("Makefile", 0), ("lib/parse.c", 1), ("lib/scan.c", 0)]
    );

    let unmerged: Vec<_> = v5
        .conflicts()
        .iter()
        .filter(|conflict| conflict.kind == ConflictKind::Unmerged)
        .collect();
    assert_eq!(unmerged.len(), 1);
    assert_eq!(unmerged[0].path, "lib/parse.c");
    let stages: Vec<u8> = unmerged[0].parts.iter().map(|part| part.stage).collect();
    assert_eq!(stages, vec![1, 2, 3]);
}

#[test]
fn only_the_deepest_directory_holds_files() {
    let v5 = IndexV5::parse(&convert(&legacy_index(&["a/b/c/file"]))).expect("reads back");

    let directories: Vec<(&str, u32)> = v5
        .directories()
        .iter()
        .map(|directory| (directory.path.as_str(), directory.nfiles))
        .collect();
    assert_eq!(
        directories,
        vec![("", 0), ("a", 0), ("a/b", 0), ("a/b/c", 1)]
    );
}

#[test]
fn unsorted_stage_input_is_ordered_by_stage() {
    let entries = vec![entry("x", 3), entry("x", 1), entry("x", 2)];
    let index = LegacyIndex::new(3, entries, CacheTree::default(), Vec::new()).expect("valid index");

    let stages: Vec<u8> = index.conflicts()[""][0].parts.iter().map(|part| part.stage).collect();
    assert_eq!(stages, vec![1, 2, 3]);
}

#[test]
fn random_word_paths_round_trip() {
    let paths = random_paths(25);
    let names: Vec<&str> = paths.iter().map(String::as_str).collect();
    let index = legacy_index(&names);
    let data = convert(&index);

    let v5 = IndexV5::parse(&data).expect("written index reads back");
    let read: Vec<&str> = v5.files().iter().map(|file| file.path.as_str()).collect();
    assert_eq!(read, names);

    let again = convert(&index);
    assert_index_eq!(&again, &data);
}
