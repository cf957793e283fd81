//! File-backed index components
//!
//! - `legacy_index`: version 2/3 index reader and writer
//! - `v5_writer`: converts a legacy index into the version 5 layout
//! - `index_v5`: version 5 index reader
//! - `lockfile`: exclusive `.lock` file that atomically replaces its target
//! - `repository`: the metadata directory commands operate on

pub mod index_v5;
pub mod legacy_index;
pub mod lockfile;
pub mod repository;
pub mod v5_writer;
