//! Index file formats
//!
//! The index (also called staging area or cache) stores information about the working tree.
//! Two on-disk layouts are handled here: the flat legacy format and the
//! hierarchical version 5 format it is converted into.
//!
//! ## Legacy format (versions 2 and 3)
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "DIRC" (4 bytes)
//!   - Version: 2 or 3 (4 bytes)
//!   - Entry count (4 bytes)
//!
//! Entries (variable length):
//!   - Stat data, object id, flags (62 bytes, 64 with extended flags)
//!   - Nul-terminated path, padded to 8-byte alignment
//!
//! Extensions (optional):
//!   - 4-byte tag, 4-byte size, payload ("TREE", "REUC", ...)
//!
//! Checksum (20 bytes):
//!   - SHA-1 hash of all preceding bytes
//! ```
//!
//! ## Version 5
//!
//! ```text
//! Header         "DIRC", 5, ndir, nfile, file block offset, extensions, crc
//! Dir offsets    (ndir + 1) x u32, relative to the directory block
//! Directories    name NUL + 46 bytes of data + crc, sorted by path + "/"
//! File offsets   (nfile + 1) x u32, relative to the file block
//! Files          basename NUL + 36 bytes of data + crc, grouped by directory
//! Conflicts      full path NUL + part count + 24 bytes per part + crc
//! ```

pub mod cache_tree;
pub mod checksum;
pub mod codec;
pub mod conflict;
pub mod crc;
pub mod dir_tree;
pub mod directory_entry;
pub mod entry_flags;
pub mod entry_mode;
pub mod error;
pub mod file_entry;
pub mod index_entry;
pub mod index_header;
pub mod reservation;

/// Size of SHA-1 checksum in bytes
pub const CHECKSUM_SIZE: usize = 20; // SHA1 produces a 20-byte hash

/// Magic signature identifying index files
pub const SIGNATURE: &[u8; 4] = b"DIRC";

/// Size of legacy index header in bytes
pub const LEGACY_HEADER_SIZE: usize = 12; // 4 bytes for marker, 4 for version, 4 for entries_count

/// Legacy versions the converter understands
pub const LEGACY_VERSIONS: [u32; 2] = [2, 3];

/// Version written by the converter
pub const V5_VERSION: u32 = 5;

/// Fixed part of the v5 header, before extension offsets and crc
pub const V5_HEADER_SIZE: usize = 24;

/// Size of one entry in the directory, file and extension offset tables
pub const OFFSET_SIZE: usize = 4;

/// Directory record after the name: five u32 counters, i32 entries, tree id, flags
pub const DIRECTORY_DATA_SIZE: usize = 46;

/// File record after the basename: flags, mode, mtime, stat crc, object id
pub const FILE_DATA_SIZE: usize = 36;

/// One (flags, mode, object id) triple of a conflict record
pub const CONFLICT_PART_SIZE: usize = 24;
