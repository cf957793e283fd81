//! Object identifiers and record (de)serialization traits
//!
//! The index never looks inside objects; it only stores their 20-byte SHA-1
//! ids and compares them for equality.

pub mod object;
pub mod object_id;

/// Length of a SHA-1 hash in hexadecimal format
pub const OBJECT_ID_LENGTH: usize = 40;

/// Length of a SHA-1 hash in raw bytes
pub const OBJECT_ID_BYTES: usize = 20;
