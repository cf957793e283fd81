//! Index data structures and codecs
//!
//! - `index`: legacy and version 5 records, flags, checksums and the
//!   directory table
//! - `objects`: object ids and the record encoding traits
pub mod index;
pub mod objects;
