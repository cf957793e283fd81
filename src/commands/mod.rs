//! Command implementations
//!
//! Each command is an `impl Repository` block writing its report to the
//! repository writer:
//!
//! - `convert`: legacy index to version 5, with optional listings of the input
//! - `ls-files`: list the contents of a version 5 index
//! - `verify`: compare a version 5 index against the legacy index it came from

pub mod convert;
pub mod ls_files;
pub mod verify;
