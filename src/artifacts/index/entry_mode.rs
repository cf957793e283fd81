use crate::artifacts::index::error::IndexError;
use std::fmt;

const REGULAR_TYPE_MASK: u32 = 0o170000;
const REGULAR_TYPE: u32 = 0o100000;
const OWNER_EXECUTE: u32 = 0o100;

#[derive(Debug, Clone, Copy, Eq, Ord, Default, PartialEq, PartialOrd, Hash)]
pub enum FileMode {
    #[default]
    Regular,
    Executable,
}

/// Object type and permission bits of a tracked path
#[derive(Debug, Clone, Copy, Eq, Ord, Default, PartialEq, PartialOrd, Hash)]
pub enum EntryMode {
    File(FileMode),
    Symlink,
    Gitlink,
    #[default]
    Directory,
}

impl EntryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryMode::File(FileMode::Regular) => "100644",
            EntryMode::File(FileMode::Executable) => "100755",
            EntryMode::Symlink => "120000",
            EntryMode::Gitlink => "160000",
            EntryMode::Directory => "40000",
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            EntryMode::File(FileMode::Regular) => 0o100644,
            EntryMode::File(FileMode::Executable) => 0o100755,
            EntryMode::Symlink => 0o120000,
            EntryMode::Gitlink => 0o160000,
            EntryMode::Directory => 0o40000,
        }
    }

    /// The v5 format stores modes in 16 bits; every valid mode fits
    pub fn as_u16(&self) -> u16 {
        self.as_u32() as u16
    }
}

impl TryFrom<u32> for EntryMode {
    type Error = IndexError;

    fn try_from(mode: u32) -> Result<Self, Self::Error> {
        match mode {
            0o100644 => Ok(EntryMode::File(FileMode::Regular)),
            0o100755 => Ok(EntryMode::File(FileMode::Executable)),
            0o120000 => Ok(EntryMode::Symlink),
            0o160000 => Ok(EntryMode::Gitlink),
            0o40000 => Ok(EntryMode::Directory),
            // older writers kept group write and other permission bits
            mode if mode & REGULAR_TYPE_MASK == REGULAR_TYPE => {
                if mode & OWNER_EXECUTE != 0 {
                    Ok(EntryMode::File(FileMode::Executable))
                } else {
                    Ok(EntryMode::File(FileMode::Regular))
                }
            }
            _ => Err(IndexError::format(format!("invalid entry mode {mode:o}"))),
        }
    }
}

impl TryFrom<&str> for EntryMode {
    type Error = IndexError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mode = u32::from_str_radix(value, 8)
            .map_err(|_| IndexError::format(format!("invalid entry mode {value:?}")))?;
        EntryMode::try_from(mode)
    }
}

impl From<FileMode> for EntryMode {
    fn from(mode: FileMode) -> Self {
        EntryMode::File(mode)
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06o}", self.as_u32())
    }
}
