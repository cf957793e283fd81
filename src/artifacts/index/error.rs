//! Index error taxonomy
//!
//! Every failure while reading, converting or writing an index maps onto one
//! of these variants. None of them is retried: they describe either a
//! malformed file or a broken writer invariant.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Bad signature, unsupported version or otherwise unparseable content
    #[error("invalid index format: {reason}")]
    Format { reason: String },

    /// The file cannot even hold a header and its checksum
    #[error("index file too small: {size} bytes, expected at least {minimum}")]
    TruncatedFile { size: u64, minimum: u64 },

    /// A fixed-size record or a name ran past the end of the data
    #[error("truncated {record}: needed {needed} more bytes")]
    TruncatedRecord { record: &'static str, needed: usize },

    /// A CRC32 or SHA1 check failed
    #[error("checksum mismatch for {subject}")]
    Integrity { subject: String },

    /// An invariant the writer itself must uphold was broken
    #[error("internal invariant violated: {reason}")]
    Logic { reason: String },

    #[error("unable to lock {path:?}: lock file already exists")]
    Locked { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn format(reason: impl Into<String>) -> Self {
        IndexError::Format {
            reason: reason.into(),
        }
    }

    pub fn integrity(subject: impl Into<String>) -> Self {
        IndexError::Integrity {
            subject: subject.into(),
        }
    }

    pub fn logic(reason: impl Into<String>) -> Self {
        IndexError::Logic {
            reason: reason.into(),
        }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, IndexError::Integrity { .. })
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
