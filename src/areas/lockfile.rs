//! Atomic replacement of an index file
//!
//! Output goes to `<target>.lock`, created exclusively and held under an
//! exclusive lock while it is written. [`Lockfile::commit`] syncs it and
//! renames it over the target; dropping an uncommitted lockfile removes it,
//! so a failed conversion never leaves a partial index behind.

use crate::artifacts::index::error::{IndexError, Result};
use file_guard::{FileGuard, Lock};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::DerefMut;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct Lockfile {
    target: PathBuf,
    lock_path: PathBuf,
    /// `None` once committed
    guard: Option<FileGuard<Box<File>>>,
}

impl Lockfile {
    pub fn acquire(target: &Path) -> Result<Self> {
        let mut lock_path = target.as_os_str().to_owned();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|err| match err.kind() {
                io::ErrorKind::AlreadyExists => IndexError::Locked {
                    path: lock_path.clone(),
                },
                _ => IndexError::Io(err),
            })?;

        let guard = match file_guard::lock(Box::new(file), Lock::Exclusive, 0, 1) {
            Ok(guard) => guard,
            Err(err) => {
                let _ = std::fs::remove_file(&lock_path);
                return Err(err.into());
            }
        };
        debug!(path = %lock_path.display(), "acquired lock");

        Ok(Lockfile {
            target: target.to_path_buf(),
            lock_path,
            guard: Some(guard),
        })
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    fn file(&mut self) -> io::Result<&mut File> {
        match self.guard.as_mut() {
            Some(guard) => Ok(guard.deref_mut().deref_mut()),
            None => Err(io::Error::other("lockfile already committed")),
        }
    }

    /// Everything written so far
    pub fn contents(&mut self) -> Result<Vec<u8>> {
        let file = self.file()?;
        let position = file.stream_position()?;

        let mut data = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut data)?;
        file.seek(SeekFrom::Start(position))?;

        Ok(data)
    }

    /// Sync the written data and move it over the target
    pub fn commit(mut self) -> Result<()> {
        let file = self.file()?;
        file.flush()?;
        file.sync_all()?;

        // unlock before the rename
        self.guard = None;
        if let Err(err) = std::fs::rename(&self.lock_path, &self.target) {
            let _ = std::fs::remove_file(&self.lock_path);
            return Err(err.into());
        }
        debug!(path = %self.target.display(), "committed lockfile");

        Ok(())
    }
}

impl Write for Lockfile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl Seek for Lockfile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        if self.guard.take().is_none() {
            return;
        }

        if let Err(err) = std::fs::remove_file(&self.lock_path) {
            warn!(path = %self.lock_path.display(), %err, "could not remove lockfile");
        }
    }
}
