use crate::artifacts::index::CHECKSUM_SIZE;
use crate::artifacts::index::codec;
use crate::artifacts::index::error::{IndexError, Result};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

/// Running SHA-1 over every byte that passes through a legacy index stream
///
/// The trailing digest itself is never fed into the context.
#[derive(Debug)]
pub struct Checksum<T> {
    inner: T,
    digest: Sha1,
    consumed: u64,
}

impl<T> Checksum<T> {
    pub fn new(inner: T) -> Self {
        Checksum {
            inner,
            digest: Sha1::new(),
            consumed: 0,
        }
    }

    /// Number of bytes hashed so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Checksum<T> {
    pub fn read(&mut self, size: usize) -> Result<Bytes> {
        let mut buffer = vec![0; size];
        let mut filled = 0;
        while filled < size {
            let read = self.inner.read(&mut buffer[filled..])?;
            if read == 0 {
                return Err(IndexError::TruncatedRecord {
                    record: "index data",
                    needed: size - filled,
                });
            }
            filled += read;
        }

        self.digest.update(&buffer);
        self.consumed += size as u64;
        Ok(Bytes::from(buffer))
    }

    /// Compare the next 20 bytes against the digest of everything read so far
    pub fn verify(&mut self) -> Result<()> {
        let expected_checksum = codec::read_fixed::<CHECKSUM_SIZE, T>(&mut self.inner, "checksum")?;

        let actual_checksum = self.digest.clone().finalize();
        if expected_checksum != actual_checksum.as_slice() {
            return Err(IndexError::integrity("whole file SHA-1"));
        }

        Ok(())
    }
}

/// Lets record parsers pull bytes through the checksum with `std::io::Read`
impl<T: Read> Read for Checksum<T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.digest.update(&buf[..read]);
        self.consumed += read as u64;
        Ok(read)
    }
}

impl<T: Write> Checksum<T> {
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        self.digest.update(data);
        self.consumed += data.len() as u64;
        Ok(())
    }

    pub fn write_checksum(&mut self) -> Result<()> {
        let checksum = self.digest.clone().finalize();
        self.inner.write_all(checksum.as_slice())?;
        self.inner.flush()?;

        Ok(())
    }
}

/// Check the trailing SHA-1 of a complete in-memory legacy index
pub fn digest_matches(data: &[u8]) -> bool {
    if data.len() < CHECKSUM_SIZE {
        return false;
    }

    let (content, stored) = data.split_at(data.len() - CHECKSUM_SIZE);
    Sha1::digest(content).as_slice() == stored
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn checksummed(content: &[u8]) -> Vec<u8> {
        let mut writer = Checksum::new(Vec::new());
        writer.write(content).unwrap();
        writer.write_checksum().unwrap();
        writer.into_inner()
    }

    #[test]
    fn written_checksum_verifies_on_read() {
        let data = checksummed(b"DIRC payload");
        let mut reader = Checksum::new(data.as_slice());

        assert_eq!(reader.read(12).unwrap().as_ref(), b"DIRC payload");
        reader.verify().unwrap();
        assert_eq!(reader.consumed(), 12);
    }

    #[test]
    fn flipped_byte_fails_verification() {
        let mut data = checksummed(b"DIRC payload");
        data[3] ^= 0x01;
        let mut reader = Checksum::new(data.as_slice());

        reader.read(12).unwrap();
        assert!(reader.verify().unwrap_err().is_integrity());
        assert!(!digest_matches(&data));
    }

    #[test]
    fn short_read_is_truncated_record() {
        let mut reader = Checksum::new(b"DIR".as_slice());

        assert!(matches!(
            reader.read(4).unwrap_err(),
            IndexError::TruncatedRecord { needed: 1, .. }
        ));
    }
}
