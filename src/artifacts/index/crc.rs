//! Per-record CRC32
//!
//! Every v5 record ends with a big-endian CRC32 of its bytes. The accumulator
//! can be fed arbitrary slices, so records that also cover data not stored
//! inline (a file record's own offset) use the same code path.

use crate::artifacts::index::codec;
use crate::artifacts::index::error::Result;
use crc32fast::Hasher;
use std::io::{Read, Write};

/// Size of a stored CRC32 in bytes
pub const CRC_SIZE: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct Crc {
    hasher: Hasher,
}

impl Crc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Read the next 4 bytes and compare them to the accumulated value
    pub fn matches<R: Read + ?Sized>(&self, reader: &mut R) -> Result<bool> {
        let stored = codec::read_u32(reader, "crc32")?;
        Ok(stored == self.value())
    }

    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.value().to_be_bytes())?;
        Ok(())
    }
}

/// One-shot CRC32 of `data`
pub fn crc_of(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.add(data);
    crc.value()
}

/// `Read` adapter that feeds every byte it yields into a [`Crc`]
pub struct CrcReader<'r, R: Read + ?Sized> {
    inner: &'r mut R,
    crc: Crc,
}

impl<'r, R: Read + ?Sized> CrcReader<'r, R> {
    pub fn new(inner: &'r mut R) -> Self {
        Self {
            inner,
            crc: Crc::new(),
        }
    }

    /// Start from a CRC that already covers out-of-band data
    pub fn with_crc(inner: &'r mut R, crc: Crc) -> Self {
        Self { inner, crc }
    }

    /// Consume the stored CRC that follows the record
    pub fn verify(self) -> Result<bool> {
        self.crc.matches(self.inner)
    }
}

impl<R: Read + ?Sized> Read for CrcReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.crc.add(&buf[..read]);
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn matches_zlib_crc32() {
        // zlib crc32("hello")
        assert_eq!(crc_of(b"hello"), 0x3610_a686);
    }

    #[test]
    fn accumulates_across_slices() {
        let mut crc = Crc::new();
        crc.add(b"hel");
        crc.add(b"lo");

        assert_eq!(crc.value(), crc_of(b"hello"));
    }

    #[test]
    fn reader_verifies_trailing_crc() {
        let mut data = b"hello".to_vec();
        data.extend_from_slice(&crc_of(b"hello").to_be_bytes());
        let mut source = data.as_slice();

        let mut reader = CrcReader::new(&mut source);
        let record = codec::read_fixed::<5, _>(&mut reader, "record").unwrap();

        assert_eq!(&record, b"hello");
        assert!(reader.verify().unwrap());
        assert!(source.is_empty());
    }

    #[test]
    fn reader_detects_flipped_byte() {
        let mut data = b"hellp".to_vec();
        data.extend_from_slice(&crc_of(b"hello").to_be_bytes());
        let mut source = data.as_slice();

        let mut reader = CrcReader::new(&mut source);
        codec::read_fixed::<5, _>(&mut reader, "record").unwrap();

        assert!(!reader.verify().unwrap());
    }
}
