//! Fixed-width record helpers
//!
//! All multi-byte integers in both index formats are big-endian. Reads of a
//! fixed record either return the whole record or fail with
//! `IndexError::TruncatedRecord`, never a partial value.

use crate::artifacts::index::error::{IndexError, Result};
use byteorder::{ByteOrder, NetworkEndian};
use std::io::{ErrorKind, Read};

/// Upper bound for nul-terminated names, guards against runaway reads
const MAX_NAME_SIZE: usize = 64 * 1024;

/// Read exactly `N` bytes describing `record`
pub fn read_fixed<const N: usize, R: Read + ?Sized>(
    reader: &mut R,
    record: &'static str,
) -> Result<[u8; N]> {
    let mut buffer = [0u8; N];
    let mut filled = 0;

    while filled < N {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => {
                return Err(IndexError::TruncatedRecord {
                    record,
                    needed: N - filled,
                });
            }
            Ok(read) => filled += read,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(buffer)
}

pub fn read_u32<R: Read + ?Sized>(reader: &mut R, record: &'static str) -> Result<u32> {
    let bytes = read_fixed::<4, R>(reader, record)?;
    Ok(NetworkEndian::read_u32(&bytes))
}

/// Read a nul-terminated name, returning it without the terminator
pub fn read_name<R: Read + ?Sized>(reader: &mut R, record: &'static str) -> Result<String> {
    let name = read_name_bytes(reader, record)?;
    into_name(name, record)
}

/// Raw form of [`read_name`], for records whose checksum must be verified
/// before the name is trusted
pub fn read_name_bytes<R: Read + ?Sized>(
    reader: &mut R,
    record: &'static str,
) -> Result<Vec<u8>> {
    let mut name = Vec::new();

    loop {
        let [byte] = read_fixed::<1, R>(reader, record)?;
        if byte == 0 {
            return Ok(name);
        }
        if name.len() == MAX_NAME_SIZE {
            return Err(IndexError::format(format!(
                "{record} name longer than {MAX_NAME_SIZE} bytes"
            )));
        }
        name.push(byte);
    }
}

pub fn into_name(name: Vec<u8>, record: &'static str) -> Result<String> {
    String::from_utf8(name).map_err(|_| IndexError::format(format!("invalid UTF-8 in {record}")))
}

/// Discard `len` bytes, failing if fewer are available
pub fn skip<R: Read + ?Sized>(reader: &mut R, len: usize, record: &'static str) -> Result<()> {
    let copied = std::io::copy(&mut reader.take(len as u64), &mut std::io::sink())?;
    if copied < len as u64 {
        return Err(IndexError::TruncatedRecord {
            record,
            needed: len - copied as usize,
        });
    }
    Ok(())
}

/// Read bytes up to (not including) `delimiter`, consuming the delimiter
pub fn read_until<R: Read + ?Sized>(
    reader: &mut R,
    delimiter: u8,
    record: &'static str,
) -> Result<Vec<u8>> {
    let mut data = Vec::new();

    loop {
        let [byte] = read_fixed::<1, R>(reader, record)?;
        if byte == delimiter {
            return Ok(data);
        }
        if data.len() == MAX_NAME_SIZE {
            return Err(IndexError::format(format!("unterminated field in {record}")));
        }
        data.push(byte);
    }
}

/// Parse an ASCII decimal or octal number as found in index extensions
pub fn parse_ascii_number(data: &[u8], radix: u32, record: &'static str) -> Result<i64> {
    let text = std::str::from_utf8(data)
        .map_err(|_| IndexError::format(format!("non-ASCII number in {record}")))?;

    i64::from_str_radix(text, radix)
        .map_err(|_| IndexError::format(format!("invalid number {text:?} in {record}")))
}
