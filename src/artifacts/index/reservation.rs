//! Forward-reference patching
//!
//! Several v5 fields (header counts, offset tables, directory records) are
//! only known after later sections are written. [`PatchWriter::reserve`]
//! writes a zero-filled placeholder and hands back a [`Reservation`]; the
//! real bytes go in through [`PatchWriter::commit`], which consumes the
//! handle. [`PatchWriter::finish`] refuses to complete while any placeholder
//! is still open.

use crate::artifacts::index::error::{IndexError, Result};
use std::collections::BTreeMap;
use std::io::{Seek, SeekFrom, Write};
use tracing::trace;

/// Placeholder span awaiting its final bytes
#[must_use = "a reservation has to be committed before the writer finishes"]
#[derive(Debug, PartialEq, Eq)]
pub struct Reservation {
    offset: u64,
    len: usize,
    label: &'static str,
}

impl Reservation {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct PatchWriter<W: Write + Seek> {
    inner: W,
    position: u64,
    /// Open reservations by offset
    outstanding: BTreeMap<u64, &'static str>,
}

impl<W: Write + Seek> PatchWriter<W> {
    pub fn new(mut inner: W) -> Result<Self> {
        let position = inner.stream_position()?;
        Ok(PatchWriter {
            inner,
            position,
            outstanding: BTreeMap::new(),
        })
    }

    /// Offset the next write lands at
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Append `data`, returning the offset it was written at
    pub fn write(&mut self, data: &[u8]) -> Result<u64> {
        let offset = self.position;
        self.inner.write_all(data)?;
        self.position += data.len() as u64;
        Ok(offset)
    }

    pub fn reserve(&mut self, len: usize, label: &'static str) -> Result<Reservation> {
        let offset = self.write(&vec![0; len])?;
        self.outstanding.insert(offset, label);
        trace!(label, offset, len, "reserved");

        Ok(Reservation { offset, len, label })
    }

    /// Fill a reservation with its final bytes
    pub fn commit(&mut self, reservation: Reservation, data: &[u8]) -> Result<()> {
        if data.len() != reservation.len {
            return Err(IndexError::logic(format!(
                "{} needs {} bytes, got {}",
                reservation.label,
                reservation.len,
                data.len()
            )));
        }
        if self.outstanding.remove(&reservation.offset).is_none() {
            return Err(IndexError::logic(format!(
                "{} is not reserved at offset {}",
                reservation.label, reservation.offset
            )));
        }

        self.inner.seek(SeekFrom::Start(reservation.offset))?;
        self.inner.write_all(data)?;
        self.inner.seek(SeekFrom::Start(self.position))?;
        trace!(label = reservation.label, offset = reservation.offset, "committed");

        Ok(())
    }

    /// Flush and hand back the underlying writer
    pub fn finish(mut self) -> Result<W> {
        if let Some((offset, label)) = self.outstanding.first_key_value() {
            return Err(IndexError::logic(format!(
                "{label} at offset {offset} was never filled in ({} open)",
                self.outstanding.len()
            )));
        }

        self.inner.flush()?;
        Ok(self.inner)
    }
}
