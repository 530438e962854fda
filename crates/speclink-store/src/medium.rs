//! Raw non-volatile medium access.
//!
//! The store only needs byte-addressed read/write primitives; what backs
//! them (EEPROM, flash file, RAM) is a collaborator concern. Writes are
//! assumed synchronous and atomic at the granularity of one call; the
//! store never relies on multi-call atomicity.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

/// Errors surfaced by a non-volatile medium.
#[derive(Error, Debug)]
pub enum MediumError {
    /// Access beyond the medium's capacity.
    #[error("access at {offset}+{len} beyond capacity {capacity}")]
    OutOfBounds {
        /// Byte offset of the access.
        offset: usize,
        /// Length of the access.
        len: usize,
        /// Medium capacity in bytes.
        capacity: usize,
    },

    /// The backing device reported an I/O failure.
    #[error("medium i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte-addressed non-volatile storage primitive.
pub trait NvmMedium: Send {
    /// Read `buf.len()` bytes starting at `offset`.
    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), MediumError>;

    /// Write `bytes` starting at `offset`.
    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MediumError>;

    /// Capacity of the medium in bytes.
    fn capacity(&self) -> usize;
}

impl NvmMedium for Box<dyn NvmMedium> {
    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), MediumError> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MediumError> {
        (**self).write_at(offset, bytes)
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }
}

fn check_span(offset: usize, len: usize, capacity: usize) -> Result<(), MediumError> {
    if offset.checked_add(len).map_or(true, |end| end > capacity) {
        return Err(MediumError::OutOfBounds {
            offset,
            len,
            capacity,
        });
    }
    Ok(())
}

// ============================================================================
// In-Memory Medium
// ============================================================================

/// A RAM-backed medium for tests and diskless bring-up.
#[derive(Debug, Clone)]
pub struct MemMedium {
    bytes: Vec<u8>,
}

impl MemMedium {
    /// Create a zero-filled medium of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        MemMedium {
            bytes: vec![0; capacity],
        }
    }

    /// Borrow the raw contents (test inspection).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl NvmMedium for MemMedium {
    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), MediumError> {
        check_span(offset, buf.len(), self.bytes.len())?;
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MediumError> {
        check_span(offset, bytes.len(), self.bytes.len())?;
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

// ============================================================================
// File Medium
// ============================================================================

/// A file-backed medium used by the device runner.
#[derive(Debug)]
pub struct FileMedium {
    file: File,
    capacity: usize,
}

impl FileMedium {
    /// Open (or create and zero-fill) a backing file of `capacity` bytes.
    pub fn open(path: &Path, capacity: usize) -> Result<Self, MediumError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < capacity {
            file.seek(SeekFrom::Start(len as u64))?;
            let fill = vec![0u8; capacity - len];
            file.write_all(&fill)?;
            file.sync_all()?;
        }
        Ok(FileMedium { file, capacity })
    }
}

impl NvmMedium for FileMedium {
    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), MediumError> {
        check_span(offset, buf.len(), self.capacity)?;
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MediumError> {
        check_span(offset, bytes.len(), self.capacity)?;
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(bytes)?;
        self.file.sync_data()?;
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_medium_round_trip_and_bounds() {
        let mut medium = MemMedium::new(64);
        medium.write_at(10, &[1, 2, 3]).unwrap();

        let mut buf = [0u8; 3];
        medium.read_at(10, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);

        assert!(matches!(
            medium.write_at(62, &[0; 4]),
            Err(MediumError::OutOfBounds { .. })
        ));
        assert!(matches!(
            medium.read_at(64, &mut buf),
            Err(MediumError::OutOfBounds { .. })
        ));
    }
}
