//! Backing storage for database files
//!
//! The allocator and codec never touch a file directly; they go through
//! [`Storage`], which has a disk-backed and an in-memory implementation.

use crate::core::error::{GeomDbError, Result};
use crate::core::header::{Header, HEADER_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Byte-addressed backing store
pub trait Storage: Send {
    /// Fill `buf` with the bytes starting at `offset`
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at `offset`
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Current physical length in bytes
    fn len(&self) -> Result<u64>;

    /// Grow (or truncate) to exactly `len` bytes
    fn set_len(&mut self, len: u64) -> Result<()>;

    /// Flush buffered writes to durable storage
    fn sync(&mut self) -> Result<()>;

    /// Path on disk, if any
    fn path(&self) -> Option<&Path> {
        None
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read_header(&mut self) -> Result<Header> {
        let mut buffer = vec![0u8; HEADER_SIZE as usize];
        self.read_at(0, &mut buffer)?;
        Header::from_bytes(&buffer)
    }

    fn write_header(&mut self, header: &Header) -> Result<()> {
        self.write_at(0, &header.to_bytes())
    }
}

/// Disk-backed database file
pub struct DatabaseFile {
    file: File,
    path: PathBuf,
    read_only: bool,
}

impl DatabaseFile {
    /// Create (truncating) a database file and write its header
    pub fn create<P: AsRef<Path>>(path: P, header: &Header) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        file.write_all(&header.to_bytes())?;
        file.flush()?;

        Ok(DatabaseFile {
            file,
            path: path.as_ref().to_path_buf(),
            read_only: false,
        })
    }

    /// Open an existing database file
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&path)?;

        Ok(DatabaseFile {
            file,
            path: path.as_ref().to_path_buf(),
            read_only,
        })
    }
}

impl Storage for DatabaseFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(GeomDbError::ReadOnlyViolation);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        if self.read_only {
            return Err(GeomDbError::ReadOnlyViolation);
        }
        self.file.set_len(len)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if !self.read_only {
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// In-memory storage, used for scratch databases and tests
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    bytes: Vec<u8>,
}

impl MemoryStorage {
    /// Fresh storage containing only a header
    pub fn new(header: &Header) -> Self {
        MemoryStorage {
            bytes: header.to_bytes(),
        }
    }

    /// Wrap an existing image (e.g. a file read into memory)
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        MemoryStorage { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Storage for MemoryStorage {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.bytes.len() {
            return Err(GeomDbError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("read of {}..{} past end {}", start, end, self.bytes.len()),
            )));
        }
        buf.copy_from_slice(&self.bytes[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + data.len();
        if end > self.bytes.len() {
            self.bytes.resize(end, 0);
        }
        self.bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.bytes.len() as u64)
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.bytes.resize(len as usize, 0);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
