//! File header (the fixed prologue in front of the first record)

use crate::core::error::{GeomDbError, Result};

pub const MAGIC: [u8; 8] = *b"GEOM\x00\x05\x00\x00";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

/// Every record length (and therefore every record address) is a multiple of this.
pub const ALIGNMENT: u64 = 8;

/// Size of the serialized header; records start right after it.
pub const HEADER_SIZE: u64 = 32;

const CHECKSUM_OFFSET: usize = 28;

/// Database file header
///
/// Layout (little-endian):
///
/// ```text
/// 0..8    magic
/// 8..10   version major
/// 10..12  version minor
/// 12..16  alignment unit
/// 16..28  reserved (zero)
/// 28..32  CRC32 of bytes 0..28
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 8],
    pub version_major: u16,
    pub version_minor: u16,
    pub alignment: u32,
    pub reserved: [u8; 12],
}

impl Header {
    pub fn new() -> Self {
        Header {
            magic: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            alignment: ALIGNMENT as u32,
            reserved: [0; 12],
        }
    }

    /// Validate the header magic, version and alignment
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(GeomDbError::InvalidHeader("bad magic number".to_string()));
        }

        if self.version_major != VERSION_MAJOR {
            return Err(GeomDbError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
            });
        }

        if self.alignment as u64 != ALIGNMENT {
            return Err(GeomDbError::InvalidHeader(format!(
                "alignment {} (expected {})",
                self.alignment, ALIGNMENT
            )));
        }

        Ok(())
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE as usize);

        bytes.extend_from_slice(&self.magic);
        bytes.extend_from_slice(&self.version_major.to_le_bytes());
        bytes.extend_from_slice(&self.version_minor.to_le_bytes());
        bytes.extend_from_slice(&self.alignment.to_le_bytes());
        bytes.extend_from_slice(&self.reserved);

        let checksum = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());

        bytes
    }

    /// Deserialize and checksum-verify a header
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(GeomDbError::InvalidHeader(format!(
                "need {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let stored = u32::from_le_bytes([
            bytes[CHECKSUM_OFFSET],
            bytes[CHECKSUM_OFFSET + 1],
            bytes[CHECKSUM_OFFSET + 2],
            bytes[CHECKSUM_OFFSET + 3],
        ]);
        if crc32fast::hash(&bytes[..CHECKSUM_OFFSET]) != stored {
            return Err(GeomDbError::InvalidHeader("checksum mismatch".to_string()));
        }

        let mut header = Header::new();
        header.magic.copy_from_slice(&bytes[0..8]);
        header.version_major = u16::from_le_bytes([bytes[8], bytes[9]]);
        header.version_minor = u16::from_le_bytes([bytes[10], bytes[11]]);
        header.alignment = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        header.reserved.copy_from_slice(&bytes[16..28]);

        Ok(header)
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

/// Round `len` up to the next multiple of [`ALIGNMENT`]
pub fn align_up(len: u64) -> u64 {
    (len + ALIGNMENT - 1) / ALIGNMENT * ALIGNMENT
}
