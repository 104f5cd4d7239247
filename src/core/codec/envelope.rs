//! Record envelope: external (serialized) form and the raw view over it
//!
//! ```text
//! Common preamble (every record)
//!   0      MAGIC1
//!   1      kind (0 = data, 1 = free)
//!   2      flags (bit 0 = hidden)
//!   3      reserved
//!   4..8   record length / ALIGNMENT (u32 LE)
//! Data record
//!   8      major type
//!   9      minor type
//!   10..12 reserved
//!   12..16 name length (u32 LE)
//!   16..20 attribute block length (u32 LE)
//!   20..24 body length (u32 LE)
//!   24..   name | attributes | body | zero padding
//! ```

use crate::core::codec::attributes::AttributeSet;
use crate::core::codec::record::{validate_name, MajorType, Record};
use crate::core::error::{GeomDbError, Result};
use crate::core::header::{align_up, ALIGNMENT};
use std::ops::Range;

pub const MAGIC1: u8 = 0x76;
pub const PREAMBLE_SIZE: usize = 8;
pub const DATA_HEADER_SIZE: usize = 24;
pub const FLAG_HIDDEN: u8 = 0x01;

const FLAGS_OFFSET: usize = 2;

/// Record kind stored in the preamble
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Data = 0,
    Free = 1,
}

impl RecordKind {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(RecordKind::Data),
            1 => Ok(RecordKind::Free),
            _ => Err(GeomDbError::MalformedEnvelope(format!(
                "unknown record kind {}",
                value
            ))),
        }
    }
}

/// The fixed eight bytes at the start of every record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    pub kind: RecordKind,
    pub flags: u8,
    /// Total record length in bytes, padding included
    pub length: u64,
}

impl Preamble {
    pub fn to_bytes(&self) -> [u8; PREAMBLE_SIZE] {
        let units = (self.length / ALIGNMENT) as u32;
        let mut bytes = [0u8; PREAMBLE_SIZE];
        bytes[0] = MAGIC1;
        bytes[1] = self.kind as u8;
        bytes[2] = self.flags;
        bytes[4..8].copy_from_slice(&units.to_le_bytes());
        bytes
    }

    /// Read the preamble at the front of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PREAMBLE_SIZE {
            return Err(GeomDbError::MalformedEnvelope(format!(
                "{} bytes is shorter than the record preamble",
                bytes.len()
            )));
        }
        if bytes[0] != MAGIC1 {
            return Err(GeomDbError::MalformedEnvelope(format!(
                "bad record magic 0x{:02x}",
                bytes[0]
            )));
        }
        let kind = RecordKind::from_u8(bytes[1])?;
        let units = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if units == 0 {
            return Err(GeomDbError::MalformedEnvelope("zero record length".into()));
        }

        Ok(Preamble {
            kind,
            flags: bytes[2],
            length: units as u64 * ALIGNMENT,
        })
    }
}

/// Read kind and length of the record starting at `bytes`, for linear scans
pub fn peek_preamble(bytes: &[u8]) -> Result<Preamble> {
    Preamble::parse(bytes)
}

/// The marker written at the start of a free range
pub fn free_marker(length: u64) -> [u8; PREAMBLE_SIZE] {
    Preamble {
        kind: RecordKind::Free,
        flags: 0,
        length,
    }
    .to_bytes()
}

/// Owned external form of one data record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalBuffer {
    bytes: Vec<u8>,
}

impl ExternalBuffer {
    /// Wrap bytes read from storage; validated lazily by [`ExternalBuffer::view`]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        ExternalBuffer { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrowing decode of the envelope
    pub fn view(&self) -> Result<RawRecordView<'_>> {
        RawRecordView::parse(&self.bytes)
    }
}

/// Serialize a typed record
pub fn encode(record: &Record) -> Result<ExternalBuffer> {
    validate_name(&record.name)?;
    encode_parts(
        &record.name,
        record.hidden,
        record.major_type,
        record.minor_type,
        &record.attributes.to_bytes(),
        &record.body,
    )
}

/// Serialize from already-encoded attribute and body bytes
///
/// Used when re-emitting a record from a [`RawRecordView`] so that the
/// attribute and body bytes are carried over untouched.
pub fn encode_parts(
    name: &str,
    hidden: bool,
    major_type: MajorType,
    minor_type: u8,
    attributes: &[u8],
    body: &[u8],
) -> Result<ExternalBuffer> {
    let too_large = |what: &str, len: usize| {
        GeomDbError::AllocationFailed(format!("{} of {} bytes exceeds the envelope limit", what, len))
    };
    let name_len = u32::try_from(name.len()).map_err(|_| too_large("name", name.len()))?;
    let attr_len =
        u32::try_from(attributes.len()).map_err(|_| too_large("attribute block", attributes.len()))?;
    let body_len = u32::try_from(body.len()).map_err(|_| too_large("body", body.len()))?;

    let content = DATA_HEADER_SIZE as u64 + name_len as u64 + attr_len as u64 + body_len as u64;
    let length = align_up(content);
    if length / ALIGNMENT > u32::MAX as u64 {
        return Err(too_large("record", length as usize));
    }

    let preamble = Preamble {
        kind: RecordKind::Data,
        flags: if hidden { FLAG_HIDDEN } else { 0 },
        length,
    };

    let mut bytes = Vec::with_capacity(length as usize);
    bytes.extend_from_slice(&preamble.to_bytes());
    bytes.push(major_type.as_u8());
    bytes.push(minor_type);
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&name_len.to_le_bytes());
    bytes.extend_from_slice(&attr_len.to_le_bytes());
    bytes.extend_from_slice(&body_len.to_le_bytes());
    bytes.extend_from_slice(name.as_bytes());
    bytes.extend_from_slice(attributes);
    bytes.extend_from_slice(body);
    bytes.resize(length as usize, 0);

    Ok(ExternalBuffer { bytes })
}

/// Re-derive a buffer with only the hidden bit changed
pub fn set_hidden(buffer: &ExternalBuffer, hidden: bool) -> Result<ExternalBuffer> {
    // Validate first so a garbage buffer is never "fixed up"
    buffer.view()?;

    let mut bytes = buffer.bytes.clone();
    if hidden {
        bytes[FLAGS_OFFSET] |= FLAG_HIDDEN;
    } else {
        bytes[FLAGS_OFFSET] &= !FLAG_HIDDEN;
    }
    Ok(ExternalBuffer { bytes })
}

/// Non-owning decode of a data record's envelope
#[derive(Debug, Clone)]
pub struct RawRecordView<'a> {
    bytes: &'a [u8],
    pub hidden: bool,
    pub major_type: MajorType,
    pub minor_type: u8,
    pub name: &'a str,
    /// Byte range of the attribute block within the buffer
    pub attributes: Range<usize>,
    /// Byte range of the body within the buffer
    pub body: Range<usize>,
}

impl<'a> RawRecordView<'a> {
    /// Parse exactly one data record occupying all of `bytes`
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let preamble = Preamble::parse(bytes)?;
        if preamble.kind != RecordKind::Data {
            return Err(GeomDbError::MalformedEnvelope(
                "free record has no object envelope".to_string(),
            ));
        }
        if preamble.length != bytes.len() as u64 {
            return Err(GeomDbError::MalformedEnvelope(format!(
                "declared length {} but buffer holds {} bytes",
                preamble.length,
                bytes.len()
            )));
        }
        if bytes.len() < DATA_HEADER_SIZE {
            return Err(GeomDbError::MalformedEnvelope(format!(
                "{} bytes is shorter than the minimum envelope",
                bytes.len()
            )));
        }

        let read_u32 = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
        };
        let name_len = read_u32(12);
        let attr_len = read_u32(16);
        let body_len = read_u32(20);

        let name_range = DATA_HEADER_SIZE..DATA_HEADER_SIZE + name_len;
        let attributes = name_range.end..name_range.end + attr_len;
        let body = attributes.end..attributes.end + body_len;

        if name_len == 0 {
            return Err(GeomDbError::MalformedEnvelope("empty object name".into()));
        }
        if body.end > bytes.len() {
            return Err(GeomDbError::MalformedEnvelope(format!(
                "content ends at {} past record length {}",
                body.end,
                bytes.len()
            )));
        }
        if align_up(body.end as u64) != bytes.len() as u64 {
            return Err(GeomDbError::MalformedEnvelope(format!(
                "{} bytes of padding after content",
                bytes.len() - body.end
            )));
        }

        let name = std::str::from_utf8(&bytes[name_range])
            .map_err(|_| GeomDbError::MalformedEnvelope("object name not UTF-8".into()))?;

        Ok(RawRecordView {
            bytes,
            hidden: preamble.flags & FLAG_HIDDEN != 0,
            major_type: MajorType::from_u8(bytes[8]),
            minor_type: bytes[9],
            name,
            attributes,
            body,
        })
    }

    pub fn length(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn attribute_bytes(&self) -> &'a [u8] {
        &self.bytes[self.attributes.clone()]
    }

    pub fn body_bytes(&self) -> &'a [u8] {
        &self.bytes[self.body.clone()]
    }

    /// Decode the attribute block
    pub fn attribute_set(&self) -> Result<AttributeSet> {
        AttributeSet::from_bytes(self.attribute_bytes())
    }

    /// Materialize the typed record
    pub fn to_record(&self) -> Result<Record> {
        Ok(Record {
            name: self.name.to_string(),
            major_type: self.major_type,
            minor_type: self.minor_type,
            hidden: self.hidden,
            attributes: self.attribute_set()?,
            body: self.body_bytes().to_vec(),
        })
    }

    /// Re-emit this record under another name, attributes and body untouched
    pub fn renamed(&self, name: &str) -> Result<ExternalBuffer> {
        validate_name(name)?;
        encode_parts(
            name,
            self.hidden,
            self.major_type,
            self.minor_type,
            self.attribute_bytes(),
            self.body_bytes(),
        )
    }
}
