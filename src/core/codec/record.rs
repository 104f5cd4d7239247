//! Typed, owned form of a data record

use crate::core::codec::attributes::AttributeSet;
use crate::core::error::{GeomDbError, Result};

/// Reserved name of the database-wide attribute object
pub const GLOBAL_OBJECT_NAME: &str = "_GLOBAL";

/// Record major type (what family of object the body holds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MajorType {
    /// Geometry: primitives and combinations, selected by the minor type
    Geometry,
    /// No body, attributes only
    AttributeOnly,
    /// Opaque binary payload
    Binary,
    /// Anything this version does not interpret
    Other(u8),
}

impl MajorType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => MajorType::Geometry,
            2 => MajorType::AttributeOnly,
            9 => MajorType::Binary,
            other => MajorType::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            MajorType::Geometry => 1,
            MajorType::AttributeOnly => 2,
            MajorType::Binary => 9,
            MajorType::Other(other) => other,
        }
    }
}

/// Minor type tags for [`MajorType::Geometry`] records
pub mod minor {
    pub const TORUS: u8 = 1;
    pub const TGC: u8 = 2;
    pub const ELLIPSOID: u8 = 3;
    pub const ARB8: u8 = 4;
    pub const HALFSPACE: u8 = 6;
    pub const SPHERE: u8 = 10;
    pub const PIPE: u8 = 15;
    pub const SKETCH: u8 = 26;
    pub const EXTRUDE: u8 = 27;
    pub const BOT: u8 = 30;
    pub const COMBINATION: u8 = 31;
}

/// Check that a string can be used as an object name
///
/// Names are non-empty and contain neither NUL nor `/` (the path separator).
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('\0') || name.contains('/') || name.len() > u32::MAX as usize
    {
        return Err(GeomDbError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// A fully decoded data record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub major_type: MajorType,
    pub minor_type: u8,
    pub hidden: bool,
    pub attributes: AttributeSet,
    pub body: Vec<u8>,
}

impl Record {
    /// Create a visible record with no attributes
    pub fn new(
        name: impl Into<String>,
        major_type: MajorType,
        minor_type: u8,
        body: Vec<u8>,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Record {
            name,
            major_type,
            minor_type,
            hidden: false,
            attributes: AttributeSet::new(),
            body,
        })
    }

    /// Geometry primitive record with an opaque body
    pub fn primitive(name: impl Into<String>, minor_type: u8, body: Vec<u8>) -> Result<Self> {
        Self::new(name, MajorType::Geometry, minor_type, body)
    }

    pub fn with_attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn is_combination(&self) -> bool {
        is_combination_type(self.major_type, self.minor_type)
    }
}

pub fn is_combination_type(major_type: MajorType, minor_type: u8) -> bool {
    major_type == MajorType::Geometry && minor_type == minor::COMBINATION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_type_roundtrip() {
        for value in 0..=255u8 {
            assert_eq!(MajorType::from_u8(value).as_u8(), value);
        }
        assert_eq!(MajorType::from_u8(1), MajorType::Geometry);
        assert_eq!(MajorType::from_u8(7), MajorType::Other(7));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("tank.r").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\0b").is_err());
    }

    #[test]
    fn test_combination_type() {
        let record = Record::new("c", MajorType::Geometry, minor::COMBINATION, vec![]).unwrap();
        assert!(record.is_combination());
        let record = Record::primitive("s", minor::SPHERE, vec![1, 2, 3]).unwrap();
        assert!(!record.is_combination());
    }
}
