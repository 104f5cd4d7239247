//! Attribute block: an ordered set of string key/value pairs
//!
//! Encoded as `key NUL value NUL` repeated, keys in sorted order.

use crate::core::error::{GeomDbError, Result};
use std::collections::BTreeMap;

/// Attribute set attached to a record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    pairs: BTreeMap<String, String>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an attribute
    ///
    /// Keys must be non-empty; neither keys nor values may contain NUL.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        if key.is_empty() || key.contains('\0') || value.contains('\0') {
            return Err(GeomDbError::InvalidName(key));
        }
        self.pairs.insert(key, value);
        Ok(())
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.pairs.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Check a boolean-ish attribute ("1", "yes", "true", "R")
    pub fn is_set(&self, key: &str) -> bool {
        matches!(
            self.get(key),
            Some("1") | Some("yes") | Some("true") | Some("R")
        )
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        self.pairs.iter().map(|(k, v)| k.len() + v.len() + 2).sum()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        for (key, value) in &self.pairs {
            bytes.extend_from_slice(key.as_bytes());
            bytes.push(0);
            bytes.extend_from_slice(value.as_bytes());
            bytes.push(0);
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut set = AttributeSet::new();
        if bytes.is_empty() {
            return Ok(set);
        }

        if bytes.last() != Some(&0) {
            return Err(GeomDbError::MalformedEnvelope(
                "attribute block not NUL-terminated".to_string(),
            ));
        }

        let fields: Vec<&[u8]> = bytes[..bytes.len() - 1].split(|&b| b == 0).collect();
        if fields.len() % 2 != 0 {
            return Err(GeomDbError::MalformedEnvelope(
                "attribute block has a key without a value".to_string(),
            ));
        }

        for pair in fields.chunks(2) {
            let key = std::str::from_utf8(pair[0])
                .map_err(|_| GeomDbError::MalformedEnvelope("attribute key not UTF-8".into()))?;
            let value = std::str::from_utf8(pair[1])
                .map_err(|_| GeomDbError::MalformedEnvelope("attribute value not UTF-8".into()))?;
            if key.is_empty() {
                return Err(GeomDbError::MalformedEnvelope("empty attribute key".into()));
            }
            set.pairs.insert(key.to_string(), value.to_string());
        }

        Ok(set)
    }
}
