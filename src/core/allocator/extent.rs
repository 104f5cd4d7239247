//! Free extents and the ordered free list
//!
//! Extents are keyed by start address in a `BTreeMap`, which keeps the list
//! sorted for first-fit search and makes neighbour lookup for coalescing cheap.

use crate::core::error::{GeomDbError, Result};
use std::collections::BTreeMap;

/// A reusable, currently unoccupied byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FreeExtent {
    /// Starting byte offset in the file
    pub address: u64,
    /// Length in bytes
    pub length: u64,
}

impl FreeExtent {
    pub fn new(address: u64, length: u64) -> Self {
        FreeExtent { address, length }
    }

    /// One past the last byte
    pub fn end(&self) -> u64 {
        self.address + self.length
    }

    /// Check if this extent contains a byte offset
    pub fn contains(&self, address: u64) -> bool {
        address >= self.address && address < self.end()
    }

    /// Check if the two ranges share at least one byte
    pub fn overlaps(&self, other: &FreeExtent) -> bool {
        self.address < other.end() && other.address < self.end()
    }

    /// Check if this extent is adjacent to another (can be coalesced)
    pub fn is_adjacent(&self, other: &FreeExtent) -> bool {
        self.end() == other.address || other.end() == self.address
    }

    /// Coalesce two adjacent extents
    pub fn coalesce(&self, other: &FreeExtent) -> Option<FreeExtent> {
        if !self.is_adjacent(other) {
            return None;
        }

        let start = self.address.min(other.address);
        let end = self.end().max(other.end());
        Some(FreeExtent::new(start, end - start))
    }
}

/// Sorted, non-overlapping set of free extents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeList {
    extents: BTreeMap<u64, FreeExtent>,
    free_bytes: u64,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a free extent, merging it with adjacent neighbours
    ///
    /// Returns the extent as it now sits in the list. Overlap with an
    /// existing free extent means a double free and is rejected.
    pub fn insert(&mut self, extent: FreeExtent) -> Result<FreeExtent> {
        if extent.length == 0 {
            return Err(GeomDbError::AllocationFailed(format!(
                "zero-length free at {}",
                extent.address
            )));
        }

        if let Some(existing) = self.overlapping(&extent) {
            return Err(GeomDbError::AllocationFailed(format!(
                "free of {}..{} overlaps free extent {}..{}",
                extent.address,
                extent.end(),
                existing.address,
                existing.end()
            )));
        }

        self.free_bytes += extent.length;
        let mut merged = extent;

        if let Some((&prev_start, prev)) = self.extents.range(..extent.address).next_back() {
            if let Some(joined) = prev.coalesce(&merged) {
                merged = joined;
                self.extents.remove(&prev_start);
            }
        }

        if let Some(next) = self.extents.get(&merged.end()).copied() {
            if let Some(joined) = merged.coalesce(&next) {
                merged = joined;
                self.extents.remove(&next.address);
            }
        }

        self.extents.insert(merged.address, merged);
        Ok(merged)
    }

    /// Remove and return the lowest-addressed extent of at least `length` bytes
    pub fn take_first_fit(&mut self, length: u64) -> Option<FreeExtent> {
        let found = self
            .extents
            .values()
            .find(|extent| extent.length >= length)
            .copied()?;

        self.extents.remove(&found.address);
        self.free_bytes -= found.length;
        Some(found)
    }

    fn overlapping(&self, extent: &FreeExtent) -> Option<FreeExtent> {
        // Only the nearest extent starting before `extent.end()` can overlap,
        // since the list itself never overlaps.
        self.extents
            .range(..extent.end())
            .next_back()
            .map(|(_, e)| *e)
            .filter(|e| e.overlaps(extent))
    }

    /// Extent starting exactly at `address`
    pub fn get(&self, address: u64) -> Option<FreeExtent> {
        self.extents.get(&address).copied()
    }

    /// Extent containing `address`, if that byte is free
    pub fn containing(&self, address: u64) -> Option<FreeExtent> {
        self.extents
            .range(..=address)
            .next_back()
            .map(|(_, e)| *e)
            .filter(|e| e.contains(address))
    }

    /// Extents in address order
    pub fn iter(&self) -> impl Iterator<Item = &FreeExtent> {
        self.extents.values()
    }

    /// Number of extents (fragmentation indicator)
    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    pub fn free_bytes(&self) -> u64 {
        self.free_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_contains() {
        let extent = FreeExtent::new(16, 24);
        assert!(!extent.contains(15));
        assert!(extent.contains(16));
        assert!(extent.contains(39));
        assert!(!extent.contains(40));
    }

    #[test]
    fn test_extent_adjacency() {
        let e1 = FreeExtent::new(0, 8);
        let e2 = FreeExtent::new(8, 8);
        let e3 = FreeExtent::new(24, 8);

        assert!(e1.is_adjacent(&e2));
        assert!(e2.is_adjacent(&e1));
        assert!(!e2.is_adjacent(&e3));
        assert_eq!(e1.coalesce(&e2), Some(FreeExtent::new(0, 16)));
        assert_eq!(e1.coalesce(&e3), None);
    }

    #[test]
    fn test_insert_coalesces_both_sides() {
        let mut list = FreeList::new();
        list.insert(FreeExtent::new(0, 8)).unwrap();
        list.insert(FreeExtent::new(16, 8)).unwrap();
        assert_eq!(list.len(), 2);

        let merged = list.insert(FreeExtent::new(8, 8)).unwrap();
        assert_eq!(merged, FreeExtent::new(0, 24));
        assert_eq!(list.len(), 1);
        assert_eq!(list.free_bytes(), 24);
    }

    #[test]
    fn test_double_free_rejected() {
        let mut list = FreeList::new();
        list.insert(FreeExtent::new(32, 16)).unwrap();

        let result = list.insert(FreeExtent::new(40, 8));
        assert!(matches!(result, Err(GeomDbError::AllocationFailed(_))));
        let result = list.insert(FreeExtent::new(24, 16));
        assert!(matches!(result, Err(GeomDbError::AllocationFailed(_))));
        assert_eq!(list.free_bytes(), 16);
    }

    #[test]
    fn test_first_fit_prefers_lowest_address() {
        let mut list = FreeList::new();
        list.insert(FreeExtent::new(100, 64)).unwrap();
        list.insert(FreeExtent::new(300, 16)).unwrap();
        list.insert(FreeExtent::new(500, 32)).unwrap();

        // 100 is the lowest address that fits, even though 500 fits tighter
        let taken = list.take_first_fit(32).unwrap();
        assert_eq!(taken.address, 100);

        let taken = list.take_first_fit(32).unwrap();
        assert_eq!(taken.address, 500);

        assert!(list.take_first_fit(32).is_none());
        assert_eq!(list.free_bytes(), 16);
    }

    #[test]
    fn test_containing() {
        let mut list = FreeList::new();
        list.insert(FreeExtent::new(64, 16)).unwrap();
        assert_eq!(list.containing(70), Some(FreeExtent::new(64, 16)));
        assert_eq!(list.containing(80), None);
        assert_eq!(list.containing(10), None);
    }
}
