//! Free-space allocation within the database file
//!
//! Records are variable length, so space is tracked as byte extents rather
//! than fixed blocks. Freed ranges are coalesced with their neighbours on
//! insertion and handed back out first-fit by lowest address; when nothing
//! fits the logical end of file grows.

pub mod extent;

pub use extent::{FreeExtent, FreeList};

use crate::core::error::{GeomDbError, Result};
use crate::core::header::ALIGNMENT;

/// Outcome of a [`FreeSpaceAllocator::reserve`] call
///
/// The allocator only updates its in-memory view. The caller owns the file
/// effects: grow the file to `grown_to`, write the record at `address`, then
/// write a free marker for each extent in `markers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Where the record goes
    pub address: u64,
    /// Bytes reserved at `address`
    pub length: u64,
    /// New logical end of file, if the file must be extended
    pub grown_to: Option<u64>,
    /// Free extents whose on-disk free marker must be (re)written
    pub markers: Vec<FreeExtent>,
}

/// Free-space allocator for one open database
#[derive(Debug, Clone)]
pub struct FreeSpaceAllocator {
    free: FreeList,
    /// First byte usable for records (right after the file header)
    data_start: u64,
    /// Logical end of file
    end_of_file: u64,
    read_only: bool,
}

impl FreeSpaceAllocator {
    /// Allocator for a file whose records occupy `data_start..end_of_file`
    pub fn new(data_start: u64, end_of_file: u64) -> Self {
        FreeSpaceAllocator {
            free: FreeList::new(),
            data_start,
            end_of_file: end_of_file.max(data_start),
            read_only: false,
        }
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Place a record of `new_length` bytes
    ///
    /// `old` is the record's current `(address, length)` when it is being
    /// resized, `None` for a fresh record.
    pub fn reserve(&mut self, old: Option<(u64, u64)>, new_length: u64) -> Result<Reservation> {
        self.check_writable()?;
        Self::check_length(new_length)?;
        if let Some((address, old_length)) = old {
            self.check_range(address, old_length)?;
        }

        let mut touched = Vec::new();

        if let Some((address, old_length)) = old {
            if new_length <= old_length {
                // Shrink (or same size) in place
                if new_length < old_length {
                    let suffix = FreeExtent::new(address + new_length, old_length - new_length);
                    touched.push(self.free.insert(suffix)?.address);
                }
                return Ok(Reservation {
                    address,
                    length: new_length,
                    grown_to: None,
                    markers: self.markers_for(touched),
                });
            }

            touched.push(self.free.insert(FreeExtent::new(address, old_length))?.address);
        }

        let (address, grown_to) = match self.free.take_first_fit(new_length) {
            Some(extent) => {
                if extent.length > new_length {
                    let remainder =
                        FreeExtent::new(extent.address + new_length, extent.length - new_length);
                    touched.push(self.free.insert(remainder)?.address);
                }
                (extent.address, None)
            }
            None => {
                let address = self.end_of_file;
                self.end_of_file += new_length;
                (address, Some(self.end_of_file))
            }
        };

        Ok(Reservation {
            address,
            length: new_length,
            grown_to,
            markers: self.markers_for(touched),
        })
    }

    /// Release a record's range; returns the (coalesced) extent to mark free
    pub fn free(&mut self, address: u64, length: u64) -> Result<FreeExtent> {
        self.check_writable()?;
        Self::check_length(length)?;
        self.check_range(address, length)?;
        self.free.insert(FreeExtent::new(address, length))
    }

    /// Record a free range discovered while scanning the file
    ///
    /// Bypasses the read-only check: rebuilding the in-memory view of a
    /// read-only file is not a mutation.
    pub fn mark_free_during_scan(&mut self, address: u64, length: u64) -> Result<()> {
        Self::check_length(length)?;
        self.check_range(address, length)?;
        self.free.insert(FreeExtent::new(address, length))?;
        Ok(())
    }

    /// Copy of the current state, for rollback after a failed write
    pub fn snapshot(&self) -> FreeSpaceAllocator {
        self.clone()
    }

    pub fn restore(&mut self, snapshot: FreeSpaceAllocator) {
        *self = snapshot;
    }

    /// Only extents still present in the list need a marker
    fn markers_for(&self, mut touched: Vec<u64>) -> Vec<FreeExtent> {
        touched.sort_unstable();
        touched.dedup();
        touched
            .into_iter()
            .filter_map(|address| self.free.get(address))
            .collect()
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(GeomDbError::ReadOnlyViolation);
        }
        Ok(())
    }

    fn check_length(length: u64) -> Result<()> {
        if length == 0 || length % ALIGNMENT != 0 {
            return Err(GeomDbError::AllocationFailed(format!(
                "length {} is not a positive multiple of {}",
                length, ALIGNMENT
            )));
        }
        Ok(())
    }

    fn check_range(&self, address: u64, length: u64) -> Result<()> {
        if address < self.data_start
            || address % ALIGNMENT != 0
            || address + length > self.end_of_file
        {
            return Err(GeomDbError::AllocationFailed(format!(
                "range {}..{} outside record area {}..{}",
                address,
                address + length,
                self.data_start,
                self.end_of_file
            )));
        }
        Ok(())
    }

    /// Free extents in address order
    pub fn extents(&self) -> impl Iterator<Item = &FreeExtent> {
        self.free.iter()
    }

    pub fn extent_count(&self) -> usize {
        self.free.len()
    }

    pub fn free_bytes(&self) -> u64 {
        self.free.free_bytes()
    }

    pub fn end_of_file(&self) -> u64 {
        self.end_of_file
    }

    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Check whether the byte at `address` lies in a free extent
    pub fn is_free(&self, address: u64) -> bool {
        self.free.containing(address).is_some()
    }

    /// Fragmentation score (0.0 = all free space contiguous)
    pub fn fragmentation_score(&self) -> f64 {
        let free_units = self.free.free_bytes() / ALIGNMENT;
        if free_units == 0 || self.free.is_empty() {
            return 0.0;
        }
        (self.free.len() as f64 - 1.0) / (free_units as f64).max(1.0)
    }
}
