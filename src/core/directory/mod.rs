//! In-memory directory of the objects in a database
//!
//! A fixed-size chained hash table. Entries live in an arena of slots and
//! each bucket heads a singly linked chain through [`DirectoryEntry::next`].
//! The bucket count never changes, so iteration order only depends on the
//! sequence of inserts and removes.

use crate::core::codec::{is_combination_type, MajorType};
use crate::core::error::{GeomDbError, Result};
use xxhash_rust::xxh3::xxh3_64;

/// Number of hash buckets (power of two)
pub const DIRECTORY_BUCKETS: usize = 1024;

/// Where an object's bytes currently live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// Byte offset of the record in the backing file
    OnDisk(u64),
    /// Held in memory only, not yet written to the file
    InMemory,
}

impl Location {
    pub fn address(&self) -> Option<u64> {
        match self {
            Location::OnDisk(address) => Some(*address),
            Location::InMemory => None,
        }
    }
}

/// Entry flag bitset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EntryFlags(u8);

impl EntryFlags {
    pub const COMBINATION: EntryFlags = EntryFlags(0x01);
    pub const REGION: EntryFlags = EntryFlags(0x02);
    pub const HIDDEN: EntryFlags = EntryFlags(0x04);
    pub const IN_MEMORY: EntryFlags = EntryFlags(0x08);

    pub fn empty() -> Self {
        EntryFlags(0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: EntryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: EntryFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: EntryFlags) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: EntryFlags, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl std::ops::BitOr for EntryFlags {
    type Output = EntryFlags;

    fn bitor(self, rhs: EntryFlags) -> EntryFlags {
        EntryFlags(self.0 | rhs.0)
    }
}

/// Cached metadata for one object
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    name: String,
    pub location: Location,
    /// Bytes occupied by the record, padding included
    pub length: u64,
    pub major_type: MajorType,
    pub minor_type: u8,
    pub flags: EntryFlags,
    /// Next slot in the same bucket chain
    pub(crate) next: Option<usize>,
}

impl DirectoryEntry {
    /// New entry; COMBINATION and IN_MEMORY flags follow from the arguments
    pub fn new(
        name: impl Into<String>,
        location: Location,
        length: u64,
        major_type: MajorType,
        minor_type: u8,
    ) -> Self {
        let mut flags = EntryFlags::empty();
        flags.set(
            EntryFlags::COMBINATION,
            is_combination_type(major_type, minor_type),
        );
        flags.set(EntryFlags::IN_MEMORY, location == Location::InMemory);

        DirectoryEntry {
            name: name.into(),
            location,
            length,
            major_type,
            minor_type,
            flags,
            next: None,
        }
    }

    pub fn with_flags(mut self, flags: EntryFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    /// Name is the hash key and can only change through [`DirectoryIndex::rename_key`]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_combination(&self) -> bool {
        self.flags.contains(EntryFlags::COMBINATION)
    }

    pub fn is_region(&self) -> bool {
        self.flags.contains(EntryFlags::REGION)
    }

    pub fn is_hidden(&self) -> bool {
        self.flags.contains(EntryFlags::HIDDEN)
    }

    pub fn is_in_memory(&self) -> bool {
        self.location == Location::InMemory
    }

    /// Byte range in the file, for on-disk entries
    pub fn range(&self) -> Option<(u64, u64)> {
        self.location.address().map(|address| (address, self.length))
    }
}

/// Name -> entry hash table
#[derive(Debug, Clone)]
pub struct DirectoryIndex {
    buckets: Vec<Option<usize>>,
    slots: Vec<Option<DirectoryEntry>>,
    vacant: Vec<usize>,
    len: usize,
}

impl Default for DirectoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryIndex {
    pub fn new() -> Self {
        DirectoryIndex {
            buckets: vec![None; DIRECTORY_BUCKETS],
            slots: Vec::new(),
            vacant: Vec::new(),
            len: 0,
        }
    }

    fn bucket_of(name: &str) -> usize {
        (xxh3_64(name.as_bytes()) as usize) & (DIRECTORY_BUCKETS - 1)
    }

    fn slot(&self, index: usize) -> Option<&DirectoryEntry> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    fn find_slot(&self, name: &str) -> Option<usize> {
        let mut cursor = self.buckets[Self::bucket_of(name)];
        while let Some(index) = cursor {
            let entry = self.slot(index)?;
            if entry.name == name {
                return Some(index);
            }
            cursor = entry.next;
        }
        None
    }

    pub fn lookup(&self, name: &str) -> Option<&DirectoryEntry> {
        self.find_slot(name).and_then(|index| self.slot(index))
    }

    /// Mutable access to everything but the name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut DirectoryEntry> {
        let index = self.find_slot(name)?;
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_slot(name).is_some()
    }

    /// Add an entry at the head of its bucket chain
    pub fn insert(&mut self, mut entry: DirectoryEntry) -> Result<()> {
        if self.contains(&entry.name) {
            return Err(GeomDbError::DuplicateName(entry.name));
        }

        let bucket = Self::bucket_of(&entry.name);
        entry.next = self.buckets[bucket];

        let index = match self.vacant.pop() {
            Some(index) => {
                self.slots[index] = Some(entry);
                index
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };

        self.buckets[bucket] = Some(index);
        self.len += 1;
        Ok(())
    }

    /// Unlink an entry and return it
    pub fn remove(&mut self, name: &str) -> Result<DirectoryEntry> {
        let bucket = Self::bucket_of(name);
        let mut previous: Option<usize> = None;
        let mut cursor = self.buckets[bucket];

        while let Some(index) = cursor {
            let (matches, next) = match self.slot(index) {
                Some(entry) => (entry.name == name, entry.next),
                None => break,
            };

            if matches {
                match previous {
                    None => self.buckets[bucket] = next,
                    Some(prev) => {
                        if let Some(prev_entry) = self.slots[prev].as_mut() {
                            prev_entry.next = next;
                        }
                    }
                }

                let mut entry = self.slots[index]
                    .take()
                    .ok_or_else(|| GeomDbError::NotFound(name.to_string()))?;
                entry.next = None;
                self.vacant.push(index);
                self.len -= 1;
                return Ok(entry);
            }

            previous = Some(index);
            cursor = next;
        }

        Err(GeomDbError::NotFound(name.to_string()))
    }

    /// Move an entry to a new key
    pub fn rename_key(&mut self, old: &str, new: &str) -> Result<()> {
        if !self.contains(old) {
            return Err(GeomDbError::NotFound(old.to_string()));
        }
        if self.contains(new) {
            return Err(GeomDbError::DuplicateName(new.to_string()));
        }

        let mut entry = self.remove(old)?;
        entry.name = new.to_string();
        self.insert(entry)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entries in bucket order, then chain order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            index: self,
            bucket: 0,
            cursor: None,
        }
    }

    /// Entries whose name satisfies `predicate`, in iteration order
    ///
    /// Lazy; calling it again starts over from the first bucket.
    pub fn for_each<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a DirectoryEntry> + 'a
    where
        P: Fn(&str) -> bool + 'a,
    {
        self.iter().filter(move |entry| predicate(&entry.name))
    }

    /// Names in iteration order
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|entry| entry.name.clone()).collect()
    }

    /// Names in lexical order
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names = self.names();
        names.sort();
        names
    }
}

/// Iterator over a [`DirectoryIndex`]
pub struct Iter<'a> {
    index: &'a DirectoryIndex,
    bucket: usize,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a DirectoryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(slot) = self.cursor {
                let entry = self.index.slot(slot)?;
                self.cursor = entry.next;
                return Some(entry);
            }

            if self.bucket >= DIRECTORY_BUCKETS {
                return None;
            }
            self.cursor = self.index.buckets[self.bucket];
            self.bucket += 1;
        }
    }
}

impl<'a> IntoIterator for &'a DirectoryIndex {
    type Item = &'a DirectoryEntry;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}
