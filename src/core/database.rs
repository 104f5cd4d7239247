//! Main database API
//!
//! A [`Database`] owns the backing storage, the directory and the free-space
//! allocator for one file. Every operation goes through it; reads take
//! `&self`, mutation takes `&mut self` and is refused on a read-only handle.

use crate::core::allocator::{FreeExtent, FreeSpaceAllocator, Reservation};
use crate::core::codec::{
    encode, free_marker, peek_preamble, set_hidden, validate_name, ExternalBuffer,
    MajorType, RawRecordView, Record, RecordKind, GLOBAL_OBJECT_NAME, PREAMBLE_SIZE,
};
use crate::core::comb::{self, delete_leaf, Combination, DeleteOutcome, FullPath, PathResolver};
use crate::core::config::DatabaseConfig;
use crate::core::directory::{DirectoryEntry, DirectoryIndex, EntryFlags, Location};
use crate::core::error::{GeomDbError, Result};
use crate::core::header::{Header, HEADER_SIZE};
use crate::core::io::{DatabaseFile, MemoryStorage, Storage};
use crate::core::pattern;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

const TITLE_KEY: &str = "title";

/// Embedded object database
pub struct Database {
    header: Header,

    /// Backing bytes; interior mutability so lookups can take `&self`
    storage: Mutex<Box<dyn Storage>>,

    directory: DirectoryIndex,

    allocator: FreeSpaceAllocator,

    /// Encoded records for entries at [`Location::InMemory`]
    in_memory: HashMap<String, ExternalBuffer>,

    config: DatabaseConfig,
}

impl Database {
    /// Create a new database file, replacing any existing file at `path`
    pub fn create<P: AsRef<Path>>(path: P, config: DatabaseConfig) -> Result<Self> {
        let header = Header::new();
        let file = DatabaseFile::create(path.as_ref(), &header)?;
        info!("Created database at {}", path.as_ref().display());
        Self::initialize(Box::new(file), header, config)
    }

    /// Open an existing database file
    ///
    /// Validates the header, then rebuilds the directory and the free list
    /// with a linear scan over the records.
    pub fn open<P: AsRef<Path>>(path: P, config: DatabaseConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() && config.create_if_missing && !config.read_only {
            return Self::create(path, config);
        }

        let file = DatabaseFile::open(path, config.read_only)?;
        let db = Self::from_storage(Box::new(file), config)?;
        info!(
            "Opened database {}: {} objects, {} free extents",
            path.display(),
            db.directory.len(),
            db.allocator.extent_count()
        );
        Ok(db)
    }

    /// Scratch database that lives only in memory
    pub fn in_memory(config: DatabaseConfig) -> Result<Self> {
        let header = Header::new();
        let storage = MemoryStorage::new(&header);
        Self::initialize(Box::new(storage), header, config)
    }

    /// Open a database over any backing store that already holds a header
    pub fn from_storage(mut storage: Box<dyn Storage>, config: DatabaseConfig) -> Result<Self> {
        if storage.len()? < HEADER_SIZE {
            return Err(GeomDbError::InvalidHeader(format!(
                "file is shorter than the {} byte header",
                HEADER_SIZE
            )));
        }
        let header = storage.read_header()?;
        header.validate()?;

        let (directory, allocator) = Self::scan(storage.as_mut())?;

        let mut db = Database {
            header,
            storage: Mutex::new(storage),
            directory,
            allocator,
            in_memory: HashMap::new(),
            config,
        };
        db.allocator.set_read_only(db.config.read_only);
        Ok(db)
    }

    /// Finish setup of freshly created storage
    fn initialize(storage: Box<dyn Storage>, header: Header, config: DatabaseConfig) -> Result<Self> {
        let mut db = Database {
            header,
            storage: Mutex::new(storage),
            directory: DirectoryIndex::new(),
            allocator: FreeSpaceAllocator::new(HEADER_SIZE, HEADER_SIZE),
            in_memory: HashMap::new(),
            config: DatabaseConfig {
                read_only: false,
                ..config.clone()
            },
        };

        if let Some(title) = &config.title {
            db.set_title(title)?;
        }

        db.config.read_only = config.read_only;
        db.allocator.set_read_only(config.read_only);
        Ok(db)
    }

    /// Rebuild the directory and free list from the raw records
    fn scan(storage: &mut dyn Storage) -> Result<(DirectoryIndex, FreeSpaceAllocator)> {
        let file_len = storage.len()?;
        let mut directory = DirectoryIndex::new();
        let mut free_ranges = Vec::new();
        let mut offset = HEADER_SIZE;

        while offset < file_len {
            if file_len - offset < PREAMBLE_SIZE as u64 {
                warn!(
                    "Ignoring {} trailing bytes at offset {}",
                    file_len - offset,
                    offset
                );
                break;
            }

            let mut preamble_bytes = [0u8; PREAMBLE_SIZE];
            storage.read_at(offset, &mut preamble_bytes)?;
            let preamble = peek_preamble(&preamble_bytes).map_err(|e| match e {
                GeomDbError::MalformedEnvelope(reason) => {
                    GeomDbError::MalformedEnvelope(format!("record at offset {}: {}", offset, reason))
                }
                other => other,
            })?;

            if offset + preamble.length > file_len {
                return Err(GeomDbError::MalformedEnvelope(format!(
                    "record at offset {} runs {} bytes past end of file",
                    offset,
                    offset + preamble.length - file_len
                )));
            }

            match preamble.kind {
                RecordKind::Free => free_ranges.push((offset, preamble.length)),
                RecordKind::Data => {
                    let mut bytes = vec![0u8; preamble.length as usize];
                    storage.read_at(offset, &mut bytes)?;
                    match RawRecordView::parse(&bytes) {
                        Ok(view) => {
                            let entry = entry_for(&view, Location::OnDisk(offset));
                            if let Err(e) = directory.insert(entry) {
                                warn!("Skipping record at offset {}: {}", offset, e);
                            }
                        }
                        Err(e) => warn!("Skipping corrupt record at offset {}: {}", offset, e),
                    }
                }
            }

            offset += preamble.length;
        }

        let mut allocator = FreeSpaceAllocator::new(HEADER_SIZE, offset);
        for (address, length) in free_ranges {
            allocator.mark_free_during_scan(address, length)?;
        }

        debug!(
            "Scanned {} bytes: {} objects, {} free bytes",
            offset,
            directory.len(),
            allocator.free_bytes()
        );
        Ok((directory, allocator))
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn directory(&self) -> &DirectoryIndex {
        &self.directory
    }

    pub fn allocator(&self) -> &FreeSpaceAllocator {
        &self.allocator
    }

    pub fn lookup(&self, name: &str) -> Option<&DirectoryEntry> {
        self.directory.lookup(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.directory.contains(name)
    }

    /// Object names in lexical order, leaving out hidden objects
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .directory
            .iter()
            .filter(|entry| !entry.is_hidden())
            .map(|entry| entry.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Object names in lexical order, hidden objects included
    pub fn names_all(&self) -> Vec<String> {
        self.directory.sorted_names()
    }

    fn check_writable(&self) -> Result<()> {
        if self.config.read_only {
            return Err(GeomDbError::ReadOnlyViolation);
        }
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<&DirectoryEntry> {
        self.directory
            .lookup(name)
            .ok_or_else(|| GeomDbError::NotFound(name.to_string()))
    }

    // ---- storage effects ------------------------------------------------

    /// Reserve space for `buffer` and write it
    ///
    /// The single write of the record (together with the free marker that
    /// directly follows it, if any) is the commit point. A failure before
    /// it restores the allocator and trims the file back to its previous
    /// length, so the old record and its entry stay as they were.
    fn place(&mut self, old: Option<(u64, u64)>, buffer: &ExternalBuffer) -> Result<Reservation> {
        let snapshot = self.allocator.snapshot();
        let reservation = self.allocator.reserve(old, buffer.len())?;

        if let Err(e) = self.commit_record(&reservation, buffer) {
            warn!(
                "Write at offset {} failed, rolling back: {}",
                reservation.address, e
            );
            if reservation.grown_to.is_some() {
                let previous_end = snapshot.end_of_file();
                if let Err(trim) = self.storage.lock().set_len(previous_end) {
                    warn!("Could not trim file back to {} bytes: {}", previous_end, trim);
                }
            }
            self.allocator.restore(snapshot);
            return Err(e);
        }

        self.write_trailing_markers(&reservation);
        Ok(reservation)
    }

    fn commit_record(&self, reservation: &Reservation, buffer: &ExternalBuffer) -> Result<()> {
        let mut storage = self.storage.lock();

        if let Some(end) = reservation.grown_to {
            info!("Growing database file to {} bytes", end);
            storage.set_len(end)?;
        }

        match adjacent_marker(reservation) {
            Some(extent) => {
                let mut bytes = Vec::with_capacity(buffer.as_bytes().len() + PREAMBLE_SIZE);
                bytes.extend_from_slice(buffer.as_bytes());
                bytes.extend_from_slice(&free_marker(extent.length));
                storage.write_at(reservation.address, &bytes)
            }
            None => storage.write_at(reservation.address, buffer.as_bytes()),
        }
    }

    /// Markers away from the record, written once the record is committed
    ///
    /// A failure here only leaks the range on disk until it is rewritten.
    fn write_trailing_markers(&self, reservation: &Reservation) {
        let adjacent = adjacent_marker(reservation).map(|extent| extent.address);
        let mut storage = self.storage.lock();

        for extent in &reservation.markers {
            if Some(extent.address) == adjacent {
                continue;
            }
            if let Err(e) = storage.write_at(extent.address, &free_marker(extent.length)) {
                warn!(
                    "Free marker at offset {} ({} bytes) not written: {}",
                    extent.address, extent.length, e
                );
            }
        }

        if self.config.sync_on_write {
            if let Err(e) = storage.sync() {
                warn!("Sync after write at offset {} failed: {}", reservation.address, e);
            }
        }
    }

    /// Return a record's range to the free list and mark it on disk
    fn release(&mut self, address: u64, length: u64) -> Result<()> {
        let snapshot = self.allocator.snapshot();
        let extent = self.allocator.free(address, length)?;

        let mut storage = self.storage.lock();
        if let Err(e) = storage.write_at(extent.address, &free_marker(extent.length)) {
            drop(storage);
            self.allocator.restore(snapshot);
            return Err(e);
        }

        if self.config.sync_on_write {
            if let Err(e) = storage.sync() {
                warn!("Sync after freeing offset {} failed: {}", extent.address, e);
            }
        }
        Ok(())
    }

    fn read_range(&self, address: u64, length: u64) -> Result<ExternalBuffer> {
        let mut bytes = vec![0u8; length as usize];
        self.storage.lock().read_at(address, &mut bytes)?;
        Ok(ExternalBuffer::from_vec(bytes))
    }

    /// Write `buffer` over the current copy of an existing object
    fn rewrite(&mut self, name: &str, buffer: ExternalBuffer) -> Result<()> {
        let fresh = entry_for(&buffer.view()?, Location::InMemory);
        let location = self.entry(name)?.location;
        let previous = self.entry(name)?.range();

        let location = match location {
            Location::OnDisk(_) => {
                let reservation = self.place(previous, &buffer)?;
                Location::OnDisk(reservation.address)
            }
            Location::InMemory => {
                self.in_memory.insert(name.to_string(), buffer);
                Location::InMemory
            }
        };

        let entry = self
            .directory
            .get_mut(name)
            .ok_or_else(|| GeomDbError::NotFound(name.to_string()))?;
        entry.location = location;
        entry.length = fresh.length;
        entry.major_type = fresh.major_type;
        entry.minor_type = fresh.minor_type;
        entry.flags = fresh.flags;
        entry
            .flags
            .set(EntryFlags::IN_MEMORY, location == Location::InMemory);
        Ok(())
    }

    // ---- records ----------------------------------------------------------

    /// Create or replace an object
    pub fn put(&mut self, record: &Record) -> Result<()> {
        self.check_writable()?;
        let buffer = encode(record)?;
        self.put_external(&record.name, buffer)
    }

    /// Create or replace an object from its external form
    pub fn put_external(&mut self, name: &str, buffer: ExternalBuffer) -> Result<()> {
        self.check_writable()?;
        let view = buffer.view()?;
        if view.name != name {
            return Err(GeomDbError::MalformedEnvelope(format!(
                "buffer holds {} but was stored as {}",
                view.name, name
            )));
        }

        if self.directory.contains(name) {
            debug!("Replacing {} ({} bytes)", name, buffer.len());
            return self.rewrite(name, buffer);
        }

        let mut entry = entry_for(&view, Location::InMemory);
        let reservation = self.place(None, &buffer)?;
        entry.location = Location::OnDisk(reservation.address);
        entry.flags.remove(EntryFlags::IN_MEMORY);
        debug!(
            "Stored {} at offset {} ({} bytes)",
            name, reservation.address, reservation.length
        );
        self.directory.insert(entry)
    }

    /// Create or replace an object without writing it to the file
    pub fn put_in_memory(&mut self, record: &Record) -> Result<()> {
        self.check_writable()?;
        let buffer = encode(record)?;
        let entry = entry_for(&buffer.view()?, Location::InMemory);

        if let Some((address, length)) = self.directory.lookup(&record.name).and_then(|e| e.range())
        {
            self.release(address, length)?;
            self.directory.remove(&record.name)?;
        } else if self.directory.contains(&record.name) {
            self.directory.remove(&record.name)?;
        }

        debug!("Holding {} in memory", record.name);
        self.in_memory.insert(record.name.clone(), buffer);
        self.directory.insert(entry)
    }

    /// Write every in-memory object to the file; returns how many moved
    pub fn persist_in_memory(&mut self) -> Result<usize> {
        self.check_writable()?;
        let mut names: Vec<String> = self.in_memory.keys().cloned().collect();
        names.sort();

        for name in &names {
            let buffer = match self.in_memory.get(name) {
                Some(buffer) => buffer.clone(),
                None => continue,
            };
            let reservation = self.place(None, &buffer)?;

            self.in_memory.remove(name);
            let entry = self
                .directory
                .get_mut(name)
                .ok_or_else(|| GeomDbError::NotFound(name.clone()))?;
            entry.location = Location::OnDisk(reservation.address);
            entry.flags.remove(EntryFlags::IN_MEMORY);
        }

        if !names.is_empty() {
            info!("Persisted {} in-memory objects", names.len());
        }
        Ok(names.len())
    }

    /// Serialized form of an object
    pub fn get_external(&self, name: &str) -> Result<ExternalBuffer> {
        let entry = self.entry(name)?;
        match entry.location {
            Location::OnDisk(address) => self.read_range(address, entry.length),
            Location::InMemory => self
                .in_memory
                .get(name)
                .cloned()
                .ok_or_else(|| GeomDbError::NotFound(name.to_string())),
        }
    }

    /// Decoded object
    pub fn get(&self, name: &str) -> Result<Record> {
        self.get_external(name)?.view()?.to_record()
    }

    /// Inspect an object's envelope without decoding its body
    pub fn raw<T>(&self, name: &str, inspect: impl FnOnce(&RawRecordView<'_>) -> T) -> Result<T> {
        let buffer = self.get_external(name)?;
        let view = buffer.view()?;
        Ok(inspect(&view))
    }

    /// Remove an object and reclaim its space
    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.check_writable()?;
        let entry = self.entry(name)?;

        match entry.range() {
            Some((address, length)) => self.release(address, length)?,
            None => {
                self.in_memory.remove(name);
            }
        }

        self.directory.remove(name)?;
        debug!("Deleted {}", name);
        Ok(())
    }

    /// Give an object a new name; references to it are left alone
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        self.check_writable()?;
        validate_name(new)?;
        if !self.directory.contains(old) {
            return Err(GeomDbError::NotFound(old.to_string()));
        }
        if self.directory.contains(new) {
            return Err(GeomDbError::DuplicateName(new.to_string()));
        }

        let buffer = self.get_external(old)?.view()?.renamed(new)?;

        // The directory key moves first so the rewrite lands on the new name
        self.directory.rename_key(old, new)?;
        if let Some(held) = self.in_memory.remove(old) {
            self.in_memory.insert(new.to_string(), held);
        }

        if let Err(e) = self.rewrite(new, buffer) {
            if let Some(held) = self.in_memory.remove(new) {
                self.in_memory.insert(old.to_string(), held);
            }
            self.directory.rename_key(new, old)?;
            return Err(e);
        }

        debug!("Renamed {} -> {}", old, new);
        Ok(())
    }

    /// Point every combination leaf named `old` at `new`
    ///
    /// Returns the number of leaves changed.
    pub fn rename_references(&mut self, old: &str, new: &str) -> Result<usize> {
        self.check_writable()?;
        validate_name(new)?;

        let mut changed = 0;
        for name in self.combination_names() {
            let mut combination = self.get_combination(&name)?;
            let count = combination
                .tree
                .as_mut()
                .map_or(0, |tree| tree.rename_leaf(old, new));
            if count > 0 {
                self.put_combination(&name, &combination)?;
                changed += count;
            }
        }

        debug!("Renamed {} references {} -> {}", changed, old, new);
        Ok(changed)
    }

    fn combination_names(&self) -> Vec<String> {
        self.directory
            .iter()
            .filter(|entry| entry.is_combination())
            .map(|entry| entry.name().to_string())
            .collect()
    }

    fn set_hidden_flag(&mut self, name: &str, hidden: bool) -> Result<()> {
        self.check_writable()?;
        let current = self.get_external(name)?;
        let updated = set_hidden(&current, hidden)?;
        if updated == current {
            return Ok(());
        }
        self.rewrite(name, updated)
    }

    /// Hide an object from listings
    pub fn hide(&mut self, name: &str) -> Result<()> {
        self.set_hidden_flag(name, true)
    }

    pub fn unhide(&mut self, name: &str) -> Result<()> {
        self.set_hidden_flag(name, false)
    }

    // ---- combinations -----------------------------------------------------

    pub fn get_combination(&self, name: &str) -> Result<Combination> {
        Combination::from_record(&self.get(name)?)
    }

    /// Create or replace a combination, keeping an existing hidden flag
    pub fn put_combination(&mut self, name: &str, combination: &Combination) -> Result<()> {
        self.check_writable()?;
        let hidden = self.directory.lookup(name).map_or(false, |e| e.is_hidden());
        let record = combination.to_record(name)?.with_hidden(hidden);
        self.put(&record)
    }

    /// Drop every reference to `member` from one combination
    pub fn remove_member(&mut self, combination: &str, member: &str) -> Result<DeleteOutcome> {
        self.check_writable()?;
        let mut comb = self.get_combination(combination)?;
        let outcome = delete_leaf(&mut comb.tree, member);
        if outcome != DeleteOutcome::NotFound {
            self.put_combination(combination, &comb)?;
            debug!("Removed {} from {} ({:?})", member, combination, outcome);
        }
        Ok(outcome)
    }

    /// Delete an object along with every reference to it
    ///
    /// Returns the combinations that lost a member.
    pub fn delete_everywhere(&mut self, name: &str) -> Result<Vec<String>> {
        self.check_writable()?;
        self.entry(name)?;

        let mut touched = Vec::new();
        for comb_name in self.combination_names() {
            if comb_name == name {
                continue;
            }
            if self.get_combination(&comb_name)?.contains_member(name) {
                self.remove_member(&comb_name, name)?;
                touched.push(comb_name);
            }
        }

        self.delete(name)?;
        Ok(touched)
    }

    // ---- bulk selection ---------------------------------------------------

    /// Names matching a glob, in directory order
    pub fn match_names(&self, pattern: &str) -> Vec<String> {
        pattern::match_all(&self.directory, pattern)
    }

    /// Matches, or the pattern itself when nothing matches
    pub fn expand(&self, pattern: &str) -> Vec<String> {
        pattern::expand(&self.directory, pattern)
    }

    /// Delete every object matching `pattern`
    ///
    /// Not transactional: objects are deleted one by one and a failure stops
    /// the run with [`GeomDbError::BulkAborted`] listing what was already
    /// deleted. A failure on the very first object is returned as is.
    pub fn delete_matching(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.check_writable()?;
        let names = self.expand(pattern);
        self.delete_each(pattern, names)
    }

    /// Delete `root` and everything reachable through its combinations
    ///
    /// Members go before the combinations holding them; an object shared by
    /// several combinations is deleted once. References from combinations
    /// outside the tree are left dangling. Failures are reported the same
    /// way as [`Database::delete_matching`].
    pub fn delete_tree(&mut self, root: &str) -> Result<Vec<String>> {
        self.check_writable()?;
        let names = comb::tree_members(self, root)?;
        self.delete_each(root, names)
    }

    fn delete_each(&mut self, selection: &str, names: Vec<String>) -> Result<Vec<String>> {
        let mut completed = Vec::new();

        for name in names {
            if let Err(e) = self.delete(&name) {
                if completed.is_empty() {
                    return Err(e);
                }
                warn!(
                    "Bulk delete of {} stopped at {} after {} objects",
                    selection,
                    name,
                    completed.len()
                );
                return Err(GeomDbError::BulkAborted {
                    completed,
                    failed: name,
                    source: Box::new(e),
                });
            }
            completed.push(name);
        }

        Ok(completed)
    }

    /// Objects no combination refers to, in directory order
    ///
    /// The global object is never listed.
    pub fn tops(&self) -> Result<Vec<String>> {
        let mut referenced = HashSet::new();
        for name in self.combination_names() {
            let combination = self.get_combination(&name)?;
            referenced.extend(combination.members().into_iter().map(str::to_string));
        }

        let tops = self
            .directory
            .for_each(|name| name != GLOBAL_OBJECT_NAME && !referenced.contains(name))
            .map(|entry| entry.name().to_string())
            .collect();
        Ok(tops)
    }

    // ---- paths --------------------------------------------------------------

    pub fn validate_path(&self, path: &FullPath) -> bool {
        comb::validate_path(self, path)
    }

    pub fn check_path(&self, path: &FullPath) -> Result<()> {
        comb::check_path(self, path)
    }

    pub fn full_paths(&self, root: &str) -> Result<Vec<FullPath>> {
        comb::full_paths(self, root)
    }

    // ---- global object ------------------------------------------------------

    /// Database title, stored on the global object
    pub fn title(&self) -> Result<Option<String>> {
        if !self.directory.contains(GLOBAL_OBJECT_NAME) {
            return Ok(None);
        }
        let record = self.get(GLOBAL_OBJECT_NAME)?;
        Ok(record.attributes.get(TITLE_KEY).map(str::to_string))
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        self.check_writable()?;
        let mut record = if self.directory.contains(GLOBAL_OBJECT_NAME) {
            self.get(GLOBAL_OBJECT_NAME)?
        } else {
            Record::new(GLOBAL_OBJECT_NAME, MajorType::AttributeOnly, 0, Vec::new())?
        };
        record.attributes.insert(TITLE_KEY, title)?;
        self.put(&record)
    }

    // ---- maintenance --------------------------------------------------------

    pub fn stats(&self) -> DatabaseStats {
        let mut stats = DatabaseStats {
            objects: self.directory.len(),
            combinations: 0,
            regions: 0,
            hidden: 0,
            in_memory: self.in_memory.len(),
            file_length: self.allocator.end_of_file(),
            free_bytes: self.allocator.free_bytes(),
            free_extents: self.allocator.extent_count(),
            fragmentation: self.allocator.fragmentation_score(),
        };
        for entry in self.directory.iter() {
            stats.combinations += entry.is_combination() as usize;
            stats.regions += entry.is_region() as usize;
            stats.hidden += entry.is_hidden() as usize;
        }
        stats
    }

    /// Flush buffered writes to durable storage
    pub fn flush(&mut self) -> Result<()> {
        if self.config.read_only {
            return Ok(());
        }
        if !self.in_memory.is_empty() {
            debug!("{} objects remain in memory only", self.in_memory.len());
        }
        self.storage.lock().sync()
    }

    /// Flush and drop the handle
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }
}

impl PathResolver for Database {
    fn exists(&self, name: &str) -> bool {
        self.directory.contains(name)
    }

    fn combination(&self, name: &str) -> Result<Option<Combination>> {
        if !self.entry(name)?.is_combination() {
            return Ok(None);
        }
        self.get_combination(name).map(Some)
    }
}

/// Free marker that starts right where the reserved record ends
fn adjacent_marker(reservation: &Reservation) -> Option<&FreeExtent> {
    let end = reservation.address + reservation.length;
    reservation.markers.iter().find(|extent| extent.address == end)
}

/// Directory entry describing the record in `view`
fn entry_for(view: &RawRecordView<'_>, location: Location) -> DirectoryEntry {
    let mut entry = DirectoryEntry::new(
        view.name,
        location,
        view.length(),
        view.major_type,
        view.minor_type,
    );
    entry.flags.set(EntryFlags::HIDDEN, view.hidden);
    let region = entry.is_combination()
        && view
            .attribute_set()
            .map_or(false, |attributes| attributes.is_set("region"));
    entry.flags.set(EntryFlags::REGION, region);
    entry
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseStats {
    pub objects: usize,
    pub combinations: usize,
    pub regions: usize,
    pub hidden: usize,
    pub in_memory: usize,
    /// Logical end of the record area
    pub file_length: u64,
    pub free_bytes: u64,
    pub free_extents: usize,
    pub fragmentation: f64,
}

impl DatabaseStats {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::minor;
    use crate::core::comb::CombinationNode;

    fn db() -> Database {
        Database::in_memory(DatabaseConfig::default()).unwrap()
    }

    fn sphere(name: &str, body_len: usize) -> Record {
        Record::primitive(name, minor::SPHERE, vec![0xAB; body_len]).unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let mut db = db();
        let record = sphere("ball.s", 40);
        db.put(&record).unwrap();

        assert_eq!(db.get("ball.s").unwrap(), record);
        let entry = db.lookup("ball.s").unwrap();
        assert_eq!(entry.location, Location::OnDisk(HEADER_SIZE));
        assert!(matches!(db.get("nope"), Err(GeomDbError::NotFound(_))));
    }

    #[test]
    fn test_replace_shrinks_in_place() {
        let mut db = db();
        db.put(&sphere("a.s", 200)).unwrap();
        let before = db.lookup("a.s").unwrap().range().unwrap();

        db.put(&sphere("a.s", 8)).unwrap();
        let after = db.lookup("a.s").unwrap().range().unwrap();
        assert_eq!(after.0, before.0);
        assert!(after.1 < before.1);
        assert_eq!(db.allocator().free_bytes(), before.1 - after.1);
    }

    #[test]
    fn test_delete_reuses_space() {
        let mut db = db();
        db.put(&sphere("a.s", 64)).unwrap();
        db.put(&sphere("b.s", 8)).unwrap();
        let a_address = db.lookup("a.s").unwrap().location;

        db.delete("a.s").unwrap();
        assert!(db.lookup("a.s").is_none());
        assert!(matches!(db.delete("a.s"), Err(GeomDbError::NotFound(_))));

        db.put(&sphere("c.s", 64)).unwrap();
        assert_eq!(db.lookup("c.s").unwrap().location, a_address);
    }

    #[test]
    fn test_put_external_name_mismatch() {
        let mut db = db();
        let buffer = encode(&sphere("a.s", 8)).unwrap();
        assert!(matches!(
            db.put_external("b.s", buffer),
            Err(GeomDbError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_rename() {
        let mut db = db();
        db.put(&sphere("old.s", 16)).unwrap();
        db.put(&sphere("taken.s", 16)).unwrap();

        assert!(matches!(
            db.rename("old.s", "taken.s"),
            Err(GeomDbError::DuplicateName(_))
        ));
        db.rename("old.s", "new.s").unwrap();
        assert!(!db.contains("old.s"));
        assert_eq!(db.get("new.s").unwrap().name, "new.s");
        assert_eq!(db.get("new.s").unwrap().body, vec![0xAB; 16]);
    }

    #[test]
    fn test_hide_unhide_flags() {
        let mut db = db();
        db.put(&sphere("a.s", 16)).unwrap();
        let original = db.get_external("a.s").unwrap();

        db.hide("a.s").unwrap();
        assert!(db.lookup("a.s").unwrap().is_hidden());
        assert!(db.raw("a.s", |view| view.hidden).unwrap());

        db.unhide("a.s").unwrap();
        assert!(!db.lookup("a.s").unwrap().is_hidden());
        assert_eq!(db.get_external("a.s").unwrap(), original);
    }

    #[test]
    fn test_in_memory_objects() {
        let mut db = db();
        db.put_in_memory(&sphere("scratch.s", 24)).unwrap();
        let entry = db.lookup("scratch.s").unwrap();
        assert!(entry.is_in_memory());
        assert_eq!(db.allocator().end_of_file(), HEADER_SIZE);
        assert_eq!(db.get("scratch.s").unwrap().body.len(), 24);

        assert_eq!(db.persist_in_memory().unwrap(), 1);
        let entry = db.lookup("scratch.s").unwrap();
        assert_eq!(entry.location, Location::OnDisk(HEADER_SIZE));
        assert!(!entry.flags.contains(EntryFlags::IN_MEMORY));
    }

    #[test]
    fn test_combination_members() {
        let mut db = db();
        db.put(&sphere("a.s", 8)).unwrap();
        db.put(&sphere("b.s", 8)).unwrap();
        db.put_combination(
            "group",
            &Combination::new(CombinationNode::union_of(["a.s", "b.s"])),
        )
        .unwrap();
        assert!(db.lookup("group").unwrap().is_combination());

        assert_eq!(
            db.remove_member("group", "a.s").unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            db.remove_member("group", "a.s").unwrap(),
            DeleteOutcome::NotFound
        );
        assert_eq!(
            db.remove_member("group", "b.s").unwrap(),
            DeleteOutcome::TreeEmptied
        );
        // Emptied combination stays, with no geometry
        assert!(db.get_combination("group").unwrap().tree.is_none());
    }

    #[test]
    fn test_hidden_objects_left_out_of_names() {
        let mut db = db();
        db.put(&sphere("a.s", 8)).unwrap();
        db.put(&sphere("b.s", 8)).unwrap();
        db.hide("b.s").unwrap();

        assert_eq!(db.names(), vec!["a.s"]);
        assert_eq!(db.names_all(), vec!["a.s", "b.s"]);
        // Pattern selection still sees hidden objects
        assert_eq!(db.match_names("b*"), vec!["b.s".to_string()]);

        db.unhide("b.s").unwrap();
        assert_eq!(db.names(), vec!["a.s", "b.s"]);
    }

    #[test]
    fn test_tops() {
        let mut db = Database::in_memory(DatabaseConfig {
            title: Some("tops".into()),
            ..Default::default()
        })
        .unwrap();
        db.put(&sphere("a.s", 8)).unwrap();
        db.put(&sphere("b.s", 8)).unwrap();
        db.put(&sphere("loose.s", 8)).unwrap();
        db.put_combination("inner", &Combination::new(Some(CombinationNode::leaf("a.s"))))
            .unwrap();
        db.put_combination(
            "top",
            &Combination::new(CombinationNode::union_of(["inner", "b.s", "ghost"])),
        )
        .unwrap();

        let mut tops = db.tops().unwrap();
        tops.sort();
        assert_eq!(tops, vec!["loose.s", "top"]);
    }

    #[test]
    fn test_delete_tree() {
        let mut db = db();
        db.put(&sphere("a.s", 8)).unwrap();
        db.put(&sphere("b.s", 8)).unwrap();
        db.put(&sphere("keep.s", 8)).unwrap();
        db.put_combination("inner", &Combination::new(CombinationNode::union_of(["a.s", "b.s"])))
            .unwrap();
        db.put_combination(
            "top",
            &Combination::new(CombinationNode::union_of(["inner", "a.s"])),
        )
        .unwrap();

        let deleted = db.delete_tree("top").unwrap();
        assert_eq!(deleted, vec!["a.s", "b.s", "inner", "top"]);
        assert_eq!(db.names(), vec!["keep.s"]);
        assert!(matches!(
            db.delete_tree("top"),
            Err(GeomDbError::NotFound(_))
        ));
    }

    #[test]
    fn test_title() {
        let config = DatabaseConfig {
            title: Some("Test model".into()),
            ..Default::default()
        };
        let mut db = Database::in_memory(config).unwrap();
        assert_eq!(db.title().unwrap().as_deref(), Some("Test model"));

        db.set_title("Renamed").unwrap();
        assert_eq!(db.title().unwrap().as_deref(), Some("Renamed"));
        assert_eq!(db.directory().len(), 1);
    }

    #[test]
    fn test_stats_json() {
        let mut db = db();
        db.put(&sphere("a.s", 8)).unwrap();
        db.put_combination("r", &Combination::region(Some(CombinationNode::leaf("a.s"))))
            .unwrap();

        let stats = db.stats();
        assert_eq!(stats.objects, 2);
        assert_eq!(stats.combinations, 1);
        assert_eq!(stats.regions, 1);

        let json = stats.to_json().unwrap();
        assert!(json.contains("\"objects\": 2"));
    }

    #[test]
    fn test_read_only_in_memory_rejects_writes() {
        let mut db = Database::in_memory(DatabaseConfig::read_only()).unwrap();
        assert!(db.is_read_only());
        assert!(matches!(
            db.put(&sphere("a.s", 8)),
            Err(GeomDbError::ReadOnlyViolation)
        ));
        assert!(db.directory().is_empty());
    }
}
