//! # geomdb - Embedded Object Database for Geometry
//!
//! `geomdb` stores named, typed records in a single mutable file: geometry
//! primitives with opaque bodies, and combinations that assemble other
//! objects through boolean trees.
//!
//! - **Single file** with self-describing, 8-byte aligned records
//! - **O(1) name lookup** through an in-memory directory rebuilt on open
//! - **Free-space reuse** with first-fit placement and coalescing
//! - **Raw record views** for envelope introspection without decoding bodies
//! - **Combination trees** with leaf deletion, reference renaming and path
//!   validation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use geomdb::{Combination, CombinationNode, Database, DatabaseConfig, Record, Result};
//! use geomdb::core::codec::minor;
//!
//! # fn main() -> Result<()> {
//! let mut db = Database::create("tank.g", DatabaseConfig::default())?;
//!
//! db.put(&Record::primitive("wheel.s", minor::SPHERE, vec![0; 32])?)?;
//! db.put(&Record::primitive("hull.s", minor::ARB8, vec![0; 192])?)?;
//! db.put_combination(
//!     "tank",
//!     &Combination::new(CombinationNode::union_of(["hull.s", "wheel.s"])),
//! )?;
//!
//! for name in db.match_names("*.s") {
//!     println!("{}", name);
//! }
//! db.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Builder
//!
//! ```rust,no_run
//! use geomdb::{DatabaseBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let db = DatabaseBuilder::new()
//!     .path("model.g")
//!     .title("Test model")
//!     .create_if_missing()
//!     .build()?;
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{
    codec::{AttributeSet, ExternalBuffer, MajorType, RawRecordView, Record},
    comb::{Combination, CombinationNode, DeleteOutcome, FullPath, Leaf},
    config::DatabaseConfig,
    directory::{DirectoryEntry, DirectoryIndex, EntryFlags, Location},
    error::{GeomDbError, Result},
    Database, DatabaseStats,
};

use std::path::PathBuf;
use tracing::{debug, info};

/// Builder for opening or creating a [`Database`]
///
/// Without a path the database lives in memory.
///
/// # Examples
///
/// ```rust
/// use geomdb::DatabaseBuilder;
///
/// # fn main() -> geomdb::Result<()> {
/// let db = DatabaseBuilder::new().title("Scratch").build()?;
/// assert_eq!(db.title()?.as_deref(), Some("Scratch"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    path: Option<PathBuf>,
    config: DatabaseConfig,
    truncate: bool,
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded configuration
    pub fn with_config(config: DatabaseConfig) -> Self {
        DatabaseBuilder {
            config,
            ..Self::default()
        }
    }

    /// Backing file (omit for an in-memory database)
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Title written to a newly created database
    pub fn title<S: Into<String>>(mut self, title: S) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.config.read_only = true;
        self
    }

    pub fn create_if_missing(mut self) -> Self {
        self.config.create_if_missing = true;
        self
    }

    /// Replace any existing file instead of opening it
    pub fn truncate(mut self) -> Self {
        self.truncate = true;
        self
    }

    pub fn sync_on_write(mut self) -> Self {
        self.config.sync_on_write = true;
        self
    }

    pub fn build(self) -> Result<Database> {
        let path = match self.path {
            Some(path) => path,
            None => {
                debug!("Building in-memory database");
                return Database::in_memory(self.config);
            }
        };

        if self.truncate {
            if self.config.read_only {
                return Err(GeomDbError::ReadOnlyViolation);
            }
            info!("Building database at {}", path.display());
            return Database::create(&path, self.config);
        }

        Database::open(&path, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::minor;

    #[test]
    fn test_builder_in_memory() -> Result<()> {
        let mut db = DatabaseBuilder::new().title("Scratch").build()?;
        db.put(&Record::primitive("a.s", minor::SPHERE, vec![1, 2, 3])?)?;
        assert_eq!(db.names(), vec!["_GLOBAL", "a.s"]);
        Ok(())
    }

    #[test]
    fn test_builder_create_then_open() -> Result<()> {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("model.g");

        {
            let mut db = DatabaseBuilder::new()
                .path(&path)
                .title("Model")
                .create_if_missing()
                .build()?;
            db.put(&Record::primitive("a.s", minor::SPHERE, vec![7; 10])?)?;
            db.close()?;
        }

        let db = DatabaseBuilder::new().path(&path).read_only().build()?;
        assert!(db.is_read_only());
        assert_eq!(db.title()?.as_deref(), Some("Model"));
        assert_eq!(db.get("a.s")?.body, vec![7; 10]);
        Ok(())
    }

    #[test]
    fn test_builder_missing_file_without_create() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.g");
        let result = DatabaseBuilder::new().path(&path).build();
        assert!(matches!(result, Err(GeomDbError::Io(_))));
    }

    #[test]
    fn test_builder_from_toml_config() -> Result<()> {
        let config = DatabaseConfig::from_toml_str("title = \"From TOML\"")?;
        let db = DatabaseBuilder::with_config(config).build()?;
        assert_eq!(db.title()?.as_deref(), Some("From TOML"));
        Ok(())
    }
}
