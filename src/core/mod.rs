//! Storage engine
//!
//! - [`error`] - Error taxonomy and `Result` alias
//! - [`header`] - File prologue with magic, version and checksum
//! - [`io`] - Backing storage (disk file or memory)
//! - [`allocator`] - Free-space tracking, first fit with coalescing
//! - [`codec`] - Record envelope, attribute blocks and raw views
//! - [`directory`] - Fixed-bucket name index
//! - [`pattern`] - Glob matching over names
//! - [`comb`] - Combination trees and full paths
//! - [`database`] - The [`Database`] handle tying everything together
//! - [`config`] - Open-time options
//!
//! ## File layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Header (32 bytes)                           │
//! │  - Magic: "GEOM\x00\x05\x00\x00"            │
//! │  - Version 1.0, alignment, CRC32            │
//! ├─────────────────────────────────────────────┤
//! │ Records, back to back, 8-byte aligned       │
//! │  - Data: preamble, types, name, attributes, │
//! │    body, padding                            │
//! │  - Free: preamble only, covers its length   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! There is no on-disk index. Opening a file scans the records once to
//! rebuild the directory and the free list.

pub mod allocator;
pub mod codec;
pub mod comb;
pub mod config;
pub mod database;
pub mod directory;
pub mod error;
pub mod header;
pub mod io;
pub mod pattern;

pub use database::{Database, DatabaseStats};
