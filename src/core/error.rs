use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeomDbError {
    #[error("Object already exists: {0}")]
    DuplicateName(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Database is read-only")]
    ReadOnlyViolation,

    #[error("Malformed record envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    #[error("Inconsistent path {path} at element {index}")]
    InconsistentPath { path: String, index: usize },

    #[error("Invalid file header: {0}")]
    InvalidHeader(String),

    #[error("Unsupported format version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Invalid object name: {0:?}")]
    InvalidName(String),

    #[error("Not a combination: {0}")]
    NotACombination(String),

    #[error("Bulk operation stopped at {failed} after {} completed: {source}", .completed.len())]
    BulkAborted {
        completed: Vec<String>,
        failed: String,
        #[source]
        source: Box<GeomDbError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Body codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, GeomDbError>;
