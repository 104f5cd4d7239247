//! External object codec
//!
//! A record travels as an [`ExternalBuffer`]: an aligned, self-describing
//! envelope around the name, attribute block and body. [`RawRecordView`]
//! reads the envelope without decoding the body.

pub mod attributes;
pub mod envelope;
pub mod record;

pub use attributes::AttributeSet;
pub use envelope::{
    encode, encode_parts, free_marker, peek_preamble, set_hidden, ExternalBuffer, Preamble,
    RawRecordView, RecordKind, DATA_HEADER_SIZE, FLAG_HIDDEN, MAGIC1, PREAMBLE_SIZE,
};
pub use record::{
    is_combination_type, minor, validate_name, MajorType, Record, GLOBAL_OBJECT_NAME,
};
