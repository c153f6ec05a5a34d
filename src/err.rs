use thiserror::Error;

use crate::layout::FieldType;

pub type ParseResult<T> = std::result::Result<T, ParseError>;
pub type LayoutResult<T> = std::result::Result<T, LayoutError>;
pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Errors produced while extracting a single field out of a record body.
///
/// A `ParseError` always concerns one field. The record itself stays usable and other fields
/// can still be parsed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("field `{name}` is not declared by the layout for event {event_id} v{version}")]
    FieldNotFound {
        name: String,
        event_id: u16,
        version: u8,
    },

    #[error("field `{name}` is declared as {declared}, but was requested as {requested}")]
    TypeMismatch {
        name: String,
        declared: FieldType,
        requested: &'static str,
    },

    #[error("buffer too small for {what} at offset {offset} (need {need} bytes, have {have})")]
    Truncated {
        what: String,
        offset: u64,
        need: usize,
        have: usize,
    },

    #[error("field `{name}` at offset {offset} is not a valid {encoding} string: {message}")]
    InvalidString {
        name: String,
        offset: u64,
        encoding: &'static str,
        message: String,
    },

    #[error("length field `{reference}` of `{name}` holds an unusable length ({value})")]
    LengthReference {
        name: String,
        reference: String,
        value: i128,
    },

    #[error("field `{name}` at offset {offset} cannot be represented as {requested}: {message}")]
    OutOfRange {
        name: String,
        offset: u64,
        requested: &'static str,
        message: String,
    },
}

/// Why a decoded value could not be turned into the requested Rust type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("decoded value is of another type")]
    WrongVariant,

    #[error("{0}")]
    OutOfRange(String),
}

impl ParseError {
    pub(crate) fn truncated(what: impl Into<String>, offset: usize, need: usize, len: usize) -> Self {
        ParseError::Truncated {
            what: what.into(),
            offset: offset as u64,
            need,
            have: len.saturating_sub(offset),
        }
    }
}

/// Errors produced while declaring, registering or looking up field layouts.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("field `{name}` is declared more than once")]
    DuplicateField { name: String },

    #[error("length of `{name}` refers to `{reference}`, which is not declared before it")]
    UnknownLengthField { name: String, reference: String },

    #[error("length of `{name}` refers to `{reference}`, which is {declared} and not an integer")]
    LengthFieldNotIntegral {
        name: String,
        reference: String,
        declared: FieldType,
    },

    #[error("field `{name}` of type {declared} cannot have a fixed width of {width} bytes")]
    InvalidWidth {
        name: String,
        declared: FieldType,
        width: usize,
    },

    #[error("field `{name}` of type {declared} cannot use the length rule {rule}")]
    UnsupportedLengthRule {
        name: String,
        declared: FieldType,
        rule: String,
    },

    #[error("field `{name}` extends to the end of the record, so it must be declared last")]
    RemainderNotLast { name: String },

    #[error("field `{name}` of type {declared} needs an explicit length rule")]
    MissingLengthRule { name: String, declared: FieldType },

    #[error("no layout registered for event {event_id} v{version}")]
    LayoutNotFound { event_id: u16, version: u8 },

    #[error("a layout for event {event_id} v{version} is already registered")]
    AlreadyRegistered { event_id: u16, version: u8 },

    #[error("failed to read layout manifest: {source}")]
    Manifest {
        #[from]
        source: serde_json::Error,
    },
}

/// Errors produced by [`crate::RecordBuilder`].
///
/// These point at mistakes in test fixtures, so they are never swallowed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("record for event {event_id} v{version} is missing field(s): {}", missing.join(", "))]
    IncompleteRecord {
        event_id: u16,
        version: u8,
        missing: Vec<String>,
    },

    #[error("record builder was already packed")]
    AlreadyFinalized,

    #[error("field `{name}` is declared as {declared}, but a {supplied} value was added")]
    TypeMismatch {
        name: String,
        declared: FieldType,
        supplied: FieldType,
    },

    #[error("field `{name}` does not fit its length rule: {message}")]
    LengthMismatch { name: String, message: String },

    #[error("field `{name}` is not declared by the layout for event {event_id} v{version}")]
    UnknownField {
        name: String,
        event_id: u16,
        version: u8,
    },

    #[error("field `{name}` was added more than once")]
    DuplicateField { name: String },

    #[error("fields added for event {event_id} v{version} do not form a valid layout: {message}")]
    InvalidLayout {
        event_id: u16,
        version: u8,
        message: String,
    },

    #[error("value of field `{name}` cannot be encoded as {encoding}: {message}")]
    Unencodable {
        name: String,
        encoding: &'static str,
        message: String,
    },
}
