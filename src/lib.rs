#![deny(unused_must_use)]
#![forbid(unsafe_code)]
//! Decoding, filtering and synthesis of ETW event records.
//!
//! A record is a header plus a little-endian user data body. [`FieldLayout`]s describe the body
//! of one `(event id, version)` pair; [`FieldParser`] reads fields by name, [`Predicate`] trees
//! decide whether a record is interesting before anything else is decoded, and
//! [`RecordBuilder`] writes records with the same layout rules for tests.
//!
//! ```
//! use etwrec::{FieldParser, Guid, Predicate, RecordBuilder};
//!
//! let mut builder = RecordBuilder::new(Guid::nil(), 301, 4);
//! builder
//!     .add_ansi_string("TargetUserName", "alice")?
//!     .add_value("KeyLength", 5i16)?;
//! let synth = builder.pack()?;
//!
//! let parser = FieldParser::new(&synth.record, &synth.layout);
//! assert_eq!(parser.parse::<i16>("KeyLength")?, 5);
//! assert!(Predicate::string_contains("TargetUserName", "ali").evaluate(&synth.record, &synth.layout));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use builder::{RecordBuilder, SynthRecord};
pub use etw_record::{EventHeader, HeaderFlags, RawRecord};
pub use filter::{
    CaseMode, CustomPredicate, EventFilter, MetadataPredicate, Predicate, RecordPredicate, TextOp,
    evaluate, filter_records,
};
pub use guid::{Guid, InvalidGuid};
pub use layout::{
    FieldLayout, FieldSpec, FieldType, LayoutBuilder, LayoutKey, LayoutRegistry, LayoutSource,
    LengthRule,
};
pub use parser::{FieldParser, FieldRange, ParsedField, ParserSettings};
pub use stack_trace::{STACK_ENTRY_WIDTH, StackTrace, stack_trace};
pub use utils::{HexdumpFormat, hexdump, timestamp_to_filetime};
pub use value::{FieldValue, FileTime, FixedWidth, FromField, HexInt32, HexInt64, Pointer};

mod builder;
pub mod err;
mod etw_record;
mod filter;
mod guid;
mod layout;
mod parser;
mod stack_trace;
mod utils;
mod value;
