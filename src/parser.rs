//! Schema driven field extraction.
//!
//! Fields are located by walking the layout from offset 0 in declaration order. Nothing is
//! cached: every lookup replays its predecessors, so a parser is just a pair of borrows and can be
//! created per record without cost.

use std::fmt::{self, Debug};
use std::ops::Range;
#[cfg(feature = "multithreading")]
use std::sync::Arc;

use encoding::{DecoderTrap, EncodingRef};
use log::{trace, warn};
use serde::Serialize;

use crate::err::{ConversionError, LayoutResult, ParseError, ParseResult};
use crate::etw_record::RawRecord;
use crate::guid::Guid;
use crate::layout::{FieldLayout, FieldSpec, FieldType, LayoutSource, LengthRule};
use crate::utils::{bytes, decode_utf16le_bytes, find_utf16le_nul};
use crate::value::{FieldValue, FileTime, FixedWidth, FromField, HexInt32, HexInt64, Pointer};

#[derive(Clone)]
pub struct ParserSettings {
    /// Controls the number of threads used for batch filtering.
    num_threads: usize,
    /// Codec used to decode `ansi_string` fields.
    ansi_codec: EncodingRef,
    /// Fail null terminated fields that run into the end of the user data.
    strict_terminators: bool,
    /// Built once for an explicit thread count. `None` uses rayon's global pool.
    #[cfg(feature = "multithreading")]
    thread_pool: Option<Arc<rayon::ThreadPool>>,
}

impl Debug for ParserSettings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ParserSettings")
            .field("num_threads", &self.num_threads)
            .field("ansi_codec", &self.ansi_codec.name())
            .field("strict_terminators", &self.strict_terminators)
            .finish()
    }
}

impl PartialEq for ParserSettings {
    fn eq(&self, other: &ParserSettings) -> bool {
        self.ansi_codec.name() == other.ansi_codec.name()
            && self.num_threads == other.num_threads
            && self.strict_terminators == other.strict_terminators
    }
}

impl Default for ParserSettings {
    fn default() -> Self {
        ParserSettings {
            num_threads: 0,
            ansi_codec: encoding::all::WINDOWS_1252,
            strict_terminators: false,
            #[cfg(feature = "multithreading")]
            thread_pool: None,
        }
    }
}

impl ParserSettings {
    pub fn new() -> Self {
        ParserSettings::default()
    }

    /// Sets the number of worker threads used by [`crate::filter_records`].
    /// `0` will let rayon decide.
    ///
    /// A non-zero count builds a dedicated pool here, which every batch filtered with these
    /// settings (and their clones) shares.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        #[cfg(feature = "multithreading")]
        {
            self.num_threads = num_threads;
            self.thread_pool = None;
            if num_threads > 0 {
                match rayon::ThreadPoolBuilder::new().num_threads(num_threads).build() {
                    Ok(pool) => self.thread_pool = Some(Arc::new(pool)),
                    Err(e) => warn!(
                        "failed to build a pool of {} threads ({}), using the global pool",
                        num_threads, e
                    ),
                }
            }
        }
        #[cfg(not(feature = "multithreading"))]
        {
            if num_threads > 1 {
                warn!("Setting num_threads has no effect when compiling without multithreading support.");
            }
            self.num_threads = 1;
        }
        self
    }

    /// Sets the codec used to decode `ansi_string` fields.
    pub fn ansi_codec(mut self, ansi_codec: EncodingRef) -> Self {
        self.ansi_codec = ansi_codec;
        self
    }

    /// When set, a null terminated string without a terminator fails with `Truncated` instead
    /// of extending to the end of the user data.
    pub fn strict_terminators(mut self, strict: bool) -> Self {
        self.strict_terminators = strict;
        self
    }

    pub fn get_num_threads(&self) -> usize {
        self.num_threads
    }

    #[cfg(feature = "multithreading")]
    pub(crate) fn thread_pool(&self) -> Option<&rayon::ThreadPool> {
        self.thread_pool.as_deref()
    }

    pub fn get_ansi_codec(&self) -> EncodingRef {
        self.ansi_codec
    }

    pub fn is_strict_terminators(&self) -> bool {
        self.strict_terminators
    }
}

/// Location of a field inside the user data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRange {
    /// Offset of the first byte of the field, including an inline length prefix.
    pub offset: usize,
    /// Number of bytes the field occupies, including prefix and terminator.
    pub len: usize,
    value: Range<usize>,
}

impl FieldRange {
    /// Bytes holding the value itself, without prefix or terminator.
    pub fn value_range(&self) -> Range<usize> {
        self.value.clone()
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// A field decoded on demand. Borrows the record it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedField<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub ty: FieldType,
    pub offset: usize,
    #[serde(skip)]
    pub raw: &'a [u8],
    pub value: FieldValue,
}

/// Extracts typed fields out of one record according to a layout.
#[derive(Debug, Clone)]
pub struct FieldParser<'a> {
    record: &'a RawRecord,
    layout: &'a FieldLayout,
    settings: ParserSettings,
}

impl<'a> FieldParser<'a> {
    pub fn new(record: &'a RawRecord, layout: &'a FieldLayout) -> Self {
        Self::with_settings(record, layout, ParserSettings::default())
    }

    pub fn with_settings(
        record: &'a RawRecord,
        layout: &'a FieldLayout,
        settings: ParserSettings,
    ) -> Self {
        FieldParser {
            record,
            layout,
            settings,
        }
    }

    /// Looks up the layout for the record's `(event id, version)`.
    pub fn for_record<S: LayoutSource + ?Sized>(
        record: &'a RawRecord,
        source: &'a S,
    ) -> LayoutResult<Self> {
        let layout = source.resolve_layout(record.event_id(), record.version())?;
        Ok(Self::new(record, layout))
    }

    pub fn record(&self) -> &'a RawRecord {
        self.record
    }

    pub fn layout(&self) -> &'a FieldLayout {
        self.layout
    }

    pub fn settings(&self) -> &ParserSettings {
        &self.settings
    }

    /// Absolute offset and extent of `name` inside the user data.
    pub fn resolve_offset(&self, name: &str) -> ParseResult<FieldRange> {
        let position = self.position(name)?;
        let mut walker = Walker::new(self);
        for _ in 0..position {
            walker.step()?;
        }
        walker.step()
    }

    /// Decodes `name` as `T`.
    ///
    /// The requested type is checked against the declared one before any bytes are read.
    pub fn parse<T: FromField>(&self, name: &str) -> ParseResult<T> {
        let position = self.position(name)?;
        let spec = &self.layout.fields()[position];
        if !T::accepts(spec.ty) {
            return Err(type_mismatch::<T>(spec));
        }

        let (range, value) = self.value_at(position)?;
        T::from_value(value).map_err(|e| match e {
            ConversionError::WrongVariant => type_mismatch::<T>(spec),
            ConversionError::OutOfRange(message) => ParseError::OutOfRange {
                name: spec.name.clone(),
                offset: range.offset as u64,
                requested: T::REQUESTED,
                message,
            },
        })
    }

    /// Like [`FieldParser::parse`], but yields `default` on any error.
    pub fn parse_with_default<T: FromField>(&self, name: &str, default: T) -> T {
        match self.parse(name) {
            Ok(value) => value,
            Err(e) => {
                trace!("substituting default for `{}`: {}", name, e);
                default
            }
        }
    }

    /// The raw bytes and decoded value of `name`.
    pub fn parsed(&self, name: &str) -> ParseResult<ParsedField<'a>> {
        let position = self.position(name)?;
        let mut walker = Walker::new(self);
        for _ in 0..position {
            walker.step()?;
        }
        let range = walker.step()?;
        self.materialize(position, &range)
    }

    /// Every field of the layout, in declaration order.
    ///
    /// Once a field cannot be located, every later field reports the same error.
    pub fn fields(&self) -> Vec<ParseResult<ParsedField<'a>>> {
        let mut walker = Walker::new(self);
        let mut failure: Option<ParseError> = None;
        let mut out = Vec::with_capacity(self.layout.len());

        for position in 0..self.layout.len() {
            if let Some(e) = &failure {
                out.push(Err(e.clone()));
                continue;
            }
            match walker.step() {
                Ok(range) => out.push(self.materialize(position, &range)),
                Err(e) => {
                    failure = Some(e.clone());
                    out.push(Err(e));
                }
            }
        }
        out
    }

    fn position(&self, name: &str) -> ParseResult<usize> {
        self.layout
            .position(name)
            .ok_or_else(|| ParseError::FieldNotFound {
                name: name.to_owned(),
                event_id: self.layout.event_id(),
                version: self.layout.version(),
            })
    }

    fn value_at(&self, position: usize) -> ParseResult<(FieldRange, FieldValue)> {
        let mut walker = Walker::new(self);
        for _ in 0..position {
            walker.step()?;
        }
        let range = walker.step()?;
        let value = self.decode(position, &range)?;
        Ok((range, value))
    }

    fn decode(&self, position: usize, range: &FieldRange) -> ParseResult<FieldValue> {
        let spec = &self.layout.fields()[position];
        let raw = &self.record.user_data()[range.value_range()];
        decode_value(spec, raw, range.offset, &self.settings)
    }

    fn materialize(&self, position: usize, range: &FieldRange) -> ParseResult<ParsedField<'a>> {
        let spec = &self.layout.fields()[position];
        Ok(ParsedField {
            name: spec.name.as_str(),
            ty: spec.ty,
            offset: range.offset,
            raw: &self.record.user_data()[range.value_range()],
            value: self.decode(position, range)?,
        })
    }
}

fn type_mismatch<T: FromField>(spec: &FieldSpec) -> ParseError {
    ParseError::TypeMismatch {
        name: spec.name.clone(),
        declared: spec.ty,
        requested: T::REQUESTED,
    }
}

/// Sequential offset resolution over a layout.
struct Walker<'p, 'a> {
    parser: &'p FieldParser<'a>,
    data: &'a [u8],
    cursor: usize,
    ranges: Vec<FieldRange>,
}

impl<'p, 'a> Walker<'p, 'a> {
    fn new(parser: &'p FieldParser<'a>) -> Self {
        Walker {
            parser,
            data: parser.record.user_data(),
            cursor: 0,
            ranges: Vec::with_capacity(parser.layout.len()),
        }
    }

    /// Locates the next field and advances past it.
    fn step(&mut self) -> ParseResult<FieldRange> {
        let position = self.ranges.len();
        let spec = &self.parser.layout.fields()[position];
        let range = self.locate(spec)?;
        trace!(
            "field `{}` ({}) at offset {}, {} byte(s)",
            spec.name, spec.ty, range.offset, range.len
        );
        self.cursor = range.end();
        self.ranges.push(range.clone());
        Ok(range)
    }

    fn locate(&self, spec: &FieldSpec) -> ParseResult<FieldRange> {
        let start = self.cursor;
        let remaining = self.data.len() - start;
        let element = spec.ty.element_width();

        match &spec.length {
            LengthRule::Fixed(n) => {
                bytes::slice_r(self.data, start, *n, &spec.name)?;
                Ok(span(start, *n, start..start + n))
            }
            LengthRule::NullTerminated => {
                if remaining == 0 {
                    return Err(ParseError::truncated(
                        spec.name.as_str(),
                        start,
                        element,
                        self.data.len(),
                    ));
                }
                let tail = &self.data[start..];
                let terminator = match spec.ty {
                    FieldType::UnicodeString => find_utf16le_nul(tail),
                    _ => tail.iter().position(|&b| b == 0),
                };

                match terminator {
                    Some(end) => Ok(span(start, end + element, start..start + end)),
                    None if self.parser.settings.strict_terminators => Err(ParseError::truncated(
                        spec.name.as_str(),
                        start,
                        remaining + element,
                        self.data.len(),
                    )),
                    None => {
                        warn!(
                            "field `{}` at offset {} has no terminator, using the remaining {} byte(s)",
                            spec.name, start, remaining
                        );
                        let usable = remaining - remaining % element;
                        Ok(span(start, remaining, start..start + usable))
                    }
                }
            }
            LengthRule::LengthPrefixField(reference) => {
                let count = self.referenced_length(spec, reference)?;
                let need = count.checked_mul(element).ok_or_else(|| {
                    ParseError::LengthReference {
                        name: spec.name.clone(),
                        reference: reference.clone(),
                        value: count as i128,
                    }
                })?;
                bytes::slice_r(self.data, start, need, &spec.name)?;
                Ok(span(start, need, start..start + need))
            }
            LengthRule::Remainder => {
                let usable = remaining - remaining % element;
                Ok(span(start, remaining, start..start + usable))
            }
            LengthRule::Counted => {
                let size = usize::from(bytes::read_u16_le_r(self.data, start, &spec.name)?);
                let body = start + 2;
                bytes::slice_r(self.data, body, size, &spec.name)?;
                let usable = size - size % element;
                Ok(span(start, size + 2, body..body + usable))
            }
        }
    }

    /// Element count held by an earlier integral field.
    fn referenced_length(&self, spec: &FieldSpec, reference: &str) -> ParseResult<usize> {
        let unusable = |value: i128| ParseError::LengthReference {
            name: spec.name.clone(),
            reference: reference.to_owned(),
            value,
        };

        let position = self
            .parser
            .layout
            .position(reference)
            .filter(|&p| p < self.ranges.len())
            .ok_or_else(|| unusable(-1))?;

        let value = self.parser.decode(position, &self.ranges[position])?;
        let count = value.as_integer().ok_or_else(|| unusable(-1))?;
        usize::try_from(count).map_err(|_| unusable(count))
    }
}

fn span(offset: usize, len: usize, value: Range<usize>) -> FieldRange {
    FieldRange { offset, len, value }
}

fn fixed<T: FixedWidth>(raw: &[u8], name: &str) -> ParseResult<FieldValue> {
    Ok(T::read_le(raw, name)?.into_value())
}

/// Decodes the value bytes of one field.
pub(crate) fn decode_value(
    spec: &FieldSpec,
    raw: &[u8],
    offset: usize,
    settings: &ParserSettings,
) -> ParseResult<FieldValue> {
    let name = spec.name.as_str();
    match spec.ty {
        FieldType::Int8 => fixed::<i8>(raw, name),
        FieldType::Int16 => fixed::<i16>(raw, name),
        FieldType::Int32 => fixed::<i32>(raw, name),
        FieldType::Int64 => fixed::<i64>(raw, name),
        FieldType::UInt8 => fixed::<u8>(raw, name),
        FieldType::UInt16 => fixed::<u16>(raw, name),
        FieldType::UInt32 => fixed::<u32>(raw, name),
        FieldType::UInt64 => fixed::<u64>(raw, name),
        FieldType::Float32 => fixed::<f32>(raw, name),
        FieldType::Float64 => fixed::<f64>(raw, name),
        FieldType::Boolean => fixed::<bool>(raw, name),
        FieldType::Guid => fixed::<Guid>(raw, name),
        FieldType::Pointer => fixed::<Pointer>(raw, name),
        FieldType::FileTime => fixed::<FileTime>(raw, name),
        FieldType::HexInt32 => fixed::<HexInt32>(raw, name),
        FieldType::HexInt64 => fixed::<HexInt64>(raw, name),
        FieldType::AnsiString => {
            // Fixed and remainder strings may be NUL padded.
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            let codec = settings.ansi_codec;
            codec
                .decode(&raw[..end], DecoderTrap::Strict)
                .map(FieldValue::AnsiString)
                .map_err(|message| ParseError::InvalidString {
                    name: name.to_owned(),
                    offset: offset as u64,
                    encoding: codec.name(),
                    message: message.into_owned(),
                })
        }
        FieldType::UnicodeString => {
            let end = find_utf16le_nul(raw).unwrap_or(raw.len() - raw.len() % 2);
            decode_utf16le_bytes(&raw[..end])
                .map(FieldValue::UnicodeString)
                .map_err(|e| ParseError::InvalidString {
                    name: name.to_owned(),
                    offset: offset as u64,
                    encoding: "UTF-16LE",
                    message: e.message().to_owned(),
                })
        }
        FieldType::RawBytes => Ok(FieldValue::Bytes(raw.to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etw_record::EventHeader;
    use crate::utils::encode_utf16le;
    use pretty_assertions::assert_eq;

    fn record(body: Vec<u8>) -> RawRecord {
        RawRecord::new(EventHeader::new(Guid::nil(), 1, 0), body)
    }

    fn layout(fields: &[(&str, FieldType, LengthRule)]) -> FieldLayout {
        let specs = fields
            .iter()
            .map(|(name, ty, rule)| FieldSpec::new(*name, *ty, rule.clone()))
            .collect();
        FieldLayout::new(1, 0, specs).unwrap()
    }

    #[test]
    fn test_offsets_follow_variable_fields() {
        let mut body = b"bob\0".to_vec();
        body.extend_from_slice(&encode_utf16le("hi"));
        body.extend_from_slice(&[0, 0]);
        body.extend_from_slice(&7u32.to_le_bytes());

        let layout = layout(&[
            ("User", FieldType::AnsiString, LengthRule::NullTerminated),
            ("Host", FieldType::UnicodeString, LengthRule::NullTerminated),
            ("Count", FieldType::UInt32, LengthRule::Fixed(4)),
        ]);
        let record = record(body);
        let parser = FieldParser::new(&record, &layout);

        let range = parser.resolve_offset("Count").unwrap();
        assert_eq!((range.offset, range.len), (10, 4));
        let host = parser.resolve_offset("Host").unwrap();
        assert_eq!(host.value_range(), 4..8);
        assert_eq!(parser.parse::<String>("Host").unwrap(), "hi");
        assert_eq!(parser.parse::<u32>("Count").unwrap(), 7);
    }

    #[test]
    fn test_length_prefix_counts_characters() {
        let mut body = 3u16.to_le_bytes().to_vec();
        body.extend_from_slice(&encode_utf16le("abc"));
        body.push(0x2A);

        let layout = layout(&[
            ("Len", FieldType::UInt16, LengthRule::Fixed(2)),
            (
                "Name",
                FieldType::UnicodeString,
                LengthRule::LengthPrefixField("Len".to_owned()),
            ),
            ("Tail", FieldType::UInt8, LengthRule::Fixed(1)),
        ]);
        let record = record(body);
        let parser = FieldParser::new(&record, &layout);

        assert_eq!(parser.parse::<String>("Name").unwrap(), "abc");
        assert_eq!(parser.parse::<u8>("Tail").unwrap(), 0x2A);
    }

    #[test]
    fn test_length_prefix_beyond_body_is_truncated() {
        let mut body = 200u32.to_le_bytes().to_vec();
        body.extend_from_slice(&[1, 2, 3]);

        let layout = layout(&[
            ("Size", FieldType::UInt32, LengthRule::Fixed(4)),
            (
                "Data",
                FieldType::RawBytes,
                LengthRule::LengthPrefixField("Size".to_owned()),
            ),
        ]);
        let record = record(body);
        let parser = FieldParser::new(&record, &layout);

        assert_eq!(
            parser.parse::<Vec<u8>>("Data").unwrap_err(),
            ParseError::Truncated {
                what: "Data".to_owned(),
                offset: 4,
                need: 200,
                have: 3,
            }
        );
        assert_eq!(parser.parse::<u32>("Size").unwrap(), 200);
    }

    #[test]
    fn test_negative_length_reference() {
        let body = (-1i32).to_le_bytes().to_vec();
        let layout = layout(&[
            ("Size", FieldType::Int32, LengthRule::Fixed(4)),
            (
                "Data",
                FieldType::RawBytes,
                LengthRule::LengthPrefixField("Size".to_owned()),
            ),
        ]);
        let record = record(body);
        let parser = FieldParser::new(&record, &layout);

        assert!(matches!(
            parser.parse::<Vec<u8>>("Data"),
            Err(ParseError::LengthReference { value: -1, .. })
        ));
    }

    #[test]
    fn test_counted_and_fixed_strings() {
        let mut body = 4u16.to_le_bytes().to_vec();
        body.extend_from_slice(&encode_utf16le("ok"));
        body.extend_from_slice(b"ab\0\0");

        let layout = layout(&[
            ("Label", FieldType::UnicodeString, LengthRule::Counted),
            ("Tag", FieldType::AnsiString, LengthRule::Fixed(4)),
        ]);
        let record = record(body);
        let parser = FieldParser::new(&record, &layout);

        assert_eq!(parser.parse::<String>("Label").unwrap(), "ok");
        assert_eq!(parser.parse::<String>("Tag").unwrap(), "ab");
        assert_eq!(parser.resolve_offset("Tag").unwrap().offset, 6);
    }

    #[test]
    fn test_type_is_checked_before_reading() {
        let layout = layout(&[("A", FieldType::Int32, LengthRule::Fixed(4))]);
        let record = record(vec![]);
        let parser = FieldParser::new(&record, &layout);

        assert!(matches!(
            parser.parse::<i64>("A"),
            Err(ParseError::TypeMismatch {
                declared: FieldType::Int32,
                requested: "int64",
                ..
            })
        ));
        assert!(matches!(
            parser.parse::<i32>("A"),
            Err(ParseError::Truncated { .. })
        ));
    }

    #[test]
    fn test_strict_terminators() {
        let layout = layout(&[("Name", FieldType::AnsiString, LengthRule::NullTerminated)]);
        let record = record(b"abc".to_vec());

        let lenient = FieldParser::new(&record, &layout);
        assert_eq!(lenient.parse::<String>("Name").unwrap(), "abc");

        let strict = FieldParser::with_settings(
            &record,
            &layout,
            ParserSettings::new().strict_terminators(true),
        );
        assert!(matches!(
            strict.parse::<String>("Name"),
            Err(ParseError::Truncated { need: 4, have: 3, .. })
        ));
    }

    #[test]
    fn test_string_starting_at_end_is_truncated() {
        let layout = layout(&[
            ("A", FieldType::UInt8, LengthRule::Fixed(1)),
            ("Name", FieldType::UnicodeString, LengthRule::NullTerminated),
        ]);
        let record = record(vec![1]);
        let parser = FieldParser::new(&record, &layout);

        assert!(matches!(
            parser.parse::<String>("Name"),
            Err(ParseError::Truncated { .. })
        ));
    }

    #[test]
    fn test_ansi_codec_is_configurable() {
        let layout = layout(&[("Name", FieldType::AnsiString, LengthRule::NullTerminated)]);
        let record = record(vec![0xE9, 0x00]);

        let parser = FieldParser::new(&record, &layout);
        assert_eq!(parser.parse::<String>("Name").unwrap(), "é");

        let parser = FieldParser::with_settings(
            &record,
            &layout,
            ParserSettings::new().ansi_codec(encoding::all::ASCII),
        );
        assert!(matches!(
            parser.parse::<String>("Name"),
            Err(ParseError::InvalidString { .. })
        ));
    }

    #[test]
    fn test_fields_stop_at_first_failure() {
        let layout = layout(&[
            ("A", FieldType::UInt16, LengthRule::Fixed(2)),
            ("B", FieldType::UInt32, LengthRule::Fixed(4)),
            ("C", FieldType::UInt8, LengthRule::Fixed(1)),
        ]);
        let record = record(vec![1, 0, 2]);
        let parser = FieldParser::new(&record, &layout);

        let fields = parser.fields();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].as_ref().unwrap().value, FieldValue::UInt16(1));
        assert!(fields[1].is_err());
        assert_eq!(fields[1], fields[2]);
    }

    #[test]
    fn test_unrepresentable_filetime() {
        let layout = layout(&[
            ("Flags", FieldType::UInt16, LengthRule::Fixed(2)),
            ("Created", FieldType::FileTime, LengthRule::Fixed(8)),
        ]);
        let mut body = vec![0, 0];
        body.extend_from_slice(&u64::MAX.to_le_bytes());
        let record = record(body);
        let parser = FieldParser::new(&record, &layout);

        assert!(matches!(
            parser.parse::<jiff::Timestamp>("Created"),
            Err(ParseError::OutOfRange {
                offset: 2,
                requested: "timestamp",
                ..
            })
        ));
        assert_eq!(parser.parse::<FileTime>("Created").unwrap(), FileTime(u64::MAX));
    }

    #[cfg(feature = "multithreading")]
    #[test]
    fn test_thread_pool_is_built_once_per_settings() {
        assert!(ParserSettings::new().thread_pool().is_none());

        let settings = ParserSettings::new().num_threads(2);
        let copy = settings.clone();
        let pool = settings.thread_pool().unwrap();
        assert_eq!(pool.current_num_threads(), 2);
        assert!(std::ptr::eq(pool, copy.thread_pool().unwrap()));

        assert!(settings.num_threads(0).thread_pool().is_none());
    }
}
