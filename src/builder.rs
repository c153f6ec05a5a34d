//! Synthetic record construction.
//!
//! [`RecordBuilder`] is the inverse of [`FieldParser`]: it encodes named values with the same
//! length rules the parser reads them with. Values are kept as [`FieldValue`]s until `pack`, so a
//! builder bound to a layout can place them in declaration order whatever order they were
//! added in.

use std::sync::Arc;

use encoding::{EncoderTrap, EncodingRef};
use jiff::Timestamp;
use log::debug;

use crate::err::{BuildError, BuildResult, LayoutResult};
use crate::etw_record::{EventHeader, HeaderFlags, RawRecord};
use crate::guid::Guid;
use crate::layout::{FieldLayout, FieldSpec, FieldType, LayoutSource, LengthRule};
use crate::parser::FieldParser;
use crate::stack_trace::STACK_ENTRY_WIDTH;
use crate::utils::{encode_utf16le, find_utf16le_nul};
use crate::value::{FieldValue, FileTime, FixedWidth, Pointer};

/// A packed record together with the layout describing its user data.
#[derive(Debug, Clone)]
pub struct SynthRecord {
    pub record: RawRecord,
    pub layout: Arc<FieldLayout>,
}

impl SynthRecord {
    pub fn parser(&self) -> FieldParser<'_> {
        FieldParser::new(&self.record, &self.layout)
    }

    pub fn into_record(self) -> RawRecord {
        self.record
    }
}

impl From<SynthRecord> for RawRecord {
    fn from(synth: SynthRecord) -> Self {
        synth.record
    }
}

#[derive(Debug, Clone)]
struct PendingField {
    name: String,
    value: FieldValue,
    /// Rule used when the builder is not bound to a layout.
    rule: LengthRule,
}

/// Accumulates named fields and packs them into a [`RawRecord`].
///
/// A builder is single use: after a successful `pack` or `pack_incomplete` every further call
/// fails with [`BuildError::AlreadyFinalized`].
pub struct RecordBuilder {
    header: EventHeader,
    target: Option<Arc<FieldLayout>>,
    pending: Vec<PendingField>,
    stack: Option<Vec<u64>>,
    ansi_codec: EncodingRef,
    finalized: bool,
}

impl std::fmt::Debug for RecordBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("RecordBuilder")
            .field("header", &self.header)
            .field("target", &self.target.as_ref().map(|l| l.key()))
            .field("pending", &self.pending)
            .field("stack", &self.stack)
            .field("ansi_codec", &self.ansi_codec.name())
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl RecordBuilder {
    /// A builder whose layout is derived from the order fields are added in.
    pub fn new(provider_id: Guid, event_id: u16, version: u8) -> Self {
        RecordBuilder {
            header: EventHeader::new(provider_id, event_id, version),
            target: None,
            pending: Vec::new(),
            stack: None,
            ansi_codec: encoding::all::WINDOWS_1252,
            finalized: false,
        }
    }

    /// A builder that must supply every field of `layout` before `pack` succeeds.
    pub fn for_layout(provider_id: Guid, layout: Arc<FieldLayout>) -> Self {
        let mut builder = Self::new(provider_id, layout.event_id(), layout.version());
        builder.target = Some(layout);
        builder
    }

    pub fn from_source<S: LayoutSource + ?Sized>(
        source: &S,
        provider_id: Guid,
        event_id: u16,
        version: u8,
    ) -> LayoutResult<Self> {
        let layout = source.resolve_layout(event_id, version)?;
        Ok(Self::for_layout(provider_id, Arc::new(layout.clone())))
    }

    /// Codec used for `ansi_string` fields. Should match the parser's.
    pub fn ansi_codec(mut self, codec: EncodingRef) -> Self {
        self.ansi_codec = codec;
        self
    }

    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut EventHeader {
        &mut self.header
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Appends the little-endian encoding of `value`.
    pub fn add_value<T: FixedWidth>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> BuildResult<&mut Self> {
        self.push(name.into(), value.into_value(), LengthRule::Fixed(T::width()))
    }

    /// Adds any value. Strings get a terminator, bytes are stored with their exact length.
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> BuildResult<&mut Self> {
        let value = value.into();
        let rule = match &value {
            FieldValue::Bytes(b) => LengthRule::Fixed(b.len()),
            other => FieldSpec::natural("", other.field_type()).length,
        };
        self.push(name.into(), value, rule)
    }

    pub fn add_ansi_string(&mut self, name: impl Into<String>, value: &str) -> BuildResult<&mut Self> {
        self.push(
            name.into(),
            FieldValue::AnsiString(value.to_owned()),
            LengthRule::NullTerminated,
        )
    }

    pub fn add_unicode_string(
        &mut self,
        name: impl Into<String>,
        value: &str,
    ) -> BuildResult<&mut Self> {
        self.push(
            name.into(),
            FieldValue::UnicodeString(value.to_owned()),
            LengthRule::NullTerminated,
        )
    }

    /// UTF-16 string preceded by its `u16` byte count.
    pub fn add_counted_string(
        &mut self,
        name: impl Into<String>,
        value: &str,
    ) -> BuildResult<&mut Self> {
        self.push(
            name.into(),
            FieldValue::UnicodeString(value.to_owned()),
            LengthRule::Counted,
        )
    }

    pub fn add_bytes(&mut self, name: impl Into<String>, value: &[u8]) -> BuildResult<&mut Self> {
        self.push(
            name.into(),
            FieldValue::Bytes(value.to_vec()),
            LengthRule::Fixed(value.len()),
        )
    }

    pub fn add_guid(&mut self, name: impl Into<String>, value: Guid) -> BuildResult<&mut Self> {
        self.add_value(name, value)
    }

    pub fn add_bool(&mut self, name: impl Into<String>, value: bool) -> BuildResult<&mut Self> {
        self.add_value(name, value)
    }

    pub fn add_pointer(&mut self, name: impl Into<String>, value: u64) -> BuildResult<&mut Self> {
        self.add_value(name, Pointer(value))
    }

    pub fn add_filetime(
        &mut self,
        name: impl Into<String>,
        value: Timestamp,
    ) -> BuildResult<&mut Self> {
        self.add_value(name, FileTime::from_timestamp(value))
    }

    /// Appends captured return addresses after the user data.
    pub fn with_stack_trace(
        &mut self,
        addresses: impl IntoIterator<Item = u64>,
    ) -> BuildResult<&mut Self> {
        self.ensure_open()?;
        self.stack = Some(addresses.into_iter().collect());
        Ok(self)
    }

    /// Packs the record, failing with `IncompleteRecord` if a field of the bound layout was
    /// never added.
    pub fn pack(&mut self) -> BuildResult<SynthRecord> {
        self.ensure_open()?;
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(BuildError::IncompleteRecord {
                event_id: self.header.event_id,
                version: self.header.version,
                missing,
            });
        }
        self.finish(false)
    }

    /// Packs whatever was added.
    ///
    /// Fields are emitted up to the first field of the bound layout that was not supplied, so
    /// that field and everything after it parse as `Truncated`. Length fields are written as
    /// given even when they disagree with the data they describe.
    pub fn pack_incomplete(&mut self) -> BuildResult<SynthRecord> {
        self.ensure_open()?;
        let missing = self.missing_fields();
        if !missing.is_empty() {
            debug!(
                "packing event {} v{} without field(s) {}",
                self.header.event_id,
                self.header.version,
                missing.join(", ")
            );
        }
        self.finish(true)
    }

    fn ensure_open(&self) -> BuildResult<()> {
        if self.finalized {
            Err(BuildError::AlreadyFinalized)
        } else {
            Ok(())
        }
    }

    fn push(&mut self, name: String, value: FieldValue, rule: LengthRule) -> BuildResult<&mut Self> {
        self.ensure_open()?;

        if self.pending.iter().any(|f| f.name == name) {
            return Err(BuildError::DuplicateField { name });
        }

        if let Some(target) = &self.target {
            let Some(spec) = target.field(&name) else {
                return Err(BuildError::UnknownField {
                    name,
                    event_id: target.event_id(),
                    version: target.version(),
                });
            };
            if spec.ty != value.field_type() {
                return Err(BuildError::TypeMismatch {
                    name,
                    declared: spec.ty,
                    supplied: value.field_type(),
                });
            }
        }

        self.pending.push(PendingField { name, value, rule });
        Ok(self)
    }

    fn missing_fields(&self) -> Vec<String> {
        let Some(target) = &self.target else {
            return Vec::new();
        };
        target
            .fields()
            .iter()
            .filter(|spec| !self.pending.iter().any(|f| f.name == spec.name))
            .map(|spec| spec.name.clone())
            .collect()
    }

    fn value_of(&self, name: &str) -> Option<&FieldValue> {
        self.pending
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    fn finish(&mut self, incomplete: bool) -> BuildResult<SynthRecord> {
        let layout = match &self.target {
            Some(target) => Arc::clone(target),
            None => Arc::new(self.implicit_layout()?),
        };

        let mut body = Vec::new();
        for spec in layout.fields() {
            let Some(value) = self.value_of(&spec.name) else {
                break;
            };
            self.encode_field(spec, value, incomplete, &mut body)?;
        }
        let declared_len = body.len();

        let mut header = self.header.clone();
        let stack = self.stack.take();
        let record = match stack {
            Some(addresses) => {
                header.flags |= HeaderFlags::EXTENDED_INFO;
                body.reserve(addresses.len() * STACK_ENTRY_WIDTH);
                for address in &addresses {
                    address.write_le(&mut body);
                }
                RawRecord::with_stack_trace(header, body, declared_len)
            }
            None => RawRecord::new(header, body),
        };

        debug!(
            "packed event {} v{}: {} byte(s) of user data, {} byte(s) total",
            record.event_id(),
            record.version(),
            declared_len,
            record.body().len()
        );

        self.finalized = true;
        self.pending.clear();
        Ok(SynthRecord { record, layout })
    }

    fn implicit_layout(&self) -> BuildResult<FieldLayout> {
        let fields = self
            .pending
            .iter()
            .map(|f| FieldSpec::new(f.name.clone(), f.value.field_type(), f.rule.clone()))
            .collect();
        FieldLayout::new(self.header.event_id, self.header.version, fields).map_err(|e| {
            BuildError::InvalidLayout {
                event_id: self.header.event_id,
                version: self.header.version,
                message: e.to_string(),
            }
        })
    }

    fn encode_field(
        &self,
        spec: &FieldSpec,
        value: &FieldValue,
        incomplete: bool,
        out: &mut Vec<u8>,
    ) -> BuildResult<()> {
        let raw = self.encode_value(spec, value)?;
        let element = spec.ty.element_width();
        let mismatch = |message: String| BuildError::LengthMismatch {
            name: spec.name.clone(),
            message,
        };

        // The parser stops every string at its first NUL.
        let embedded_nul = match spec.ty {
            FieldType::UnicodeString => find_utf16le_nul(&raw).is_some(),
            FieldType::AnsiString => raw.contains(&0),
            _ => false,
        };
        if embedded_nul {
            return Err(mismatch("value contains a NUL character".to_owned()));
        }

        match &spec.length {
            LengthRule::Fixed(n) => {
                if raw.len() > *n {
                    return Err(mismatch(format!(
                        "{} byte(s) do not fit in {} byte(s)",
                        raw.len(),
                        n
                    )));
                }
                out.extend_from_slice(&raw);
                out.resize(out.len() + (n - raw.len()), 0);
            }
            LengthRule::NullTerminated => {
                out.extend_from_slice(&raw);
                out.resize(out.len() + element, 0);
            }
            LengthRule::LengthPrefixField(reference) => {
                let elements = raw.len() / element;
                let declared = self.value_of(reference).and_then(FieldValue::as_integer);
                if !incomplete && declared != Some(elements as i128) {
                    return Err(mismatch(format!(
                        "`{}` must hold {} but holds {:?}",
                        reference, elements, declared
                    )));
                }
                out.extend_from_slice(&raw);
            }
            LengthRule::Remainder => out.extend_from_slice(&raw),
            LengthRule::Counted => {
                let size = u16::try_from(raw.len()).map_err(|_| {
                    mismatch(format!("{} byte(s) exceed a u16 count", raw.len()))
                })?;
                size.write_le(out);
                out.extend_from_slice(&raw);
            }
        }
        Ok(())
    }

    fn encode_value(&self, spec: &FieldSpec, value: &FieldValue) -> BuildResult<Vec<u8>> {
        let mut raw = Vec::new();
        match value {
            FieldValue::Int8(v) => v.write_le(&mut raw),
            FieldValue::Int16(v) => v.write_le(&mut raw),
            FieldValue::Int32(v) => v.write_le(&mut raw),
            FieldValue::Int64(v) => v.write_le(&mut raw),
            FieldValue::UInt8(v) => v.write_le(&mut raw),
            FieldValue::UInt16(v) => v.write_le(&mut raw),
            FieldValue::UInt32(v) | FieldValue::HexInt32(v) => v.write_le(&mut raw),
            FieldValue::UInt64(v)
            | FieldValue::Pointer(v)
            | FieldValue::FileTime(v)
            | FieldValue::HexInt64(v) => v.write_le(&mut raw),
            FieldValue::Float32(v) => v.write_le(&mut raw),
            FieldValue::Float64(v) => v.write_le(&mut raw),
            FieldValue::Boolean(v) => v.write_le(&mut raw),
            FieldValue::Guid(v) => v.write_le(&mut raw),
            FieldValue::AnsiString(s) => {
                raw = self.ansi_codec.encode(s, EncoderTrap::Strict).map_err(|message| {
                    BuildError::Unencodable {
                        name: spec.name.clone(),
                        encoding: self.ansi_codec.name(),
                        message: message.into_owned(),
                    }
                })?;
            }
            FieldValue::UnicodeString(s) => raw = encode_utf16le(s),
            FieldValue::Bytes(b) => raw.extend_from_slice(b),
        }
        Ok(raw)
    }
}
