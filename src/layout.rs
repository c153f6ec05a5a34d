//! Data-described event schemas.
//!
//! A [`FieldLayout`] is the ordered list of fields inside the user data of one
//! `(event id, version)` pair. Layouts are validated once on construction and are immutable after
//! that; a [`LayoutRegistry`] maps keys to shared layouts.

use std::fmt::{self, Display};
use std::io::Read;
use std::sync::Arc;

use ahash::RandomState;
use hashbrown::HashMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::err::{LayoutError, LayoutResult};

/// Primitive type tag of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "uint64")]
    UInt64,
    Float32,
    Float64,
    /// 4-byte Win32 `BOOL`.
    Boolean,
    Guid,
    /// Pointer sized value. Records are always decoded as coming from a 64-bit session.
    Pointer,
    #[serde(rename = "filetime")]
    FileTime,
    HexInt32,
    HexInt64,
    AnsiString,
    UnicodeString,
    RawBytes,
}

impl FieldType {
    /// Width in bytes of types that are always encoded with the same size.
    pub const fn natural_width(self) -> Option<usize> {
        match self {
            FieldType::Int8 | FieldType::UInt8 => Some(1),
            FieldType::Int16 | FieldType::UInt16 => Some(2),
            FieldType::Int32
            | FieldType::UInt32
            | FieldType::Float32
            | FieldType::Boolean
            | FieldType::HexInt32 => Some(4),
            FieldType::Int64
            | FieldType::UInt64
            | FieldType::Float64
            | FieldType::Pointer
            | FieldType::FileTime
            | FieldType::HexInt64 => Some(8),
            FieldType::Guid => Some(16),
            FieldType::AnsiString | FieldType::UnicodeString | FieldType::RawBytes => None,
        }
    }

    /// Integer types that can carry the length of a later field.
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            FieldType::Int8
                | FieldType::Int16
                | FieldType::Int32
                | FieldType::Int64
                | FieldType::UInt8
                | FieldType::UInt16
                | FieldType::UInt32
                | FieldType::UInt64
                | FieldType::HexInt32
                | FieldType::HexInt64
        )
    }

    pub const fn is_string(self) -> bool {
        matches!(self, FieldType::AnsiString | FieldType::UnicodeString)
    }

    /// Size of one element of a variable-width type (a character, or a byte for raw data).
    pub const fn element_width(self) -> usize {
        match self {
            FieldType::UnicodeString => 2,
            _ => 1,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            FieldType::Int8 => "int8",
            FieldType::Int16 => "int16",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::UInt8 => "uint8",
            FieldType::UInt16 => "uint16",
            FieldType::UInt32 => "uint32",
            FieldType::UInt64 => "uint64",
            FieldType::Float32 => "float32",
            FieldType::Float64 => "float64",
            FieldType::Boolean => "boolean",
            FieldType::Guid => "guid",
            FieldType::Pointer => "pointer",
            FieldType::FileTime => "filetime",
            FieldType::HexInt32 => "hex_int32",
            FieldType::HexInt64 => "hex_int64",
            FieldType::AnsiString => "ansi_string",
            FieldType::UnicodeString => "unicode_string",
            FieldType::RawBytes => "raw_bytes",
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the byte length of a field is determined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthRule {
    /// Exactly `n` bytes.
    Fixed(usize),
    /// Characters up to (and including) a NUL of the string's character width.
    NullTerminated,
    /// The value of an earlier integral field holds the element count.
    LengthPrefixField(String),
    /// Everything up to the end of the user data.
    Remainder,
    /// Inline `u16` byte count followed by that many bytes.
    Counted,
}

impl Display for LengthRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LengthRule::Fixed(n) => write!(f, "fixed({n})"),
            LengthRule::NullTerminated => f.write_str("null_terminated"),
            LengthRule::LengthPrefixField(name) => write!(f, "length_prefix_field({name})"),
            LengthRule::Remainder => f.write_str("remainder"),
            LengthRule::Counted => f.write_str("counted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    pub length: LengthRule,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, ty: FieldType, length: LengthRule) -> Self {
        FieldSpec {
            name: name.into(),
            ty,
            length,
        }
    }

    /// A field using the natural width of `ty`, or `NullTerminated` for strings.
    pub fn natural(name: impl Into<String>, ty: FieldType) -> Self {
        let length = match ty.natural_width() {
            Some(width) => LengthRule::Fixed(width),
            None if ty.is_string() => LengthRule::NullTerminated,
            None => LengthRule::Remainder,
        };
        FieldSpec::new(name, ty, length)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayoutKey {
    pub event_id: u16,
    pub version: u8,
}

impl LayoutKey {
    pub const fn new(event_id: u16, version: u8) -> Self {
        LayoutKey { event_id, version }
    }
}

impl Display for LayoutKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}v{}", self.event_id, self.version)
    }
}

/// Ordered, validated list of named fields for one `(event id, version)` pair.
#[derive(Debug, Clone)]
pub struct FieldLayout {
    key: LayoutKey,
    event_name: Option<String>,
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize, RandomState>,
}

impl PartialEq for FieldLayout {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.event_name == other.event_name && self.fields == other.fields
    }
}

impl FieldLayout {
    /// Validates `fields` and builds the layout.
    ///
    /// Names must be unique and scalar types must use their natural fixed width. A
    /// `LengthPrefixField` must reference an integral field declared earlier, and only the last
    /// field may use `Remainder`.
    pub fn new(event_id: u16, version: u8, fields: Vec<FieldSpec>) -> LayoutResult<Self> {
        let mut index: HashMap<String, usize, RandomState> =
            HashMap::with_capacity_and_hasher(fields.len(), RandomState::new());

        for (position, field) in fields.iter().enumerate() {
            validate_rule(field, &fields[..position], &index)?;
            if matches!(field.length, LengthRule::Remainder) && position + 1 != fields.len() {
                return Err(LayoutError::RemainderNotLast {
                    name: field.name.clone(),
                });
            }

            if index.insert(field.name.clone(), position).is_some() {
                return Err(LayoutError::DuplicateField {
                    name: field.name.clone(),
                });
            }
        }

        Ok(FieldLayout {
            key: LayoutKey::new(event_id, version),
            event_name: None,
            fields,
            index,
        })
    }

    /// A layout without fields, for records whose schema is unknown.
    pub fn empty(event_id: u16, version: u8) -> Self {
        FieldLayout {
            key: LayoutKey::new(event_id, version),
            event_name: None,
            fields: Vec::new(),
            index: HashMap::default(),
        }
    }

    pub fn builder(event_id: u16, version: u8) -> LayoutBuilder {
        LayoutBuilder {
            event_id,
            version,
            event_name: None,
            fields: Vec::new(),
        }
    }

    pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = Some(name.into());
        self
    }

    pub fn key(&self) -> LayoutKey {
        self.key
    }

    pub fn event_id(&self) -> u16 {
        self.key.event_id
    }

    pub fn version(&self) -> u8 {
        self.key.version
    }

    pub fn event_name(&self) -> Option<&str> {
        self.event_name.as_deref()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Declaration index of `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.position(name).map(|idx| &self.fields[idx])
    }
}

fn validate_rule(
    field: &FieldSpec,
    preceding: &[FieldSpec],
    index: &HashMap<String, usize, RandomState>,
) -> LayoutResult<()> {
    let unsupported = || LayoutError::UnsupportedLengthRule {
        name: field.name.clone(),
        declared: field.ty,
        rule: field.length.to_string(),
    };

    match (&field.length, field.ty.natural_width()) {
        (LengthRule::Fixed(width), Some(natural)) if *width != natural => {
            Err(LayoutError::InvalidWidth {
                name: field.name.clone(),
                declared: field.ty,
                width: *width,
            })
        }
        (LengthRule::Fixed(_), Some(_)) => Ok(()),
        (_, Some(_)) => Err(unsupported()),
        (LengthRule::Fixed(width), None) if width % field.ty.element_width() != 0 => {
            Err(LayoutError::InvalidWidth {
                name: field.name.clone(),
                declared: field.ty,
                width: *width,
            })
        }
        (LengthRule::NullTerminated, None) if !field.ty.is_string() => Err(unsupported()),
        (LengthRule::LengthPrefixField(reference), None) => {
            let Some(&position) = index.get(reference) else {
                return Err(LayoutError::UnknownLengthField {
                    name: field.name.clone(),
                    reference: reference.clone(),
                });
            };
            let referenced = &preceding[position];
            if referenced.ty.is_integral() {
                Ok(())
            } else {
                Err(LayoutError::LengthFieldNotIntegral {
                    name: field.name.clone(),
                    reference: reference.clone(),
                    declared: referenced.ty,
                })
            }
        }
        (_, None) => Ok(()),
    }
}

/// Incremental construction of a [`FieldLayout`].
#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    event_id: u16,
    version: u8,
    event_name: Option<String>,
    fields: Vec<FieldSpec>,
}

impl LayoutBuilder {
    pub fn event_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = Some(name.into());
        self
    }

    /// Adds a field with the natural length rule of its type (see [`FieldSpec::natural`]).
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldSpec::natural(name, ty));
        self
    }

    pub fn field_with(mut self, name: impl Into<String>, ty: FieldType, length: LengthRule) -> Self {
        self.fields.push(FieldSpec::new(name, ty, length));
        self
    }

    pub fn build(self) -> LayoutResult<FieldLayout> {
        let layout = FieldLayout::new(self.event_id, self.version, self.fields)?;
        Ok(match self.event_name {
            Some(name) => layout.with_event_name(name),
            None => layout,
        })
    }
}

/// Lookup capability the core needs from a schema store.
pub trait LayoutSource {
    fn resolve_layout(&self, event_id: u16, version: u8) -> LayoutResult<&FieldLayout>;
}

impl LayoutSource for FieldLayout {
    fn resolve_layout(&self, event_id: u16, version: u8) -> LayoutResult<&FieldLayout> {
        if self.key == LayoutKey::new(event_id, version) {
            Ok(self)
        } else {
            Err(LayoutError::LayoutNotFound { event_id, version })
        }
    }
}

impl<S: LayoutSource + ?Sized> LayoutSource for &S {
    fn resolve_layout(&self, event_id: u16, version: u8) -> LayoutResult<&FieldLayout> {
        (**self).resolve_layout(event_id, version)
    }
}

impl<S: LayoutSource + ?Sized> LayoutSource for Arc<S> {
    fn resolve_layout(&self, event_id: u16, version: u8) -> LayoutResult<&FieldLayout> {
        (**self).resolve_layout(event_id, version)
    }
}

/// Maps `(event id, version)` to an immutable, shared [`FieldLayout`].
///
/// Registration happens up front; afterwards the registry is only read and can be shared between
/// threads freely.
#[derive(Debug, Clone, Default)]
pub struct LayoutRegistry {
    layouts: HashMap<LayoutKey, Arc<FieldLayout>, RandomState>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        LayoutRegistry::default()
    }

    /// Registers `layout`. A key can only be registered once.
    pub fn register(&mut self, layout: FieldLayout) -> LayoutResult<Arc<FieldLayout>> {
        let key = layout.key();
        if self.layouts.contains_key(&key) {
            return Err(LayoutError::AlreadyRegistered {
                event_id: key.event_id,
                version: key.version,
            });
        }

        debug!("registering layout {} with {} field(s)", key, layout.len());
        let layout = Arc::new(layout);
        self.layouts.insert(key, Arc::clone(&layout));
        Ok(layout)
    }

    /// Shared handle to a registered layout, e.g. to bind a [`crate::RecordBuilder`] to it.
    pub fn get(&self, event_id: u16, version: u8) -> LayoutResult<Arc<FieldLayout>> {
        self.layouts
            .get(&LayoutKey::new(event_id, version))
            .cloned()
            .ok_or(LayoutError::LayoutNotFound { event_id, version })
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = LayoutKey> + '_ {
        self.layouts.keys().copied()
    }

    /// Loads every layout of a JSON manifest.
    ///
    /// ```json
    /// {"layouts": [{"event_id": 301, "version": 4, "fields": [
    ///     {"name": "TargetUserName", "type": "ansi_string"},
    ///     {"name": "KeyLength", "type": "int16"}
    /// ]}]}
    /// ```
    pub fn from_manifest_json(json: &str) -> LayoutResult<Self> {
        let manifest: LayoutManifest = serde_json::from_str(json)?;
        Self::from_manifest(manifest)
    }

    pub fn from_manifest_reader(reader: impl Read) -> LayoutResult<Self> {
        let manifest: LayoutManifest = serde_json::from_reader(reader)?;
        Self::from_manifest(manifest)
    }

    fn from_manifest(manifest: LayoutManifest) -> LayoutResult<Self> {
        let mut registry = LayoutRegistry::new();
        for def in manifest.layouts {
            let fields = def
                .fields
                .into_iter()
                .map(FieldDef::into_spec)
                .collect::<LayoutResult<Vec<_>>>()?;

            let mut layout = FieldLayout::new(def.event_id, def.version, fields)?;
            if let Some(name) = def.name {
                layout = layout.with_event_name(name);
            }
            registry.register(layout)?;
        }
        Ok(registry)
    }
}

impl LayoutSource for LayoutRegistry {
    fn resolve_layout(&self, event_id: u16, version: u8) -> LayoutResult<&FieldLayout> {
        self.layouts
            .get(&LayoutKey::new(event_id, version))
            .map(Arc::as_ref)
            .ok_or(LayoutError::LayoutNotFound { event_id, version })
    }
}

#[derive(Debug, Deserialize)]
struct LayoutManifest {
    layouts: Vec<LayoutDef>,
}

#[derive(Debug, Deserialize)]
struct LayoutDef {
    event_id: u16,
    version: u8,
    #[serde(default)]
    name: Option<String>,
    fields: Vec<FieldDef>,
}

#[derive(Debug, Deserialize)]
struct FieldDef {
    name: String,
    #[serde(rename = "type")]
    ty: FieldType,
    #[serde(default)]
    length: Option<LengthRule>,
}

impl FieldDef {
    fn into_spec(self) -> LayoutResult<FieldSpec> {
        match (self.length, self.ty.natural_width()) {
            (Some(length), _) => Ok(FieldSpec::new(self.name, self.ty, length)),
            (None, Some(_)) => Ok(FieldSpec::natural(self.name, self.ty)),
            (None, None) if self.ty.is_string() => Ok(FieldSpec::natural(self.name, self.ty)),
            (None, None) => Err(LayoutError::MissingLengthRule {
                name: self.name,
                declared: self.ty,
            }),
        }
    }
}
