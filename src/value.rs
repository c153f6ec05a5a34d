use std::fmt::{self, Display};

use byteorder::{ByteOrder, LittleEndian};
use jiff::Timestamp;
use serde::ser::{Serialize, Serializer};

use crate::err::{ConversionError, ParseResult};
use crate::guid::Guid;
use crate::layout::FieldType;
use crate::utils::{bytes, filetime_to_timestamp, timestamp_to_filetime};

/// A decoded field value. Every variant corresponds to exactly one [`FieldType`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Boolean(bool),
    Guid(Guid),
    Pointer(u64),
    FileTime(u64),
    HexInt32(u32),
    HexInt64(u64),
    AnsiString(String),
    UnicodeString(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Int8(_) => FieldType::Int8,
            FieldValue::Int16(_) => FieldType::Int16,
            FieldValue::Int32(_) => FieldType::Int32,
            FieldValue::Int64(_) => FieldType::Int64,
            FieldValue::UInt8(_) => FieldType::UInt8,
            FieldValue::UInt16(_) => FieldType::UInt16,
            FieldValue::UInt32(_) => FieldType::UInt32,
            FieldValue::UInt64(_) => FieldType::UInt64,
            FieldValue::Float32(_) => FieldType::Float32,
            FieldValue::Float64(_) => FieldType::Float64,
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::Guid(_) => FieldType::Guid,
            FieldValue::Pointer(_) => FieldType::Pointer,
            FieldValue::FileTime(_) => FieldType::FileTime,
            FieldValue::HexInt32(_) => FieldType::HexInt32,
            FieldValue::HexInt64(_) => FieldType::HexInt64,
            FieldValue::AnsiString(_) => FieldType::AnsiString,
            FieldValue::UnicodeString(_) => FieldType::UnicodeString,
            FieldValue::Bytes(_) => FieldType::RawBytes,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::AnsiString(s) | FieldValue::UnicodeString(s) => Some(s),
            _ => None,
        }
    }

    /// Integral value, used to follow `LengthPrefixField` references.
    pub fn as_integer(&self) -> Option<i128> {
        match *self {
            FieldValue::Int8(v) => Some(i128::from(v)),
            FieldValue::Int16(v) => Some(i128::from(v)),
            FieldValue::Int32(v) => Some(i128::from(v)),
            FieldValue::Int64(v) => Some(i128::from(v)),
            FieldValue::UInt8(v) => Some(i128::from(v)),
            FieldValue::UInt16(v) => Some(i128::from(v)),
            FieldValue::UInt32(v) | FieldValue::HexInt32(v) => Some(i128::from(v)),
            FieldValue::UInt64(v) | FieldValue::HexInt64(v) => Some(i128::from(v)),
            _ => None,
        }
    }

    /// Exact equality as used by filters.
    ///
    /// Numbers only match the same type and the same bit pattern (`Int32(2)` never matches
    /// `Int64(2)` or `UInt32(2)`). Strings match on their characters, regardless of whether they
    /// were stored as ANSI or UTF-16.
    pub fn matches(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Float32(a), FieldValue::Float32(b)) => a.to_bits() == b.to_bits(),
            (FieldValue::Float64(a), FieldValue::Float64(b)) => a.to_bits() == b.to_bits(),
            (a, b) if a.field_type().is_string() && b.field_type().is_string() => {
                a.as_str() == b.as_str()
            }
            (a, b) => a == b,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Int8(v) => write!(f, "{v}"),
            FieldValue::Int16(v) => write!(f, "{v}"),
            FieldValue::Int32(v) => write!(f, "{v}"),
            FieldValue::Int64(v) => write!(f, "{v}"),
            FieldValue::UInt8(v) => write!(f, "{v}"),
            FieldValue::UInt16(v) => write!(f, "{v}"),
            FieldValue::UInt32(v) => write!(f, "{v}"),
            FieldValue::UInt64(v) => write!(f, "{v}"),
            FieldValue::Float32(v) => write!(f, "{v}"),
            FieldValue::Float64(v) => write!(f, "{v}"),
            FieldValue::Boolean(v) => write!(f, "{v}"),
            FieldValue::Guid(v) => write!(f, "{v}"),
            FieldValue::Pointer(v) | FieldValue::HexInt64(v) => write!(f, "0x{v:x}"),
            FieldValue::HexInt32(v) => write!(f, "0x{v:x}"),
            FieldValue::FileTime(v) => match filetime_to_timestamp(*v) {
                Some(ts) => write!(f, "{ts}"),
                None => write!(f, "{v}"),
            },
            FieldValue::AnsiString(s) | FieldValue::UnicodeString(s) => f.write_str(s),
            FieldValue::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Int8(v) => serializer.serialize_i8(*v),
            FieldValue::Int16(v) => serializer.serialize_i16(*v),
            FieldValue::Int32(v) => serializer.serialize_i32(*v),
            FieldValue::Int64(v) => serializer.serialize_i64(*v),
            FieldValue::UInt8(v) => serializer.serialize_u8(*v),
            FieldValue::UInt16(v) => serializer.serialize_u16(*v),
            FieldValue::UInt32(v) => serializer.serialize_u32(*v),
            FieldValue::UInt64(v) => serializer.serialize_u64(*v),
            FieldValue::Float32(v) => serializer.serialize_f32(*v),
            FieldValue::Float64(v) => serializer.serialize_f64(*v),
            FieldValue::Boolean(v) => serializer.serialize_bool(*v),
            FieldValue::AnsiString(s) | FieldValue::UnicodeString(s) => serializer.serialize_str(s),
            FieldValue::Bytes(b) => serializer.collect_seq(b),
            other => serializer.collect_str(other),
        }
    }
}

macro_rules! impl_into_value {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FieldValue {
                fn from(v: $t) -> Self {
                    v.into_value()
                }
            }
        )*
    };
}

impl_into_value!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool, Guid);
impl_into_value!(Pointer, FileTime, HexInt32, HexInt64);

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

/// Strings compare equal regardless of their wire encoding, see [`FieldValue::matches`].
impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::UnicodeString(v.to_owned())
    }
}

/// Pointer sized value (always 8 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Pointer(pub u64);

/// 32-bit integer conventionally rendered in hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HexInt32(pub u32);

/// 64-bit integer conventionally rendered in hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HexInt64(pub u64);

/// Raw FILETIME: 100ns ticks since 1601-01-01 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FileTime(pub u64);

impl FileTime {
    pub fn from_timestamp(ts: Timestamp) -> Self {
        FileTime(timestamp_to_filetime(ts))
    }

    pub fn to_timestamp(self) -> Option<Timestamp> {
        filetime_to_timestamp(self.0)
    }
}

/// Types with a fixed little-endian wire encoding.
pub trait FixedWidth: Sized + Copy {
    const FIELD_TYPE: FieldType;

    /// Decodes from the start of `raw`, failing with `Truncated` if it is too short.
    fn read_le(raw: &[u8], what: &str) -> ParseResult<Self>;

    fn write_le(&self, out: &mut Vec<u8>);

    fn into_value(self) -> FieldValue;

    fn width() -> usize {
        Self::FIELD_TYPE.natural_width().unwrap_or(0)
    }
}

macro_rules! impl_fixed_width {
    ($t:ty, $variant:ident, $n:literal, $read:ident, $write:ident) => {
        impl FixedWidth for $t {
            const FIELD_TYPE: FieldType = FieldType::$variant;

            fn read_le(raw: &[u8], what: &str) -> ParseResult<Self> {
                let arr = bytes::read_array_r::<$n>(raw, 0, what)?;
                Ok(LittleEndian::$read(&arr))
            }

            fn write_le(&self, out: &mut Vec<u8>) {
                let mut buf = [0u8; $n];
                LittleEndian::$write(&mut buf, *self);
                out.extend_from_slice(&buf);
            }

            fn into_value(self) -> FieldValue {
                FieldValue::$variant(self)
            }
        }
    };
}

impl_fixed_width!(i16, Int16, 2, read_i16, write_i16);
impl_fixed_width!(i32, Int32, 4, read_i32, write_i32);
impl_fixed_width!(i64, Int64, 8, read_i64, write_i64);
impl_fixed_width!(u16, UInt16, 2, read_u16, write_u16);
impl_fixed_width!(u32, UInt32, 4, read_u32, write_u32);
impl_fixed_width!(u64, UInt64, 8, read_u64, write_u64);
impl_fixed_width!(f32, Float32, 4, read_f32, write_f32);
impl_fixed_width!(f64, Float64, 8, read_f64, write_f64);

impl FixedWidth for i8 {
    const FIELD_TYPE: FieldType = FieldType::Int8;

    fn read_le(raw: &[u8], what: &str) -> ParseResult<Self> {
        Ok(i8::from_le_bytes(bytes::read_array_r::<1>(raw, 0, what)?))
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn into_value(self) -> FieldValue {
        FieldValue::Int8(self)
    }
}

impl FixedWidth for u8 {
    const FIELD_TYPE: FieldType = FieldType::UInt8;

    fn read_le(raw: &[u8], what: &str) -> ParseResult<Self> {
        Ok(bytes::read_array_r::<1>(raw, 0, what)?[0])
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }

    fn into_value(self) -> FieldValue {
        FieldValue::UInt8(self)
    }
}

impl FixedWidth for bool {
    const FIELD_TYPE: FieldType = FieldType::Boolean;

    fn read_le(raw: &[u8], what: &str) -> ParseResult<Self> {
        Ok(u32::read_le(raw, what)? != 0)
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        u32::from(*self).write_le(out)
    }

    fn into_value(self) -> FieldValue {
        FieldValue::Boolean(self)
    }
}

impl FixedWidth for Guid {
    const FIELD_TYPE: FieldType = FieldType::Guid;

    fn read_le(raw: &[u8], what: &str) -> ParseResult<Self> {
        Ok(Guid::from_bytes(&bytes::read_array_r::<16>(raw, 0, what)?))
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bytes());
    }

    fn into_value(self) -> FieldValue {
        FieldValue::Guid(self)
    }
}

macro_rules! impl_fixed_width_newtype {
    ($t:ident, $inner:ty, $variant:ident) => {
        impl FixedWidth for $t {
            const FIELD_TYPE: FieldType = FieldType::$variant;

            fn read_le(raw: &[u8], what: &str) -> ParseResult<Self> {
                Ok($t(<$inner>::read_le(raw, what)?))
            }

            fn write_le(&self, out: &mut Vec<u8>) {
                self.0.write_le(out)
            }

            fn into_value(self) -> FieldValue {
                FieldValue::$variant(self.0)
            }
        }
    };
}

impl_fixed_width_newtype!(Pointer, u64, Pointer);
impl_fixed_width_newtype!(HexInt32, u32, HexInt32);
impl_fixed_width_newtype!(HexInt64, u64, HexInt64);
impl_fixed_width_newtype!(FileTime, u64, FileTime);

/// Rust types a field can be parsed into.
///
/// `accepts` is checked against the declared type before any bytes are touched, so asking for
/// the wrong type fails with `TypeMismatch` without paying for offset resolution.
pub trait FromField: Sized {
    /// Name reported in `TypeMismatch` errors.
    const REQUESTED: &'static str;

    fn accepts(ty: FieldType) -> bool;

    fn from_value(value: FieldValue) -> Result<Self, ConversionError>;
}

macro_rules! impl_from_field {
    ($t:ty, $variant:ident, $name:literal) => {
        impl FromField for $t {
            const REQUESTED: &'static str = $name;

            fn accepts(ty: FieldType) -> bool {
                ty == FieldType::$variant
            }

            fn from_value(value: FieldValue) -> Result<Self, ConversionError> {
                match value {
                    FieldValue::$variant(v) => Ok(v.into()),
                    _ => Err(ConversionError::WrongVariant),
                }
            }
        }
    };
}

impl_from_field!(i8, Int8, "int8");
impl_from_field!(i16, Int16, "int16");
impl_from_field!(i32, Int32, "int32");
impl_from_field!(i64, Int64, "int64");
impl_from_field!(u8, UInt8, "uint8");
impl_from_field!(u16, UInt16, "uint16");
impl_from_field!(u32, UInt32, "uint32");
impl_from_field!(u64, UInt64, "uint64");
impl_from_field!(f32, Float32, "float32");
impl_from_field!(f64, Float64, "float64");
impl_from_field!(bool, Boolean, "boolean");
impl_from_field!(Guid, Guid, "guid");

impl FromField for Vec<u8> {
    const REQUESTED: &'static str = "raw_bytes";

    fn accepts(ty: FieldType) -> bool {
        ty == FieldType::RawBytes
    }

    fn from_value(value: FieldValue) -> Result<Self, ConversionError> {
        match value {
            FieldValue::Bytes(v) => Ok(v),
            _ => Err(ConversionError::WrongVariant),
        }
    }
}

macro_rules! impl_from_field_newtype {
    ($t:ident, $variant:ident, $name:literal) => {
        impl FromField for $t {
            const REQUESTED: &'static str = $name;

            fn accepts(ty: FieldType) -> bool {
                ty == FieldType::$variant
            }

            fn from_value(value: FieldValue) -> Result<Self, ConversionError> {
                match value {
                    FieldValue::$variant(v) => Ok($t(v)),
                    _ => Err(ConversionError::WrongVariant),
                }
            }
        }
    };
}

impl_from_field_newtype!(Pointer, Pointer, "pointer");
impl_from_field_newtype!(HexInt32, HexInt32, "hex_int32");
impl_from_field_newtype!(HexInt64, HexInt64, "hex_int64");
impl_from_field_newtype!(FileTime, FileTime, "filetime");

impl FromField for String {
    const REQUESTED: &'static str = "string";

    fn accepts(ty: FieldType) -> bool {
        ty.is_string()
    }

    fn from_value(value: FieldValue) -> Result<Self, ConversionError> {
        match value {
            FieldValue::AnsiString(s) | FieldValue::UnicodeString(s) => Ok(s),
            _ => Err(ConversionError::WrongVariant),
        }
    }
}

impl FromField for Timestamp {
    const REQUESTED: &'static str = "timestamp";

    fn accepts(ty: FieldType) -> bool {
        ty == FieldType::FileTime
    }

    fn from_value(value: FieldValue) -> Result<Self, ConversionError> {
        match value {
            FieldValue::FileTime(v) => filetime_to_timestamp(v).ok_or_else(|| {
                ConversionError::OutOfRange(format!("FILETIME {v:#x} is outside the supported range"))
            }),
            _ => Err(ConversionError::WrongVariant),
        }
    }
}

impl FromField for FieldValue {
    const REQUESTED: &'static str = "any";

    fn accepts(_ty: FieldType) -> bool {
        true
    }

    fn from_value(value: FieldValue) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exact_width_matching() {
        assert!(FieldValue::Int32(2).matches(&FieldValue::Int32(2)));
        assert!(!FieldValue::Int32(2).matches(&FieldValue::Int64(2)));
        assert!(!FieldValue::Int32(2).matches(&FieldValue::UInt32(2)));
        assert!(!FieldValue::Int32(2).matches(&FieldValue::Int32(3)));
    }

    #[test]
    fn test_strings_match_across_encodings() {
        let ansi = FieldValue::AnsiString("alice".to_owned());
        let unicode = FieldValue::UnicodeString("alice".to_owned());
        assert!(ansi.matches(&unicode));
        assert!(!ansi.matches(&FieldValue::Bytes(b"alice".to_vec())));
    }

    #[test]
    fn test_float_matching_is_bitwise() {
        assert!(FieldValue::Float64(f64::NAN).matches(&FieldValue::Float64(f64::NAN)));
        assert!(!FieldValue::Float64(0.0).matches(&FieldValue::Float64(-0.0)));
    }

    #[test]
    fn test_fixed_width_encoding() {
        let mut out = Vec::new();
        (-2i16).write_le(&mut out);
        true.write_le(&mut out);
        Pointer(0x1122_3344_5566_7788).write_le(&mut out);
        assert_eq!(
            out,
            vec![0xFE, 0xFF, 1, 0, 0, 0, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
        );

        assert_eq!(i16::read_le(&out, "i16").unwrap(), -2);
        assert!(bool::read_le(&out[2..], "bool").unwrap());
        assert!(u64::read_le(&out[..7], "u64").is_err());
    }

    #[test]
    fn test_display_and_json() {
        let value = FieldValue::Pointer(0x7ff6_1000);
        assert_eq!(value.to_string(), "0x7ff61000");
        assert_eq!(serde_json::to_string(&value).unwrap(), "\"0x7ff61000\"");
        assert_eq!(
            serde_json::to_string(&FieldValue::Int16(5)).unwrap(),
            "5"
        );
    }

    #[test]
    fn test_raw_bytes_extraction() {
        assert!(<Vec<u8>>::accepts(FieldType::RawBytes));
        assert!(!<Vec<u8>>::accepts(FieldType::AnsiString));
        assert_eq!(
            <Vec<u8>>::from_value(FieldValue::Bytes(vec![1, 2])),
            Ok(vec![1, 2])
        );
        assert_eq!(
            <Vec<u8>>::from_value(FieldValue::UInt8(1)),
            Err(ConversionError::WrongVariant)
        );
    }

    #[test]
    fn test_timestamp_out_of_range() {
        assert!(matches!(
            Timestamp::from_value(FieldValue::FileTime(u64::MAX)),
            Err(ConversionError::OutOfRange(_))
        ));
    }
}
