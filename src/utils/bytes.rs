//! Byte-slice utilities for bounds-oriented parsing.
//!
//! There are two layers:
//! - **Option layer** (`read_*`): zero-cost helpers that return `Option<T>`.
//! - **Result layer** (`*_r`): wrappers that map `None` to `ParseError::Truncated`.
//!
//! All numeric reads are **little-endian** (ETW user data is LE) and offsets are relative to the
//! slice passed in.

use crate::err::ParseError;

/// Read `N` raw bytes at `offset`.
///
/// Returns `None` if the range is out of bounds.
pub(crate) fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    let bytes: [u8; N] = buf.get(offset..end)?.try_into().ok()?;
    Some(bytes)
}

/// Read a `u16` (little-endian) at `offset`.
pub(crate) fn read_u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes(read_array::<2>(buf, offset)?))
}

/// Read a `u64` (little-endian) at `offset`.
pub(crate) fn read_u64_le(buf: &[u8], offset: usize) -> Option<u64> {
    Some(u64::from_le_bytes(read_array::<8>(buf, offset)?))
}

pub(crate) fn slice_r<'a>(
    buf: &'a [u8],
    offset: usize,
    len: usize,
    what: &str,
) -> Result<&'a [u8], ParseError> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| ParseError::truncated(what, offset, len, buf.len()))?;
    buf.get(offset..end)
        .ok_or_else(|| ParseError::truncated(what, offset, len, buf.len()))
}

/// Read `N` raw bytes at `offset`, or return `ParseError::Truncated`.
pub(crate) fn read_array_r<const N: usize>(
    buf: &[u8],
    offset: usize,
    what: &str,
) -> Result<[u8; N], ParseError> {
    read_array::<N>(buf, offset).ok_or_else(|| ParseError::truncated(what, offset, N, buf.len()))
}

/// Read a `u16` (little-endian) at `offset`, or return `ParseError::Truncated`.
pub(crate) fn read_u16_le_r(buf: &[u8], offset: usize, what: &str) -> Result<u16, ParseError> {
    read_u16_le(buf, offset).ok_or_else(|| ParseError::truncated(what, offset, 2, buf.len()))
}
