#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Utf16LeDecodeError {
    OddLength,
    InvalidData,
}

impl Utf16LeDecodeError {
    pub(crate) fn message(self) -> &'static str {
        match self {
            Utf16LeDecodeError::OddLength => "odd number of bytes",
            Utf16LeDecodeError::InvalidData => "unpaired surrogate",
        }
    }
}

/// Index (in bytes) of the first NUL (0x0000) code unit, if present.
///
/// Only code-unit aligned positions are considered; a trailing odd byte is ignored.
pub(crate) fn find_utf16le_nul(bytes: &[u8]) -> Option<usize> {
    bytes
        .chunks_exact(2)
        .position(|c| c[0] == 0 && c[1] == 0)
        .map(|idx| idx * 2)
}

/// Decode a UTF-16LE byte slice (which must not contain the terminator).
pub(crate) fn decode_utf16le_bytes(bytes: &[u8]) -> Result<String, Utf16LeDecodeError> {
    if !bytes.len().is_multiple_of(2) {
        return Err(Utf16LeDecodeError::OddLength);
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    // Fast path: pure ASCII converts without surrogate handling.
    if units.iter().all(|&c| c <= 0x7F) {
        return Ok(units.iter().map(|&c| c as u8 as char).collect());
    }

    String::from_utf16(&units).map_err(|_| Utf16LeDecodeError::InvalidData)
}

pub(crate) fn encode_utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}
