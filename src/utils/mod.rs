pub(crate) mod bytes;
mod hexdump;
mod utf16;
mod windows;

pub use self::hexdump::{HexdumpFormat, hexdump};
pub(crate) use self::utf16::{decode_utf16le_bytes, encode_utf16le, find_utf16le_nul};
pub(crate) use self::windows::filetime_to_timestamp;
pub use self::windows::timestamp_to_filetime;
