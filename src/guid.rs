use std::fmt::{self, Debug, Display, Write};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("`{input}` is not a GUID in registry format (XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX)")]
pub struct InvalidGuid {
    input: String,
}

/// A provider/activity GUID, laid out in memory exactly as Windows does
/// (`data1..data3` little-endian, `data4` as raw bytes).
#[derive(PartialOrd, Ord, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct Guid {
    data1: u32,
    data2: u16,
    data3: u16,
    data4: [u8; 8],
}

impl Guid {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Guid {
        Guid {
            data1,
            data2,
            data3,
            data4,
        }
    }

    pub const fn nil() -> Guid {
        Guid::new(0, 0, 0, [0; 8])
    }

    pub fn from_bytes(bytes: &[u8; 16]) -> Guid {
        let mut data4 = [0; 8];
        data4.copy_from_slice(&bytes[8..16]);
        Guid {
            data1: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            data2: u16::from_le_bytes([bytes[4], bytes[5]]),
            data3: u16::from_le_bytes([bytes[6], bytes[7]]),
            data4,
        }
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0; 16];
        out[0..4].copy_from_slice(&self.data1.to_le_bytes());
        out[4..6].copy_from_slice(&self.data2.to_le_bytes());
        out[6..8].copy_from_slice(&self.data3.to_le_bytes());
        out[8..16].copy_from_slice(&self.data4);
        out
    }

    fn format(&self) -> String {
        // Using `format!` will extend the string multiple time,
        // but we know ahead of time how much space we need.
        let mut s = String::with_capacity(36);

        let _ = write!(
            &mut s,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        );

        s
    }
}

impl FromStr for Guid {
    type Err = InvalidGuid;

    /// Accepts `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`, optionally wrapped in braces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidGuid {
            input: s.to_owned(),
        };

        let trimmed = s.trim();
        let inner = match (trimmed.strip_prefix('{'), trimmed.strip_suffix('}')) {
            (Some(_), Some(_)) => &trimmed[1..trimmed.len() - 1],
            (None, None) => trimmed,
            _ => return Err(invalid()),
        };

        let groups: Vec<&str> = inner.split('-').collect();
        if groups.len() != 5
            || [8, 4, 4, 4, 12]
                .iter()
                .zip(&groups)
                .any(|(len, g)| g.len() != *len || !g.bytes().all(|b| b.is_ascii_hexdigit()))
        {
            return Err(invalid());
        }

        let data1 = u32::from_str_radix(groups[0], 16).map_err(|_| invalid())?;
        let data2 = u16::from_str_radix(groups[1], 16).map_err(|_| invalid())?;
        let data3 = u16::from_str_radix(groups[2], 16).map_err(|_| invalid())?;

        let tail = format!("{}{}", groups[3], groups[4]);
        let mut data4 = [0; 8];
        for (i, byte) in data4.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&tail[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }

        Ok(Guid::new(data1, data2, data3, data4))
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.format())
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parses_registry_format() {
        let guid: Guid = "{199FE037-2B82-40A9-82AC-E1D46C792B99}".parse().unwrap();
        assert_eq!(guid.to_string(), "199FE037-2B82-40A9-82AC-E1D46C792B99");

        let lower: Guid = "199fe037-2b82-40a9-82ac-e1d46c792b99".parse().unwrap();
        assert_eq!(guid, lower);
    }

    #[test]
    fn test_byte_layout_is_little_endian() {
        let guid: Guid = "A0C1853B-5C40-4B15-8766-3CF1C58F985A".parse().unwrap();
        let bytes = guid.to_bytes();
        assert_eq!(&bytes[..4], &[0x3B, 0x85, 0xC1, 0xA0]);
        assert_eq!(&bytes[8..], &[0x87, 0x66, 0x3C, 0xF1, 0xC5, 0x8F, 0x98, 0x5A]);
        assert_eq!(Guid::from_bytes(&bytes), guid);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!("not-a-guid".parse::<Guid>().is_err());
        assert!("{199FE037-2B82-40A9-82AC-E1D46C792B99".parse::<Guid>().is_err());
        assert!("199FE037-2B82-40A9-82AC-E1D46C792B9Z".parse::<Guid>().is_err());
    }
}
