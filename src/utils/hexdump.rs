use std::cmp;
use std::fmt::Write;

/// Display modes, mirroring `hexdump(1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HexdumpFormat {
    /// One-byte octal display.
    Octal,
    /// Canonical hex display: sixteen two-column hex bytes, followed by their printable form.
    #[default]
    Canonical,
    /// Two-byte hexadecimal display.
    Words,
}

impl HexdumpFormat {
    fn bytes_per_word(self) -> usize {
        match self {
            HexdumpFormat::Octal | HexdumpFormat::Canonical => 1,
            HexdumpFormat::Words => 2,
        }
    }

    fn column_width(self) -> usize {
        match self {
            HexdumpFormat::Octal => 4,
            HexdumpFormat::Canonical => 3,
            HexdumpFormat::Words => 5,
        }
    }
}

/// Renders `data` as a hexdump, one line per 16 bytes, addresses starting at `offset`.
pub fn hexdump(data: &[u8], offset: usize, format: HexdumpFormat) -> String {
    let mut out = String::with_capacity(data.len() * 5);
    let mut address = 0;

    while address < data.len() {
        let end = cmp::min(address + 16, data.len());
        write_line(&mut out, &data[address..end], address + offset, format);
        address += 16;
    }

    out
}

fn write_line(out: &mut String, line: &[u8], address: usize, format: HexdumpFormat) {
    let _ = write!(out, "{:08x}:", address);

    let bytes = format.bytes_per_word();
    let words = line.len().div_ceil(bytes);

    for b in 0..words {
        let word = match bytes {
            1 => u16::from(line[b]),
            _ => {
                let lo = line[bytes * b];
                let hi = line.get(bytes * b + 1).copied().unwrap_or(0);
                u16::from_le_bytes([lo, hi])
            }
        };
        let _ = match format {
            HexdumpFormat::Octal => write!(out, " {:03o}", word),
            HexdumpFormat::Canonical => write!(out, " {:02x}", word),
            HexdumpFormat::Words => write!(out, " {:04x}", word),
        };
    }

    if line.len() < 16 {
        // align
        let words_left = (16 - line.len()) / bytes;
        for _ in 0..format.column_width() * words_left {
            out.push(' ');
        }
    }

    out.push_str("  ");
    for c in line {
        // replace all control chars with dots
        match (*c as char).is_control() || !c.is_ascii() {
            true => out.push('.'),
            false => out.push(*c as char),
        }
    }
    out.push('\n');
}
