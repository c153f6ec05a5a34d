//! JSON lines representation of records, shared by `build` and `parse`.

use anyhow::{Context, Result, bail};
use etwrec::{
    EventHeader, FieldType, FieldValue, Guid, HeaderFlags, RawRecord, timestamp_to_filetime,
};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDocument {
    pub provider_id: Guid,
    pub event_id: u16,
    pub version: u8,
    #[serde(default)]
    pub opcode: u8,
    #[serde(default)]
    pub level: u8,
    #[serde(default)]
    pub task: u16,
    #[serde(default)]
    pub keywords: u64,
    #[serde(default)]
    pub process_id: u32,
    #[serde(default)]
    pub thread_id: u32,
    #[serde(default)]
    pub activity_id: Guid,
    /// FILETIME ticks.
    #[serde(default)]
    pub timestamp: u64,
    /// Hex encoded body, including a trailing stack region.
    pub body: String,
    /// Set when the body carries captured stack addresses after the user data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_body_length: Option<usize>,
}

impl RecordDocument {
    pub fn from_record(record: &RawRecord) -> Self {
        let header = record.header();
        RecordDocument {
            provider_id: header.provider_id,
            event_id: header.event_id,
            version: header.version,
            opcode: header.opcode,
            level: header.level,
            task: header.task,
            keywords: header.keywords,
            process_id: header.process_id,
            thread_id: header.thread_id,
            activity_id: header.activity_id,
            timestamp: header.timestamp,
            body: hex::encode(record.body()),
            declared_body_length: record
                .has_stack_trace()
                .then(|| record.declared_body_length()),
        }
    }

    pub fn into_record(self) -> Result<RawRecord> {
        let body = hex::decode(&self.body).context("record body is not valid hex")?;
        let mut header = EventHeader::new(self.provider_id, self.event_id, self.version);
        header.opcode = self.opcode;
        header.level = self.level;
        header.task = self.task;
        header.keywords = self.keywords;
        header.process_id = self.process_id;
        header.thread_id = self.thread_id;
        header.activity_id = self.activity_id;
        header.timestamp = self.timestamp;

        Ok(match self.declared_body_length {
            Some(declared) => {
                header.flags |= HeaderFlags::EXTENDED_INFO;
                RawRecord::with_stack_trace(header, body, declared)
            }
            None => RawRecord::new(header, body),
        })
    }
}

/// Reads every record of a JSON lines file, `-` reads stdin.
pub fn read_records(path: &str) -> Result<Vec<RawRecord>> {
    let reader: Box<dyn BufRead> = if path == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(path).with_context(|| format!("failed to open `{path}`"))?;
        Box::new(BufReader::new(file))
    };

    let mut records = vec![];
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {} of `{path}`", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: RecordDocument = serde_json::from_str(&line)
            .with_context(|| format!("line {} of `{path}` is not a record", idx + 1))?;
        records.push(
            doc.into_record()
                .with_context(|| format!("line {} of `{path}`", idx + 1))?,
        );
    }
    Ok(records)
}

/// Splits a `Name=Value` command line assignment.
pub fn split_assignment(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name, value)),
        _ => bail!("expected `Name=Value`, got `{raw}`"),
    }
}

fn parse_int<T>(text: &str) -> Result<T>
where
    T: TryFrom<i128>,
{
    let text = text.trim();
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16)?,
        None => text.parse::<i128>()?,
    };
    T::try_from(value).map_err(|_| anyhow::anyhow!("`{text}` is out of range"))
}

/// Interprets command line text as a value of the declared field type.
pub fn parse_literal(ty: FieldType, text: &str) -> Result<FieldValue> {
    let value = match ty {
        FieldType::Int8 => FieldValue::Int8(parse_int(text)?),
        FieldType::Int16 => FieldValue::Int16(parse_int(text)?),
        FieldType::Int32 => FieldValue::Int32(parse_int(text)?),
        FieldType::Int64 => FieldValue::Int64(parse_int(text)?),
        FieldType::UInt8 => FieldValue::UInt8(parse_int(text)?),
        FieldType::UInt16 => FieldValue::UInt16(parse_int(text)?),
        FieldType::UInt32 => FieldValue::UInt32(parse_int(text)?),
        FieldType::UInt64 => FieldValue::UInt64(parse_int(text)?),
        FieldType::HexInt32 => FieldValue::HexInt32(parse_int(text)?),
        FieldType::HexInt64 => FieldValue::HexInt64(parse_int(text)?),
        FieldType::Pointer => FieldValue::Pointer(parse_int(text)?),
        FieldType::Float32 => FieldValue::Float32(text.trim().parse()?),
        FieldType::Float64 => FieldValue::Float64(text.trim().parse()?),
        FieldType::Boolean => match text.trim() {
            "true" | "1" => FieldValue::Boolean(true),
            "false" | "0" => FieldValue::Boolean(false),
            other => bail!("`{other}` is not a boolean"),
        },
        FieldType::Guid => FieldValue::Guid(text.parse()?),
        FieldType::FileTime => match text.trim().parse::<Timestamp>() {
            Ok(ts) => FieldValue::FileTime(timestamp_to_filetime(ts)),
            Err(_) => FieldValue::FileTime(parse_int(text)?),
        },
        FieldType::AnsiString => FieldValue::AnsiString(text.to_owned()),
        FieldType::UnicodeString => FieldValue::UnicodeString(text.to_owned()),
        FieldType::RawBytes => FieldValue::Bytes(hex::decode(text.trim())?),
    };
    Ok(value)
}
