use bitflags::bitflags;
use jiff::Timestamp;
use log::warn;

use crate::err::ParseResult;
use crate::guid::Guid;
use crate::stack_trace::StackTrace;
use crate::utils::{bytes, filetime_to_timestamp};
use crate::value::FixedWidth;

bitflags! {
    /// `EVENT_HEADER_FLAG_*` values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HeaderFlags: u16 {
        const EXTENDED_INFO = 0x0001;
        const PRIVATE_SESSION = 0x0002;
        const STRING_ONLY = 0x0004;
        const TRACE_MESSAGE = 0x0008;
        const NO_CPUTIME = 0x0010;
        const HEADER_32_BIT = 0x0020;
        const HEADER_64_BIT = 0x0040;
        const CLASSIC_HEADER = 0x0100;
        const PROCESSOR_INDEX = 0x0200;
    }
}

/// Fixed metadata delivered alongside every record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventHeader {
    pub provider_id: Guid,
    pub event_id: u16,
    pub version: u8,
    pub opcode: u8,
    pub level: u8,
    pub task: u16,
    pub keywords: u64,
    pub process_id: u32,
    pub thread_id: u32,
    pub activity_id: Guid,
    pub flags: HeaderFlags,
    /// FILETIME (100ns ticks since 1601-01-01 UTC).
    pub timestamp: u64,
}

impl EventHeader {
    pub fn new(provider_id: Guid, event_id: u16, version: u8) -> Self {
        EventHeader {
            provider_id,
            event_id,
            version,
            flags: HeaderFlags::HEADER_64_BIT,
            ..EventHeader::default()
        }
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        filetime_to_timestamp(self.timestamp)
    }
}

/// One record: header metadata plus an owned, immutable body.
///
/// When a stack trace was captured the body carries a trailing region of 8-byte return
/// addresses after the declared user data. Field parsing only ever sees the declared part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    header: EventHeader,
    body: Box<[u8]>,
    user_data_len: usize,
    stack_captured: bool,
}

impl RawRecord {
    pub fn new(header: EventHeader, body: Vec<u8>) -> Self {
        let user_data_len = body.len();
        RawRecord {
            header,
            body: body.into_boxed_slice(),
            user_data_len,
            stack_captured: false,
        }
    }

    /// A record whose body holds `declared_body_length` bytes of user data followed by the
    /// captured stack addresses.
    pub fn with_stack_trace(header: EventHeader, body: Vec<u8>, declared_body_length: usize) -> Self {
        let user_data_len = if declared_body_length > body.len() {
            warn!(
                "declared body length {} exceeds body of {} bytes for event {}, no stack region",
                declared_body_length,
                body.len(),
                header.event_id
            );
            body.len()
        } else {
            declared_body_length
        };

        RawRecord {
            header,
            body: body.into_boxed_slice(),
            user_data_len,
            stack_captured: true,
        }
    }

    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    pub fn event_id(&self) -> u16 {
        self.header.event_id
    }

    pub fn version(&self) -> u8 {
        self.header.version
    }

    pub fn opcode(&self) -> u8 {
        self.header.opcode
    }

    pub fn provider_id(&self) -> &Guid {
        &self.header.provider_id
    }

    pub fn keywords(&self) -> u64 {
        self.header.keywords
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.header.timestamp()
    }

    /// The complete body, including a stack region if one was captured.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The declared user data, which is what field layouts describe.
    pub fn user_data(&self) -> &[u8] {
        &self.body[..self.user_data_len]
    }

    pub fn declared_body_length(&self) -> usize {
        self.user_data_len
    }

    pub fn has_stack_trace(&self) -> bool {
        self.stack_captured
    }

    /// Bytes trailing the declared user data, if stack capture was enabled.
    pub fn stack_region(&self) -> Option<&[u8]> {
        self.stack_captured.then(|| &self.body[self.user_data_len..])
    }

    /// Captured return addresses, innermost frame first.
    pub fn stack_trace(&self) -> StackTrace<'_> {
        StackTrace::new(self)
    }

    /// Position based read of a fixed-width value from the user data, for events without a
    /// registered layout (e.g. WPP traces).
    pub fn read_at<T: FixedWidth>(&self, offset: usize) -> ParseResult<T> {
        let what = T::FIELD_TYPE.as_str();
        let raw = bytes::slice_r(self.user_data(), offset, T::width(), what)?;
        T::read_le(raw, what)
    }

    /// Position based read of raw bytes from the user data.
    pub fn bytes_at(&self, offset: usize, len: usize) -> ParseResult<&[u8]> {
        bytes::slice_r(self.user_data(), offset, len, "bytes")
    }
}

impl From<RawRecord> for (EventHeader, Vec<u8>) {
    fn from(record: RawRecord) -> Self {
        (record.header, record.body.into_vec())
    }
}
