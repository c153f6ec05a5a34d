use std::iter::FusedIterator;
use std::slice::ChunksExact;

use log::warn;

use crate::etw_record::RawRecord;
use crate::utils::bytes;

/// Width of one captured return address.
pub const STACK_ENTRY_WIDTH: usize = 8;

/// Lazy sequence of return addresses stored in the tail of a record.
///
/// Each call to [`stack_trace`] starts over from the first address; iterators never share a
/// cursor. A record collected without stack capture yields an empty sequence.
#[derive(Debug, Clone)]
pub struct StackTrace<'a> {
    entries: ChunksExact<'a, u8>,
}

impl<'a> StackTrace<'a> {
    pub(crate) fn new(record: &'a RawRecord) -> Self {
        let region = record.stack_region().unwrap_or(&[]);
        let entries = region.chunks_exact(STACK_ENTRY_WIDTH);
        if !entries.remainder().is_empty() {
            warn!(
                "stack region of event {} has {} trailing byte(s) that do not form an address",
                record.event_id(),
                entries.remainder().len()
            );
        }
        StackTrace { entries }
    }
}

/// Return addresses captured with `record`, in capture order.
pub fn stack_trace(record: &RawRecord) -> StackTrace<'_> {
    StackTrace::new(record)
}

impl Iterator for StackTrace<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        self.entries
            .next()
            .and_then(|entry| bytes::read_u64_le(entry, 0))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl DoubleEndedIterator for StackTrace<'_> {
    fn next_back(&mut self) -> Option<u64> {
        self.entries
            .next_back()
            .and_then(|entry| bytes::read_u64_le(entry, 0))
    }
}

impl ExactSizeIterator for StackTrace<'_> {}

impl FusedIterator for StackTrace<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etw_record::EventHeader;
    use crate::guid::Guid;
    use pretty_assertions::assert_eq;

    fn record_with_tail(user_data: &[u8], tail: &[u8]) -> RawRecord {
        let mut body = user_data.to_vec();
        body.extend_from_slice(tail);
        RawRecord::with_stack_trace(EventHeader::new(Guid::nil(), 1, 0), body, user_data.len())
    }

    #[test]
    fn test_no_capture_yields_nothing() {
        let record = RawRecord::new(EventHeader::new(Guid::nil(), 1, 0), vec![0; 24]);
        assert_eq!(stack_trace(&record).count(), 0);
    }

    #[test]
    fn test_partial_entry_is_ignored() {
        let mut tail = 0x1000u64.to_le_bytes().to_vec();
        tail.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        let record = record_with_tail(&[1, 2], &tail);

        let addresses: Vec<u64> = stack_trace(&record).collect();
        assert_eq!(addresses, vec![0x1000]);
        assert_eq!(stack_trace(&record).len(), 1);
    }

    #[test]
    fn test_reverse_order_for_outermost_first() {
        let tail: Vec<u8> = [1u64, 2, 3].iter().flat_map(|a| a.to_le_bytes()).collect();
        let record = record_with_tail(&[], &tail);
        let reversed: Vec<u64> = stack_trace(&record).rev().collect();
        assert_eq!(reversed, vec![3, 2, 1]);
    }
}
