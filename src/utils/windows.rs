use jiff::Timestamp;

const WINDOWS_TO_UNIX_SECS: i64 = 11_644_473_600;
const TICKS_PER_SEC: u64 = 10_000_000;

/// Convert a FILETIME (100ns ticks since 1601-01-01 UTC) into a [`Timestamp`].
///
/// Returns `None` when the value is outside of the range `jiff` can represent.
#[inline]
pub(crate) fn filetime_to_timestamp(filetime: u64) -> Option<Timestamp> {
    let secs = (filetime / TICKS_PER_SEC) as i64 - WINDOWS_TO_UNIX_SECS;
    let nanos = ((filetime % TICKS_PER_SEC) * 100) as i32;
    Timestamp::new(secs, nanos).ok()
}

/// Convert a [`Timestamp`] into a FILETIME, clamping instants before 1601 to zero.
pub fn timestamp_to_filetime(ts: Timestamp) -> u64 {
    let ticks = ts.as_nanosecond().div_euclid(100)
        + i128::from(WINDOWS_TO_UNIX_SECS) * i128::from(TICKS_PER_SEC);
    u64::try_from(ticks.max(0)).unwrap_or(u64::MAX)
}
