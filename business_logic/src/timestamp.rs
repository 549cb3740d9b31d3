use arrayvec::ArrayString;
use core::fmt::{self, Write};

/// Durations are carried as plain milliseconds.
pub type Millis = u64;

pub const MILLIS_PER_SECOND: Millis = 1_000;
pub const MILLIS_PER_MINUTE: Millis = 60 * MILLIS_PER_SECOND;
pub const MILLIS_PER_HOUR: Millis = 60 * MILLIS_PER_MINUTE;
pub const MILLIS_PER_DAY: Millis = 24 * MILLIS_PER_HOUR;

/// A point on the plant's monotonic clock, in milliseconds since the clock epoch.
///
/// The engine never reads a clock itself. Every time-dependent call takes the
/// current `Timestamp` from the host, so tests can drive time directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timestamp {
    pub millis: Millis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimestampError {
    /// The supplied timestamp is earlier than one already processed.
    OutOfOrder,
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::OutOfOrder => f.write_str("timestamp is earlier than the last one processed"),
        }
    }
}

impl Timestamp {
    pub const fn from_millis(millis: Millis) -> Self {
        Self { millis }
    }

    pub const fn from_secs(seconds: u64) -> Self {
        Self { millis: seconds.saturating_mul(MILLIS_PER_SECOND) }
    }

    pub const fn seconds(&self) -> u64 {
        self.millis / MILLIS_PER_SECOND
    }

    /// Milliseconds from `earlier` to `self`, zero if `earlier` is in the future.
    pub const fn elapsed_since(&self, earlier: Timestamp) -> Millis {
        self.millis.saturating_sub(earlier.millis)
    }

    /// True when at least `period` has passed since `since`. A missing
    /// reference point counts as "long ago".
    pub fn has_elapsed(&self, since: Option<Timestamp>, period: Millis) -> bool {
        match since {
            Some(since) => self.elapsed_since(since) >= period,
            None => true,
        }
    }

    pub const fn saturating_add(&self, period: Millis) -> Timestamp {
        Timestamp { millis: self.millis.saturating_add(period) }
    }

    /// Create an ISO 8601 Duration string (whole seconds).
    pub fn create_iso8601_str(&self) -> ArrayString<32> {
        let (days, hours, minutes, remaining_seconds) = self.to_dhms();
        let mut result = ArrayString::<32>::new();
        // 32 bytes holds the longest u64 millisecond duration, so writes cannot fail.
        if days > 0 {
            let _ = write!(&mut result, "P{}D", days);
        } else {
            result.push_str("P0D");
        }
        if hours > 0 || minutes > 0 || remaining_seconds > 0 {
            let _ = write!(&mut result, "T{}H{}M{}S", hours, minutes, remaining_seconds);
        } else {
            result.push_str("T0S");
        }
        result
    }

    /// Splits the timestamp into days, hours, minutes, and seconds.
    pub fn to_dhms(&self) -> (u64, u64, u64, u64) {
        let seconds = self.seconds();
        let days = seconds / 86400;
        let seconds_of_day = seconds % 86400;
        let hours = seconds_of_day / 3600;
        let minutes = seconds_of_day % 3600 / 60;
        (days, hours, minutes, seconds_of_day % 60)
    }
}
