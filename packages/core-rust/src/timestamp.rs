//! SQL TIMESTAMP value: a validated microsecond-resolution instant.
//!
//! `VoltGrid` stores timestamps as microseconds since the Unix epoch in a
//! signed 64-bit integer, restricted to the proleptic Gregorian window
//! `[1583-01-01 00:00:00.000000, 9999-12-31 23:59:59.999999]` UTC. A single
//! distinguished sentinel (`i64::MIN`) denotes SQL NULL and is the only
//! representable value outside that window.
//!
//! # Wire format
//!
//! Timestamps serialize as the raw `i64` microsecond value so the sentinel
//! survives round-trips unchanged. The canonical string rendering is
//! `YYYY-MM-DD HH:MM:SS.uuuuuu` in UTC with six fractional digits.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Microseconds for `1583-01-01 00:00:00.000000` UTC, the earliest valid instant.
pub const MIN_VALID_MICROS: i64 = -12_212_553_600_000_000;

/// Microseconds for `9999-12-31 23:59:59.999999` UTC, the latest valid instant.
pub const MAX_VALID_MICROS: i64 = 253_402_300_799_999_999;

/// The NULL sentinel. The only value outside the valid window a timestamp may hold.
pub const NULL_MICROS: i64 = i64::MIN;

/// Accepted input shapes: `YYYY-MM-DD`, optionally followed by
/// ` HH:MM:SS` and a dot-fraction. The year is exactly four digits; a
/// five-digit year must fail as a format error, not a range error.
static TIMESTAMP_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([0-9]{4})-([0-9]{2})-([0-9]{2})(?: ([0-9]{2}):([0-9]{2}):([0-9]{2})(?:\.([0-9]+))?)?$",
    )
    .expect("timestamp shape regex is valid")
});

/// Errors from timestamp construction and projection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    /// Value outside `[MIN_VALID_MICROS, MAX_VALID_MICROS]` and not the sentinel.
    #[error("timestamp {micros}us is outside the valid range [1583-01-01, 9999-12-31]")]
    OutOfRange { micros: i64 },
    /// Input does not match any accepted string shape (includes 5-digit years
    /// and impossible calendar dates).
    #[error("invalid timestamp format: {input:?}")]
    Format { input: String },
    /// More than six fractional digits: finer than microsecond resolution.
    #[error("timestamp {input:?} has sub-microsecond precision")]
    SubMicrosecond { input: String },
    /// Projection to a millisecond instant would lose a non-zero microsecond part.
    #[error("timestamp {micros}us has a non-zero sub-millisecond component")]
    NonZeroSubMillisecond { micros: i64 },
    /// Projection of the NULL sentinel to an instant.
    #[error("cannot convert the NULL timestamp to an instant")]
    NullConversion,
}

/// A SQL TIMESTAMP: microseconds since the Unix epoch, or the NULL sentinel.
///
/// Immutable once constructed; every constructor path validates the window.
/// Ordering and equality are defined on the raw microsecond integer, which
/// places NULL before every valid instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct SqlTimestamp {
    micros: i64,
}

impl SqlTimestamp {
    /// Constructs from microseconds since the Unix epoch.
    ///
    /// Accepts the NULL sentinel (`i64::MIN`) unchanged.
    ///
    /// # Errors
    ///
    /// [`TimestampError::OutOfRange`] for any other value outside the window.
    pub fn from_micros(micros: i64) -> Result<Self, TimestampError> {
        if micros == NULL_MICROS || (MIN_VALID_MICROS..=MAX_VALID_MICROS).contains(&micros) {
            Ok(Self { micros })
        } else {
            Err(TimestampError::OutOfRange { micros })
        }
    }

    /// Constructs from an instant at millisecond resolution.
    ///
    /// The instant's sub-millisecond part is discarded; the resulting
    /// timestamp has a zero microsecond sub-part.
    ///
    /// # Errors
    ///
    /// [`TimestampError::OutOfRange`] if the scaled value falls outside the window.
    pub fn from_datetime(instant: DateTime<Utc>) -> Result<Self, TimestampError> {
        Self::from_micros(instant.timestamp_millis() * 1000)
    }

    /// The NULL timestamp.
    #[must_use]
    pub fn null() -> Self {
        Self { micros: NULL_MICROS }
    }

    /// The earliest valid timestamp, `1583-01-01 00:00:00.000000` UTC.
    #[must_use]
    pub fn min() -> Self {
        Self { micros: MIN_VALID_MICROS }
    }

    /// The latest valid timestamp, `9999-12-31 23:59:59.999999` UTC.
    #[must_use]
    pub fn max() -> Self {
        Self { micros: MAX_VALID_MICROS }
    }

    /// Raw microseconds since the Unix epoch (the sentinel for NULL).
    #[must_use]
    pub fn micros(&self) -> i64 {
        self.micros
    }

    /// Whether this is the NULL sentinel.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.micros == NULL_MICROS
    }

    /// Projects to a millisecond-resolution instant.
    ///
    /// # Errors
    ///
    /// [`TimestampError::NullConversion`] for NULL;
    /// [`TimestampError::NonZeroSubMillisecond`] if truncation would lose
    /// a microsecond remainder.
    pub fn to_datetime(&self) -> Result<DateTime<Utc>, TimestampError> {
        if self.is_null() {
            return Err(TimestampError::NullConversion);
        }
        if self.micros % 1000 != 0 {
            return Err(TimestampError::NonZeroSubMillisecond { micros: self.micros });
        }
        DateTime::from_timestamp_millis(self.micros / 1000)
            .ok_or(TimestampError::OutOfRange { micros: self.micros })
    }

    /// Canonical UTC rendering: `YYYY-MM-DD HH:MM:SS.uuuuuu`, always six
    /// fractional digits. NULL renders as `"NULL"`.
    #[must_use]
    pub fn to_string_gmt(&self) -> String {
        if self.is_null() {
            return "NULL".to_string();
        }
        let instant = DateTime::from_timestamp_micros(self.micros)
            .expect("validated timestamp is within chrono's range");
        instant.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

impl FromStr for SqlTimestamp {
    type Err = TimestampError;

    /// Parses `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, or
    /// `YYYY-MM-DD HH:MM:SS.f{1..6}`. Date-only input defaults to midnight.
    ///
    /// # Errors
    ///
    /// [`TimestampError::Format`] for unrecognized shapes, five-digit years,
    /// and impossible calendar dates; [`TimestampError::SubMicrosecond`] for
    /// more than six fractional digits; [`TimestampError::OutOfRange`] for
    /// well-formed instants outside the window.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let caps = TIMESTAMP_SHAPE
            .captures(input)
            .ok_or_else(|| TimestampError::Format { input: input.to_string() })?;

        let field = |i: usize| caps.get(i).map_or("0", |m| m.as_str());
        let num = |i: usize| -> u32 {
            // The shape regex guarantees these are short digit runs.
            field(i).parse().expect("digit group parses as u32")
        };

        let micros_frac = match caps.get(7) {
            None => 0,
            Some(frac) => {
                let digits = frac.as_str();
                if digits.len() > 6 {
                    return Err(TimestampError::SubMicrosecond { input: input.to_string() });
                }
                let scale = 10_u32.pow(6 - u32::try_from(digits.len()).expect("len <= 6"));
                digits.parse::<u32>().expect("fraction parses as u32") * scale
            }
        };

        let year = i32::try_from(num(1)).expect("four-digit year fits i32");
        let date = NaiveDate::from_ymd_opt(year, num(2), num(3))
            .ok_or_else(|| TimestampError::Format { input: input.to_string() })?;
        let instant = date
            .and_hms_micro_opt(num(4), num(5), num(6), micros_frac)
            .ok_or_else(|| TimestampError::Format { input: input.to_string() })?;

        Self::from_micros(instant.and_utc().timestamp_micros())
    }
}

impl fmt::Display for SqlTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_gmt())
    }
}

impl Ord for SqlTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.micros.cmp(&other.micros)
    }
}

impl PartialOrd for SqlTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<i64> for SqlTimestamp {
    type Error = TimestampError;

    fn try_from(micros: i64) -> Result<Self, Self::Error> {
        Self::from_micros(micros)
    }
}

impl From<SqlTimestamp> for i64 {
    fn from(ts: SqlTimestamp) -> i64 {
        ts.micros
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
