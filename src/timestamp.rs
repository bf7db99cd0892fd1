use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

/// Format of `DateTimeOriginal` and friends in EXIF.
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

const AWARE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// An instant that may or may not carry a UTC offset.
///
/// Aware timestamps compare by instant, so `10:00+02:00` equals
/// `08:00Z`. Naive timestamps compare by wall clock. The two kinds never
/// compare with each other: [`Timestamp::ensure_comparable`] fails
/// instead of guessing a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timestamp {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl Timestamp {
    /// Parse an ISO-8601-like track timestamp, with or without zone.
    ///
    /// Seconds may be left out, and a bare date means midnight.
    pub fn parse_iso(text: &str) -> Result<Timestamp> {
        let text = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Ok(Timestamp::Aware(dt));
        }
        let zoned = match text.strip_suffix('Z') {
            Some(local) => format!("{}+00:00", local),
            None => text.to_string(),
        };
        for format in AWARE_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(&zoned, format) {
                return Ok(Timestamp::Aware(dt));
            }
        }
        for format in NAIVE_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
                return Ok(Timestamp::Naive(dt));
            }
        }
        if let Some(midnight) = NaiveDate::parse_from_str(text, DATE_FORMAT)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
        {
            return Ok(Timestamp::Naive(midnight));
        }
        Err(Error::InvalidTimestamp {
            value: text.to_string(),
        })
    }

    /// Parse an EXIF `YYYY:MM:DD HH:MM:SS` value, optionally paired with an
    /// `OffsetTime*` value such as `+02:00`.
    pub fn parse_exif(datetime: &str, offset: Option<&str>) -> Result<Timestamp> {
        let datetime = datetime.trim_end_matches(['\0', ' ']);
        let invalid = || Error::InvalidTimestamp {
            value: datetime.to_string(),
        };

        match offset.map(|o| o.trim_end_matches(['\0', ' '])) {
            Some(offset) if !offset.is_empty() => {
                let joined = format!("{} {}", datetime, offset);
                DateTime::parse_from_str(&joined, "%Y:%m:%d %H:%M:%S %:z")
                    .map(Timestamp::Aware)
                    .map_err(|_| invalid())
            }
            _ => NaiveDateTime::parse_from_str(datetime, EXIF_DATETIME_FORMAT)
                .map(Timestamp::Naive)
                .map_err(|_| invalid()),
        }
    }

    pub fn is_aware(&self) -> bool {
        matches!(self, Timestamp::Aware(_))
    }

    pub fn offset(&self) -> Option<FixedOffset> {
        match self {
            Timestamp::Aware(dt) => Some(*dt.offset()),
            Timestamp::Naive(_) => None,
        }
    }

    /// Attach `offset` to a naive timestamp. Aware timestamps, and naive
    /// ones when no offset is given, come back unchanged.
    pub fn with_default_offset(self, offset: Option<FixedOffset>) -> Timestamp {
        match (self, offset) {
            (Timestamp::Naive(naive), Some(offset)) => offset
                .from_local_datetime(&naive)
                .single()
                .map_or(self, Timestamp::Aware),
            _ => self,
        }
    }

    /// Wall clock for naive timestamps, UTC wall clock for aware ones.
    pub fn utc_or_local(&self) -> NaiveDateTime {
        match self {
            Timestamp::Aware(dt) => dt.naive_utc(),
            Timestamp::Naive(naive) => *naive,
        }
    }

    /// Total order within one kind. Only meaningful once both sides are
    /// known to share a kind, see [`Timestamp::ensure_comparable`].
    pub(crate) fn sort_key(&self) -> NaiveDateTime {
        self.utc_or_local()
    }

    pub fn ensure_comparable(&self, other: &Timestamp) -> Result<()> {
        if self.is_aware() == other.is_aware() {
            Ok(())
        } else {
            Err(Error::IncomparableTimestamps {
                left: self.to_string(),
                right: other.to_string(),
            })
        }
    }
}

pub(crate) fn abs_gap(a: NaiveDateTime, b: NaiveDateTime) -> Duration {
    let delta = a - b;
    if delta < Duration::zero() {
        -delta
    } else {
        delta
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Aware(dt) => write!(f, "{}", dt.to_rfc3339()),
            Timestamp::Naive(naive) => write!(f, "{}", naive.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
