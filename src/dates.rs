use chrono::{Local, Offset, TimeZone, Utc};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MINUTE_MILLIS: i64 = 60 * 1000;
pub const HOUR_MILLIS: i64 = 60 * MINUTE_MILLIS;
pub const DAY_MILLIS: i64 = 24 * HOUR_MILLIS;
pub const WEEK_MILLIS: i64 = 7 * DAY_MILLIS;

/// An instant in time, stored as milliseconds since the Unix epoch.
///
/// Two sentinel values carry domain meaning: [`Timestamp::NEVER`] marks a
/// completion that will not be reached, and [`Timestamp::LONG_AGO`] sorts
/// before any real schedule activity. Sentinels are detected by equality,
/// never by range comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const NEVER: Timestamp = Timestamp(i64::MAX);
    pub const LONG_AGO: Timestamp = Timestamp(0);

    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_millis())
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    pub fn is_never(self) -> bool {
        self == Timestamp::NEVER
    }

    pub fn is_long_ago(self) -> bool {
        self == Timestamp::LONG_AGO
    }

    pub fn is_sentinel(self) -> bool {
        self.is_never() || self.is_long_ago()
    }

    pub fn plus_millis(self, delta: i64) -> Self {
        Timestamp(self.0.saturating_add(delta))
    }

    /// Convert to a chrono instant; sentinels and values chrono cannot
    /// represent come back as `None`.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        if self.is_sentinel() {
            return None;
        }
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            write!(f, "<never>")
        } else if self.is_long_ago() {
            write!(f, "<long ago>")
        } else {
            match self.to_datetime() {
                Some(dt) => write!(f, "{}", dt.to_rfc3339()),
                None => write!(f, "@{}", self.0),
            }
        }
    }
}

/// Render an optional date in the wire format: `@<epoch-millis>`, with
/// `@0` for the long-ago sentinel and `@<i64::MAX>` for never. A missing
/// date renders as the empty string.
pub fn format_date(date: Option<Timestamp>) -> String {
    match date {
        None => String::new(),
        Some(t) => format!("@{}", t.millis()),
    }
}

pub fn parse_date(text: &str) -> Option<Timestamp> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let digits = trimmed.strip_prefix('@').unwrap_or(trimmed);
    digits.parse::<i64>().ok().map(Timestamp::from_millis)
}

/// Milliseconds gained or lost when moving between two instants that may
/// straddle a daylight-saving transition. Positive when the first instant
/// carries the larger UTC offset. Used so that period boundaries keep
/// exact wall-clock spacing across DST changes.
pub fn dst_difference(first: Timestamp, second: Timestamp) -> i64 {
    local_offset_millis(first) - local_offset_millis(second)
}

fn local_offset_millis(t: Timestamp) -> i64 {
    match t.to_datetime() {
        Some(dt) => {
            let offset = Local.offset_from_utc_datetime(&dt.naive_utc());
            offset.fix().local_minus_utc() as i64 * 1000
        }
        None => 0,
    }
}

/// Earliest of two optional dates; a missing side never wins.
pub fn min_start_date(a: Option<Timestamp>, b: Option<Timestamp>) -> Option<Timestamp> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => Some(a.min(b)),
    }
}

/// Latest of two optional dates; a missing side never wins.
pub fn max_plan_date(a: Option<Timestamp>, b: Option<Timestamp>) -> Option<Timestamp> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => Some(a.max(b)),
    }
}

/// Latest of two optional dates, where a missing side poisons the result:
/// a forecast is only as good as its least-known component.
pub fn max_forecast_date(a: Option<Timestamp>, b: Option<Timestamp>) -> Option<Timestamp> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}

pub fn bad_double(value: f64) -> bool {
    value.is_nan() || value.is_infinite()
}

/// A date within one day of either end of the representable range is the
/// product of sentinel arithmetic, not a real calendar date.
pub fn bad_date(t: Timestamp) -> bool {
    t.millis() < DAY_MILLIS || t.millis() > i64::MAX - DAY_MILLIS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_survive_the_wire_format() {
        assert_eq!(parse_date(&format_date(Some(Timestamp::NEVER))), Some(Timestamp::NEVER));
        assert_eq!(parse_date(&format_date(Some(Timestamp::LONG_AGO))), Some(Timestamp::LONG_AGO));
        assert_eq!(parse_date(&format_date(None)), None);
        assert_eq!(parse_date("@1700000000000"), Some(Timestamp::from_millis(1_700_000_000_000)));
    }

    #[test]
    fn sentinel_detection_is_by_equality() {
        assert!(Timestamp::NEVER.is_never());
        assert!(Timestamp::LONG_AGO.is_long_ago());
        assert!(!Timestamp::from_millis(1).is_sentinel());
        assert!(bad_date(Timestamp::from_millis(1)));
        assert!(!bad_date(Timestamp::from_millis(2 * DAY_MILLIS)));
    }

    #[test]
    fn date_folds_honor_missing_sides() {
        let a = Some(Timestamp::from_millis(10));
        let b = Some(Timestamp::from_millis(20));
        assert_eq!(min_start_date(a, b), a);
        assert_eq!(min_start_date(None, b), b);
        assert_eq!(max_plan_date(a, None), a);
        assert_eq!(max_plan_date(a, b), b);
        assert_eq!(max_forecast_date(a, None), None);
        assert_eq!(max_forecast_date(a, b), b);
    }
}
