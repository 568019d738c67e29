//! US market-hours snapping of event timestamps.

use super::calendar::midnight;
use crate::store::Time;
use chrono::{Duration, NaiveTime, Timelike};
use chrono_tz::America::New_York;

/// Regular-session close in New York.
const MARKET_CLOSE_HOUR: u32 = 16;

/// The trading day an event at `time` first affects.
///
/// UTC-midnight timestamps are treated as already date-aligned. Anything else
/// counts for the same New York day when it happens before the close, and for
/// the next day otherwise.
pub fn market_bucket(time: Time) -> Time {
    if time.time() == NaiveTime::MIN {
        return time;
    }
    let local = time.with_timezone(&New_York);
    let date = local.date_naive();
    if local.hour() < MARKET_CLOSE_HOUR {
        midnight(date)
    } else {
        midnight(date) + Duration::days(1)
    }
}

/// The first market date on or after the bucket of `time`; `None` when the
/// bucket falls outside the market calendar.
pub fn snap_to_market(time: Time, market_dates: &[Time]) -> Option<Time> {
    let bucket = market_bucket(time);
    let first = *market_dates.first()?;
    if bucket < first {
        return None;
    }
    let idx = market_dates.partition_point(|d| *d < bucket);
    market_dates.get(idx).copied()
}
