//! Calendar generators. Every date is UTC midnight.

use crate::store::Time;
use chrono::{Datelike, NaiveDate, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub const ALL: [Frequency; 5] =
        [Frequency::Daily, Frequency::Weekly, Frequency::Monthly, Frequency::Quarterly, Frequency::Yearly];

    pub fn name(self) -> &'static str {
        match self {
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
            Frequency::Monthly => "Monthly",
            Frequency::Quarterly => "Quarterly",
            Frequency::Yearly => "Yearly",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name().eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalendarDates {
    pub dates: Vec<Time>,
    /// `begin` falls after the first day of its period.
    pub begin_incomplete: bool,
    /// The last period was cut short by `end`.
    pub end_incomplete: bool,
}

pub fn midnight(d: NaiveDate) -> Time {
    Utc.from_utc_datetime(&d.and_time(chrono::NaiveTime::MIN))
}

fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Last day of the month `months` months after (year, month).
fn month_end(year: i32, month: u32, months: u32) -> Option<NaiveDate> {
    let idx = year * 12 + (month as i32 - 1) + months as i32 + 1;
    let next = first_of_month(idx.div_euclid(12), idx.rem_euclid(12) as u32 + 1)?;
    next.pred_opt()
}

pub fn calendar_dates(freq: Frequency, begin: Time, end: Time) -> CalendarDates {
    let (b, e) = (begin.date_naive(), end.date_naive());
    if b > e {
        return CalendarDates::default();
    }
    match freq {
        Frequency::Daily => CalendarDates {
            dates: b.iter_days().take_while(|d| *d <= e).filter(|d| is_weekday(*d)).map(midnight).collect(),
            ..Default::default()
        },
        Frequency::Weekly => weekly(b, e),
        Frequency::Monthly => period_ends(b, e, 1),
        Frequency::Quarterly => period_ends(b, e, 3),
        Frequency::Yearly => period_ends(b, e, 12),
    }
}

fn is_weekday(d: NaiveDate) -> bool {
    !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Weeks run Saturday through Friday.
fn weekly(b: NaiveDate, e: NaiveDate) -> CalendarDates {
    let mut dates: Vec<Time> = b
        .iter_days()
        .take_while(|d| *d <= e)
        .filter(|d| d.weekday() == Weekday::Fri)
        .map(midnight)
        .collect();
    let end_incomplete = e.weekday() != Weekday::Fri;
    if end_incomplete {
        dates.push(midnight(e));
    }
    CalendarDates { dates, begin_incomplete: b.weekday() != Weekday::Sat, end_incomplete }
}

/// Ends of `months`-long periods aligned to the calendar year.
fn period_ends(b: NaiveDate, e: NaiveDate, months: u32) -> CalendarDates {
    let start_month = (b.month0() / months) * months + 1;
    let begin_incomplete = first_of_month(b.year(), start_month) != Some(b);

    let mut dates = Vec::new();
    let mut end_incomplete = false;
    let mut offset = months - 1;
    while let Some(pe) = month_end(b.year(), start_month, offset) {
        if pe >= e {
            end_incomplete = pe > e;
            dates.push(midnight(e));
            break;
        }
        dates.push(midnight(pe));
        offset += months;
    }
    CalendarDates { dates, begin_incomplete, end_incomplete }
}
