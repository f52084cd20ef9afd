//! NASDAQ trading calendar.
//!
//! Open days are computed from the exchange's holiday rules plus a short
//! table of one-off closures. Dates are plain [`NaiveDate`]s with no time
//! zone attached.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;
use tracing::debug;

/// Unscheduled full-day closures (national days of mourning, weather).
const SPECIAL_CLOSURES: &[(i32, u32, u32)] = &[
    (2001, 9, 11),
    (2001, 9, 12),
    (2001, 9, 13),
    (2001, 9, 14),
    (2004, 6, 11),
    (2007, 1, 2),
    (2012, 10, 29),
    (2012, 10, 30),
    (2018, 12, 5),
    (2025, 1, 9),
];

/// Set of market-open dates within an inclusive range.
#[derive(Debug, Clone, Default)]
pub struct TradingCalendar {
    open_days: BTreeSet<NaiveDate>,
}

impl TradingCalendar {
    /// Build the NASDAQ calendar for `start..=end`.
    pub fn nasdaq(start: NaiveDate, end: NaiveDate) -> Self {
        let open_days: BTreeSet<NaiveDate> = start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| is_nasdaq_open(*d))
            .collect();
        debug!(%start, %end, open_days = open_days.len(), "Computed trading calendar");
        Self { open_days }
    }

    /// Calendar over an explicit set of dates.
    pub fn from_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            open_days: dates.into_iter().collect(),
        }
    }

    pub fn is_open(&self, date: NaiveDate) -> bool {
        self.open_days.contains(&date)
    }

    pub fn len(&self) -> usize {
        self.open_days.len()
    }
}

/// Whether NASDAQ holds a regular session on `date`.
pub fn is_nasdaq_open(date: NaiveDate) -> bool {
    if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    if SPECIAL_CLOSURES
        .iter()
        .any(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d) == Some(date))
    {
        return false;
    }
    !holidays(date.year()).contains(&date)
}

/// Observed exchange holidays for `year`.
fn holidays(year: i32) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(10);

    // New Year's Day: Sunday moves to Monday, Saturday is not observed.
    if let Some(jan1) = NaiveDate::from_ymd_opt(year, 1, 1) {
        match jan1.weekday() {
            Weekday::Sun => days.push(jan1 + Duration::days(1)),
            Weekday::Sat => {}
            _ => days.push(jan1),
        }
    }
    if year >= 1998 {
        days.extend(nth_weekday(year, 1, Weekday::Mon, 3));
    }
    days.extend(nth_weekday(year, 2, Weekday::Mon, 3));
    if let Some(easter) = easter_sunday(year) {
        days.push(easter - Duration::days(2));
    }
    days.extend(last_weekday(year, 5, Weekday::Mon));
    if year >= 2022 {
        days.extend(nearest_workday(year, 6, 19));
    }
    days.extend(nearest_workday(year, 7, 4));
    days.extend(nth_weekday(year, 9, Weekday::Mon, 1));
    days.extend(nth_weekday(year, 11, Weekday::Thu, 4));
    days.extend(nearest_workday(year, 12, 25));
    days
}

/// Saturday holidays are observed on Friday, Sunday holidays on Monday.
fn nearest_workday(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    })
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n as u8)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let mut date = first_of_next.pred_opt()?;
    while date.weekday() != weekday {
        date = date.pred_opt()?;
    }
    Some(date)
}

/// Gregorian Easter Sunday (anonymous algorithm).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}
