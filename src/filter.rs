//! Date-window, trading-day, and duplicate filtering.
//!
//! The same checks run twice per entry: once on the aggregator's metadata
//! before any resolution work, and once on the extracted article, whose
//! publish time can differ from what the feed reported.

use crate::calendar::TradingCalendar;
use crate::models::SkipReason;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashSet;

/// Inclusive timestamp range accepted for one target day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateWindow {
    /// `[day 00:00 - tolerance, day 23:59:59.999999 + tolerance]`
    pub fn around(day: NaiveDate, tolerance: Duration) -> Self {
        let start = day.and_time(NaiveTime::MIN) - tolerance;
        let end_of_day = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
        let end = day.and_time(end_of_day) + tolerance;
        Self { start, end }
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Window and trading-day check shared by both filter passes.
pub fn check_date(
    ts: NaiveDateTime,
    window: &DateWindow,
    calendar: &TradingCalendar,
) -> Result<(), SkipReason> {
    if !window.contains(ts) {
        return Err(SkipReason::OutsideWindow);
    }
    if !calendar.is_open(ts.date()) {
        return Err(SkipReason::MarketClosed);
    }
    Ok(())
}

/// Titles and links already accepted during one ticker's run.
#[derive(Debug, Default)]
pub struct SeenSets {
    links: HashSet<String>,
    titles: HashSet<String>,
}

impl SeenSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregator-stage check. Records both title and link on success.
    pub fn admit_entry(&mut self, title: &str, link: &str) -> Result<(), SkipReason> {
        if title.is_empty() {
            return Err(SkipReason::EmptyTitle);
        }
        if self.titles.contains(title) {
            return Err(SkipReason::DuplicateTitle);
        }
        if self.links.contains(link) {
            return Err(SkipReason::DuplicateLink);
        }
        self.titles.insert(title.to_string());
        self.links.insert(link.to_string());
        Ok(())
    }

    /// Resolution-stage check on the publisher URL.
    pub fn admit_link(&mut self, link: &str) -> Result<(), SkipReason> {
        if !self.links.insert(link.to_string()) {
            return Err(SkipReason::DuplicateLink);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        date.and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_window_bounds() {
        let day = ymd(2025, 1, 15);
        let window = DateWindow::around(day, Duration::days(1));
        assert!(window.contains(at(ymd(2025, 1, 14), 0, 0)));
        assert!(window.contains(at(ymd(2025, 1, 16), 23, 59)));
        assert!(!window.contains(at(ymd(2025, 1, 13), 23, 59)));
        assert!(!window.contains(at(ymd(2025, 1, 17), 0, 0)));
    }

    #[test]
    fn test_check_date() {
        let day = ymd(2025, 1, 15);
        let window = DateWindow::around(day, Duration::days(1));
        let calendar = TradingCalendar::from_dates([ymd(2025, 1, 15), ymd(2025, 1, 16)]);

        assert_eq!(check_date(at(day, 12, 0), &window, &calendar), Ok(()));
        assert_eq!(
            check_date(at(ymd(2025, 1, 14), 12, 0), &window, &calendar),
            Err(SkipReason::MarketClosed)
        );
        assert_eq!(
            check_date(at(ymd(2025, 1, 20), 12, 0), &window, &calendar),
            Err(SkipReason::OutsideWindow)
        );
    }

    #[test]
    fn test_seen_sets_dedup() {
        let mut seen = SeenSets::new();
        assert_eq!(seen.admit_entry("", "g1"), Err(SkipReason::EmptyTitle));
        assert_eq!(seen.admit_entry("Title A", "g1"), Ok(()));
        assert_eq!(seen.admit_entry("Title A", "g2"), Err(SkipReason::DuplicateTitle));
        assert_eq!(seen.admit_entry("Title B", "g1"), Err(SkipReason::DuplicateLink));

        assert_eq!(seen.admit_link("https://pub.example/a"), Ok(()));
        assert_eq!(
            seen.admit_link("https://pub.example/a"),
            Err(SkipReason::DuplicateLink)
        );
        // A resolved link blocks a later aggregator entry with the same link.
        assert_eq!(
            seen.admit_entry("Title C", "https://pub.example/a"),
            Err(SkipReason::DuplicateLink)
        );
        assert_eq!(seen.len(), 2);
    }
}
