use crate::time::TimeSlot;
use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use std::collections::HashSet;

const TST_OFFSET_SECS: i32 = 8 * 3600;

// TWSE opens at 09:00 TST. Before that the latest complete data belongs to the previous session.
const OPEN_HOUR_TST: u32 = 9;

pub fn taipei_offset() -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(TST_OFFSET_SECS).context("invalid TST offset")
}

pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?);
    }

    let now_tst = now_utc.with_timezone(&taipei_offset()?);

    let mut date = now_tst.date_naive();
    if now_tst.hour() < OPEN_HOUR_TST {
        date = date - Duration::days(1);
    }

    // Roll back to previous business day.
    let holidays = configured_holidays();
    while is_weekend(date) || holidays.contains(&date) {
        date = date - Duration::days(1);
    }

    Ok(date)
}

/// Latest slot whose start time has passed today (TST). `None` before the first scan, or on
/// weekends and market holidays.
pub fn resolve_time_slot(now_utc: DateTime<Utc>) -> anyhow::Result<Option<TimeSlot>> {
    let now_tst = now_utc.with_timezone(&taipei_offset()?);
    let date = now_tst.date_naive();
    if is_weekend(date) || configured_holidays().contains(&date) {
        return Ok(None);
    }

    let now_minutes = now_tst.hour() * 60 + now_tst.minute();
    let mut due = None;
    for slot in TimeSlot::ALL {
        let (hour, minute, weekday) = slot.schedule();
        if weekday.is_some_and(|w| w != date.weekday()) {
            continue;
        }
        if now_minutes >= hour * 60 + minute {
            due = Some(slot);
        }
    }
    Ok(due)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rolls_back_on_weekend() {
        // 2026-01-03 is Saturday; 10:00 TST.
        let now = Utc.with_ymd_and_hms(2026, 1, 3, 2, 0, 0).unwrap();
        let d = resolve_as_of_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
    }

    #[test]
    fn uses_previous_session_before_open() {
        // 2026-01-06 00:30 UTC = 08:30 TST Tuesday.
        let now = Utc.with_ymd_and_hms(2026, 1, 6, 0, 30, 0).unwrap();
        let d = resolve_as_of_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
    }

    #[test]
    fn explicit_date_wins() {
        let now = Utc.with_ymd_and_hms(2026, 1, 6, 0, 30, 0).unwrap();
        let d = resolve_as_of_date(Some("2025-12-31"), now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
    }

    #[test]
    fn picks_latest_due_slot() {
        // 2026-01-07 (Wednesday) 03:00 UTC = 11:00 TST.
        let now = Utc.with_ymd_and_hms(2026, 1, 7, 3, 0, 0).unwrap();
        assert_eq!(
            resolve_time_slot(now).unwrap(),
            Some(TimeSlot::MidMorningScan)
        );

        // 08:00 TST: nothing due yet.
        let early = Utc.with_ymd_and_hms(2026, 1, 7, 0, 0, 0).unwrap();
        assert_eq!(resolve_time_slot(early).unwrap(), None);
    }

    #[test]
    fn no_slot_on_market_holiday() {
        // 2026-01-01 (Thursday) 11:00 TST.
        let new_year = Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap();
        assert_eq!(resolve_time_slot(new_year).unwrap(), None);

        let next_day = Utc.with_ymd_and_hms(2026, 1, 2, 3, 0, 0).unwrap();
        assert_eq!(
            resolve_time_slot(next_day).unwrap(),
            Some(TimeSlot::MidMorningScan)
        );
    }

    #[test]
    fn weekly_summary_only_on_friday() {
        // Friday 2026-01-09 17:30 TST.
        let fri = Utc.with_ymd_and_hms(2026, 1, 9, 9, 30, 0).unwrap();
        assert_eq!(resolve_time_slot(fri).unwrap(), Some(TimeSlot::WeeklySummary));

        // Thursday 17:30 TST stays on the afternoon scan.
        let thu = Utc.with_ymd_and_hms(2026, 1, 8, 9, 30, 0).unwrap();
        assert_eq!(resolve_time_slot(thu).unwrap(), Some(TimeSlot::AfternoonScan));
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // Fixed-date TWSE closures only (lunar holidays change yearly).
    // Extend via TW_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
    let mut out = HashSet::new();
    let years = [2024, 2025, 2026, 2027, 2028, 2029, 2030];
    for y in years {
        for (m, d) in [(1, 1), (2, 28), (4, 4), (10, 10)] {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                out.insert(date);
            }
        }
    }

    if let Ok(s) = std::env::var("TW_MARKET_HOLIDAYS") {
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Ok(d) = NaiveDate::parse_from_str(part, "%Y-%m-%d") {
                out.insert(d);
            }
        }
    }

    out
}
