//! Calendar-day helpers: reading dates, month arithmetic and timezones.

use std::sync::OnceLock;

use chrono::{Datelike, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use regex::Regex;
use tracing::warn;

// ── Reading dates ─────────────────────────────────────────────────────────────

/// `YYYY-MM-DD`, optionally followed by a time-of-day and offset that is
/// discarded.
fn reading_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^\s*(\d{4})-(\d{2})-(\d{2})(?:[T ]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:?\d{2})?)?\s*$",
        )
        .expect("reading date pattern is valid")
    })
}

/// Parse a reading date into a calendar day.
///
/// Accepts the canonical `YYYY-MM-DD` form and timestamp strings such as
/// `2024-01-15T10:30:00Z` whose time component is dropped. Returns `None`
/// for anything else, including impossible dates like `2023-02-30`.
pub fn parse_reading_date(s: &str) -> Option<NaiveDate> {
    let caps = reading_date_pattern().captures(s)?;
    let year = caps[1].parse::<i32>().ok()?;
    let month = caps[2].parse::<u32>().ok()?;
    let day = caps[3].parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Whole days from `from` to `to` (negative when `to` is earlier).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// `date` shifted back by `months` calendar months, clamped to the month end.
pub fn months_before(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

/// `date` shifted forward by `months` calendar months, clamped to the month end.
pub fn months_after(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// First and last day of a calendar year.
pub fn year_bounds(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

/// The calendar year preceding `today`, the usual billing period.
pub fn previous_year(today: NaiveDate) -> i32 {
    today.year() - 1
}

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// Resolve a timezone setting to a [`Tz`].
///
/// `"auto"` uses the system timezone. Unrecognised names fall back to UTC
/// with a warning.
pub fn resolve_timezone(name: &str) -> Tz {
    let name = if name.eq_ignore_ascii_case("auto") {
        get_system_timezone()
    } else {
        name.to_string()
    };
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!("unrecognised timezone \"{}\", falling back to UTC", name);
        Tz::UTC
    })
}

/// The current calendar day as seen in `tz`.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

// ── Tests ──────────────────────────────────────────────────────────────────────
