use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Header format of exported text blocks, e.g. "8 Jan 2026 at 1:00 AM".
pub const DISPLAY_FORMAT: &str = "%-d %b %Y at %-I:%M %p";

/// This is the standard way of converting a date to a string in typetrace. Used both for record
/// files and for artifact names.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Resolves a wall-clock time in `tz`. Around DST transitions a local time can be skipped, in
/// which case the time is read as UTC.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|v| v.to_utc())
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// UTC bounds `[start, end)` of a calendar day in `tz`.
pub fn day_bounds<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = resolve_local(tz, date.and_time(NaiveTime::MIN));
    let end = match date.succ_opt() {
        Some(next) => resolve_local(tz, next.and_time(NaiveTime::MIN)),
        None => start + Duration::days(1),
    };
    (start, end)
}

pub fn format_display<Tz: TimeZone>(moment: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    moment.format(DISPLAY_FORMAT).to_string()
}
