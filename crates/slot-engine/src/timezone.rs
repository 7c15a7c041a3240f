//! Timezone normalization.
//!
//! All interval algebra runs on UTC instants. Wall-clock values (working
//! hours, slot hours, local dates) are converted with [`to_reference`] before
//! they enter an [`IntervalSet`](crate::interval::IntervalSet) and converted
//! back with [`from_reference`] only when results are presented.
//!
//! # DST policy
//!
//! - Ambiguous local times (fall back) resolve to the **earliest** instant.
//! - Non-existent local times (spring forward) move forward to the first
//!   valid minute after the gap.

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
    Weekday,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SlotError};

/// Longest spring-forward gap we search across (some zones have skipped a day).
const MAX_GAP_MINUTES: i64 = 24 * 60;

// ── Configurable week start ─────────────────────────────────────────────────

/// Which day begins a week when slots are grouped by week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekStartDay {
    /// ISO 8601 standard (Monday = day 0 of the week).
    #[default]
    Monday,
    /// US/Canada convention (Sunday = day 0 of the week).
    Sunday,
}

impl WeekStartDay {
    /// How many days `weekday` is from the week-start day.
    pub fn days_from_start(self, weekday: Weekday) -> i64 {
        match self {
            WeekStartDay::Monday => weekday.num_days_from_monday() as i64,
            WeekStartDay::Sunday => weekday.num_days_from_sunday() as i64,
        }
    }

    /// The first day of the week containing `date`.
    pub fn week_of(self, date: NaiveDate) -> NaiveDate {
        date - Duration::days(self.days_from_start(date.weekday()))
    }
}

// ── Conversions ─────────────────────────────────────────────────────────────

/// Parse an IANA timezone name.
pub fn parse_timezone(s: &str) -> Result<Tz> {
    s.parse::<Tz>()
        .map_err(|_| SlotError::InvalidTimezone(format!("'{}'", s)))
}

/// Parse an RFC 3339 datetime string into a UTC instant.
pub fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SlotError::InvalidDatetime(format!("'{}': {}", s, e)))
}

/// Convert a wall-clock datetime in `tz` to the reference (UTC) instant.
pub fn to_reference(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    if let Some(dt) = tz.from_local_datetime(&local).earliest() {
        return dt.with_timezone(&Utc);
    }
    // Inside a DST gap: walk forward to the first representable minute.
    for minutes in 1..=MAX_GAP_MINUTES {
        let shifted = local + Duration::minutes(minutes);
        if let Some(dt) = tz.from_local_datetime(&shifted).earliest() {
            return dt.with_timezone(&Utc);
        }
    }
    // Unreachable for real zone data; fall back to reading the value as UTC.
    Utc.from_utc_datetime(&local)
}

/// Express a reference instant in `tz`.
pub fn from_reference(instant: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    instant.with_timezone(&tz)
}

/// UTC instant of `date` at `time` in `tz`.
pub fn localize(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    to_reference(date.and_time(time), tz)
}

/// UTC instant of local midnight starting `date` in `tz`.
pub fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    localize(date, NaiveTime::MIN, tz)
}

/// Local calendar date of an instant in `tz`.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    from_reference(instant, tz).date_naive()
}

/// Convert decimal hours (e.g. `8.5`) into an offset from midnight, rounded
/// to the minute. `24.0` yields a full day.
pub fn hours_to_duration(hours: f64) -> Duration {
    Duration::minutes((hours * 60.0).round() as i64)
}

/// [`hours_to_duration`] for untrusted input: `None` when `hours` is not
/// finite or out of range.
pub fn try_hours_to_duration(hours: f64) -> Option<Duration> {
    let minutes = (hours * 60.0).round();
    if !minutes.is_finite() || minutes.abs() >= i64::MAX as f64 {
        return None;
    }
    Duration::try_minutes(minutes as i64)
}

/// UTC instant of `date` + `hours` (decimal hours from local midnight) in `tz`.
///
/// Hours of 24 or more roll over into the following day(s).
pub fn localize_hours(date: NaiveDate, hours: f64, tz: Tz) -> DateTime<Utc> {
    to_reference(date.and_time(NaiveTime::MIN) + hours_to_duration(hours), tz)
}

// ── Presentation helpers ────────────────────────────────────────────────────

/// Determine if DST is active for a datetime in a timezone.
pub fn dst_active(dt: &DateTime<Tz>) -> bool {
    // Compare January 1 offset (winter / standard) with the current offset.
    // Southern-hemisphere zones are handled by also checking July 1.
    let tz = dt.timezone();
    let year = dt.with_timezone(&Utc).year();
    let offset_at = |month: u32| {
        Utc.with_ymd_and_hms(year, month, 1, 12, 0, 0)
            .single()
            .map(|u| u.with_timezone(&tz).offset().fix().local_minus_utc())
    };
    let current = dt.offset().fix().local_minus_utc();
    match (offset_at(1), offset_at(7)) {
        (Some(jan), Some(jul)) => jan != jul && current == jan.max(jul),
        _ => false,
    }
}

/// Format the UTC offset as a string (e.g., "-05:00", "+09:00").
pub fn utc_offset_string<T: TimeZone>(dt: &DateTime<T>) -> String {
    let offset_secs = dt.offset().fix().local_minus_utc();
    let sign = if offset_secs >= 0 { "+" } else { "-" };
    let abs_secs = offset_secs.unsigned_abs();
    let hours = abs_secs / 3600;
    let minutes = (abs_secs % 3600) / 60;
    format!("{sign}{hours:02}:{minutes:02}")
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn parse_known_and_unknown_zones() {
        assert!(parse_timezone("Europe/Brussels").is_ok());
        let err = parse_timezone("Invalid/Zone").unwrap_err().to_string();
        assert!(err.contains("Invalid timezone"), "got: {err}");
    }

    #[test]
    fn parse_rfc3339_normalizes_to_utc() {
        let dt = parse_rfc3339("2026-01-15T14:00:00-05:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 1, 15, 19, 0, 0).unwrap());
        assert!(parse_rfc3339("not-a-datetime").is_err());
    }

    #[test]
    fn round_trip_through_reference() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let utc = to_reference(naive(2026, 3, 15, 10, 0), tz);
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 3, 15, 14, 0, 0).unwrap());
        assert_eq!(from_reference(utc, tz).naive_local(), naive(2026, 3, 15, 10, 0));
    }

    #[test]
    fn spring_forward_gap_shifts_forward() {
        // 2026-03-08 02:30 does not exist in New York.
        let tz: Tz = "America/New_York".parse().unwrap();
        let utc = to_reference(naive(2026, 3, 8, 2, 30), tz);
        assert_eq!(from_reference(utc, tz).naive_local(), naive(2026, 3, 8, 3, 0));
    }

    #[test]
    fn fall_back_ambiguity_picks_earliest() {
        // 2026-11-01 01:30 happens twice in New York; first occurrence is EDT.
        let tz: Tz = "America/New_York".parse().unwrap();
        let utc = to_reference(naive(2026, 11, 1, 1, 30), tz);
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 11, 1, 5, 30, 0).unwrap());
    }

    #[test]
    fn hour_24_is_next_midnight() {
        let tz = Tz::UTC;
        let date = NaiveDate::from_ymd_opt(2023, 5, 3).unwrap();
        assert_eq!(
            localize_hours(date, 24.0, tz),
            Utc.with_ymd_and_hms(2023, 5, 4, 0, 0, 0).unwrap()
        );
        assert_eq!(
            localize_hours(date, 8.5, tz),
            Utc.with_ymd_and_hms(2023, 5, 3, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn offset_and_dst_flags() {
        let ny: Tz = "America/New_York".parse().unwrap();
        let summer = Utc.with_ymd_and_hms(2026, 7, 15, 12, 0, 0).unwrap().with_timezone(&ny);
        let winter = Utc.with_ymd_and_hms(2026, 12, 15, 12, 0, 0).unwrap().with_timezone(&ny);
        assert_eq!(utc_offset_string(&summer), "-04:00");
        assert_eq!(utc_offset_string(&winter), "-05:00");
        assert!(dst_active(&summer));
        assert!(!dst_active(&winter));

        let tokyo: Tz = "Asia/Tokyo".parse().unwrap();
        let t = Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap().with_timezone(&tokyo);
        assert_eq!(utc_offset_string(&t), "+09:00");
        assert!(!dst_active(&t));
    }

    #[test]
    fn southern_hemisphere_dst() {
        let sydney: Tz = "Australia/Sydney".parse().unwrap();
        let january = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap().with_timezone(&sydney);
        let july = Utc.with_ymd_and_hms(2026, 7, 15, 0, 0, 0).unwrap().with_timezone(&sydney);
        assert!(dst_active(&january));
        assert!(!dst_active(&july));
    }

    #[test]
    fn week_start_alignment() {
        // Wed 2026-02-18
        let date = NaiveDate::from_ymd_opt(2026, 2, 18).unwrap();
        assert_eq!(
            WeekStartDay::Monday.week_of(date),
            NaiveDate::from_ymd_opt(2026, 2, 16).unwrap()
        );
        assert_eq!(
            WeekStartDay::Sunday.week_of(date),
            NaiveDate::from_ymd_opt(2026, 2, 15).unwrap()
        );
    }

    #[test]
    fn checked_hours_reject_overflow() {
        assert_eq!(try_hours_to_duration(1.5), Some(Duration::minutes(90)));
        assert_eq!(try_hours_to_duration(1e18), None);
        assert_eq!(try_hours_to_duration(f64::NAN), None);
        assert_eq!(try_hours_to_duration(f64::INFINITY), None);
    }
}
