//! Input records consumed by the engine.
//!
//! These are owned by the surrounding record store and treated as immutable
//! for the duration of one computation.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SlotError};

/// Identifier of a bookable resource (person, room, machine).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        ResourceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        ResourceId(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        ResourceId(s)
    }
}

/// Identifier of a working-time calendar.
pub type CalendarId = String;

/// Half-open `[start, end)` range of reference instants a computation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Window { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

// ── Resources ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    /// IANA timezone working hours are expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Assignment order; lower comes first.
    #[serde(default)]
    pub sequence: i32,
    /// Seats the resource offers at once (people at a table, places in a room).
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Whether bookings that leave seats open still admit other bookings.
    #[serde(default)]
    pub shareable: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_capacity() -> u32 {
    1
}

impl Resource {
    pub fn new(id: impl Into<String>, timezone: impl Into<String>) -> Self {
        Resource {
            id: ResourceId::new(id),
            timezone: timezone.into(),
            sequence: 0,
            capacity: 1,
            shareable: false,
        }
    }

    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn shareable(mut self) -> Self {
        self.shareable = true;
        self
    }
}

// ── Working hours ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayPeriod {
    #[default]
    Morning,
    Afternoon,
}

/// Week parity for two-week rotating calendars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekType {
    /// First week of the rotation (parity 0).
    Even,
    /// Second week of the rotation (parity 1).
    Odd,
}

impl WeekType {
    /// Parity of the week containing `date`.
    ///
    /// Weeks are counted from day 1 of the proleptic Gregorian calendar, so an
    /// even week always follows an odd one, including across years with 53
    /// ISO weeks.
    pub fn of(date: NaiveDate) -> WeekType {
        if (date.num_days_from_ce() - 1).div_euclid(7).rem_euclid(2) == 0 {
            WeekType::Even
        } else {
            WeekType::Odd
        }
    }
}

/// One recurring attendance rule: "every `weekday` from `hour_from` to
/// `hour_to`", in force between `valid_from` and `valid_to` (inclusive local
/// dates, open-ended when `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkTemplate {
    #[serde(default = "default_calendar")]
    pub calendar_id: CalendarId,
    pub weekday: Weekday,
    pub hour_from: f64,
    pub hour_to: f64,
    #[serde(default)]
    pub day_period: DayPeriod,
    #[serde(default)]
    pub week_type: Option<WeekType>,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub valid_to: Option<NaiveDate>,
}

fn default_calendar() -> CalendarId {
    "default".to_string()
}

impl WorkTemplate {
    pub fn new(calendar_id: impl Into<String>, weekday: Weekday, hour_from: f64, hour_to: f64) -> Self {
        WorkTemplate {
            calendar_id: calendar_id.into(),
            weekday,
            hour_from,
            hour_to,
            day_period: if hour_from < 12.0 {
                DayPeriod::Morning
            } else {
                DayPeriod::Afternoon
            },
            week_type: None,
            valid_from: None,
            valid_to: None,
        }
    }

    pub fn valid(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.valid_from = from;
        self.valid_to = to;
        self
    }

    pub fn in_week(mut self, week_type: WeekType) -> Self {
        self.week_type = Some(week_type);
        self
    }

    /// Whether this template is in force on `date`.
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        self.valid_from.is_none_or(|from| from <= date)
            && self.valid_to.is_none_or(|to| date <= to)
            && date.weekday() == self.weekday
            && self.week_type.is_none_or(|wt| WeekType::of(date) == wt)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..24.0).contains(&self.hour_from) || !(0.0..=24.0).contains(&self.hour_to) {
            return Err(SlotError::config(format!(
                "calendar '{}': working hours {}-{} outside 0-24",
                self.calendar_id, self.hour_from, self.hour_to
            )));
        }
        if self.hour_from >= self.hour_to {
            return Err(SlotError::config(format!(
                "calendar '{}': hour_from {} must be before hour_to {}",
                self.calendar_id, self.hour_from, self.hour_to
            )));
        }
        if let (Some(from), Some(to)) = (self.valid_from, self.valid_to) {
            if from > to {
                return Err(SlotError::config(format!(
                    "calendar '{}': validity starts {from} after it ends {to}",
                    self.calendar_id
                )));
            }
        }
        Ok(())
    }
}

// ── Time off and busy time ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveKind {
    /// Absence: removed from working time.
    #[default]
    TimeOff,
    /// Recorded but still counted as work (e.g. training).
    Other,
}

/// An absolute (non-recurring) absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leave {
    /// `None` marks a global leave applying to every resource it is fetched for.
    #[serde(default)]
    pub resource_id: Option<ResourceId>,
    /// When set, the leave only applies while this calendar is in force.
    #[serde(default)]
    pub calendar_id: Option<CalendarId>,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub kind: LeaveKind,
}

impl Leave {
    pub fn new(resource_id: Option<ResourceId>, date_from: DateTime<Utc>, date_to: DateTime<Utc>) -> Self {
        Leave {
            resource_id,
            calendar_id: None,
            date_from,
            date_to,
            reason: None,
            kind: LeaveKind::TimeOff,
        }
    }

    pub fn for_calendar(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = Some(calendar_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowAs {
    #[default]
    Busy,
    Free,
}

/// An already-booked event occupying a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyEvent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// All-day events block every local day they touch.
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub show_as: ShowAs,
    #[serde(default)]
    pub label: Option<String>,
    /// Seats taken when this is a booking on a shareable resource. `None`
    /// occupies the resource entirely.
    #[serde(default)]
    pub seats: Option<u32>,
}

impl BusyEvent {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        BusyEvent {
            start,
            end,
            all_day: false,
            show_as: ShowAs::Busy,
            label: None,
            seats: None,
        }
    }

    pub fn all_day(mut self) -> Self {
        self.all_day = true;
        self
    }

    /// A booking holding `seats` of a shareable resource.
    pub fn booking(mut self, seats: u32) -> Self {
        self.seats = Some(seats);
        self
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn week_parity_alternates_across_year_end() {
        // 2020 has 53 ISO weeks; the rotation must still alternate.
        let mut previous = WeekType::of(date(2020, 12, 21));
        let mut day = date(2020, 12, 28);
        for _ in 0..4 {
            let current = WeekType::of(day);
            assert_ne!(current, previous, "week of {day}");
            previous = current;
            day += chrono::Duration::days(7);
        }
    }

    #[test]
    fn week_parity_is_constant_within_a_week() {
        // Proleptic day 1 is a Monday, so parity flips on Mondays.
        let monday = date(2024, 3, 4);
        let parity = WeekType::of(monday);
        for offset in 1..7 {
            assert_eq!(WeekType::of(monday + chrono::Duration::days(offset)), parity);
        }
    }

    #[test]
    fn template_validation() {
        assert!(WorkTemplate::new("c", Weekday::Mon, 8.0, 12.0).validate().is_ok());
        assert!(WorkTemplate::new("c", Weekday::Mon, 0.0, 24.0).validate().is_ok());
        assert!(WorkTemplate::new("c", Weekday::Mon, 12.0, 12.0).validate().is_err());
        assert!(WorkTemplate::new("c", Weekday::Mon, 13.0, 12.0).validate().is_err());
        assert!(WorkTemplate::new("c", Weekday::Mon, 8.0, 25.0).validate().is_err());
        let inverted = WorkTemplate::new("c", Weekday::Mon, 8.0, 12.0)
            .valid(Some(date(2023, 2, 1)), Some(date(2023, 1, 1)));
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn template_applies_within_validity_only() {
        let t = WorkTemplate::new("c", Weekday::Mon, 8.0, 12.0)
            .valid(Some(date(2023, 10, 2)), Some(date(2023, 10, 16)));
        assert!(!t.applies_on(date(2023, 9, 25)));
        assert!(t.applies_on(date(2023, 10, 2)));
        assert!(!t.applies_on(date(2023, 10, 3)));
        assert!(t.applies_on(date(2023, 10, 16)));
        assert!(!t.applies_on(date(2023, 10, 23)));
    }

    #[test]
    fn default_day_period_follows_hours() {
        assert_eq!(WorkTemplate::new("c", Weekday::Mon, 8.0, 12.0).day_period, DayPeriod::Morning);
        assert_eq!(WorkTemplate::new("c", Weekday::Mon, 13.0, 17.0).day_period, DayPeriod::Afternoon);
    }
}
