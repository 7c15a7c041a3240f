//! Calendar-style presentation of slots: month → week → day.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;

use crate::model::ResourceId;
use crate::slots::Slot;
use crate::timezone::{dst_active, from_reference, utc_offset_string, WeekStartDay};

/// One slot as shown in the requested timezone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotView {
    /// Local start, `YYYY-MM-DD HH:MM:SS`.
    pub datetime: String,
    /// RFC 3339 start and end with the local offset.
    pub start: String,
    pub end: String,
    /// Local start time, `HH:MM`.
    pub hours: String,
    pub duration_hours: f64,
    pub utc_offset: String,
    pub dst_active: bool,
    pub assigned: Vec<ResourceId>,
    pub available: Vec<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySlots {
    pub date: NaiveDate,
    /// False for the leading/trailing days of neighbouring months.
    pub in_month: bool,
    pub is_today: bool,
    pub slots: Vec<SlotView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSlots {
    pub id: usize,
    pub year: i32,
    pub month: u32,
    /// e.g. `"February 2024"`.
    pub label: String,
    /// Full calendar weeks of seven days.
    pub weeks: Vec<Vec<DaySlots>>,
    pub has_availabilities: bool,
    pub nb_slots_previous_months: usize,
    pub nb_slots_next_months: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SlotsByPeriod {
    pub timezone: String,
    pub months: Vec<MonthSlots>,
}

impl SlotsByPeriod {
    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    pub fn slot_count(&self) -> usize {
        self.slots().count()
    }

    /// Every slot view, in order.
    pub fn slots(&self) -> impl Iterator<Item = &SlotView> {
        self.months
            .iter()
            .flat_map(|m| m.weeks.iter())
            .flatten()
            .flat_map(|d| d.slots.iter())
    }
}

fn view(slot: &Slot, tz: Tz) -> SlotView {
    let start = from_reference(slot.start, tz);
    let end = from_reference(slot.end, tz);
    SlotView {
        datetime: start.format("%Y-%m-%d %H:%M:%S").to_string(),
        start: start.to_rfc3339(),
        end: end.to_rfc3339(),
        hours: start.format("%H:%M").to_string(),
        duration_hours: (slot.end - slot.start).num_minutes() as f64 / 60.0,
        utc_offset: utc_offset_string(&start),
        dst_active: dst_active(&start),
        assigned: slot.assigned.clone(),
        available: slot.available.clone(),
    }
}

/// Group `slots` (sorted by start) into calendar months in `tz`.
///
/// Months run from the first slot's month through the month of `last_day`
/// (or of the last slot, if later). No slots means no months.
pub fn group_by_month(
    slots: &[Slot],
    tz: Tz,
    today: NaiveDate,
    last_day: NaiveDate,
    week_start: WeekStartDay,
) -> SlotsByPeriod {
    let mut by_day: BTreeMap<NaiveDate, Vec<SlotView>> = BTreeMap::new();
    for slot in slots {
        let local = from_reference(slot.start, tz).date_naive();
        by_day.entry(local).or_default().push(view(slot, tz));
    }
    let (Some(first), Some(last_slot)) = (by_day.keys().next().copied(), by_day.keys().next_back().copied()) else {
        return SlotsByPeriod {
            timezone: tz.name().to_string(),
            months: Vec::new(),
        };
    };
    let last = last_day.max(last_slot);

    let total = slots.len();
    let mut previous = 0;
    let mut months = Vec::new();
    let mut cursor = first.with_day(1).unwrap_or(first);
    while (cursor.year(), cursor.month()) <= (last.year(), last.month()) {
        let next_month = first_of_next_month(cursor);
        let weeks = calendar_weeks(cursor, next_month, week_start)
            .into_iter()
            .map(|week| {
                week.into_iter()
                    .map(|date| {
                        let in_month = date.month() == cursor.month();
                        DaySlots {
                            date,
                            in_month,
                            is_today: date == today,
                            slots: if in_month {
                                by_day.get(&date).cloned().unwrap_or_default()
                            } else {
                                Vec::new()
                            },
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let in_month: usize = weeks.iter().flatten().map(|d| d.slots.len()).sum();

        months.push(MonthSlots {
            id: months.len(),
            year: cursor.year(),
            month: cursor.month(),
            label: cursor.format("%B %Y").to_string(),
            weeks,
            has_availabilities: in_month > 0,
            nb_slots_previous_months: previous,
            nb_slots_next_months: total - previous - in_month,
        });
        previous += in_month;
        cursor = next_month;
    }

    SlotsByPeriod {
        timezone: tz.name().to_string(),
        months,
    }
}

fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Rows of seven dates covering `[month_start, next_month)`.
fn calendar_weeks(month_start: NaiveDate, next_month: NaiveDate, week_start: WeekStartDay) -> Vec<Vec<NaiveDate>> {
    let mut weeks = Vec::new();
    let mut day = week_start.week_of(month_start);
    while day < next_month {
        weeks.push((0..7).map(|i| day + Duration::days(i)).collect());
        day += Duration::days(7);
    }
    weeks
}
