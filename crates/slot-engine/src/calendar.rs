//! Working-schedule resolution: recurring weekly templates → concrete work
//! intervals.
//!
//! A resource's templates may change over time (one contract's calendar
//! ends, another's begins). Templates are grouped into validity segments and
//! each template only ever produces intervals inside its own validity, so no
//! calendar leaks into a period where it is not in force. Overlapping
//! templates valid at the same time are unioned.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rrule::{Frequency, NWeekday, RRule, Tz as RRuleTz};
use serde::Serialize;

use crate::error::{Result, SlotError};
use crate::interval::{self, tag, Interval, IntervalSet, Tags};
use crate::model::{CalendarId, Window, WorkTemplate};
use crate::timezone::{local_date, localize_hours, start_of_day};

/// Sixteenths of a day: the granularity worked days are reported in.
const DAY_ROUNDING: f64 = 16.0;

// ── Segments ────────────────────────────────────────────────────────────────

/// Templates sharing one validity window.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSegment {
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub templates: Vec<WorkTemplate>,
}

impl ScheduleSegment {
    pub fn calendar_ids(&self) -> Vec<CalendarId> {
        let mut ids: Vec<CalendarId> = self.templates.iter().map(|t| t.calendar_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// UTC bounds of this segment in `tz`, clipped to `window`.
    fn bounds(&self, window: &Window, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self
            .valid_from
            .map(|d| start_of_day(d, tz).max(window.start))
            .unwrap_or(window.start);
        let end = self
            .valid_to
            .and_then(|d| d.succ_opt())
            .map(|d| start_of_day(d, tz).min(window.end))
            .unwrap_or(window.end);
        (start, end)
    }
}

/// Group templates by validity window, ordered by validity start
/// (open-ended starts first).
pub fn segments(templates: &[WorkTemplate]) -> Vec<ScheduleSegment> {
    let mut grouped: BTreeMap<(Option<NaiveDate>, Option<NaiveDate>), Vec<WorkTemplate>> =
        BTreeMap::new();
    for template in templates {
        grouped
            .entry((template.valid_from, template.valid_to))
            .or_default()
            .push(template.clone());
    }
    grouped
        .into_iter()
        .map(|((valid_from, valid_to), templates)| ScheduleSegment {
            valid_from,
            valid_to,
            templates,
        })
        .collect()
}

// ── Resolution ──────────────────────────────────────────────────────────────

/// Work intervals produced by one validity segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentWork {
    /// UTC range this segment covers, clipped to the requested window.
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub calendar_ids: Vec<CalendarId>,
    pub work: IntervalSet<Tags>,
}

impl SegmentWork {
    pub fn hours(&self) -> f64 {
        self.work.hours()
    }
}

/// Resolved schedule of one resource over a window.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WorkSchedule {
    /// Per validity segment overlapping the window, in validity order.
    pub segments: Vec<SegmentWork>,
    /// Union of every segment; payload holds the producing calendar ids.
    pub work: IntervalSet<Tags>,
}

/// Expand `templates` into concrete UTC work intervals inside `window`.
///
/// Hours are interpreted as wall-clock time in `tz`. A resource without
/// templates simply has no working time.
pub fn resolve(templates: &[WorkTemplate], window: &Window, tz: Tz) -> Result<WorkSchedule> {
    for template in templates {
        template.validate()?;
    }
    if window.is_empty() {
        return Ok(WorkSchedule::default());
    }

    let mut resolved = Vec::new();
    for segment in segments(templates) {
        let (seg_start, seg_end) = segment.bounds(window, tz);
        if seg_start >= seg_end {
            continue;
        }
        let mut intervals = Vec::new();
        for template in &segment.templates {
            intervals.extend(expand_template(template, seg_start, seg_end, tz)?);
        }
        resolved.push(SegmentWork {
            start: seg_start,
            end: seg_end,
            valid_from: segment.valid_from,
            valid_to: segment.valid_to,
            calendar_ids: segment.calendar_ids(),
            work: IntervalSet::new(intervals).clip(seg_start, seg_end),
        });
    }

    let work = interval::union_all(resolved.iter().map(|s| &s.work));
    Ok(WorkSchedule {
        segments: resolved,
        work,
    })
}

/// Concrete intervals of one template between two instants.
fn expand_template(
    template: &WorkTemplate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tz: Tz,
) -> Result<Vec<Interval<Tags>>> {
    let mut first = local_date(start, tz);
    let mut last = local_date(end, tz);
    if let Some(from) = template.valid_from {
        first = first.max(from);
    }
    if let Some(to) = template.valid_to {
        last = last.min(to);
    }

    let days = weekday_occurrences(template, first, last)?;
    Ok(days
        .into_iter()
        .filter(|day| template.applies_on(*day))
        .map(|day| {
            let from = localize_hours(day, template.hour_from, tz).max(start);
            let to = localize_hours(day, template.hour_to, tz).min(end);
            Interval::with_payload(from, to, tag(template.calendar_id.clone()))
        })
        .filter(|i| !i.is_empty())
        .collect())
}

/// Dates in `[first, last]` falling on the template's weekday, via a weekly
/// recurrence rule.
fn weekday_occurrences(template: &WorkTemplate, first: NaiveDate, last: NaiveDate) -> Result<Vec<NaiveDate>> {
    if first > last {
        return Ok(Vec::new());
    }
    let dt_start = RRuleTz::UTC.from_utc_datetime(&first.and_time(NaiveTime::MIN));
    let until = RRuleTz::UTC.from_utc_datetime(&last.and_time(NaiveTime::MIN));
    let rule = RRule::new(Frequency::Weekly)
        .by_weekday(vec![NWeekday::Every(template.weekday)])
        .until(until)
        .build(dt_start)
        .map_err(|e| SlotError::Recurrence(e.to_string()))?;
    Ok(rule
        .all(u16::MAX)
        .dates
        .into_iter()
        .map(|dt| dt.date_naive())
        .filter(|d| d.weekday() == template.weekday && *d >= first && *d <= last)
        .collect())
}

// ── Reporting ───────────────────────────────────────────────────────────────

/// Worked time expressed in hours and in (fractional) days.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WorkSummary {
    pub hours: f64,
    pub days: f64,
}

/// Summarize `worked` against the `scheduled` attendance it was cut from.
///
/// Each local day counts as `worked / scheduled` of a day, rounded to
/// sixteenths; days without scheduled time count as zero.
pub fn work_summary<P, Q>(scheduled: &IntervalSet<P>, worked: &IntervalSet<Q>, tz: Tz) -> WorkSummary {
    let day_total = hours_per_day(scheduled, tz);
    let day_worked = hours_per_day(worked, tz);

    let days = day_worked
        .iter()
        .map(|(day, hours)| match day_total.get(day) {
            Some(total) if *total > 0.0 => (DAY_ROUNDING * hours / total).round() / DAY_ROUNDING,
            _ => 0.0,
        })
        .sum();
    WorkSummary {
        hours: worked.hours(),
        days,
    }
}

fn hours_per_day<P>(set: &IntervalSet<P>, tz: Tz) -> BTreeMap<NaiveDate, f64> {
    let mut hours = BTreeMap::new();
    for i in set {
        *hours.entry(local_date(i.start, tz)).or_insert(0.0) += hours_of(i.end - i.start);
    }
    hours
}

fn hours_of(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 3_600_000.0
}

/// Walk `work` from `from` until `hours` of work have elapsed.
///
/// Negative `hours` walk backwards. Returns `None` when the set runs out
/// before the amount is reached. Zero hours snap to the next work start.
pub fn plan_hours<P>(work: &IntervalSet<P>, from: DateTime<Utc>, hours: f64) -> Option<DateTime<Utc>> {
    let mut remaining = Duration::milliseconds((hours.abs() * 3_600_000.0).round() as i64);
    if hours >= 0.0 {
        for i in work.iter().filter(|i| i.end > from) {
            let start = i.start.max(from);
            let available = i.end - start;
            if remaining <= available {
                return Some(start + remaining);
            }
            remaining -= available;
        }
    } else {
        for i in work.iter().rev().filter(|i| i.start < from) {
            let end = i.end.min(from);
            let available = end - i.start;
            if remaining <= available {
                return Some(end - remaining);
            }
            remaining -= available;
        }
    }
    None
}

// ── Tests ───────────────────────────────────────────────────────────────────
