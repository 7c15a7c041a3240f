//! Leave and busy-time views: raw rows → per-resource interval sets.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::trace;

use crate::calendar::SegmentWork;
use crate::error::{Result, SlotError};
use crate::interval::{self, tag, Interval, IntervalSet, Tags};
use crate::model::{BusyEvent, Leave, LeaveKind, ShowAs, Window};
use crate::timezone::{local_date, start_of_day};

/// Label given to leaves recorded without a reason.
const UNNAMED_LEAVE: &str = "time off";
const UNNAMED_EVENT: &str = "busy";

// ── Leaves ──────────────────────────────────────────────────────────────────

/// Time-off intervals of one resource inside `window`.
///
/// Only [`LeaveKind::TimeOff`] rows are kept. A leave scoped to a calendar
/// only removes time from the validity segments where that calendar is in
/// force. Payloads carry the leave reasons.
pub fn leave_intervals(
    leaves: &[Leave],
    segments: &[SegmentWork],
    window: &Window,
) -> Result<IntervalSet<Tags>> {
    let mut intervals = Vec::new();
    for leave in leaves {
        if leave.date_from > leave.date_to {
            return Err(SlotError::config(format!(
                "leave '{}' ends {} before it starts {}",
                leave.reason.as_deref().unwrap_or(UNNAMED_LEAVE),
                leave.date_to,
                leave.date_from
            )));
        }
        if leave.kind != LeaveKind::TimeOff {
            trace!(reason = ?leave.reason, "ignoring leave counted as work");
            continue;
        }
        let label = leave.reason.clone().unwrap_or_else(|| UNNAMED_LEAVE.to_string());
        let raw = IntervalSet::span(leave.date_from, leave.date_to, tag(label));
        let scoped = match &leave.calendar_id {
            None => raw,
            Some(calendar) => interval::intersect(&raw, &calendar_scope(segments, calendar)),
        };
        intervals.extend(scoped);
    }
    Ok(IntervalSet::new(intervals).clip(window.start, window.end))
}

/// The time range during which `calendar` is in force, per the resolved
/// segments. A calendar in no segment scopes nothing.
fn calendar_scope(segments: &[SegmentWork], calendar: &str) -> IntervalSet {
    IntervalSet::new(
        segments
            .iter()
            .filter(|s| s.calendar_ids.iter().any(|c| c == calendar))
            .map(|s| Interval::new(s.start, s.end)),
    )
}

// ── Busy events ─────────────────────────────────────────────────────────────

/// Busy intervals of one resource inside `window`.
///
/// Events shown as free never block. All-day events cover every full local
/// day (in `tz`) they touch.
pub fn busy_intervals(events: &[BusyEvent], window: &Window, tz: Tz) -> IntervalSet<Tags> {
    IntervalSet::new(
        events
            .iter()
            .filter(|e| e.show_as == ShowAs::Busy)
            .map(|e| {
                let (start, end) = if e.all_day {
                    whole_days(e.start, e.end, tz)
                } else {
                    (e.start, e.end)
                };
                let label = e.label.clone().unwrap_or_else(|| UNNAMED_EVENT.to_string());
                Interval::with_payload(start, end, tag(label))
            }),
    )
    .clip(window.start, window.end)
}

/// Widen `[start, end]` to local midnights in `tz`.
fn whole_days(start: DateTime<Utc>, end: DateTime<Utc>, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let first = local_date(start, tz);
    // An end exactly on midnight does not touch the following day.
    let last = local_date(end - Duration::nanoseconds(1), tz).max(first);
    let after = last.succ_opt().unwrap_or(last);
    (start_of_day(first, tz), start_of_day(after, tz))
}
