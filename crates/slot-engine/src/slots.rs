//! Appointment slot generation.
//!
//! A computation runs in four steps:
//!
//! 1. **Expand**: turn the appointment type's slot specs into candidate
//!    ranges inside its booking horizon.
//! 2. **Filter**: keep a candidate when enough permitted resources have the
//!    whole range inside their free time (or, for shareable resources under
//!    capacity management, enough open seats).
//! 3. **Assign**: pick the serving resource(s) with the configured policy.
//! 4. **Emit**: group the result by month/week/day in the requested timezone
//!    (see [`crate::period`]).
//!
//! Availability is computed once, in a single batch, for the span of all
//! candidates. Slots are not re-validated here; call [`validate_booking`]
//! right before committing a booking.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::assign::{AssignPolicy, Assigner, Offer};
use crate::availability::{AvailabilityEngine, ResourceAvailability, WorkHours};
use crate::error::{Result, SlotError};
use crate::model::{Resource, ResourceId, Window};
use crate::period::{self, SlotsByPeriod};
use crate::store::AvailabilityStore;
use crate::timezone::{local_date, localize_hours, parse_timezone, start_of_day, try_hours_to_duration, WeekStartDay};

/// Longest booking horizon an appointment type may declare (ten years).
pub const MAX_SCHEDULE_DAYS: i64 = 3660;

const MAX_SCHEDULE_HOURS: f64 = (MAX_SCHEDULE_DAYS * 24) as f64;
const MINUTES_PER_DAY: i64 = 24 * 60;

// ── Configuration ───────────────────────────────────────────────────────────

/// One bookable pattern of an appointment type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotSpec {
    /// Every `weekday`, back-to-back slots from `hour_from` to `hour_to`
    /// (appointment timezone; `24` is the following midnight).
    Recurring {
        weekday: Weekday,
        hour_from: f64,
        hour_to: f64,
        /// Resources allowed to serve this slot; empty means all.
        #[serde(default)]
        restrict_to: Vec<ResourceId>,
    },
    /// A single fixed range, used by custom appointment types.
    Unique {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        #[serde(default)]
        restrict_to: Vec<ResourceId>,
    },
}

impl SlotSpec {
    pub fn recurring(weekday: Weekday, hour_from: f64, hour_to: f64) -> Self {
        SlotSpec::Recurring {
            weekday,
            hour_from,
            hour_to,
            restrict_to: Vec::new(),
        }
    }

    pub fn unique(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        SlotSpec::Unique {
            start,
            end,
            restrict_to: Vec::new(),
        }
    }

    pub fn restricted_to(mut self, resources: Vec<ResourceId>) -> Self {
        match &mut self {
            SlotSpec::Recurring { restrict_to, .. } | SlotSpec::Unique { restrict_to, .. } => {
                *restrict_to = resources
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Category {
    /// Weekly slot specs, bookable from now on.
    #[default]
    Recurring,
    /// Weekly slot specs, bookable only inside `[start, end)`.
    Punctual {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Hand-picked unique slots.
    Custom,
    /// Any grid-aligned range the resources are free for.
    Anytime,
}

/// Bookable service definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentType {
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// IANA timezone slot hours are expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default = "default_duration_hours")]
    pub duration_hours: f64,
    #[serde(default)]
    pub slots: Vec<SlotSpec>,
    /// Earliest bookable time, counted from now.
    #[serde(default = "default_min_schedule_hours")]
    pub min_schedule_hours: f64,
    /// Booking horizon, counted from now.
    #[serde(default = "default_max_schedule_days")]
    pub max_schedule_days: i64,
    #[serde(default)]
    pub assign_policy: AssignPolicy,
    /// Resources that must serve every slot together.
    #[serde(default = "default_required_resources")]
    pub required_resources: usize,
    /// Limit slots to the resources' working hours. Unset means "yes",
    /// except for anytime appointments.
    #[serde(default)]
    pub enforce_work_hours: Option<bool>,
    /// Pool the seats of shareable resources instead of booking resources
    /// whole.
    #[serde(default)]
    pub manage_capacity: bool,
    #[serde(default = "default_granularity_minutes")]
    pub anytime_granularity_minutes: i64,
    #[serde(default)]
    pub week_start: WeekStartDay,
}

fn default_active() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_duration_hours() -> f64 {
    1.0
}

fn default_min_schedule_hours() -> f64 {
    1.0
}

fn default_max_schedule_days() -> i64 {
    15
}

fn default_required_resources() -> usize {
    1
}

fn default_granularity_minutes() -> i64 {
    30
}

impl AppointmentType {
    pub fn new(name: impl Into<String>, timezone: impl Into<String>) -> Self {
        AppointmentType {
            name: name.into(),
            active: true,
            timezone: timezone.into(),
            category: Category::Recurring,
            duration_hours: default_duration_hours(),
            slots: Vec::new(),
            min_schedule_hours: default_min_schedule_hours(),
            max_schedule_days: default_max_schedule_days(),
            assign_policy: AssignPolicy::FirstAvailable,
            required_resources: 1,
            enforce_work_hours: None,
            manage_capacity: false,
            anytime_granularity_minutes: default_granularity_minutes(),
            week_start: WeekStartDay::Monday,
        }
    }

    /// An appointment bookable at any free grid point; working hours are not
    /// enforced unless asked for.
    pub fn anytime(name: impl Into<String>, timezone: impl Into<String>) -> Self {
        AppointmentType {
            category: Category::Anytime,
            ..Self::new(name, timezone)
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_duration_hours(mut self, hours: f64) -> Self {
        self.duration_hours = hours;
        self
    }

    pub fn with_slot(mut self, spec: SlotSpec) -> Self {
        self.slots.push(spec);
        self
    }

    pub fn with_schedule(mut self, min_hours: f64, max_days: i64) -> Self {
        self.min_schedule_hours = min_hours;
        self.max_schedule_days = max_days;
        self
    }

    pub fn with_policy(mut self, policy: AssignPolicy) -> Self {
        self.assign_policy = policy;
        self
    }

    pub fn with_required_resources(mut self, n: usize) -> Self {
        self.required_resources = n;
        self
    }

    pub fn with_work_hours(mut self, enforce: bool) -> Self {
        self.enforce_work_hours = Some(enforce);
        self
    }

    pub fn with_capacity_management(mut self) -> Self {
        self.manage_capacity = true;
        self
    }

    /// Slot length; zero when `duration_hours` is out of range.
    pub fn duration(&self) -> Duration {
        try_hours_to_duration(self.duration_hours).unwrap_or_else(Duration::zero)
    }

    pub fn work_hours(&self) -> WorkHours {
        let enforce = self
            .enforce_work_hours
            .unwrap_or(self.category != Category::Anytime);
        if enforce {
            WorkHours::Enforced
        } else {
            WorkHours::Ignored
        }
    }

    /// Check the definition and return its timezone.
    pub fn validate(&self) -> Result<Tz> {
        let tz = parse_timezone(&self.timezone)?;
        let err = |msg: String| Err(SlotError::config(format!("appointment '{}': {msg}", self.name)));

        if !(self.duration_hours <= MAX_SCHEDULE_HOURS && self.duration() > Duration::zero()) {
            return err(format!("duration must be positive, got {}h", self.duration_hours));
        }
        if !(0.0..=MAX_SCHEDULE_HOURS).contains(&self.min_schedule_hours)
            || !(0..=MAX_SCHEDULE_DAYS).contains(&self.max_schedule_days)
        {
            return err(format!(
                "scheduling bounds {}h - {} days must lie between now and {MAX_SCHEDULE_DAYS} days",
                self.min_schedule_hours, self.max_schedule_days
            ));
        }
        if self.required_resources == 0 {
            return err("at least one resource must serve each slot".to_string());
        }
        if self.category == Category::Anytime
            && !(1..=MINUTES_PER_DAY).contains(&self.anytime_granularity_minutes)
        {
            return err(format!(
                "granularity must be between 1 minute and a day, got {} minutes",
                self.anytime_granularity_minutes
            ));
        }
        if let Category::Punctual { start, end } = self.category {
            if start >= end {
                return err(format!("punctual range {start} - {end} is empty"));
            }
        }
        for spec in &self.slots {
            match spec {
                SlotSpec::Recurring {
                    hour_from, hour_to, ..
                } => {
                    if !(0.0..24.0).contains(hour_from) || !(0.0..=24.0).contains(hour_to) {
                        return err(format!("slot hours {hour_from}-{hour_to} outside 0-24"));
                    }
                    if hour_from >= hour_to {
                        return err(format!("slot starts at {hour_from} but ends at {hour_to}"));
                    }
                }
                SlotSpec::Unique { start, end, .. } => {
                    if start >= end {
                        return err(format!("unique slot {start} - {end} is empty"));
                    }
                }
            }
        }
        Ok(tz)
    }
}

// ── Candidates and results ──────────────────────────────────────────────────

/// A range produced by expansion, not yet checked against availability.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub restrict_to: Vec<ResourceId>,
}

/// A bookable slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Resources picked by the assignment policy.
    pub assigned: Vec<ResourceId>,
    /// Every permitted resource free for the whole slot, in assignment order.
    pub available: Vec<ResourceId>,
}

/// First and last bookable instants of one computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Horizon {
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
}

// ── Generator ───────────────────────────────────────────────────────────────

pub struct SlotGenerator<'a, S: AvailabilityStore + ?Sized> {
    appointment: &'a AppointmentType,
    store: &'a S,
    asked_capacity: u32,
}

impl<'a, S: AvailabilityStore + ?Sized> SlotGenerator<'a, S> {
    pub fn new(appointment: &'a AppointmentType, store: &'a S) -> Self {
        SlotGenerator {
            appointment,
            store,
            asked_capacity: 1,
        }
    }

    /// Seats each slot must provide (party size); one by default.
    pub fn asking(mut self, seats: u32) -> Self {
        self.asked_capacity = seats;
        self
    }

    /// Booking horizon at `now`, or `None` when it lies entirely in the past
    /// or beyond representable time.
    pub fn horizon(&self, now: DateTime<Utc>) -> Option<Horizon> {
        let a = self.appointment;
        let earliest = now.checked_add_signed(try_hours_to_duration(a.min_schedule_hours)?)?;
        let horizon = match a.category {
            Category::Recurring | Category::Anytime => Horizon {
                first: earliest,
                last: now.checked_add_signed(Duration::try_days(a.max_schedule_days)?)?,
            },
            Category::Punctual { start, end } => Horizon {
                first: earliest.max(start),
                last: end,
            },
            Category::Custom => Horizon {
                first: earliest,
                last: a
                    .slots
                    .iter()
                    .filter_map(|s| match s {
                        SlotSpec::Unique { end, .. } => Some(*end),
                        SlotSpec::Recurring { .. } => None,
                    })
                    .max()?,
            },
        };
        (horizon.last > now).then_some(horizon)
    }

    /// Candidate ranges in start order, before any availability check.
    pub fn expand(&self, tz: Tz, now: DateTime<Utc>) -> Vec<Candidate> {
        let Some(horizon) = self.horizon(now) else {
            return Vec::new();
        };
        let duration = self.appointment.duration();
        if duration <= Duration::zero() {
            return Vec::new();
        }
        let mut candidates = match self.appointment.category {
            Category::Recurring => self.expand_recurring(tz, horizon, None, duration),
            Category::Punctual { end, .. } => self.expand_recurring(tz, horizon, Some(end), duration),
            Category::Custom => self.expand_unique(horizon, now),
            Category::Anytime => self.expand_anytime(tz, horizon, duration),
        };
        candidates.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
        candidates.dedup_by(|a, b| a.start == b.start && a.end == b.end && a.restrict_to == b.restrict_to);
        candidates
    }

    fn expand_recurring(
        &self,
        tz: Tz,
        horizon: Horizon,
        cutoff: Option<DateTime<Utc>>,
        duration: Duration,
    ) -> Vec<Candidate> {
        let mut out = Vec::new();
        for day in local_days(horizon.first, horizon.last, tz) {
            for spec in &self.appointment.slots {
                let SlotSpec::Recurring {
                    weekday,
                    hour_from,
                    hour_to,
                    restrict_to,
                } = spec
                else {
                    continue;
                };
                if day.weekday() != *weekday {
                    continue;
                }
                let mut start = localize_hours(day, *hour_from, tz);
                let mut day_end = localize_hours(day, *hour_to, tz);
                if let Some(cutoff) = cutoff {
                    day_end = day_end.min(cutoff);
                }
                if start < horizon.first {
                    start += whole_steps(horizon.first - start, duration);
                }
                while start + duration <= day_end {
                    out.push(Candidate {
                        start,
                        end: start + duration,
                        restrict_to: restrict_to.clone(),
                    });
                    start += duration;
                }
            }
        }
        out
    }

    fn expand_unique(&self, horizon: Horizon, now: DateTime<Utc>) -> Vec<Candidate> {
        self.appointment
            .slots
            .iter()
            .filter_map(|spec| match spec {
                SlotSpec::Unique {
                    start,
                    end,
                    restrict_to,
                } if *end > now && *start >= horizon.first => Some(Candidate {
                    start: *start,
                    end: *end,
                    restrict_to: restrict_to.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Grid points step in elapsed time from each local midnight, so a
    /// 25-hour fall-back day offers its repeated hour twice and a 23-hour
    /// spring-forward day skips the missing one.
    fn expand_anytime(&self, tz: Tz, horizon: Horizon, duration: Duration) -> Vec<Candidate> {
        let step = Duration::minutes(self.appointment.anytime_granularity_minutes.clamp(1, MINUTES_PER_DAY));
        let mut out = Vec::new();
        for day in local_days(horizon.first, horizon.last, tz) {
            let Some(next) = day.succ_opt() else {
                break;
            };
            let day_end = start_of_day(next, tz);
            let mut start = start_of_day(day, tz);
            while start < day_end {
                if start >= horizon.first && start + duration <= horizon.last {
                    out.push(Candidate {
                        start,
                        end: start + duration,
                        restrict_to: Vec::new(),
                    });
                }
                start += step;
            }
        }
        out
    }

    /// Expand, filter, and assign.
    #[tracing::instrument(skip_all, fields(appointment = %self.appointment.name, resources = resources.len()))]
    pub fn generate(&self, resources: &[Resource], now: DateTime<Utc>) -> Result<Vec<Slot>> {
        let a = self.appointment;
        let tz = a.validate()?;
        if !a.active {
            debug!("appointment type inactive");
            return Ok(Vec::new());
        }
        check_resources(a, resources)?;
        self.check_asked()?;

        let candidates = self.expand(tz, now);
        debug!(candidates = candidates.len(), "expanded slot specs");
        let (Some(first), Some(last_end)) = (
            candidates.first().map(|c| c.start),
            candidates.iter().map(|c| c.end).max(),
        ) else {
            return Ok(Vec::new());
        };

        let window = Window::new(first, last_end);
        let availability = AvailabilityEngine::new(self.store).compute(resources, &window, a.work_hours())?;
        let policy = a.assign_policy.for_call(now.timestamp_millis() as u64);
        let mut assigner =
            Assigner::new(policy, resources, a.required_resources).seating(self.asked_capacity, a.manage_capacity);

        let mut slots = Vec::new();
        for candidate in candidates {
            let offered = offers(resources, &availability, &candidate, a.manage_capacity);
            let available = assigner.rank(&offered);
            match assigner.pick(&offered) {
                Some(assigned) => slots.push(Slot {
                    start: candidate.start,
                    end: candidate.end,
                    assigned,
                    available,
                }),
                None => trace!(
                    start = %candidate.start,
                    free = offered.len(),
                    required = a.required_resources,
                    seats = self.asked_capacity,
                    "not enough free resources"
                ),
            }
        }
        debug!(slots = slots.len(), "assigned slots");
        Ok(slots)
    }

    /// [`generate`](Self::generate), then group by month in `requested_tz`.
    pub fn grouped(&self, resources: &[Resource], requested_tz: &str, now: DateTime<Utc>) -> Result<SlotsByPeriod> {
        let display_tz = parse_timezone(requested_tz)?;
        let slots = self.generate(resources, now)?;
        let today = local_date(now, display_tz);
        let last_day = self
            .horizon(now)
            .map(|h| local_date(h.last, display_tz))
            .unwrap_or(today);
        Ok(period::group_by_month(
            &slots,
            display_tz,
            today,
            last_day,
            self.appointment.week_start,
        ))
    }

    /// Re-check a booking right before it is committed.
    ///
    /// `[start, end)` must be exactly one of the slots the appointment type
    /// offers at `now`, every resource in `chosen` must be permitted on it and
    /// still free, and together they must seat the asked party.
    pub fn validate_booking(
        &self,
        resources: &[Resource],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        chosen: &[ResourceId],
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let a = self.appointment;
        let tz = a.validate()?;
        check_resources(a, resources)?;
        self.check_asked()?;
        if start >= end {
            return Err(SlotError::config(format!("booking {start} - {end} is empty")));
        }
        let chosen: BTreeSet<&ResourceId> = chosen.iter().collect();
        if !a.active || chosen.len() < a.required_resources {
            return Ok(false);
        }

        let permitted = self
            .expand(tz, now)
            .into_iter()
            .filter(|c| c.start == start && c.end == end)
            .any(|c| chosen.iter().all(|&id| c.restrict_to.is_empty() || c.restrict_to.contains(id)));
        if !permitted {
            debug!(%start, %end, "not an offered slot");
            return Ok(false);
        }

        let selected: Vec<Resource> = resources
            .iter()
            .filter(|r| chosen.contains(&r.id))
            .cloned()
            .collect();
        if selected.len() < chosen.len() {
            return Ok(false);
        }
        let window = Window::new(start, end);
        let availability = AvailabilityEngine::new(self.store).compute(&selected, &window, a.work_hours())?;
        let seats: Vec<u32> = availability
            .iter()
            .map(|av| av.seats_left(start, end, a.manage_capacity))
            .collect();
        let asked = self.asked_capacity;
        Ok(if a.manage_capacity {
            seats.iter().all(|&s| s > 0) && seats.iter().map(|&s| u64::from(s)).sum::<u64>() >= u64::from(asked)
        } else {
            seats.iter().all(|&s| s >= asked)
        })
    }

    fn check_asked(&self) -> Result<()> {
        if self.asked_capacity == 0 {
            return Err(SlotError::config(format!(
                "appointment '{}': a booking needs at least one seat",
                self.appointment.name
            )));
        }
        Ok(())
    }
}

fn check_resources(appointment: &AppointmentType, resources: &[Resource]) -> Result<()> {
    if resources.is_empty() {
        return Err(SlotError::config(format!(
            "appointment '{}' has no resources",
            appointment.name
        )));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = resources.iter().find(|r| !seen.insert(r.id.clone())) {
        return Err(SlotError::config(format!(
            "appointment '{}' lists resource '{}' more than once",
            appointment.name, dup.id
        )));
    }
    if let Some(empty) = resources.iter().find(|r| r.capacity == 0) {
        return Err(SlotError::config(format!("resource '{}' has no capacity", empty.id)));
    }
    if appointment.required_resources > resources.len() {
        return Err(SlotError::config(format!(
            "appointment '{}' needs {} resources per slot but only {} are configured",
            appointment.name,
            appointment.required_resources,
            resources.len()
        )));
    }
    Ok(())
}

/// Permitted resources with seats open over the whole candidate.
fn offers(
    resources: &[Resource],
    availability: &[ResourceAvailability],
    candidate: &Candidate,
    pooled: bool,
) -> Vec<Offer> {
    resources
        .iter()
        .zip(availability)
        .filter(|(r, _)| candidate.restrict_to.is_empty() || candidate.restrict_to.contains(&r.id))
        .map(|(r, avail)| Offer::new(r.id.clone(), avail.seats_left(candidate.start, candidate.end, pooled)))
        .filter(|o| o.seats > 0)
        .collect()
}

/// Local calendar days in `tz` from the day of `first` to the day of `last`.
fn local_days(first: DateTime<Utc>, last: DateTime<Utc>, tz: Tz) -> impl Iterator<Item = NaiveDate> {
    let last_day = local_date(last, tz);
    local_date(first, tz)
        .iter_days()
        .take_while(move |d| *d <= last_day)
}

/// Smallest whole multiple of `step` covering `behind`.
fn whole_steps(behind: Duration, step: Duration) -> Duration {
    let step_ms = step.num_milliseconds();
    let n = (behind.num_milliseconds() + step_ms - 1) / step_ms;
    Duration::milliseconds(n * step_ms)
}

// ── Entry points ────────────────────────────────────────────────────────────

/// Bookable slots of `appointment`, grouped by month in `requested_tz`.
///
/// An inactive appointment type, or one without any assignable slot, yields
/// an empty result rather than an error.
pub fn compute_slots<S: AvailabilityStore + ?Sized>(
    appointment: &AppointmentType,
    resources: &[Resource],
    store: &S,
    requested_tz: &str,
    now: DateTime<Utc>,
) -> Result<SlotsByPeriod> {
    SlotGenerator::new(appointment, store).grouped(resources, requested_tz, now)
}

/// Check a single-seat booking of `chosen` on `[start, end)`; see
/// [`SlotGenerator::validate_booking`].
pub fn validate_booking<S: AvailabilityStore + ?Sized>(
    appointment: &AppointmentType,
    resources: &[Resource],
    store: &S,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    chosen: &[ResourceId],
    now: DateTime<Utc>,
) -> Result<bool> {
    SlotGenerator::new(appointment, store).validate_booking(resources, start, end, chosen, now)
}
