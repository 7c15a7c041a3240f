//! Per-resource availability: `free = work − (leaves ∪ busy)`.
//!
//! [`AvailabilityEngine::compute`] is batch-first: it issues exactly one
//! query of each kind against the [`AvailabilityStore`] for all resources,
//! then does every remaining step in memory.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar::{self, SegmentWork, WorkSummary};
use crate::error::{Result, SlotError};
use crate::interval::{self, IntervalSet, Tags};
use crate::leave;
use crate::model::{BusyEvent, Resource, ResourceId, ShowAs, Window};
use crate::store::AvailabilityStore;
use crate::timezone::parse_timezone;

/// Whether free time is limited to working hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkHours {
    /// Free time only exists inside resolved working hours.
    #[default]
    Enforced,
    /// The whole window counts as working time; only leaves and busy
    /// events remove time.
    Ignored,
}

/// Everything known about one resource over a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceAvailability {
    pub resource: ResourceId,
    pub timezone: String,
    #[serde(skip)]
    pub tz: Tz,
    pub window: Window,
    /// Work per validity segment, empty when work hours are ignored and the
    /// resource has no templates.
    pub segments: Vec<SegmentWork>,
    pub work: IntervalSet<Tags>,
    pub leaves: IntervalSet<Tags>,
    pub busy: IntervalSet<Tags>,
    pub free: IntervalSet<Tags>,
    /// Work minus leaves and whole-resource events; bookings that only take
    /// seats are still in.
    pub open: IntervalSet<Tags>,
    /// Seat-holding bookings overlapping the window.
    pub bookings: Vec<BusyEvent>,
    pub capacity: u32,
    pub shareable: bool,
}

impl ResourceAvailability {
    /// Complement of the free time inside the window.
    pub fn unavailable(&self) -> IntervalSet {
        interval::invert(&self.free, self.window.start, self.window.end)
    }

    /// True when `[start, end)` fits entirely inside one free interval.
    pub fn is_free(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.free.contains_range(start, end)
    }

    /// Seats still open over the whole of `[start, end)`.
    ///
    /// A free resource offers its full capacity. With `pooled` seating a
    /// shareable resource only loses the seats overlapping bookings hold;
    /// otherwise any booking closes it.
    pub fn seats_left(&self, start: DateTime<Utc>, end: DateTime<Utc>, pooled: bool) -> u32 {
        if self.free.contains_range(start, end) {
            return self.capacity;
        }
        if !(pooled && self.shareable) || !self.open.contains_range(start, end) {
            return 0;
        }
        let taken: u64 = self
            .bookings
            .iter()
            .filter(|b| b.overlaps(start, end))
            .filter_map(|b| b.seats)
            .map(u64::from)
            .sum();
        u64::from(self.capacity).saturating_sub(taken) as u32
    }

    /// Work actually available once leaves are taken out, in hours and days.
    pub fn work_summary(&self) -> WorkSummary {
        let worked = interval::subtract(&self.work, &self.leaves);
        calendar::work_summary(&self.work, &worked, self.tz)
    }
}

/// Computes availability for batches of resources against a store.
pub struct AvailabilityEngine<'a, S: AvailabilityStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: AvailabilityStore + ?Sized> AvailabilityEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        AvailabilityEngine { store }
    }

    /// Availability of every resource over `window`, in input order.
    #[tracing::instrument(skip_all, fields(resources = resources.len(), from = %window.start, to = %window.end))]
    pub fn compute(
        &self,
        resources: &[Resource],
        window: &Window,
        mode: WorkHours,
    ) -> Result<Vec<ResourceAvailability>> {
        if window.is_empty() {
            return Err(SlotError::config(format!(
                "window starts {} at or after its end {}",
                window.start, window.end
            )));
        }
        let zones = resources
            .iter()
            .map(|r| parse_timezone(&r.timezone))
            .collect::<Result<Vec<Tz>>>()?;

        let ids: Vec<ResourceId> = resources.iter().map(|r| r.id.clone()).collect();
        let templates = self
            .store
            .fetch_work_templates(&ids, window)
            .map_err(SlotError::Store)?;
        let leaves = self.store.fetch_leaves(&ids, window).map_err(SlotError::Store)?;
        let events = self
            .store
            .fetch_busy_events(&ids, window)
            .map_err(SlotError::Store)?;

        let mut out = Vec::with_capacity(resources.len());
        for (resource, tz) in resources.iter().zip(zones) {
            let id = &resource.id;
            let schedule = calendar::resolve(&records_of(&templates, id), window, tz)?;
            let leave_set = leave::leave_intervals(&records_of(&leaves, id), &schedule.segments, window)?;
            let (bookings, blocking): (Vec<BusyEvent>, Vec<BusyEvent>) = records_of(&events, id)
                .into_iter()
                .filter(|e| e.show_as == ShowAs::Busy)
                .partition(|e| e.seats.is_some());
            let hard_busy = leave::busy_intervals(&blocking, window, tz);
            let busy = interval::union(&hard_busy, &leave::busy_intervals(&bookings, window, tz));

            let work = match mode {
                WorkHours::Enforced => schedule.work,
                WorkHours::Ignored => IntervalSet::span(window.start, window.end, Tags::new()),
            };
            let free = interval::subtract(&work, &interval::union(&leave_set, &busy));
            let open = interval::subtract(&work, &interval::union(&leave_set, &hard_busy));
            debug!(
                resource = %id,
                work_hours = work.hours(),
                leave_hours = leave_set.hours(),
                busy_hours = busy.hours(),
                free_hours = free.hours(),
                "resolved availability"
            );

            out.push(ResourceAvailability {
                resource: id.clone(),
                timezone: resource.timezone.clone(),
                tz,
                window: *window,
                segments: schedule.segments,
                work,
                leaves: leave_set,
                busy,
                free,
                open,
                bookings,
                capacity: resource.capacity,
                shareable: resource.shareable,
            });
        }
        Ok(out)
    }
}

fn records_of<T: Clone>(map: &HashMap<ResourceId, Vec<T>>, id: &ResourceId) -> Vec<T> {
    map.get(id).cloned().unwrap_or_default()
}
