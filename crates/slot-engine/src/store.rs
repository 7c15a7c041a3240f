//! Record-store collaborator.
//!
//! The engine never owns calendars, leaves, or events; it asks a store for
//! them. Every fetch takes the *whole* list of resources of a computation so
//! that a store backed by a database answers each kind of query once,
//! however many resources are involved.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Duration;
use serde::Deserialize;

use crate::error::{Result, SlotError, StoreError};
use crate::model::{BusyEvent, Leave, ResourceId, Window, WorkTemplate};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Source of the raw records availability is computed from.
///
/// Resources missing from a returned map have no records of that kind.
pub trait AvailabilityStore {
    /// Working-hour templates per resource, ordered by validity.
    fn fetch_work_templates(
        &self,
        resources: &[ResourceId],
        window: &Window,
    ) -> StoreResult<HashMap<ResourceId, Vec<WorkTemplate>>>;

    /// Leaves overlapping `window`, global leaves included for every resource.
    fn fetch_leaves(
        &self,
        resources: &[ResourceId],
        window: &Window,
    ) -> StoreResult<HashMap<ResourceId, Vec<Leave>>>;

    /// Booked events that may block time inside `window`.
    fn fetch_busy_events(
        &self,
        resources: &[ResourceId],
        window: &Window,
    ) -> StoreResult<HashMap<ResourceId, Vec<BusyEvent>>>;
}

// ── In-memory store ─────────────────────────────────────────────────────────

/// How many times each fetch was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchCounts {
    pub templates: usize,
    pub leaves: usize,
    pub events: usize,
}

#[derive(Debug, Default)]
struct Counters {
    templates: AtomicUsize,
    leaves: AtomicUsize,
    events: AtomicUsize,
}

/// A store holding every record in memory, loadable from JSON.
///
/// ```json
/// {
///   "templates": { "alice": [{ "weekday": "Mon", "hour_from": 8, "hour_to": 12 }] },
///   "leaves": [{ "resource_id": null, "date_from": "...", "date_to": "..." }],
///   "events": { "alice": [{ "start": "...", "end": "..." }] }
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct InMemoryStore {
    #[serde(default)]
    templates: HashMap<ResourceId, Vec<WorkTemplate>>,
    #[serde(default)]
    leaves: Vec<Leave>,
    #[serde(default)]
    events: HashMap<ResourceId, Vec<BusyEvent>>,
    #[serde(skip)]
    calls: Counters,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SlotError::config(format!("store: {e}")))
    }

    pub fn with_templates(mut self, resource: impl Into<ResourceId>, templates: Vec<WorkTemplate>) -> Self {
        self.templates.entry(resource.into()).or_default().extend(templates);
        self
    }

    pub fn with_leave(mut self, leave: Leave) -> Self {
        self.leaves.push(leave);
        self
    }

    pub fn with_event(mut self, resource: impl Into<ResourceId>, event: BusyEvent) -> Self {
        self.events.entry(resource.into()).or_default().push(event);
        self
    }

    pub fn fetch_counts(&self) -> FetchCounts {
        FetchCounts {
            templates: self.calls.templates.load(Ordering::Relaxed),
            leaves: self.calls.leaves.load(Ordering::Relaxed),
            events: self.calls.events.load(Ordering::Relaxed),
        }
    }
}

impl AvailabilityStore for InMemoryStore {
    fn fetch_work_templates(
        &self,
        resources: &[ResourceId],
        _window: &Window,
    ) -> StoreResult<HashMap<ResourceId, Vec<WorkTemplate>>> {
        self.calls.templates.fetch_add(1, Ordering::Relaxed);
        Ok(resources
            .iter()
            .filter_map(|id| {
                let mut templates = self.templates.get(id)?.clone();
                templates.sort_by_key(|t| (t.valid_from, t.valid_to));
                Some((id.clone(), templates))
            })
            .collect())
    }

    fn fetch_leaves(
        &self,
        resources: &[ResourceId],
        window: &Window,
    ) -> StoreResult<HashMap<ResourceId, Vec<Leave>>> {
        self.calls.leaves.fetch_add(1, Ordering::Relaxed);
        let mut found: HashMap<ResourceId, Vec<Leave>> = HashMap::new();
        for leave in &self.leaves {
            // Inverted rows are passed through so the registry can reject them.
            let inverted = leave.date_from > leave.date_to;
            if !inverted && (leave.date_to <= window.start || leave.date_from >= window.end) {
                continue;
            }
            for id in resources {
                if leave.resource_id.as_ref().is_none_or(|r| r == id) {
                    found.entry(id.clone()).or_default().push(leave.clone());
                }
            }
        }
        Ok(found)
    }

    fn fetch_busy_events(
        &self,
        resources: &[ResourceId],
        window: &Window,
    ) -> StoreResult<HashMap<ResourceId, Vec<BusyEvent>>> {
        self.calls.events.fetch_add(1, Ordering::Relaxed);
        // All-day events widen to local days, so look one day either side.
        let (lo, hi) = (window.start - Duration::days(1), window.end + Duration::days(1));
        Ok(resources
            .iter()
            .filter_map(|id| {
                let events: Vec<BusyEvent> = self
                    .events
                    .get(id)?
                    .iter()
                    .filter(|e| e.start < hi && e.end > lo)
                    .cloned()
                    .collect();
                Some((id.clone(), events))
            })
            .collect())
    }
}
