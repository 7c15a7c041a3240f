//! # slot-engine
//!
//! Deterministic availability and appointment-slot computation.
//!
//! Given recurring working hours that may change over time, one-off leaves,
//! already-booked events, and timezones, the engine computes when each
//! resource is free and turns that into bookable slots, each assigned to one
//! resource (or a quorum of them).
//!
//! ## Modules
//!
//! - [`interval`]: Half-open intervals and set algebra (union, intersect, subtract, invert)
//! - [`timezone`]: Wall-clock ↔ UTC conversion with a fixed DST policy
//! - [`model`]: Input records: resources, work templates, leaves, busy events
//! - [`calendar`]: Weekly templates → concrete work intervals, work reporting
//! - [`leave`]: Leave and busy rows → interval sets
//! - [`store`]: Batched record-store interface and an in-memory store
//! - [`availability`]: `free = work − (leaves ∪ busy)` for many resources at once
//! - [`assign`]: Resource assignment policies
//! - [`slots`]: Appointment types and slot generation
//! - [`period`]: Month/week/day grouping of slots
//! - [`error`]: Error types

pub mod assign;
pub mod availability;
pub mod calendar;
pub mod error;
pub mod interval;
pub mod leave;
pub mod model;
pub mod period;
pub mod slots;
pub mod store;
pub mod timezone;

pub use assign::{AssignPolicy, Assigner, Offer};
pub use availability::{AvailabilityEngine, ResourceAvailability, WorkHours};
pub use calendar::{plan_hours, resolve, work_summary, SegmentWork, WorkSchedule, WorkSummary};
pub use error::{Result, SlotError, StoreError};
pub use interval::{duration, intersect, invert, overlaps, subtract, union, Interval, IntervalSet, Payload, Tags};
pub use model::{
    BusyEvent, DayPeriod, Leave, LeaveKind, Resource, ResourceId, ShowAs, WeekType, Window, WorkTemplate,
};
pub use period::{DaySlots, MonthSlots, SlotView, SlotsByPeriod};
pub use slots::{compute_slots, validate_booking, AppointmentType, Category, Slot, SlotGenerator, SlotSpec};
pub use store::{AvailabilityStore, FetchCounts, InMemoryStore};
pub use timezone::{from_reference, parse_timezone, to_reference, WeekStartDay};
