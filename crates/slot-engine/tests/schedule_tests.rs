//! End-to-end tests: working schedules, leaves, and slot generation against
//! an in-memory store.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use slot_engine::{
    compute_slots, resolve, AppointmentType, AssignPolicy, AvailabilityEngine, BusyEvent, Category,
    InMemoryStore, Leave, Resource, SlotGenerator, SlotSpec, Window, WorkHours, WorkTemplate,
};

// ── Helpers ─────────────────────────────────────────────────────────────────

const WEEKDAYS: [Weekday; 5] = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];

fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn weekly(calendar: &str, hours: &[(f64, f64)]) -> Vec<WorkTemplate> {
    WEEKDAYS
        .iter()
        .flat_map(|&wd| hours.iter().map(move |&(from, to)| WorkTemplate::new(calendar, wd, from, to)))
        .collect()
}

fn weekdays_between(first: NaiveDate, last: NaiveDate) -> usize {
    first
        .iter_days()
        .take_while(|d| *d <= last)
        .filter(|d| d.weekday().num_days_from_monday() < 5)
        .count()
}

// ── Test 1: Calendar change mid-window ──────────────────────────────────────

#[test]
fn calendar_change_produces_two_groupings_without_leakage() {
    let october: Vec<WorkTemplate> = weekly("35h", &[(8.0, 15.0)])
        .into_iter()
        .map(|t| t.valid(Some(date(2023, 10, 1)), Some(date(2023, 10, 31))))
        .collect();
    let november: Vec<WorkTemplate> = weekly("40h", &[(8.0, 12.0), (13.0, 17.0)])
        .into_iter()
        .map(|t| t.valid(Some(date(2023, 11, 1)), None))
        .collect();
    let templates: Vec<WorkTemplate> = october.into_iter().chain(november).collect();

    let window = Window::new(utc(2023, 10, 1, 0), utc(2023, 12, 1, 0));
    let schedule = resolve(&templates, &window, Tz::UTC).unwrap();

    assert_eq!(schedule.segments.len(), 2);
    let (oct, nov) = (&schedule.segments[0], &schedule.segments[1]);
    assert_eq!(oct.calendar_ids, vec!["35h".to_string()]);
    assert_eq!(nov.calendar_ids, vec!["40h".to_string()]);

    // 22 weekdays in each month.
    assert!((oct.hours() - 22.0 * 7.0).abs() < 1e-9);
    assert!((nov.hours() - 22.0 * 8.0).abs() < 1e-9);
    assert!(oct.work.iter().all(|i| i.end <= utc(2023, 11, 1, 0)));
    assert!(nov.work.iter().all(|i| i.start >= utc(2023, 11, 1, 0)));
    assert!((schedule.work.hours() - (154.0 + 176.0)).abs() < 1e-9);
}

// ── Test 2: Hourly slots over thirty days ───────────────────────────────────

#[test]
fn unique_hourly_slots_stay_in_local_office_hours() {
    let brussels: Tz = "Europe/Brussels".parse().unwrap();
    let store = InMemoryStore::new().with_templates("alice", weekly("std", &[(8.0, 16.0)]));
    let first = date(2024, 3, 4);
    let last = date(2024, 4, 2);

    // Clocks go forward on 2024-03-31, so the UTC hours shift mid-range.
    let mut appointment = AppointmentType::new("consult", "Europe/Brussels").with_category(Category::Custom);
    for day in first.iter_days().take_while(|d| *d <= last) {
        if day.weekday().num_days_from_monday() >= 5 {
            continue;
        }
        for hour in 8..16 {
            let start = brussels
                .from_local_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
                .single()
                .unwrap()
                .with_timezone(&Utc);
            appointment = appointment.with_slot(SlotSpec::unique(start, start + chrono::Duration::hours(1)));
        }
    }

    let slots = SlotGenerator::new(&appointment, &store)
        .generate(&[Resource::new("alice", "Europe/Brussels")], utc(2024, 3, 3, 0))
        .unwrap();

    let weekdays = weekdays_between(first, last);
    assert_eq!(weekdays, 22);
    assert_eq!(slots.len(), 8 * weekdays);
    for slot in &slots {
        let (start, end) = (slot.start.with_timezone(&brussels), slot.end.with_timezone(&brussels));
        assert!(start.hour() >= 8 && end.hour() <= 16, "{start} - {end}");
        assert_eq!(start.date_naive(), end.date_naive());
    }
    assert!(slots.iter().any(|s| s.start == utc(2024, 3, 4, 7)));
    assert!(slots.iter().any(|s| s.start == utc(2024, 4, 2, 6)));
}

#[test]
fn hourly_slots_every_weekday_for_thirty_days() {
    let store = InMemoryStore::new().with_templates("alice", weekly("std", &[(8.0, 16.0)]));
    let mut appointment = AppointmentType::new("consult", "UTC").with_schedule(0.0, 29);
    for wd in WEEKDAYS {
        appointment = appointment.with_slot(SlotSpec::recurring(wd, 8.0, 16.0));
    }
    let now = utc(2024, 3, 4, 0);
    let slots = SlotGenerator::new(&appointment, &store)
        .generate(&[Resource::new("alice", "UTC")], now)
        .unwrap();

    let weekdays = weekdays_between(date(2024, 3, 4), date(2024, 4, 2));
    assert_eq!(weekdays, 22);
    assert_eq!(slots.len(), 8 * weekdays);
    assert!(slots.iter().all(|s| s.start.hour() >= 8 && s.end.hour() <= 16 && s.end.date_naive() == s.start.date_naive()));
    assert!(slots.windows(2).all(|w| w[0].start < w[1].start));
}

// ── Test 3: Fetch count independent of resource count ───────────────────────

#[test]
fn fetch_counts_do_not_grow_with_resources() {
    for n in [1usize, 10, 60] {
        let mut store = InMemoryStore::new();
        let resources: Vec<Resource> = (0..n)
            .map(|i| Resource::new(format!("r{i}"), "Europe/Brussels").with_sequence(i as i32))
            .collect();
        for r in &resources {
            store = store.with_templates(r.id.clone(), weekly("std", &[(9.0, 17.0)]));
        }
        let appointment = AppointmentType::new("consult", "Europe/Brussels")
            .with_slot(SlotSpec::recurring(Weekday::Wed, 9.0, 17.0))
            .with_policy(AssignPolicy::LeastLoaded);
        let grouped = compute_slots(&appointment, &resources, &store, "Europe/Brussels", utc(2024, 5, 6, 6)).unwrap();
        assert!(!grouped.is_empty());

        let counts = store.fetch_counts();
        assert_eq!((counts.templates, counts.leaves, counts.events), (1, 1, 1), "n = {n}");
    }
}

// ── Test 4: Least-loaded spreads slots ──────────────────────────────────────

#[test]
fn least_loaded_spreads_work_evenly() {
    let resources: Vec<Resource> = ["a", "b", "c"].iter().map(|id| Resource::new(*id, "UTC")).collect();
    let mut store = InMemoryStore::new();
    for r in &resources {
        store = store.with_templates(r.id.clone(), weekly("std", &[(8.0, 17.0)]));
    }
    let appointment = AppointmentType::new("consult", "UTC")
        .with_slot(SlotSpec::recurring(Weekday::Mon, 9.0, 15.0))
        .with_schedule(0.0, 1)
        .with_policy(AssignPolicy::LeastLoaded);
    let slots = SlotGenerator::new(&appointment, &store)
        .generate(&resources, utc(2024, 3, 4, 0))
        .unwrap();
    assert_eq!(slots.len(), 6);
    for id in ["a", "b", "c"] {
        assert_eq!(slots.iter().filter(|s| s.assigned[0].as_str() == id).count(), 2);
    }
}

// ── Test 5: Global leave removes everyone ───────────────────────────────────

#[test]
fn global_leave_blocks_every_resource() {
    let resources = vec![Resource::new("a", "UTC"), Resource::new("b", "UTC")];
    let store = InMemoryStore::new()
        .with_templates("a", weekly("std", &[(8.0, 17.0)]))
        .with_templates("b", weekly("std", &[(8.0, 17.0)]))
        .with_leave(Leave::new(None, utc(2024, 3, 4, 0), utc(2024, 3, 5, 0)).with_reason("public holiday"));
    let appointment = AppointmentType::new("consult", "UTC")
        .with_slot(SlotSpec::recurring(Weekday::Mon, 9.0, 12.0))
        .with_slot(SlotSpec::recurring(Weekday::Tue, 9.0, 12.0))
        .with_schedule(0.0, 1);
    let slots = SlotGenerator::new(&appointment, &store)
        .generate(&resources, utc(2024, 3, 4, 0))
        .unwrap();
    assert_eq!(slots.len(), 3);
    assert!(slots.iter().all(|s| s.start >= utc(2024, 3, 5, 0)));
}

// ── Test 6: Working hours across a DST change ───────────────────────────────

#[test]
fn working_hours_follow_local_clock_across_dst() {
    let ny: Tz = "America/New_York".parse().unwrap();
    let store = InMemoryStore::new().with_templates("alice", weekly("std", &[(9.0, 17.0)]));
    // DST starts Sunday 2024-03-10.
    let window = Window::new(utc(2024, 3, 8, 0), utc(2024, 3, 12, 0));
    let result = AvailabilityEngine::new(&store)
        .compute(&[Resource::new("alice", "America/New_York")], &window, WorkHours::Enforced)
        .unwrap();
    let free = result[0].free.ranges();
    assert_eq!(free[0], (utc(2024, 3, 8, 14), utc(2024, 3, 8, 22)));
    assert_eq!(free[1], (utc(2024, 3, 11, 13), utc(2024, 3, 11, 21)));
    assert!(free.iter().all(|(s, _)| s.with_timezone(&ny).hour() == 9));
}

// ── Test 7: All-day events and free events ──────────────────────────────────

#[test]
fn all_day_event_blocks_only_its_local_day() {
    let store = InMemoryStore::new()
        .with_templates("alice", weekly("std", &[(8.0, 17.0)]))
        .with_event("alice", BusyEvent::new(utc(2024, 3, 5, 12), utc(2024, 3, 5, 13)).all_day());
    let appointment = AppointmentType::new("consult", "UTC")
        .with_slot(SlotSpec::recurring(Weekday::Tue, 9.0, 10.0))
        .with_slot(SlotSpec::recurring(Weekday::Wed, 9.0, 10.0))
        .with_schedule(0.0, 3);
    let slots = SlotGenerator::new(&appointment, &store)
        .generate(&[Resource::new("alice", "UTC")], utc(2024, 3, 4, 0))
        .unwrap();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].start, utc(2024, 3, 6, 9));
}
