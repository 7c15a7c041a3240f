//! Half-open time intervals and the set algebra used by every availability
//! computation.
//!
//! An [`IntervalSet`] is always sorted by start and strictly disjoint: for two
//! consecutive members `a`, `b` we have `a.end < b.start`. Construction
//! coalesces intervals that overlap **or touch**, regardless of payload, and
//! drops intervals with `start >= end`.
//!
//! Two different comparisons are used on purpose and must not be mixed up:
//!
//! - [`overlaps`] is strict: `a.start < b.end && b.start < a.end`. Intervals
//!   that only touch (`a.end == b.start`) do not overlap.
//! - merging during construction and [`union`] uses `next.start <= current.end`,
//!   so touching intervals become one.
//!
//! All operations are pure and total; they return new sets and never fail.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ── Payload ─────────────────────────────────────────────────────────────────

/// Data attached to an interval that survives set operations.
///
/// When intervals are coalesced their payloads are combined. Intersection and
/// subtraction keep the payload of the left-hand operand.
pub trait Payload: Clone {
    fn combine(&mut self, other: &Self);
}

impl Payload for () {
    fn combine(&mut self, _other: &Self) {}
}

impl<T: Ord + Clone> Payload for BTreeSet<T> {
    fn combine(&mut self, other: &Self) {
        self.extend(other.iter().cloned());
    }
}

/// Set of string labels, the payload used for work, leave, and busy sets.
pub type Tags = BTreeSet<String>;

/// Build a [`Tags`] payload holding a single label.
pub fn tag(label: impl Into<String>) -> Tags {
    let mut tags = Tags::new();
    tags.insert(label.into());
    tags
}

// ── Interval ────────────────────────────────────────────────────────────────

/// A half-open `[start, end)` range of UTC instants with a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval<P = ()> {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub payload: P,
}

impl Interval<()> {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Interval {
            start,
            end,
            payload: (),
        }
    }
}

impl<P> Interval<P> {
    pub fn with_payload(start: DateTime<Utc>, end: DateTime<Utc>, payload: P) -> Self {
        Interval {
            start,
            end,
            payload,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.end > self.start {
            self.end - self.start
        } else {
            Duration::zero()
        }
    }

    /// True for zero-length (or inverted) intervals.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Strict overlap test; see [`overlaps`].
    pub fn overlaps<Q>(&self, other: &Interval<Q>) -> bool {
        overlaps(self, other)
    }

    /// True when `[start, end)` lies entirely inside this interval.
    pub fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= start && end <= self.end
    }

    /// Common part of two intervals, keeping this interval's payload.
    ///
    /// Returns `None` when the common part is empty. The only zero-length
    /// result is produced when both inputs are zero-length at the same instant.
    pub fn intersection<Q>(&self, other: &Interval<Q>) -> Option<Interval<P>>
    where
        P: Clone,
    {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        let coincident_points = self.is_empty()
            && other.is_empty()
            && self.start == other.start
            && self.end == other.end;
        if start < end || coincident_points {
            Some(Interval::with_payload(start, end, self.payload.clone()))
        } else {
            None
        }
    }
}

/// Two intervals overlap when `a.start < b.end && b.start < a.end`.
///
/// Touching intervals (`a.end == b.start`) do NOT overlap.
pub fn overlaps<P, Q>(a: &Interval<P>, b: &Interval<Q>) -> bool {
    a.start < b.end && b.start < a.end
}

// ── IntervalSet ─────────────────────────────────────────────────────────────

/// Sorted, strictly disjoint collection of non-empty intervals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IntervalSet<P = ()> {
    items: Vec<Interval<P>>,
}

impl<P> Default for IntervalSet<P> {
    fn default() -> Self {
        IntervalSet { items: Vec::new() }
    }
}

impl<P: Payload> IntervalSet<P> {
    /// Normalize arbitrary intervals into a set.
    pub fn new(intervals: impl IntoIterator<Item = Interval<P>>) -> Self {
        let mut items: Vec<Interval<P>> = intervals
            .into_iter()
            .filter(|i| i.start < i.end)
            .collect();
        items.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
        IntervalSet {
            items: coalesce(items),
        }
    }

    /// A set holding the single range `[start, end)` (empty if `start >= end`).
    pub fn span(start: DateTime<Utc>, end: DateTime<Utc>, payload: P) -> Self {
        Self::new([Interval::with_payload(start, end, payload)])
    }
}

impl IntervalSet<()> {
    pub fn from_ranges(ranges: impl IntoIterator<Item = (DateTime<Utc>, DateTime<Utc>)>) -> Self {
        Self::new(ranges.into_iter().map(|(s, e)| Interval::new(s, e)))
    }
}

impl<P> IntervalSet<P> {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap a vector the caller guarantees to be sorted and strictly disjoint.
    fn from_normalized(items: Vec<Interval<P>>) -> Self {
        debug_assert!(items.windows(2).all(|w| w[0].end < w[1].start));
        debug_assert!(items.iter().all(|i| i.start < i.end));
        IntervalSet { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval<P>> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Interval<P>] {
        &self.items
    }

    pub fn first(&self) -> Option<&Interval<P>> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&Interval<P>> {
        self.items.last()
    }

    /// Start/end pairs, dropping payloads.
    pub fn ranges(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.items.iter().map(|i| (i.start, i.end)).collect()
    }

    /// Same ranges with the payload discarded.
    pub fn without_payload(&self) -> IntervalSet<()> {
        IntervalSet::from_normalized(
            self.items
                .iter()
                .map(|i| Interval::new(i.start, i.end))
                .collect(),
        )
    }

    /// Sum of `end - start` over all members.
    pub fn duration(&self) -> Duration {
        duration(self)
    }

    /// Total duration in decimal hours.
    pub fn hours(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / 3_600_000.0
    }

    /// True when a single member covers all of `[start, end)`.
    pub fn contains_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let idx = self.items.partition_point(|i| i.start <= start);
        if idx == 0 {
            return false;
        }
        self.items[idx - 1].covers(start, end)
    }

    /// True when any member strictly overlaps `[start, end)`.
    pub fn overlaps_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let idx = self.items.partition_point(|i| i.end <= start);
        self.items
            .get(idx)
            .is_some_and(|i| i.start < end && start < i.end)
    }
}

impl<P: Payload> IntervalSet<P> {
    /// Restrict the set to `[lo, hi)`.
    pub fn clip(&self, lo: DateTime<Utc>, hi: DateTime<Utc>) -> Self {
        intersect(self, &IntervalSet::span(lo, hi, ()))
    }
}

impl<'a, P> IntoIterator for &'a IntervalSet<P> {
    type Item = &'a Interval<P>;
    type IntoIter = std::slice::Iter<'a, Interval<P>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<P> IntoIterator for IntervalSet<P> {
    type Item = Interval<P>;
    type IntoIter = std::vec::IntoIter<Interval<P>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<P: Payload> FromIterator<Interval<P>> for IntervalSet<P> {
    fn from_iter<I: IntoIterator<Item = Interval<P>>>(iter: I) -> Self {
        IntervalSet::new(iter)
    }
}

/// Merge sorted intervals that overlap or touch.
fn coalesce<P: Payload>(sorted: Vec<Interval<P>>) -> Vec<Interval<P>> {
    let mut merged: Vec<Interval<P>> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        if let Some(last) = merged.last_mut() {
            if interval.start <= last.end {
                last.end = last.end.max(interval.end);
                last.payload.combine(&interval.payload);
                continue;
            }
        }
        merged.push(interval);
    }
    merged
}

// ── Algebra ─────────────────────────────────────────────────────────────────

/// Union of two sets; touching or overlapping members are coalesced.
pub fn union<P: Payload>(a: &IntervalSet<P>, b: &IntervalSet<P>) -> IntervalSet<P> {
    let (xs, ys) = (a.as_slice(), b.as_slice());
    let mut sorted = Vec::with_capacity(xs.len() + ys.len());
    let (mut i, mut j) = (0, 0);
    while i < xs.len() && j < ys.len() {
        if (xs[i].start, xs[i].end) <= (ys[j].start, ys[j].end) {
            sorted.push(xs[i].clone());
            i += 1;
        } else {
            sorted.push(ys[j].clone());
            j += 1;
        }
    }
    sorted.extend_from_slice(&xs[i..]);
    sorted.extend_from_slice(&ys[j..]);
    IntervalSet::from_normalized(coalesce(sorted))
}

/// Union of any number of sets.
pub fn union_all<'a, P: Payload + 'a>(
    sets: impl IntoIterator<Item = &'a IntervalSet<P>>,
) -> IntervalSet<P> {
    IntervalSet::new(sets.into_iter().flat_map(|s| s.iter().cloned()))
}

/// Intersection; each piece keeps the payload of the `a` member it came from.
pub fn intersect<P: Payload, Q>(a: &IntervalSet<P>, b: &IntervalSet<Q>) -> IntervalSet<P> {
    let (xs, ys) = (a.as_slice(), b.as_slice());
    let mut result = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < xs.len() && j < ys.len() {
        let (x, y) = (&xs[i], &ys[j]);
        let start = x.start.max(y.start);
        let end = x.end.min(y.end);
        if start < end {
            result.push(Interval::with_payload(start, end, x.payload.clone()));
        }
        if x.end <= y.end {
            i += 1;
        } else {
            j += 1;
        }
    }
    IntervalSet::from_normalized(result)
}

/// `a - b`: every part of `a` not covered by `b`.
pub fn subtract<P: Payload, Q>(a: &IntervalSet<P>, b: &IntervalSet<Q>) -> IntervalSet<P> {
    let to_remove = b.as_slice();
    let mut result = Vec::new();
    let mut ri = 0;

    for base in a {
        let mut current_start = base.start;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < base.end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Interval::with_payload(
                    current_start,
                    r.start,
                    base.payload.clone(),
                ));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < base.end {
            result.push(Interval::with_payload(
                current_start,
                base.end,
                base.payload.clone(),
            ));
        }
    }

    IntervalSet::from_normalized(result)
}

/// Gaps of `a` inside `[lower, upper)`.
///
/// Equivalent to `subtract([lower, upper), a)`. Because `a` is normalized,
/// zero-length members split nothing and touching members leave no gap.
pub fn invert<P>(a: &IntervalSet<P>, lower: DateTime<Utc>, upper: DateTime<Utc>) -> IntervalSet<()> {
    if lower >= upper {
        return IntervalSet::empty();
    }
    let mut gaps = Vec::new();
    let mut cursor = lower;
    for member in a {
        if member.end <= cursor {
            continue;
        }
        if member.start >= upper {
            break;
        }
        if member.start > cursor {
            gaps.push(Interval::new(cursor, member.start));
        }
        cursor = cursor.max(member.end);
        if cursor >= upper {
            break;
        }
    }
    if cursor < upper {
        gaps.push(Interval::new(cursor, upper));
    }
    IntervalSet::from_normalized(gaps)
}

/// Sum of member durations.
pub fn duration<P>(a: &IntervalSet<P>) -> Duration {
    a.iter()
        .fold(Duration::zero(), |acc, i| acc + (i.end - i.start))
}

// ── Tests ───────────────────────────────────────────────────────────────────
